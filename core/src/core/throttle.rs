//! Shared backoff for every request a scan sends.
//!
//! [`ThrottledFetcher`] decorates the scan's [`Fetcher`] and feeds each status
//! code into one [`ThrottleController`]. Only rate-limit answers (429, 503)
//! grow the delay. A 401 or 403 is an ordinary answer from a protected
//! endpoint and counts as a success.
//!
//! Delay: 50ms doubling per consecutive rate-limit answer, capped at 2s;
//! each other answer takes 10ms off.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::time::{sleep, Duration};

use crate::error::FetchError;
use crate::http::{FetchedResponse, Fetcher};

const MAX_DELAY_MS: u64 = 2000;
const INITIAL_BACKOFF_MS: u64 = 50;
const DECAY_MS: u64 = 10;

#[derive(Default)]
pub struct ThrottleController {
    delay_ms: AtomicU64,
    consecutive_blocks: AtomicU32,
    total_throttled: AtomicU64,
}

impl ThrottleController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for the current delay. No-op when the delay is 0.
    pub async fn wait(&self) {
        let ms = self.delay_ms.load(Relaxed);
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Returns true if this status escalated the backoff.
    pub fn record_status(&self, status: u16) -> bool {
        if is_rate_limited(status) {
            let blocks = self.consecutive_blocks.fetch_add(1, Relaxed) + 1;
            self.total_throttled.fetch_add(1, Relaxed);

            // 50 * 2^(blocks-1), capped
            let new_delay = (INITIAL_BACKOFF_MS * (1u64 << (blocks - 1).min(6))).min(MAX_DELAY_MS);
            self.delay_ms.store(new_delay, Relaxed);
            true
        } else {
            self.consecutive_blocks.store(0, Relaxed);
            let current = self.delay_ms.load(Relaxed);
            if current > 0 {
                self.delay_ms.store(current.saturating_sub(DECAY_MS), Relaxed);
            }
            false
        }
    }

    pub fn current_delay_ms(&self) -> u64 {
        self.delay_ms.load(Relaxed)
    }

    pub fn total_throttled(&self) -> u64 {
        self.total_throttled.load(Relaxed)
    }
}

fn is_rate_limited(status: u16) -> bool {
    matches!(status, 429 | 503)
}

/// A [`Fetcher`] that waits out the shared backoff before every request.
pub struct ThrottledFetcher {
    inner: Arc<dyn Fetcher>,
    throttle: Arc<ThrottleController>,
}

impl ThrottledFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, throttle: Arc<ThrottleController>) -> Self {
        Self { inner, throttle }
    }

    fn observe(&self, result: &Result<FetchedResponse, FetchError>) {
        let status = match result {
            Ok(resp) => resp.status,
            Err(FetchError::Status { status, .. }) => *status,
            Err(_) => return,
        };
        if self.throttle.record_status(status) {
            debug!(
                "target answered {}, backing off {}ms",
                status,
                self.throttle.current_delay_ms()
            );
        }
    }
}

#[async_trait]
impl Fetcher for ThrottledFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.throttle.wait().await;
        let result = self.inner.fetch(url).await;
        self.observe(&result);
        result
    }

    async fn probe(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.throttle.wait().await;
        let result = self.inner.probe(url).await;
        self.observe(&result);
        result
    }
}
