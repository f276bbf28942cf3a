use std::sync::Arc;

use futures::{stream, StreamExt};
use log::{debug, info, warn};
use tokio::time::{timeout, Duration};
use url::Url;

use crate::core::result_aggregator::{ApiCollector, ScanResult};
use crate::core::state::{ScanPhase, ScanState};
use crate::core::target_manager::ScriptTarget;
use crate::core::throttle::{ThrottleController, ThrottledFetcher};
use crate::error::ScanError;
use crate::http::{Fetcher, UrlValidator};
use crate::models::{origin_of, JsResource};
use crate::modules::api_extractor::{ApiExtractor, ConcatenationEnricher, Enricher};
use crate::modules::issues::{
    CheckContext, ComponentCheck, IssueCheck, IssueDetector, SensitiveDataCheck, UnauthorizedAccessCheck,
};
use crate::modules::js_extractor::JsExtractor;
use crate::modules::microservice::{
    annotate_vulnerabilities, MicroserviceAggregator, SignatureFingerprinter, TechnologyFingerprinter,
};
use crate::{ScanConfig, SinkRef};

/// Drives one scan through its phases:
///
/// 1. fetch the seed page,
/// 2. find script URLs in it,
/// 3. fetch the scripts,
/// 4. mine and compose candidate APIs,
/// 5. group them into services,
/// 6. run the issue checks,
/// 7. finalize the report.
///
/// Per-resource failures are recorded and skipped. Anything else ends the
/// scan as `failed`, keeping what was gathered so far.
pub struct ScanEngine {
    config: ScanConfig,
    fetcher: Arc<dyn Fetcher>,
    throttle: Arc<ThrottleController>,
    sink: SinkRef,
    enricher: Option<Arc<dyn Enricher>>,
    fingerprinter: Option<Arc<dyn TechnologyFingerprinter>>,
}

impl ScanEngine {
    /// Every request made through `fetcher` shares one backoff throttle.
    pub fn new(config: ScanConfig, fetcher: Arc<dyn Fetcher>, sink: SinkRef) -> Self {
        let throttle = Arc::new(ThrottleController::new());
        let fetcher: Arc<dyn Fetcher> = Arc::new(ThrottledFetcher::new(fetcher, Arc::clone(&throttle)));
        Self {
            config,
            fetcher,
            throttle,
            sink,
            enricher: None,
            fingerprinter: None,
        }
    }

    /// Overrides the built-in enricher used when `use_ai` is set.
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn TechnologyFingerprinter>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    /// A `failed` result for a scan that never got going.
    pub fn failed_before_start(target_url: &str, err: &ScanError) -> ScanResult {
        let mut state = ScanState::new();
        let mut result = ScanResult::new(target_url);
        let _ = state.fail();
        result.sync_state(&state);
        result.set_error(err);
        result.finalize();
        result
    }

    pub async fn run(&self, target_url: &str) -> ScanResult {
        let validator = UrlValidator::new(self.config.allow_internal);
        let seed = match validator.parse(target_url) {
            Ok(url) => url,
            Err(e) => return self.reject(target_url, e.into()),
        };

        let mut state = ScanState::new();
        let mut result = ScanResult::new(target_url);

        // Resolving the seed counts against the overall budget.
        let budget = self.config.timeout;
        let scan = async {
            validator.check_resolved(&seed).await.map_err(ScanError::from)?;
            info!("scanning {}", seed);
            Ok::<_, ScanError>(self.run_phases(&seed, &mut state, &mut result).await)
        };
        let outcome = if budget == 0 {
            Ok(scan.await)
        } else {
            timeout(Duration::from_secs(budget), scan).await
        };

        let failure = match outcome {
            Ok(Err(e)) => return self.reject(target_url, e),
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e),
            Err(_) => Some(ScanError::Timeout(budget)),
        };

        match failure {
            None => {
                let _ = state.complete();
                result.sync_state(&state);
                self.sink.on_progress(ScanPhase::Finalize, 100);
            }
            Some(e) => {
                warn!("scan of {} failed: {}", target_url, e);
                let _ = state.fail();
                result.sync_state(&state);
                result.set_error(&e);
                self.sink.on_log("error", &format!("[!] Scan failed: {}", e));
            }
        }

        if self.throttle.total_throttled() > 0 {
            info!("target throttled {} request(s)", self.throttle.total_throttled());
        }
        result.finalize();
        result
    }

    /// The target failed validation; nothing was fetched.
    fn reject(&self, target_url: &str, err: ScanError) -> ScanResult {
        warn!("rejected target {}: {}", target_url, err);
        self.sink.on_log("error", &format!("[!] {}", err));
        Self::failed_before_start(target_url, &err)
    }

    fn enter(&self, phase: ScanPhase, state: &mut ScanState, result: &mut ScanResult) -> Result<(), ScanError> {
        state.enter(phase).map_err(|e| ScanError::Internal {
            phase,
            message: e.to_string(),
        })?;
        result.sync_state(state);
        debug!("entering phase {}", phase);
        self.sink.on_progress(phase, phase.progress_percent());
        Ok(())
    }

    async fn run_phases(&self, seed: &Url, state: &mut ScanState, result: &mut ScanResult) -> Result<(), ScanError> {
        self.enter(ScanPhase::FetchSeed, state, result)?;
        let page = self.fetcher.fetch(seed.as_str()).await?;
        let page_url = Url::parse(&page.url).unwrap_or_else(|_| seed.clone());
        let page_origin = origin_of(&page_url);

        self.enter(ScanPhase::ExtractJs, state, result)?;
        let targets = if self.config.enable_js_extraction {
            let extractor = JsExtractor::new().map_err(|e| internal(ScanPhase::ExtractJs, e))?;
            extractor.extract(&page.body, &page_url, self.config.max_js_files)
        } else {
            Vec::new()
        };
        self.sink.on_log("info", &format!("[*] Found {} script(s)", targets.len()));

        self.enter(ScanPhase::FetchJs, state, result)?;
        self.fetch_scripts(targets, result).await;

        self.enter(ScanPhase::ExtractApis, state, result)?;
        if self.config.enable_api_discovery {
            self.extract_apis(&page_origin, result).await?;
            self.sink
                .on_log("info", &format!("[*] Composed {} candidate API(s)", result.apis.len()));
        }

        self.enter(ScanPhase::AggregateServices, state, result)?;
        if self.config.enable_microservice_detection {
            let fingerprinter = match self.fingerprinter {
                Some(ref fp) => Arc::clone(fp),
                None => Arc::new(
                    SignatureFingerprinter::new().map_err(|e| internal(ScanPhase::AggregateServices, e))?,
                ),
            };
            result.microservices =
                MicroserviceAggregator::new(fingerprinter).aggregate(&result.apis, &result.js_resources);
        }

        self.enter(ScanPhase::DetectIssues, state, result)?;
        let detector = self.build_detector()?;
        if !detector.is_empty() {
            let ctx = CheckContext {
                resources: &result.js_resources,
                apis: &result.apis,
            };
            let issues = detector.detect(&ctx).await;
            for issue in &issues {
                self.sink.on_issue(issue);
            }
            annotate_vulnerabilities(&mut result.microservices, &result.apis, &issues);
            result.security_issues = issues;
            result.security_issues.sort_by_key(|i| i.severity);
        }

        self.enter(ScanPhase::Finalize, state, result)?;
        Ok(())
    }

    /// Fetches scripts with bounded concurrency, in discovery order.
    /// Failed fetches are recorded and dropped.
    async fn fetch_scripts(&self, targets: Vec<ScriptTarget>, result: &mut ScanResult) {
        let concurrency = self.config.concurrency.max(1);
        let mut fetched = stream::iter(targets)
            .map(|target| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let response = fetcher.fetch(&target.url).await;
                    (target, response)
                }
            })
            .buffered(concurrency);

        while let Some((target, response)) = fetched.next().await {
            match response {
                Ok(resp) => {
                    debug!("fetched {} ({} bytes)", target.url, resp.body.len());
                    result
                        .js_resources
                        .push(JsResource::new(&target.url, target.method, resp.body));
                }
                Err(e) => {
                    warn!("skipping {}: {}", target.url, e);
                    result.record_failure(&target.url, ScanPhase::FetchJs, &ScanError::Fetch(e));
                }
            }
        }
    }

    /// Mines each script on the blocking pool and merges in script order,
    /// so the first script to mention an endpoint owns it.
    async fn extract_apis(&self, page_origin: &str, result: &mut ScanResult) -> Result<(), ScanError> {
        let mut extractor = ApiExtractor::new()
            .map_err(|e| internal(ScanPhase::ExtractApis, e))?
            .with_limit(self.config.max_apis);
        if self.config.use_ai {
            let enricher = match self.enricher {
                Some(ref e) => Arc::clone(e),
                None => Arc::new(ConcatenationEnricher::new().map_err(|e| internal(ScanPhase::ExtractApis, e))?),
            };
            extractor = extractor.with_enricher(enricher);
        }
        let extractor = Arc::new(extractor);

        let jobs: Vec<(String, Arc<str>)> = result
            .js_resources
            .iter()
            .map(|r| (r.url.clone(), Arc::clone(&r.content)))
            .collect();

        let mut extracted = stream::iter(jobs)
            .map(|(url, content)| {
                let extractor = Arc::clone(&extractor);
                let origin = page_origin.to_string();
                async move {
                    let source = url.clone();
                    let joined =
                        tokio::task::spawn_blocking(move || extractor.extract(&content, &origin, &source)).await;
                    (url, joined)
                }
            })
            .buffered(self.config.concurrency.max(1));

        let mut collector = ApiCollector::with_limit(self.config.max_apis);
        while let Some((url, joined)) = extracted.next().await {
            let apis = match joined {
                Ok(Ok(apis)) => apis,
                Ok(Err(e)) if e.is_recoverable() => {
                    warn!("skipping {}: {}", url, e);
                    result.record_failure(&url, ScanPhase::ExtractApis, &e);
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(internal(ScanPhase::ExtractApis, e)),
            };
            for api in apis {
                if collector.admit(&api) {
                    result.apis.push(api);
                }
            }
            if collector.is_full() {
                info!("API cap of {} reached", self.config.max_apis);
                break;
            }
        }
        Ok(())
    }

    fn build_detector(&self) -> Result<IssueDetector, ScanError> {
        let mut checks: Vec<Box<dyn IssueCheck>> = Vec::new();
        if self.config.enable_sensitive_info_check {
            checks.push(Box::new(SensitiveDataCheck));
        }
        if self.config.enable_unauthorized_check {
            checks.push(Box::new(UnauthorizedAccessCheck::new(
                Arc::clone(&self.fetcher),
                self.config.max_probes,
                self.config.concurrency,
            )));
        }
        if self.config.enable_component_check {
            checks.push(Box::new(
                ComponentCheck::new().map_err(|e| internal(ScanPhase::DetectIssues, e))?,
            ));
        }
        Ok(IssueDetector::new(checks))
    }
}

fn internal(phase: ScanPhase, err: impl std::fmt::Display) -> ScanError {
    ScanError::Internal {
        phase,
        message: err.to_string(),
    }
}
