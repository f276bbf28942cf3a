//! Scan lifecycle state machine.
//!
//! A scan moves `pending → running(phase) → completed | failed`. Phases only
//! ever move forward; skipping phases is allowed (a disabled stage is simply
//! never entered) but going back is not. `completed` and `failed` are terminal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    FetchSeed,
    ExtractJs,
    FetchJs,
    ExtractApis,
    AggregateServices,
    DetectIssues,
    Finalize,
}

impl ScanPhase {
    pub const ALL: [ScanPhase; 7] = [
        ScanPhase::FetchSeed,
        ScanPhase::ExtractJs,
        ScanPhase::FetchJs,
        ScanPhase::ExtractApis,
        ScanPhase::AggregateServices,
        ScanPhase::DetectIssues,
        ScanPhase::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::FetchSeed => "fetch_seed",
            ScanPhase::ExtractJs => "extract_js",
            ScanPhase::FetchJs => "fetch_js",
            ScanPhase::ExtractApis => "extract_apis",
            ScanPhase::AggregateServices => "aggregate_services",
            ScanPhase::DetectIssues => "detect_issues",
            ScanPhase::Finalize => "finalize",
        }
    }

    /// Approximate completion percentage once this phase has started.
    /// Telemetry only.
    pub fn progress_percent(&self) -> u8 {
        match self {
            ScanPhase::FetchSeed => 5,
            ScanPhase::ExtractJs => 15,
            ScanPhase::FetchJs => 30,
            ScanPhase::ExtractApis => 55,
            ScanPhase::AggregateServices => 70,
            ScanPhase::DetectIssues => 80,
            ScanPhase::Finalize => 95,
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("scan already finished as {0}")]
    Terminal(ScanStatus),

    #[error("cannot move from {from} back to {to}")]
    Backwards { from: ScanPhase, to: ScanPhase },
}

/// Tracks where a scan is. Owned by the engine, copied into the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    status: ScanStatus,
    phase: Option<ScanPhase>,
}

impl ScanState {
    pub fn new() -> Self {
        Self {
            status: ScanStatus::Pending,
            phase: None,
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn phase(&self) -> Option<ScanPhase> {
        self.phase
    }

    /// Enters `phase`, switching a pending scan to running.
    pub fn enter(&mut self, phase: ScanPhase) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if let Some(current) = self.phase {
            if phase < current {
                return Err(TransitionError::Backwards { from: current, to: phase });
            }
        }
        self.status = ScanStatus::Running;
        self.phase = Some(phase);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.status = ScanStatus::Completed;
        Ok(())
    }

    /// Marks the scan failed. The phase it failed in is kept.
    pub fn fail(&mut self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.status = ScanStatus::Failed;
        Ok(())
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}
