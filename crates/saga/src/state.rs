//! Outcomes of saga steps.

use serde::{Deserialize, Serialize};

/// How a step ended.
///
/// Core steps either complete or abort the saga. Best-effort steps can end
/// in any state without affecting the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// The step had nothing to do.
    Skipped,
    Failed,
    /// The step panicked and was contained.
    Crashed,
}

impl StepStatus {
    /// Returns true if the step did its work or had none to do.
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
            StepStatus::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The recorded outcome of one named step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub status: StepStatus,
    pub detail: Option<String>,
}

impl StepReport {
    pub fn completed(step: &'static str, detail: Option<String>) -> Self {
        Self {
            step,
            status: StepStatus::Completed,
            detail,
        }
    }

    pub fn skipped(step: &'static str, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(step: &'static str, reason: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            detail: Some(reason.into()),
        }
    }

    pub fn crashed(step: &'static str) -> Self {
        Self {
            step,
            status: StepStatus::Crashed,
            detail: None,
        }
    }
}
