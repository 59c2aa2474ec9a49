use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// The outcome of one call or one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
    /// The step could not be judged, e.g. a `uses` expression failed.
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of one HTTP call, standalone or inside a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub duration: Duration,
    /// Parsed response content; present only when every comparator passed.
    pub content: Option<Value>,
    pub assertions: Vec<AssertionResult>,
    pub error: Option<StepError>,
    pub authentication: bool,
}

impl StepResult {
    /// Create a passing result carrying the response content.
    pub fn passed(name: &str, duration: Duration, content: Value) -> Self {
        Self {
            name: name.to_owned(),
            status: StepStatus::Passed,
            duration,
            content: Some(content),
            assertions: Vec::new(),
            error: None,
            authentication: false,
        }
    }

    /// Create a failing result.
    pub fn failed(name: &str, duration: Duration, error: StepError) -> Self {
        let status = match error.kind {
            StepErrorKind::AssertionFailed | StepErrorKind::ChainFailed => StepStatus::Failed,
            StepErrorKind::ExpressionFailed => StepStatus::Error,
        };
        Self {
            name: name.to_owned(),
            status,
            duration,
            content: None,
            assertions: Vec::new(),
            error: Some(error),
            authentication: false,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

/// Result of a single comparator within a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    /// The comparator, named after its config key (`contains`, ...).
    pub text: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// Why a step did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorKind {
    /// A comparator did not hold.
    AssertionFailed,
    /// A `uses` expression could not be evaluated.
    ExpressionFailed,
    /// One or more steps of a chain failed.
    ChainFailed,
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssertionFailed => write!(f, "assertion failed"),
            Self::ExpressionFailed => write!(f, "expression failed"),
            Self::ChainFailed => write!(f, "chain failed"),
        }
    }
}

/// Result of one top-level test case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub name: String,
    pub chained: bool,
    pub status: StepStatus,
    pub duration: Duration,
    /// One entry for a single call, one per step for a chain.
    pub steps: Vec<StepResult>,
    pub error: Option<StepError>,
}

impl CaseResult {
    /// Wrap the result of a non-chained case.
    pub fn single(step: StepResult) -> Self {
        Self {
            name: step.name.clone(),
            chained: false,
            status: step.status,
            duration: step.duration,
            error: step.error.clone(),
            steps: vec![step],
        }
    }

    /// Build a chain result; it fails if any non-authentication step did.
    pub fn chain(name: &str, duration: Duration, steps: Vec<StepResult>) -> Self {
        let failed: Vec<&str> = steps
            .iter()
            .filter(|s| !s.authentication && !s.is_passed())
            .map(|s| s.name.as_str())
            .collect();
        let error = (!failed.is_empty()).then(|| {
            StepError::new(
                StepErrorKind::ChainFailed,
                format!("failed steps: {}", failed.join(", ")),
            )
        });
        Self {
            name: name.to_owned(),
            chained: true,
            status: if error.is_some() {
                StepStatus::Failed
            } else {
                StepStatus::Passed
            },
            duration,
            steps,
            error,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}
