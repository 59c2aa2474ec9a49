use serde::{Deserialize, Serialize};

use crate::runner::result::{CaseResult, StepResult};
use crate::runner::suite::{RunSummary, SuiteResult};

/// Serializable results of one `run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub suites: Vec<SuiteReport>,
    pub summary: SummaryReport,
}

/// One suite file in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub source: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<CaseReport>,
    pub summary: SummaryReport,
}

/// A top-level test case in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub order: usize,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub chained: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionReport>,
}

/// A chain step in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub authentication: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionReport>,
}

/// Error detail in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

/// Comparator result in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionReport {
    pub text: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Summary statistics in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub success: bool,
}

impl From<&RunSummary> for SummaryReport {
    fn from(summary: &RunSummary) -> Self {
        Self {
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            errors: summary.errors,
            success: summary.success(),
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn assertions(step: &StepResult) -> Vec<AssertionReport> {
    step.assertions
        .iter()
        .map(|a| AssertionReport {
            text: a.text.clone(),
            passed: a.passed,
            message: a.message.clone(),
        })
        .collect()
}

fn error(step_error: Option<&crate::runner::result::StepError>) -> Option<ErrorReport> {
    step_error.map(|e| ErrorReport {
        kind: e.kind.to_string(),
        message: e.message.clone(),
    })
}

fn case_report(order: usize, case: &CaseResult) -> CaseReport {
    let (steps, assertions) = if case.chained {
        let steps = case
            .steps
            .iter()
            .map(|step| StepReport {
                name: step.name.clone(),
                status: step.status.to_string(),
                duration_ms: millis(step.duration),
                authentication: step.authentication,
                error: error(step.error.as_ref()),
                assertions: assertions(step),
            })
            .collect();
        (steps, Vec::new())
    } else {
        (Vec::new(), case.steps.iter().flat_map(assertions).collect())
    };

    CaseReport {
        order,
        name: case.name.clone(),
        status: case.status.to_string(),
        chained: case.chained,
        duration_ms: millis(case.duration),
        error: error(case.error.as_ref()),
        steps,
        assertions,
    }
}

/// Convert a [`SuiteResult`] into a serializable [`SuiteReport`].
pub fn to_report(result: &SuiteResult) -> SuiteReport {
    SuiteReport {
        source: result.source.clone(),
        duration_ms: millis(result.duration),
        error: result.error.clone(),
        cases: result
            .cases
            .iter()
            .enumerate()
            .map(|(i, case)| case_report(i + 1, case))
            .collect(),
        summary: SummaryReport::from(&result.summary),
    }
}

/// Collect several suite results into one [`RunReport`].
pub fn to_run_report(results: &[SuiteResult]) -> RunReport {
    let mut summary = RunSummary::default();
    for result in results {
        summary.merge(&result.summary);
    }
    RunReport {
        suites: results.iter().map(to_report).collect(),
        summary: SummaryReport::from(&summary),
    }
}

/// Emit run results as YAML.
pub fn emit_yaml(report: &RunReport) -> String {
    serde_yaml::to_string(report).unwrap_or_else(|e| format!("# Error serializing report: {e}"))
}

/// Emit run results as JSON.
pub fn emit_json(report: &RunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{ \"error\": \"{e}\" }}"))
}
