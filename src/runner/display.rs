use std::time::Duration;

use crate::runner::result::{CaseResult, StepResult, StepStatus};
use crate::runner::suite::{RunSummary, SuiteResult};

/// Format a status label for terminal output.
fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Passed => "PASSED",
        StepStatus::Failed => "FAILED",
        StepStatus::Error => "ERROR",
    }
}

/// Format the header line for a suite file.
pub fn format_run_header(source: &str) -> String {
    format!("Running {source}...\n")
}

fn format_step(step: &StepResult) -> String {
    let status = status_label(step.status);
    let mut line = format!(
        "      [{status}] {} ({:.1}s)",
        step.name,
        step.duration.as_secs_f64()
    );
    if step.authentication {
        line.push_str(" [auth]");
    }
    line
}

/// Format a case result as it completes.
///
/// Chains list their steps. The first line of a failure message follows
/// an arrow; `verbose` prints the whole message.
pub fn format_case_result(case: &CaseResult, verbose: bool) -> String {
    let status = status_label(case.status);
    let mut line = format!(
        "  [{status}] {} ({:.1}s)",
        case.name,
        case.duration.as_secs_f64()
    );

    if case.chained {
        for step in &case.steps {
            line.push('\n');
            line.push_str(&format_step(step));
        }
    }

    if let Some(err) = &case.error {
        let message = if verbose {
            err.message.as_str()
        } else {
            err.message.lines().next().unwrap_or_default()
        };
        line.push_str(&format!("\n         → {message}"));
    }

    line
}

/// Format the summary line.
pub fn format_summary(summary: &RunSummary, duration: Duration) -> String {
    let mut parts = Vec::new();

    if summary.passed > 0 {
        parts.push(format!("{} passed", summary.passed));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.errors > 0 {
        parts.push(format!("{} errors", summary.errors));
    }

    if parts.is_empty() {
        parts.push("0 tests".into());
    }

    format!("\nResults: {} ({:.1}s)", parts.join(", "), duration.as_secs_f64())
}

/// Format one suite: header, each case, and its error if it was aborted.
pub fn format_suite(result: &SuiteResult, verbose: bool) -> String {
    let mut out = format_run_header(&result.source);
    for case in &result.cases {
        out.push_str(&format_case_result(case, verbose));
        out.push('\n');
    }
    if let Some(error) = &result.error {
        out.push_str(&format!("  [ERROR] {error}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::result::{StepError, StepErrorKind};
    use serde_json::json;

    fn failed(name: &str, message: &str) -> StepResult {
        StepResult::failed(
            name,
            Duration::from_millis(800),
            StepError::new(StepErrorKind::AssertionFailed, message),
        )
    }

    #[test]
    fn display_case_passed_format() {
        let case = CaseResult::single(StepResult::passed("home", Duration::from_millis(1200), json!("ok")));
        let output = format_case_result(&case, false);
        assert_eq!(output, "  [PASSED] home (1.2s)");
    }

    #[test]
    fn display_case_failed_shows_first_line() {
        let case = CaseResult::single(failed(
            "home",
            "Unexpected status_code for home!\n404\n!=\n200\nGET /",
        ));
        let output = format_case_result(&case, false);
        assert!(output.contains("[FAILED] home"));
        assert!(output.contains("→ Unexpected status_code for home!"));
        assert!(!output.contains("GET /"));

        let verbose = format_case_result(&case, true);
        assert!(verbose.contains("GET /"));
    }

    #[test]
    fn display_chain_lists_steps() {
        let mut login = StepResult::passed("login", Duration::from_millis(100), json!({}));
        login.authentication = true;
        let case = CaseResult::chain(
            "flow",
            Duration::from_millis(300),
            vec![login, failed("me", "Unexpected result for me!")],
        );
        let output = format_case_result(&case, false);
        assert!(output.contains("[FAILED] flow (0.3s)"));
        assert!(output.contains("      [PASSED] login (0.1s) [auth]"));
        assert!(output.contains("      [FAILED] me (0.8s)"));
        assert!(output.contains("→ failed steps: me"));
    }

    #[test]
    fn display_summary_all_passed() {
        let summary = RunSummary {
            total: 4,
            passed: 4,
            failed: 0,
            errors: 0,
        };
        let output = format_summary(&summary, Duration::from_millis(2000));
        assert!(output.contains("4 passed"));
        assert!(!output.contains("failed"));
        assert!(output.contains("2.0s"));
    }

    #[test]
    fn display_summary_with_failures() {
        let summary = RunSummary {
            total: 4,
            passed: 1,
            failed: 2,
            errors: 1,
        };
        let output = format_summary(&summary, Duration::from_millis(3500));
        assert_eq!(output, "\nResults: 1 passed, 2 failed, 1 errors (3.5s)");
    }

    #[test]
    fn display_summary_empty() {
        let output = format_summary(&RunSummary::default(), Duration::ZERO);
        assert!(output.contains("0 tests"));
    }

    #[test]
    fn display_run_header_format() {
        assert_eq!(format_run_header("smoke/api.yaml"), "Running smoke/api.yaml...\n");
    }

    #[test]
    fn display_aborted_suite() {
        let result = SuiteResult::aborted("bad.yaml", "config.client: is required".into());
        let output = format_suite(&result, false);
        assert_eq!(output, "Running bad.yaml...\n  [ERROR] config.client: is required\n");
    }
}
