use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::capture::{CaptureConverter, CaptureOutput, CaptureRecord, RewriteConfig};
use crate::config;
use crate::runner::display::{format_suite, format_summary};
use crate::runner::report::{emit_json, emit_yaml, to_run_report};
use crate::runner::suite::{RunSummary, SuiteResult, discover_suites, run_files};

/// Collect suite files from `dir` (if given) followed by explicit `files`.
fn collect_files(dir: Option<&Path>, files: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut all = match dir {
        Some(dir) => discover_suites(dir)
            .map_err(|e| format!("failed to read directory {}: {e}", dir.display()))?,
        None => Vec::new(),
    };
    all.extend(files.iter().cloned());
    if all.is_empty() {
        return Err("no suite files found".to_owned());
    }
    Ok(all)
}

/// Options for the `run` command.
pub struct RunOptions {
    pub dir: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    pub format: String,
    pub output: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dir: None,
            files: Vec::new(),
            format: "text".to_owned(),
            output: None,
            verbose: false,
        }
    }
}

/// Render results in the requested format.
///
/// # Errors
///
/// Returns an error string for an unknown format.
pub fn render_results(results: &[SuiteResult], format: &str, verbose: bool, started: Instant) -> Result<String, String> {
    match format {
        "text" => {
            let mut out = String::new();
            let mut summary = RunSummary::default();
            for result in results {
                out.push_str(&format_suite(result, verbose));
                summary.merge(&result.summary);
            }
            out.push_str(&format_summary(&summary, started.elapsed()));
            out.push('\n');
            Ok(out)
        }
        "yaml" => Ok(emit_yaml(&to_run_report(results))),
        "json" => Ok(emit_json(&to_run_report(results)) + "\n"),
        other => Err(format!("unknown format '{other}' (expected: text, yaml, json)")),
    }
}

/// Run the `run` command: execute every suite and emit results.
///
/// Returns `Ok(true)` if every suite passed, `Ok(false)` otherwise. A suite
/// that fails to load or aborts does not stop the others.
///
/// # Errors
///
/// Returns an error string if no suites are found, the format is unknown,
/// or the output file cannot be written.
pub fn run_run(options: &RunOptions) -> Result<bool, String> {
    // Reject a bad format before any request goes out.
    render_results(&[], &options.format, options.verbose, Instant::now())?;

    let files = collect_files(options.dir.as_deref(), &options.files)?;
    let started = Instant::now();
    let results = run_files(&files);
    let output = render_results(&results, &options.format, options.verbose, started)?;

    if let Some(out_path) = &options.output {
        std::fs::write(out_path, &output)
            .map_err(|e| format!("failed to write {}: {e}", out_path.display()))?;
        eprintln!("results written to {}", out_path.display());
    } else {
        print!("{output}");
    }

    Ok(results.iter().all(SuiteResult::success))
}

/// Run the `validate` command: load suites without sending requests.
///
/// Environment bindings are not resolved, so suites can be checked where
/// the variables are not set.
///
/// # Errors
///
/// Returns an error string naming the first invalid file.
pub fn run_validate(dir: Option<&Path>, files: &[PathBuf]) -> Result<String, String> {
    let files = collect_files(dir, files)?;
    let mut results = Vec::new();

    for file in &files {
        let input = std::fs::read_to_string(file)
            .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
        let suite = config::parse_with_env(&input, |var| Some(format!("${var}")))
            .map_err(|e| format!("{}: {e}", file.display()))?;

        let chains = suite.tests.iter().filter(|t| t.is_chain()).count();
        results.push(format!(
            "{}: valid ({} tests, {} chained)",
            file.display(),
            suite.tests.len(),
            chains,
        ));
    }

    Ok(results.join("\n"))
}

/// Run the `capture` command: turn a recorded exchange into a suite file.
///
/// # Errors
///
/// Returns an error string if the record or rewrite config cannot be read
/// or the suite cannot be written.
pub fn run_capture(record: &Path, output: &Path, rewrite: Option<&Path>) -> Result<String, String> {
    let raw = std::fs::read_to_string(record)
        .map_err(|e| format!("failed to read {}: {e}", record.display()))?;
    let record = CaptureRecord::parse(&raw).map_err(|e| e.to_string())?;

    let rewrite = match rewrite {
        Some(path) => RewriteConfig::from_file(path).map_err(|e| e.to_string())?,
        None => RewriteConfig::default(),
    };

    match CaptureConverter::new(rewrite)
        .write(&record, output)
        .map_err(|e| e.to_string())?
    {
        CaptureOutput::Suite { test_name, .. } => {
            Ok(format!("{test_name} written to {}", output.display()))
        }
        CaptureOutput::Skipped { method, path } => Ok(format!("skipped {method} {path}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = "\
type: api-test
config:
  client:
    base_url: https://example.com
  env:
    token: API_TOKEN
tests:
  home:
    endpoint: /
  flow:
    multi_step: true
    steps:
      - name: a
        endpoint: /a
";

    #[test]
    fn validate_reports_counts_without_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api.yaml"), SUITE).unwrap();
        let out = run_validate(Some(dir.path()), &[]).unwrap();
        assert!(out.ends_with("api.yaml: valid (2 tests, 1 chained)"), "{out}");
    }

    #[test]
    fn validate_names_the_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.yml");
        std::fs::write(&bad, "type: api-test\n").unwrap();
        let err = run_validate(None, &[bad]).unwrap_err();
        assert!(err.contains("bad.yml"));
        assert!(err.contains("config.client: is required"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_validate(Some(dir.path()), &[]).unwrap_err(), "no suite files found");
    }

    #[test]
    fn unknown_format_is_rejected_before_running() {
        let options = RunOptions {
            files: vec![PathBuf::from("never-read.yaml")],
            format: "xml".into(),
            ..RunOptions::default()
        };
        assert_eq!(
            run_run(&options).unwrap_err(),
            "unknown format 'xml' (expected: text, yaml, json)"
        );
    }

    #[test]
    fn text_output_has_summary() {
        let out = render_results(&[], "text", false, Instant::now()).unwrap();
        assert!(out.contains("Results: 0 tests"));
    }

    #[test]
    fn run_writes_report_for_unloadable_suite() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "type: api-test\n").unwrap();
        let out = dir.path().join("report.json");
        let options = RunOptions {
            files: vec![bad],
            format: "json".into(),
            output: Some(out.clone()),
            ..RunOptions::default()
        };
        assert!(!run_run(&options).unwrap());
        let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(report["summary"]["errors"], 1);
        assert_eq!(report["summary"]["success"], false);
    }

    #[test]
    fn capture_writes_suite() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record.json");
        std::fs::write(
            &record,
            r#"{"Request": {"Method": "get", "Path": "https://example.com/", "Payload": "", "Protocol": "HTTP/1.1", "Headers": {}},
                "Response": {"Status_code": 200, "Body": "<html>Example Domain</html>", "Headers": {}}}"#,
        )
        .unwrap();
        let target = dir.path().join("home.yaml");
        let msg = run_capture(&record, &target, None).unwrap();
        assert!(msg.starts_with("get-example_com__ written to"), "{msg}");
        let suite = config::load_file(&target).unwrap();
        assert_eq!(suite.tests[0].expects_status_code, Some(200));
    }
}
