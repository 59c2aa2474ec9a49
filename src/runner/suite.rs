use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::client::{ApiClient, Transport};
use crate::config::{self, CaseKind, ConfigError, Headers, TestSuite};
use crate::runner::RunError;
use crate::runner::chain::ChainedTest;
use crate::runner::result::{CaseResult, StepStatus};
use crate::runner::single::SmokeTest;

/// Runs every case of one suite against one client.
pub struct SuiteRunner {
    source: String,
    suite: TestSuite,
    client: ApiClient,
}

/// Result of running one suite file.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteResult {
    pub source: String,
    pub duration: Duration,
    pub cases: Vec<CaseResult>,
    /// Set when the file could not be loaded or a run was aborted.
    pub error: Option<String>,
    pub summary: RunSummary,
}

/// Summary statistics over case results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl RunSummary {
    /// Whether every case passed.
    pub fn success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    pub fn from_cases(cases: &[CaseResult]) -> Self {
        let mut summary = Self {
            total: cases.len(),
            ..Self::default()
        };
        for case in cases {
            match case.status {
                StepStatus::Passed => summary.passed += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    /// Add another summary into this one.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.errors += other.errors;
    }
}

impl SuiteResult {
    /// A suite that never ran, e.g. because it failed to load.
    pub fn aborted(source: &str, error: String) -> Self {
        Self {
            source: source.to_owned(),
            duration: Duration::ZERO,
            cases: Vec::new(),
            error: Some(error),
            summary: RunSummary {
                total: 1,
                errors: 1,
                ..RunSummary::default()
            },
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.summary.success()
    }
}

impl SuiteRunner {
    pub fn new(source: impl Into<String>, suite: TestSuite, client: ApiClient) -> Self {
        Self {
            source: source.into(),
            suite,
            client,
        }
    }

    /// Load a suite file and bind it to a real HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let suite = config::load_file(path)?;
        let client = ApiClient::with_http(&suite.client);
        Ok(Self::new(path.display().to_string(), suite, client))
    }

    /// Bind an already loaded suite to `transport`.
    pub fn from_suite(source: impl Into<String>, suite: TestSuite, transport: Box<dyn Transport>) -> Self {
        let client = ApiClient::new(&suite.client, transport);
        Self::new(source, suite, client)
    }

    pub fn suite(&self) -> &TestSuite {
        &self.suite
    }

    /// Run every case in document order.
    ///
    /// A transport or authentication failure stops the file; the cases
    /// finished so far are kept and the error is recorded.
    pub fn run(&self) -> SuiteResult {
        tracing::info!("Running for {}:", self.source);
        let start = Instant::now();
        let env = self.suite.env_value();

        let mut cases = Vec::new();
        let mut error = None;
        for case in &self.suite.tests {
            let result = match &case.kind {
                CaseKind::Chain(_) => ChainedTest::build(case).run_case(&self.client, &env),
                _ => {
                    let session: Headers = self.client.default_headers();
                    let values = serde_json::Value::Object(serde_json::Map::new());
                    SmokeTest::build(case)
                        .run(&self.client, &session, &values, &env)
                        .map(CaseResult::single)
                }
            };
            match result {
                Ok(result) => cases.push(result),
                Err(e) => {
                    tracing::error!("{}: {e}", self.source);
                    error = Some(abort_message(&case.name, &e));
                    break;
                }
            }
        }

        let mut summary = RunSummary::from_cases(&cases);
        if error.is_some() {
            summary.total += 1;
            summary.errors += 1;
        }
        SuiteResult {
            source: self.source.clone(),
            duration: start.elapsed(),
            cases,
            error,
            summary,
        }
    }
}

fn abort_message(case: &str, error: &RunError) -> String {
    format!("{case}: {error}")
}

/// Suite files (`.yaml`/`.yml`) directly inside `dir`, sorted by name.
///
/// # Errors
///
/// Returns the I/O error if `dir` cannot be listed.
pub fn discover_suites(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_suite = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_suite && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load and run each file in turn. A file that fails to load or aborts
/// does not stop the others.
pub fn run_files(files: &[PathBuf]) -> Vec<SuiteResult> {
    files
        .iter()
        .map(|path| match SuiteRunner::from_file(path) {
            Ok(runner) => runner.run(),
            Err(e) => {
                let source = path.display().to_string();
                tracing::error!("{source}: {e}");
                SuiteResult::aborted(&source, e.to_string())
            }
        })
        .collect()
}
