//! Integration tests: convert recorded exchanges into suite files and
//! replay the result.

use std::path::PathBuf;

use chain_smoker::capture::{CaptureConverter, CaptureOutput, CaptureRecord, RewriteConfig};
use chain_smoker::client::testing::ScriptedTransport;
use chain_smoker::client::{ApiResponse, Method};
use chain_smoker::config;
use chain_smoker::runner::suite::SuiteRunner;
use serde_json::json;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn login_record() -> CaptureRecord {
    CaptureRecord::parse(&std::fs::read_to_string(fixture_path("capture_login.json")).unwrap()).unwrap()
}

fn converter() -> CaptureConverter {
    CaptureConverter::new(RewriteConfig::from_file(&fixture_path("capture_rewrite.yaml")).unwrap())
}

#[test]
fn captured_login_becomes_a_suite() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("login.yaml");
    let output = converter().write(&login_record(), &target).unwrap();

    let CaptureOutput::Suite { test_name, .. } = output else {
        panic!("record was skipped");
    };
    assert_eq!(test_name, "post-localhost__api__login");

    let suite = config::load_file(&target).unwrap();
    assert_eq!(suite.client.base_url, "http://localhost:8080");
    let test = &suite.tests[0];
    assert_eq!(test.name, test_name);
    assert_eq!(test.method, Method::Post);
    assert_eq!(test.endpoint, "/api/login?next=home");
    assert_eq!(test.payload, Some(json!({"user": "ann", "password": "***"})));
    assert_eq!(test.contains, Some(json!({"user": "ann"})));
    assert_eq!(test.expects_status_code, Some(200));
    assert_eq!(test.headers["X-Smoke"], "1");
    assert_eq!(test.headers["Content-Type"], "application/json");
}

#[test]
fn captured_suite_replays_against_the_same_response() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("login.yaml");
    converter().write(&login_record(), &target).unwrap();
    let suite = config::load_file(&target).unwrap();

    let transport = ScriptedTransport::new(vec![
        ApiResponse::new(200).with_json(&json!({"token": "fresh", "user": "ann"})),
    ]);
    let result = SuiteRunner::from_suite("login.yaml", suite, Box::new(transport.clone())).run();

    assert!(result.success(), "{result:?}");
    let request = &transport.requests()[0];
    assert_eq!(request.url, "http://localhost:8080/api/login?next=home");
    assert_eq!(request.header("x-smoke"), Some("1"));
}

#[test]
fn skipped_files_are_not_written() {
    let mut record = login_record();
    record.request.path = "https://example.com/static/site.css".into();
    record.request.method = "get".into();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("site.yaml");
    let output = converter().write(&record, &target).unwrap();

    assert_eq!(
        output,
        CaptureOutput::Skipped {
            method: "GET".into(),
            path: "/static/site.css".into(),
        }
    );
    assert!(!target.exists());
}

#[test]
fn missing_rewrite_file_means_no_rewriting() {
    let rewrite = RewriteConfig::from_file(&fixture_path("no_such_rewrite.yaml")).unwrap();
    assert_eq!(rewrite, RewriteConfig::default());
}
