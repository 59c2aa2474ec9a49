//! Comparators that judge one HTTP interaction against expected values.
//!
//! A mismatch is not an error: [`Comparator::test`] returns a
//! [`MatchOutcome`] with `passed = false` and a diagnostic, and logs it.
//! [`MatchError`] is reserved for comparisons that cannot be made at all.

pub mod cookies;
pub mod structural;

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::client::ResponseCookie;
use crate::config::CookieConfig;

use self::cookies::CookieMismatch;
use self::structural::{Polarity, containment, values_equal};

/// What a comparator checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Equals,
    Contains,
    ContainsNot,
    StatusEquals,
    CookieSet,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals => write!(f, "expected"),
            Self::Contains => write!(f, "contains"),
            Self::ContainsNot => write!(f, "contains_not"),
            Self::StatusEquals => write!(f, "expects_status_code"),
            Self::CookieSet => write!(f, "response_cookies"),
        }
    }
}

/// Comparisons that cannot be performed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("inverse {mode} comparison is not implemented")]
    NotImplemented { mode: Mode },

    #[error("{mode} comparator cannot judge a received {received}")]
    Unsupported { mode: Mode, received: &'static str },
}

/// The expected side of a comparator. The variant fixes the mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Equals(Value),
    Contains(Value),
    ContainsNot(Value),
    Status(u16),
    Cookies(Vec<CookieConfig>),
}

impl Expected {
    fn mode(&self) -> Mode {
        match self {
            Self::Equals(_) => Mode::Equals,
            Self::Contains(_) => Mode::Contains,
            Self::ContainsNot(_) => Mode::ContainsNot,
            Self::Status(_) => Mode::StatusEquals,
            Self::Cookies(_) => Mode::CookieSet,
        }
    }
}

/// The received side handed to [`Comparator::test`].
#[derive(Debug, Clone, Copy)]
pub enum Received<'a> {
    Value(&'a Value),
    Status(u16),
    Cookies(&'a [ResponseCookie]),
}

impl Received<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Status(_) => "status code",
            Self::Cookies(_) => "cookie set",
        }
    }
}

/// Diagnostic context: the test name and a printable call description.
#[derive(Debug, Clone, Copy)]
pub struct Label<'a> {
    pub name: &'a str,
    pub call: &'a str,
}

/// Verdict of one comparator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub mode: Mode,
    pub passed: bool,
    pub message: Option<String>,
}

impl MatchOutcome {
    fn pass(mode: Mode) -> Self {
        Self {
            mode,
            passed: true,
            message: None,
        }
    }

    fn fail(mode: Mode, message: String) -> Self {
        Self {
            mode,
            passed: false,
            message: Some(message),
        }
    }
}

/// A single comparator: the expected side and an inverse flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparator {
    expected: Expected,
    inverse: bool,
}

impl Comparator {
    pub fn equals(expected: Value) -> Self {
        Self::new(Expected::Equals(expected))
    }

    pub fn contains(expected: Value) -> Self {
        Self::new(Expected::Contains(expected))
    }

    pub fn contains_not(expected: Value) -> Self {
        Self::new(Expected::ContainsNot(expected))
    }

    pub fn status(code: u16) -> Self {
        Self::new(Expected::Status(code))
    }

    pub fn cookies(expected: Vec<CookieConfig>) -> Self {
        Self::new(Expected::Cookies(expected))
    }

    fn new(expected: Expected) -> Self {
        Self {
            expected,
            inverse: false,
        }
    }

    /// Flip the verdict.
    ///
    /// `Contains` turns into `ContainsNot` and back; equality and status
    /// comparators negate their verdict.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::NotImplemented`] for cookie-set comparators.
    pub fn inverse(self) -> Result<Self, MatchError> {
        let (expected, inverse) = match self.expected {
            Expected::Contains(value) => (Expected::ContainsNot(value), self.inverse),
            Expected::ContainsNot(value) => (Expected::Contains(value), self.inverse),
            expected @ (Expected::Equals(_) | Expected::Status(_)) => (expected, !self.inverse),
            Expected::Cookies(_) => {
                return Err(MatchError::NotImplemented {
                    mode: Mode::CookieSet,
                });
            }
        };
        Ok(Self { expected, inverse })
    }

    pub fn mode(&self) -> Mode {
        self.expected.mode()
    }

    pub fn expected(&self) -> &Expected {
        &self.expected
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    /// Judge `received`, logging the diagnostic on mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Unsupported`] when `received` is not the kind
    /// of value this comparator judges.
    pub fn test(&self, received: Received<'_>, label: Label<'_>) -> Result<MatchOutcome, MatchError> {
        self.test_at(received, label, Utc::now())
    }

    /// Like [`Comparator::test`] with an explicit clock for max-age resolution.
    ///
    /// # Errors
    ///
    /// See [`Comparator::test`].
    pub fn test_at(
        &self,
        received: Received<'_>,
        label: Label<'_>,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, MatchError> {
        let mode = self.mode();
        let outcome = match (&self.expected, received) {
            (Expected::Equals(expected), Received::Value(got)) => {
                let differs = !values_equal(got, expected);
                self.verdict(differs, label, &format!("Unexpected result for {}!\n{got}", label.name), expected)
            }
            (Expected::Contains(expected), Received::Value(got)) => {
                judge_containment(mode, expected, got, Polarity::Present, label)
            }
            (Expected::ContainsNot(expected), Received::Value(got)) => {
                judge_containment(mode, expected, got, Polarity::Absent, label)
            }
            (Expected::Status(expected), Received::Status(got)) => self.verdict(
                got != *expected,
                label,
                &format!("Unexpected status_code for {}!\n{got}", label.name),
                expected,
            ),
            (Expected::Cookies(expected), Received::Cookies(got)) => {
                match cookies::check_cookies(expected, got, now) {
                    Ok(()) => MatchOutcome::pass(mode),
                    Err(missing @ CookieMismatch::Missing(_)) => MatchOutcome::fail(mode, missing.to_string()),
                    Err(CookieMismatch::Attribute(detail)) => MatchOutcome::fail(
                        mode,
                        format!("Unexpected result for {}!\n{detail}\n{}", label.name, label.call),
                    ),
                }
            }
            (_, other) => {
                return Err(MatchError::Unsupported {
                    mode,
                    received: other.kind(),
                });
            }
        };

        if let Some(message) = &outcome.message {
            tracing::error!("{message}");
        }
        Ok(outcome)
    }

    /// Equality-style verdict: fails when `differs` disagrees with the
    /// inverse flag. `head` is the first part of the diagnostic.
    fn verdict(&self, differs: bool, label: Label<'_>, head: &str, expected: &impl fmt::Display) -> MatchOutcome {
        if differs == self.inverse {
            return MatchOutcome::pass(self.mode());
        }
        let op = if self.inverse { "==" } else { "!=" };
        MatchOutcome::fail(self.mode(), format!("{head}\n{op}\n{expected}\n{}", label.call))
    }
}

fn judge_containment(mode: Mode, expected: &Value, got: &Value, polarity: Polarity, label: Label<'_>) -> MatchOutcome {
    let failures = containment(expected, got, polarity);
    if failures.is_empty() {
        MatchOutcome::pass(mode)
    } else {
        MatchOutcome::fail(
            mode,
            format!(
                "Unexpected result for {}!\n{}\n{}",
                label.name,
                failures.join("\n"),
                label.call
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    const LABEL: Label<'static> = Label {
        name: "get-items",
        call: "GET /items",
    };

    fn passes(comparator: &Comparator, received: Received<'_>) -> bool {
        comparator.test(received, LABEL).unwrap().passed
    }

    #[test]
    fn equals_and_its_inverse_are_negations() {
        let cases = [
            (json!(1), json!(1)),
            (json!(1), json!(2)),
            (json!(1), json!("1")),
            (json!("foo"), json!("foo")),
            (json!({"id": 1}), json!({"id": 2})),
        ];
        for (expected, got) in cases {
            let plain = Comparator::equals(expected.clone());
            let inverse = Comparator::equals(expected).inverse().unwrap();
            assert_ne!(
                passes(&plain, Received::Value(&got)),
                passes(&inverse, Received::Value(&got))
            );
        }
    }

    #[test]
    fn equals_mismatch_message() {
        let outcome = Comparator::equals(json!({"id": 1}))
            .test(Received::Value(&json!({"id": 2})), LABEL)
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Unexpected result for get-items!\n{\"id\":2}\n!=\n{\"id\":1}\nGET /items")
        );
    }

    #[test]
    fn status_and_inverse() {
        let ok = Comparator::status(200);
        assert!(passes(&ok, Received::Status(200)));
        assert!(!passes(&ok, Received::Status(400)));

        let not_ok = Comparator::status(200).inverse().unwrap();
        assert!(!passes(&not_ok, Received::Status(200)));
        assert!(passes(&not_ok, Received::Status(400)));
    }

    #[test]
    fn status_mismatch_message() {
        let outcome = Comparator::status(200)
            .test(Received::Status(404), LABEL)
            .unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Unexpected status_code for get-items!\n404\n!=\n200\nGET /items")
        );
    }

    #[test]
    fn contains_inverse_is_contains_not() {
        let comparator = Comparator::contains(json!("Foo")).inverse().unwrap();
        assert_eq!(comparator.mode(), Mode::ContainsNot);
        assert!(passes(&comparator, Received::Value(&json!("Bar"))));
        assert!(!passes(&comparator, Received::Value(&json!("Foo bar"))));

        let back = comparator.inverse().unwrap();
        assert_eq!(back.mode(), Mode::Contains);
    }

    #[test]
    fn contains_and_contains_not_are_dual_for_single_level_mappings() {
        let cases = [
            (json!({"a": 1}), json!({"a": 1, "b": 2})),
            (json!({"a": 1}), json!({"a": 2})),
            (json!("x"), json!("xyz")),
            (json!("q"), json!("xyz")),
        ];
        for (expected, got) in cases {
            let pos = passes(&Comparator::contains(expected.clone()), Received::Value(&got));
            let neg = passes(&Comparator::contains_not(expected), Received::Value(&got));
            assert_ne!(pos, neg);
        }
    }

    #[test]
    fn contains_failure_message_lists_every_leaf() {
        let outcome = Comparator::contains(json!(["a", "b"]))
            .test(Received::Value(&json!({"c": 1})), LABEL)
            .unwrap();
        let message = outcome.message.unwrap();
        assert!(message.starts_with("Unexpected result for get-items!\n"));
        assert!(message.contains("a not found in"));
        assert!(message.contains("b not found in"));
        assert!(message.ends_with("GET /items"));
    }

    #[test]
    fn cookie_inverse_not_implemented() {
        let err = Comparator::cookies(vec![]).inverse().unwrap_err();
        assert_eq!(err, MatchError::NotImplemented { mode: Mode::CookieSet });
    }

    #[test]
    fn cookies_use_the_given_clock() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expected = CookieConfig::new("example.com", "sid").with_max_age("5m".parse().unwrap());
        let got = [ResponseCookie {
            name: "sid".into(),
            value: "x".into(),
            domain: "example.com".into(),
            path: None,
            expires: Some(now + TimeDelta::minutes(5)),
        }];
        let outcome = Comparator::cookies(vec![expected])
            .test_at(Received::Cookies(&got), LABEL, now)
            .unwrap();
        assert!(outcome.passed);
    }

    #[test]
    fn missing_cookie_message_is_aggregated() {
        let outcome = Comparator::cookies(vec![CookieConfig::new("example.com", "sid")])
            .test(Received::Cookies(&[]), LABEL)
            .unwrap();
        assert_eq!(outcome.message.as_deref(), Some("Did not find cookies sid"));
    }

    #[test]
    fn mismatched_received_kind_is_unsupported() {
        let err = Comparator::status(200)
            .test(Received::Value(&json!(200)), LABEL)
            .unwrap_err();
        assert_eq!(
            err,
            MatchError::Unsupported {
                mode: Mode::StatusEquals,
                received: "value",
            }
        );
    }

    #[test]
    fn value_comparators_reject_cookie_sets() {
        for comparator in [
            Comparator::equals(json!({})),
            Comparator::contains(json!("sid")),
            Comparator::contains_not(json!("sid")),
        ] {
            let mode = comparator.mode();
            let err = comparator.test(Received::Cookies(&[]), LABEL).unwrap_err();
            assert_eq!(
                err,
                MatchError::Unsupported {
                    mode,
                    received: "cookie set",
                }
            );
        }
    }

    #[test]
    fn inverse_keeps_expected_value() {
        let comparator = Comparator::contains(json!({"a": 1})).inverse().unwrap();
        assert_eq!(comparator.expected(), &Expected::ContainsNot(json!({"a": 1})));
        let comparator = Comparator::equals(json!(1)).inverse().unwrap();
        assert_eq!(comparator.expected(), &Expected::Equals(json!(1)));
        assert!(comparator.is_inverse());
    }
}
