//! Execution of validated test cases.
//!
//! [`single::SmokeTest`] runs one call through the comparator pipeline,
//! [`chain::ChainedTest`] sequences steps and threads their results, and
//! [`suite::SuiteRunner`] drives a whole suite file.

pub mod chain;
pub mod display;
pub mod report;
pub mod result;
pub mod single;
pub mod suite;

use thiserror::Error;

use crate::client::TransportError;
use crate::expr::ExprError;
use crate::matcher::MatchError;

/// Failures that abort the rest of a suite file.
///
/// Comparator mismatches are not errors; they end up as failed
/// [`result::StepResult`]s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("authentication step '{step}' failed: {source}")]
    AuthExpression {
        step: String,
        #[source]
        source: ExprError,
    },

    #[error("authentication step '{step}' failed: {message}")]
    Auth { step: String, message: String },
}
