use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use crate::client::ResponseCookie;
use crate::config::{CookieConfig, Expiry};

/// Allowed drift, in seconds, between an expected and a received cookie expiry.
pub const EXPIRY_TOLERANCE_SECS: i64 = 30;

/// Why a cookie-set check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieMismatch {
    /// A received cookie disagrees with an expected attribute.
    Attribute(String),
    /// Expected cookies absent from the response, by name.
    Missing(Vec<String>),
}

impl fmt::Display for CookieMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(detail) => f.write_str(detail),
            Self::Missing(names) => write!(f, "Did not find cookies {}", names.join(", ")),
        }
    }
}

/// Check every expected cookie against the received set.
///
/// Each received cookie named like an expected one must satisfy the
/// expected domain, value and max-age. The first attribute mismatch ends
/// the check. Expected cookies with no received counterpart are reported
/// together once every other cookie has been checked.
pub fn check_cookies(
    expected: &[CookieConfig],
    received: &[ResponseCookie],
    now: DateTime<Utc>,
) -> Result<(), CookieMismatch> {
    let mut not_found = Vec::new();

    for cookie in expected {
        let mut found = false;
        for candidate in received.iter().filter(|c| c.name == cookie.key) {
            found = true;
            check_one(cookie, candidate, now).map_err(CookieMismatch::Attribute)?;
        }
        if !found {
            not_found.push(cookie.key.clone());
        }
    }

    if not_found.is_empty() {
        Ok(())
    } else {
        Err(CookieMismatch::Missing(not_found))
    }
}

fn check_one(
    expected: &CookieConfig,
    received: &ResponseCookie,
    now: DateTime<Utc>,
) -> Result<(), String> {
    if expected.domain != received.domain {
        return Err(format!(
            "Domain: {}!={}",
            received.domain, expected.domain
        ));
    }
    if let Some(value) = &expected.value
        && *value != received.value
    {
        return Err(format!("{}!={value}", received.value));
    }
    let Some(max_age) = &expected.max_age else {
        return Ok(());
    };

    match (max_age.resolve(now), received.expires) {
        (Expiry::Session, None) => Ok(()),
        (Expiry::Session, Some(expires)) => Err(format!(
            "Received for cookie \"{}\" expiration of \"{}\", expected \"session\"",
            expected.key,
            expires.to_rfc3339()
        )),
        (Expiry::At(_), None) => Err(format!(
            "Received for cookie \"{}\" expiration of \"session\", expected \"{max_age}\"",
            expected.key
        )),
        (Expiry::At(want), Some(expires)) => {
            if (expires - want).abs() < TimeDelta::seconds(EXPIRY_TOLERANCE_SECS) {
                Ok(())
            } else {
                Err(format!(
                    "{}!={}",
                    expires.to_rfc3339(),
                    want.to_rfc3339()
                ))
            }
        }
    }
}
