use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A cookie sent with a request, or expected on a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    pub domain: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<MaxAge>,
}

impl CookieConfig {
    pub fn new(domain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
            value: None,
            path: None,
            max_age: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_max_age(mut self, max_age: MaxAge) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Unit suffix of a relative max-age such as `5m` or `2W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    /// `m`
    Minutes,
    /// `d` or `D`
    Days,
    /// `M`, four weeks
    Months,
    /// `W`
    Weeks,
}

impl AgeUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(Self::Minutes),
            'd' | 'D' => Some(Self::Days),
            'M' => Some(Self::Months),
            'W' => Some(Self::Weeks),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Minutes => 'm',
            Self::Days => 'd',
            Self::Months => 'M',
            Self::Weeks => 'W',
        }
    }

    fn delta(self, amount: i64) -> Option<TimeDelta> {
        match self {
            Self::Minutes => TimeDelta::try_minutes(amount),
            Self::Days => TimeDelta::try_days(amount),
            Self::Months => amount.checked_mul(4).and_then(TimeDelta::try_weeks),
            Self::Weeks => TimeDelta::try_weeks(amount),
        }
    }
}

/// Expected lifetime of a response cookie.
///
/// Written in suite files as `session` (any case), an absolute timestamp
/// (`2030-01-01T00:00:00+0000` or RFC 3339), or `<int><unit>` relative to
/// the moment of comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MaxAge {
    Session,
    At(DateTime<FixedOffset>),
    Relative { amount: i64, unit: AgeUnit },
}

/// A max-age resolved against a concrete "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The cookie must not carry an expiry.
    Session,
    At(DateTime<Utc>),
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

impl MaxAge {
    /// Resolve to an absolute expiry relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Expiry {
        match self {
            Self::Session => Expiry::Session,
            Self::At(at) => Expiry::At(at.with_timezone(&Utc)),
            Self::Relative { amount, unit } => {
                // Range was checked when the value was parsed.
                let delta = unit.delta(*amount).unwrap_or(TimeDelta::MAX);
                Expiry::At(now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
        }
    }
}

impl FromStr for MaxAge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("session") {
            return Ok(Self::Session);
        }
        if let Ok(at) = DateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
            return Ok(Self::At(at));
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::At(at));
        }

        let Some(last) = s.chars().last() else {
            return Err("max_age must not be empty".to_owned());
        };
        let Some(unit) = AgeUnit::from_suffix(last) else {
            return Err(format!(
                "unsupported max_age '{s}' (expected: session, a timestamp, or <int> followed by m, d, D, W, M)"
            ));
        };
        let amount: i64 = s[..s.len() - last.len_utf8()]
            .parse()
            .map_err(|_| format!("invalid max_age amount in '{s}'"))?;
        if unit.delta(amount).is_none() {
            return Err(format!("max_age '{s}' is out of range"));
        }
        Ok(Self::Relative { amount, unit })
    }
}

impl fmt::Display for MaxAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::At(at) => write!(f, "{}", at.format(TIMESTAMP_FORMAT)),
            Self::Relative { amount, unit } => write!(f, "{amount}{}", unit.suffix()),
        }
    }
}

impl TryFrom<String> for MaxAge {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MaxAge> for String {
    fn from(max_age: MaxAge) -> Self {
        max_age.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn session_is_case_insensitive() {
        assert_eq!("session".parse::<MaxAge>().unwrap(), MaxAge::Session);
        assert_eq!("Session".parse::<MaxAge>().unwrap(), MaxAge::Session);
        assert_eq!(MaxAge::Session.resolve(now()), Expiry::Session);
    }

    #[test]
    fn relative_units_resolve_from_now() {
        let cases = [
            ("5m", TimeDelta::minutes(5)),
            ("5d", TimeDelta::days(5)),
            ("5D", TimeDelta::days(5)),
            ("5W", TimeDelta::weeks(5)),
            ("5M", TimeDelta::weeks(20)),
        ];
        for (input, delta) in cases {
            let max_age: MaxAge = input.parse().unwrap();
            assert_eq!(max_age.resolve(now()), Expiry::At(now() + delta), "{input}");
        }
    }

    #[test]
    fn absolute_timestamp_resolves_to_exact_instant() {
        let max_age: MaxAge = "2030-01-02T03:04:05+0000".parse().unwrap();
        assert_eq!(
            max_age.resolve(now()),
            Expiry::At(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn rfc3339_timestamp_accepted() {
        let max_age: MaxAge = "2030-01-02T03:04:05+02:00".parse().unwrap();
        assert_eq!(
            max_age.resolve(now()),
            Expiry::At(Utc.with_ymd_and_hms(2030, 1, 2, 1, 4, 5).unwrap())
        );
    }

    #[test]
    fn unknown_unit_rejected() {
        let err = "5y".parse::<MaxAge>().unwrap_err();
        assert!(err.contains("unsupported max_age"));
        // minutes are lowercase only; `w` is not a unit
        assert!("5w".parse::<MaxAge>().is_err());
    }

    #[test]
    fn bad_amount_rejected() {
        assert!("xm".parse::<MaxAge>().is_err());
        assert!("".parse::<MaxAge>().is_err());
        assert!("99999999999999999W".parse::<MaxAge>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for input in ["session", "5m", "3d", "2W", "1M", "2030-01-02T03:04:05+0000"] {
            let max_age: MaxAge = input.parse().unwrap();
            assert_eq!(max_age.to_string(), input);
        }
    }

    #[test]
    fn cookie_config_deserializes_from_yaml() {
        let yaml = "domain: example.com\nkey: sid\nvalue: abc\nmax_age: 5m\n";
        let cookie: CookieConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.key, "sid");
        assert_eq!(cookie.value.as_deref(), Some("abc"));
        assert_eq!(
            cookie.max_age,
            Some(MaxAge::Relative {
                amount: 5,
                unit: AgeUnit::Minutes
            })
        );
    }

    #[test]
    fn cookie_config_requires_domain_and_key() {
        assert!(serde_yaml::from_str::<CookieConfig>("key: sid\n").is_err());
        assert!(serde_yaml::from_str::<CookieConfig>("domain: example.com\n").is_err());
    }

    #[test]
    fn cookie_config_rejects_bad_max_age() {
        let yaml = "domain: example.com\nkey: sid\nmax_age: soon\n";
        assert!(serde_yaml::from_str::<CookieConfig>(yaml).is_err());
    }
}
