use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Severity of a log event.
///
/// The discriminant is the byte written to the stream, so the numeric order
/// is also the filtering order: a session configured with a minimum severity
/// of `Warning` accepts `Warning`, `Error` and `Critical`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
}

impl Severity {
    /// All severities, lowest first.
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    #[inline(always)]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a severity byte read from a stream.
    pub const fn from_u8(value: u8) -> Option<Severity> {
        match value {
            0 => Some(Severity::Trace),
            1 => Some(Severity::Debug),
            2 => Some(Severity::Info),
            3 => Some(Severity::Warning),
            4 => Some(Severity::Error),
            5 => Some(Severity::Critical),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "TRAC",
            Severity::Debug => "DEBG",
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERRO",
            Severity::Critical => "CRIT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a severity name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown severity `{0}`")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    /// Accepts the full names (`info`, `warning`, ...) and the four letter
    /// abbreviations used by `Display`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "trac" => Ok(Severity::Trace),
            "debug" | "debg" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "erro" => Ok(Severity::Error),
            "critical" | "crit" => Ok(Severity::Critical),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_roundtrip_covers_all_levels() {
        for severity in Severity::ALL {
            assert_eq!(Severity::from_u8(severity.as_u8()), Some(severity));
        }
        assert_eq!(Severity::from_u8(6), None);
    }

    #[test]
    fn test_ordering_matches_filtering() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("INFO".parse::<Severity>(), Ok(Severity::Info));
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!(" critical ".parse::<Severity>(), Ok(Severity::Critical));
        assert!("verbose".parse::<Severity>().is_err());
    }
}
