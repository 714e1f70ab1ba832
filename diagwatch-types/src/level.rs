//! Severity levels and their total ordering.

use core::fmt;
use core::str::FromStr;

/// Severity of a status report or of a rolled-up tree node.
///
/// The ordering is total and load-bearing: `Ok < Warn < Error < Stale`.
/// Roll-up takes the maximum, so a source that went silent (`Stale`)
/// dominates everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Level {
    /// Everything is fine.
    #[default]
    Ok,
    /// Degraded but functional.
    Warn,
    /// The source reports a failure.
    Error,
    /// The source has not reported within the staleness window.
    Stale,
}

impl Level {
    /// All levels, lowest severity first.
    pub const ALL: [Level; 4] = [Level::Ok, Level::Warn, Level::Error, Level::Stale];

    /// Decode the wire byte used by producers (`0..=3`).
    ///
    /// Returns `None` for an unrecognized severity.
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Level::Ok),
            1 => Some(Level::Warn),
            2 => Some(Level::Error),
            3 => Some(Level::Stale),
            _ => None,
        }
    }

    /// The wire byte for this level.
    pub const fn to_wire(self) -> u8 {
        self as u8
    }

    /// Short upper-case label, as used in logs and JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Ok => "OK",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Stale => "STALE",
        }
    }

    /// True for `Error` and `Stale`.
    pub fn is_critical(self) -> bool {
        self >= Level::Error
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Level`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError;

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected one of OK, WARN, ERROR, STALE")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(ParseLevelError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_ok_warn_error_stale() {
        assert!(Level::Ok < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Stale);
        assert_eq!(Level::ALL.iter().max(), Some(&Level::Stale));
    }

    #[test]
    fn wire_bytes_round_trip_and_reject_unknown() {
        for level in Level::ALL {
            assert_eq!(Level::from_wire(level.to_wire()), Some(level));
        }
        assert_eq!(Level::from_wire(4), None);
        assert_eq!(Level::from_wire(255), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("warn".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" STALE ".parse::<Level>(), Ok(Level::Stale));
        assert_eq!("fatal".parse::<Level>(), Err(ParseLevelError));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_upper_case_label() {
        let json = serde_json::to_string(&Level::Error).unwrap();
        assert_eq!(json, "\"ERROR\"");
    }
}
