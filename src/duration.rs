use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Suffix to nanoseconds multiplier (order matters: "ms" must be tried before "s" and "m")
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

/// Parse duration strings like "5s", "500ms", "1.5m", "16.958µs"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str
                .trim()
                .parse()
                .with_context(|| format!("invalid duration: {}", s))?;
            if !val.is_finite() || val < 0.0 {
                bail!("duration must be a non-negative number: {}", s);
            }
            return Ok(Duration::from_nanos((val * multiplier) as u64));
        }
    }

    bail!("Unknown duration format: {} (expected a unit such as ms, s, m)", s)
}

/// Format a duration in the largest unit that keeps the value at or above
/// one, e.g. "1.5m" or "500ms". [`parse_duration`] reads the result back.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos() as f64;
    if nanos == 0.0 {
        return "0s".to_string();
    }

    let (suffix, multiplier) = UNITS
        .iter()
        .rev()
        .filter(|(suffix, _)| *suffix != "us")
        .find(|(_, multiplier)| nanos >= *multiplier)
        .unwrap_or(&UNITS[0]);
    let value = format!("{:.3}", nanos / multiplier);
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", value, suffix)
}
