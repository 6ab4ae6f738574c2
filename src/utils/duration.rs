//! Duration strings in the `2h`, `1h30m`, `45s`, `250ms`, `1.5h` syntax.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)").unwrap());

/// Parse a duration; returns a human-readable problem on failure.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("duration is empty".to_string());
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let mut consumed = 0;
    let mut total_ms = 0f64;
    for caps in COMPONENT.captures_iter(trimmed) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        if whole.start != consumed {
            return Err(format!("unexpected text in duration '{}'", trimmed));
        }
        consumed = whole.end;

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| format!("invalid number in duration '{}'", trimmed))?;
        let unit_ms = match &caps[2] {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            _ => 1.0,
        };
        total_ms += value * unit_ms;
    }

    if consumed != trimmed.len() {
        return Err(format!(
            "invalid duration '{}' (expected e.g. 4h, 1h30m, 45s, 250ms)",
            trimmed
        ));
    }

    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// Render a duration compactly, e.g. `4h`, `1h30m`, `2m5s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    if millis > 0 {
        out.push_str(&format!("{}ms", millis));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("4h").unwrap(), Duration::from_secs(4 * 3600));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(
            parse_duration("1h30m15s").unwrap(),
            Duration::from_secs(3600 + 1800 + 15)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "abc", "10", "5d", "1h 30m", "h1"] {
            assert!(parse_duration(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn formats_compactly() {
        assert_eq!(format_duration(Duration::from_secs(4 * 3600)), "4h");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
    }
}
