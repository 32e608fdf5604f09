//! Numeric conventions for counter values

/// Parse a measurement token; empty, unparseable or non-finite tokens are 0.
pub fn parse_value(token: &str) -> f64 {
    let token = token.trim();
    if token.is_empty() {
        return 0.0;
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counts are truncated toward zero, never rounded.
pub fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

/// `successes / attempts * 100` to two decimals; 0 when nothing was attempted.
pub fn success_rate(successes: f64, attempts: f64) -> f64 {
    if attempts > 0.0 {
        round2(successes / attempts * 100.0)
    } else {
        0.0
    }
}
