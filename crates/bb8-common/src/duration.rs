use std::time::Duration;

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Parses compound duration strings such as `30s`, `2m`, `1h30m` or `1.5s`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, fraction, after_number) = split_number(rest)
            .ok_or_else(|| format!("expected a number in duration '{s}'"))?;
        let (unit, scale) = UNITS
            .iter()
            .filter(|(unit, _)| after_number.starts_with(unit))
            .max_by_key(|(unit, _)| unit.len())
            .ok_or_else(|| format!("missing or unknown unit in duration '{s}'"))?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("number out of range in duration '{s}'"))?
        };
        let mut nanos = whole
            .checked_mul(*scale)
            .ok_or_else(|| format!("duration '{s}' overflows"))?;
        if !fraction.is_empty() {
            // Keep at most 18 digits so the divisor fits in u128 comfortably.
            let digits = &fraction[..fraction.len().min(18)];
            let numerator: u128 = digits
                .parse()
                .map_err(|_| format!("invalid fraction in duration '{s}'"))?;
            let divisor = 10u128.pow(digits.len() as u32);
            nanos += numerator * *scale / divisor;
        }
        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration '{s}' overflows"))?;
        rest = &after_number[unit.len()..];
    }

    let nanos = u64::try_from(total).map_err(|_| format!("duration '{s}' overflows"))?;
    Ok(Duration::from_nanos(nanos))
}

fn split_number(input: &str) -> Option<(&str, &str, &str)> {
    let whole_end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let whole = &input[..whole_end];
    let mut rest = &input[whole_end..];
    let mut fraction = "";
    if let Some(after_dot) = rest.strip_prefix('.') {
        let frac_end = after_dot
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after_dot.len());
        fraction = &after_dot[..frac_end];
        rest = &after_dot[frac_end..];
    }
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    Some((whole, fraction, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 10s ").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2m3.25s").unwrap(), Duration::from_millis(123_250));
        assert_eq!(parse_duration(".5m").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("-5s").is_err());
    }
}
