//! ISO-8601 durations (`P30D`, `PT1H30M`, `P2W`) for persisted records and config.
//!
//! Calendar units (years, months) have no fixed length and are rejected.

use chrono::Duration;

use crate::error::{ApError, Result};

/// Render `d` with days, hours, minutes and seconds; sub-second precision is
/// kept to the millisecond (`PT1.5S`).
pub fn format(d: &Duration) -> String {
    let total = d.num_milliseconds();
    let negative = total < 0;
    let total = total.unsigned_abs();
    let days = total / 86_400_000;
    let hours = (total % 86_400_000) / 3_600_000;
    let minutes = (total % 3_600_000) / 60_000;
    let millis = total % 60_000;

    let mut out = String::from(if negative { "-P" } else { "P" });
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || millis > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if millis > 0 {
            let (secs, frac) = (millis / 1_000, millis % 1_000);
            if frac == 0 {
                out.push_str(&format!("{secs}S"));
            } else {
                let frac = format!("{frac:03}");
                out.push_str(&format!("{secs}.{}S", frac.trim_end_matches('0')));
            }
        }
    }
    if out.ends_with('P') {
        out.push_str("T0S");
    }
    out
}

/// Parse `[-]PnWnDTnHnMnS`. Designators must appear at most once and in
/// that order; only seconds may carry a fraction, of at most three digits.
pub fn parse(s: &str) -> Result<Duration> {
    let invalid = || ApError::InvalidRequest(format!("invalid ISO-8601 duration '{s}'"));
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let body = rest.strip_prefix('P').ok_or_else(invalid)?;

    let mut millis: i64 = 0;
    let mut in_time = false;
    let mut time_components = 0;
    let mut last_rank: Option<u8> = None;
    let mut number = String::new();
    for c in body.chars() {
        match c {
            '0'..='9' | '.' | ',' => number.push(if c == ',' { '.' } else { c }),
            'T' if !in_time && number.is_empty() => in_time = true,
            unit => {
                if number.is_empty() {
                    return Err(invalid());
                }
                let (rank, unit_ms): (u8, i64) = match (in_time, unit) {
                    (false, 'W') => (0, 7 * 86_400_000),
                    (false, 'D') => (1, 86_400_000),
                    (true, 'H') => (2, 3_600_000),
                    (true, 'M') => (3, 60_000),
                    (true, 'S') => (4, 1_000),
                    _ => return Err(invalid()),
                };
                if last_rank.is_some_and(|last| rank <= last) {
                    return Err(invalid());
                }
                last_rank = Some(rank);
                let value = component_millis(&number, unit_ms, unit == 'S').ok_or_else(invalid)?;
                millis = millis.checked_add(value).ok_or_else(invalid)?;
                if in_time {
                    time_components += 1;
                }
                number.clear();
            }
        }
    }
    if !number.is_empty() || last_rank.is_none() || (in_time && time_components == 0) {
        return Err(invalid());
    }
    let d = Duration::milliseconds(millis);
    Ok(if negative { -d } else { d })
}

fn component_millis(number: &str, unit_ms: i64, fraction_allowed: bool) -> Option<i64> {
    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (number, None),
    };
    let mut total = whole.parse::<i64>().ok()?.checked_mul(unit_ms)?;
    if let Some(frac) = frac {
        if !fraction_allowed
            || frac.is_empty()
            || frac.len() > 3
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        // seconds only, so the padded fraction is already in milliseconds
        total = total.checked_add(format!("{frac:0<3}").parse::<i64>().ok()?)?;
    }
    Some(total)
}

/// `#[serde(with = "crate::duration::iso8601")]`
pub mod iso8601 {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&super::format(d))
    }

    pub fn deserialize<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}
