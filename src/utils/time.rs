//! Time parsing and formatting for XMLTV and upstream payloads

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// XMLTV timestamp layout, e.g. `20240301180000 +0000`
pub const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S %z";

pub fn format_xmltv_time(dt: &DateTime<Utc>) -> String {
    dt.format(XMLTV_TIME_FORMAT).to_string()
}

/// Parse an XMLTV timestamp. Offsets are optional (UTC assumed) and
/// truncated forms such as `YYYYMMDDHHMM` are accepted.
pub fn parse_xmltv_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_str(value, XMLTV_TIME_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y%m%d%H%M%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    let padded = match digits.len() {
        14 => digits,
        12 => format!("{digits}00"),
        8 => format!("{digits}000000"),
        _ => return None,
    };
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse the timestamp variants seen in JSON listings: RFC 3339 / ISO 8601
/// (with or without `Z`), naive ISO (UTC assumed), 10-digit epoch seconds
/// and bare `YYYY-MM-DD` dates.
pub fn parse_upstream_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let trimmed = value.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Date-based `xmltv_ns` value used when no season/episode is known:
/// `(year - 1).MM(day - 1).`
pub fn xmltv_ns_from_date(dt: &DateTime<Utc>) -> String {
    format!("{}.{:02}{:02}.", dt.year() - 1, dt.month(), dt.day() - 1)
}
