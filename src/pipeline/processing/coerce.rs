//! Cell-level type coercion for raw CRM exports.
//!
//! Every parser takes the raw text of a cell and returns `None` for values
//! that cannot be interpreted, mirroring a "coerce errors to null" policy.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::pipeline::schema::ColumnKind;
use crate::table::ColumnData;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static THOUSANDS_INT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,3}(,\d{3})+$").expect("valid regex"));
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)\s+days?,?\s+)?(\d+):(\d{1,2})(?::(\d{1,2}(?:\.\d+)?))?$")
        .expect("valid regex")
});

const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Tokens that exports use for "no value"
pub fn is_null_token(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || matches!(
            v.to_ascii_lowercase().as_str(),
            "nan" | "<na>" | "null" | "none" | "nat" | "n/a"
        )
}

/// Trim and drop null tokens
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if is_null_token(v) {
        None
    } else {
        Some(v.to_string())
    }
}

/// Trim, collapse internal whitespace and lowercase
pub fn normalize_text(value: &str) -> String {
    WHITESPACE
        .replace_all(value.trim(), " ")
        .to_lowercase()
}

pub fn parse_float(value: &str) -> Option<f64> {
    if is_null_token(value) {
        return None;
    }
    let mut s: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\'' | '€' | '$' | '₽' | '%'))
        .collect();

    match (s.rfind(','), s.rfind('.')) {
        // Both present: the right-most one is the decimal separator
        (Some(c), Some(d)) if c > d => s = s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s = s.replace(',', ""),
        (Some(_), None) if s.matches(',').count() == 1 => s = s.replace(',', "."),
        (Some(_), None) => s = s.replace(',', ""),
        _ => {}
    }

    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn parse_int(value: &str) -> Option<i64> {
    if is_null_token(value) {
        return None;
    }
    let trimmed: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if THOUSANDS_INT.is_match(&trimmed) {
        return trimmed.replace(',', "").parse().ok();
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(i);
    }
    // "12.0" style floats are accepted when integral
    parse_float(&trimmed)
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

/// Day-first datetime parsing with ISO and RFC 3339 fallbacks.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if is_null_token(value) {
        return None;
    }
    let v = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.naive_local());
    }
    parse_date(v).and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if is_null_token(value) {
        return None;
    }
    let v = value.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(v, fmt) {
            return Some(d);
        }
    }
    // Datetime strings normalized to their day
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(v).ok().map(|dt| dt.date_naive())
}

pub fn parse_bool(value: &str) -> Option<bool> {
    if is_null_token(value) {
        return None;
    }
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "да" | "ja" | "wahr" => Some(true),
        "false" | "no" | "n" | "нет" | "nein" | "falsch" => Some(false),
        other => parse_float(other).map(|f| f != 0.0),
    }
}

/// `hh:mm:ss`, `hh:mm`, `N days hh:mm:ss` or a bare number of hours.
pub fn parse_duration_hours(value: &str) -> Option<f64> {
    if is_null_token(value) {
        return None;
    }
    let v = value.trim();
    if let Some(caps) = DURATION.captures(v) {
        let days: f64 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
        let hours: f64 = caps.get(2)?.as_str().parse().ok()?;
        let minutes: f64 = caps.get(3)?.as_str().parse().ok()?;
        let seconds: f64 = caps.get(4).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
        if minutes >= 60.0 || seconds >= 60.0 {
            return None;
        }
        return Some(days * 24.0 + hours + minutes / 60.0 + seconds / 3600.0);
    }
    parse_float(v)
}

/// Coerce a raw text column to the storage type of `kind`.
///
/// Categories stay text here; canonicalization happens in the cleaning step.
pub fn coerce_values(kind: ColumnKind, values: &[Option<String>]) -> ColumnData {
    fn map<T>(values: &[Option<String>], f: impl Fn(&str) -> Option<T>) -> Vec<Option<T>> {
        values.iter().map(|v| v.as_deref().and_then(&f)).collect()
    }
    match kind {
        ColumnKind::Id | ColumnKind::Text | ColumnKind::Category => {
            ColumnData::Text(values.iter().map(|v| clean_text(v.as_deref())).collect())
        }
        ColumnKind::Int => ColumnData::Int(map(values, parse_int)),
        ColumnKind::Float => ColumnData::Float(map(values, parse_float)),
        ColumnKind::DurationHours => ColumnData::Float(map(values, parse_duration_hours)),
        ColumnKind::DateTime => ColumnData::DateTime(map(values, parse_datetime)),
        ColumnKind::Date => ColumnData::Date(map(values, parse_date)),
        ColumnKind::Bool => ColumnData::Bool(map(values, parse_bool)),
    }
}

/// Best-effort type label of a raw text column, used by the import checklist.
pub fn infer_type<'a>(values: impl Iterator<Item = Option<&'a str>>) -> &'static str {
    let present: Vec<&str> = values.flatten().filter(|v| !is_null_token(v)).collect();
    if present.is_empty() {
        return "empty";
    }
    if present.iter().all(|v| parse_int(v).is_some()) {
        "int"
    } else if present.iter().all(|v| parse_float(v).is_some()) {
        "float"
    } else if present.iter().all(|v| parse_datetime(v).is_some()) {
        "datetime"
    } else if present.iter().all(|v| parse_bool(v).is_some()) {
        "bool"
    } else {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_float_handles_locales() {
        assert_eq!(parse_float("1 234,5"), Some(1234.5));
        assert_eq!(parse_float("1.234,50 €"), Some(1234.5));
        assert_eq!(parse_float("1,234.50"), Some(1234.5));
        assert_eq!(parse_float("12,5"), Some(12.5));
        assert_eq!(parse_float("abc"), None);
        assert_eq!(parse_float("NaN"), None);
    }

    #[test]
    fn test_parse_int_accepts_thousands_and_integral_floats() {
        assert_eq!(parse_int("1,234"), Some(1234));
        assert_eq!(parse_int("42.0"), Some(42));
        assert_eq!(parse_int(" 7 "), Some(7));
        assert_eq!(parse_int("4.5"), None);
        assert_eq!(parse_int(""), None);
    }

    #[test]
    fn test_parse_datetime_is_day_first() {
        let dt = parse_datetime("03.04.2024 10:15").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());

        let iso = parse_datetime("2024-04-03 10:15:00").unwrap();
        assert_eq!(iso, dt);

        let date_only = parse_datetime("03/04/2024").unwrap();
        assert_eq!(date_only.date(), dt.date());

        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_parse_date_truncates_time() {
        assert_eq!(
            parse_date("2024-01-31 23:59:59"),
            NaiveDate::from_ymd_opt(2024, 1, 31)
        );
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("0.0"), Some(false));
        assert_eq!(parse_bool("Да"), Some(true));
        assert_eq!(parse_bool("nein"), Some(false));
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_parse_duration_hours() {
        assert_eq!(parse_duration_hours("01:30:00"), Some(1.5));
        assert_eq!(parse_duration_hours("1 days 02:00:00"), Some(26.0));
        assert_eq!(parse_duration_hours("00:45"), Some(0.75));
        assert_eq!(parse_duration_hours("3.25"), Some(3.25));
        assert_eq!(parse_duration_hours("10:75:00"), None);
    }

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("  Payment   Done "), "payment done");
    }

    #[test]
    fn test_coerce_values_by_kind() {
        let raw = vec![Some(" 42 ".to_string()), Some("x".to_string()), None];
        assert_eq!(
            coerce_values(ColumnKind::Int, &raw),
            ColumnData::Int(vec![Some(42), None, None])
        );
        assert_eq!(
            coerce_values(ColumnKind::Id, &raw),
            ColumnData::Text(vec![Some("42".to_string()), Some("x".to_string()), None])
        );
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(infer_type([Some("1"), None, Some("2")].into_iter()), "int");
        assert_eq!(infer_type([Some("1,5"), Some("2")].into_iter()), "float");
        assert_eq!(infer_type([Some("01.02.2024")].into_iter()), "datetime");
        assert_eq!(infer_type([Some("x"), Some("1")].into_iter()), "text");
        assert_eq!(infer_type([None, Some("nan")].into_iter()), "empty");
    }
}
