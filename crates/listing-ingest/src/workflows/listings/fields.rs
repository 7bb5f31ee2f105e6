use super::normalizer::NormalizationError;
use super::schema::ListingField;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Tokens the upstream exporter writes in place of an empty cell.
const MISSING_TOKENS: &[&str] = &["nan", "none", "null"];

/// Trims, collapses inner whitespace and drops empty or placeholder values.
pub(crate) fn clean(value: Option<&str>) -> Option<String> {
    let value = value?.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty()
        || MISSING_TOKENS
            .iter()
            .any(|token| collapsed.eq_ignore_ascii_case(token))
    {
        return None;
    }
    Some(collapsed)
}

pub(crate) fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn parse_float(
    field: ListingField,
    value: Option<&str>,
) -> Result<Option<f64>, NormalizationError> {
    let Some(cleaned) = clean(value) else {
        return Ok(None);
    };
    numeric_body(field, &cleaned)
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .map(Some)
        .ok_or_else(|| invalid_number(field, &cleaned))
}

pub(crate) fn parse_integer(
    field: ListingField,
    value: Option<&str>,
) -> Result<Option<i64>, NormalizationError> {
    let Some(cleaned) = clean(value) else {
        return Ok(None);
    };
    let body = numeric_body(field, &cleaned);
    if let Ok(parsed) = body.parse::<i64>() {
        return Ok(Some(parsed));
    }

    // Spreadsheet exports often write whole numbers as "3.0".
    match body.parse::<f64>() {
        Ok(parsed)
            if parsed.is_finite()
                && parsed.fract() == 0.0
                && parsed.abs() < i64::MAX as f64 =>
        {
            Ok(Some(parsed as i64))
        }
        _ => Err(invalid_number(field, &cleaned)),
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DD[T ]HH:MM:SS` timestamps.
pub(crate) fn parse_date(
    field: ListingField,
    value: Option<&str>,
) -> Result<Option<NaiveDate>, NormalizationError> {
    let Some(cleaned) = clean(value) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Ok(Some(dt.naive_utc().date()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Ok(Some(dt.date()));
        }
    }

    Err(NormalizationError::InvalidDate {
        field,
        raw_value: cleaned,
    })
}

/// Keeps the last ten digits of a phone number; `None` when no digits remain.
pub(crate) fn mobile_digits(value: Option<&str>) -> Option<String> {
    let digits: Vec<char> = clean(value)?.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(10);
    Some(digits[start..].iter().collect())
}

/// ASCII slug: lowercase alphanumerics, every other run collapsed to one `-`.
pub(crate) fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn numeric_body(field: ListingField, cleaned: &str) -> String {
    match field {
        ListingField::Price | ListingField::SquareFeet => cleaned
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',')
            .collect::<String>()
            .trim()
            .to_string(),
        _ => cleaned.to_string(),
    }
}

fn invalid_number(field: ListingField, raw_value: &str) -> NormalizationError {
    NormalizationError::InvalidNumber {
        field,
        raw_value: raw_value.to_string(),
        expected: field.field_type(),
    }
}
