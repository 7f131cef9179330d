//! Field extraction from free-text status messages.
//!
//! Applies a dialect's patterns to a single message body. Fields are
//! independent of each other: any subset may match, and a numeric capture
//! that does not parse degrades to missing data instead of failing the
//! message.

use crate::dialect::{Dialect, FieldKind};
use crate::models::{Capture, ExtractedFields, FieldValue};
use tracing::trace;

/// Collapse line breaks so multi-line posts read as one line
pub fn normalize_body(body: &str) -> String {
    body.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract every dialect field from a message body
pub fn extract(body: &str, dialect: &Dialect) -> ExtractedFields {
    let mut extracted = ExtractedFields::new();

    for field in dialect.fields() {
        let captured = field
            .regex
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim());

        let capture = match (captured, field.kind) {
            (None, _) => Capture::Absent,
            (Some(raw), FieldKind::Text) => Capture::Present(FieldValue::Text(raw.to_string())),
            (Some(raw), FieldKind::Numeric) => match parse_number(raw) {
                Some(value) => Capture::Present(FieldValue::Number(value)),
                None => {
                    trace!("Field '{}' captured non-numeric '{}'", field.name, raw);
                    Capture::Malformed(raw.to_string())
                }
            },
        };

        extracted.push(field.name.clone(), capture);
    }

    extracted
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}
