//! Output record assembly and the completeness gate.

use crate::constants::MIN_PRESENT_FIELDS;
use crate::models::{DerivedFields, ExtractedFields, OutputRecord};
use tracing::trace;

/// Build an output record, or `None` when the message carries too few fields
/// to be a telemetry report.
///
/// Only dialect fields count towards the gate; derived values never do.
pub fn assemble(
    extracted: &ExtractedFields,
    derived: DerivedFields,
    date: &str,
    time: &str,
) -> Option<OutputRecord> {
    let present = extracted.present_count();
    if present < MIN_PRESENT_FIELDS {
        trace!(
            "Discarding message {} {}: {} of {} fields present",
            date,
            time,
            present,
            extracted.len()
        );
        return None;
    }

    let fields = extracted
        .iter()
        .map(|(name, capture)| (name.to_string(), capture.value().cloned()))
        .collect();

    Some(OutputRecord {
        date: date.to_string(),
        time: time.to_string(),
        derived,
        fields,
    })
}
