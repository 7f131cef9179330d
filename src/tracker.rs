//! Trailer changeover detection and cumulative volume derivation.
//!
//! A source's flow meter reports a running total. When an empty trailer is
//! swapped for a full one the inlet pressure jumps; the tracker treats that
//! jump as the start of a new cycle and measures volume from the last flow
//! reading seen before it.
//!
//! Updates are order dependent: messages of one source must be fed in the
//! order they were posted.

use crate::config::{NegativeVolumePolicy, ReadingCoupling};
use crate::constants::CHANGEOVER_PRESSURE_JUMP;
use crate::dialect::Dialect;
use crate::models::{DerivedFields, ExtractedFields, Reading};
use crate::state::SourceState;
use tracing::debug;

/// Stateless changeover detector; all per-source state lives in [`SourceState`]
#[derive(Debug, Clone, Copy)]
pub struct ChangeoverTracker {
    pressure_jump: f64,
    coupling: ReadingCoupling,
    negative_volume: NegativeVolumePolicy,
}

impl Default for ChangeoverTracker {
    fn default() -> Self {
        Self::new(ReadingCoupling::default(), NegativeVolumePolicy::default())
    }
}

impl ChangeoverTracker {
    pub fn new(coupling: ReadingCoupling, negative_volume: NegativeVolumePolicy) -> Self {
        Self {
            pressure_jump: CHANGEOVER_PRESSURE_JUMP,
            coupling,
            negative_volume,
        }
    }

    /// Advance `state` with one message and derive its changeover fields
    pub fn update(
        &self,
        extracted: &ExtractedFields,
        dialect: &Dialect,
        timestamp: &str,
        state: &mut SourceState,
    ) -> DerivedFields {
        let (pressure, flow) = self.readings(extracted, dialect);

        let is_changeover = match (pressure, state.last_pressure) {
            (Some(current), Some(last)) => current > last + self.pressure_jump,
            _ => false,
        };

        if is_changeover {
            debug!(
                "Changeover at {}: pressure {:?} -> {:?}, baseline {:?} -> {:?}",
                timestamp, state.last_pressure, pressure, state.baseline_flow, state.last_flow
            );
            state.baseline_flow = state.last_flow;
            state.last_changeover_at = Some(timestamp.to_string());
        }

        let volume = match (flow, state.baseline_flow) {
            (Some(current), Some(baseline)) => Some(self.apply_volume_policy(current - baseline)),
            _ => None,
        };

        if let Some(current) = pressure {
            state.last_pressure = Some(current);
        }
        if let Some(current) = flow {
            state.last_flow = Some(current);
        }

        if state.baseline_flow.is_none() {
            if let Some(current) = flow {
                debug!("Seeding baseline flow {} at {}", current, timestamp);
                state.baseline_flow = Some(current);
            }
        }

        DerivedFields {
            is_changeover,
            baseline_flow: state.baseline_flow,
            volume,
        }
    }

    fn readings(&self, extracted: &ExtractedFields, dialect: &Dialect) -> (Option<f64>, Option<f64>) {
        let pressure = extracted.reading(dialect.pressure_field());
        let flow = extracted.reading(dialect.flow_field());

        match self.coupling {
            ReadingCoupling::Coupled
                if pressure == Reading::Malformed || flow == Reading::Malformed =>
            {
                debug!("Malformed pressure or flow capture, ignoring both readings");
                (None, None)
            }
            _ => (pressure.value(), flow.value()),
        }
    }

    fn apply_volume_policy(&self, volume: f64) -> f64 {
        if volume >= 0.0 {
            return volume;
        }
        match self.negative_volume {
            NegativeVolumePolicy::Keep => {
                debug!("Negative volume {} kept", volume);
                volume
            }
            NegativeVolumePolicy::Clamp => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::parser::extract;

    fn dialect() -> Dialect {
        DialectKind::Dispatch.build().unwrap()
    }

    fn message(pressure: Option<&str>, flow: Option<&str>) -> String {
        let mut body = String::from("Skid No: 1");
        if let Some(p) = pressure {
            body.push_str(&format!(" Inlet pressure: {}bar", p));
        }
        if let Some(f) = flow {
            body.push_str(&format!(" Total flow: {}scm", f));
        }
        body
    }

    fn feed(
        tracker: &ChangeoverTracker,
        state: &mut SourceState,
        messages: &[(Option<&str>, Option<&str>)],
    ) -> Vec<DerivedFields> {
        let dialect = dialect();
        messages
            .iter()
            .enumerate()
            .map(|(i, (pressure, flow))| {
                let extracted = extract(&message(*pressure, *flow), &dialect);
                tracker.update(&extracted, &dialect, &format!("t{}", i), state)
            })
            .collect()
    }

    #[test]
    fn test_bootstrap_seeds_baseline() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(&tracker, &mut state, &[(None, Some("500"))]);

        assert_eq!(
            derived[0],
            DerivedFields {
                is_changeover: false,
                baseline_flow: Some(500.0),
                volume: None,
            }
        );
        assert_eq!(state.baseline_flow, Some(500.0));
        assert_eq!(state.last_flow, Some(500.0));
        assert_eq!(state.last_pressure, None);
    }

    #[test]
    fn test_changeover_scenario() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[
                (Some("10"), Some("500")),
                (Some("10"), Some("520")),
                (Some("16"), Some("50")),
            ],
        );

        assert!(!derived[0].is_changeover);
        assert_eq!(derived[0].baseline_flow, Some(500.0));
        assert_eq!(derived[0].volume, None);

        assert!(!derived[1].is_changeover);
        assert_eq!(derived[1].baseline_flow, Some(500.0));
        assert_eq!(derived[1].volume, Some(20.0));

        assert!(derived[2].is_changeover);
        assert_eq!(derived[2].baseline_flow, Some(520.0));
        assert_eq!(derived[2].volume, Some(-470.0));

        assert_eq!(state.last_changeover_at.as_deref(), Some("t2"));
        assert_eq!(state.last_pressure, Some(16.0));
        assert_eq!(state.last_flow, Some(50.0));
        assert_eq!(state.baseline_flow, Some(520.0));
    }

    #[test]
    fn test_jump_must_exceed_threshold() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[(Some("10"), Some("500")), (Some("15"), Some("510"))],
        );

        assert!(!derived[1].is_changeover);
        assert_eq!(derived[1].volume, Some(10.0));
        assert_eq!(state.last_changeover_at, None);
    }

    #[test]
    fn test_no_changeover_without_previous_pressure() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[(None, Some("500")), (Some("200"), Some("510"))],
        );

        assert!(!derived[1].is_changeover);
        assert_eq!(derived[1].volume, Some(10.0));
    }

    #[test]
    fn test_sparse_update_preserves_pressure() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        feed(
            &tracker,
            &mut state,
            &[(Some("180"), Some("1000")), (None, Some("1100"))],
        );

        assert_eq!(state.last_pressure, Some(180.0));
        assert_eq!(state.last_flow, Some(1100.0));
    }

    #[test]
    fn test_sparse_update_preserves_flow() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[(Some("180"), Some("1000")), (Some("175"), None)],
        );

        assert_eq!(derived[1].volume, None);
        assert_eq!(derived[1].baseline_flow, Some(1000.0));
        assert_eq!(state.last_pressure, Some(175.0));
        assert_eq!(state.last_flow, Some(1000.0));
    }

    #[test]
    fn test_malformed_pressure_invalidates_flow() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[(Some("10"), Some("500")), (Some("1.2.3"), Some("600"))],
        );

        assert_eq!(derived[1].volume, None);
        assert_eq!(state.last_flow, Some(500.0));
        assert_eq!(state.last_pressure, Some(10.0));
    }

    #[test]
    fn test_independent_readings() {
        let tracker =
            ChangeoverTracker::new(ReadingCoupling::Independent, NegativeVolumePolicy::Keep);
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[(Some("10"), Some("500")), (Some("1.2.3"), Some("600"))],
        );

        assert_eq!(derived[1].volume, Some(100.0));
        assert_eq!(state.last_flow, Some(600.0));
        assert_eq!(state.last_pressure, Some(10.0));
    }

    #[test]
    fn test_clamped_negative_volume() {
        let tracker = ChangeoverTracker::new(ReadingCoupling::Coupled, NegativeVolumePolicy::Clamp);
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[
                (Some("10"), Some("500")),
                (Some("10"), Some("520")),
                (Some("16"), Some("50")),
            ],
        );

        assert!(derived[2].is_changeover);
        assert_eq!(derived[2].volume, Some(0.0));
        assert_eq!(state.baseline_flow, Some(520.0));
    }

    #[test]
    fn test_changeover_before_any_flow_keeps_baseline_unknown_until_flow() {
        let tracker = ChangeoverTracker::default();
        let mut state = SourceState::default();

        let derived = feed(
            &tracker,
            &mut state,
            &[(Some("10"), None), (Some("30"), None), (Some("30"), Some("75"))],
        );

        assert!(derived[1].is_changeover);
        assert_eq!(derived[1].baseline_flow, None);
        assert_eq!(derived[2].baseline_flow, Some(75.0));
        assert_eq!(derived[2].volume, None);
    }

    #[test]
    fn test_deterministic_updates() {
        let tracker = ChangeoverTracker::default();
        let sequence = [
            (Some("10"), Some("500")),
            (Some("12"), Some("540")),
            (Some("30"), Some("20")),
            (None, Some("80")),
        ];

        let mut first_state = SourceState::default();
        let first = feed(&tracker, &mut first_state, &sequence);
        let mut second_state = SourceState::default();
        let second = feed(&tracker, &mut second_state, &sequence);

        assert_eq!(first, second);
        assert_eq!(first_state, second_state);
    }

    #[test]
    fn test_order_sensitivity() {
        let tracker = ChangeoverTracker::default();
        let a = (Some("10"), Some("500"));
        let b = (Some("10"), Some("520"));
        let c = (Some("16"), Some("50"));

        let mut ordered_state = SourceState::default();
        let ordered = feed(&tracker, &mut ordered_state, &[a, b, c]);
        let mut shuffled_state = SourceState::default();
        let shuffled = feed(&tracker, &mut shuffled_state, &[a, c, b]);

        assert_ne!(ordered_state, shuffled_state);
        assert_ne!(ordered.last(), shuffled.last());
        assert_eq!(shuffled_state.baseline_flow, Some(500.0));
        assert_eq!(ordered_state.baseline_flow, Some(520.0));
    }
}
