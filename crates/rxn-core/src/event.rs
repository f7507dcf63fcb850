//! Per-event metadata
//!
//! Each discrete event is described by a single record rather than a
//! set of parallel arrays, so an event's flags can never fall out of
//! alignment with its index.

use serde::{Deserialize, Serialize};

/// When an event's assignment values are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueCapture {
    /// Values are computed at the instant the trigger fires and applied
    /// unchanged when the assignment executes, even after a delay.
    TriggerTime,
    /// Values are computed against the model state at the instant the
    /// assignment executes.
    AssignmentTime,
}

/// Metadata for one event, evaluated against the model's current state
/// at the instant it is queried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventProfile {
    /// Once the trigger has gone true, the event stays armed until it
    /// fires even if the trigger falls back to false first.
    pub persistent: bool,
    /// When the assignment values are captured.
    pub capture: ValueCapture,
    /// Firing priority among simultaneous events; higher fires first.
    /// NaN means the event has no defined ordering.
    pub priority: f64,
    /// Delay between trigger detection and assignment execution,
    /// in simulation time units. Zero means immediate.
    pub delay: f64,
}

impl EventProfile {
    /// An immediate, persistent event with assignment-time values and
    /// no defined priority. Useful as a base for fixtures and builders.
    pub fn immediate() -> Self {
        Self {
            persistent: true,
            capture: ValueCapture::AssignmentTime,
            priority: f64::NAN,
            delay: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_profile() {
        let profile = EventProfile::immediate();
        assert!(profile.persistent);
        assert_eq!(profile.capture, ValueCapture::AssignmentTime);
        assert!(profile.priority.is_nan());
        assert_eq!(profile.delay, 0.0);
    }
}
