//! Error types for model evaluation

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors raised by a model during evaluation.
///
/// Evaluation faults are fatal for the current advance; constraint
/// violations are surfaced by the driver as warnings and simulation
/// continues.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// Derivative, trigger, or assignment evaluation failed
    #[error("Model evaluation failed at time {time}: {reason}")]
    Evaluation {
        /// Simulation time of the failure
        time: f64,
        /// Reason for the failure
        reason: String,
    },

    /// A model constraint does not hold at the current state
    #[error("Constraint violated: {reason}")]
    ConstraintViolation {
        /// Description of the violated constraint
        reason: String,
    },

    /// Event index outside the model's declared event count
    #[error("Event index {index} out of range (model declares {count} events)")]
    InvalidEvent {
        /// Offending event index
        index: usize,
        /// Number of events the model declares
        count: usize,
    },
}

impl ModelError {
    /// Create an evaluation fault
    pub fn evaluation(time: f64, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            time,
            reason: reason.into(),
        }
    }

    /// Create a constraint violation
    pub fn constraint_violation(reason: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            reason: reason.into(),
        }
    }

    /// True when the error is a non-fatal constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::evaluation(1.5, "division by zero in rate law");
        let msg = format!("{}", err);
        assert!(msg.contains("1.5"));
        assert!(msg.contains("division by zero"));
    }

    #[test]
    fn test_constraint_classification() {
        assert!(ModelError::constraint_violation("S1 negative").is_constraint_violation());
        assert!(!ModelError::evaluation(0.0, "nan").is_constraint_violation());
    }
}
