//! Error types for the integration runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while driving a simulation
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Driver or solver initialization failed
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for the failure
        reason: String,
    },

    /// The integrator backend failed to take a step
    #[error("Integrator failure {code}: {reason}")]
    Integrator {
        /// Negative solver error code
        code: i32,
        /// Description of the failure
        reason: String,
    },

    /// Model reported more state than the driver allocated
    #[error("State vector mismatch: model has {model} variables, allocated {allocated}")]
    StateVectorMismatch {
        /// State length the model reports
        model: usize,
        /// Length of the allocated state vector
        allocated: usize,
    },

    /// Invalid configuration value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Model evaluation fault
    #[error("Model error: {source}")]
    Model {
        #[from]
        /// Source model error
        source: rxn_core::ModelError,
    },

    /// Dense linear algebra failure inside the solver
    #[error("Math error: {source}")]
    Math {
        #[from]
        /// Source math error
        source: rxn_math::MathError,
    },
}

impl RuntimeError {
    /// Create an initialization error
    pub fn initialization(reason: impl Into<String>) -> Self {
        Self::Initialization {
            reason: reason.into(),
        }
    }

    /// Create an integrator failure with a negative solver code
    pub fn integrator(code: i32, reason: impl Into<String>) -> Self {
        Self::Integrator {
            code,
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }
}
