//! Integrator configuration

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// Default maximum number of internal solver steps per step() call
pub const DEFAULT_MAX_STEPS: usize = 10_000;
/// Default upper bound on the BDF method order
pub const DEFAULT_MAX_BDF_ORDER: usize = 5;
/// Default upper bound on the Adams method order (recorded for
/// completeness; the shipped backend is BDF-only)
pub const DEFAULT_MAX_ADAMS_ORDER: usize = 12;

/// Configuration for the hybrid integration driver.
///
/// Tolerances have no universal default; construct with
/// [`IntegratorOptions::new`] or set them explicitly. Step-size fields
/// use 0.0 to mean "let the solver choose".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratorOptions {
    /// Absolute tolerance; also the floor for per-component tolerances
    pub abs_tol: f64,
    /// Relative tolerance; also the chatter detection threshold
    pub rel_tol: f64,
    /// Upper bound on the BDF method order (at most 5)
    pub max_bdf_order: usize,
    /// Upper bound on the Adams method order (unused by the BDF backend)
    pub max_adams_order: usize,
    /// Maximum internal solver steps per step() call
    pub max_steps: usize,
    /// Initial step-size hint; 0.0 selects automatically
    pub init_step: f64,
    /// Lower bound on the step magnitude; 0.0 means none
    pub min_step: f64,
    /// Upper bound on the step magnitude; 0.0 means none
    pub max_step: f64,
    /// When false, trigger zero-crossings are integrated past silently
    pub follow_events: bool,
    /// Tighten per-component tolerances from the initial state on
    /// initialization
    pub tighten_tolerances: bool,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            abs_tol: 1e-9,
            rel_tol: 1e-6,
            max_bdf_order: DEFAULT_MAX_BDF_ORDER,
            max_adams_order: DEFAULT_MAX_ADAMS_ORDER,
            max_steps: DEFAULT_MAX_STEPS,
            init_step: 0.0,
            min_step: 0.0,
            max_step: 0.0,
            follow_events: true,
            tighten_tolerances: true,
        }
    }
}

impl IntegratorOptions {
    /// Create options with the given tolerances and validate them
    pub fn new(abs_tol: f64, rel_tol: f64) -> Result<Self> {
        let opts = Self {
            abs_tol,
            rel_tol,
            ..Default::default()
        };
        opts.validate()?;
        Ok(opts)
    }

    /// Set the maximum BDF order
    pub fn with_max_bdf_order(mut self, order: usize) -> Self {
        self.max_bdf_order = order;
        self
    }

    /// Set the maximum internal steps per step() call
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set initial, minimum, and maximum step magnitudes
    pub fn with_step_bounds(mut self, init: f64, min: f64, max: f64) -> Self {
        self.init_step = init;
        self.min_step = min;
        self.max_step = max;
        self
    }

    /// Enable or disable event following
    pub fn with_follow_events(mut self, follow: bool) -> Self {
        self.follow_events = follow;
        self
    }

    /// Enable or disable tolerance tightening from the initial state
    pub fn with_tighten_tolerances(mut self, tighten: bool) -> Self {
        self.tighten_tolerances = tighten;
        self
    }

    /// Validate every field
    pub fn validate(&self) -> Result<()> {
        if !self.abs_tol.is_finite() || self.abs_tol <= 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "abs_tol",
                self.abs_tol.to_string(),
                "finite and > 0",
            ));
        }
        if !self.rel_tol.is_finite() || self.rel_tol <= 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "rel_tol",
                self.rel_tol.to_string(),
                "finite and > 0",
            ));
        }
        if self.max_bdf_order == 0 || self.max_bdf_order > DEFAULT_MAX_BDF_ORDER {
            return Err(RuntimeError::invalid_parameter(
                "max_bdf_order",
                self.max_bdf_order.to_string(),
                "in 1..=5",
            ));
        }
        if self.max_adams_order == 0 {
            return Err(RuntimeError::invalid_parameter(
                "max_adams_order",
                self.max_adams_order.to_string(),
                "> 0",
            ));
        }
        if self.max_steps == 0 {
            return Err(RuntimeError::invalid_parameter(
                "max_steps",
                self.max_steps.to_string(),
                "> 0",
            ));
        }
        for (name, value) in [
            ("init_step", self.init_step),
            ("min_step", self.min_step),
            ("max_step", self.max_step),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RuntimeError::invalid_parameter(
                    name,
                    value.to_string(),
                    ">= 0 and finite",
                ));
            }
        }
        if self.max_step > 0.0 && self.min_step > self.max_step {
            return Err(RuntimeError::invalid_parameter(
                "min_step",
                format!("{} (with max_step={})", self.min_step, self.max_step),
                "<= max_step",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = IntegratorOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.max_bdf_order, 5);
        assert_eq!(opts.max_adams_order, 12);
        assert_eq!(opts.max_steps, 10_000);
        assert!(opts.follow_events);
    }

    #[test]
    fn test_tolerance_validation() {
        assert!(IntegratorOptions::new(0.0, 1e-6).is_err());
        assert!(IntegratorOptions::new(1e-9, -1.0).is_err());
        assert!(IntegratorOptions::new(f64::NAN, 1e-6).is_err());
        assert!(IntegratorOptions::new(1e-9, 1e-6).is_ok());
    }

    #[test]
    fn test_bdf_order_bounds() {
        let opts = IntegratorOptions::default().with_max_bdf_order(6);
        assert!(opts.validate().is_err());
        let opts = IntegratorOptions::default().with_max_bdf_order(0);
        assert!(opts.validate().is_err());
        let opts = IntegratorOptions::default().with_max_bdf_order(2);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_step_bound_validation() {
        let opts = IntegratorOptions::default().with_step_bounds(0.0, 1.0, 0.5);
        assert!(opts.validate().is_err());
        let opts = IntegratorOptions::default().with_step_bounds(1e-3, 1e-6, 1.0);
        assert!(opts.validate().is_ok());
        // max_step == 0 means unbounded, so any min_step is fine
        let opts = IntegratorOptions::default().with_step_bounds(0.0, 1.0, 0.0);
        assert!(opts.validate().is_ok());
    }
}
