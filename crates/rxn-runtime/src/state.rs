//! Integrator-owned state and tolerance vectors

use rxn_core::KineticModel;

use crate::error::{Result, RuntimeError};

/// The integrator's authoritative copy of the continuous state, with a
/// parallel array of per-component absolute tolerances.
///
/// Between solver calls this vector, not the model, is the source of
/// truth for the continuous variables. The allocation is fixed at
/// initialization; a model that later reports more state than was
/// allocated is an error.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    y: Vec<f64>,
    abs_tol: Vec<f64>,
}

impl StateVector {
    /// Allocate `len` components with uniform absolute tolerance.
    pub fn new(len: usize, abs_tol: f64) -> Self {
        Self {
            y: vec![0.0; len],
            abs_tol: vec![abs_tol; len],
        }
    }

    /// One-slot placeholder used when a model has events but no
    /// continuous state: the solver integrates a single constant
    /// component while the root finder watches the triggers.
    pub fn placeholder(abs_tol: f64) -> Self {
        Self {
            y: vec![1.0],
            abs_tol: vec![abs_tol],
        }
    }

    /// Number of allocated components
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// True when nothing is allocated
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// State components
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Mutable state components
    pub fn y_mut(&mut self) -> &mut [f64] {
        &mut self.y
    }

    /// Per-component absolute tolerances
    pub fn abs_tol(&self) -> &[f64] {
        &self.abs_tol
    }

    /// Copy the model's state into the leading components.
    ///
    /// Fails when the model reports more state than was allocated.
    /// Trailing placeholder components are left untouched.
    pub fn load_from_model<M: KineticModel>(&mut self, model: &M) -> Result<()> {
        let n = model.state_size();
        if n > self.y.len() {
            return Err(RuntimeError::StateVectorMismatch {
                model: n,
                allocated: self.y.len(),
            });
        }
        model.get_state(&mut self.y[..n]);
        Ok(())
    }

    /// Write the leading components back into the model.
    pub fn store_to_model<M: KineticModel>(&self, model: &mut M) {
        let n = model.state_size().min(self.y.len());
        model.set_state(&self.y[..n]);
    }

    /// Tighten the per-component tolerances from the current state.
    ///
    /// Components three orders of magnitude below `abs_tol * 1000`
    /// would otherwise be integrated with no meaningful accuracy, so
    /// the tolerance is lowered to a thousandth of the smallest
    /// positive component, floored by nothing and capped by `abs_tol`.
    /// Every component receives the same tightened value. Returns the
    /// value chosen.
    pub fn tighten_tolerances(&mut self, abs_tol: f64) -> f64 {
        let mut chosen = abs_tol;
        for &v in &self.y {
            let scaled = v / 1000.0;
            if scaled > 0.0 && scaled < chosen {
                chosen = scaled;
            }
        }
        self.abs_tol.fill(chosen);
        chosen
    }

    /// Reset every tolerance component to a uniform value.
    pub fn reset_tolerances(&mut self, abs_tol: f64) {
        self.abs_tol.fill(abs_tol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxn_core::{EventProfile, ModelResult};

    struct TwoSpecies {
        s: [f64; 2],
    }

    impl KineticModel for TwoSpecies {
        fn state_size(&self) -> usize {
            2
        }
        fn num_events(&self) -> usize {
            0
        }
        fn get_state(&self, y: &mut [f64]) {
            y.copy_from_slice(&self.s);
        }
        fn set_state(&mut self, y: &[f64]) {
            self.s.copy_from_slice(y);
        }
        fn set_time(&mut self, _t: f64) {}
        fn eval_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> ModelResult<()> {
            ydot.fill(0.0);
            Ok(())
        }
        fn reevaluate(&mut self, _t: f64) -> ModelResult<()> {
            Ok(())
        }
        fn eval_events(&mut self, _t: f64) -> ModelResult<()> {
            Ok(())
        }
        fn event_status(&self, _index: usize) -> bool {
            false
        }
        fn clear_event_status(&mut self, _index: usize) {}
        fn trigger_gaps(&self, _out: &mut [f64]) {}
        fn event_profile(&self, _index: usize) -> EventProfile {
            EventProfile::immediate()
        }
        fn compute_event_assignment(&mut self, _index: usize) -> ModelResult<Vec<f64>> {
            Ok(Vec::new())
        }
        fn perform_event_assignment(
            &mut self,
            _index: usize,
            _values: Option<&[f64]>,
        ) -> ModelResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_round_trip_through_model() {
        let mut model = TwoSpecies { s: [2.5, 0.5] };
        let mut state = StateVector::new(2, 1e-9);
        state.load_from_model(&model).unwrap();
        assert_eq!(state.y(), &[2.5, 0.5]);

        state.y_mut()[0] = 7.0;
        state.store_to_model(&mut model);
        assert_eq!(model.s, [7.0, 0.5]);
    }

    #[test]
    fn test_oversized_model_rejected() {
        let model = TwoSpecies { s: [1.0, 1.0] };
        let mut state = StateVector::new(1, 1e-9);
        assert!(matches!(
            state.load_from_model(&model),
            Err(RuntimeError::StateVectorMismatch {
                model: 2,
                allocated: 1
            })
        ));
    }

    #[test]
    fn test_tighten_picks_smallest_positive_scaled_component() {
        let mut state = StateVector::new(3, 1e-6);
        state.y_mut().copy_from_slice(&[1.0, 1e-5, -4.0]);
        // 1e-5 / 1000 = 1e-8 < 1e-6; negative components are ignored
        let chosen = state.tighten_tolerances(1e-6);
        assert!((chosen - 1e-8).abs() < 1e-20);
        assert!(state.abs_tol().iter().all(|&t| t == chosen));
    }

    #[test]
    fn test_tighten_keeps_configured_floor_when_state_is_large() {
        let mut state = StateVector::new(2, 1e-9);
        state.y_mut().copy_from_slice(&[10.0, 5.0]);
        // 5.0 / 1000 = 5e-3 > 1e-9: nothing to tighten
        let chosen = state.tighten_tolerances(1e-9);
        assert_eq!(chosen, 1e-9);
    }

    #[test]
    fn test_placeholder() {
        let state = StateVector::placeholder(1e-9);
        assert_eq!(state.y(), &[1.0]);
        assert_eq!(state.abs_tol(), &[1e-9]);
    }
}
