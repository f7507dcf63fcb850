//! The model collaborator trait
//!
//! A [`KineticModel`] owns the biochemical state (species amounts,
//! parameters, reaction rates) and knows how to evaluate derivatives,
//! event triggers, and event assignments against it. The driver owns
//! the numerical side: the integrator's state vector, tolerances, and
//! the event firing machinery.
//!
//! During a single `advance` call the driver calls back into the model
//! many times, sometimes under a snapshot transaction
//! ([`KineticModel::push_state`] / [`KineticModel::pop_state`]) so a
//! probe of trigger values does not commit. A model only needs to
//! snapshot the state that trigger evaluation reads; a full copy is
//! always correct.

use crate::error::ModelResult;
use crate::event::EventProfile;

/// What to do with the snapshot on [`KineticModel::pop_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Keep the mutations made since `push_state`; the snapshot is
    /// simply forgotten.
    Keep,
    /// Restore the snapshot, discarding mutations made since
    /// `push_state`.
    Discard,
}

/// A biochemical model the driver can advance through time.
///
/// The evaluation core (`state_size` through
/// `perform_event_assignment`) must be implemented; the housekeeping
/// hooks default to no-ops and only matter for models that carry
/// derived quantities (concentration views, dependent species,
/// conserved moiety totals).
pub trait KineticModel {
    /// Number of continuous state variables.
    fn state_size(&self) -> usize;

    /// Number of discrete events.
    fn num_events(&self) -> usize;

    /// Copy the model's state into `y` (`y.len() == state_size()`).
    fn get_state(&self, y: &mut [f64]);

    /// Overwrite the model's state from `y` (`y.len() == state_size()`).
    fn set_state(&mut self, y: &[f64]);

    /// Set the model's notion of current simulation time.
    fn set_time(&mut self, t: f64);

    /// Evaluate `dy/dt` at `(t, y)` into `ydot`.
    ///
    /// `y` and `ydot` have length `state_size()`. The call may read and
    /// update internal rate bookkeeping; the driver wraps it in a
    /// snapshot when evaluating speculatively.
    fn eval_derivatives(&mut self, t: f64, y: &[f64], ydot: &mut [f64]) -> ModelResult<()>;

    /// Recompute rates and derived quantities from the model's own
    /// current state, without an external `y`.
    fn reevaluate(&mut self, t: f64) -> ModelResult<()>;

    /// Re-evaluate every event trigger at time `t` against the model's
    /// current state, updating the per-event status flags.
    fn eval_events(&mut self, t: f64) -> ModelResult<()>;

    /// Last-evaluated truth value of trigger `index`.
    fn event_status(&self, index: usize) -> bool;

    /// Force the status flag of a fired event back to false.
    fn clear_event_status(&mut self, index: usize);

    /// Copy the continuous trigger-gap signals into `out`
    /// (`out.len() == num_events()`), as last evaluated by
    /// [`KineticModel::eval_events`]. A gap crosses zero going positive
    /// exactly when its trigger goes true.
    fn trigger_gaps(&self, out: &mut [f64]);

    /// Metadata for event `index`, evaluated against current state.
    ///
    /// Delay and priority expressions may reference state, so the
    /// returned record reflects the instant of the call.
    fn event_profile(&self, index: usize) -> EventProfile;

    /// Compute the assignment right-hand sides of event `index` against
    /// current state, without applying them.
    ///
    /// Used for [`ValueCapture::TriggerTime`] events, whose values are
    /// frozen at detection.
    ///
    /// [`ValueCapture::TriggerTime`]: crate::event::ValueCapture::TriggerTime
    fn compute_event_assignment(&mut self, index: usize) -> ModelResult<Vec<f64>>;

    /// Apply the assignments of event `index`.
    ///
    /// `values` is `Some` with previously captured right-hand sides for
    /// trigger-time events, `None` for assignment-time events, which
    /// evaluate against the current state.
    fn perform_event_assignment(&mut self, index: usize, values: Option<&[f64]>)
        -> ModelResult<()>;

    /// Refresh concentration views from amounts.
    fn convert_to_concentrations(&mut self) {}

    /// Refresh amounts from concentration views.
    fn convert_to_amounts(&mut self) {}

    /// Recompute species defined by assignment rules.
    fn update_dependent_species(&mut self) {}

    /// Recompute conserved moiety totals.
    fn compute_conserved_totals(&mut self) {}

    /// True when an assignment invalidated the conserved totals.
    fn conserved_totals_changed(&self) -> bool {
        false
    }

    /// Reset event bookkeeping to the pre-simulation state.
    fn reset_events(&mut self) {}

    /// Check model constraints against the current state.
    ///
    /// A [`ModelError::ConstraintViolation`] return is reported as a
    /// warning by the driver; evaluation faults propagate.
    ///
    /// [`ModelError::ConstraintViolation`]: crate::error::ModelError::ConstraintViolation
    fn test_constraints(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Begin a snapshot transaction.
    ///
    /// The default is a no-op, which is correct for models whose
    /// evaluation methods are pure functions of `(t, state)`.
    fn push_state(&mut self) {}

    /// End the innermost snapshot transaction.
    fn pop_state(&mut self, mode: SnapshotMode) {
        let _ = mode;
    }
}
