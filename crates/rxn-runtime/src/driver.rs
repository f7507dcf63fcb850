//! The hybrid integration driver
//!
//! [`HybridDriver`] interleaves continuous integration with discrete
//! event resolution: integrate toward the target, stop at trigger
//! crossings and pending-assignment times, fire events, restart, and
//! repeat until the target is reached. A single `advance` call either
//! reaches its target or returns an error; there are no partial
//! advances.

use rxn_core::{KineticModel, SnapshotMode};

use crate::bdf::BdfSolver;
use crate::error::{Result, RuntimeError};
use crate::options::IntegratorOptions;
use crate::queue::PendingAssignmentQueue;
use crate::roots::RootHandler;
use crate::solver::{HybridSystem, StepOutcome, StiffSolver};
use crate::state::StateVector;

/// Time differences at or below this are indistinguishable from zero
/// for the advance loop.
const TIME_EPSILON: f64 = 1e-16;

/// Consecutive near-coincident root returns tolerated before the
/// chatter guard suppresses handling.
const CHATTER_STRIKES: i32 = 3;

/// Borrowing adapter that presents a model to the solver as a
/// continuous system.
///
/// Every callback runs under a model snapshot and restores it on the
/// way out, so speculative evaluations at trial points never commit.
struct SystemAdapter<'a, M: KineticModel> {
    model: &'a mut M,
    state_size: usize,
}

impl<M: KineticModel> HybridSystem for SystemAdapter<'_, M> {
    fn rhs(&mut self, t: f64, y: &[f64], ydot: &mut [f64]) -> Result<()> {
        let n = self.state_size;
        self.model.push_state();
        let result = self.model.eval_derivatives(t, &y[..n], &mut ydot[..n]);
        self.model.pop_state(SnapshotMode::Discard);
        result?;
        // Placeholder components carried for the root finder stay flat
        for slot in ydot[n..].iter_mut() {
            *slot = 0.0;
        }
        Ok(())
    }

    fn roots(&mut self, t: f64, y: &[f64], gout: &mut [f64]) -> Result<()> {
        let n = self.state_size;
        self.model.push_state();
        self.model.set_state(&y[..n]);
        let mut result = self.model.reevaluate(t);
        if result.is_ok() {
            result = self.model.eval_events(t);
        }
        if result.is_ok() {
            self.model.trigger_gaps(gout);
        }
        self.model.pop_state(SnapshotMode::Discard);
        result?;
        Ok(())
    }
}

/// Drives a [`KineticModel`] through time with a stiff solver and
/// discrete-event resolution.
///
/// The driver owns the model, the solver, the integrator's state and
/// tolerance vectors, and the pending-assignment queue; the model is
/// reachable through [`model`](HybridDriver::model) /
/// [`model_mut`](HybridDriver::model_mut) between calls. Not safe for
/// concurrent use: `advance` runs to completion on the calling thread.
pub struct HybridDriver<M: KineticModel, S: StiffSolver = BdfSolver> {
    model: M,
    solver: S,
    options: IntegratorOptions,
    state: StateVector,
    queue: PendingAssignmentQueue,
    last_time: f64,
    last_event_time: f64,
    follow_events: bool,
    initialized: bool,
}

impl<M: KineticModel> HybridDriver<M, BdfSolver> {
    /// Create a driver around `model` with the default BDF backend and
    /// initialize it.
    pub fn new(model: M, options: IntegratorOptions) -> Result<Self> {
        Self::with_solver(model, BdfSolver::new(), options)
    }
}

impl<M: KineticModel, S: StiffSolver> HybridDriver<M, S> {
    /// Create a driver with an explicit solver backend and initialize
    /// it.
    pub fn with_solver(model: M, solver: S, options: IntegratorOptions) -> Result<Self> {
        options.validate()?;
        let follow_events = options.follow_events;
        let mut driver = Self {
            model,
            solver,
            options,
            state: StateVector::new(0, 0.0),
            queue: PendingAssignmentQueue::new(),
            last_time: 0.0,
            last_event_time: 0.0,
            follow_events,
            initialized: false,
        };
        driver.initialize()?;
        Ok(driver)
    }

    /// The model being driven
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the model between `advance` calls
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// The solver backend
    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// The active configuration
    pub fn options(&self) -> &IntegratorOptions {
        &self.options
    }

    /// (Re)allocate solver memory and state from the model.
    ///
    /// Called on construction; may be called again to start a fresh
    /// simulation from the model's current state. Triggers already
    /// true at the initial instant fire here, since they will never
    /// produce a zero crossing for the root finder.
    pub fn initialize(&mut self) -> Result<()> {
        self.options.validate()?;
        let n = self.model.state_size();
        let num_events = self.model.num_events();

        self.queue.clear();
        self.last_time = 0.0;
        self.last_event_time = 0.0;

        if n == 0 && num_events == 0 {
            // Nothing continuous and nothing discrete: the advance
            // loop only re-evaluates the model at the target time.
            self.state = StateVector::new(0, self.options.abs_tol);
            self.initialized = true;
            return Ok(());
        }

        self.state = if n > 0 {
            let mut state = StateVector::new(n, self.options.abs_tol);
            state.load_from_model(&self.model)?;
            if self.options.tighten_tolerances {
                let chosen = state.tighten_tolerances(self.options.abs_tol);
                log::debug!("per-component absolute tolerance set to {:e}", chosen);
            }
            state
        } else {
            StateVector::placeholder(self.options.abs_tol)
        };

        self.solver.configure(&self.options)?;
        self.solver
            .init(0.0, self.state.y(), self.options.rel_tol, self.state.abs_tol())?;
        if num_events > 0 {
            self.solver.root_init(num_events)?;
        }
        self.model.reset_events();
        self.initialized = true;

        if self.follow_events && num_events > 0 {
            let mut handler = RootHandler::new(
                &mut self.model,
                &mut self.queue,
                &mut self.state,
                &mut self.solver,
            );
            if handler.handle_initial_time()? {
                log::debug!("initial-time triggers fired");
            }
        }
        Ok(())
    }

    /// Replace the tolerances, keeping everything else.
    pub fn set_tolerances(&mut self, abs_tol: f64, rel_tol: f64) -> Result<()> {
        self.options.abs_tol = abs_tol;
        self.options.rel_tol = rel_tol;
        self.options.validate()?;
        self.state.reset_tolerances(abs_tol);
        if !self.state.is_empty() {
            self.solver.set_tolerances(rel_tol, self.state.abs_tol())?;
        }
        Ok(())
    }

    /// Replace the configuration and push it into the solver.
    pub fn configure(&mut self, options: IntegratorOptions) -> Result<()> {
        options.validate()?;
        self.follow_events = options.follow_events;
        self.options = options;
        if !self.state.is_empty() {
            self.solver.configure(&self.options)?;
            self.state.reset_tolerances(self.options.abs_tol);
            self.solver
                .set_tolerances(self.options.rel_tol, self.state.abs_tol())?;
        }
        Ok(())
    }

    /// Enable or disable event handling at roots.
    pub fn set_follow_events(&mut self, follow: bool) {
        self.follow_events = follow;
        self.options.follow_events = follow;
    }

    /// Restart the integration at `t` from the model's current state,
    /// dropping pending assignments and event bookkeeping.
    pub fn reset(&mut self, t: f64) -> Result<()> {
        self.queue.clear();
        self.model.reset_events();
        if !self.state.is_empty() {
            self.re_start(t)?;
        }
        self.last_time = t;
        self.last_event_time = t;
        Ok(())
    }

    /// Advance the model from `t0` by `h`, returning the time reached.
    ///
    /// Either the full interval is covered (`t0 + h` within time
    /// resolution) or an error is returned; on error the driver
    /// re-initializes itself so a subsequent call can retry.
    pub fn advance(&mut self, t0: f64, h: f64) -> Result<f64> {
        match self.advance_inner(t0, h) {
            Ok(t_reached) => Ok(t_reached),
            Err(err) => {
                log::error!("advance from {} failed: {}", t0, err);
                if let Err(init_err) = self.initialize() {
                    log::error!("reinitialization after failure also failed: {}", init_err);
                }
                Err(err)
            }
        }
    }

    fn advance_inner(&mut self, t0: f64, h: f64) -> Result<f64> {
        if !self.initialized {
            return Err(RuntimeError::initialization("driver is not initialized"));
        }
        let t_end = t0 + h;
        let mut time_start = t0;
        let mut t_reached = t0;
        let mut strikes = CHATTER_STRIKES;

        while t_end - t_reached > TIME_EPSILON {
            if h < TIME_EPSILON {
                return Ok(t_end);
            }

            let n = self.model.state_size();
            if n == 0 && self.model.num_events() == 0 {
                self.model.convert_to_amounts();
                self.model.reevaluate(t_end)?;
                return Ok(t_end);
            }

            // A previous call may have left the solver past this
            // interval's start; rewind it.
            if self.last_time > time_start {
                self.re_start(time_start)?;
            }

            // Never integrate past a scheduled assignment time.
            let mut next_target = t_end;
            if let Some(fire_time) = self.queue.next_fire_time() {
                if fire_time < next_target {
                    next_target = fire_time;
                    self.queue.consume_next_fire_time();
                }
            }

            let (reached, outcome) = {
                let mut adapter = SystemAdapter {
                    model: &mut self.model,
                    state_size: n,
                };
                self.solver
                    .step(&mut adapter, next_target, self.state.y_mut())?
            };
            t_reached = reached;

            match outcome {
                StepOutcome::RootHit if self.follow_events => {
                    let chatter = (t_reached - self.last_event_time).abs() <= self.options.rel_tol;
                    if chatter {
                        strikes -= 1;
                    } else {
                        strikes = CHATTER_STRIKES;
                    }
                    if !chatter || strikes > 0 {
                        let root_dirs = self.solver.root_info().to_vec();
                        let mut handler = RootHandler::new(
                            &mut self.model,
                            &mut self.queue,
                            &mut self.state,
                            &mut self.solver,
                        );
                        handler.handle(t_reached, &root_dirs)?;
                        self.re_start(t_reached)?;
                        self.last_event_time = t_reached;
                    } else {
                        log::debug!(
                            "chatter guard: ignoring root at t = {:e} after {} strikes",
                            t_reached,
                            CHATTER_STRIKES
                        );
                    }
                }
                _ => {
                    // Converged, or a root we were told not to follow
                    self.model.set_time(t_end);
                    self.state.store_to_model(&mut self.model);
                }
            }

            if let Err(err) = self.model.test_constraints() {
                if err.is_constraint_violation() {
                    log::warn!("Constraint violated at time = {}: {}", t_reached, err);
                } else {
                    return Err(err.into());
                }
            }

            self.drain_pending_assignments(t_reached, t_end)?;

            if t_end - t_reached > TIME_EPSILON {
                time_start = t_reached;
            }
            self.last_time = t_reached;
        }
        Ok(t_reached)
    }

    /// Execute every scheduled assignment that has come due, newest
    /// scheduling first, restarting the solver after each.
    fn drain_pending_assignments(&mut self, t_reached: f64, t_out: f64) -> Result<()> {
        let due = self.queue.take_due(t_reached);
        for pending in due {
            log::debug!(
                "applying pending assignment of event {} at t = {:e}",
                pending.event(),
                t_reached
            );
            self.model.set_time(t_out);
            self.state.store_to_model(&mut self.model);
            self.model.convert_to_concentrations();
            self.model.update_dependent_species();
            self.model
                .perform_event_assignment(pending.event(), pending.values())?;
            if self.model.conserved_totals_changed() {
                self.model.compute_conserved_totals();
            }
            self.model.convert_to_amounts();
            self.model.reevaluate(t_reached)?;
            self.re_start(t_reached)?;
        }
        Ok(())
    }

    /// Reload the state vector from the model, re-apply step bounds,
    /// and restart the solver at `t`.
    fn re_start(&mut self, t: f64) -> Result<()> {
        self.state.load_from_model(&self.model)?;
        self.solver.set_step_bounds(
            self.options.init_step,
            self.options.min_step,
            self.options.max_step,
        );
        self.solver.reinit(t, self.state.y())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxn_core::{EventProfile, ModelResult};

    /// dy/dt = -y with no events
    struct Decay {
        y: f64,
        t: f64,
    }

    impl Decay {
        fn new(y0: f64) -> Self {
            Self { y: y0, t: 0.0 }
        }
    }

    impl KineticModel for Decay {
        fn state_size(&self) -> usize {
            1
        }
        fn num_events(&self) -> usize {
            0
        }
        fn get_state(&self, y: &mut [f64]) {
            y[0] = self.y;
        }
        fn set_state(&mut self, y: &[f64]) {
            self.y = y[0];
        }
        fn set_time(&mut self, t: f64) {
            self.t = t;
        }
        fn eval_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> ModelResult<()> {
            ydot[0] = -y[0];
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

    /// Model with no state and no events
    struct Empty;

    impl KineticModel for Empty {
        fn state_size(&self) -> usize {
            0
        }
        fn num_events(&self) -> usize {
            0
        }
        fn get_state(&self, _y: &mut [f64]) {}
        fn set_state(&mut self, _y: &[f64]) {}
        fn set_time(&mut self, _t: f64) {}
        fn eval_derivatives(
            &mut self,
            _t: f64,
            _y: &[f64],
            _ydot: &mut [f64],
        ) -> ModelResult<()> {
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

    fn tight_options() -> IntegratorOptions {
        IntegratorOptions::new(1e-12, 1e-10).unwrap()
    }

    #[test]
    fn test_continuous_advance_accuracy() {
        let mut driver = HybridDriver::new(Decay::new(1.0), tight_options()).unwrap();
        let t = driver.advance(0.0, 1.0).unwrap();
        assert_eq!(t, 1.0);
        let exact = (-1.0_f64).exp();
        assert!(
            (driver.model().y - exact).abs() < 1e-6,
            "y(1) = {}, exact = {}",
            driver.model().y,
            exact
        );
    }

    #[test]
    fn test_sequential_advances_continue() {
        let mut driver = HybridDriver::new(Decay::new(1.0), tight_options()).unwrap();
        driver.advance(0.0, 0.5).unwrap();
        driver.advance(0.5, 0.5).unwrap();
        let exact = (-1.0_f64).exp();
        assert!((driver.model().y - exact).abs() < 1e-6);
    }

    #[test]
    fn test_empty_model_advances_to_target() {
        let mut driver = HybridDriver::new(Empty, tight_options()).unwrap();
        let t = driver.advance(0.0, 2.0).unwrap();
        assert_eq!(t, 2.0);
    }

    #[test]
    fn test_zero_length_advance_is_noop() {
        let mut driver = HybridDriver::new(Decay::new(3.0), tight_options()).unwrap();
        let t = driver.advance(0.0, 0.0).unwrap();
        assert_eq!(t, 0.0);
        assert_eq!(driver.model().y, 3.0);
    }

    #[test]
    fn test_reset_then_zero_advance_is_noop() {
        let mut driver = HybridDriver::new(Decay::new(1.0), tight_options()).unwrap();
        driver.advance(0.0, 0.5).unwrap();
        let y_before = driver.model().y;
        driver.reset(0.5).unwrap();
        let t = driver.advance(0.5, 0.0).unwrap();
        assert_eq!(t, 0.5);
        assert_eq!(driver.model().y, y_before);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = IntegratorOptions {
            abs_tol: -1.0,
            ..IntegratorOptions::default()
        };
        assert!(HybridDriver::new(Decay::new(1.0), options).is_err());
    }

    #[test]
    fn test_rewind_restarts_from_interval_start() {
        let mut driver = HybridDriver::new(Decay::new(1.0), tight_options()).unwrap();
        driver.advance(0.0, 1.0).unwrap();
        // Rewind: the model state was stored at t = 1, so integrating
        // the same interval again decays it further.
        let y_at_1 = driver.model().y;
        driver.advance(0.0, 1.0).unwrap();
        let exact = y_at_1 * (-1.0_f64).exp();
        assert!(
            (driver.model().y - exact).abs() < 1e-6,
            "y = {}, exact = {}",
            driver.model().y,
            exact
        );
    }
}
