//! Discrete-event resolution at detected trigger crossings
//!
//! When the solver stops at a root, the [`RootHandler`] decides which
//! events actually fire, in what order, and with what values; applies
//! or schedules their assignments; chases cascades (assignments that
//! flip further triggers at the same instant); and restarts the solver
//! from the post-event state.

use std::collections::HashMap;

use rxn_core::{KineticModel, SnapshotMode, ValueCapture};

use crate::error::Result;
use crate::queue::PendingAssignmentQueue;
use crate::solver::StiffSolver;
use crate::state::StateVector;

/// Outcome of a trigger retest: what changed relative to the statuses
/// on entry.
#[derive(Debug, Default)]
struct RetestReport {
    /// Triggers that flipped false to true (cascade candidates)
    newly_true: Vec<usize>,
    /// Non-persistent triggers that flipped true to false (to retract)
    newly_false_nonpersistent: Vec<usize>,
}

/// Resolves the events behind a set of transitioned triggers.
///
/// Borrows the driver's collaborators for the duration of one root;
/// nothing is retained across calls.
pub struct RootHandler<'a, M: KineticModel, S: StiffSolver> {
    model: &'a mut M,
    queue: &'a mut PendingAssignmentQueue,
    state: &'a mut StateVector,
    solver: &'a mut S,
}

impl<'a, M: KineticModel, S: StiffSolver> RootHandler<'a, M, S> {
    /// Borrow the collaborators for one root resolution.
    pub fn new(
        model: &'a mut M,
        queue: &'a mut PendingAssignmentQueue,
        state: &'a mut StateVector,
        solver: &'a mut S,
    ) -> Self {
        Self {
            model,
            queue,
            state,
            solver,
        }
    }

    /// Resolve the triggers that transitioned at `t_root`.
    ///
    /// `root_dirs` holds one crossing direction per event, `+1` for a
    /// false-to-true transition. On return the model carries the
    /// post-event state and the solver has been restarted at `t_root`.
    pub fn handle(&mut self, t_root: f64, root_dirs: &[i8]) -> Result<()> {
        self.state.store_to_model(self.model);
        self.model.convert_to_concentrations();
        self.model.update_dependent_species();
        self.model.eval_events(t_root)?;

        let num_events = self.model.num_events();
        let mut candidates: Vec<usize> = Vec::new();
        let mut captured: HashMap<usize, Vec<f64>> = HashMap::new();

        for event in 0..num_events {
            if root_dirs[event] == 1 {
                // Fire only on a false-to-true transition that the
                // trigger itself confirms.
                if self.model.event_status(event) {
                    candidates.push(event);
                    if self.model.event_profile(event).capture == ValueCapture::TriggerTime {
                        captured.insert(event, self.model.compute_event_assignment(event)?);
                    }
                }
            } else if !self.model.event_profile(event).persistent {
                // Trigger is not on a rising edge: a non-persistent
                // event loses any assignment still waiting on a delay.
                self.queue.drop_event(event);
            }
        }

        log::debug!(
            "root at t = {:e}: {} candidate event(s)",
            t_root,
            candidates.len()
        );

        let mut handled: Vec<usize> = Vec::new();
        while !candidates.is_empty() {
            self.sort_by_priority(&mut candidates);
            let current = candidates[0];
            let profile = self.model.event_profile(current);

            if profile.delay == 0.0 {
                let values = if profile.capture == ValueCapture::TriggerTime {
                    captured.get(&current).map(|v| v.as_slice())
                } else {
                    None
                };
                self.model.perform_event_assignment(current, values)?;
                log::debug!("fired event {} at t = {:e}", current, t_root);
                handled.push(current);

                let report = self.retest(t_root, &handled, true)?;
                for &cascade in &report.newly_true {
                    if self.model.event_profile(cascade).capture == ValueCapture::TriggerTime {
                        captured.insert(cascade, self.model.compute_event_assignment(cascade)?);
                    }
                    candidates.push(cascade);
                }

                self.model.clear_event_status(current);
                candidates.retain(|&event| event != current);

                for &retracted in &report.newly_false_nonpersistent {
                    if let Some(pos) = candidates.iter().position(|&event| event == retracted) {
                        candidates.remove(pos);
                        self.queue.drop_event(retracted);
                    }
                }
            } else {
                let values = if profile.capture == ValueCapture::TriggerTime {
                    captured.get(&current).cloned()
                } else {
                    None
                };
                self.queue.schedule(current, t_root + profile.delay, values);
                log::debug!(
                    "scheduled event {} for t = {:e}",
                    current,
                    t_root + profile.delay
                );
                self.model.clear_event_status(current);
                candidates.retain(|&event| event != current);
            }
        }

        if self.model.conserved_totals_changed() {
            self.model.compute_conserved_totals();
        }
        self.model.convert_to_amounts();
        self.model.reevaluate(t_root)?;
        self.state.load_from_model(self.model)?;
        self.solver.reinit(t_root, self.state.y())
    }

    /// Probe the triggers at time `0` before any integration.
    ///
    /// Triggers that are already true at the initial instant never
    /// produce a zero crossing, so they are fired here as if every
    /// root had transitioned. Returns true when the handler ran.
    pub fn handle_initial_time(&mut self) -> Result<bool> {
        let num_events = self.model.num_events();
        if num_events == 0 {
            return Ok(false);
        }
        let report = self.retest(0.0, &[], false)?;
        if report.newly_true.is_empty() {
            return Ok(false);
        }
        let root_dirs = vec![1i8; num_events];
        self.handle(0.0, &root_dirs)?;
        Ok(true)
    }

    /// Re-evaluate every trigger at `t` under a snapshot and report
    /// what changed against the statuses on entry.
    ///
    /// With `restore` the snapshot is rolled back (a pure probe);
    /// otherwise the refreshed statuses are kept for the caller.
    fn retest(&mut self, t: f64, handled: &[usize], restore: bool) -> Result<RetestReport> {
        if self.model.conserved_totals_changed() {
            self.model.compute_conserved_totals();
        }
        self.model.convert_to_amounts();
        self.model.reevaluate(t)?;

        let num_events = self.model.num_events();
        let before: Vec<bool> = (0..num_events).map(|i| self.model.event_status(i)).collect();

        self.model.push_state();
        self.model.eval_events(t)?;

        let mut report = RetestReport::default();
        for event in 0..num_events {
            let after = self.model.event_status(event);
            if after && !before[event] && !handled.contains(&event) {
                report.newly_true.push(event);
            }
            if !after && before[event] && !self.model.event_profile(event).persistent {
                report.newly_false_nonpersistent.push(event);
            }
        }

        self.model.pop_state(if restore {
            SnapshotMode::Discard
        } else {
            SnapshotMode::Keep
        });
        Ok(report)
    }

    /// Order candidates by descending priority, ties by ascending
    /// event id. Priorities are re-read on every pass because they may
    /// reference state the previous firing changed.
    fn sort_by_priority(&mut self, events: &mut [usize]) {
        if events.len() < 2 {
            return;
        }
        let mut keyed: Vec<(usize, f64)> = events
            .iter()
            .map(|&event| (event, self.model.event_profile(event).priority))
            .collect();
        keyed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for (slot, (event, _)) in events.iter_mut().zip(keyed) {
            *slot = event;
        }
    }
}
