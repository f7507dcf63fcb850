//! Programmable in-memory model for driver tests
//!
//! Scenarios are scripted from closures: one for the derivatives and,
//! per event, one for the trigger gap, one producing assignment values,
//! and one applying them to the state. Snapshots are full copies, which
//! keeps the fixture trivially correct.

use rxn_core::{EventProfile, KineticModel, ModelResult, SnapshotMode, ValueCapture};

type RhsFn = Box<dyn Fn(f64, &[f64], &mut [f64])>;
type GapFn = Box<dyn Fn(f64, &[f64]) -> f64>;
type ValueFn = Box<dyn Fn(f64, &[f64]) -> Vec<f64>>;
type ApplyFn = Box<dyn Fn(&mut [f64], &[f64])>;

/// One scripted event: trigger gap, assignment, and metadata.
pub struct ScriptedEvent {
    trigger: GapFn,
    value: ValueFn,
    apply: ApplyFn,
    persistent: bool,
    capture: ValueCapture,
    priority: f64,
    delay: f64,
}

impl ScriptedEvent {
    /// Event with the given trigger gap and a no-op assignment,
    /// persistent, immediate, assignment-time values, no priority.
    pub fn new(trigger: impl Fn(f64, &[f64]) -> f64 + 'static) -> Self {
        Self {
            trigger: Box::new(trigger),
            value: Box::new(|_, _| Vec::new()),
            apply: Box::new(|_, _| {}),
            persistent: true,
            capture: ValueCapture::AssignmentTime,
            priority: f64::NAN,
            delay: 0.0,
        }
    }

    /// Set the assignment: `value` computes the right-hand sides,
    /// `apply` writes them into the state.
    pub fn assign(
        mut self,
        value: impl Fn(f64, &[f64]) -> Vec<f64> + 'static,
        apply: impl Fn(&mut [f64], &[f64]) + 'static,
    ) -> Self {
        self.value = Box::new(value);
        self.apply = Box::new(apply);
        self
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn non_persistent(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// Capture assignment values at trigger detection instead of at
    /// execution.
    pub fn capture_at_trigger(mut self) -> Self {
        self.capture = ValueCapture::TriggerTime;
        self
    }
}

struct Snapshot {
    t: f64,
    state: Vec<f64>,
    status: Vec<bool>,
    gaps: Vec<f64>,
}

/// A model scripted entirely from closures.
pub struct ScriptedModel {
    t: f64,
    state: Vec<f64>,
    rhs: RhsFn,
    events: Vec<ScriptedEvent>,
    status: Vec<bool>,
    gaps: Vec<f64>,
    snapshots: Vec<Snapshot>,
    fire_counts: Vec<usize>,
}

impl ScriptedModel {
    pub fn new(state: Vec<f64>, rhs: impl Fn(f64, &[f64], &mut [f64]) + 'static) -> Self {
        Self {
            t: 0.0,
            state,
            rhs: Box::new(rhs),
            events: Vec::new(),
            status: Vec::new(),
            gaps: Vec::new(),
            snapshots: Vec::new(),
            fire_counts: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: ScriptedEvent) -> Self {
        self.events.push(event);
        self.status.push(false);
        self.gaps.push(0.0);
        self.fire_counts.push(0);
        self
    }

    /// Current value of state component `index`
    pub fn species(&self, index: usize) -> f64 {
        self.state[index]
    }

    /// How many times event `index` has executed its assignment
    pub fn fire_count(&self, index: usize) -> usize {
        self.fire_counts[index]
    }

    /// Total assignment executions across all events
    pub fn total_fires(&self) -> usize {
        self.fire_counts.iter().sum()
    }
}

impl KineticModel for ScriptedModel {
    fn state_size(&self) -> usize {
        self.state.len()
    }

    fn num_events(&self) -> usize {
        self.events.len()
    }

    fn get_state(&self, y: &mut [f64]) {
        y.copy_from_slice(&self.state);
    }

    fn set_state(&mut self, y: &[f64]) {
        self.state.copy_from_slice(y);
    }

    fn set_time(&mut self, t: f64) {
        self.t = t;
    }

    fn eval_derivatives(&mut self, t: f64, y: &[f64], ydot: &mut [f64]) -> ModelResult<()> {
        (self.rhs)(t, y, ydot);
        Ok(())
    }

    fn reevaluate(&mut self, t: f64) -> ModelResult<()> {
        self.t = t;
        Ok(())
    }

    fn eval_events(&mut self, t: f64) -> ModelResult<()> {
        self.t = t;
        for i in 0..self.events.len() {
            let gap = (self.events[i].trigger)(t, &self.state);
            self.gaps[i] = gap;
            self.status[i] = gap > 0.0;
        }
        Ok(())
    }

    fn event_status(&self, index: usize) -> bool {
        self.status[index]
    }

    fn clear_event_status(&mut self, index: usize) {
        self.status[index] = false;
    }

    fn trigger_gaps(&self, out: &mut [f64]) {
        out.copy_from_slice(&self.gaps);
    }

    fn event_profile(&self, index: usize) -> EventProfile {
        let event = &self.events[index];
        EventProfile {
            persistent: event.persistent,
            capture: event.capture,
            priority: event.priority,
            delay: event.delay,
        }
    }

    fn compute_event_assignment(&mut self, index: usize) -> ModelResult<Vec<f64>> {
        Ok((self.events[index].value)(self.t, &self.state))
    }

    fn perform_event_assignment(
        &mut self,
        index: usize,
        values: Option<&[f64]>,
    ) -> ModelResult<()> {
        let rhs_values = match values {
            Some(v) => v.to_vec(),
            None => (self.events[index].value)(self.t, &self.state),
        };
        (self.events[index].apply)(&mut self.state, &rhs_values);
        self.fire_counts[index] += 1;
        Ok(())
    }

    fn push_state(&mut self) {
        self.snapshots.push(Snapshot {
            t: self.t,
            state: self.state.clone(),
            status: self.status.clone(),
            gaps: self.gaps.clone(),
        });
    }

    fn pop_state(&mut self, mode: SnapshotMode) {
        if let Some(snapshot) = self.snapshots.pop() {
            if mode == SnapshotMode::Discard {
                self.t = snapshot.t;
                self.state = snapshot.state;
                self.status = snapshot.status;
                self.gaps = snapshot.gaps;
            }
        }
    }
}
