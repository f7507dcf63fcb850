//! Delay-ordered queue of scheduled event assignments

/// One scheduled event assignment.
///
/// Immutable after construction: the firing time is the detection time
/// plus the event's delay, and trigger-time values are captured when
/// the trigger was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAssignment {
    event: usize,
    fire_time: f64,
    values: Option<Vec<f64>>,
}

impl PendingAssignment {
    /// Event this assignment belongs to
    pub fn event(&self) -> usize {
        self.event
    }

    /// Absolute time at which the assignment executes
    pub fn fire_time(&self) -> f64 {
        self.fire_time
    }

    /// Values captured at trigger detection, if the event captures
    /// at trigger time
    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }
}

/// Queue of pending assignments plus the schedule of distinct firing
/// times the driver must not integrate past.
///
/// Entries are kept in insertion order; the schedule is kept sorted
/// ascending and set-like (scheduling two assignments for the same
/// instant adds one schedule entry).
#[derive(Debug, Clone, Default)]
pub struct PendingAssignmentQueue {
    entries: Vec<PendingAssignment>,
    schedule: Vec<f64>,
}

impl PendingAssignmentQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending assignments
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no assignments are pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schedule an assignment for `event` at `fire_time`.
    ///
    /// `values` carries trigger-time captures; assignment-time events
    /// pass `None` and evaluate when they execute.
    pub fn schedule(&mut self, event: usize, fire_time: f64, values: Option<Vec<f64>>) {
        self.entries.push(PendingAssignment {
            event,
            fire_time,
            values,
        });
        if let Err(pos) = self
            .schedule
            .binary_search_by(|probe| probe.total_cmp(&fire_time))
        {
            self.schedule.insert(pos, fire_time);
        }
    }

    /// Earliest scheduled firing time, if any
    pub fn next_fire_time(&self) -> Option<f64> {
        self.schedule.first().copied()
    }

    /// Remove and return the earliest scheduled firing time.
    ///
    /// The driver consumes a time when it adopts it as the integration
    /// target; the assignments themselves stay queued until drained.
    pub fn consume_next_fire_time(&mut self) -> Option<f64> {
        if self.schedule.is_empty() {
            None
        } else {
            Some(self.schedule.remove(0))
        }
    }

    /// Remove and return every assignment with `fire_time <= t`, newest
    /// scheduling first.
    ///
    /// Reverse insertion order means that when two assignments for the
    /// same instant collide, the one scheduled later executes first.
    pub fn take_due(&mut self, t: f64) -> Vec<PendingAssignment> {
        let mut due = Vec::new();
        let mut i = self.entries.len();
        while i > 0 {
            i -= 1;
            if self.entries[i].fire_time <= t {
                due.push(self.entries.remove(i));
            }
        }
        self.prune_schedule();
        due
    }

    /// Cancel every scheduled assignment for `event`.
    ///
    /// Used when a non-persistent trigger falls back to false before
    /// its delay elapses.
    pub fn drop_event(&mut self, event: usize) {
        self.entries.retain(|pending| pending.event != event);
        self.prune_schedule();
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.schedule.clear();
    }

    /// Drop schedule times no remaining entry fires at.
    fn prune_schedule(&mut self) {
        let entries = &self.entries;
        self.schedule
            .retain(|&t| entries.iter().any(|pending| pending.fire_time == t));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_set_like() {
        let mut queue = PendingAssignmentQueue::new();
        queue.schedule(0, 0.7, None);
        queue.schedule(1, 0.7, Some(vec![1.0]));
        queue.schedule(2, 0.3, None);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.next_fire_time(), Some(0.3));
        // Two entries at 0.7, one schedule slot
        assert_eq!(queue.consume_next_fire_time(), Some(0.3));
        assert_eq!(queue.consume_next_fire_time(), Some(0.7));
        assert_eq!(queue.consume_next_fire_time(), None);
    }

    #[test]
    fn test_take_due_newest_first() {
        let mut queue = PendingAssignmentQueue::new();
        queue.schedule(0, 0.5, None);
        queue.schedule(1, 0.5, None);
        queue.schedule(2, 0.9, None);

        let due = queue.take_due(0.6);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].event(), 1);
        assert_eq!(due[1].event(), 0);

        // The 0.9 entry and its schedule slot survive
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_fire_time(), Some(0.9));
    }

    #[test]
    fn test_drop_event_prunes_orphaned_times() {
        let mut queue = PendingAssignmentQueue::new();
        queue.schedule(0, 0.4, None);
        queue.schedule(0, 0.8, None);
        queue.schedule(1, 0.8, None);

        queue.drop_event(0);
        assert_eq!(queue.len(), 1);
        // 0.4 had only event-0 entries and is gone; 0.8 still backed
        assert_eq!(queue.next_fire_time(), Some(0.8));
    }

    #[test]
    fn test_values_round_trip() {
        let mut queue = PendingAssignmentQueue::new();
        queue.schedule(3, 1.0, Some(vec![2.0, 4.0]));
        let due = queue.take_due(1.0);
        assert_eq!(due[0].event(), 3);
        assert_eq!(due[0].values(), Some(&[2.0, 4.0][..]));
        assert!(queue.is_empty());
        assert_eq!(queue.next_fire_time(), None);
    }

    #[test]
    fn test_clear() {
        let mut queue = PendingAssignmentQueue::new();
        queue.schedule(0, 0.1, None);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.next_fire_time(), None);
    }
}
