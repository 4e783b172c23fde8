//! Time-ordered trigger schedule.
//!
//! Entries are kept in a `BTreeMap` keyed by (trigger time, insertion
//! sequence), so the earliest trigger is the first key and rescheduling is
//! a remove plus an insert, both O(log n). The sequence number breaks ties
//! deterministically; it never makes two equal times unequal for the
//! purposes of [`EventQueue::simultaneous`].
//!
//! Time equality is exact `f64` equality. In practice simultaneous triggers
//! come from structurally identical end-time formulas (mirrored subsystems
//! with the same coefficients), not from coincidence.

use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct EventTime(f64);

impl EventTime {
    fn new(time: f64) -> Self {
        // Fold -0.0 into +0.0 so total ordering agrees with `==`
        EventTime(time + 0.0)
    }
}

impl PartialEq for EventTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventTime {}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Opaque reference to a scheduled entry, held by the scheduled variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventHandle {
    time: EventTime,
    seq: u64,
}

impl EventHandle {
    /// Trigger time this handle was scheduled for.
    pub fn time(&self) -> f64 {
        self.time.0
    }
}

/// Priority schedule of (trigger time, target) entries.
#[derive(Debug, Clone)]
pub struct EventQueue<V> {
    entries: BTreeMap<EventHandle, V>,
    next_seq: u64,
}

impl<V> Default for EventQueue<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<V: Copy> EventQueue<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Required between runs.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    /// Schedules `target` at `time`.
    pub fn add(&mut self, time: f64, target: V) -> EventHandle {
        debug_assert!(!time.is_nan(), "event time must not be NaN");
        let handle = EventHandle {
            time: EventTime::new(time),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(handle, target);
        handle
    }

    /// Moves an existing entry to `time`. Returns `None` for a stale handle.
    pub fn shift(&mut self, time: f64, handle: EventHandle) -> Option<EventHandle> {
        let target = self.entries.remove(&handle)?;
        Some(self.add(time, target))
    }

    pub fn remove(&mut self, handle: EventHandle) -> Option<V> {
        self.entries.remove(&handle)
    }

    pub fn contains(&self, handle: EventHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Earliest trigger time, `f64::INFINITY` when empty.
    pub fn top_time(&self) -> f64 {
        self.entries
            .keys()
            .next()
            .map_or(f64::INFINITY, |handle| handle.time.0)
    }

    /// Earliest target without removing it.
    pub fn top(&self) -> Option<V> {
        self.entries.values().next().copied()
    }

    /// Removes and returns the earliest entry.
    pub fn pop(&mut self) -> Option<(f64, V)> {
        self.entries
            .pop_first()
            .map(|(handle, target)| (handle.time.0, target))
    }

    /// True iff at least two entries share the minimum trigger time.
    pub fn simultaneous(&self) -> bool {
        let mut keys = self.entries.keys();
        match (keys.next(), keys.next()) {
            (Some(first), Some(second)) => first.time == second.time,
            _ => false,
        }
    }

    /// Every target scheduled at the minimum trigger time, in queue order.
    pub fn simultaneous_variables(&self) -> Vec<V> {
        let mut iter = self.entries.iter();
        let Some((first, &target)) = iter.next() else {
            return Vec::new();
        };
        let mut tied = vec![target];
        tied.extend(
            iter.take_while(|(handle, _)| handle.time == first.time)
                .map(|(_, &target)| target),
        );
        tied
    }

    /// All entries in trigger order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, V)> + '_ {
        self.entries
            .iter()
            .map(|(handle, &target)| (handle.time.0, target))
    }
}
