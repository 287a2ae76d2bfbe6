//! Event queue — future occurrences keyed by kind and tick.
//!
//! At most one event per (kind, target) is live. Scheduling an existing
//! (kind, target) at another tick moves it; at the same tick it is a
//! no-op.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::Tick;
use crate::job::JobId;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobSubmission,
    JobStart,
    JobPause,
    JobRestart,
    JobFinish,
    NodeUpdate,
    DrRequest,
}

/// What an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventTarget {
    Job(JobId),
    Node(NodeId),
    /// Index into the cluster's DR request list.
    Request(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub tick: Tick,
    pub target: EventTarget,
}

impl Event {
    pub fn job(kind: EventKind, tick: Tick, job: JobId) -> Self {
        Self {
            kind,
            tick,
            target: EventTarget::Job(job),
        }
    }

    pub fn node_update(tick: Tick, node: NodeId) -> Self {
        Self {
            kind: EventKind::NodeUpdate,
            tick,
            target: EventTarget::Node(node),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    slots: BTreeMap<EventKind, BTreeMap<Tick, Vec<EventTarget>>>,
    index: HashMap<(EventKind, EventTarget), Tick>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, moving any live event for the same (kind, target).
    pub fn schedule(&mut self, event: Event) {
        match self.index.get(&(event.kind, event.target)) {
            Some(&tick) if tick == event.tick => return,
            Some(_) => {
                self.unschedule(event.kind, event.target);
            }
            None => {}
        }
        self.slots
            .entry(event.kind)
            .or_default()
            .entry(event.tick)
            .or_default()
            .push(event.target);
        self.index.insert((event.kind, event.target), event.tick);
    }

    /// Remove the live event for (kind, target). Returns its tick.
    pub fn unschedule(&mut self, kind: EventKind, target: EventTarget) -> Option<Tick> {
        let tick = self.index.remove(&(kind, target))?;
        if let Some(by_tick) = self.slots.get_mut(&kind) {
            if let Some(targets) = by_tick.get_mut(&tick) {
                targets.retain(|t| *t != target);
                if targets.is_empty() {
                    by_tick.remove(&tick);
                }
            }
        }
        Some(tick)
    }

    /// Move the event for (kind, target) to `tick`, creating it if absent.
    pub fn reschedule(&mut self, kind: EventKind, target: EventTarget, tick: Tick) {
        self.unschedule(kind, target);
        self.schedule(Event { kind, tick, target });
    }

    pub fn mark_handled(&mut self, kind: EventKind, target: EventTarget) {
        self.unschedule(kind, target);
    }

    /// Targets of `kind` due at `tick`, in insertion order.
    pub fn events_at(&self, kind: EventKind, tick: Tick) -> Vec<EventTarget> {
        self.slots
            .get(&kind)
            .and_then(|by_tick| by_tick.get(&tick))
            .cloned()
            .unwrap_or_default()
    }

    /// All ticks that hold an event of `kind`, ascending.
    pub fn all_keys(&self, kind: EventKind) -> Vec<Tick> {
        self.slots
            .get(&kind)
            .map(|by_tick| by_tick.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn time_of(&self, kind: EventKind, target: EventTarget) -> Option<Tick> {
        self.index.get(&(kind, target)).copied()
    }

    /// Drop every event at `tick`, of any kind.
    pub fn remove_key(&mut self, tick: Tick) {
        for (kind, by_tick) in self.slots.iter_mut() {
            if let Some(targets) = by_tick.remove(&tick) {
                for target in targets {
                    self.index.remove(&(*kind, target));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
