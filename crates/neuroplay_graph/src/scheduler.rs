// SPDX-License-Identifier: MIT OR Apache-2.0
//! Virtual-clock timers and frame callbacks.
//!
//! The graph never sleeps. A host loop advances the clock with
//! [`crate::Graph::advance`] and signals displayed frames with
//! [`crate::Graph::frame`]; due work runs inside those calls.

use crate::node::NodeId;
use crate::propagation::Firing;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Shortest delay a timer can have, so zero-delay timers that re-arm
/// themselves cannot spin inside a single `advance`
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Handle for a scheduled timer or frame request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// Work scheduled on behalf of a node
#[derive(Debug, Clone)]
pub(crate) enum Task {
    /// Finish a firing whose propagation was delayed
    Deferred {
        /// The firing to complete
        firing: Firing,
        /// Output of the first invocation
        output: Option<Value>,
    },
    /// Continue a repeat/recursive firing on a frame tick
    Resume(Firing),
    /// Call the plugin's timer hook
    Plugin(NodeId),
}

impl Task {
    fn node(&self) -> &NodeId {
        match self {
            Self::Deferred { firing, .. } | Self::Resume(firing) => &firing.node,
            Self::Plugin(node) => node,
        }
    }

    /// Whether this is engine work for one port
    fn targets_port(&self, node: &NodeId, port: &str) -> bool {
        match self {
            Self::Deferred { firing, .. } | Self::Resume(firing) => firing.node == *node && firing.port == port,
            Self::Plugin(_) => false,
        }
    }
}

#[derive(Debug)]
struct Timer {
    due: Duration,
    period: Option<Duration>,
    task: Task,
}

/// A timer that came due
#[derive(Debug)]
pub(crate) struct Expired {
    pub id: TimerId,
    pub due: Duration,
    pub task: Task,
}

/// Timer queue and frame queue
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    now: Duration,
    next_id: u64,
    timers: HashMap<TimerId, Timer>,
    queue: BTreeSet<(Duration, TimerId)>,
    frames: Vec<(TimerId, Task)>,
    frame_count: u64,
}

impl Scheduler {
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn allocate(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }

    /// Schedule `task` after `delay`, repeating every `period` if given
    pub fn schedule(&mut self, delay: Duration, period: Option<Duration>, task: Task) -> TimerId {
        let id = self.allocate();
        let due = self.now + delay.max(MIN_DELAY);
        self.timers.insert(id, Timer { due, period, task });
        self.queue.insert((due, id));
        id
    }

    /// Swap the task of a pending timer without moving its due time
    pub fn replace(&mut self, id: TimerId, task: Task) -> bool {
        match self.timers.get_mut(&id) {
            Some(timer) => {
                timer.task = task;
                true
            }
            None => false,
        }
    }

    /// Whether a timer is still pending
    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Task of a pending timer
    pub fn task(&self, id: TimerId) -> Option<&Task> {
        self.timers.get(&id).map(|timer| &timer.task)
    }

    /// Queue `task` for the next frame
    pub fn request_frame(&mut self, task: Task) -> TimerId {
        let id = self.allocate();
        self.frames.push((id, task));
        id
    }

    /// Cancel a timer or frame request
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if let Some(timer) = self.timers.remove(&id) {
            self.queue.remove(&(timer.due, id));
            return true;
        }
        let before = self.frames.len();
        self.frames.retain(|(frame_id, _)| *frame_id != id);
        self.frames.len() != before
    }

    /// Drop every timer and frame request that targets `node`
    pub fn cancel_node(&mut self, node: &NodeId) -> usize {
        let doomed: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.task.node() == node)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.cancel(*id);
        }
        let before = self.frames.len();
        self.frames.retain(|(_, task)| task.node() != node);
        doomed.len() + before - self.frames.len()
    }

    /// Drop the delayed firings and frame steps of one port.
    /// Plugin timers are left alone.
    pub fn cancel_port(&mut self, node: &NodeId, port: &str) -> usize {
        let doomed: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.task.targets_port(node, port))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.cancel(*id);
        }
        let before = self.frames.len();
        self.frames.retain(|(_, task)| !task.targets_port(node, port));
        doomed.len() + before - self.frames.len()
    }

    /// Pop the earliest timer due at or before `until`.
    /// Periodic timers are re-armed one period after their due time.
    pub fn pop_due(&mut self, until: Duration) -> Option<Expired> {
        let &(due, id) = self.queue.iter().next()?;
        if due > until {
            return None;
        }
        self.queue.remove(&(due, id));
        let timer = self.timers.remove(&id)?;
        let task = match timer.period {
            Some(period) => {
                let next = due + period.max(MIN_DELAY);
                let task = timer.task.clone();
                self.timers.insert(
                    id,
                    Timer {
                        due: next,
                        period: timer.period,
                        task: timer.task,
                    },
                );
                self.queue.insert((next, id));
                task
            }
            None => timer.task,
        };
        Some(Expired { id, due, task })
    }

    /// Take the tasks queued for this frame
    pub fn take_frame(&mut self) -> Vec<(TimerId, Task)> {
        self.frame_count += 1;
        std::mem::take(&mut self.frames)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.queue.clear();
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_task(node: &str) -> Task {
        Task::Plugin(NodeId::new(node))
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let mut scheduler = Scheduler::default();
        let late = scheduler.schedule(Duration::from_millis(30), None, plugin_task("a"));
        let early = scheduler.schedule(Duration::from_millis(10), None, plugin_task("b"));

        assert!(scheduler.pop_due(Duration::from_millis(5)).is_none());
        assert_eq!(scheduler.pop_due(Duration::from_millis(40)).unwrap().id, early);
        assert_eq!(scheduler.pop_due(Duration::from_millis(40)).unwrap().id, late);
        assert!(scheduler.pop_due(Duration::from_millis(40)).is_none());
    }

    #[test]
    fn test_interval_rearms() {
        let mut scheduler = Scheduler::default();
        let id = scheduler.schedule(
            Duration::from_millis(10),
            Some(Duration::from_millis(10)),
            plugin_task("a"),
        );
        let first = scheduler.pop_due(Duration::from_millis(25)).unwrap();
        let second = scheduler.pop_due(Duration::from_millis(25)).unwrap();
        assert_eq!((first.id, first.due), (id, Duration::from_millis(10)));
        assert_eq!((second.id, second.due), (id, Duration::from_millis(20)));
        assert!(scheduler.pop_due(Duration::from_millis(25)).is_none());
        assert_eq!(scheduler.pending_timers(), 1);

        assert!(scheduler.cancel(id));
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_cancel_node() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(Duration::from_millis(10), None, plugin_task("a"));
        scheduler.schedule(Duration::from_millis(10), None, plugin_task("b"));
        scheduler.request_frame(plugin_task("a"));

        assert_eq!(scheduler.cancel_node(&NodeId::new("a")), 2);
        assert_eq!(scheduler.pending_timers(), 1);
        assert_eq!(scheduler.pending_frames(), 0);
    }
}
