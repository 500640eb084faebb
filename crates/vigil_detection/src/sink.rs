//! # Violation Sinks
//!
//! Where emitted violations go. `offer` is called on the detection path, so
//! every implementation must return immediately: hand off, never write.
//!
//! Delivery is at-most-once. A sink that cannot take a violation returns an
//! error; the engine logs it and moves on.

use crate::error::SinkError;
use crate::violation::Violation;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use vigil_shared::EntityId;

/// Receives emitted violations.
pub trait ViolationSink: Send + Sync {
    /// Takes ownership of a violation without blocking.
    ///
    /// # Errors
    ///
    /// [`SinkError`] if the violation could not be accepted. It is dropped.
    fn offer(&self, violation: Violation) -> Result<(), SinkError>;
}

// =============================================================================
// CHANNEL SINK
// =============================================================================

/// Hands violations to another thread over a bounded channel.
///
/// A full channel drops the violation instead of blocking the tick.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Violation>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the consumer thread drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<Violation>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl ViolationSink for ChannelSink {
    fn offer(&self, violation: Violation) -> Result<(), SinkError> {
        self.sender.try_send(violation).map_err(|err| match err {
            TrySendError::Full(v) => SinkError::Full { entity: v.entity.to_string() },
            TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}

// =============================================================================
// VIOLATION LOG
// =============================================================================

/// Default violations kept per entity.
pub const DEFAULT_LOG_DEPTH: usize = 100;

/// Keeps the most recent violations of each entity for admin queries.
#[derive(Debug)]
pub struct ViolationLog {
    per_entity: Mutex<HashMap<EntityId, VecDeque<Violation>>>,
    depth: usize,
}

impl Default for ViolationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_DEPTH)
    }
}

impl ViolationLog {
    /// Creates a log keeping `depth` violations per entity.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self { per_entity: Mutex::new(HashMap::new()), depth: depth.max(1) }
    }

    /// Newest-last copy of an entity's logged violations.
    #[must_use]
    pub fn recent(&self, id: EntityId) -> Vec<Violation> {
        self.per_entity
            .lock()
            .get(&id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forgets an entity's history.
    pub fn clear(&self, id: EntityId) {
        self.per_entity.lock().remove(&id);
    }
}

impl ViolationSink for ViolationLog {
    fn offer(&self, violation: Violation) -> Result<(), SinkError> {
        let mut per_entity = self.per_entity.lock();
        let log = per_entity
            .entry(violation.entity)
            .or_insert_with(|| VecDeque::with_capacity(self.depth));
        if log.len() == self.depth {
            log.pop_front();
        }
        log.push_back(violation);
        Ok(())
    }
}

// =============================================================================
// COLLECTING SINK
// =============================================================================

/// Buffers violations until taken. Used by the replay harness.
#[derive(Debug, Default)]
pub struct CollectingSink {
    buffer: Mutex<Vec<Violation>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything collected so far, in emission order.
    pub fn take(&self) -> Vec<Violation> {
        std::mem::take(&mut *self.buffer.lock())
    }

    /// Collected count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl ViolationSink for CollectingSink {
    fn offer(&self, violation: Violation) -> Result<(), SinkError> {
        self.buffer.lock().push(violation);
        Ok(())
    }
}

// =============================================================================
// TRACING SINK
// =============================================================================

/// Writes each violation as a `tracing` event at WARN.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ViolationSink for TracingSink {
    fn offer(&self, violation: Violation) -> Result<(), SinkError> {
        tracing::warn!(
            entity = violation.entity.0,
            category = violation.category.as_str(),
            metric = violation.metric,
            "{}",
            violation.detail
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::ViolationCategory;

    fn violation(entity: u64, time_ms: u64) -> Violation {
        Violation {
            entity: EntityId(entity),
            category: ViolationCategory::Reach,
            metric: 4.0,
            detail: "test".to_owned(),
            time_ms,
        }
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, rx) = ChannelSink::new(1);
        assert!(sink.offer(violation(1, 0)).is_ok());
        assert_eq!(
            sink.offer(violation(1, 1)),
            Err(SinkError::Full { entity: "#1".to_owned() })
        );
        assert_eq!(rx.try_recv().unwrap().time_ms, 0);

        drop(rx);
        assert_eq!(sink.offer(violation(1, 2)), Err(SinkError::Disconnected));
    }

    #[test]
    fn test_log_keeps_most_recent() {
        let log = ViolationLog::new(3);
        for t in 0..5 {
            log.offer(violation(7, t)).unwrap();
        }
        log.offer(violation(8, 99)).unwrap();

        let times: Vec<u64> = log.recent(EntityId(7)).iter().map(|v| v.time_ms).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(log.recent(EntityId(8)).len(), 1);

        log.clear(EntityId(7));
        assert!(log.recent(EntityId(7)).is_empty());
    }

    #[test]
    fn test_collecting_sink_take() {
        let sink = CollectingSink::new();
        sink.offer(violation(1, 0)).unwrap();
        sink.offer(violation(2, 1)).unwrap();

        assert_eq!(sink.len(), 2);
        let taken = sink.take();
        assert_eq!(taken[1].entity, EntityId(2));
        assert!(sink.is_empty());
    }
}
