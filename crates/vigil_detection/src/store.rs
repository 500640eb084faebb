//! # Entity Store
//!
//! Arena of [`EntityRecord`]s keyed by entity id.
//!
//! ```text
//! RwLock<Registry { live: HashMap<EntityId, Arc<Mutex<EntityRecord>>>, departed }>
//!   │                           │
//!   │ map lock: held only to     └─ record lock: single writer per entity,
//!   │ look up / insert / remove     held for one evaluation
//! ```
//!
//! The map lock is never held while a record lock is taken for detection,
//! so evaluations of different entities never wait on each other.
//!
//! ## Leave races
//!
//! `leave` removes the entry and marks the record `retired` under its own
//! lock. An evaluation that already cloned the handle sees `retired` once it
//! acquires the lock and drops its work.
//!
//! The departed id is remembered in a bounded tombstone set. Telemetry for a
//! tombstoned id finds no handle, so late packets neither resurrect the
//! entity nor leak a record. A fresh join clears the tombstone. Ids never
//! seen before are still tracked lazily.

use crate::record::EntityRecord;
use crate::violation::{Check, ViolationLevels};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use vigil_shared::{EntityId, TimestampMs, Vec3};

/// Departed ids remembered before the oldest is forgotten.
pub const DEPARTED_CAPACITY: usize = 4_096;

/// Shared handle to one record.
pub type EntityHandle = Arc<Mutex<EntityRecord>>;

/// Admin view of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySummary {
    /// Entity identifier.
    pub id: EntityId,
    /// Name given on join.
    pub display_name: String,
    /// Level per check.
    pub levels: [(Check, u32); Check::COUNT],
}

/// Live records plus tombstones of departed ids.
#[derive(Default)]
struct Registry {
    live: HashMap<EntityId, EntityHandle>,
    departed: HashSet<EntityId>,
    departed_order: VecDeque<EntityId>,
}

impl Registry {
    fn bury(&mut self, id: EntityId) {
        if !self.departed.insert(id) {
            return;
        }
        self.departed_order.push_back(id);
        while self.departed_order.len() > DEPARTED_CAPACITY {
            if let Some(oldest) = self.departed_order.pop_front() {
                self.departed.remove(&oldest);
            }
        }
    }

    fn unbury(&mut self, id: EntityId) {
        if self.departed.remove(&id) {
            self.departed_order.retain(|d| *d != id);
        }
    }
}

/// Per-entity state arena.
#[derive(Default)]
pub struct EntityStore {
    records: RwLock<Registry>,
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an entity, or renames a lazily created one.
    /// Clears any tombstone left by an earlier leave.
    pub fn join(
        &self,
        id: EntityId,
        display_name: &str,
        position: Vec3,
        now: TimestampMs,
    ) -> EntityHandle {
        let handle = {
            let mut records = self.records.write();
            records.unbury(id);
            let handle = records
                .live
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(EntityRecord::new(id, display_name))));
            Arc::clone(handle)
        };
        {
            let mut record = handle.lock();
            display_name.clone_into(&mut record.display_name);
            record.rebaseline(position, now);
        }
        handle
    }

    /// Stops tracking an entity. Returns `false` if it was not tracked.
    pub fn leave(&self, id: EntityId) -> bool {
        let removed = {
            let mut records = self.records.write();
            let removed = records.live.remove(&id);
            if removed.is_some() {
                records.bury(id);
            }
            removed
        };
        match removed {
            Some(handle) => {
                handle.lock().retired = true;
                true
            }
            None => false,
        }
    }

    /// Handle for an entity, created on first sight.
    ///
    /// Returns `None` for an id that left and has not joined again.
    pub fn get_or_create(&self, id: EntityId) -> Option<EntityHandle> {
        {
            let records = self.records.read();
            if let Some(handle) = records.live.get(&id) {
                return Some(Arc::clone(handle));
            }
            if records.departed.contains(&id) {
                return None;
            }
        }

        let mut records = self.records.write();
        if records.departed.contains(&id) {
            return None;
        }
        let handle = records.live.entry(id).or_insert_with(|| {
            tracing::debug!("Tracking {} lazily (no join seen)", id);
            Arc::new(Mutex::new(EntityRecord::new(id, id.to_string())))
        });
        Some(Arc::clone(handle))
    }

    /// Whether `id` left and has not joined again.
    #[must_use]
    pub fn is_departed(&self, id: EntityId) -> bool {
        self.records.read().departed.contains(&id)
    }

    /// Handle for a tracked entity.
    #[must_use]
    pub fn handle(&self, id: EntityId) -> Option<EntityHandle> {
        self.records.read().live.get(&id).map(Arc::clone)
    }

    /// Snapshot of every handle, sorted by id.
    ///
    /// The map lock is released before this returns.
    #[must_use]
    pub fn handles(&self) -> Vec<(EntityId, EntityHandle)> {
        let mut handles: Vec<_> = self
            .records
            .read()
            .live
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();
        handles.sort_unstable_by_key(|(id, _)| *id);
        handles
    }

    /// Tracked entity count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().live.len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().live.is_empty()
    }

    /// Current violation levels of an entity.
    #[must_use]
    pub fn summary(&self, id: EntityId) -> Option<EntitySummary> {
        let handle = self.handle(id)?;
        let record = handle.lock();
        Some(EntitySummary {
            id,
            display_name: record.display_name.clone(),
            levels: record.levels.snapshot(),
        })
    }

    /// Levels of an entity.
    #[must_use]
    pub fn levels(&self, id: EntityId) -> Option<ViolationLevels> {
        self.handle(id).map(|handle| handle.lock().levels)
    }

    /// Retires and forgets every record (host shutdown).
    pub fn retire_all(&self) {
        let drained: Vec<(EntityId, EntityHandle)> = {
            let mut records = self.records.write();
            let drained: Vec<_> = records.live.drain().collect();
            for (id, _) in &drained {
                records.bury(*id);
            }
            drained
        };
        for (_, handle) in drained {
            handle.lock().retired = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy(store: &EntityStore, id: u64) -> EntityHandle {
        store.get_or_create(EntityId(id)).unwrap()
    }

    #[test]
    fn test_lazy_create_then_join_keeps_record() {
        let store = EntityStore::new();
        let early = lazy(&store, 4);
        early.lock().levels.counter_mut(Check::Reach).escalate(0, 10);

        let joined = store.join(EntityId(4), "dana", Vec3::ZERO, 100);

        assert!(Arc::ptr_eq(&early, &joined));
        assert_eq!(store.len(), 1);
        let summary = store.summary(EntityId(4)).unwrap();
        assert_eq!(summary.display_name, "dana");
        assert!(summary.levels.contains(&(Check::Reach, 1)));
    }

    #[test]
    fn test_leave_retires_in_flight_handle() {
        let store = EntityStore::new();
        let handle = store.join(EntityId(1), "a", Vec3::ZERO, 0);

        assert!(store.leave(EntityId(1)));
        assert!(handle.lock().retired);
        assert!(store.handle(EntityId(1)).is_none());
        assert!(!store.leave(EntityId(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_departed_id_not_recreated() {
        let store = EntityStore::new();
        for _ in 0..1_000 {
            store.join(EntityId(1), "a", Vec3::ZERO, 0);
            store.leave(EntityId(1));
            assert!(store.get_or_create(EntityId(1)).is_none());
        }
        assert!(store.is_empty());
        assert!(store.is_departed(EntityId(1)));
    }

    #[test]
    fn test_rejoin_clears_tombstone() {
        let store = EntityStore::new();
        let first = store.join(EntityId(1), "a", Vec3::ZERO, 0);
        first.lock().levels.counter_mut(Check::Speed).escalate(0, 10);
        store.leave(EntityId(1));

        let second = store.join(EntityId(1), "a", Vec3::ZERO, 500);

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!store.is_departed(EntityId(1)));
        assert_eq!(second.lock().levels.level(Check::Speed), 0);
        assert!(Arc::ptr_eq(&lazy(&store, 1), &second));
    }

    #[test]
    fn test_tombstones_bounded() {
        let store = EntityStore::new();
        let total = DEPARTED_CAPACITY as u64 + 10;
        for id in 0..total {
            store.join(EntityId(id), "x", Vec3::ZERO, 0);
            store.leave(EntityId(id));
        }

        // Oldest tombstones are forgotten first.
        assert!(!store.is_departed(EntityId(0)));
        assert!(!store.is_departed(EntityId(9)));
        assert!(store.is_departed(EntityId(10)));
        assert!(store.is_departed(EntityId(total - 1)));
        assert_eq!(store.records.read().departed_order.len(), DEPARTED_CAPACITY);
    }

    #[test]
    fn test_handles_sorted() {
        let store = EntityStore::new();
        for id in [9, 2, 5] {
            lazy(&store, id);
        }
        let ids: Vec<u64> = store.handles().iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_retire_all() {
        let store = EntityStore::new();
        let a = lazy(&store, 1);
        let b = lazy(&store, 2);

        store.retire_all();

        assert!(store.is_empty());
        assert!(a.lock().retired && b.lock().retired);
        assert!(store.get_or_create(EntityId(1)).is_none());
    }
}
