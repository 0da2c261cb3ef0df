//! Change tracking for incremental updates
//!
//! Every mutation made through a [`Document`](crate::Document) lands here as
//! a [`ChangeRecord`] keyed by reference, last write winning. The loaded
//! revision itself is never touched: the tracker is consulted before the
//! object store on every resolve, and the incremental writer serializes
//! exactly what it holds.

use crate::objects::{Object, ObjectId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// What a record does to its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A user edit or a newly created object
    Change,
    /// Written by the library on the user's behalf; does not by itself
    /// count as a user modification
    Synthetic,
    /// The reference becomes free in the next revision
    Delete,
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub id: ObjectId,
    /// The new value; `Null` for deletions
    pub value: Arc<Object>,
    pub kind: ChangeKind,
}

impl ChangeRecord {
    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }
}

#[derive(Debug)]
struct Changes {
    records: BTreeMap<ObjectId, ChangeRecord>,
    next_number: u32,
}

/// Map of pending changes plus the counter that mints new references,
/// behind one lock.
#[derive(Debug)]
pub struct ChangeTracker {
    inner: Mutex<Changes>,
}

impl ChangeTracker {
    /// A tracker whose first minted reference is `first_number 0 R`.
    pub fn new(first_number: u32) -> Self {
        Self {
            inner: Mutex::new(Changes {
                records: BTreeMap::new(),
                next_number: first_number.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Changes> {
        // Every update below is a single map operation, so a poisoned
        // lock never holds a half-applied change
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Upsert the change for `id`.
    pub fn record(&self, id: ObjectId, value: Object, kind: ChangeKind) {
        trace!("Recording {:?} for {}", kind, id);
        let value = match kind {
            ChangeKind::Delete => Arc::new(Object::Null),
            _ => Arc::new(value),
        };
        self.lock().records.insert(id, ChangeRecord { id, value, kind });
    }

    /// A fresh reference, never handed out before and not in use by any
    /// recorded change.
    pub fn next_reference(&self) -> ObjectId {
        let mut changes = self.lock();
        while changes
            .records
            .range(ObjectId::new(changes.next_number, 0)..=ObjectId::new(changes.next_number, u16::MAX))
            .next()
            .is_some()
        {
            changes.next_number += 1;
        }
        let id = ObjectId::new(changes.next_number, 0);
        changes.next_number += 1;
        id
    }

    /// The number the next call to [`next_reference`](Self::next_reference)
    /// starts from. Numbers at or above it have not been assigned.
    pub fn next_number(&self) -> u32 {
        self.lock().next_number
    }

    pub fn get(&self, id: ObjectId) -> Option<ChangeRecord> {
        self.lock().records.get(&id).cloned()
    }

    pub fn has_user_changes(&self) -> bool {
        self.lock()
            .records
            .values()
            .any(|record| record.kind != ChangeKind::Synthetic)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Snapshot of every record in ascending object number order.
    pub fn iterate_ascending(&self) -> Vec<ChangeRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// Forget every record. The reference counter keeps its position.
    pub fn clear(&self) {
        self.lock().records.clear();
    }
}
