use std::collections::{BTreeMap, HashMap};

use hoard_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::record::{ObjectRecord, ObjectState};

/// Map from object identifier to object record.
///
/// Live records (Created or Sealed) are keyed by id; at most one exists per
/// id. Deleted records that still have readers move to a draining set keyed
/// by `(id, serial)`, so the id can be reused while older generations drain.
///
/// The directory has no lock of its own. The store only touches it while
/// holding its state mutex, which makes every operation here atomic with
/// respect to the others.
#[derive(Debug, Default)]
pub struct ObjectDirectory {
    live: HashMap<ObjectId, ObjectRecord>,
    draining: BTreeMap<(ObjectId, u64), ObjectRecord>,
}

impl ObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a live record. Fails if a live record already exists for the id.
    pub fn insert(&mut self, record: ObjectRecord) -> StoreResult<()> {
        if self.live.contains_key(&record.id) {
            return Err(StoreError::DuplicateObject(record.id));
        }
        debug_assert!(record.is_live(), "only live records enter the directory");
        self.live.insert(record.id, record);
        Ok(())
    }

    /// The live record for `id`.
    pub fn lookup(&self, id: &ObjectId) -> StoreResult<&ObjectRecord> {
        self.live.get(id).ok_or(StoreError::NotFound(*id))
    }

    pub fn lookup_mut(&mut self, id: &ObjectId) -> StoreResult<&mut ObjectRecord> {
        self.live.get_mut(id).ok_or(StoreError::NotFound(*id))
    }

    /// `true` if a Created or Sealed record exists for `id`.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.live.contains_key(id)
    }

    /// `true` if any Deleted generation of `id` is still waiting on readers.
    pub fn is_draining(&self, id: &ObjectId) -> bool {
        self.draining
            .range((*id, 0)..=(*id, u64::MAX))
            .next()
            .is_some()
    }

    /// Mark the live record for `id` Deleted and move it to the draining set.
    ///
    /// Returns the serial of the retired generation.
    pub fn retire(&mut self, id: &ObjectId) -> StoreResult<u64> {
        let mut record = self.live.remove(id).ok_or(StoreError::NotFound(*id))?;
        record.state = ObjectState::Deleted;
        let serial = record.serial;
        self.draining.insert((*id, serial), record);
        Ok(serial)
    }

    /// A specific generation, live or draining.
    pub fn record_mut(&mut self, id: &ObjectId, serial: u64) -> StoreResult<&mut ObjectRecord> {
        if self.live.get(id).is_some_and(|r| r.serial == serial) {
            return self.live.get_mut(id).ok_or(StoreError::NotFound(*id));
        }
        self.draining
            .get_mut(&(*id, serial))
            .ok_or(StoreError::NotFound(*id))
    }

    /// Drop a Deleted, unreferenced record and hand it back.
    ///
    /// Fails with [`StoreError::RecordBusy`] while the record is live or still
    /// referenced.
    pub fn remove(&mut self, id: &ObjectId, serial: u64) -> StoreResult<ObjectRecord> {
        let record = self.record_mut(id, serial)?;
        if record.state != ObjectState::Deleted || record.ref_count != 0 {
            return Err(StoreError::RecordBusy {
                id: *id,
                ref_count: record.ref_count,
            });
        }
        self.draining
            .remove(&(*id, serial))
            .ok_or(StoreError::NotFound(*id))
    }

    /// Number of live records.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Number of Deleted records still held by readers.
    pub fn draining_len(&self) -> usize {
        self.draining.len()
    }

    /// Every record, live and draining, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.live.values().chain(self.draining.values())
    }

    /// Live records only.
    pub fn live_records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.live.values()
    }
}

#[cfg(test)]
mod tests {
    use hoard_arena::MemoryRange;

    use super::*;

    fn id(n: u8) -> ObjectId {
        ObjectId::from_raw([n; 16])
    }

    fn record(n: u8, serial: u64) -> ObjectRecord {
        ObjectRecord::new(id(n), serial, MemoryRange::new(n as usize * 10, 10))
    }

    #[test]
    fn insert_and_lookup() {
        let mut dir = ObjectDirectory::new();
        dir.insert(record(1, 1)).unwrap();
        assert!(dir.contains(&id(1)));
        assert_eq!(dir.lookup(&id(1)).unwrap().serial, 1);
        assert!(matches!(dir.lookup(&id(2)), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn duplicate_live_insert_fails() {
        let mut dir = ObjectDirectory::new();
        dir.insert(record(1, 1)).unwrap();
        assert!(matches!(
            dir.insert(record(1, 2)),
            Err(StoreError::DuplicateObject(_))
        ));
        assert_eq!(dir.lookup(&id(1)).unwrap().serial, 1);
    }

    #[test]
    fn retired_id_can_be_reused() {
        let mut dir = ObjectDirectory::new();
        dir.insert(record(1, 1)).unwrap();
        dir.lookup_mut(&id(1)).unwrap().ref_count = 1;
        dir.retire(&id(1)).unwrap();
        assert!(!dir.contains(&id(1)));
        assert!(dir.is_draining(&id(1)));

        dir.insert(record(1, 2)).unwrap();
        assert_eq!(dir.live_len(), 1);
        assert_eq!(dir.draining_len(), 1);
        assert_eq!(dir.record_mut(&id(1), 1).unwrap().state, ObjectState::Deleted);
        assert_eq!(dir.record_mut(&id(1), 2).unwrap().state, ObjectState::Created);
    }

    #[test]
    fn remove_requires_deleted_and_unreferenced() {
        let mut dir = ObjectDirectory::new();
        dir.insert(record(1, 1)).unwrap();
        assert!(matches!(
            dir.remove(&id(1), 1),
            Err(StoreError::RecordBusy { ref_count: 0, .. })
        ));

        dir.lookup_mut(&id(1)).unwrap().ref_count = 2;
        dir.retire(&id(1)).unwrap();
        assert!(matches!(
            dir.remove(&id(1), 1),
            Err(StoreError::RecordBusy { ref_count: 2, .. })
        ));

        dir.record_mut(&id(1), 1).unwrap().ref_count = 0;
        let removed = dir.remove(&id(1), 1).unwrap();
        assert_eq!(removed.serial, 1);
        assert!(!dir.is_draining(&id(1)));
        assert!(matches!(dir.remove(&id(1), 1), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn draining_is_scoped_per_id() {
        let mut dir = ObjectDirectory::new();
        dir.insert(record(1, 1)).unwrap();
        dir.insert(record(2, 2)).unwrap();
        dir.retire(&id(2)).unwrap();
        assert!(!dir.is_draining(&id(1)));
        assert!(dir.is_draining(&id(2)));
        assert_eq!(dir.records().count(), 2);
        assert_eq!(dir.live_records().count(), 1);
    }

    #[test]
    fn record_mut_rejects_unknown_serial() {
        let mut dir = ObjectDirectory::new();
        dir.insert(record(1, 5)).unwrap();
        assert!(dir.record_mut(&id(1), 4).is_err());
    }
}
