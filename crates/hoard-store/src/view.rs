use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use hoard_arena::MemoryRange;
use hoard_types::ObjectId;
use tracing::warn;

use crate::error::StoreResult;
use crate::store::ObjectStore;

/// A read view of a sealed payload, holding one reference on the object.
///
/// While a view is alive the object's memory cannot be reclaimed, even if the
/// object is deleted in the meantime. The reference is given back by
/// [`ObjectView::release`] or, failing that, when the view is dropped.
pub struct ObjectView {
    store: Arc<ObjectStore>,
    id: ObjectId,
    serial: u64,
    range: MemoryRange,
    released: bool,
}

impl ObjectView {
    pub(crate) fn new(store: Arc<ObjectStore>, id: ObjectId, serial: u64, range: MemoryRange) -> Self {
        Self {
            store,
            id,
            serial,
            range,
            released: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.range.len
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// The payload bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the object is Sealed or Deleted with this view's reference
        // outstanding, so nothing writes or frees the range until release.
        unsafe { self.store.region().read(self.range) }
            .expect("view range lies inside the arena")
    }

    /// Copy the payload out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Give the reference back, reporting any bookkeeping failure.
    pub fn release(mut self) -> StoreResult<()> {
        self.released = true;
        self.store.release_ref(&self.id, self.serial)
    }
}

impl Deref for ObjectView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ObjectView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for ObjectView {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.store.release_ref(&self.id, self.serial) {
            warn!(id = %self.id, error = %e, "failed to release dropped view");
        }
    }
}

impl fmt::Debug for ObjectView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectView")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("len", &self.range.len)
            .finish()
    }
}
