use crate::object::{ObjectId, HASH_LEN};

/// Maps application keys onto object identifiers.
///
/// Implementations must be pure: equal keys always produce equal ids, and
/// distinct keys must collide with negligible probability. A collision
/// silently aliases two logical keys onto one object, so it is a correctness
/// bug rather than a performance one.
pub trait KeyMapper: Send + Sync {
    /// Map a key to its object identifier.
    fn map_key(&self, key: &[u8]) -> ObjectId;
}

/// Domain-separated BLAKE3 key mapper.
///
/// The domain tag is prepended to every key before hashing, so two stores
/// configured with different domains never share an id for the same key.
/// The first 12 bytes of the digest become the id hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashKeyMapper {
    domain: &'static str,
}

impl HashKeyMapper {
    /// The default mapper used by client sessions.
    pub const DEFAULT: Self = Self {
        domain: "hoard-key-v1",
    };

    /// Create a mapper with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// The domain tag used by this mapper.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for HashKeyMapper {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl KeyMapper for HashKeyMapper {
    fn map_key(&self, key: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(key);
        let digest = hasher.finalize();
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&digest.as_bytes()[..HASH_LEN]);
        ObjectId::from_hash(hash)
    }
}

impl<F> KeyMapper for F
where
    F: Fn(&[u8]) -> ObjectId + Send + Sync,
{
    fn map_key(&self, key: &[u8]) -> ObjectId {
        self(key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn mapping_is_deterministic() {
        let mapper = HashKeyMapper::default();
        assert_eq!(mapper.map_key(b"user:42"), mapper.map_key(b"user:42"));
    }

    #[test]
    fn reserved_bytes_are_zero() {
        let id = HashKeyMapper::DEFAULT.map_key(b"anything");
        assert_eq!(id.reserved_bytes(), &[0, 0, 0, 0]);
        assert!(!id.is_null());
    }

    #[test]
    fn empty_key_maps_to_non_null_id() {
        assert!(!HashKeyMapper::DEFAULT.map_key(b"").is_null());
    }

    #[test]
    fn domains_separate_identical_keys() {
        let a = HashKeyMapper::new("tenant-a").map_key(b"k");
        let b = HashKeyMapper::new("tenant-b").map_key(b"k");
        assert_ne!(a, b);
    }

    #[test]
    fn no_collisions_across_bulk_keys() {
        let mapper = HashKeyMapper::default();
        let ids: HashSet<ObjectId> = (0..100_000u32)
            .map(|i| mapper.map_key(format!("user{i}").as_bytes()))
            .collect();
        assert_eq!(ids.len(), 100_000);
    }

    #[test]
    fn closures_are_mappers() {
        let fixed = |_: &[u8]| ObjectId::from_raw([9; 16]);
        assert_eq!(fixed.map_key(b"x"), ObjectId::from_raw([9; 16]));
    }

    proptest! {
        #[test]
        fn distinct_keys_map_to_distinct_ids(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assume!(a != b);
            let mapper = HashKeyMapper::default();
            prop_assert_ne!(mapper.map_key(&a), mapper.map_key(&b));
        }

        #[test]
        fn equal_keys_map_to_equal_ids(key in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mapper = HashKeyMapper::default();
            prop_assert_eq!(mapper.map_key(&key), mapper.map_key(&key.clone()));
        }
    }
}
