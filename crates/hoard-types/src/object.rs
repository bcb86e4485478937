use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of hash bytes at the front of an [`ObjectId`].
pub const HASH_LEN: usize = 12;

/// Number of reserved trailing bytes in an [`ObjectId`].
pub const RESERVED_LEN: usize = 4;

/// Address of a stored object.
///
/// An `ObjectId` is 16 bytes: a 12-byte key hash followed by 4 reserved
/// bytes. Ids produced by a [`KeyMapper`](crate::KeyMapper) always carry zeros
/// in the reserved bytes. The id is the only way objects are addressed inside
/// the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 16]);

impl ObjectId {
    /// Total width of an id in bytes.
    pub const LEN: usize = HASH_LEN + RESERVED_LEN;

    /// Build an id from a key hash, leaving the reserved bytes zeroed.
    pub fn from_hash(hash: [u8; HASH_LEN]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..HASH_LEN].copy_from_slice(&hash);
        Self(bytes)
    }

    /// Create an `ObjectId` from all 16 raw bytes.
    pub const fn from_raw(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The null object ID (all zeros). Represents "no object".
    pub const fn null() -> Self {
        Self([0u8; 16])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The hash portion of the id.
    pub fn hash_bytes(&self) -> &[u8] {
        &self.0[..HASH_LEN]
    }

    /// The reserved trailing bytes.
    pub fn reserved_bytes(&self) -> &[u8] {
        &self.0[HASH_LEN..]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 16]> for ObjectId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; 16] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = TypeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hash_zeroes_reserved_bytes() {
        let id = ObjectId::from_hash([0xab; HASH_LEN]);
        assert_eq!(id.hash_bytes(), &[0xab; HASH_LEN]);
        assert_eq!(id.reserved_bytes(), &[0u8; RESERVED_LEN]);
    }

    #[test]
    fn null_is_all_zeros() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; 16]);
        assert!(!ObjectId::from_hash([1; HASH_LEN]).is_null());
    }

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::from_raw(*b"0123456789abcdef");
        let parsed = ObjectId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 16,
                actual: 2
            }
        );
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            ObjectId::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn display_is_full_hex() {
        let id = ObjectId::from_hash([7; HASH_LEN]);
        let display = format!("{id}");
        assert_eq!(display.len(), 32);
        assert_eq!(display, id.to_hex());
        assert_eq!(id.short_hex().len(), 8);
    }

    #[test]
    fn debug_uses_short_hex() {
        let id = ObjectId::from_hash([0xff; HASH_LEN]);
        assert_eq!(format!("{id:?}"), "ObjectId(ffffffff)");
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::from_hash([3; HASH_LEN]);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = ObjectId::from_raw([0; 16]);
        let b = ObjectId::from_raw([1; 16]);
        assert!(a < b);
    }
}
