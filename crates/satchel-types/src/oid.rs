use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fault::{Fault, FaultKind};

/// Store-assigned document identifier.
///
/// Twelve random bytes, carried over the wire as a 24-character lowercase hex
/// string. Identifiers are opaque: nothing is derived from their contents and
/// two documents never share one within a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    bytes: [u8; 12],
}

impl ObjectId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self { bytes }
    }

    /// The raw 12 bytes.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.bytes
    }

    /// Full hex-encoded string (24 characters), the wire form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from the 24-character hex wire form.
    pub fn from_hex(s: &str) -> Result<Self, Fault> {
        let decoded = hex::decode(s).map_err(|e| {
            Fault::with_detail(FaultKind::InvalidParameters, format!("bad object id: {e}"))
        })?;
        if decoded.len() != 12 {
            return Err(Fault::with_detail(
                FaultKind::InvalidParameters,
                format!("bad object id length: {}", decoded.len()),
            ));
        }
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// Create from raw bytes. Use `generate()` for production code.
    pub fn from_raw(bytes: [u8; 12]) -> Self {
        Self { bytes }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = ObjectId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn generate_is_unique() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(ObjectId::from_hex("not-hex").is_err());
        assert!(ObjectId::from_hex("abcd").is_err()); // too short
        assert!(ObjectId::from_hex(&"ab".repeat(16)).is_err()); // too long
    }

    #[test]
    fn display_matches_hex() {
        let id = ObjectId::from_raw([0xab; 12]);
        assert_eq!(format!("{id}"), "ab".repeat(12));
    }
}
