use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Identifier of a shard. The metachain uses [`METACHAIN_SHARD_ID`].
pub type ShardId = u32;

pub const METACHAIN_SHARD_ID: ShardId = u32::MAX;

/// Variable-length hash of a header or mini block.
///
/// Ordering is lexicographic over the raw bytes, which is what fork choice
/// relies on to break ties between competing headers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(pub Vec<u8>);

impl Hash {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Hash {
    fn from(value: &str) -> Self {
        Hash(value.as_bytes().to_vec())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(value: [u8; 32]) -> Self {
        Hash(value.to_vec())
    }
}

impl From<Vec<u8>> for Hash {
    fn from(value: Vec<u8>) -> Self {
        Hash(value)
    }
}

impl FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Hash(hex::decode(s.trim_start_matches("0x"))?))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Hash of the canonical JSON encoding of `value`.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<Hash, serde_json::Error> {
    let encoded = serde_json::to_vec(value)?;
    Ok(Hash(Sha256::digest(&encoded).to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ordering_is_lexicographic() {
        assert!(Hash::from("h1") < Hash::from("h2"));
        assert!(Hash::from("hash1") < Hash::from("hash2"));
        assert!(Hash::from("a") < Hash::from("ab"));
    }

    #[test]
    fn test_hash_display_and_parse() {
        let hash = Hash(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(hash.to_string(), "deadbeef");
        assert_eq!("0xdeadbeef".parse::<Hash>().unwrap(), hash);
    }

    #[test]
    fn test_compute_hash_is_deterministic() {
        let first = compute_hash(&("nonce", 7u64)).unwrap();
        let second = compute_hash(&("nonce", 7u64)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_bytes().len(), 32);
        assert_ne!(first, compute_hash(&("nonce", 8u64)).unwrap());
    }
}
