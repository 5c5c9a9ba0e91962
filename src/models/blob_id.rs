use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(|| rand::random());
static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid blob id '{0}': expected 24 hex characters")]
pub struct InvalidBlobId(pub String);

/// Store-assigned identifier of a blob.
///
/// Twelve bytes laid out like a document-store object id: big-endian unix seconds,
/// five bytes chosen once per process, then a wrapping 24-bit counter. Ids handed out
/// by one process never repeat within the same second, and the random middle keeps
/// concurrently running processes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId([u8; 12]);

impl BlobId {
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    fn generate_at(now: DateTime<Utc>) -> Self {
        let secs = now.timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for BlobId {
    type Err = InvalidBlobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 12];
        if s.len() != 24 {
            return Err(InvalidBlobId(s.to_string()));
        }
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidBlobId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for BlobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hex_round_trip() {
        let id = BlobId::generate();
        let hex = id.to_string();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hex.parse::<BlobId>().unwrap(), id);
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!("".parse::<BlobId>().is_err());
        assert!("507f1f77bcf86cd79943901".parse::<BlobId>().is_err());
        assert!("507f1f77bcf86cd7994390111".parse::<BlobId>().is_err());
        assert!("zz7f1f77bcf86cd799439011".parse::<BlobId>().is_err());
        assert!("507F1F77BCF86CD799439011".parse::<BlobId>().is_ok());
    }

    #[test]
    fn test_ids_are_unique_within_a_second() {
        let now = Utc::now();
        let ids: HashSet<BlobId> = (0..10_000).map(|_| BlobId::generate_at(now)).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_timestamp_prefix() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let id = BlobId::generate_at(now);
        assert_eq!(&id.to_hex()[..8], "6553f100");
    }

    #[test]
    fn test_serde_as_string() {
        let id: BlobId = "507f1f77bcf86cd799439011".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"507f1f77bcf86cd799439011\"");
        let back: BlobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
