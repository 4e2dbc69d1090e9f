//! Shard naming and the per-shard file contents.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use warp_core::error::{Error, Result};

/// First two hex chars of a sha, lowercased — the shard a sha's own
/// metadata and adjacency rows live in.
pub fn shard_key(sha: &str) -> String {
    let lower = sha.to_ascii_lowercase();
    lower.get(0..2).unwrap_or("00").to_string()
}

pub fn meta_filename(shard: &str) -> String {
    format!("meta_{shard}.json")
}

pub fn forward_filename(shard: &str) -> String {
    format!("shards_fwd_{shard}.json")
}

pub fn reverse_filename(shard: &str) -> String {
    format!("shards_rev_{shard}.json")
}

pub const MANIFEST_FILENAME: &str = "manifest.json";

/// `sha -> id` for every sha whose shard key is this shard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardMeta(pub BTreeMap<String, u32>);

/// `id -> base64(roaring bitmap bytes)` for the adjacency of every id whose
/// owning sha's shard key is this shard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardAdjacency(pub BTreeMap<u32, String>);

impl ShardAdjacency {
    pub fn encode(entries: &BTreeMap<u32, RoaringBitmap>) -> Result<Self> {
        let mut out = BTreeMap::new();
        for (id, bitmap) in entries {
            let mut bytes = Vec::new();
            bitmap
                .serialize_into(&mut bytes)
                .map_err(|e| Error::Codec(e.to_string()))?;
            out.insert(*id, BASE64.encode(bytes));
        }
        Ok(ShardAdjacency(out))
    }

    pub fn decode_one(&self, id: u32) -> Result<Option<RoaringBitmap>> {
        let Some(encoded) = self.0.get(&id) else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::Corrupt(format!("bad base64 in bitmap shard: {e}")))?;
        let bitmap =
            RoaringBitmap::deserialize_from(bytes.as_slice()).map_err(|e| Error::Corrupt(e.to_string()))?;
        Ok(Some(bitmap))
    }
}

/// The global manifest: dense id -> sha, needed to resolve a neighbor id
/// discovered in one shard's bitmap back into a sha that may live in a
/// different shard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub id_to_sha: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_key_takes_first_two_hex_chars() {
        assert_eq!(shard_key("ab12cd"), "ab");
        assert_eq!(shard_key("AB12CD"), "ab");
    }

    #[test]
    fn adjacency_round_trips_through_base64_json() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(1);
        bitmap.insert(2);
        let mut entries = BTreeMap::new();
        entries.insert(7u32, bitmap.clone());

        let encoded = ShardAdjacency::encode(&entries).unwrap();
        let json = serde_json::to_string(&encoded).unwrap();
        let decoded: ShardAdjacency = serde_json::from_str(&json).unwrap();
        let roundtrip = decoded.decode_one(7).unwrap().unwrap();
        assert_eq!(roundtrip, bitmap);
    }
}
