//! Approximate-membership filter with associated payloads.
//!
//! This is the storage primitive behind `search-index.sinter`. Writers
//! insert groups of 64-bit keys with an opaque payload; readers probe with a
//! set of key hashes and get back the payload of every group that contains
//! any of them. False negatives are forbidden for inserted keys; false
//! positives only cost the caller a wasted payload decode.
//!
//! On disk a filter is a single file with three cooperating sections:
//!
//! 1. a bloom pre-filter over every inserted key (cheap rejection),
//! 2. a sorted key table mapping each key to its group-id postings,
//! 3. delta-encoded postings plus a payload heap.

mod bloom;
mod encoding;
mod reader;
mod writer;

pub use reader::FilterFile;

use crate::error::{Error, Result};
use ahash::AHashMap;
use bloom::BloomFilter;
use std::path::Path;

/// File magic, first four bytes of every filter file.
pub const MAGIC: [u8; 4] = *b"SNTR";

/// On-disk format version. Bump on any layout change.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed header length in bytes. See `writer.rs` for the layout.
pub(crate) const HEADER_LEN: usize = 52;

/// Bytes per key-table entry: key, postings offset, postings length,
/// group count.
pub(crate) const KEY_ENTRY_LEN: usize = 8 + 8 + 4 + 4;

/// Bytes per payload-table entry: offset, length.
pub(crate) const PAYLOAD_ENTRY_LEN: usize = 8 + 8;

/// False positive rate the bloom section is sized for.
const BLOOM_FPR: f64 = 0.01;

/// An under-construction filter. Insert groups, then [`Filter::build`] to
/// freeze it into a writable [`BuiltFilter`].
pub struct Filter {
    /// key -> ids of the groups it belongs to (insertion order, deduped).
    keys: AHashMap<u64, Vec<u32>>,
    /// Payloads in insertion order; the index is the group id.
    payloads: Vec<Vec<u8>>,
}

impl Filter {
    /// Create a filter expecting roughly `expected_keys` total keys. The
    /// estimate pre-sizes the key map; underestimating costs rehashing,
    /// never correctness.
    pub fn new(expected_keys: usize) -> Self {
        Self {
            keys: AHashMap::with_capacity(expected_keys.min(1 << 20)),
            payloads: Vec::new(),
        }
    }

    /// Associate `payload` with every key in `keys`, forming one group.
    /// Overlapping key sets across groups are permitted; duplicate keys
    /// within one group are tolerated.
    pub fn insert(&mut self, keys: impl IntoIterator<Item = u64>, payload: Vec<u8>) {
        let group_id = self.payloads.len() as u32;
        self.payloads.push(payload);

        for key in keys {
            let groups = self.keys.entry(key).or_default();
            if groups.last() != Some(&group_id) {
                groups.push(group_id);
            }
        }
    }

    /// Number of distinct keys inserted so far.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of groups inserted so far.
    pub fn group_count(&self) -> usize {
        self.payloads.len()
    }

    /// Freeze the filter: sort the key table and populate the bloom
    /// section. Deterministic given identical inserts.
    pub fn build(self) -> Result<BuiltFilter> {
        if self.payloads.len() > u32::MAX as usize {
            return Err(Error::FilterBuild(format!(
                "too many groups: {}",
                self.payloads.len()
            )));
        }

        // The exact key count is known by now; `expected_keys` only sized
        // the in-memory map.
        let mut bloom = BloomFilter::new(self.keys.len(), BLOOM_FPR);
        let mut entries: Vec<KeyEntry> = self
            .keys
            .into_iter()
            .map(|(key, mut group_ids)| {
                group_ids.sort_unstable();
                group_ids.dedup();
                KeyEntry { key, group_ids }
            })
            .collect();
        entries.sort_unstable_by_key(|e| e.key);

        for entry in &entries {
            bloom.insert(entry.key);
        }

        Ok(BuiltFilter {
            bloom,
            entries,
            payloads: self.payloads,
        })
    }
}

pub(crate) struct KeyEntry {
    pub key: u64,
    pub group_ids: Vec<u32>,
}

/// A frozen filter, ready to serialize.
pub struct BuiltFilter {
    pub(crate) bloom: BloomFilter,
    /// Sorted by key.
    pub(crate) entries: Vec<KeyEntry>,
    pub(crate) payloads: Vec<Vec<u8>>,
}

impl BuiltFilter {
    /// Serialize to `path`. Bit-exact: identical inserts produce identical
    /// files.
    pub fn write(&self, path: &Path) -> Result<()> {
        writer::write_filter(self, path)
    }
}
