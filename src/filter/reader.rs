//! Memory-mapped filter file reader.

use super::bloom::BloomFilter;
use super::encoding::delta_decode;
use super::{FORMAT_VERSION, HEADER_LEN, KEY_ENTRY_LEN, MAGIC, PAYLOAD_ENTRY_LEN};
use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// A filter file opened for querying. The payload heap stays on the mapped
/// region; [`FilterFile::query_or`] hands out borrowed slices.
pub struct FilterFile {
    mmap: Mmap,
    num_keys: usize,
    num_groups: usize,
    /// Bloom section, decoded once at open.
    bloom: BloomFilter,
    key_table_off: usize,
    postings_off: usize,
    payload_table_off: usize,
    payload_heap_off: usize,
}

impl FilterFile {
    /// Open and validate a filter file. Bad magic, version or length is an
    /// error, never a panic: the caller discards the stale filter and
    /// reindexes the project.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let corrupt = |what: &str| Error::Decode(format!("{}: {}", path.display(), what));

        if mmap.len() < HEADER_LEN {
            return Err(corrupt("file shorter than filter header"));
        }
        if mmap[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = read_u32(&mmap, 4);
        if version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported format version {version}")));
        }

        let num_keys = read_u64(&mmap, 8) as usize;
        let num_groups = read_u64(&mmap, 16) as usize;
        let bloom_num_hashes = read_u32(&mmap, 24);
        let bloom_num_words = read_u64(&mmap, 28) as usize;
        let postings_len = read_u64(&mmap, 36) as usize;
        let payload_heap_len = read_u64(&mmap, 44) as usize;

        if bloom_num_hashes > u8::MAX as u32 {
            return Err(corrupt("implausible bloom probe count"));
        }

        // Checked section arithmetic: a corrupt header must come back as an
        // error, not an overflow panic.
        let expected_len = (|| {
            let key_table_off = HEADER_LEN.checked_add(bloom_num_words.checked_mul(8)?)?;
            let postings_off = key_table_off.checked_add(num_keys.checked_mul(KEY_ENTRY_LEN)?)?;
            let payload_table_off = postings_off.checked_add(postings_len)?;
            let payload_heap_off =
                payload_table_off.checked_add(num_groups.checked_mul(PAYLOAD_ENTRY_LEN)?)?;
            let total = payload_heap_off.checked_add(payload_heap_len)?;
            Some((key_table_off, postings_off, payload_table_off, payload_heap_off, total))
        })();
        let Some((key_table_off, postings_off, payload_table_off, payload_heap_off, total)) =
            expected_len
        else {
            return Err(corrupt("section sizes overflow"));
        };
        if mmap.len() != total {
            return Err(corrupt(&format!(
                "length mismatch: have {} bytes, header implies {}",
                mmap.len(),
                total
            )));
        }

        let bloom_words = (0..bloom_num_words)
            .map(|i| read_u64(&mmap, HEADER_LEN + i * 8))
            .collect();

        Ok(Self {
            mmap,
            num_keys,
            num_groups,
            bloom: BloomFilter::from_raw(bloom_words, bloom_num_hashes as u8),
            key_table_off,
            postings_off,
            payload_table_off,
            payload_heap_off,
        })
    }

    pub fn key_count(&self) -> usize {
        self.num_keys
    }

    pub fn group_count(&self) -> usize {
        self.num_groups
    }

    /// Logical-OR probe: the payload of every group containing any of
    /// `keys`, each group at most once, in group insertion order.
    pub fn query_or(&self, keys: &[u64]) -> Result<Vec<&[u8]>> {
        let mut group_ids: Vec<u32> = Vec::new();
        for &key in keys {
            if !self.bloom.might_contain(key) {
                continue;
            }
            if let Some(index) = self.find_key(key) {
                group_ids.extend(self.group_ids_at(index)?);
            }
        }
        group_ids.sort_unstable();
        group_ids.dedup();

        group_ids
            .into_iter()
            .map(|id| self.payload(id))
            .collect::<Result<Vec<_>>>()
    }

    /// Binary search the key table for `key`.
    fn find_key(&self, key: u64) -> Option<usize> {
        let mut lo = 0usize;
        let mut hi = self.num_keys;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = read_u64(&self.mmap, self.key_table_off + mid * KEY_ENTRY_LEN);
            match mid_key.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// Decode the group-id postings for the key-table entry at `index`.
    fn group_ids_at(&self, index: usize) -> Result<Vec<u32>> {
        let entry = self.key_table_off + index * KEY_ENTRY_LEN;
        let offset = read_u64(&self.mmap, entry + 8) as usize;
        let len = read_u32(&self.mmap, entry + 16) as usize;
        let count = read_u32(&self.mmap, entry + 20) as usize;

        let start = self
            .postings_off
            .checked_add(offset)
            .ok_or_else(|| Error::Decode("postings overflow".to_string()))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| Error::Decode("postings overflow".to_string()))?;
        if end > self.payload_table_off {
            return Err(Error::Decode("postings out of bounds".to_string()));
        }
        delta_decode(&self.mmap[start..end], count)
            .ok_or_else(|| Error::Decode("malformed postings".to_string()))
    }

    /// The payload slice for a group, borrowed from the mapped region.
    fn payload(&self, group_id: u32) -> Result<&[u8]> {
        let id = group_id as usize;
        if id >= self.num_groups {
            return Err(Error::Decode(format!("group id {id} out of range")));
        }
        let entry = self.payload_table_off + id * PAYLOAD_ENTRY_LEN;
        let offset = read_u64(&self.mmap, entry) as usize;
        let len = read_u64(&self.mmap, entry + 8) as usize;

        let start = self
            .payload_heap_off
            .checked_add(offset)
            .ok_or_else(|| Error::Decode("payload overflow".to_string()))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| Error::Decode("payload overflow".to_string()))?;
        if end > self.mmap.len() {
            return Err(Error::Decode("payload out of bounds".to_string()));
        }
        Ok(&self.mmap[start..end])
    }
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

#[inline]
fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}
