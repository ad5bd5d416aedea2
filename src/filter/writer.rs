//! Filter file serialization.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "SNTR"
//! 4       4     format version (u32)
//! 8       8     number of keys (u64)
//! 16      8     number of groups (u64)
//! 24      4     bloom probe count (u32)
//! 28      8     bloom word count (u64)
//! 36      8     postings section length in bytes (u64)
//! 44      8     payload heap length in bytes (u64)
//! 52      ...   bloom words        (word count * 8)
//! ...     ...   key table          (keys * 24: key u64, postings offset u64,
//!                                   postings len u32, group count u32)
//! ...     ...   postings heap      (delta+varint group ids per key)
//! ...     ...   payload table      (groups * 16: offset u64, len u64)
//! ...     ...   payload heap
//! ```

use super::encoding::delta_encode;
use super::{BuiltFilter, FORMAT_VERSION, MAGIC};
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub(crate) fn write_filter(filter: &BuiltFilter, path: &Path) -> Result<()> {
    // Encode the postings heap first so the header can carry its length.
    let mut postings = Vec::new();
    let mut key_table = Vec::with_capacity(filter.entries.len() * super::KEY_ENTRY_LEN);
    for entry in &filter.entries {
        let offset = postings.len() as u64;
        delta_encode(&entry.group_ids, &mut postings);
        let len = postings.len() as u64 - offset;

        key_table.extend_from_slice(&entry.key.to_le_bytes());
        key_table.extend_from_slice(&offset.to_le_bytes());
        key_table.extend_from_slice(&(len as u32).to_le_bytes());
        key_table.extend_from_slice(&(entry.group_ids.len() as u32).to_le_bytes());
    }

    let payload_heap_len: u64 = filter.payloads.iter().map(|p| p.len() as u64).sum();
    let bloom_words = filter.bloom.bits();

    let mut file = BufWriter::with_capacity(65536, File::create(path)?);

    // Header.
    file.write_all(&MAGIC)?;
    file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    file.write_all(&(filter.entries.len() as u64).to_le_bytes())?;
    file.write_all(&(filter.payloads.len() as u64).to_le_bytes())?;
    file.write_all(&(filter.bloom.num_hashes() as u32).to_le_bytes())?;
    file.write_all(&(bloom_words.len() as u64).to_le_bytes())?;
    file.write_all(&(postings.len() as u64).to_le_bytes())?;
    file.write_all(&payload_heap_len.to_le_bytes())?;

    // Bloom section.
    for &word in bloom_words {
        file.write_all(&word.to_le_bytes())?;
    }

    // Key table + postings.
    file.write_all(&key_table)?;
    file.write_all(&postings)?;

    // Payload table + heap.
    let mut offset = 0u64;
    for payload in &filter.payloads {
        file.write_all(&offset.to_le_bytes())?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        offset += payload.len() as u64;
    }
    for payload in &filter.payloads {
        file.write_all(payload)?;
    }

    file.flush()?;
    Ok(())
}
