//! Bloom pre-filter over the 64-bit fuzzy keys of a search filter.
//!
//! The bit positions are derived from the key itself with a splitmix-style
//! mixer. The key is already a stable murmur hash, so no external hasher is
//! involved and the persisted bit array can be probed by any future build of
//! this crate.

/// A space-efficient probabilistic structure for fast membership testing.
///
/// Used to reject query hashes that definitely hit nothing in a filter file
/// before doing the exact key-table lookup.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    /// Bit array stored as u64 words.
    bits: Vec<u64>,
    /// Number of bits in the filter.
    num_bits: usize,
    /// Number of probe positions per key.
    num_hashes: u8,
}

impl BloomFilter {
    /// Create a bloom filter sized for the expected number of unique keys at
    /// the given false positive rate (e.g. 0.01 for 1%).
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        // Optimal bits: m = -n * ln(p) / (ln(2)^2)
        let n = expected_keys.max(1) as f64;
        let p = false_positive_rate.clamp(0.0001, 0.5);
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / ln2_sq).ceil() as usize;
        let num_bits = num_bits.max(64);

        // Round up to a whole number of u64 words.
        let num_words = num_bits.div_ceil(64);
        let num_bits = num_words * 64;

        // Optimal probe count: k = (m/n) * ln(2)
        let num_hashes = ((num_bits as f64 / n) * std::f64::consts::LN_2).round() as u8;
        let num_hashes = num_hashes.clamp(1, 16);

        Self {
            bits: vec![0u64; num_words],
            num_bits,
            num_hashes,
        }
    }

    /// Reconstruct from raw words (when loading from disk).
    pub fn from_raw(bits: Vec<u64>, num_hashes: u8) -> Self {
        let num_bits = bits.len() * 64;
        Self {
            bits,
            num_bits,
            num_hashes,
        }
    }

    /// Insert a key.
    #[inline]
    pub fn insert(&mut self, key: u64) {
        let (h1, h2) = hash_pair(key);

        for i in 0..self.num_hashes as u64 {
            // Double hashing: h(i) = h1 + i*h2
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;
            self.bits[bit_index / 64] |= 1u64 << (bit_index % 64);
        }
    }

    /// Returns false if the key is definitely absent, true if possibly
    /// present.
    #[inline]
    pub fn might_contain(&self, key: u64) -> bool {
        might_contain_words(&self.bits, self.num_hashes, key)
    }

    /// Raw words for serialization.
    pub fn bits(&self) -> &[u64] {
        &self.bits
    }

    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }
}

/// Probe a bit array without owning it. The reader side calls this against
/// words decoded straight out of the mapped filter file.
#[inline]
pub fn might_contain_words(words: &[u64], num_hashes: u8, key: u64) -> bool {
    let num_bits = words.len() * 64;
    if num_bits == 0 {
        return false;
    }
    let (h1, h2) = hash_pair(key);

    for i in 0..num_hashes as u64 {
        let hash = h1.wrapping_add(i.wrapping_mul(h2));
        let bit_index = (hash as usize) % num_bits;
        if (words[bit_index / 64] & (1u64 << (bit_index % 64))) == 0 {
            return false;
        }
    }
    true
}

/// Two independent probe hashes for double hashing. h2 is forced odd so the
/// probe sequence cycles through the whole table.
#[inline]
fn hash_pair(key: u64) -> (u64, u64) {
    let h1 = mix64(key);
    let h2 = mix64(key ^ 0x9e3779b97f4a7c15) | 1;
    (h1, h2)
}

/// splitmix64 finalizer. Stable by construction; never change these
/// constants, persisted filter files depend on them.
#[inline]
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}
