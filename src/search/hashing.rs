//! Stable hashing and fuzzy-key expansion.
//!
//! Every searchable token is expanded into the hashes of all of its prefixes
//! and suffixes (original and ASCII-lowercased) at index time; at query time
//! each typed token is hashed once. Both sides must agree bit-for-bit across
//! platforms and releases because the hashes are persisted in filter files,
//! so the hash lives here rather than behind a hasher crate, pinned by the
//! golden table in the tests below.

/// MurmurHash3 x64 64-bit of the UTF-8 bytes of `s`: the first lane of the
/// x64 128-bit variant with seed 0.
pub fn hash(s: &str) -> u64 {
    murmur3_x64_64(s.as_bytes())
}

/// Hashes of every non-empty prefix of the Unicode scalar sequence,
/// length-1 prefixes included.
pub fn prefix_hashes(s: &str, out: &mut Vec<u64>) {
    let mut prefix = String::with_capacity(s.len());
    for c in s.chars() {
        prefix.push(c);
        out.push(hash(&prefix));
    }
}

/// Hashes of every non-empty suffix of the Unicode scalar sequence.
pub fn suffix_hashes(s: &str, out: &mut Vec<u64>) {
    let chars: Vec<char> = s.chars().collect();
    for i in (0..chars.len()).rev() {
        let suffix: String = chars[i..].iter().collect();
        out.push(hash(&suffix));
    }
}

/// The fuzzy key set of a batch of search keys: for every part of every key,
/// the prefix and suffix hashes of both the original and the
/// ASCII-lowercased form. Duplicates are permitted; the filter tolerates
/// them.
pub fn fuzzy_key_set(keys: &[Vec<String>]) -> Vec<u64> {
    let mut out = Vec::new();
    for key in keys {
        for part in key {
            prefix_hashes(part, &mut out);
            suffix_hashes(part, &mut out);
            let lower = part.to_ascii_lowercase();
            prefix_hashes(&lower, &mut out);
            suffix_hashes(&lower, &mut out);
        }
    }
    out
}

/// Split a query into the tokens a user separates with `.`, `/` or space.
/// Empty tokens are dropped.
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split(['.', '/', ' '])
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hash the query tokens. If tokenization yields nothing the whole query
/// string is hashed as a single token so the probe set is never empty.
pub fn query_hashes(query: &str, tokens: &[String]) -> Vec<u64> {
    if tokens.is_empty() {
        return vec![hash(query)];
    }
    tokens.iter().map(|t| hash(t)).collect()
}

const C1: u64 = 0x87c37b91114253d5;
const C2: u64 = 0x4cf5ad432745937f;

/// Canonical MurmurHash3 x64 128-bit, seed 0, returning h1 only.
fn murmur3_x64_64(data: &[u8]) -> u64 {
    let len = data.len();
    let mut h1: u64 = 0;
    let mut h2: u64 = 0;

    let nblocks = len / 16;
    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    if tail.len() >= 9 {
        for (i, &byte) in tail[8..].iter().enumerate() {
            k2 ^= (byte as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        for (i, &byte) in tail[..tail.len().min(8)].iter().enumerate() {
            k1 ^= (byte as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u64;
    h2 ^= len as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h1
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Golden values computed with a reference MurmurHash3 x64_128
    /// implementation (seed 0, h1 lane). If any of these change, persisted
    /// filter files stop resolving.
    #[test]
    fn test_hash_golden_values() {
        let golden: [(&str, u64); 32] = [
            ("", 0x0000000000000000),
            ("a", 0x85555565f6597889),
            ("ab", 0x938b11ea16ed1b2e),
            ("abc", 0xb4963f3f3fad7867),
            ("#", 0xd9315065d3a909a7),
            (" ", 0x18f081109e84f739),
            (">", 0xf049a05504f6babc),
            (".", 0xd905a836615e096d),
            ("/", 0x3a50ca20eccf46fb),
            ("net", 0x984da6ca6a1c8a8d),
            ("http", 0x9466569ce049d6f9),
            ("Client", 0x515c9eb3929b7287),
            ("client", 0x50b28db3303cf89e),
            ("PostForm", 0x838a7800ccf1e8e4),
            ("postform", 0x99a284fd82f3e96a),
            ("ziglearn", 0x097bead6fbc9a37b),
            ("tests", 0x7f87f5857578e6f2),
            ("markdown", 0x498ff70d44115fa1),
            ("Page", 0x14d81a64d07a76bd),
            ("Section", 0x1ab177f7dead0f23),
            ("go", 0x2aa4fd588e98007d),
            ("fmt", 0x40886c9882745936),
            ("Println", 0xbd064c21c4dff1d3),
            ("doctree", 0x31fcb119eb9ad1c4),
            ("search-index", 0xee9162114270d48f),
            ("0123456789abcdef", 0x4be06d94cf4ad1a7),
            ("0123456789abcdef0", 0xeb24ae8785a5c075),
            (
                "The quick brown fox jumps over the lazy dog",
                0xe34bbc7bbc071b6c,
            ),
            ("été", 0x53bf5f6c9b9d9a14),
            ("日本語", 0x12bb87b9a8fbeff4),
            ("snake_case_name", 0x480fc3c359897ae9),
            ("CamelCaseName", 0x417ab529c775a71a),
        ];

        for (input, want) in golden {
            assert_eq!(hash(input), want, "hash({input:?}) drifted");
        }
    }

    #[test]
    fn test_prefix_hashes_cover_all_prefixes() {
        let mut out = Vec::new();
        prefix_hashes("abc", &mut out);
        assert_eq!(out, vec![hash("a"), hash("ab"), hash("abc")]);
    }

    #[test]
    fn test_suffix_hashes_cover_all_suffixes() {
        let mut out = Vec::new();
        suffix_hashes("abc", &mut out);
        assert_eq!(out, vec![hash("c"), hash("bc"), hash("abc")]);
    }

    #[test]
    fn test_prefix_suffix_unicode_scalar_boundaries() {
        // Multibyte characters must expand on scalar boundaries, not bytes.
        let mut prefixes = Vec::new();
        prefix_hashes("été", &mut prefixes);
        assert_eq!(prefixes, vec![hash("é"), hash("ét"), hash("été")]);

        let mut suffixes = Vec::new();
        suffix_hashes("été", &mut suffixes);
        assert_eq!(suffixes, vec![hash("é"), hash("té"), hash("été")]);
    }

    #[test]
    fn test_fuzzy_key_set_contains_both_cases() {
        let keys = vec![vec!["Client".to_string()]];
        let set = fuzzy_key_set(&keys);
        for needle in ["C", "Cl", "Client", "t", "nt", "client", "c", "cl"] {
            assert!(set.contains(&hash(needle)), "missing {needle:?}");
        }
    }

    /// Key completeness over randomized inputs: every prefix and suffix of
    /// every part, in both cases, must be in the fuzzy key set.
    #[test]
    fn test_fuzzy_key_set_completeness_randomized() {
        // Small deterministic PRNG; no external randomness in tests.
        let mut state = 0x853c49e6748fea9bu64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        let alphabet: Vec<char> = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(['_', '-', 'é', 'ß', '日'])
            .collect();

        for _ in 0..10_000 {
            let len = (next() % 8 + 1) as usize;
            let part: String = (0..len)
                .map(|_| alphabet[(next() % alphabet.len() as u64) as usize])
                .collect();
            let set = fuzzy_key_set(&[vec![part.clone()]]);

            for s in [part.clone(), part.to_ascii_lowercase()] {
                let chars: Vec<char> = s.chars().collect();
                for i in 1..=chars.len() {
                    let prefix: String = chars[..i].iter().collect();
                    let suffix: String = chars[chars.len() - i..].iter().collect();
                    assert!(set.contains(&hash(&prefix)), "missing prefix of {s:?}");
                    assert!(set.contains(&hash(&suffix)), "missing suffix of {s:?}");
                }
            }
        }
    }

    #[test]
    fn test_tokenize_query() {
        assert_eq!(tokenize_query("net/http.Client"), vec!["net", "http", "Client"]);
        assert_eq!(tokenize_query("  ziglearn  tests "), vec!["ziglearn", "tests"]);
        assert_eq!(tokenize_query("..//"), Vec::<String>::new());
    }

    #[test]
    fn test_query_hashes_falls_back_to_whole_query() {
        let tokens = tokenize_query("...");
        assert!(tokens.is_empty());
        assert_eq!(query_hashes("...", &tokens), vec![hash("...")]);
    }
}
