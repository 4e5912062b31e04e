//! Hash functions used for bucketing.
//!
//! Both algorithms must agree bit-for-bit with every other Split SDK, otherwise the same key would
//! land in different buckets depending on which SDK evaluated it.

/// Hash algorithm a split is bucketed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// Java `String.hashCode()`-style hash. Used by old splits.
    #[default]
    Legacy,
    /// Murmur3 x86 32-bit.
    Murmur,
}

impl HashAlgorithm {
    /// Map the wire `algo` field. Anything other than `2` (including a missing field) is legacy.
    pub fn from_wire(algo: Option<i64>) -> HashAlgorithm {
        match algo {
            Some(2) => HashAlgorithm::Murmur,
            _ => HashAlgorithm::Legacy,
        }
    }

    /// Hash `key` with `seed`, widened to the value that bucketing operates on.
    ///
    /// Murmur hashes are bucketed as unsigned 32-bit integers, legacy hashes as signed ones.
    pub fn hash(self, key: &str, seed: i32) -> i64 {
        match self {
            HashAlgorithm::Legacy => i64::from(legacy_hash(key, seed)),
            HashAlgorithm::Murmur => i64::from(murmur32(key, seed) as u32),
        }
    }
}

/// Legacy hash: `31 * h + c` over the characters of `key`, xor'ed with `seed`. All arithmetic
/// wraps around at 32 bits.
pub fn legacy_hash(key: &str, seed: i32) -> i32 {
    let h = key
        .chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
    h ^ seed
}

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Murmur3 x86 32-bit hash of the UTF-8 bytes of `key`.
///
/// Returns the 32-bit result reinterpreted as a signed integer.
pub fn murmur32(key: &str, seed: i32) -> i32 {
    let data = key.as_bytes();
    let mut h1 = seed as u32;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k1 ^= u32::from(*byte) << (8 * i);
        }
        h1 ^= mix_k1(k1);
    }

    h1 ^= data.len() as u32;
    fmix32(h1) as i32
}

#[inline]
fn mix_k1(k1: u32) -> u32 {
    k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
