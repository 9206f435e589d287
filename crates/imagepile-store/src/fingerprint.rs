//! Block fingerprinting.
//!
//! Fingerprints are a lossy 64-bit hint, not an identity: a match always
//! triggers a byte comparison against the pool. The hash function is not
//! part of the pool format, only of the index file, so the store takes it
//! as a constructor argument and a pool can be re-indexed under a
//! different function later.

use xxhash_rust::xxh3::xxh3_64;

/// Signature of a block fingerprint function.
pub type FingerprintFn = fn(&[u8]) -> u64;

/// Default fingerprint: XXH3-64 over the full block.
#[inline]
pub fn xxh3_fingerprint(block: &[u8]) -> u64 {
    xxh3_64(block)
}
