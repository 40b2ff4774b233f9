//! String-to-key hashing.
//!
//! Keys are derived from path-like strings with a multiplicative hash:
//! start at 137, then `hash = hash * 33 + byte` for every input byte.
//! Arithmetic wraps at 64 bits. Collisions are possible and are not
//! treated specially: two colliding paths simply share a key.

use crate::common::Key;

/// Seed of the multiplicative hash.
pub const HASH_SEED: u64 = 137;

/// Hash raw bytes into a tree key.
///
/// # Example
/// ```
/// use blocktree::index::hash_key;
///
/// assert_eq!(hash_key(b""), 137);
/// assert_eq!(hash_key(b"a"), 137 * 33 + 97);
/// ```
#[inline]
pub fn hash_key(bytes: &[u8]) -> Key {
    bytes.iter().fold(HASH_SEED, |hash, &b| {
        // hash * 33 + b
        (hash << 5).wrapping_add(hash).wrapping_add(b as u64)
    })
}

/// Hash a string (its UTF-8 bytes) into a tree key.
#[inline]
pub fn hash_str(s: &str) -> Key {
    hash_key(s.as_bytes())
}
