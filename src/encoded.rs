//! Encoded hash strings: `$argon2<x>$v=<ver>$m=<kib>,t=<iters>,p=<lanes>$<salt>$<hash>`
//!
//! Salt and hash are unpadded standard base64. Unlike the generic PHC
//! encoder, any salt and output length the algorithm accepts can be
//! written and read back.

use crate::variant::Variant;
use base64ct::{Base64Unpadded, Encoding};
use std::fmt;
use zeroize::Zeroizing;

/// Version assumed when an encoded string carries no `v=` field
pub const IMPLICIT_VERSION: u32 = 0x10;

/// Longest `$argon2id$v=..$m=..,t=..,p=..$` prefix plus the separating `$` and NUL
pub const ENCODED_OVERHEAD: usize = 64;

/// Decoded form of an encoded hash string
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedHash {
    pub variant: Variant,
    pub version: u32,
    pub mem_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt: Vec<u8>,
    pub hash: Zeroizing<Vec<u8>>,
}

impl EncodedHash {
    /// Parse `encoded`, requiring its type tag to be `variant`
    ///
    /// Returns `None` for anything malformed: wrong tag, parameters out of
    /// order, invalid base64, trailing data.
    pub fn decode(encoded: &str, variant: Variant) -> Option<Self> {
        let rest = encoded.strip_prefix('$')?.strip_prefix(variant.tag())?;
        let (version, rest) = match rest.strip_prefix("$v=") {
            Some(after) => take_decimal(after)?,
            None => (IMPLICIT_VERSION, rest),
        };

        let (mem_kib, rest) = take_decimal(rest.strip_prefix("$m=")?)?;
        let (iterations, rest) = take_decimal(rest.strip_prefix(",t=")?)?;
        let (parallelism, rest) = take_decimal(rest.strip_prefix(",p=")?)?;

        let (salt, hash) = rest.strip_prefix('$')?.split_once('$')?;
        if hash.contains('$') {
            return None;
        }

        Some(Self {
            variant,
            version,
            mem_kib,
            iterations,
            parallelism,
            salt: Base64Unpadded::decode_vec(salt).ok()?,
            hash: Zeroizing::new(Base64Unpadded::decode_vec(hash).ok()?),
        })
    }
}

impl fmt::Display for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}$v={}$m={},t={},p={}${}${}",
            self.variant.tag(),
            self.version,
            self.mem_kib,
            self.iterations,
            self.parallelism,
            Base64Unpadded::encode_string(&self.salt),
            Base64Unpadded::encode_string(&self.hash),
        )
    }
}

impl fmt::Debug for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedHash")
            .field("variant", &self.variant)
            .field("version", &self.version)
            .field("mem_kib", &self.mem_kib)
            .field("iterations", &self.iterations)
            .field("parallelism", &self.parallelism)
            .field("salt_len", &self.salt.len())
            .field("hash", &"[REDACTED]")
            .finish()
    }
}

/// Bytes needed to hold the encoded string for these lengths, NUL included
pub fn encoded_len(salt_len: usize, hash_len: usize) -> usize {
    ENCODED_OVERHEAD
        .saturating_add(base64_len(salt_len))
        .saturating_add(base64_len(hash_len))
}

fn base64_len(n: usize) -> usize {
    (n / 3).saturating_mul(4).saturating_add([0, 2, 3][n % 3])
}

/// Leading decimal digits as a `u32`, and the remainder
fn take_decimal(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}
