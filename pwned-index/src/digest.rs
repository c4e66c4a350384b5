use std::fmt;

use sha1::{Digest, Sha1};

use crate::error::DigestError;

/// The length of a SHA1 digest in bytes.
pub const SHA1_LEN: usize = 20;

/// Longest digest a [`CredentialDigest`] can hold (room for SHA-256 class algorithms).
pub const MAX_DIGEST_LEN: usize = 32;

/// Shortest digest accepted. Index keys are built from the first 8 bytes.
pub const MIN_DIGEST_LEN: usize = 8;

/// Hex lookup table for canonical (lowercase) rendering.
pub const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// A fixed-length credential digest, the key into every index backend.
///
/// Hex input is accepted in any case and always renders back as lowercase. `Debug` never
/// prints the digest bytes so that a stray `{:?}` cannot leak credentials into logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialDigest {
    bytes: [u8; MAX_DIGEST_LEN],
    len: u8,
}

impl CredentialDigest {
    /// Wraps raw digest bytes. Returns `None` when the length is outside
    /// `MIN_DIGEST_LEN..=MAX_DIGEST_LEN`.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&raw.len()) {
            return None;
        }
        let mut bytes = [0u8; MAX_DIGEST_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self { bytes, len: raw.len() as u8 })
    }

    /// Parses a hex digest of exactly `digest_len` bytes (`2 * digest_len` characters).
    pub fn from_hex(hex: &str, digest_len: usize) -> Result<Self, DigestError> {
        let src = hex.as_bytes();
        if src.len() != digest_len * 2 || !(MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&digest_len)
        {
            return Err(DigestError::InvalidLength { expected: digest_len * 2, actual: src.len() });
        }

        let mut bytes = [0u8; MAX_DIGEST_LEN];
        for (out, pair) in bytes.iter_mut().zip(src.chunks_exact(2)) {
            let hi = hex_to_nibble(pair[0]).ok_or(DigestError::InvalidHex)?;
            let lo = hex_to_nibble(pair[1]).ok_or(DigestError::InvalidHex)?;
            *out = (hi << 4) | lo;
        }

        Ok(Self { bytes, len: digest_len as u8 })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The 64-bit index key: the first 8 digest bytes read big-endian (sha1t64).
    #[inline]
    pub fn key(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.bytes[..8]);
        u64::from_be_bytes(head)
    }

    /// Canonical lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.len() * 2);
        for b in self.as_bytes() {
            out.push(HEX_CHARS[(b >> 4) as usize] as char);
            out.push(HEX_CHARS[(b & 0x0f) as usize] as char);
        }
        out
    }
}

impl fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialDigest(<{} bytes redacted>)", self.len)
    }
}

/// Convert hex ASCII character to nibble value (0-15)
#[inline]
pub fn hex_to_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// The hash family used to turn plaintext credentials into index keys.
///
/// Corpus files, hash-path requests and password-path requests must all agree on the
/// algorithm. Only SHA1 ships today; a slower or salted scheme plugs in here.
pub trait DigestAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Digest length in bytes.
    fn digest_len(&self) -> usize;

    fn digest(&self, plaintext: &[u8]) -> CredentialDigest;

    fn parse_hex(&self, hex: &str) -> Result<CredentialDigest, DigestError> {
        CredentialDigest::from_hex(hex, self.digest_len())
    }
}

/// Unsalted SHA1 over the raw plaintext bytes, as used by the Pwned Passwords corpus.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Algorithm;

impl DigestAlgorithm for Sha1Algorithm {
    fn name(&self) -> &'static str {
        "sha1"
    }

    fn digest_len(&self) -> usize {
        SHA1_LEN
    }

    fn digest(&self, plaintext: &[u8]) -> CredentialDigest {
        sha1(plaintext)
    }
}

/// SHA1 of `plaintext` as a [`CredentialDigest`].
pub fn sha1(plaintext: &[u8]) -> CredentialDigest {
    let mut hasher = Sha1::new();
    hasher.update(plaintext);
    let hash: [u8; SHA1_LEN] = hasher.finalize().into();
    let mut bytes = [0u8; MAX_DIGEST_LEN];
    bytes[..SHA1_LEN].copy_from_slice(&hash);
    CredentialDigest { bytes, len: SHA1_LEN as u8 }
}
