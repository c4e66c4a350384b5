//! Golomb-coded set (GCS) files.
//!
//! A GCS stores `N` hashed keys reduced modulo `N * P` as sorted, Golomb-Rice coded
//! differences. Membership queries have a false positive rate of 1-in-`P` and no false
//! negatives, at roughly `log2(P) + 2` bits per item: about half the size of an equivalent
//! Bloom filter.
//!
//! # File layout
//!
//! All integers are big-endian `u64`.
//!
//! ```text
//! [golomb data, byte padded]
//! [seek points: (value, bit position) x index_len]   16 bytes each
//! [N][P][end of data in bytes][index_len]["[GCS:v0]"]  40 byte footer
//! ```
//!
//! A seek point is recorded every `index granularity` values and holds the value together with
//! the bit position at which the next difference starts, so a lookup decodes at most one
//! granule after a binary search over the seek points.

mod builder;
mod index;

pub use builder::{GcsBuilder, GcsSummary};
pub use index::GcsIndex;

/// Trailing magic identifying a GCS file.
pub const GCS_MAGIC: &[u8; 8] = b"[GCS:v0]";

/// Footer length: four u64 fields plus the magic.
pub const FOOTER_LEN: usize = 40;

/// Size of one serialized seek point.
pub const SEEK_POINT_LEN: usize = 16;

/// Default false positive rate, 1-in-2^24.
pub const DEFAULT_FALSE_POSITIVE_RATE: u64 = 16_777_216;

/// Default number of encoded values between seek points.
pub const DEFAULT_INDEX_GRANULARITY: u64 = 1024;

/// Bits used for the Golomb-Rice remainder: ceil(log2(p)). `p` must be at least 2.
#[inline]
pub(crate) fn remainder_bits(p: u64) -> u32 {
    64 - (p - 1).leading_zeros()
}

#[inline]
fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
