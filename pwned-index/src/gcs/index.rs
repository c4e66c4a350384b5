use std::path::Path;

use tracing::info;

use super::{FOOTER_LEN, GCS_MAGIC, SEEK_POINT_LEN, read_u64, remainder_bits};
use crate::HashIndex;
use crate::bits::BitReader;
use crate::digest::CredentialDigest;
use crate::error::{CorpusLoadError, LookupError};

/// A loaded Golomb-coded set.
///
/// The encoded data and the seek points are held in memory; lookups are a binary search over
/// the seek points followed by decoding at most one granule. Nothing is mutated after
/// construction, so any number of threads may query concurrently.
pub struct GcsIndex {
    data: Box<[u8]>,
    num: u64,
    probability: u64,
    modulus: u64,
    log2p: u32,
    seek_points: Box<[(u64, u64)]>,
}

impl GcsIndex {
    /// Reads and validates a GCS file.
    pub fn open(path: &Path) -> Result<Self, CorpusLoadError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Validates an in-memory GCS image. Rejects bad magic, inconsistent lengths (truncated or
    /// padded files) and unordered seek points.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, CorpusLoadError> {
        let len = bytes.len();
        if len < FOOTER_LEN {
            return Err(CorpusLoadError::Corrupt("file is shorter than the GCS footer"));
        }

        let footer = &bytes[len - FOOTER_LEN..];
        if &footer[32..] != GCS_MAGIC {
            return Err(CorpusLoadError::Corrupt("not a GCS file"));
        }
        let num = read_u64(&footer[0..]);
        let probability = read_u64(&footer[8..]);
        let end_of_data = read_u64(&footer[16..]);
        let index_len = read_u64(&footer[24..]);

        if num == 0 {
            return Err(CorpusLoadError::Empty);
        }
        if probability < 2 {
            return Err(CorpusLoadError::Corrupt("false positive rate below 2"));
        }
        let modulus = num
            .checked_mul(probability)
            .ok_or(CorpusLoadError::Corrupt("item count times false positive rate overflows"))?;

        let expected = index_len
            .checked_mul(SEEK_POINT_LEN as u64)
            .and_then(|n| n.checked_add(end_of_data))
            .and_then(|n| n.checked_add(FOOTER_LEN as u64));
        if expected != Some(len as u64) {
            return Err(CorpusLoadError::Corrupt("length does not match footer (truncated file?)"));
        }

        let data_end = end_of_data as usize;
        let data_bits = end_of_data * 8;
        let mut seek_points = Vec::with_capacity(index_len as usize);
        let mut prev = (0u64, 0u64);
        for raw in bytes[data_end..len - FOOTER_LEN].chunks_exact(SEEK_POINT_LEN) {
            let point = (read_u64(&raw[0..]), read_u64(&raw[8..]));
            if point.0 <= prev.0 || point.1 <= prev.1 || point.1 > data_bits || point.0 >= modulus
            {
                return Err(CorpusLoadError::Corrupt("seek points are not strictly increasing"));
            }
            seek_points.push(point);
            prev = point;
        }

        bytes.truncate(data_end);

        info!(
            items = num,
            false_positive_rate = probability,
            "ready for queries on {num} items with a 1 in {probability} false-positive rate"
        );

        Ok(Self {
            data: bytes.into_boxed_slice(),
            num,
            probability,
            modulus,
            log2p: remainder_bits(probability),
            seek_points: seek_points.into_boxed_slice(),
        })
    }

    /// The 1-in-P false positive rate the set was built with.
    pub fn false_positive_rate(&self) -> u64 {
        self.probability
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        self.data.len() + self.seek_points.len() * SEEK_POINT_LEN
    }

    fn lookup(&self, key: u64) -> Result<bool, LookupError> {
        let target = key % self.modulus;

        // Closest seek point at or below the target; (0, 0) is the implicit first point.
        let idx = self.seek_points.partition_point(|&(value, _)| value <= target);
        let (mut last, bit_pos) = if idx == 0 { (0, 0) } else { self.seek_points[idx - 1] };
        if last == target {
            return Ok(true);
        }

        let mut reader = BitReader::new(&self.data);
        reader.seek(bit_pos)?;

        while last < target {
            let q = reader.read_unary()?;
            let r = reader.read_bits(self.log2p)?;
            let diff = q
                .checked_mul(self.probability)
                .and_then(|d| d.checked_add(r))
                .ok_or(LookupError::Corrupt("golomb quotient overflow"))?;

            // end of data
            if diff == 0 {
                break;
            }
            last = last.checked_add(diff).ok_or(LookupError::Corrupt("decoded value overflow"))?;
        }

        Ok(last == target)
    }
}

impl HashIndex for GcsIndex {
    fn contains(&self, digest: &CredentialDigest) -> Result<bool, LookupError> {
        self.lookup(digest.key())
    }

    fn count(&self) -> u64 {
        self.num
    }
}
