use std::io::{BufWriter, Write};

use tracing::{debug, info};

use super::{GCS_MAGIC, remainder_bits};
use crate::bits::BitWriter;
use crate::digest::CredentialDigest;
use crate::error::CorpusLoadError;

/// Accumulates digest keys and writes them out as a GCS file.
pub struct GcsBuilder {
    probability: u64,
    granularity: u64,
    keys: Vec<u64>,
}

/// What [`GcsBuilder::finish`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcsSummary {
    /// Distinct keys (`N` in the footer).
    pub items: u64,
    /// Values actually encoded after modular reduction and deduplication.
    pub encoded: u64,
    pub seek_points: u64,
    pub bytes_written: u64,
}

impl GcsBuilder {
    /// `probability` is the false positive rate for queries, 1-in-p.
    /// `granularity` is the number of values per seek point (16 bytes each).
    pub fn new(probability: u64, granularity: u64) -> Result<Self, CorpusLoadError> {
        Self::with_capacity(probability, granularity, 0)
    }

    pub fn with_capacity(
        probability: u64,
        granularity: u64,
        capacity: usize,
    ) -> Result<Self, CorpusLoadError> {
        if probability < 2 {
            return Err(CorpusLoadError::InvalidParameters("false positive rate must be >= 2"));
        }
        if granularity == 0 {
            return Err(CorpusLoadError::InvalidParameters("index granularity must be >= 1"));
        }
        Ok(Self { probability, granularity, keys: Vec::with_capacity(capacity) })
    }

    #[inline]
    pub fn add(&mut self, digest: &CredentialDigest) {
        self.keys.push(digest.key());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Encodes the set into `out`. Fails with [`CorpusLoadError::Empty`] when no keys were
    /// added.
    pub fn finish<W: Write>(self, out: W) -> Result<GcsSummary, CorpusLoadError> {
        let Self { probability, granularity, mut keys } = self;

        keys.sort_unstable();
        keys.dedup();
        let num = keys.len() as u64;
        if num == 0 {
            return Err(CorpusLoadError::Empty);
        }
        debug!(items = num, "database will have {num} items");

        let modulus = num.checked_mul(probability).ok_or(CorpusLoadError::InvalidParameters(
            "item count times false positive rate overflows u64",
        ))?;

        info!(stage = "normalise", "reducing {num} keys modulo {modulus}");
        for key in keys.iter_mut() {
            *key %= modulus;
        }
        info!(stage = "sort", "sorting");
        keys.sort_unstable();
        keys.dedup();

        info!(stage = "encode", "encoding {} values", keys.len());
        let log2p = remainder_bits(probability);
        let mut writer = BitWriter::new(BufWriter::new(out));
        let mut seek_points: Vec<(u64, u64)> =
            Vec::with_capacity((keys.len() as u64 / granularity) as usize + 1);
        let mut last = 0u64;
        let mut encoded = 0u64;

        for &value in &keys {
            // A lookup starts from 0, so 0 is always reported present and a zero difference
            // is reserved as the terminator.
            if value == 0 {
                continue;
            }
            let diff = value - last;
            writer.write_unary(diff / probability)?;
            writer.write_bits(log2p, diff % probability)?;
            last = value;
            encoded += 1;

            if encoded % granularity == 0 {
                seek_points.push((value, writer.bits_written()));
            }
        }

        // terminating zero difference
        writer.write_unary(0)?;
        writer.write_bits(log2p, 0)?;

        let data_bits = writer.bits_written();
        let (buffered, padding) = writer.finish()?;
        let end_of_data = (data_bits + padding) / 8;
        debug!(end_of_data, "end of data: {end_of_data}");

        info!(stage = "write index", "writing {} seek points", seek_points.len());
        let mut out = buffered;
        for &(value, bit_pos) in &seek_points {
            out.write_all(&value.to_be_bytes())?;
            out.write_all(&bit_pos.to_be_bytes())?;
        }

        out.write_all(&num.to_be_bytes())?;
        out.write_all(&probability.to_be_bytes())?;
        out.write_all(&end_of_data.to_be_bytes())?;
        out.write_all(&(seek_points.len() as u64).to_be_bytes())?;
        out.write_all(GCS_MAGIC)?;
        out.flush()?;

        let seek_count = seek_points.len() as u64;
        Ok(GcsSummary {
            items: num,
            encoded,
            seek_points: seek_count,
            bytes_written: end_of_data + seek_count * 16 + super::FOOTER_LEN as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::sha1;
    use crate::gcs::{FOOTER_LEN, read_u64};

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(GcsBuilder::new(1, 1024), Err(CorpusLoadError::InvalidParameters(_))));
        assert!(matches!(GcsBuilder::new(1024, 0), Err(CorpusLoadError::InvalidParameters(_))));
    }

    #[test]
    fn test_empty_builder_refused() {
        let builder = GcsBuilder::new(1024, 16).unwrap();
        assert!(matches!(builder.finish(Vec::new()), Err(CorpusLoadError::Empty)));
    }

    #[test]
    fn test_footer_layout() {
        let mut builder = GcsBuilder::new(1 << 20, 2).unwrap();
        for word in ["password", "123456", "qwerty", "dragon", "monkey"] {
            builder.add(&sha1(word.as_bytes()));
        }
        // duplicates do not count towards N
        builder.add(&sha1(b"password"));
        assert_eq!(builder.len(), 6);

        let mut out = Vec::new();
        let summary = builder.finish(&mut out).unwrap();

        assert_eq!(summary.items, 5);
        assert_eq!(summary.encoded, 5);
        assert_eq!(summary.seek_points, 2);
        assert_eq!(summary.bytes_written, out.len() as u64);

        let footer = &out[out.len() - FOOTER_LEN..];
        assert_eq!(read_u64(&footer[0..]), 5);
        assert_eq!(read_u64(&footer[8..]), 1 << 20);
        assert_eq!(read_u64(&footer[24..]), 2);
        assert_eq!(&footer[32..], GCS_MAGIC);

        let end_of_data = read_u64(&footer[16..]);
        assert_eq!(end_of_data + 2 * 16 + FOOTER_LEN as u64, out.len() as u64);
    }
}
