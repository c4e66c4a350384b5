//! Immutable lookup structures for compromised-credential digests.
//!
//! Every backend answers the same question, "is this digest in the corpus?", through the
//! [`HashIndex`] trait, and none of them can be mutated once built:
//!
//! - [`GcsIndex`]: a Golomb-coded set, roughly `log2(P) + 2` bits per item with a 1-in-P false
//!   positive rate. The compact default for the full Pwned Passwords corpus.
//! - [`SortedIndex`]: sorted 64-bit truncated digests searched in memory. Built straight from
//!   a text corpus, no preprocessing step.
//! - [`PrefixDirIndex`]: the sha1t48 directory of 1,048,576 prefix files, one small file read
//!   per lookup and nothing resident in memory.
//!
//! False positives only ever err on the safe side (a password reported as breached). No
//! backend produces false negatives, and a backend that cannot answer reports an error
//! instead of `false`.

pub mod bits;
pub mod corpus;
pub mod digest;
pub mod error;
pub mod gcs;
pub mod prefix_dir;
pub mod shared;
pub mod sorted;

pub use corpus::CorpusReader;
pub use digest::{CredentialDigest, DigestAlgorithm, Sha1Algorithm, sha1};
pub use error::{CorpusLoadError, DigestError, LookupError};
pub use gcs::{GcsBuilder, GcsIndex, GcsSummary};
pub use prefix_dir::PrefixDirIndex;
pub use shared::SharedIndex;
pub use sorted::SortedIndex;

/// Read-only membership test over a corpus of credential digests.
///
/// Implementations are immutable after construction and safe to share across threads
/// without locking.
pub trait HashIndex: Send + Sync {
    /// Returns `Ok(true)` if the digest is (probably, for probabilistic backends) in the
    /// corpus, `Ok(false)` if it definitely is not.
    fn contains(&self, digest: &CredentialDigest) -> Result<bool, LookupError>;

    /// Number of distinct digests the index was built from.
    fn count(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use super::*;

    const CORPUS: &str = "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8:52256179\n\
                          C524A39C02F142BA0B81DA289F2E11332D59B4DD:24\n\
                          CBFDAC6008F9CAB4083784CBD1874F76618D2A97:2254650\n";

    fn backends() -> Vec<Arc<dyn HashIndex>> {
        let sorted = SortedIndex::build(Cursor::new(CORPUS)).unwrap();

        let mut builder = GcsBuilder::new(gcs::DEFAULT_FALSE_POSITIVE_RATE, 2).unwrap();
        for digest in CorpusReader::new(Cursor::new(CORPUS)) {
            builder.add(&digest.unwrap());
        }
        let mut bytes = Vec::new();
        builder.finish(&mut bytes).unwrap();
        let gcs = GcsIndex::from_bytes(bytes).unwrap();

        vec![Arc::new(sorted), Arc::new(gcs)]
    }

    #[test]
    fn test_backends_agree() {
        for index in backends() {
            assert_eq!(index.count(), 3);
            for password in ["password", "i love dogs", "password123"] {
                assert!(index.contains(&sha1(password.as_bytes())).unwrap(), "{password}");
            }
            for password in ["9Uy34f#qM2zr", "hAwT?}cuC:r#kW5", ""] {
                assert!(!index.contains(&sha1(password.as_bytes())).unwrap(), "{password}");
            }
        }
    }

    #[test]
    fn test_concurrent_readers_agree() {
        for index in backends() {
            let digest = sha1(b"password");
            let results: Vec<bool> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..32)
                    .map(|_| {
                        let index = &index;
                        s.spawn(move || index.contains(&digest).unwrap())
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert!(results.iter().all(|&found| found));
        }
    }
}
