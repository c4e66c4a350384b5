use std::io::BufRead;

use tracing::debug;

use crate::HashIndex;
use crate::corpus::CorpusReader;
use crate::digest::CredentialDigest;
use crate::error::{CorpusLoadError, LookupError};

/// In-memory index of sorted sha1t64 keys (8 bytes per distinct digest).
///
/// Built straight from a text corpus; suited to corpora that fit comfortably in RAM. With
/// 64-bit keys the expected number of false positives stays far below one even for a billion
/// entries.
pub struct SortedIndex {
    keys: Box<[u64]>,
}

impl SortedIndex {
    /// Builds the index from a text corpus stream. Fails on the first malformed record and
    /// on an empty corpus.
    pub fn build<R: BufRead>(corpus: R) -> Result<Self, CorpusLoadError> {
        let mut keys = Vec::new();
        for digest in CorpusReader::new(corpus) {
            keys.push(digest?.key());
        }
        Self::from_keys(keys)
    }

    pub fn from_digests<I>(digests: I) -> Result<Self, CorpusLoadError>
    where
        I: IntoIterator<Item = CredentialDigest>,
    {
        Self::from_keys(digests.into_iter().map(|d| d.key()).collect())
    }

    fn from_keys(mut keys: Vec<u64>) -> Result<Self, CorpusLoadError> {
        if keys.is_empty() {
            return Err(CorpusLoadError::Empty);
        }
        keys.sort_unstable();
        keys.dedup();
        debug!(items = keys.len(), "sorted index built");
        Ok(Self { keys: keys.into_boxed_slice() })
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of_val(&*self.keys)
    }
}

impl HashIndex for SortedIndex {
    #[inline]
    fn contains(&self, digest: &CredentialDigest) -> Result<bool, LookupError> {
        Ok(self.keys.binary_search(&digest.key()).is_ok())
    }

    fn count(&self) -> u64 {
        self.keys.len() as u64
    }
}
