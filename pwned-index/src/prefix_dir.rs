//! sha1t48 prefix directories.
//!
//! The dataset is 1,048,576 files named `{PREFIX}.bin`, one per 5-character uppercase hex
//! prefix (`00000.bin` .. `FFFFF.bin`). The first 2.5 bytes of each SHA1 are encoded in the
//! file name, so each file holds only bytes 2-7 of the hash as fixed 6-byte records in sorted
//! order: record N is at byte offset N * 6, and a lookup is one small file read plus a binary
//! search with no parsing.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::HashIndex;
use crate::digest::CredentialDigest;
use crate::error::{CorpusLoadError, LookupError};

/// The length of a sha1t48 record in bytes.
pub const RECORD_SIZE: usize = 6;

/// The length of a SHA1 hash prefix used for file naming (5 hex characters).
pub const PREFIX_LEN: usize = 5;

/// Total number of prefix files (16^5 = 1,048,576)
pub const TOTAL_PREFIXES: u32 = 0x100000;

/// Hex lookup table for prefix conversion.
pub const PREFIX_HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

// Largest prefix file in the full dataset is ~14.6KB (2495 records). 16KB leaves room for
// growth and keeps the read on the stack.
const READ_BUF_SIZE: usize = 16384;

const PATH_BUF_SIZE: usize = 512;

/// Index over a sha1t48 prefix directory. Holds no data in memory; every lookup reads one
/// prefix file, so it suits datasets far larger than RAM.
pub struct PrefixDirIndex {
    dataset_path: String,
    count: u64,
    files: u32,
}

impl PrefixDirIndex {
    /// Opens a complete dataset. Fails unless all 1,048,576 prefix files are present and
    /// well formed.
    pub fn open(dataset_path: &Path) -> Result<Self, CorpusLoadError> {
        let index = Self::open_partial(dataset_path)?;
        if index.files != TOTAL_PREFIXES {
            return Err(CorpusLoadError::Corrupt("prefix directory is incomplete"));
        }
        Ok(index)
    }

    /// Opens a dataset that may lack some prefix files. Lookups that land on a missing prefix
    /// fail with an I/O error rather than reporting "not found".
    pub fn open_partial(dataset_path: &Path) -> Result<Self, CorpusLoadError> {
        let base = dataset_path
            .to_str()
            .ok_or(CorpusLoadError::InvalidParameters("dataset path is not valid UTF-8"))?
            .trim_end_matches('/');
        if base.len() + 1 + PREFIX_LEN + 4 > PATH_BUF_SIZE {
            return Err(CorpusLoadError::InvalidParameters("dataset path is too long"));
        }

        let mut count = 0u64;
        let mut files = 0u32;
        for entry in fs::read_dir(dataset_path)? {
            let path = entry?.path();
            if parse_prefix_file_name(&path).is_none() {
                continue;
            }
            let len = fs::metadata(&path)?.len();
            if len % RECORD_SIZE as u64 != 0 {
                return Err(CorpusLoadError::Corrupt("prefix file is not a whole number of records"));
            }
            if len > READ_BUF_SIZE as u64 {
                return Err(CorpusLoadError::Corrupt("prefix file exceeds the lookup buffer"));
            }
            count += len / RECORD_SIZE as u64;
            files += 1;
        }

        if files == 0 {
            return Err(CorpusLoadError::Empty);
        }
        if files < TOTAL_PREFIXES {
            warn!(files, "prefix directory has {files} of {TOTAL_PREFIXES} prefix files");
        }
        info!(items = count, files, "prefix directory ready for queries");

        Ok(Self { dataset_path: base.to_owned(), count, files })
    }

    /// Returns the prefix for the hash as hex (first 5 hex chars == first 2.5 bytes)
    /// that matches the file name on disk where the hash might be found.
    #[inline(always)]
    pub fn prefix_hex(hash: &[u8]) -> [u8; PREFIX_LEN] {
        [
            PREFIX_HEX_CHARS[(hash[0] >> 4) as usize],
            PREFIX_HEX_CHARS[(hash[0] & 0x0f) as usize],
            PREFIX_HEX_CHARS[(hash[1] >> 4) as usize],
            PREFIX_HEX_CHARS[(hash[1] & 0x0f) as usize],
            PREFIX_HEX_CHARS[(hash[2] >> 4) as usize],
        ]
    }

    // Build file path without allocation: base_path + '/' + prefix + ".bin"
    #[inline(always)]
    fn open_file(&self, prefix_hex: [u8; PREFIX_LEN]) -> io::Result<File> {
        let base = self.dataset_path.as_bytes();
        let mut path_buf = [0u8; PATH_BUF_SIZE];
        let path_len = base.len() + 1 + PREFIX_LEN + 4; // +4 for ".bin"
        path_buf[..base.len()].copy_from_slice(base);
        path_buf[base.len()] = b'/';
        path_buf[base.len() + 1..base.len() + 1 + PREFIX_LEN].copy_from_slice(&prefix_hex);
        path_buf[base.len() + 1 + PREFIX_LEN..path_len].copy_from_slice(b".bin");

        let file_path = std::str::from_utf8(&path_buf[..path_len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        File::open(file_path)
    }

    /// Number of prefix files found when the directory was opened.
    pub fn files(&self) -> u32 {
        self.files
    }
}

impl HashIndex for PrefixDirIndex {
    fn contains(&self, digest: &CredentialDigest) -> Result<bool, LookupError> {
        let hash = digest.as_bytes();
        let mut file = self.open_file(Self::prefix_hex(hash))?;

        let mut buf = [0u8; READ_BUF_SIZE];

        // read() is not guaranteed to return the full file in a single call.
        let mut total = 0usize;
        loop {
            if total == buf.len() {
                return Err(LookupError::Corrupt("prefix file exceeds the lookup buffer"));
            }
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if total % RECORD_SIZE != 0 {
            return Err(LookupError::Corrupt("prefix file is not a whole number of records"));
        }

        let mut search_key = [0u8; RECORD_SIZE];
        search_key.copy_from_slice(&hash[2..8]);

        Ok(binary_search_sha1t48(&buf[..total], &search_key))
    }

    fn count(&self) -> u64 {
        self.count
    }
}

/// Binary searches for a sha1t48 record in the contents of a prefix file.
///
/// The data holds fixed-size 6-byte records in sorted order, enabling direct index
/// calculation.
#[inline(always)]
pub fn binary_search_sha1t48(data: &[u8], search_key: &[u8; RECORD_SIZE]) -> bool {
    let mut low = 0usize;
    let mut high = data.len() / RECORD_SIZE;

    while low < high {
        let mid = low + (high - low) / 2;
        let offset = mid * RECORD_SIZE;

        let record = &data[offset..offset + RECORD_SIZE];

        match record.cmp(search_key) {
            Ordering::Equal => return true,
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
        }
    }

    false
}

/// Returns the prefix value for `{PREFIX}.bin` file names, `None` for anything else.
pub fn parse_prefix_file_name(path: &Path) -> Option<u32> {
    path.extension()
        .filter(|ext| *ext == "bin")
        .and_then(|_| path.file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|s| s.len() == PREFIX_LEN && s.bytes().all(|b| PREFIX_HEX_CHARS.contains(&b)))
        .and_then(|s| u32::from_str_radix(s, 16).ok())
}

/// Path of the prefix file that would hold `digest`.
pub fn prefix_file_path(dataset_path: &Path, digest: &CredentialDigest) -> PathBuf {
    let prefix = PrefixDirIndex::prefix_hex(digest.as_bytes());
    // prefix bytes come from the hex table
    let name = String::from_utf8_lossy(&prefix);
    dataset_path.join(format!("{name}.bin"))
}
