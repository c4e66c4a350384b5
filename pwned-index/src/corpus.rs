//! Text corpus parsing.
//!
//! One record per line: the hex digest, optionally followed by `:<count>` as in the Pwned
//! Passwords "ordered by hash" download. Blank lines are skipped; anything else is an error
//! so that a truncated or garbled corpus can never silently shrink the index.

use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom};

use crate::digest::{CredentialDigest, DigestAlgorithm, SHA1_LEN};
use crate::error::CorpusLoadError;

/// Bytes sampled from the head of a corpus file to estimate its line count (16 MiB).
const ESTIMATE_SAMPLE: u64 = 16 * 1024 * 1024;

/// Digits in `u64::MAX`, the longest count a record can carry.
const MAX_COUNT_DIGITS: usize = 20;

/// Streaming reader over a text corpus, yielding one digest per record.
pub struct CorpusReader<R> {
    inner: R,
    digest_len: usize,
    max_line: usize,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> CorpusReader<R> {
    /// Reader for SHA1 corpora.
    pub fn new(inner: R) -> Self {
        Self::with_digest_len(inner, SHA1_LEN)
    }

    pub fn with_algorithm(inner: R, algorithm: &dyn DigestAlgorithm) -> Self {
        Self::with_digest_len(inner, algorithm.digest_len())
    }

    pub fn with_digest_len(inner: R, digest_len: usize) -> Self {
        // hex, ':', count, "\r\n"
        let max_line = 2 * digest_len + 1 + MAX_COUNT_DIGITS + 2;
        Self { inner, digest_len, max_line, line: 0, buf: Vec::with_capacity(64) }
    }

    /// Number of lines consumed so far (including blank ones).
    pub fn lines_read(&self) -> u64 {
        self.line
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = Result<CredentialDigest, CorpusLoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            // one byte past the limit tells an overlong line from one that just fits
            let limit = self.max_line as u64 + 1;
            match self.inner.by_ref().take(limit).read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(CorpusLoadError::Io(e))),
            }
            self.line += 1;
            if self.buf.len() > self.max_line {
                return Some(Err(CorpusLoadError::Malformed { line: self.line }));
            }

            let record = self.buf.trim_ascii();
            if record.is_empty() {
                continue;
            }

            return Some(
                parse_record(record, self.digest_len)
                    .ok_or(CorpusLoadError::Malformed { line: self.line }),
            );
        }
    }
}

/// Parses `HEX` or `HEX:COUNT`. Returns `None` for anything else.
pub fn parse_record(record: &[u8], digest_len: usize) -> Option<CredentialDigest> {
    let (hex, count) = match record.iter().position(|&b| b == b':') {
        Some(idx) => (&record[..idx], Some(&record[idx + 1..])),
        None => (record, None),
    };

    if let Some(count) = count {
        if count.is_empty() || !count.iter().all(u8::is_ascii_digit) {
            return None;
        }
    }

    let hex = std::str::from_utf8(hex).ok()?;
    CredentialDigest::from_hex(hex, digest_len).ok()
}

/// Estimates the number of lines in a corpus file by counting newlines in the first 16 MiB
/// and scaling by the file size. Used only to presize buffers; the file position is restored
/// to the start.
pub fn estimate_lines(file: &mut File) -> io::Result<u64> {
    let size = file.metadata()?.len();
    if size == 0 {
        return Ok(0);
    }

    let sample_len = size.min(ESTIMATE_SAMPLE);
    let mut sample = Vec::with_capacity(sample_len as usize);
    file.by_ref().take(sample_len).read_to_end(&mut sample)?;
    file.seek(SeekFrom::Start(0))?;

    let newlines = sample.iter().filter(|&&b| b == b'\n').count().max(1) as u64;
    Ok(newlines.saturating_mul(size) / sample.len().max(1) as u64)
}
