//! Loading an index from disk and building GCS files from a text corpus.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use pwned_index::corpus::estimate_lines;
use pwned_index::gcs::GCS_MAGIC;
use pwned_index::{
    CorpusLoadError, CorpusReader, GcsBuilder, GcsIndex, GcsSummary, HashIndex, PrefixDirIndex,
    SortedIndex,
};
use tracing::{info, warn};

use crate::error::Error;

// How often the corpus reader reports progress, in lines.
const PROGRESS_INTERVAL: u64 = 1 << 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum IndexFormat {
    /// Directory -> prefix-dir, file ending in the GCS magic -> gcs, anything else -> text
    #[default]
    Auto,
    /// Golomb-coded set file built by `create`
    Gcs,
    /// Text corpus of hex digests, one per line, sorted in memory at startup
    Text,
    /// Directory of sha1t48 `{PREFIX}.bin` files
    PrefixDir,
}

/// Resolves [`IndexFormat::Auto`] by looking at `path`.
pub fn detect_format(path: &Path) -> std::io::Result<IndexFormat> {
    if fs::metadata(path)?.is_dir() {
        return Ok(IndexFormat::PrefixDir);
    }

    let mut file = File::open(path)?;
    if file.metadata()?.len() < GCS_MAGIC.len() as u64 {
        return Ok(IndexFormat::Text);
    }
    let mut magic = [0u8; 8];
    file.seek(SeekFrom::End(-(GCS_MAGIC.len() as i64)))?;
    file.read_exact(&mut magic)?;
    Ok(if &magic == GCS_MAGIC { IndexFormat::Gcs } else { IndexFormat::Text })
}

/// Loads a complete index. Any problem with the data is an error: a partial or empty index
/// is never returned.
///
/// `allow_partial` only affects prefix directories. It accepts a directory that lacks some
/// prefix files; lookups landing on a missing prefix then fail instead of answering.
pub fn load_index(
    path: &Path,
    format: IndexFormat,
    allow_partial: bool,
) -> Result<Arc<dyn HashIndex>, CorpusLoadError> {
    let started = Instant::now();
    let format = match format {
        IndexFormat::Auto => detect_format(path)?,
        explicit => explicit,
    };

    let index: Arc<dyn HashIndex> = match format {
        IndexFormat::Gcs => Arc::new(GcsIndex::open(path)?),
        IndexFormat::Text => Arc::new(SortedIndex::build(BufReader::new(File::open(path)?))?),
        IndexFormat::PrefixDir if allow_partial => {
            warn!("serving a prefix directory that may be incomplete");
            Arc::new(PrefixDirIndex::open_partial(path)?)
        }
        IndexFormat::PrefixDir => Arc::new(PrefixDirIndex::open(path)?),
        IndexFormat::Auto => {
            return Err(CorpusLoadError::InvalidParameters("index format could not be detected"));
        }
    };

    info!(
        ?format,
        items = index.count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index loaded from {}",
        path.display()
    );
    Ok(index)
}

/// Builds a GCS file at `output` from the text corpus at `input`. A partially written
/// output is removed on failure.
pub fn build_gcs_file(
    input: &Path,
    output: &Path,
    probability: u64,
    granularity: u64,
    progress: &ProgressBar,
) -> Result<GcsSummary, Error> {
    let mut file = File::open(input)?;
    let estimate = estimate_lines(&mut file)?;
    progress.set_length(estimate);

    let mut builder = GcsBuilder::with_capacity(probability, granularity, estimate as usize)?;
    let mut reader = CorpusReader::new(BufReader::new(file));
    while let Some(digest) = reader.next() {
        builder.add(&digest?);
        if reader.lines_read() % PROGRESS_INTERVAL == 0 {
            progress.set_position(reader.lines_read());
        }
    }
    progress.set_position(reader.lines_read());
    info!(lines = reader.lines_read(), keys = builder.len(), "corpus read");

    let result = File::create(output)
        .map_err(Error::from)
        .and_then(|out| builder.finish(BufWriter::new(out)).map_err(Error::from));
    if result.is_err() {
        if let Err(err) = fs::remove_file(output) {
            warn!(error = %err, "could not remove partial output {}", output.display());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pwned_index::gcs::DEFAULT_FALSE_POSITIVE_RATE;
    use pwned_index::sha1;

    use super::*;

    const CORPUS: &str = "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8:52256179\n\
                          C524A39C02F142BA0B81DA289F2E11332D59B4DD:24\n\
                          7C4A8D09CA3762AF61E59520943DC26494F8941B:37359195\n";

    fn write_corpus(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("corpus.txt");
        File::create(&path).unwrap().write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_text_corpus_round_trip_through_gcs() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_corpus(dir.path(), CORPUS);
        let output = dir.path().join("corpus.gcs");

        let summary =
            build_gcs_file(&input, &output, DEFAULT_FALSE_POSITIVE_RATE, 2, &ProgressBar::hidden())
                .unwrap();
        assert_eq!(summary.items, 3);

        assert_eq!(detect_format(&input).unwrap(), IndexFormat::Text);
        assert_eq!(detect_format(&output).unwrap(), IndexFormat::Gcs);
        assert_eq!(detect_format(dir.path()).unwrap(), IndexFormat::PrefixDir);

        for path in [&input, &output] {
            let index = load_index(path, IndexFormat::Auto, false).unwrap();
            assert_eq!(index.count(), 3);
            for password in ["password", "i love dogs", "123456"] {
                assert!(index.contains(&sha1(password.as_bytes())).unwrap(), "{password}");
            }
            assert!(!index.contains(&sha1(b"9Uy34f#qM2zr")).unwrap());
        }
    }

    #[test]
    fn test_failed_build_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_corpus(dir.path(), "\n\n");
        let output = dir.path().join("empty.gcs");

        let err = build_gcs_file(
            &input,
            &output,
            DEFAULT_FALSE_POSITIVE_RATE,
            1024,
            &ProgressBar::hidden(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Index(CorpusLoadError::Empty)));
        assert!(!output.exists());
    }

    #[test]
    fn test_load_refuses_bad_data() {
        let dir = tempfile::tempdir().unwrap();
        let input =
            write_corpus(dir.path(), "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8\nnot a hash\n");
        assert!(matches!(
            load_index(&input, IndexFormat::Auto, false),
            Err(CorpusLoadError::Malformed { line: 2 })
        ));

        let empty = write_corpus(dir.path(), "");
        assert!(matches!(
            load_index(&empty, IndexFormat::Text, false),
            Err(CorpusLoadError::Empty)
        ));

        // an explicit format wins over detection
        assert!(matches!(
            load_index(&empty, IndexFormat::Gcs, false),
            Err(CorpusLoadError::Corrupt(_))
        ));

        assert!(matches!(
            load_index(&dir.path().join("missing"), IndexFormat::Auto, false),
            Err(CorpusLoadError::Io(_))
        ));
    }

    #[test]
    fn test_incomplete_prefix_dir_needs_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        // sha1("password") = 5BAA61E4..., sha1t48 record is bytes 2..8
        fs::write(dir.path().join("5BAA6.bin"), [0x61, 0xE4, 0xC9, 0xB9, 0x3F, 0x3F]).unwrap();

        assert!(matches!(
            load_index(dir.path(), IndexFormat::Auto, false),
            Err(CorpusLoadError::Corrupt(_))
        ));
        assert!(matches!(
            load_index(dir.path(), IndexFormat::PrefixDir, false),
            Err(CorpusLoadError::Corrupt(_))
        ));

        let index = load_index(dir.path(), IndexFormat::Auto, true).unwrap();
        assert_eq!(index.count(), 1);
        assert!(index.contains(&sha1(b"password")).unwrap());
        // a prefix without a file is an error, never "not pwned"
        assert!(index.contains(&sha1(b"123456")).is_err());
    }
}
