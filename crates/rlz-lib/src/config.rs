//! Typed configuration for the compression and decompression pipelines.

use std::path::PathBuf;

/// Maximum number of parallel jobs accepted by either pipeline.
pub const MAX_JOBS: usize = 64;

/// Block sizes are capped at 128 MiB; the ROLZ family indexes positions
/// with 24 payload bits per slot and cannot address beyond that.
pub const MAX_BLOCK_SIZE: usize = 1 << 27;

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Default block size (4 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct CompressConfig {
    /// Input file path; `STDIN` selects the standard input stream
    pub input: PathBuf,
    /// Output file path; `STDOUT` selects standard output, `NONE` discards
    pub output: PathBuf,
    /// Block size in bytes (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE)
    pub block_size: usize,
    /// Transform chain, e.g. "ROLZ" or "RLT+ROLZ"
    pub transform: String,
    /// Entropy codec name, e.g. "ANS0", "CM", "TPAQ"
    pub entropy: String,
    /// Number of parallel jobs (1..=MAX_JOBS)
    pub jobs: usize,
    /// Overwrite the output file if it exists
    pub overwrite: bool,
    /// Verbosity level (0..=5)
    pub verbosity: u8,
    /// Store a CRC32 of each block's original bytes
    pub checksum: bool,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            block_size: DEFAULT_BLOCK_SIZE,
            transform: "ROLZ".to_string(),
            entropy: "ANS0".to_string(),
            jobs: 1,
            overwrite: false,
            verbosity: 1,
            checksum: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecompressConfig {
    /// Input file path; `STDIN` selects the standard input stream
    pub input: PathBuf,
    /// Output file path; `STDOUT` selects standard output, `NONE` discards
    pub output: PathBuf,
    /// Number of parallel jobs (1..=MAX_JOBS)
    pub jobs: usize,
    /// Overwrite the output file if it exists
    pub overwrite: bool,
    /// Verbosity level (0..=5)
    pub verbosity: u8,
    /// First block ordinal to emit (inclusive)
    pub from: Option<usize>,
    /// Block ordinal to stop at (exclusive)
    pub to: Option<usize>,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            jobs: 1,
            overwrite: false,
            verbosity: 1,
            from: None,
            to: None,
        }
    }
}

/// True when a path names one of the standard-stream sentinels.
pub fn is_stdio_path(path: &std::path::Path) -> bool {
    matches!(path.to_str(), Some("STDIN") | Some("STDOUT"))
}

/// True when a path names the discarding sink.
pub fn is_none_path(path: &std::path::Path) -> bool {
    path.to_str() == Some("NONE")
}
