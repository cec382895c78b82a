//! Error types for the rlz compression pipeline.

use thiserror::Error;

/// Error variants surfaced by transforms, entropy coders and the container.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction-time configuration rejection.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Caller-allocated destination buffer is insufficient.
    #[error("output buffer too small: size {size}, required {required}")]
    BufferTooSmall { size: usize, required: usize },

    /// The decoder saw a structural violation in the stream.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Block checksum did not match after detransform.
    #[error("CRC mismatch in block {block}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        block: usize,
        stored: u32,
        computed: u32,
    },

    /// An I/O error occurred on the underlying sink or source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A bitstream reader was exhausted.
    #[error("end of stream")]
    EndOfStream,

    /// Unknown codec id/name or unsupported stream version.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// A specialized Result type for rlz operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes. The table is part of the external contract and must
/// stay stable across releases.
pub mod exit_code {
    pub const MISSING_PARAM: i32 = 1;
    pub const BLOCK_SIZE: i32 = 2;
    pub const INVALID_CODEC: i32 = 3;
    pub const CREATE_COMPRESSOR: i32 = 4;
    pub const CREATE_DECOMPRESSOR: i32 = 5;
    pub const OUTPUT_IS_DIR: i32 = 6;
    pub const OVERWRITE_FILE: i32 = 7;
    pub const CREATE_FILE: i32 = 8;
    pub const CREATE_BITSTREAM: i32 = 9;
    pub const OPEN_FILE: i32 = 10;
    pub const READ_FILE: i32 = 11;
    pub const WRITE_FILE: i32 = 12;
    pub const PROCESS_BLOCK: i32 = 13;
    pub const INVALID_FILE: i32 = 15;
    pub const STREAM_VERSION: i32 = 16;
    pub const INVALID_PARAM: i32 = 18;
    pub const CRC_CHECK: i32 = 19;
    pub const UNKNOWN: i32 = 127;
}

impl Error {
    /// Map an error to the fixed exit-code table.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidParameter(_) => exit_code::INVALID_PARAM,
            Error::BufferTooSmall { .. } => exit_code::PROCESS_BLOCK,
            Error::InvalidData(_) => exit_code::INVALID_FILE,
            Error::CrcMismatch { .. } => exit_code::CRC_CHECK,
            Error::Io(_) => exit_code::WRITE_FILE,
            Error::EndOfStream => exit_code::READ_FILE,
            Error::Unsupported(_) => exit_code::STREAM_VERSION,
        }
    }
}
