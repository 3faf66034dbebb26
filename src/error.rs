use std::io;
use std::num::TryFromIntError;
use thiserror::Error;

#[derive(Error, Debug)]
/// A set of library specific errors.
pub enum TdmsError {
    #[error("{0:?}")]
    ReadError(#[from] io::Error),

    #[error("{0:?}")]
    IntConversionError(#[from] TryFromIntError),

    #[error("invalid segment - malformed or missing lead-in tag")]
    InvalidSegment(),

    #[error("requested group does not exist in segment")]
    GroupDoesNotExist(),

    #[error("requested channel does not exist in segment")]
    ChannelDoesNotExist(),

    #[error("unknown data type")]
    UnknownDataType(),

    #[error("bad segment signature: expected 'TDSm' or 'TDSh', found {0}")]
    BadSignature(String),

    #[error("object '{0}' raw-data index is marked reused (0x00000000) but has no prior segment to reuse from")]
    InvalidReuse(String),

    #[error("interleaved chunk participants disagree on value count: {0}")]
    InconsistentInterleavedCounts(String),

    #[error("interleaved layout cannot carry more than one string channel: {0}")]
    InvalidInterleavedString(String),

    #[error("segment at offset {0} is incomplete: declared {1} bytes, {2} available")]
    IncompleteSegment(u64, u64, u64),

    #[error("invalid utf-8 while decoding {0}")]
    InvalidUtf8(String),

    #[error("index file metadata does not match data file metadata at segment {0}")]
    IndexMismatch(u64),

    #[error("short read: expected {0} bytes, got {1}")]
    ShortRead(usize, usize),

    #[error("type mismatch: expected {0}, found {1}")]
    TypeMismatch(String, String),

    #[error("{0}")]
    Unsupported(String),
}
