use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvtError>;
pub type DeserializationResult<T> = std::result::Result<T, DeserializationError>;

/// Win32 `ERROR_INSUFFICIENT_BUFFER`, surfaced by the read seam when the
/// caller's buffer cannot hold the next record.
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;

/// Win32 `ERROR_CALL_NOT_IMPLEMENTED`, used by the non-Windows stubs.
pub const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;

#[derive(Debug, Error)]
pub enum EvtError {
    #[error("`{op}` failed with OS error {code}")]
    Os { op: &'static str, code: u32 },

    #[error("failed to parse record {record_number}, caused by:\n\t{source}")]
    FailedToParseRecord {
        record_number: u32,
        source: DeserializationError,
    },

    #[error(transparent)]
    DeserializationError(#[from] DeserializationError),

    #[error("`serde_json` failed with error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("the native event log API is not available on this platform")]
    Unsupported,
}

/// Structural decode failures. A record that trips one of these is never
/// partially observable; siblings already yielded from the same buffer stay
/// valid.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("offset {offset}: an I/O error has occurred while trying to read {t}: {source}")]
    FailedToRead {
        t: &'static str,
        offset: u64,
        source: io::Error,
    },

    #[error("invalid event record signature, expected `0x654c664c`, found `{found:#010x}`")]
    InvalidRecordSignature { found: u32 },

    #[error("record length {length} is smaller than the {min}-byte fixed layout")]
    RecordTooShort { length: u32, min: usize },

    #[error(
        "record length {length} at buffer offset {offset} overruns the \
         {available} bytes delivered by the read call"
    )]
    RecordOverrunsBuffer {
        length: u32,
        offset: usize,
        available: usize,
    },

    #[error("leading record length {leading} does not match the trailing copy {trailing}")]
    MismatchedRecordLength { leading: u32, trailing: u32 },

    #[error("offset {offset}: {what} range (+{len} bytes) escapes the record's {record_len}-byte span")]
    RangeOutOfRecord {
        what: &'static str,
        offset: u32,
        len: u32,
        record_len: u32,
    },

    #[error("offset {offset}: failed to decode UTF-16 string, caused by: {source}")]
    FailedToDecodeUTF16String { source: io::Error, offset: u64 },

    #[error(
        "offset {offset}: failed to decode ansi string (used encoding scheme {encoding}), \
         caused by: {message}"
    )]
    FailedToDecodeANSIString {
        encoding: &'static str,
        message: String,
        offset: u64,
    },
}

/// Outcome of a single native read call, as reported by the `EventLogApi`
/// seam. Only `Os` is fatal; the other two drive the read loop.
#[derive(Debug)]
pub enum ReadError {
    /// The supplied buffer cannot hold the next record; `needed` is the byte
    /// count the OS reported as sufficient.
    InsufficientBuffer { needed: u32 },
    /// No records remain in the requested direction.
    EndOfLog,
    /// Any other native failure, carrying the failing operation's name and
    /// the OS error code.
    Os { op: &'static str, code: u32 },
}

impl From<ReadError> for EvtError {
    fn from(err: ReadError) -> Self {
        match err {
            // Callers are expected to consume these two before converting.
            ReadError::InsufficientBuffer { .. } => EvtError::Os {
                op: "ReadEventLog",
                code: ERROR_INSUFFICIENT_BUFFER,
            },
            ReadError::EndOfLog => EvtError::Os {
                op: "ReadEventLog",
                code: 0,
            },
            ReadError::Os { op, code } => EvtError::Os { op, code },
        }
    }
}
