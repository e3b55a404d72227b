//! `evt` - a reader and message resolver for the legacy Windows Event Log.
//!
//! The legacy `ReadEventLog` generation of the API hands callers an opaque,
//! packed buffer of variable-length binary records. This crate turns those
//! buffers into structured [`EventRecord`] values: it drains the kernel
//! buffer (growing it when the OS asks), slices and decodes each record,
//! locates the source's message templates across both generations of
//! Windows logging (legacy registry-registered message files and modern
//! publisher metadata), expands numbered insertion placeholders - including
//! `%%N` references that indirect through a parameter file - and resolves
//! the embedded security identifier to an account name, best-effort.
//!
//! The decode and resolution pipeline is portable and fully testable off
//! Windows through the seams in [`evt_reader`] and [`message_resolver`];
//! the live OS implementations live behind `cfg(windows)` in [`sys`].
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> evt::err::Result<()> {
//! use evt::{EventLogReader, ReadFlags};
//!
//! let log = evt::sys::EventLog::open(None, "System")?;
//! let mut reader = EventLogReader::new(log, "System", evt::sys::system_context());
//!
//! let batch = reader.read_batch(ReadFlags::default(), 0)?;
//! for record in batch.records {
//!     let record = record?;
//!     println!("{} {:?} {}", record.record_number, record.event_type, record.description);
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

use std::fmt;

use encoding::all::WINDOWS_1252;
use encoding::EncodingRef;

pub mod err;
pub mod evt_buffer;
pub mod evt_reader;
pub mod evt_record;
pub mod insert_expander;
pub mod message_resolver;
pub mod record;
pub mod sid;
pub mod sys;
mod utils;

pub use err::{EvtError, ReadError, Result};
pub use evt_buffer::{ReadFlags, RecordBuffer, DEFAULT_BUFFER_SIZE};
pub use evt_reader::{EventLogApi, EventLogReader, IterRecords, RecordBatch, ResolutionContext};
pub use evt_record::{EvtRecordHeader, RawRecord};
pub use message_resolver::{
    MessageModule, MessageProvider, MessageResolver, PublisherCatalog, PublisherMetadata,
    RegistryKey, RegistryView, ResolutionOrigin, ResolvedTemplateSource,
};
pub use record::{EventRecord, EventType};
pub use sid::{AccountLookup, NoAccountLookup};

/// How the record's strings are encoded on the wire.
///
/// Handles opened through the wide API carry UTF-16LE strings; legacy
/// narrow-API builds carry ANSI strings in the system codepage. The setting
/// applies consistently to the header strings, the insertion strings and
/// message-file text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEncoding {
    Utf16,
    Ansi,
}

/// Reader configuration.
pub struct ReaderSettings {
    record_encoding: RecordEncoding,
    ansi_codec: EncodingRef,
    buffer_size: usize,
}

impl ReaderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wire encoding of record strings.
    pub fn record_encoding(mut self, encoding: RecordEncoding) -> Self {
        self.record_encoding = encoding;
        self
    }

    /// Sets the codec used to decode ANSI strings
    /// (only relevant with [`RecordEncoding::Ansi`]).
    pub fn ansi_codec(mut self, codec: EncodingRef) -> Self {
        self.ansi_codec = codec;
        self
    }

    /// Sets the initial read-buffer capacity.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub(crate) fn get_record_encoding(&self) -> RecordEncoding {
        self.record_encoding
    }

    pub(crate) fn get_ansi_codec(&self) -> EncodingRef {
        self.ansi_codec
    }

    pub(crate) fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        ReaderSettings {
            record_encoding: RecordEncoding::Utf16,
            ansi_codec: WINDOWS_1252,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl fmt::Debug for ReaderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSettings")
            .field("record_encoding", &self.record_encoding)
            .field("ansi_codec", &self.ansi_codec.name())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl PartialEq for ReaderSettings {
    fn eq(&self, other: &Self) -> bool {
        self.record_encoding == other.record_encoding
            && self.ansi_codec.name() == other.ansi_codec.name()
            && self.buffer_size == other.buffer_size
    }
}

impl Clone for ReaderSettings {
    fn clone(&self) -> Self {
        ReaderSettings {
            record_encoding: self.record_encoding,
            ansi_codec: self.ansi_codec,
            buffer_size: self.buffer_size,
        }
    }
}
