//! Live operating-system surface.
//!
//! Everything here is a thin, non-algorithmic wrapper over one native call;
//! the portable pipeline only sees these through the [`EventLogApi`],
//! registry, publisher, message and account seams. On non-Windows targets
//! the same names exist but fail with [`EvtError::Unsupported`], so
//! cross-platform callers compile cleanly.
//!
//! [`EventLogApi`]: crate::evt_reader::EventLogApi
//! [`EvtError::Unsupported`]: crate::err::EvtError::Unsupported

/// Values written to the registry when registering an event source.
///
/// File lists are joined with `;` into the corresponding registry values;
/// empty lists leave the value unwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceConfig {
    pub event_message_files: Vec<String>,
    pub parameter_message_files: Vec<String>,
    pub category_message_files: Vec<String>,
    pub category_count: u32,
    /// Bitmask of supported event-type codes (`TypesSupported`).
    pub types_supported: u32,
}

/// Whether source registration created the registry key or found it
/// already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDisposition {
    CreatedNew,
    OpenedExisting,
}

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{
    register_source, system_context, EventLog, EventSource, WinAccountLookup, WinMessageProvider,
    WinPublisherCatalog, WinRegistry,
};

#[cfg(not(windows))]
mod stub;
#[cfg(not(windows))]
pub use self::stub::{register_source, system_context, EventLog, EventSource};
