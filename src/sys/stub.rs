//! Non-Windows stand-ins. Constructors fail with `Unsupported`; the types
//! only exist so cross-platform code can name them.

use std::path::Path;

use super::{SourceConfig, SourceDisposition};
use crate::err::{EvtError, ReadError, Result, ERROR_CALL_NOT_IMPLEMENTED};
use crate::evt_buffer::ReadFlags;
use crate::evt_reader::{EventLogApi, ResolutionContext};
use crate::record::EventType;
use crate::sid::NoAccountLookup;

/// An open event log handle. Never constructible off Windows.
pub struct EventLog {
    _private: (),
}

impl EventLog {
    pub fn open(_server: Option<&str>, _source: &str) -> Result<EventLog> {
        Err(EvtError::Unsupported)
    }

    pub fn open_backup(_server: Option<&str>, _file: &Path) -> Result<EventLog> {
        Err(EvtError::Unsupported)
    }

    pub fn backup(&mut self, _path: &Path) -> Result<()> {
        Err(EvtError::Unsupported)
    }
}

impl EventLogApi for EventLog {
    fn read(
        &mut self,
        _flags: ReadFlags,
        _record_offset: u32,
        _buf: &mut [u8],
    ) -> std::result::Result<usize, ReadError> {
        Err(ReadError::Os {
            op: "ReadEventLog",
            code: ERROR_CALL_NOT_IMPLEMENTED,
        })
    }

    fn record_count(&mut self) -> Result<u32> {
        Err(EvtError::Unsupported)
    }

    fn oldest_record_number(&mut self) -> Result<u32> {
        Err(EvtError::Unsupported)
    }
}

/// A registered event source handle for writing. Never constructible off
/// Windows.
pub struct EventSource {
    _private: (),
}

impl EventSource {
    pub fn register(_server: Option<&str>, _source: &str) -> Result<EventSource> {
        Err(EvtError::Unsupported)
    }

    pub fn report(
        &mut self,
        _event_type: EventType,
        _category: u16,
        _event_id: u32,
        _strings: &[&str],
        _data: Option<&[u8]>,
    ) -> Result<()> {
        Err(EvtError::Unsupported)
    }
}

pub fn register_source(
    _server: Option<&str>,
    _log: &str,
    _source: &str,
    _config: &SourceConfig,
) -> Result<SourceDisposition> {
    Err(EvtError::Unsupported)
}

/// A context with no live seams: resolution always misses and SIDs stay
/// untranslated. Lets portable code construct a reader around a fake
/// [`EventLogApi`] without cfg-gating.
pub fn system_context() -> ResolutionContext {
    struct NoView;

    impl crate::message_resolver::RegistryView for NoView {
        fn open_key(
            &self,
            _path: &str,
        ) -> Option<Box<dyn crate::message_resolver::RegistryKey + '_>> {
            None
        }
    }

    impl crate::message_resolver::PublisherCatalog for NoView {
        fn open_publisher(
            &self,
            _source: &str,
        ) -> Option<crate::message_resolver::PublisherMetadata> {
            None
        }
    }

    impl crate::message_resolver::MessageProvider for NoView {
        fn open_module(
            &self,
            _path: &Path,
        ) -> Option<Box<dyn crate::message_resolver::MessageModule + '_>> {
            None
        }
    }

    ResolutionContext {
        registry: Box::new(NoView),
        publishers: Box::new(NoView),
        messages: Box::new(NoView),
        accounts: Box::new(NoAccountLookup),
    }
}
