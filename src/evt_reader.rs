use byteorder::{ByteOrder, LittleEndian};
use hashbrown::HashMap;
use log::{debug, warn};

use crate::err::{DeserializationError, EvtError, ReadError, Result};
use crate::evt_buffer::{ReadFlags, RecordBuffer};
use crate::evt_record::{RawRecord, EVT_MIN_RECORD_SIZE};
use crate::insert_expander::expand;
use crate::message_resolver::{
    lookup_message_in_files, MessageProvider, MessageResolver, PublisherCatalog,
    RegistryView, ResolvedTemplateSource,
};
use crate::record::{EventRecord, EventType};
use crate::sid::{resolve_sid, AccountLookup};
use crate::ReaderSettings;

/// The native surface one open log handle exposes to the read pipeline.
///
/// The handle and its kernel-side cursor are not designed for concurrent
/// access; callers issue these from one thread at a time.
pub trait EventLogApi {
    /// Issues one native read into `buf`, returning the number of bytes of
    /// packed records delivered.
    fn read(
        &mut self,
        flags: ReadFlags,
        record_offset: u32,
        buf: &mut [u8],
    ) -> std::result::Result<usize, ReadError>;

    /// Total number of records currently in the log. External polling loops
    /// watch this for change.
    fn record_count(&mut self) -> Result<u32>;

    /// Record number of the oldest record still present.
    fn oldest_record_number(&mut self) -> Result<u32>;
}

/// One-pass iterator over a span of back-to-back records, as delivered by a
/// single `fill`.
///
/// Each record is sliced out by its self-declared total length and decoded
/// all-or-nothing. A record whose declared length would escape the span is
/// corruption: iteration stops, but records already yielded stay valid. An
/// intra-record failure with a sound length yields `Err` for that record
/// and moves on.
pub struct IterRecords<'a> {
    span: &'a [u8],
    settings: &'a ReaderSettings,
    pos: usize,
    backwards: bool,
    last_record_number: Option<u32>,
    exhausted: bool,
}

impl<'a> IterRecords<'a> {
    pub fn new(span: &'a [u8], flags: ReadFlags, settings: &'a ReaderSettings) -> Self {
        IterRecords {
            span,
            settings,
            pos: 0,
            backwards: flags.contains(ReadFlags::BACKWARDS_READ),
            last_record_number: None,
            exhausted: false,
        }
    }

    /// The record number to anchor the next read at, according to the
    /// direction this span was read with: `last + 1` forwards,
    /// `last - 1` backwards (wrapping, since record numbers recycle).
    ///
    /// `None` until a record has been decoded.
    pub fn continuation_offset(&self) -> Option<u32> {
        self.last_record_number.map(|last| {
            if self.backwards {
                last.wrapping_sub(1)
            } else {
                last.wrapping_add(1)
            }
        })
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    fn corrupt(&mut self, err: DeserializationError) -> Option<Result<RawRecord>> {
        self.exhausted = true;
        Some(Err(EvtError::DeserializationError(err)))
    }
}

impl Iterator for IterRecords<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.pos >= self.span.len() {
            return None;
        }

        let remaining = &self.span[self.pos..];
        if remaining.len() < EVT_MIN_RECORD_SIZE {
            return self.corrupt(DeserializationError::RecordTooShort {
                length: remaining.len() as u32,
                min: EVT_MIN_RECORD_SIZE,
            });
        }

        let length = LittleEndian::read_u32(remaining) as usize;
        if length < EVT_MIN_RECORD_SIZE {
            return self.corrupt(DeserializationError::RecordTooShort {
                length: length as u32,
                min: EVT_MIN_RECORD_SIZE,
            });
        }
        if length > remaining.len() {
            return self.corrupt(DeserializationError::RecordOverrunsBuffer {
                length: length as u32,
                offset: self.pos,
                available: self.span.len(),
            });
        }

        let record_span = &remaining[..length];
        self.pos += length;

        match RawRecord::parse(record_span, self.settings) {
            Ok(record) => {
                self.last_record_number = Some(record.header.record_number);
                Some(Ok(record))
            }
            Err(source) => {
                // The length was sound, so the cursor is already past this
                // record; siblings are unaffected.
                let record_number = LittleEndian::read_u32(&record_span[8..12]);
                warn!("failed to parse record {record_number}: {source}");
                Some(Err(EvtError::FailedToParseRecord {
                    record_number,
                    source,
                }))
            }
        }
    }
}

/// The resolution seams one reader works against. On Windows,
/// [`sys::system_context`](crate::sys::system_context) wires the live
/// registry, publisher metadata, message files and account lookup; tests
/// substitute fakes.
pub struct ResolutionContext {
    pub registry: Box<dyn RegistryView>,
    pub publishers: Box<dyn PublisherCatalog>,
    pub messages: Box<dyn MessageProvider>,
    pub accounts: Box<dyn AccountLookup>,
}

/// The records decoded from one read call, plus the record number a caller
/// should anchor the next read at to continue in the same direction.
pub struct RecordBatch {
    pub records: Vec<Result<EventRecord>>,
    pub continuation_offset: Option<u32>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads batches of fully resolved records from one open log.
///
/// Composes the pipeline: buffer fill → record decode → template
/// resolution → insert expansion → SID enrichment. Resolved template
/// sources are memoized per source name; the memo is an optimization only.
pub struct EventLogReader<A: EventLogApi> {
    api: A,
    log_name: String,
    settings: ReaderSettings,
    buffer: RecordBuffer,
    context: ResolutionContext,
    resolved_sources: HashMap<String, ResolvedTemplateSource, ahash::RandomState>,
}

impl<A: EventLogApi> EventLogReader<A> {
    pub fn new(api: A, log_name: impl Into<String>, context: ResolutionContext) -> Self {
        Self::with_settings(api, log_name, context, ReaderSettings::default())
    }

    pub fn with_settings(
        api: A,
        log_name: impl Into<String>,
        context: ResolutionContext,
        settings: ReaderSettings,
    ) -> Self {
        let buffer = RecordBuffer::with_capacity(settings.get_buffer_size());
        EventLogReader {
            api,
            log_name: log_name.into(),
            settings,
            buffer,
            context,
            resolved_sources: HashMap::default(),
        }
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Total number of records currently in the log.
    pub fn record_count(&mut self) -> Result<u32> {
        self.api.record_count()
    }

    /// Record number of the oldest record still present.
    pub fn oldest_record_number(&mut self) -> Result<u32> {
        self.api.oldest_record_number()
    }

    /// Reads one batch of records.
    ///
    /// `record_offset` is only meaningful with [`ReadFlags::SEEK_READ`];
    /// sequential reads continue from the handle's kernel-side cursor. An
    /// empty batch means the log holds no further records in the requested
    /// direction.
    pub fn read_batch(&mut self, flags: ReadFlags, record_offset: u32) -> Result<RecordBatch> {
        let (raw_records, continuation_offset) = {
            let span = self.buffer.fill(&mut self.api, flags, record_offset)?;
            debug!(
                "read {} bytes from log {:?}",
                span.len(),
                self.log_name
            );

            let mut iter = IterRecords::new(span, flags, &self.settings);
            let raw_records: Vec<Result<RawRecord>> = iter.by_ref().collect();
            (raw_records, iter.continuation_offset())
        };

        let records = raw_records
            .into_iter()
            .map(|raw| raw.map(|raw| self.assemble(raw)))
            .collect();

        Ok(RecordBatch {
            records,
            continuation_offset,
        })
    }

    /// Turns a decoded record into the final resolved value. Resolution
    /// misses are never errors: the terminal fallback is an empty
    /// description and an absent user.
    fn assemble(&mut self, raw: RawRecord) -> EventRecord {
        let templates = self.resolved_source(&raw.source).clone();

        let template = lookup_message_in_files(
            &*self.context.messages,
            &templates.message_files,
            raw.header.event_id,
        )
        .unwrap_or_default();

        let (string_inserts, description) = expand(
            &template,
            &raw.string_inserts,
            &templates.parameter_files,
            &*self.context.messages,
        );

        let (user_sid, user) = match raw.sid.as_deref() {
            Some(sid_bytes) => resolve_sid(sid_bytes, &*self.context.accounts),
            None => (None, None),
        };

        EventRecord {
            record_number: raw.header.record_number,
            time_generated: raw.header.time_generated,
            time_written: raw.header.time_written,
            event_id: (raw.header.event_id & 0xFFFF) as u16,
            raw_event_id: raw.header.event_id,
            event_type: EventType::from_code(raw.header.event_type),
            category: raw.header.category,
            source: raw.source,
            computer: raw.computer,
            user_sid,
            user,
            string_inserts,
            description,
            data: raw.data,
        }
    }

    fn resolved_source(&mut self, source: &str) -> &ResolvedTemplateSource {
        if !self.resolved_sources.contains_key(source) {
            let resolver =
                MessageResolver::new(&*self.context.registry, &*self.context.publishers);
            let resolved = resolver.resolve(&self.log_name, source);
            debug!(
                "resolved {:?}\\{source} via {:?}: {} message file(s), {} parameter file(s)",
                self.log_name,
                resolved.origin,
                resolved.message_files.len(),
                resolved.parameter_files.len()
            );
            self.resolved_sources.insert(source.to_owned(), resolved);
        }

        &self.resolved_sources[source]
    }
}
