use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;

use crate::err::{DeserializationError, DeserializationResult};
use crate::utils::{read_null_terminated_ansi_string, read_null_terminated_utf16_string};
use crate::{ReaderSettings, RecordEncoding};

/// `ELF_LOG_SIGNATURE`, the `LfLe` marker every record carries at offset 4.
pub const EVT_RECORD_SIGNATURE: u32 = 0x654c_664c;

/// Byte length of the fixed portion of a record, up to the trailing
/// source/computer strings.
pub const EVT_FIXED_RECORD_SIZE: usize = 56;

/// Smallest structurally possible record: fixed header plus the trailing
/// length copy. The two NUL-terminated header strings push real records
/// well past this.
pub const EVT_MIN_RECORD_SIZE: usize = EVT_FIXED_RECORD_SIZE + 4;

/// The fixed header of one event record, read by absolute offset from the
/// start of the record's span.
///
/// All offsets carried by the header (`string_offset`, `user_sid_offset`,
/// `data_offset`) are relative to the start of the record itself, never to
/// the surrounding read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvtRecordHeader {
    pub length: u32,
    pub record_number: u32,
    pub time_generated: u32,
    pub time_written: u32,
    pub event_id: u32,
    pub event_type: u16,
    pub num_strings: u16,
    pub category: u16,
    pub string_offset: u32,
    pub user_sid_length: u32,
    pub user_sid_offset: u32,
    pub data_length: u32,
    pub data_offset: u32,
}

fn read_u32(input: &mut Cursor<&[u8]>, t: &'static str) -> DeserializationResult<u32> {
    let offset = input.position();
    input
        .read_u32::<LittleEndian>()
        .map_err(|source| DeserializationError::FailedToRead { t, offset, source })
}

fn read_u16(input: &mut Cursor<&[u8]>, t: &'static str) -> DeserializationResult<u16> {
    let offset = input.position();
    input
        .read_u16::<LittleEndian>()
        .map_err(|source| DeserializationError::FailedToRead { t, offset, source })
}

impl EvtRecordHeader {
    pub fn from_reader(input: &mut Cursor<&[u8]>) -> DeserializationResult<EvtRecordHeader> {
        let length = read_u32(input, "record length")?;

        let signature = read_u32(input, "record signature")?;
        if signature != EVT_RECORD_SIGNATURE {
            return Err(DeserializationError::InvalidRecordSignature { found: signature });
        }

        let record_number = read_u32(input, "record number")?;
        let time_generated = read_u32(input, "time generated")?;
        let time_written = read_u32(input, "time written")?;
        let event_id = read_u32(input, "event id")?;
        let event_type = read_u16(input, "event type")?;
        let num_strings = read_u16(input, "number of strings")?;
        let category = read_u16(input, "event category")?;
        // Reserved flags + closing record number, unused by the decoder.
        let _reserved_flags = read_u16(input, "reserved flags")?;
        let _closing_record_number = read_u32(input, "closing record number")?;
        let string_offset = read_u32(input, "string offset")?;
        let user_sid_length = read_u32(input, "user sid length")?;
        let user_sid_offset = read_u32(input, "user sid offset")?;
        let data_length = read_u32(input, "data length")?;
        let data_offset = read_u32(input, "data offset")?;

        Ok(EvtRecordHeader {
            length,
            record_number,
            time_generated,
            time_written,
            event_id,
            event_type,
            num_strings,
            category,
            string_offset,
            user_sid_length,
            user_sid_offset,
            data_length,
            data_offset,
        })
    }
}

/// One fully decoded record, still carrying its raw insertion strings and
/// SID bytes. Message resolution and SID lookup turn this into an
/// [`EventRecord`](crate::EventRecord).
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub header: EvtRecordHeader,
    pub source: String,
    pub computer: String,
    pub sid: Option<Vec<u8>>,
    pub string_inserts: Vec<String>,
    pub data: Option<Vec<u8>>,
}

impl RawRecord {
    /// Decodes one record from `span`, which must be exactly the record's
    /// declared length. All-or-nothing: any structural failure yields an
    /// error and no record.
    pub fn parse(span: &[u8], settings: &ReaderSettings) -> DeserializationResult<RawRecord> {
        if span.len() < EVT_MIN_RECORD_SIZE {
            return Err(DeserializationError::RecordTooShort {
                length: span.len() as u32,
                min: EVT_MIN_RECORD_SIZE,
            });
        }

        let mut cursor = Cursor::new(span);
        let header = EvtRecordHeader::from_reader(&mut cursor)?;

        trace!(
            "decoding record {} (length {}, {} strings)",
            header.record_number,
            header.length,
            header.num_strings
        );

        let trailing_offset = span.len() - 4;
        let mut trailing = Cursor::new(&span[trailing_offset..]);
        let trailing_length = trailing.read_u32::<LittleEndian>().map_err(|source| {
            DeserializationError::FailedToRead {
                t: "trailing record length",
                offset: trailing_offset as u64,
                source,
            }
        })?;
        if trailing_length != header.length {
            return Err(DeserializationError::MismatchedRecordLength {
                leading: header.length,
                trailing: trailing_length,
            });
        }

        // The two header strings sit back-to-back right after the fixed
        // header.
        let source = read_record_string(&mut cursor, settings)?;
        let computer = read_record_string(&mut cursor, settings)?;

        let sid = match header.user_sid_length {
            0 => None,
            len => Some(
                record_range(span, header.user_sid_offset, len, "user sid")?.to_vec(),
            ),
        };

        let mut string_inserts = Vec::with_capacity(usize::from(header.num_strings));
        if header.num_strings > 0 {
            seek_within_record(&mut cursor, span, header.string_offset, "string offset")?;
            for _ in 0..header.num_strings {
                string_inserts.push(read_record_string(&mut cursor, settings)?);
            }
        }

        let data = match header.data_length {
            0 => None,
            len => Some(record_range(span, header.data_offset, len, "event data")?.to_vec()),
        };

        Ok(RawRecord {
            header,
            source,
            computer,
            sid,
            string_inserts,
            data,
        })
    }
}

fn read_record_string(
    cursor: &mut Cursor<&[u8]>,
    settings: &ReaderSettings,
) -> DeserializationResult<String> {
    match settings.get_record_encoding() {
        RecordEncoding::Utf16 => read_null_terminated_utf16_string(cursor),
        RecordEncoding::Ansi => read_null_terminated_ansi_string(cursor, settings.get_ansi_codec()),
    }
}

fn record_range<'a>(
    span: &'a [u8],
    offset: u32,
    len: u32,
    what: &'static str,
) -> DeserializationResult<&'a [u8]> {
    let start = offset as usize;
    let end = start.checked_add(len as usize);

    match end {
        Some(end) if end <= span.len() => Ok(&span[start..end]),
        _ => Err(DeserializationError::RangeOutOfRecord {
            what,
            offset,
            len,
            record_len: span.len() as u32,
        }),
    }
}

fn seek_within_record(
    cursor: &mut Cursor<&[u8]>,
    span: &[u8],
    offset: u32,
    what: &'static str,
) -> DeserializationResult<()> {
    if (offset as usize) >= span.len() {
        return Err(DeserializationError::RangeOutOfRecord {
            what,
            offset,
            len: 0,
            record_len: span.len() as u32,
        });
    }

    cursor
        .seek(SeekFrom::Start(u64::from(offset)))
        .map_err(|source| DeserializationError::FailedToRead {
            t: what,
            offset: u64::from(offset),
            source,
        })?;

    Ok(())
}
