use jiff::Timestamp;
use serde::Serialize;

use crate::err::Result;

/// Event severity class, derived from the record's small integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Success,
    Error,
    Warning,
    Information,
    AuditSuccess,
    AuditFailure,
    /// Codes outside the documented table are preserved rather than failing
    /// the decode.
    Unknown(u16),
}

impl EventType {
    pub fn from_code(code: u16) -> EventType {
        match code {
            0x0000 => EventType::Success,
            0x0001 => EventType::Error,
            0x0002 => EventType::Warning,
            0x0004 => EventType::Information,
            0x0008 => EventType::AuditSuccess,
            0x0010 => EventType::AuditFailure,
            other => EventType::Unknown(other),
        }
    }

    pub fn as_code(&self) -> u16 {
        match self {
            EventType::Success => 0x0000,
            EventType::Error => 0x0001,
            EventType::Warning => 0x0002,
            EventType::Information => 0x0004,
            EventType::AuditSuccess => 0x0008,
            EventType::AuditFailure => 0x0010,
            EventType::Unknown(code) => *code,
        }
    }
}

/// One fully resolved log entry.
///
/// The record owns all of its strings and bytes; it has no lifetime ties
/// to the read buffer it was decoded from and can be cloned or moved across
/// threads freely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Monotonically increasing per log; wraps and recycles as old records
    /// are overwritten.
    pub record_number: u32,
    /// Unix epoch seconds.
    pub time_generated: u32,
    /// Unix epoch seconds.
    pub time_written: u32,
    /// The low 16 bits of the raw 32-bit id field.
    pub event_id: u16,
    /// The full 32-bit id. The high bits encode severity/facility and are
    /// what template lookup falls back on.
    pub raw_event_id: u32,
    pub event_type: EventType,
    /// Numeric category; never resolved to text by this crate.
    pub category: u16,
    pub source: String,
    pub computer: String,
    /// `S-1-…` form of the embedded SID, when one is attached.
    pub user_sid: Option<String>,
    /// `domain\name`, resolved best-effort from the embedded SID.
    pub user: Option<String>,
    /// The insertion strings, after nested `%%N` parameter expansion.
    /// Positional; templates reference them 1-based.
    pub string_inserts: Vec<String>,
    /// Insert-expanded message text; empty when no template resolves.
    pub description: String,
    /// Application-defined opaque blob.
    pub data: Option<Vec<u8>>,
}

impl EventRecord {
    pub fn generated(&self) -> Timestamp {
        Timestamp::from_second(i64::from(self.time_generated))
            .expect("32-bit epoch seconds are always in Timestamp range")
    }

    pub fn written(&self) -> Timestamp {
        Timestamp::from_second(i64::from(self.time_written))
            .expect("32-bit epoch seconds are always in Timestamp range")
    }

    /// Consumes the record, producing a `serde_json::Value`.
    pub fn into_json_value(self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self)?)
    }

    /// Consumes the record, producing a JSON serialized string.
    pub fn into_json(self) -> Result<String> {
        Ok(serde_json::to_string(&self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn event_type_table_round_trips() {
        for code in [0x0000, 0x0001, 0x0002, 0x0004, 0x0008, 0x0010, 0x0300] {
            assert_eq!(EventType::from_code(code).as_code(), code);
        }
        assert_eq!(EventType::from_code(0x0300), EventType::Unknown(0x0300));
    }

    #[test]
    fn timestamps_are_epoch_seconds() {
        let record = EventRecord {
            record_number: 1,
            time_generated: 1_600_000_000,
            time_written: 1_600_000_001,
            event_id: 7,
            raw_event_id: 0x4000_0007,
            event_type: EventType::Information,
            category: 0,
            source: "App".to_string(),
            computer: "HOST".to_string(),
            user_sid: None,
            user: None,
            string_inserts: vec![],
            description: String::new(),
            data: None,
        };

        assert_eq!(record.generated().as_second(), 1_600_000_000);
        assert_eq!(record.written().as_second(), 1_600_000_001);
    }
}
