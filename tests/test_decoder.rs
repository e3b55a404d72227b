
use fixtures::*;
use pretty_assertions::assert_eq;

use evt::err::{DeserializationError, EvtError};
use evt::evt_record::{EvtRecordHeader, RawRecord, EVT_MIN_RECORD_SIZE};
use evt::{IterRecords, ReadFlags, ReaderSettings, RecordEncoding};

fn settings() -> ReaderSettings {
    ReaderSettings::default()
}

#[test]
fn header_fields_round_trip() {
    ensure_env_logger_initialized();

    let sample = SampleRecord {
        record_number: 4242,
        time_generated: 1_234_567_890,
        time_written: 1_234_567_899,
        event_id: 0xC000_1234,
        event_type: 0x0001,
        category: 7,
        source: "DiskSub".to_string(),
        computer: "WORKSTATION-7".to_string(),
        inserts: vec!["one".to_string(), "two".to_string()],
        sid: None,
        data: None,
    };

    let encoded = sample.encode();
    let record = RawRecord::parse(&encoded, &settings()).unwrap();

    let expected_header = EvtRecordHeader {
        length: encoded.len() as u32,
        record_number: 4242,
        time_generated: 1_234_567_890,
        time_written: 1_234_567_899,
        event_id: 0xC000_1234,
        event_type: 0x0001,
        num_strings: 2,
        category: 7,
        string_offset: record.header.string_offset,
        user_sid_length: 0,
        user_sid_offset: record.header.user_sid_offset,
        data_length: 0,
        data_offset: record.header.data_offset,
    };

    assert_eq!(record.header, expected_header);
    assert_eq!(record.source, "DiskSub");
    assert_eq!(record.computer, "WORKSTATION-7");
    assert_eq!(record.string_inserts, vec!["one", "two"]);
}

#[test]
fn sid_and_data_are_extracted_by_offset() {
    ensure_env_logger_initialized();

    let sample = SampleRecord::new(1, "App")
        .with_inserts(&["x"])
        .with_sid(&LOCAL_SYSTEM_SID)
        .with_data(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let record = RawRecord::parse(&sample.encode(), &settings()).unwrap();

    assert_eq!(record.sid.as_deref(), Some(&LOCAL_SYSTEM_SID[..]));
    assert_eq!(record.data.as_deref(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
}

#[test]
fn ansi_records_decode_with_the_configured_codec() {
    ensure_env_logger_initialized();

    let sample = SampleRecord::new(9, "LegacyApp").with_inserts(&["insert A", "insert B"]);
    let encoded = sample.encode_as(RecordEncoding::Ansi);

    let ansi_settings = ReaderSettings::new().record_encoding(RecordEncoding::Ansi);
    let record = RawRecord::parse(&encoded, &ansi_settings).unwrap();

    assert_eq!(record.source, "LegacyApp");
    assert_eq!(record.computer, "TESTHOST");
    assert_eq!(record.string_inserts, vec!["insert A", "insert B"]);
}

#[test]
fn bad_signature_is_rejected() {
    ensure_env_logger_initialized();

    let mut encoded = SampleRecord::new(1, "App").encode();
    encoded[4] = 0xFF;

    match RawRecord::parse(&encoded, &settings()) {
        Err(DeserializationError::InvalidRecordSignature { .. }) => {}
        other => panic!("expected signature error, got {other:?}"),
    }
}

#[test]
fn mismatched_trailing_length_is_rejected() {
    ensure_env_logger_initialized();

    let mut encoded = SampleRecord::new(1, "App").encode();
    let trailing = encoded.len() - 4;
    encoded[trailing] ^= 0x01;

    match RawRecord::parse(&encoded, &settings()) {
        Err(DeserializationError::MismatchedRecordLength { .. }) => {}
        other => panic!("expected length mismatch, got {other:?}"),
    }
}

#[test]
fn walks_packed_records_one_by_one() {
    ensure_env_logger_initialized();

    let samples = vec![
        SampleRecord::new(10, "A").with_inserts(&["first"]),
        SampleRecord::new(11, "B"),
        SampleRecord::new(12, "C").with_data(&[1, 2, 3]),
    ];
    let span = pack_records(&samples);

    let settings = settings();
    let records: Vec<RawRecord> = IterRecords::new(&span, ReadFlags::default(), &settings)
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(
        records
            .iter()
            .map(|r| r.header.record_number)
            .collect::<Vec<_>>(),
        vec![10, 11, 12]
    );
    assert_eq!(records[0].string_inserts, vec!["first"]);
    assert_eq!(records[2].data.as_deref(), Some(&[1, 2, 3][..]));
}

#[test]
fn overrunning_length_stops_iteration_but_keeps_prior_records() {
    ensure_env_logger_initialized();

    let mut span = pack_records(&[SampleRecord::new(1, "A"), SampleRecord::new(2, "B")]);
    let second_start = SampleRecord::new(1, "A").encode().len();

    // Claim the second record extends far past what the read delivered.
    let forged = (span.len() * 2) as u32;
    span[second_start..second_start + 4].copy_from_slice(&forged.to_le_bytes());

    let settings = settings();
    let mut iter = IterRecords::new(&span, ReadFlags::default(), &settings);

    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.header.record_number, 1);

    match iter.next() {
        Some(Err(EvtError::DeserializationError(
            DeserializationError::RecordOverrunsBuffer { .. },
        ))) => {}
        other => panic!("expected overrun error, got {other:?}"),
    }

    assert!(iter.next().is_none());
    assert!(iter.exhausted());
    // The successfully decoded record still anchors continuation.
    assert_eq!(iter.continuation_offset(), Some(2));
}

#[test]
fn trailing_garbage_shorter_than_a_record_is_corruption() {
    ensure_env_logger_initialized();

    let mut span = pack_records(&[SampleRecord::new(1, "A")]);
    span.extend_from_slice(&[0xAB; EVT_MIN_RECORD_SIZE - 10]);

    let settings = settings();
    let mut iter = IterRecords::new(&span, ReadFlags::default(), &settings);

    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(
        iter.next(),
        Some(Err(EvtError::DeserializationError(
            DeserializationError::RecordTooShort { .. }
        )))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn intra_record_failure_yields_err_and_moves_on() {
    ensure_env_logger_initialized();

    let first = SampleRecord::new(1, "A").encode();
    let mut span = first.clone();
    let mut second = SampleRecord::new(2, "B").with_inserts(&["x"]).encode();

    // Point the second record's string offset past its own span; the
    // declared length stays sound so the walk can continue.
    let string_offset_field = 36;
    let forged = (second.len() as u32).to_le_bytes();
    second[string_offset_field..string_offset_field + 4].copy_from_slice(&forged);
    span.extend_from_slice(&second);
    span.extend_from_slice(&SampleRecord::new(3, "C").encode());

    let settings = settings();
    let results: Vec<_> = IterRecords::new(&span, ReadFlags::default(), &settings).collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(EvtError::FailedToParseRecord { record_number, .. }) => assert_eq!(*record_number, 2),
        other => panic!("expected per-record failure, got {other:?}"),
    }
    assert_eq!(results[2].as_ref().unwrap().header.record_number, 3);
}
