#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use parflight::{ChunkContext, DecodeOptions, ParflightError, Recording, RootContext};

use common::{chunk, event_record, point_type, points_chunk, varint, varint_i, POINT};

// --- HELPERS ---

fn build_context(
    recording: &Recording,
) -> Result<ChunkContext<'_>, ParflightError> {
    let chunk = recording
        .chunks()
        .next()
        .expect("Recording has no chunks")?;
    ChunkContext::new(chunk, Arc::new(RootContext::new()), DecodeOptions::default())
}

/// The error produced while building a context over corrupted header bytes.
fn context_error(bytes: Vec<u8>) -> ParflightError {
    let recording = Recording::from_bytes(bytes);
    match build_context(&recording) {
        Err(err) => err,
        Ok(_) => panic!("Corrupted chunk produced a working context"),
    }
}

// --- FRAMING ---

/// A wrong signature stops framing at the first chunk.
#[test]
fn rejects_bad_magic() {
    let mut bytes = points_chunk();
    bytes[0] = b'X';

    let err = context_error(bytes);
    assert!(matches!(err, ParflightError::InvalidMagic { offset: 0 }));
}

/// An unknown major version is refused, minors pass through.
#[test]
fn rejects_unsupported_major() {
    let mut bytes = points_chunk();
    bytes[4..6].copy_from_slice(&9u16.to_be_bytes());

    let err = context_error(bytes);
    assert!(matches!(
        err,
        ParflightError::UnsupportedVersion { major: 9, minor: 1 }
    ));
}

/// A declared size beyond the file cannot be framed over.
#[test]
fn rejects_oversized_chunk() {
    let mut bytes = points_chunk();
    bytes[8..16].copy_from_slice(&(1u64 << 40).to_be_bytes());

    let err = context_error(bytes);
    match err {
        ParflightError::InconsistentChunkSize {
            offset,
            declared,
            available,
        } => {
            assert_eq!(offset, 0);
            assert_eq!(declared, 1 << 40);
            assert_eq!(available, points_chunk().len() as u64);
        }
        other => panic!("Expected chunk size error, got {other:?}"),
    }
}

/// A size smaller than the header itself is equally unframable.
#[test]
fn rejects_undersized_chunk() {
    let mut bytes = points_chunk();
    bytes[8..16].copy_from_slice(&10u64.to_be_bytes());

    let err = context_error(bytes);
    assert!(matches!(
        err,
        ParflightError::InconsistentChunkSize { declared: 10, .. }
    ));
}

/// A recording cut off mid-chunk reports how much was really there.
#[test]
fn rejects_truncated_tail() {
    let mut bytes = points_chunk();
    bytes.truncate(bytes.len() - 10);

    let err = context_error(bytes);
    assert!(matches!(
        err,
        ParflightError::InconsistentChunkSize { offset: 0, .. }
    ));
}

/// Loose bytes after the last chunk surface as a truncated header.
#[test]
fn reports_trailing_garbage() {
    let mut bytes = points_chunk();
    let end = bytes.len() as u64;
    bytes.extend_from_slice(&[0xab; 20]);
    let recording = Recording::from_bytes(bytes);

    let mut chunks = recording.chunks();
    assert!(chunks.next().expect("Missing first chunk").is_ok());
    match chunks.next() {
        Some(Err(ParflightError::TruncatedHeader { offset, available })) => {
            assert_eq!(offset, end);
            assert_eq!(available, 20);
        }
        other => panic!("Expected truncated header, got {other:?}"),
    }
    assert!(chunks.next().is_none());
}

/// An empty input simply has no chunks.
#[test]
fn empty_recording_has_no_chunks() {
    let recording = Recording::from_bytes(Vec::new());
    assert!(recording.is_empty());
    assert!(recording.chunks().next().is_none());
}

// --- CHUNK STRUCTURE ---

/// A zero metadata offset makes the chunk undecodable, with its index.
#[test]
fn rejects_missing_metadata_offset() {
    let mut bytes = points_chunk();
    bytes[24..32].fill(0);

    match context_error(bytes) {
        ParflightError::Chunk { index: 0, source } => assert!(matches!(
            *source,
            ParflightError::InvalidMetadataEvent { offset: 0 }
        )),
        other => panic!("Expected chunk error, got {other:?}"),
    }
}

/// A metadata offset pointing at an ordinary event is rejected.
#[test]
fn rejects_misplaced_metadata_offset() {
    let mut bytes = points_chunk();
    bytes[24..32].copy_from_slice(&68u64.to_be_bytes());

    match context_error(bytes) {
        ParflightError::Chunk { index: 0, source } => assert!(matches!(
            *source,
            ParflightError::InvalidMetadataEvent { .. }
        )),
        other => panic!("Expected chunk error, got {other:?}"),
    }
}

/// A checkpoint offset pointing at an ordinary event is rejected.
#[test]
fn rejects_misplaced_checkpoint_offset() {
    let mut bytes = points_chunk();
    bytes[16..24].copy_from_slice(&68u64.to_be_bytes());

    match context_error(bytes) {
        ParflightError::Chunk { index: 0, source } => assert!(matches!(
            *source,
            ParflightError::InvalidCheckpoint { .. }
        )),
        other => panic!("Expected chunk error, got {other:?}"),
    }
}

// --- EVENT STREAM ---

/// An event whose size exceeds the chunk poisons the rest of the stream.
#[test]
fn oversized_event_is_fatal() -> parflight::Result<()> {
    let bytes = chunk()
        .declare(point_type())
        .event(POINT, &[varint_i(3), varint_i(4)].concat())
        .raw_record(&varint(100_000))
        .build();
    let recording = Recording::from_bytes(bytes);
    let ctx = build_context(&recording)?;

    let mut events = ctx.raw_events();
    assert!(events.next().expect("Missing first event").is_ok());
    assert!(matches!(
        events.next(),
        Some(Err(ParflightError::InconsistentEventSize {
            declared: 100_000,
            ..
        }))
    ));
    // The stream cannot re-sync past a broken envelope.
    assert!(events.next().is_none());
    Ok(())
}

/// An envelope whose own varints overrun the declared size is fatal too.
#[test]
fn overrunning_envelope_is_fatal() -> parflight::Result<()> {
    // Size 2, but the type id varint alone needs two more bytes.
    let bytes = chunk()
        .declare(point_type())
        .raw_record(&[0x02, 0xac, 0x02])
        .build();
    let recording = Recording::from_bytes(bytes);
    let ctx = build_context(&recording)?;

    let mut events = ctx.raw_events();
    assert!(matches!(
        events.next(),
        Some(Err(ParflightError::InconsistentEventSize { declared: 2, .. }))
    ));
    assert!(events.next().is_none());
    Ok(())
}

/// A record of an undeclared type is skippable; iteration continues.
#[test]
fn unknown_type_is_recoverable() -> parflight::Result<()> {
    let bytes = chunk()
        .declare(point_type())
        .event(POINT, &[varint_i(3), varint_i(4)].concat())
        .raw_record(&event_record(99, &varint_i(5)))
        .event(POINT, &[varint_i(10), varint_i(20)].concat())
        .build();
    let recording = Recording::from_bytes(bytes);
    let ctx = build_context(&recording)?;

    let outcomes: Vec<_> = ctx.raw_events().collect();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1],
        Err(ParflightError::UnknownTypeId { id: 99 })
    ));
    assert!(outcomes[2].is_ok());
    Ok(())
}

/// A payload shorter than its type needs fails, naming the event.
#[test]
fn short_payload_names_the_event() -> parflight::Result<()> {
    // demo.Point expects two varints; only one is present.
    let bytes = chunk()
        .declare(point_type())
        .event(POINT, &varint_i(3))
        .build();
    let recording = Recording::from_bytes(bytes);
    let ctx = build_context(&recording)?;

    let result = ctx.events().next().expect("Chunk has no events");
    match result {
        Err(ParflightError::Decode {
            type_name, source, ..
        }) => {
            assert_eq!(type_name, "demo.Point");
            assert!(matches!(
                *source,
                ParflightError::UnexpectedEndOfData { .. }
            ));
        }
        other => panic!("Expected decode error, got {other:?}"),
    }
    Ok(())
}

// --- COMPRESSED BODIES ---

/// Rebuilds a stored chunk with `declared` as its uncompressed length.
fn stored_with_declared(declared: u64) -> Vec<u8> {
    let plain = points_chunk();
    let body = &plain[68..];

    let mut stored = vec![0u8];
    stored.extend_from_slice(&varint(declared));
    stored.extend_from_slice(body);

    let mut bytes = plain[..68].to_vec();
    bytes[8..16].copy_from_slice(&(68 + stored.len() as u64).to_be_bytes());
    bytes[64..68].copy_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&stored);
    bytes
}

/// A stored body whose declared length disagrees with the data fails.
#[test]
fn rejects_stored_length_mismatch() {
    let body_len = (points_chunk().len() - 68) as u64;
    let bytes = stored_with_declared(body_len + 5);

    match context_error(bytes) {
        ParflightError::Chunk { index: 0, source } => {
            assert!(matches!(*source, ParflightError::Compression(_)));
        }
        other => panic!("Expected chunk error, got {other:?}"),
    }
}

/// A declared length past the decompression bound never allocates.
#[test]
fn rejects_huge_declared_length() {
    let bytes = stored_with_declared(1 << 31);

    match context_error(bytes) {
        ParflightError::Chunk { index: 0, source } => {
            assert!(matches!(
                *source,
                ParflightError::MalformedVarint { value, .. } if value == 1 << 31
            ));
        }
        other => panic!("Expected chunk error, got {other:?}"),
    }
}

/// An unregistered codec id names itself in the failure.
#[test]
fn rejects_unknown_codec() {
    let mut bytes = stored_with_declared((points_chunk().len() - 68) as u64);
    bytes[68] = 5;

    match context_error(bytes) {
        ParflightError::Chunk { index: 0, source } => {
            assert!(matches!(
                *source,
                ParflightError::CompressionUnsupported { codec: 5 }
            ));
        }
        other => panic!("Expected chunk error, got {other:?}"),
    }
}
