//! Centralized error handling for Parflight.
//!
//! This module provides a panic-free error handling system: every failure
//! condition a recording can exhibit is represented as a typed [`ParflightError`]
//! variant and propagated through the [`Result`] type.
//!
//! ## Design Philosophy
//!
//! 1. **No Panics:** Malformed input must never abort the process. The library
//!    enforces this through `#![deny(clippy::panic)]` and `#![deny(clippy::unwrap_used)]`.
//!
//! 2. **Positional Context:** Wherever possible, errors carry the absolute byte
//!    offset at which the violation was detected, so a corrupted recording can be
//!    diagnosed with a hex dump.
//!
//! 3. **Error Chaining:** Wrapper variants ([`ParflightError::Decode`],
//!    [`ParflightError::Chunk`]) preserve the underlying cause through the
//!    `source()` method, enabling full error traces from "chunk 3 failed" down
//!    to "malformed varint at offset 0x91".
//!
//! 4. **Cloneable Errors:** [`ParflightError`] is `Clone`, allowing the first
//!    failure observed by a parallel decode worker to be captured once and
//!    handed back to the caller.
//!
//! ## Error Categories
//!
//! - **Framing** ([`InvalidMagic`](ParflightError::InvalidMagic),
//!   [`TruncatedHeader`](ParflightError::TruncatedHeader),
//!   [`InconsistentChunkSize`](ParflightError::InconsistentChunkSize)):
//!   the chunk sequence itself is damaged. These are fatal for the remainder
//!   of the file, since chunk boundaries can no longer be trusted.
//! - **Metadata** ([`UnsupportedMetadataElement`](ParflightError::UnsupportedMetadataElement),
//!   [`DuplicateTypeId`](ParflightError::DuplicateTypeId),
//!   [`UnknownTypeId`](ParflightError::UnknownTypeId), ...): the self-describing
//!   type system of a chunk is inconsistent. Fatal for that chunk, because
//!   every event payload is decoded against it.
//! - **Events and Values** ([`InconsistentEventSize`](ParflightError::InconsistentEventSize),
//!   [`MalformedVarint`](ParflightError::MalformedVarint),
//!   [`UnexpectedEndOfData`](ParflightError::UnexpectedEndOfData), ...):
//!   a single record is damaged. Event envelopes carry their own size, so
//!   callers may choose to skip the record and keep going.
//! - **Typed Extraction** ([`ShapeMismatch`](ParflightError::ShapeMismatch),
//!   [`ValueKind`](ParflightError::ValueKind)): the recording is fine but the
//!   caller's Rust struct does not match the recorded shape.
//!
//! ## Usage Patterns
//!
//! ### Basic Error Handling
//!
//! ```rust
//! use parflight::{ParflightError, Recording};
//!
//! let recording = Recording::from_bytes(b"not a flight recording".to_vec());
//! match recording.chunks().next() {
//!     Some(Err(ParflightError::TruncatedHeader { .. })) => {} // too short for a header
//!     other => panic!("expected a framing error, got {other:?}"),
//! }
//! ```
//!
//! ### Error Propagation with `?`
//!
//! ```rust
//! use parflight::{Recording, Result};
//!
//! fn count_chunks(bytes: Vec<u8>) -> Result<usize> {
//!     let recording = Recording::from_bytes(bytes);
//!     let mut n = 0;
//!     for chunk in recording.chunks() {
//!         chunk?;
//!         n += 1;
//!     }
//!     Ok(n)
//! }
//! # assert_eq!(count_chunks(Vec::new())?, 0);
//! # Ok::<(), parflight::ParflightError>(())
//! ```
//!
//! ### Accessing Error Sources
//!
//! ```rust
//! use std::error::Error;
//! use parflight::ParflightError;
//!
//! let inner = ParflightError::MalformedVarint { offset: 0x91, value: 1 << 40 };
//! let outer = ParflightError::Chunk { index: 3, source: Box::new(inner) };
//! assert!(outer.source().is_some());
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Parflight operations.
///
/// This type alias is used throughout the library to simplify error handling.
/// It is equivalent to `std::result::Result<T, ParflightError>`.
///
/// ## Examples
///
/// ```rust
/// use parflight::Result;
///
/// fn my_function() -> Result<i32> {
///     Ok(42)
/// }
/// ```
pub type Result<T> = std::result::Result<T, ParflightError>;

/// The master error enum covering all failure domains in Parflight.
///
/// Variants are grouped by the layer that raises them: file framing, chunk
/// metadata, constant pools, event decoding, typed extraction, and the
/// infrastructure around them (I/O, compression, internal logic).
///
/// ## Cloneability
///
/// This type is `Clone` so that a failure observed inside a parallel decode
/// worker can be stored once and shared with the coordinating thread. I/O
/// errors are wrapped in `Arc` to make cloning cheap; wrapper variants box
/// their source.
///
/// ## Examples
///
/// ```rust
/// use parflight::ParflightError;
///
/// fn is_recoverable(err: &ParflightError) -> bool {
///     // Event-level errors leave the chunk's framing intact.
///     matches!(
///         err,
///         ParflightError::Decode { .. }
///             | ParflightError::ValueKind { .. }
///             | ParflightError::UnresolvedConstant { .. }
///     )
/// }
/// ```
#[derive(Debug, Clone)]
pub enum ParflightError {
    /// Low-level I/O failure (file not found, permission denied, etc.).
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to make the error
    /// `Clone` without expensive copying.
    Io(Arc<io::Error>),

    /// The bytes at a chunk boundary do not begin with the `FLR\0` signature.
    ///
    /// Raised by the chunk framer. Once the signature check fails, subsequent
    /// chunk boundaries cannot be located, so iteration stops.
    InvalidMagic {
        /// Absolute file offset of the expected chunk start.
        offset: u64,
    },

    /// Fewer bytes remain than a complete chunk header requires.
    TruncatedHeader {
        /// Absolute file offset of the expected chunk start.
        offset: u64,
        /// Number of bytes actually available at that offset.
        available: u64,
    },

    /// A chunk header declares a size that contradicts the file.
    ///
    /// Either the declared size is smaller than the header itself, or the
    /// chunk would extend past the end of the recording. Trusting such a size
    /// would derail every subsequent chunk boundary, so this is fatal.
    InconsistentChunkSize {
        /// Absolute file offset of the chunk start.
        offset: u64,
        /// The size the header claims.
        declared: u64,
        /// Bytes actually available from the chunk start to end of file.
        available: u64,
    },

    /// The chunk's format version is newer than this library understands.
    UnsupportedVersion {
        /// Major version from the chunk header.
        major: u16,
        /// Minor version from the chunk header.
        minor: u16,
    },

    /// A read ran past the end of its bounded region.
    ///
    /// Every read is bounds-checked against the enclosing chunk or event
    /// slice; this error means the data claims more content than the region
    /// holds.
    UnexpectedEndOfData {
        /// Absolute offset at which the read was attempted.
        offset: u64,
    },

    /// A variable-length integer is structurally valid but semantically
    /// impossible, such as a length or count larger than the bytes that
    /// remain.
    MalformedVarint {
        /// Absolute offset of the first byte of the varint.
        offset: u64,
        /// The decoded value that failed validation.
        value: u64,
    },

    /// A string value uses an encoding discriminant this library does not know.
    UnsupportedStringEncoding {
        /// Absolute offset of the discriminant byte.
        offset: u64,
        /// The unrecognized discriminant.
        encoding: u8,
    },

    /// A metadata element refers to a string-table slot that does not exist.
    UnknownStringIndex {
        /// The out-of-range index.
        index: u64,
        /// Number of entries in the chunk's string table.
        table_len: usize,
    },

    /// The record at the metadata offset is not a metadata event.
    ///
    /// The chunk header points at the self-description record; if the bytes
    /// there do not parse as one (wrong type tag, impossible envelope), the
    /// chunk cannot be decoded at all.
    InvalidMetadataEvent {
        /// Absolute offset the chunk header pointed at.
        offset: u64,
    },

    /// The metadata tree contains an element kind this library does not know.
    ///
    /// The element tree describes how event payloads are laid out, so
    /// skipping an unknown node would silently corrupt every decode that
    /// depends on it.
    UnsupportedMetadataElement {
        /// The unrecognized element name.
        name: String,
    },

    /// The metadata element tree nests deeper than the configured limit.
    ///
    /// Legitimate recordings are a few levels deep; unbounded recursion here
    /// is an attack vector, not a feature.
    MetadataTooDeep {
        /// The depth limit that was exceeded.
        limit: usize,
    },

    /// A metadata element is missing a required attribute, or the attribute
    /// does not parse (e.g. a non-numeric `id` on a `class`).
    MetadataAttribute {
        /// Kind of the offending element.
        element: String,
        /// The attribute that was required.
        attribute: String,
    },

    /// Two type declarations in one chunk carry the same numeric id.
    DuplicateTypeId {
        /// The colliding type id.
        id: i64,
        /// Name of the second declaration.
        name: String,
    },

    /// A field, pool entry, or event refers to a type id the chunk never
    /// declared.
    UnknownTypeId {
        /// The dangling type id.
        id: i64,
    },

    /// A type directly contains itself (not through a constant-pool
    /// reference), which would require an infinitely large value.
    TypeTreeCycle {
        /// Name of the type on the cycle.
        type_name: String,
    },

    /// A checkpoint record is structurally invalid.
    ///
    /// Covers a wrong event-type tag at a checkpoint offset, a delta link
    /// pointing outside the chunk, or a delta chain that loops.
    InvalidCheckpoint {
        /// Absolute offset of the offending checkpoint record.
        offset: u64,
    },

    /// A constant-pool reference names an entry no checkpoint defined.
    UnresolvedConstant {
        /// Type id of the pool that was consulted.
        type_id: i64,
        /// The missing entry key.
        index: i64,
    },

    /// Constant-pool entries reference each other in a cycle.
    ///
    /// Detected during resolution: an entry whose value transitively requires
    /// the entry itself can never be materialized.
    ConstantPoolCycle {
        /// Type id of the pool on the cycle.
        type_id: i64,
        /// Entry key at which the cycle closed.
        index: i64,
    },

    /// An event envelope declares a size that contradicts its chunk.
    ///
    /// The size is smaller than the envelope fields already consumed, or the
    /// event would extend past the end of the chunk. The event stream cannot
    /// be advanced past such a record.
    InconsistentEventSize {
        /// Absolute offset of the event start.
        offset: u64,
        /// The size the envelope claims.
        declared: u64,
    },

    /// A type without fields is not one of the known primitive names.
    ///
    /// Field-less types are leaves of the decode tree and must map to a
    /// wire-level primitive; an unknown name means the payload width is
    /// unknowable.
    UnknownPrimitiveType {
        /// The unrecognized type name.
        name: String,
    },

    /// A compressed chunk names a codec that is not registered.
    ///
    /// Compression support is feature-gated; a recording using LZ4 requires
    /// the `lz4_flex` feature (or a caller-registered codec).
    CompressionUnsupported {
        /// The codec id from the chunk body.
        codec: u8,
    },

    /// Decompression failed (corrupted compressed data, length mismatch).
    ///
    /// The string contains the message from the compression backend.
    Compression(String),

    /// A target struct asks for a field the recorded type does not have.
    ShapeMismatch {
        /// Name of the Rust target type.
        target: &'static str,
        /// The field name that could not be matched.
        field: String,
    },

    /// A recorded value cannot convert to the requested Rust type.
    ValueKind {
        /// What the conversion required, e.g. `"i32"`.
        expected: &'static str,
        /// What the value actually was, with detail where useful.
        found: String,
    },

    /// An event payload failed to decode. Wraps the underlying cause with
    /// the event's type name and file position.
    Decode {
        /// Name of the event type being decoded.
        type_name: String,
        /// Absolute offset of the event start.
        offset: u64,
        /// The underlying failure.
        source: Box<ParflightError>,
    },

    /// A chunk failed to decode. Wraps the underlying cause with the chunk's
    /// position in the recording.
    Chunk {
        /// Zero-based index of the chunk within the recording.
        index: usize,
        /// The underlying failure.
        source: Box<ParflightError>,
    },

    /// Logic error in the library itself.
    ///
    /// This error should not occur in production. If you encounter it, please
    /// report a bug with a minimal reproduction case. The string contains
    /// diagnostic information.
    Internal(String),
}

impl fmt::Display for ParflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic { offset } => {
                write!(f, "invalid chunk signature at offset {offset:#x}")
            }
            Self::TruncatedHeader { offset, available } => write!(
                f,
                "truncated chunk header at offset {offset:#x}: {available} bytes available"
            ),
            Self::InconsistentChunkSize {
                offset,
                declared,
                available,
            } => write!(
                f,
                "chunk at offset {offset:#x} declares {declared} bytes but {available} are available"
            ),
            Self::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported format version {major}.{minor}")
            }
            Self::UnexpectedEndOfData { offset } => {
                write!(f, "unexpected end of data at offset {offset:#x}")
            }
            Self::MalformedVarint { offset, value } => write!(
                f,
                "varint at offset {offset:#x} decodes to impossible value {value}"
            ),
            Self::UnsupportedStringEncoding { offset, encoding } => write!(
                f,
                "unsupported string encoding {encoding} at offset {offset:#x}"
            ),
            Self::UnknownStringIndex { index, table_len } => write!(
                f,
                "string index {index} out of range for table of {table_len}"
            ),
            Self::InvalidMetadataEvent { offset } => {
                write!(f, "no metadata event at offset {offset:#x}")
            }
            Self::UnsupportedMetadataElement { name } => {
                write!(f, "unsupported metadata element <{name}>")
            }
            Self::MetadataTooDeep { limit } => {
                write!(f, "metadata tree exceeds depth limit of {limit}")
            }
            Self::MetadataAttribute { element, attribute } => write!(
                f,
                "metadata element <{element}> has a missing or invalid attribute '{attribute}'"
            ),
            Self::DuplicateTypeId { id, name } => {
                write!(f, "duplicate type id {id} redeclared by '{name}'")
            }
            Self::UnknownTypeId { id } => write!(f, "reference to undeclared type id {id}"),
            Self::TypeTreeCycle { type_name } => {
                write!(f, "type '{type_name}' directly contains itself")
            }
            Self::InvalidCheckpoint { offset } => {
                write!(f, "invalid checkpoint record at offset {offset:#x}")
            }
            Self::UnresolvedConstant { type_id, index } => write!(
                f,
                "constant pool for type {type_id} has no entry {index}"
            ),
            Self::ConstantPoolCycle { type_id, index } => write!(
                f,
                "constant pool cycle through type {type_id} entry {index}"
            ),
            Self::InconsistentEventSize { offset, declared } => write!(
                f,
                "event at offset {offset:#x} declares impossible size {declared}"
            ),
            Self::UnknownPrimitiveType { name } => {
                write!(f, "field-less type '{name}' is not a known primitive")
            }
            Self::CompressionUnsupported { codec } => {
                write!(f, "no decompressor registered for codec id {codec}")
            }
            Self::Compression(s) => write!(f, "decompression failed: {s}"),
            Self::ShapeMismatch { target, field } => write!(
                f,
                "recorded type has no field '{field}' required by {target}"
            ),
            Self::ValueKind { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::Decode {
                type_name,
                offset,
                source,
            } => write!(
                f,
                "failed to decode '{type_name}' event at offset {offset:#x}: {source}"
            ),
            Self::Chunk { index, source } => write!(f, "chunk {index}: {source}"),
            Self::Internal(s) => write!(f, "internal logic error: {s}"),
        }
    }
}

impl std::error::Error for ParflightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode { source, .. } | Self::Chunk { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ParflightError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl ParflightError {
    /// Wraps this error with the index of the chunk it occurred in.
    ///
    /// Errors that already carry chunk context are returned unchanged, so
    /// nested call sites never double-wrap.
    #[must_use]
    pub(crate) fn at_chunk(self, index: usize) -> Self {
        match self {
            already @ Self::Chunk { .. } => already,
            source => Self::Chunk {
                index,
                source: Box::new(source),
            },
        }
    }

    /// Wraps this error with the event type and position being decoded.
    #[must_use]
    pub(crate) fn in_event(self, type_name: &str, offset: u64) -> Self {
        match self {
            already @ Self::Decode { .. } => already,
            source => Self::Decode {
                type_name: type_name.to_owned(),
                offset,
                source: Box::new(source),
            },
        }
    }
}
