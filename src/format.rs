//! Defines the physical binary layout of a flight recording.
//!
//! # Layout Strategy
//! A recording is a plain concatenation of self-contained chunks; there is no
//! global header or trailer, which is what lets a recorder emit chunks
//! continuously and a reader start work before the file is finished.
//!
//! File: `[Chunk 0] [Chunk 1] ... [Chunk N]`
//!
//! ## Chunk Anatomy
//! Each chunk is a fixed 68-byte header followed by a body of length-prefixed
//! event records:
//!
//! `[ Header (68) ] [ Events ... ] [ Checkpoints ] [ Metadata Event ]`
//!
//! The header carries absolute-within-the-chunk offsets to the first
//! checkpoint record and to the metadata event, so a reader can parse the
//! chunk's type system and constant pools before touching any event. All
//! fixed-width header fields are big-endian.
//!
//! When bit 0 of the state flags is set, the body (everything after the
//! header) is compressed: one codec-id byte, a varint uncompressed length,
//! then the compressed bytes. Header offsets always refer to the logical,
//! uncompressed chunk image.

use crate::bytes::ByteReader;
use crate::error::{ParflightError, Result};

/// Magic bytes identifying a chunk start: `FLR\0`.
pub const MAGIC: [u8; 4] = *b"FLR\0";

/// The fixed size of a chunk header.
/// Magic(4) + Version(4) + Size(8) + PoolOff(8) + MetaOff(8)
/// + StartNanos(8) + Duration(8) + StartTicks(8) + TicksPerSec(8) + Flags(4) = 68
pub const CHUNK_HEADER_SIZE: u64 = 68;

/// The major format version this library decodes.
pub const SUPPORTED_MAJOR: u16 = 2;

/// Reserved event type id for the metadata event.
pub const EVENT_TYPE_METADATA: i64 = 0;

/// Reserved event type id for checkpoint (constant pool) events.
pub const EVENT_TYPE_CHECKPOINT: i64 = 1;

/// State-flag bit marking a compressed chunk body.
const COMPRESSED_MASK: u32 = 0b0000_0001;

/// A parsed chunk header.
///
/// Field order matches the wire layout. Offsets are relative to the chunk
/// start, not the file, and refer to the logical (uncompressed) chunk image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Format major version.
    pub major: u16,
    /// Format minor version.
    pub minor: u16,
    /// Total physical chunk size in bytes, header included.
    pub chunk_size: u64,
    /// Offset of the first checkpoint record, or zero when the chunk has no
    /// constant pools.
    pub constant_pool_offset: u64,
    /// Offset of the metadata event describing this chunk's types.
    pub metadata_offset: u64,
    /// Wall-clock time of the chunk start, nanoseconds since the epoch.
    pub start_nanos: u64,
    /// Wall-clock duration covered by the chunk, in nanoseconds.
    pub duration_nanos: u64,
    /// Value of the high-resolution tick counter at the chunk start.
    pub start_ticks: u64,
    /// Tick counter frequency, in ticks per second.
    pub ticks_per_second: u64,
    /// Raw state flags; bit 0 marks a compressed body.
    pub state_flags: u32,
}

impl ChunkHeader {
    /// Parses one header from the reader, which must be positioned at the
    /// chunk start.
    ///
    /// Fails with [`ParflightError::InvalidMagic`] when the signature does
    /// not match and [`ParflightError::UnsupportedVersion`] when the major
    /// version is not [`SUPPORTED_MAJOR`]. Minor versions are forward
    /// compatible and accepted as-is.
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let offset = reader.absolute_position();
        if reader.read_bytes(MAGIC.len())? != MAGIC {
            return Err(ParflightError::InvalidMagic { offset });
        }
        let major = reader.read_u16()?;
        let minor = reader.read_u16()?;
        if major != SUPPORTED_MAJOR {
            return Err(ParflightError::UnsupportedVersion { major, minor });
        }
        Ok(Self {
            major,
            minor,
            chunk_size: reader.read_u64()?,
            constant_pool_offset: reader.read_u64()?,
            metadata_offset: reader.read_u64()?,
            start_nanos: reader.read_u64()?,
            duration_nanos: reader.read_u64()?,
            start_ticks: reader.read_u64()?,
            ticks_per_second: reader.read_u64()?,
            state_flags: reader.read_u32()?,
        })
    }

    /// Returns `true` when the chunk body is compressed.
    pub fn compressed(&self) -> bool {
        self.state_flags & COMPRESSED_MASK != 0
    }

    /// Checks the declared size against the bytes actually available from
    /// the chunk start to the end of the recording.
    ///
    /// A size smaller than the header itself or larger than the remaining
    /// file cannot be advanced over, so framing stops here rather than
    /// guessing at the next boundary.
    pub fn validate_size(&self, offset: u64, available: u64) -> Result<()> {
        if self.chunk_size < CHUNK_HEADER_SIZE || self.chunk_size > available {
            return Err(ParflightError::InconsistentChunkSize {
                offset,
                declared: self.chunk_size,
                available,
            });
        }
        Ok(())
    }

    /// Converts a raw tick counter value to wall-clock nanoseconds using
    /// this chunk's time base.
    ///
    /// Ticks before the chunk start clamp to the chunk start time; a zero
    /// tick frequency (seen in damaged headers) also yields the start time
    /// rather than dividing by zero.
    pub fn timestamp_nanos(&self, ticks: u64) -> u64 {
        if self.ticks_per_second == 0 {
            return self.start_nanos;
        }
        let delta = u128::from(ticks.saturating_sub(self.start_ticks));
        let nanos = delta * 1_000_000_000 / u128::from(self.ticks_per_second);
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        self.start_nanos.saturating_add(nanos)
    }
}
