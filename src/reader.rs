//! The Read-Side Engine.
//!
//! Handles memory-mapping recording files, framing the chunk sequence, and
//! handing out zero-copy views of chunk bodies.
//!
//! A [`Recording`] abstracts over where the bytes live: a single mapped
//! file, several mapped files treated as one logical stream (recorders roll
//! recordings across part files), or an in-memory buffer. Chunk framing and
//! everything above it only ever sees one contiguous address space.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};
use memmap2::Mmap;

use crate::bytes::ByteReader;
use crate::compression::{CodecRegistry, Decompressor, MAX_DECOMPRESSED_BODY};
use crate::error::{ParflightError, Result};
use crate::format::{CHUNK_HEADER_SIZE, ChunkHeader};

/// One physical backing region of a recording.
enum Segment {
    /// A memory-mapped file.
    Mapped(Mmap),
    /// A caller-supplied buffer.
    Owned(Arc<[u8]>),
}

impl Segment {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(bytes) => bytes,
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapped(map) => write!(f, "Mapped({} bytes)", map.len()),
            Self::Owned(bytes) => write!(f, "Owned({} bytes)", bytes.len()),
        }
    }
}

/// A logically contiguous byte stream over one or more segments.
///
/// Slices that land inside a single segment are borrowed; slices that cross
/// a segment seam are reassembled into an owned buffer. Chunk bodies almost
/// always take the borrowed path, since recorders split recordings at chunk
/// boundaries.
#[derive(Debug)]
struct ByteSource {
    segments: Vec<Segment>,
    starts: Vec<u64>,
    total: u64,
}

impl ByteSource {
    fn new(segments: Vec<Segment>) -> Self {
        let mut kept = Vec::with_capacity(segments.len());
        let mut starts = Vec::with_capacity(segments.len());
        let mut total = 0u64;
        for segment in segments {
            let len = segment.bytes().len() as u64;
            // Zero-length part files contribute nothing and would stall the
            // reassembly walk below.
            if len == 0 {
                continue;
            }
            starts.push(total);
            total += len;
            kept.push(segment);
        }
        Self {
            segments: kept,
            starts,
            total,
        }
    }

    fn len(&self) -> u64 {
        self.total
    }

    fn slice(&self, offset: u64, len: u64) -> Result<Cow<'_, [u8]>> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.total)
            .ok_or(ParflightError::UnexpectedEndOfData { offset })?;
        if len == 0 {
            return Ok(Cow::Borrowed(&[]));
        }
        let len = usize::try_from(len).map_err(|_| ParflightError::UnexpectedEndOfData { offset })?;
        let idx = self.starts.partition_point(|&start| start <= offset).saturating_sub(1);

        // Fast path: the range lies within one segment.
        let seg = self.segments[idx].bytes();
        let local = (offset - self.starts[idx]) as usize;
        if local.checked_add(len).is_some_and(|e| e <= seg.len()) {
            return Ok(Cow::Borrowed(&seg[local..local + len]));
        }

        // Seam path: stitch the range together from consecutive segments.
        let mut out = Vec::with_capacity(len);
        let mut pos = offset;
        for (segment, &start) in self.segments.iter().zip(&self.starts).skip(idx) {
            if out.len() == len {
                break;
            }
            let bytes = segment.bytes();
            let local = (pos - start) as usize;
            let take = (len - out.len()).min(bytes.len() - local);
            out.extend_from_slice(&bytes[local..local + take]);
            pos += take as u64;
        }
        if out.len() != len {
            return Err(ParflightError::Internal(format!(
                "segment reassembly produced {} of {} bytes at offset {end}",
                out.len(),
                len
            )));
        }
        Ok(Cow::Owned(out))
    }
}

/// The main handle for reading a flight recording.
///
/// Owns the mapped (or in-memory) bytes and the codec registry used for
/// compressed chunk bodies. All chunk views and decode contexts borrow from
/// this handle.
///
/// ## Examples
///
/// ```rust,no_run
/// use parflight::Recording;
///
/// let recording = Recording::open("app.jfr")?;
/// for chunk in recording.chunks() {
///     let chunk = chunk?;
///     println!("chunk {} at offset {:#x}: {} bytes", chunk.index(), chunk.offset(), chunk.size());
/// }
/// # Ok::<(), parflight::ParflightError>(())
/// ```
pub struct Recording {
    source: ByteSource,
    codecs: CodecRegistry,
}

impl Recording {
    /// Opens a recording file by memory-mapping it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_parts(std::slice::from_ref(&path))
    }

    /// Opens several part files as one logical recording, in the given order.
    ///
    /// Recorders that roll recordings emit consecutive part files; decoding
    /// them spliced must be indistinguishable from decoding the
    /// concatenation.
    pub fn open_parts<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut segments = Vec::with_capacity(paths.len());
        for path in paths {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            // Mapping a zero-length file is an error on some platforms.
            if len == 0 {
                continue;
            }
            // Safety: the map aliases file contents another process could
            // mutate. Callers accept that in exchange for zero-copy access;
            // every read above this layer is bounds-checked.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file)? };
            segments.push(Segment::Mapped(mmap));
        }
        let source = ByteSource::new(segments);
        debug!(
            "opened recording: {} bytes in {} segment(s)",
            source.len(),
            source.segments.len()
        );
        Ok(Self {
            source,
            codecs: CodecRegistry::new(),
        })
    }

    /// Wraps an in-memory buffer as a recording.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::from_parts([bytes])
    }

    /// Wraps several in-memory buffers as one logical recording.
    pub fn from_parts<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Arc<[u8]>>,
    {
        let segments = parts
            .into_iter()
            .map(|part| Segment::Owned(part.into()))
            .collect();
        Self {
            source: ByteSource::new(segments),
            codecs: CodecRegistry::new(),
        }
    }

    /// Total length of the recording in bytes.
    pub fn len(&self) -> u64 {
        self.source.len()
    }

    /// Returns `true` for a zero-length recording.
    pub fn is_empty(&self) -> bool {
        self.source.len() == 0
    }

    /// Registers a custom chunk-body decompressor.
    pub fn register_decompressor(&mut self, codec: Box<dyn Decompressor>) {
        self.codecs.register(codec);
    }

    /// Borrows `len` bytes at `offset`, reassembling across segment seams
    /// when necessary.
    pub(crate) fn slice(&self, offset: u64, len: u64) -> Result<Cow<'_, [u8]>> {
        self.source.slice(offset, len)
    }

    /// Iterates the chunk sequence.
    ///
    /// Framing stops at the first structural error (bad signature,
    /// impossible size): past that point chunk boundaries cannot be trusted,
    /// so the iterator yields the error once and then terminates.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            recording: self,
            offset: 0,
            index: 0,
            done: false,
        }
    }
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("len", &self.source.total)
            .field("segments", &self.source.segments.len())
            .finish()
    }
}

/// Iterator over the chunks of a [`Recording`].
#[derive(Debug)]
pub struct Chunks<'a> {
    recording: &'a Recording,
    offset: u64,
    index: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn frame_next(&self, available: u64) -> Result<Chunk<'a>> {
        let header_bytes = self.recording.slice(self.offset, CHUNK_HEADER_SIZE)?;
        let mut reader = ByteReader::with_base(&header_bytes, self.offset);
        let header = ChunkHeader::parse(&mut reader)?;
        header.validate_size(self.offset, available)?;
        Ok(Chunk {
            recording: self.recording,
            header,
            offset: self.offset,
            index: self.index,
        })
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let total = self.recording.len();
        if self.offset >= total {
            self.done = true;
            return None;
        }
        let available = total - self.offset;
        if available < CHUNK_HEADER_SIZE {
            self.done = true;
            return Some(Err(ParflightError::TruncatedHeader {
                offset: self.offset,
                available,
            }));
        }
        match self.frame_next(available) {
            Ok(chunk) => {
                trace!(
                    "framed chunk {} at {:#x}, {} bytes",
                    chunk.index,
                    chunk.offset,
                    chunk.size()
                );
                self.offset += chunk.size();
                self.index += 1;
                Some(Ok(chunk))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// A view of one chunk within the recording.
///
/// This is a lightweight handle that doesn't own data, just points at it.
/// Decoding the chunk's contents goes through
/// [`ChunkContext`](crate::context::ChunkContext), which builds the type
/// system and constant pools on top of this view.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    recording: &'a Recording,
    header: ChunkHeader,
    offset: u64,
    index: usize,
}

impl<'a> Chunk<'a> {
    /// Zero-based position of this chunk in the recording.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Absolute file offset of the chunk start.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total physical size of the chunk, header included.
    pub fn size(&self) -> u64 {
        self.header.chunk_size
    }

    /// The parsed chunk header.
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Returns `true` when the chunk body is compressed.
    pub fn compressed(&self) -> bool {
        self.header.compressed()
    }

    /// Converts a raw tick value to wall-clock nanoseconds using this
    /// chunk's time base.
    pub fn timestamp_nanos(&self, ticks: u64) -> u64 {
        self.header.timestamp_nanos(ticks)
    }

    /// Returns the logical chunk body: every byte after the header, with
    /// compression undone.
    ///
    /// Uncompressed bodies borrow straight from the mapped file. Compressed
    /// bodies parse the codec envelope (id byte, varint uncompressed length)
    /// and return an owned buffer.
    pub fn body(&self) -> Result<Cow<'a, [u8]>> {
        let body_len = self.header.chunk_size - CHUNK_HEADER_SIZE;
        let raw = self
            .recording
            .slice(self.offset + CHUNK_HEADER_SIZE, body_len)?;
        if !self.header.compressed() {
            return Ok(raw);
        }

        let mut reader = ByteReader::with_base(&raw, self.offset + CHUNK_HEADER_SIZE);
        let codec_id = reader.read_u8()?;
        let uncompressed_len = reader.read_varuint_len(MAX_DECOMPRESSED_BODY)?;
        let rest = reader.remaining();
        let payload = reader.read_bytes(rest)?;
        let codec = self.recording.codecs.get(codec_id)?;
        codec.decompress(payload, uncompressed_len).map(Cow::Owned)
    }
}
