//! Pluggable decompression backend.
//!
//! Recordings may carry compressed chunk bodies (state-flag bit 0). The body
//! then starts with a one-byte codec id and a varint uncompressed length,
//! followed by the compressed bytes. This module defines the [`Decompressor`]
//! trait and a registry mapping codec ids to implementations.
//!
//! Decoding is the only direction this library implements; it never produces
//! compressed chunks.

use crate::error::{ParflightError, Result};

/// Upper bound on a decompressed chunk body, in bytes.
///
/// Recorders target chunks in the tens of megabytes; a declared uncompressed
/// length beyond this is corruption or an attack, not a real recording, and
/// is rejected before any allocation happens.
pub const MAX_DECOMPRESSED_BODY: u64 = 1 << 30;

/// Interface for decompression algorithms.
///
/// Each decompressor is identified by the codec id byte stored at the start
/// of a compressed chunk body. Id 0 is reserved for pass-through.
pub trait Decompressor: Send + Sync + std::fmt::Debug {
    /// Returns the codec id this implementation handles.
    fn id(&self) -> u8;

    /// Decompresses `data` into a buffer of exactly `uncompressed_len` bytes.
    ///
    /// Implementations must fail with [`ParflightError::Compression`] when
    /// the data is corrupt or does not expand to the promised length.
    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

// --- No Compression (Pass-through) ---

/// Codec id 0: the body bytes are stored as-is.
///
/// Some recorders set the compressed flag with the pass-through codec; the
/// "decompression" is a length-checked copy.
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Decompressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        if data.len() != uncompressed_len {
            return Err(ParflightError::Compression(format!(
                "pass-through body is {} bytes but declares {}",
                data.len(),
                uncompressed_len
            )));
        }
        Ok(data.to_vec())
    }
}

// --- LZ4 Implementation ---

#[cfg(feature = "lz4_flex")]
/// Codec id 1: LZ4 block compression.
///
/// Available when the `lz4_flex` feature is enabled. Uses the `lz4_flex`
/// crate's block format; the uncompressed length comes from the chunk body
/// envelope, not from an in-stream prefix.
#[derive(Debug, Clone, Copy)]
pub struct Lz4Decompressor;

#[cfg(feature = "lz4_flex")]
impl Decompressor for Lz4Decompressor {
    fn id(&self) -> u8 {
        1
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = lz4_flex::block::decompress(data, uncompressed_len)
            .map_err(|e| ParflightError::Compression(e.to_string()))?;
        if out.len() != uncompressed_len {
            return Err(ParflightError::Compression(format!(
                "LZ4 body expanded to {} bytes but declares {}",
                out.len(),
                uncompressed_len
            )));
        }
        Ok(out)
    }
}

// --- REGISTRY ---

/// Centralized registry for decompression algorithms.
///
/// The registry maps codec ids (stored in compressed chunk bodies) to
/// specific [`Decompressor`] implementations. Every [`Recording`] carries
/// one; callers with custom codecs register them before iterating chunks.
///
/// [`Recording`]: crate::reader::Recording
#[derive(Debug)]
pub struct CodecRegistry {
    algorithms: Vec<Option<Box<dyn Decompressor>>>,
}

impl CodecRegistry {
    /// Creates a new registry with the built-in codecs registered.
    ///
    /// *   ID 0: [`NoCompression`]
    /// *   ID 1: [`Lz4Decompressor`] (if the `lz4_flex` feature is enabled)
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: (0..8).map(|_| None).collect(),
        };

        reg.register(Box::new(NoCompression));

        #[cfg(feature = "lz4_flex")]
        reg.register(Box::new(Lz4Decompressor));

        reg
    }

    /// Registers a decompressor.
    ///
    /// The codec's id (returned by `algo.id()`) determines its slot in the
    /// registry. A codec already registered under the same id is replaced.
    pub fn register(&mut self, algo: Box<dyn Decompressor>) {
        let id = usize::from(algo.id());

        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }

        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Retrieves a decompressor by codec id.
    ///
    /// # Errors
    /// Returns [`ParflightError::CompressionUnsupported`] if the id is not
    /// registered, which for LZ4 usually means the `lz4_flex` feature is off.
    pub fn get(&self, id: u8) -> Result<&dyn Decompressor> {
        let idx = usize::from(id);
        if idx < self.algorithms.len()
            && let Some(algo) = self.algorithms.get(idx).and_then(|opt| opt.as_ref())
        {
            return Ok(algo.as_ref());
        }

        Err(ParflightError::CompressionUnsupported { codec: id })
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
