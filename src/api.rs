//! One-call entry points for whole-recording decoding.
//!
//! Everything here is a thin arrangement of [`Recording`], [`RootContext`]
//! and the executor; callers that need chunk-level control use those parts
//! directly.

use std::path::Path;
use std::sync::Arc;

use crate::context::{ChunkContext, RootContext};
use crate::deserializer::DecodeOptions;
use crate::error::Result;
use crate::event::{Control, DecodedEvent};
use crate::executor;
use crate::metadata::TypeDescriptor;
use crate::reader::Recording;

/// The main entry point for decoding recordings.
///
/// ```no_run
/// use parflight::{Control, Parflight};
///
/// let verdict = Parflight::events("profile.jfr", |ctx, descriptor, event| {
///     println!("chunk {}: {}", ctx.index(), descriptor.name);
///     let _ = event.value();
///     Control::Continue
/// })?;
/// # Ok::<(), parflight::ParflightError>(())
/// ```
#[derive(Debug)]
pub struct Parflight;

impl Parflight {
    /// Decodes every event of the recording at `path`, chunks in file
    /// order, with default [`DecodeOptions`].
    pub fn events<P, H>(path: P, handler: H) -> Result<Control>
    where
        P: AsRef<Path>,
        H: FnMut(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control,
    {
        Self::events_with(path, DecodeOptions::default(), handler)
    }

    /// [`events`](Parflight::events) with explicit options.
    pub fn events_with<P, H>(path: P, options: DecodeOptions, handler: H) -> Result<Control>
    where
        P: AsRef<Path>,
        H: FnMut(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control,
    {
        let recording = Recording::open(path)?;
        executor::decode_sequential(&recording, Arc::new(RootContext::new()), options, handler)
    }

    /// Decodes the recording at `path` with one rayon task per chunk.
    ///
    /// Events within a chunk arrive in order; events of different chunks
    /// interleave. The handler runs on worker threads, so it takes `Fn`
    /// plus `Sync` instead of `FnMut`.
    pub fn events_parallel<P, H>(path: P, handler: H) -> Result<Control>
    where
        P: AsRef<Path>,
        H: Fn(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control + Sync,
    {
        Self::events_parallel_with(path, DecodeOptions::default(), handler)
    }

    /// [`events_parallel`](Parflight::events_parallel) with explicit
    /// options.
    pub fn events_parallel_with<P, H>(
        path: P,
        options: DecodeOptions,
        handler: H,
    ) -> Result<Control>
    where
        P: AsRef<Path>,
        H: Fn(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control + Sync,
    {
        let recording = Recording::open(path)?;
        executor::decode_parallel(&recording, Arc::new(RootContext::new()), options, handler)
    }
}
