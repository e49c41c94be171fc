//! The parallel decode executor.
//!
//! Chunks are self-contained, so the recording decodes one rayon task per
//! chunk with no coordination beyond the shared [`RootContext`]. Within a
//! chunk, events stay strictly sequential; parallelism never reorders the
//! events of a single chunk, only interleaves chunks.
//!
//! The executor is purely reactive: the first error (or the first handler
//! that answers [`Control::Stop`]) raises a flag that every worker checks
//! between events, and the scope drains instead of being torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::context::{ChunkContext, RootContext};
use crate::deserializer::DecodeOptions;
use crate::error::{ParflightError, Result};
use crate::event::{Control, DecodedEvent};
use crate::metadata::TypeDescriptor;
use crate::reader::{Chunk, Recording};

/// Context shared among all worker threads.
struct ExecutionContext<'h, H> {
    root: Arc<RootContext>,
    options: DecodeOptions,
    handler: &'h H,
    /// Raised by both errors and clean stops; workers cease at the next
    /// event boundary once set.
    cease: AtomicBool,
    /// Set only by a handler answering [`Control::Stop`].
    stopped: AtomicBool,
    error_capture: Mutex<Option<ParflightError>>,
}

impl<H> ExecutionContext<'_, H> {
    fn signal_error(&self, err: ParflightError) {
        let mut guard = self
            .error_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(err);
            self.cease.store(true, Ordering::SeqCst);
        }
    }

    fn signal_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cease.store(true, Ordering::SeqCst);
    }

    fn should_cease(&self) -> bool {
        self.cease.load(Ordering::Relaxed)
    }
}

/// Decodes every chunk of `recording` in parallel, one rayon task each.
///
/// The handler runs on worker threads and observes each chunk's events in
/// order, though events of different chunks interleave arbitrarily. Plans
/// compiled by any worker land in `root` and are reused by the rest.
///
/// The first error wins and aborts the remaining work at the next event
/// boundary. A handler answering [`Control::Stop`] aborts the same way but
/// reports success; the verdict says which of the two ended the run early.
pub fn decode_parallel<H>(
    recording: &Recording,
    root: Arc<RootContext>,
    options: DecodeOptions,
    handler: H,
) -> Result<Control>
where
    H: Fn(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control + Sync,
{
    // Frame every chunk up front so a torn file fails before any worker
    // starts.
    let chunks: Vec<Chunk<'_>> = recording.chunks().collect::<Result<_>>()?;
    debug!("decoding {} chunks in parallel", chunks.len());

    let ctx = ExecutionContext {
        root,
        options,
        handler: &handler,
        cease: AtomicBool::new(false),
        stopped: AtomicBool::new(false),
        error_capture: Mutex::new(None),
    };

    rayon::scope(|s| {
        let ctx_ref = &ctx;
        for chunk in chunks {
            s.spawn(move |_| decode_chunk(ctx_ref, chunk));
        }
    });

    let mut guard = ctx
        .error_capture
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(err) = guard.take() {
        return Err(err);
    }
    if ctx.stopped.load(Ordering::SeqCst) {
        Ok(Control::Stop)
    } else {
        Ok(Control::Continue)
    }
}

/// Sequential counterpart of [`decode_parallel`].
///
/// Same contract, single thread, chunks in file order. The handler may be
/// `FnMut` here since nothing runs concurrently.
pub fn decode_sequential<H>(
    recording: &Recording,
    root: Arc<RootContext>,
    options: DecodeOptions,
    mut handler: H,
) -> Result<Control>
where
    H: FnMut(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control,
{
    for chunk in recording.chunks() {
        let chunk = chunk?;
        let index = chunk.index();
        let ctx = ChunkContext::new(chunk, root.clone(), options)?;
        let verdict = ctx
            .each_event(|descriptor, event| handler(&ctx, descriptor, event))
            .map_err(|err| err.at_chunk(index))?;
        if verdict == Control::Stop {
            return Ok(Control::Stop);
        }
    }
    Ok(Control::Continue)
}

/// The worker function executed by rayon threads, one chunk per call.
fn decode_chunk<H>(ctx: &ExecutionContext<'_, H>, chunk: Chunk<'_>)
where
    H: Fn(&ChunkContext<'_>, &TypeDescriptor, &DecodedEvent<'_, '_>) -> Control + Sync,
{
    if ctx.should_cease() {
        return;
    }
    let index = chunk.index();

    // Context construction already carries the chunk index on failure.
    let chunk_ctx = match ChunkContext::new(chunk, ctx.root.clone(), ctx.options) {
        Ok(chunk_ctx) => chunk_ctx,
        Err(err) => {
            ctx.signal_error(err);
            return;
        }
    };

    for raw in chunk_ctx.raw_events() {
        if ctx.should_cease() {
            return;
        }
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                ctx.signal_error(err.at_chunk(index));
                return;
            }
        };
        let event = match chunk_ctx.decode_event(&raw) {
            Ok(event) => event,
            Err(err) => {
                ctx.signal_error(err.at_chunk(index));
                return;
            }
        };
        let Some(descriptor) = chunk_ctx.types().by_index(raw.type_index) else {
            ctx.signal_error(
                ParflightError::UnknownTypeId { id: raw.type_id() }.at_chunk(index),
            );
            return;
        };
        if (ctx.handler)(&chunk_ctx, descriptor, &event) == Control::Stop {
            ctx.signal_stop();
            return;
        }
    }
}
