//! # Parflight
//!
//! A high-performance decoder for Java Flight Recorder (JFR) recordings that
//! enables lazy event access, zero-copy reads, and parallel processing of
//! multi-chunk capture files.
//!
//! ## Overview
//!
//! A flight recording is not one monolithic stream. It is a sequence of
//! self-contained chunks, and every chunk carries its own type declarations
//! and its own constant pools. Parflight leans on that structure: each chunk
//! decodes independently, with nothing shared between chunks except compiled
//! decode plans, which are keyed by structural shape rather than by the
//! chunk-local ids they came from. This architectural approach enables
//! several capabilities:
//!
//! ### Key Features
//!
//! *   **Parallel Decoding:** Chunks are independent by construction, so the
//!     recording decodes one rayon task per chunk with no locking on the hot
//!     path.
//! *   **Zero-Copy Reads:** Files are memory-mapped and event payloads are
//!     sliced, not copied; uncompressed chunk bodies are borrowed straight
//!     from the map.
//! *   **Self-Describing Input:** No schema files and no code generation.
//!     Each chunk's embedded metadata event drives decoding, so recordings
//!     from different JVM versions read with the same binary.
//! *   **Tiered Deserialization:** Events materialize eagerly, lazily on
//!     first access, or through compiled decode plans that pick per shape;
//!     all tiers produce identical values.
//! *   **Constant Pool Resolution:** Heavyweight values (stack traces,
//!     class names, thread descriptions) are deduplicated by the recorder;
//!     references resolve transparently, memoized per chunk, or stay
//!     symbolic on request.
//! *   **Typed Extraction:** `#[derive(ParflightEvent)]` maps recorded
//!     events onto plain Rust structs, decoding only the fields the struct
//!     asks for.
//!
//! ## Architecture
//!
//! ### Recording Layout
//!
//! The physical layout of a recording is a chain of chunks:
//!
//! ```text
//! [Chunk 0: header | events... | metadata event | checkpoint events...]
//! [Chunk 1: header | ...]
//! ...
//! ```
//!
//! Each 68-byte chunk header names the chunk's size, its format version,
//! and the offsets of the metadata event and the first checkpoint. Every
//! payload value is varint-packed; strings carry their own encoding tag and
//! may point into the constant pools.
//!
//! ### The Decode Pipeline
//!
//! Reading proceeds in stages, each owned by one module:
//!
//! 1. [`Recording`] memory-maps the file and frames chunks
//!    ([`reader`], [`format`]).
//! 2. [`ChunkContext`] materializes one chunk: it parses the metadata event
//!    into a [`metadata::TypePool`] and indexes the checkpoint chain into
//!    constant pools ([`context`], [`metadata`], [`pool`]).
//! 3. Event iteration walks the record envelopes and decodes payloads per
//!    the configured [`DecodeTier`], reusing compiled plans from the shared
//!    [`RootContext`] ([`event`], [`plan`], [`context`]).
//!
//! ## Usage Patterns
//!
//! ### Basic Decoding
//!
//! ```no_run
//! use parflight::{Control, Parflight};
//!
//! let verdict = Parflight::events("profile.jfr", |ctx, descriptor, event| {
//!     if descriptor.name.starts_with("jdk.") {
//!         println!("chunk {}: {:?}", ctx.index(), event.value());
//!     }
//!     Control::Continue
//! })?;
//! # Ok::<(), parflight::ParflightError>(())
//! ```
//!
//! ### Typed Extraction
//!
//! ```rust,ignore
//! use parflight::{ChunkContext, ParflightEvent};
//!
//! #[derive(ParflightEvent)]
//! #[parflight(event = "jdk.ThreadSleep")]
//! struct ThreadSleep {
//!     #[parflight(rename = "startTime")]
//!     start_time: i64,
//!     time: i64,
//! }
//!
//! for sleep in ctx.typed_events::<ThreadSleep>() {
//!     let sleep = sleep?;
//!     println!("slept {} ticks", sleep.time);
//! }
//! ```
//!
//! ### Inspection
//!
//! ```rust,ignore
//! use parflight::ParflightInspector;
//!
//! let report = ParflightInspector::inspect("profile.jfr")?;
//! println!("{report}");                       // tree rendering
//! println!("{}", serde_json::to_string(&report)?); // machine readable
//! ```
//!
//! ## Performance Considerations
//!
//! - **Decode Throughput:** Scales with CPU cores across chunks; within a
//!   chunk, compiled plans replace per-field descriptor dispatch.
//! - **Startup:** Memory-mapped I/O defers reading to first access.
//! - **Memory:** Lazy and wide-event decoding hold byte ranges, not values,
//!   until a payload is actually inspected.
//! - **Compression:** Optional LZ4 chunk decompression (feature:
//!   `lz4_flex`) trades CPU for smaller captures.
//!
//! ### Safety and Error Handling
//!
//! Parflight is designed with safety as a priority:
//!
//! * **Encapsulated Unsafe:** `unsafe` appears once, for memory-mapping the
//!   input file in the `reader` module, and nowhere else.
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library
//!   (enforced by clippy lints). Malformed input is an error value, never a
//!   crash.
//! * **Comprehensive Errors:** All failures correspond to a
//!   [`ParflightError`] variant carrying the offset or id that triggered
//!   it.
//! * **Bounded Recursion:** Type trees, pool reference chains, and plan
//!   compilation all share one depth cap, so hostile recordings cannot
//!   overflow the stack.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod compression;
pub mod context;
pub mod deserializer;
pub mod error;
pub mod event;
pub mod executor;
pub mod format;
pub mod inspector;
pub mod metadata;
pub mod plan;
pub mod pool;
pub mod reader;
pub mod value;
pub mod visitor;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod bytes;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use api::Parflight;
pub use context::{ChunkContext, RootContext};
pub use deserializer::{DecodeOptions, DecodeTier, MAX_DECODE_DEPTH};
pub use error::{ParflightError, Result};
pub use event::{Control, DecodedEvent, EventIter, Events, RawEvent, TypedEvents};
pub use executor::{decode_parallel, decode_sequential};
pub use inspector::{ParflightInspector, RecordingReport};
pub use reader::{Chunk, Recording};
pub use value::{EventObject, Value};
pub use visitor::{Flow, MetadataVisitor};

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Decompressor;
pub use compression::{CodecRegistry, Decompressor, NoCompression};

// Re-export the derive macro so it is accessible as
// `parflight::ParflightEvent`.
pub use parflight_derive::ParflightEvent;
