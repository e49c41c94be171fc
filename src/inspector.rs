// src/inspector.rs

//! Tools for inspecting the physical structure of recordings.
//! Useful for debugging capture setups and verifying what a file holds
//! before committing to a full decode.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::context::{ChunkContext, RootContext};
use crate::deserializer::DecodeOptions;
use crate::error::Result;
use crate::reader::{Chunk, Recording};

/// How many event types each chunk report lists, busiest first.
const TOP_EVENT_TYPES: usize = 5;

/// A structural report of a whole recording.
#[derive(Debug, Serialize)]
pub struct RecordingReport {
    /// Total size of the file on disk.
    pub file_size: u64,
    /// Per-chunk breakdown, in file order.
    pub chunks: Vec<ChunkReport>,
}

/// Structure and content summary for a single chunk.
#[derive(Debug, Serialize)]
pub struct ChunkReport {
    /// Zero-based position in the recording.
    pub index: usize,
    /// Absolute offset of the chunk header.
    pub offset: u64,
    /// Stored chunk size in bytes, header included.
    pub size: u64,
    /// Format version the chunk declares.
    pub major: u16,
    /// Minor half of the version.
    pub minor: u16,
    /// Whether the body is stored compressed.
    pub compressed: bool,
    /// Wall-clock start of the chunk, epoch nanoseconds.
    pub start_nanos: u64,
    /// Covered wall-clock span in nanoseconds.
    pub duration_nanos: u64,
    /// Tick resolution events in this chunk are stamped with.
    pub ticks_per_second: u64,
    /// Types declared by the chunk's metadata event.
    pub type_count: usize,
    /// Checkpoint events in the constant-pool chain.
    pub checkpoint_count: usize,
    /// Distinct pool types across those checkpoints.
    pub pool_count: usize,
    /// Total constant entries indexed.
    pub constant_count: usize,
    /// Event records, service records excluded.
    pub event_count: u64,
    /// Records the iterator could not frame or attribute to a type.
    pub skipped_records: usize,
    /// Busiest event types, capped at [`TOP_EVENT_TYPES`].
    pub top_events: Vec<EventTypeCount>,
}

/// One event type and how many records it has in the chunk.
#[derive(Debug, Serialize)]
pub struct EventTypeCount {
    /// Fully qualified event type name.
    pub name: String,
    /// Number of records.
    pub count: u64,
}

/// The recording inspector tool.
#[derive(Debug)]
pub struct ParflightInspector;

impl ParflightInspector {
    /// Analyzes the file at `path` and returns a structural report.
    pub fn inspect<P: AsRef<Path>>(path: P) -> Result<RecordingReport> {
        Self::inspect_recording(&Recording::open(path)?)
    }

    /// [`inspect`](ParflightInspector::inspect) over an already-opened
    /// recording.
    pub fn inspect_recording(recording: &Recording) -> Result<RecordingReport> {
        let root = Arc::new(RootContext::new());
        let mut chunks = Vec::new();
        for chunk in recording.chunks() {
            chunks.push(Self::inspect_chunk(chunk?, root.clone())?);
        }
        Ok(RecordingReport {
            file_size: recording.len(),
            chunks,
        })
    }

    fn inspect_chunk(chunk: Chunk<'_>, root: Arc<RootContext>) -> Result<ChunkReport> {
        let header = *chunk.header();
        let index = chunk.index();
        let offset = chunk.offset();
        let compressed = chunk.compressed();
        let ctx = ChunkContext::new(chunk, root, DecodeOptions::default())?;

        // Payloads are never decoded here; the walk only counts records
        // per type from the envelopes.
        let mut counts: HashMap<usize, u64> = HashMap::new();
        let mut skipped_records = 0usize;
        for raw in ctx.raw_events() {
            match raw {
                Ok(raw) => *counts.entry(raw.type_index).or_insert(0) += 1,
                Err(_) => skipped_records += 1,
            }
        }
        let event_count: u64 = counts.values().sum();

        let mut top_events: Vec<EventTypeCount> = counts
            .into_iter()
            .map(|(type_index, count)| EventTypeCount {
                name: match ctx.types().by_index(type_index) {
                    Some(descriptor) => descriptor.name.to_string(),
                    None => format!("type#{type_index}"),
                },
                count,
            })
            .collect();
        top_events.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        top_events.truncate(TOP_EVENT_TYPES);

        Ok(ChunkReport {
            index,
            offset,
            size: header.chunk_size,
            major: header.major,
            minor: header.minor,
            compressed,
            start_nanos: header.start_nanos,
            duration_nanos: header.duration_nanos,
            ticks_per_second: header.ticks_per_second,
            type_count: ctx.types().len(),
            checkpoint_count: ctx.pools().checkpoint_count(),
            pool_count: ctx.pools().pool_count(),
            constant_count: ctx.pools().entry_count(),
            event_count,
            skipped_records,
            top_events,
        })
    }
}

impl std::fmt::Display for RecordingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== PARFLIGHT INSPECTOR REPORT ===")?;
        writeln!(f, "File size:   {} bytes", self.file_size)?;
        writeln!(f, "Chunks:      {}", self.chunks.len())?;
        writeln!(f)?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            chunk.fmt_tree(f, i == self.chunks.len() - 1)?;
        }
        Ok(())
    }
}

impl ChunkReport {
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>, is_last: bool) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let codec = if self.compressed { "compressed" } else { "plain" };

        writeln!(
            f,
            "{}chunk {} @ {} | v{}.{} | {} | {} types | {} pools ({} constants) | {} events",
            connector,
            self.index,
            self.offset,
            self.major,
            self.minor,
            codec,
            self.type_count,
            self.pool_count,
            self.constant_count,
            self.event_count,
        )?;
        if self.skipped_records > 0 {
            writeln!(f, "{}!   {} unreadable records", child_prefix, self.skipped_records)?;
        }
        for (i, top) in self.top_events.iter().enumerate() {
            let is_last_child = i == self.top_events.len() - 1;
            let leaf = if is_last_child { "└── " } else { "├── " };
            writeln!(f, "{}{}{} ({})", child_prefix, leaf, top.name, top.count)?;
        }
        Ok(())
    }
}
