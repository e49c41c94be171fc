//! Constant pools: checkpoint indexing and memoized entry resolution.
//!
//! Events do not inline heavyweight values (stack traces, class names,
//! thread descriptions); they store varint keys into per-type constant
//! pools, written as checkpoint events inside the chunk. This module walks
//! the checkpoint chain once, recording where each entry's bytes live, and
//! decodes entries on demand after that.
//!
//! Two constraints shape the design. Entries may reference entries that a
//! later checkpoint defines, so values cannot be decoded while indexing;
//! the first pass skips them structurally and stores offsets only. And
//! entries may reference each other, legitimately in chains and
//! illegitimately in cycles, so resolution is memoized and carries an
//! in-progress set that turns a cycle into [`ParflightError::ConstantPoolCycle`]
//! instead of unbounded recursion.
//!
//! Resolution state lives behind `RefCell`: a chunk is decoded by exactly
//! one thread, so interior mutability needs no locking here.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::debug;

use crate::bytes::ByteReader;
use crate::context::ChunkContext;
use crate::deserializer::{self, MAX_DECODE_DEPTH};
use crate::error::{ParflightError, Result};
use crate::format::EVENT_TYPE_CHECKPOINT;
use crate::metadata::TypePool;
use crate::value::Value;

/// The indexed constant pools of one chunk.
///
/// Built by [`parse`](Self::parse) from the checkpoint chain; empty for
/// chunks whose header declares no pool section.
#[derive(Debug, Default)]
pub struct ConstantPools {
    /// `(type id, entry key)` to the entry's value position in the chunk
    /// body.
    index: HashMap<(i64, i64), usize>,
    cache: RefCell<HashMap<(i64, i64), Value>>,
    resolving: RefCell<HashSet<(i64, i64)>>,
    checkpoints: usize,
}

impl ConstantPools {
    /// Indexes every checkpoint event reachable from `start`.
    ///
    /// `body` is the chunk body image and `base` its absolute offset, used
    /// for diagnostics. Values are skipped structurally, never decoded;
    /// only `(type, key) -> position` lands in the index. When the same key
    /// is written twice the later checkpoint in chain order wins.
    pub(crate) fn parse(
        body: &[u8],
        base: u64,
        start: usize,
        types: &TypePool,
    ) -> Result<Self> {
        let mut index = HashMap::new();
        let mut checkpoints = 0usize;
        let mut visited = HashSet::new();
        let mut reader = ByteReader::with_base(body, base);

        let mut at = start;
        loop {
            if !visited.insert(at) {
                // The delta chain came back to an event already indexed.
                return Err(ParflightError::InvalidCheckpoint {
                    offset: base + at as u64,
                });
            }
            reader.seek(at)?;
            let event_at = reader.absolute_position();
            let size = reader.read_varuint()?;
            if size == 0 || size > (body.len() - at) as u64 {
                return Err(ParflightError::InvalidCheckpoint { offset: event_at });
            }
            let type_id = reader.read_varint()?;
            if type_id != EVENT_TYPE_CHECKPOINT {
                return Err(ParflightError::InvalidCheckpoint { offset: event_at });
            }
            let _start_time = reader.read_varint()?;
            let _duration = reader.read_varint()?;
            let delta = reader.read_varint()?;

            let bound = reader.remaining() as u64;
            let pool_count = reader.read_varuint_len(bound)?;
            for _ in 0..pool_count {
                let pool_type = reader.read_varint()?;
                let bound = reader.remaining() as u64;
                let entry_count = reader.read_varuint_len(bound)?;
                for _ in 0..entry_count {
                    let key = reader.read_varint()?;
                    let value_at = reader.position();
                    deserializer::skip_value(types, pool_type, &mut reader, 0)?;
                    index.insert((pool_type, key), value_at);
                }
            }
            if (reader.position() - at) as u64 > size {
                // Pool data ran past the event's own envelope.
                return Err(ParflightError::InvalidCheckpoint { offset: event_at });
            }
            checkpoints += 1;

            if delta == 0 {
                break;
            }
            at = (at as i64)
                .checked_add(delta)
                .and_then(|next| usize::try_from(next).ok())
                .filter(|&next| next < body.len())
                .ok_or(ParflightError::InvalidCheckpoint { offset: event_at })?;
        }

        debug!(
            "indexed {} constant-pool entries across {} checkpoints",
            index.len(),
            checkpoints
        );
        Ok(Self {
            index,
            cache: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
            checkpoints,
        })
    }

    /// Resolves one pool entry to its decoded value.
    ///
    /// Memoized: a given `(type, key)` decodes at most once per chunk and
    /// every later resolution returns a clone of the same value. A key with
    /// no entry resolves to [`Value::Null`] when it is `0` (the recorder's
    /// null sentinel) and fails with
    /// [`ParflightError::UnresolvedConstant`] otherwise.
    pub(crate) fn resolve(
        &self,
        ctx: &ChunkContext<'_>,
        type_id: i64,
        key: i64,
        depth: usize,
    ) -> Result<Value> {
        if let Some(value) = self.cache.borrow().get(&(type_id, key)) {
            return Ok(value.clone());
        }
        let Some(&position) = self.index.get(&(type_id, key)) else {
            if key == 0 {
                return Ok(Value::Null);
            }
            return Err(ParflightError::UnresolvedConstant {
                type_id,
                index: key,
            });
        };
        if depth >= MAX_DECODE_DEPTH {
            let type_name = ctx.types().resolve(type_id)?.name.to_string();
            return Err(ParflightError::TypeTreeCycle { type_name });
        }
        if !self.resolving.borrow_mut().insert((type_id, key)) {
            return Err(ParflightError::ConstantPoolCycle {
                type_id,
                index: key,
            });
        }
        // No RefCell borrow may be held here: decoding the entry can
        // re-enter resolve() for the entries it references.
        let result = self.decode_entry(ctx, type_id, position, depth);
        self.resolving.borrow_mut().remove(&(type_id, key));
        let value = result?;
        self.cache
            .borrow_mut()
            .insert((type_id, key), value.clone());
        Ok(value)
    }

    fn decode_entry(
        &self,
        ctx: &ChunkContext<'_>,
        type_id: i64,
        position: usize,
        depth: usize,
    ) -> Result<Value> {
        let mut reader = ctx.body_reader();
        reader.seek(position)?;
        deserializer::decode_value(ctx, type_id, &mut reader, depth + 1)
    }

    /// Whether an explicit entry exists for `(type, key)`.
    pub fn contains(&self, type_id: i64, key: i64) -> bool {
        self.index.contains_key(&(type_id, key))
    }

    /// Total number of indexed entries.
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct types that own a pool.
    pub fn pool_count(&self) -> usize {
        self.index
            .keys()
            .map(|(type_id, _)| *type_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of checkpoint events indexed.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints
    }
}
