//! Event iteration over a chunk body.
//!
//! Every record in a chunk body shares one envelope: a varint total size
//! (which counts its own bytes), a varint type id, then the payload. The
//! iterator walks these envelopes, skips the two service records (metadata
//! and checkpoint events, which the chunk context has already consumed),
//! and yields a [`RawEvent`] per remaining record.
//!
//! A corrupt size varint poisons the rest of the chunk, because the next
//! record boundary can no longer be trusted. An unknown type id does not:
//! the envelope still says where the record ends, so iteration reports the
//! error and resumes at the next record.

use std::cell::OnceCell;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use crate::bytes::ByteReader;
use crate::context::ChunkContext;
use crate::deserializer;
use crate::error::{ParflightError, Result};
use crate::format::{EVENT_TYPE_CHECKPOINT, EVENT_TYPE_METADATA};
use crate::plan::DecodePlan;
use crate::rt::EventShape;
use crate::value::Value;

/// Handler verdict for callback-driven iteration.
///
/// Returned by the closures passed to [`ChunkContext::each_event`] and the
/// recording-level drivers to decide whether iteration keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    /// Keep delivering events.
    #[default]
    Continue,
    /// Stop after this event. Not an error.
    Stop,
}

/// One event record located in a chunk body, not yet decoded.
///
/// Holds the record's position and type, nothing else. Feed it to
/// [`ChunkContext::decode_event`] or [`ChunkContext::decode_typed`] to read
/// the payload.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Offset of the size varint within the chunk body.
    pub(crate) start: usize,
    /// Payload bytes within the chunk body, envelope excluded.
    pub(crate) payload: Range<usize>,
    pub(crate) type_id: i64,
    /// Index of the event's type in the chunk's declaration order.
    pub(crate) type_index: usize,
}

impl RawEvent {
    /// Chunk-local type id of this event.
    pub fn type_id(&self) -> i64 {
        self.type_id
    }

    /// Total record size in bytes, envelope included.
    pub fn size(&self) -> usize {
        self.payload.end - self.start
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Iterator over the raw event records of one chunk.
///
/// Created by [`ChunkContext::raw_events`]. Yields `Result<RawEvent>`;
/// see the module docs for which errors end iteration and which do not.
pub struct EventIter<'c, 'a> {
    ctx: &'c ChunkContext<'a>,
    body: &'c [u8],
    base: u64,
    position: usize,
    done: bool,
}

impl<'c, 'a> EventIter<'c, 'a> {
    pub(crate) fn new(ctx: &'c ChunkContext<'a>) -> Self {
        Self {
            ctx,
            body: ctx.body(),
            base: ctx.body_base(),
            position: 0,
            done: false,
        }
    }

    pub(crate) fn ctx(&self) -> &'c ChunkContext<'a> {
        self.ctx
    }
}

impl<'c, 'a> Iterator for EventIter<'c, 'a> {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.position >= self.body.len() {
                return None;
            }
            let start = self.position;
            let rest = &self.body[start..];
            let mut reader = ByteReader::with_base(rest, self.base + start as u64);
            let at = reader.absolute_position();

            let size = match reader.read_varuint() {
                Ok(size) => size,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if size == 0 || size > rest.len() as u64 {
                self.done = true;
                return Some(Err(ParflightError::InconsistentEventSize {
                    offset: at,
                    declared: size,
                }));
            }
            let size = size as usize;

            let type_id = match reader.read_varint() {
                Ok(id) => id,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if reader.position() > size {
                // The envelope varints alone overrun the declared size.
                self.done = true;
                return Some(Err(ParflightError::InconsistentEventSize {
                    offset: at,
                    declared: size as u64,
                }));
            }

            let payload = start + reader.position()..start + size;
            self.position = start + size;

            if type_id == EVENT_TYPE_METADATA || type_id == EVENT_TYPE_CHECKPOINT {
                continue;
            }
            return match self.ctx.types().index_of(type_id) {
                Some(type_index) => Some(Ok(RawEvent {
                    start,
                    payload,
                    type_id,
                    type_index,
                })),
                // Recoverable: the envelope told us where the next record
                // starts, so the iterator has already moved past this one.
                None => Some(Err(ParflightError::UnknownTypeId { id: type_id })),
            };
        }
    }
}

/// One decoded (or decodable) event.
///
/// Depending on the [decode tier](crate::DecodeTier), the value is either
/// materialized up front or produced on first access to [`value`] or
/// [`field`] and memoized from then on. Either way the accessors behave the
/// same; the tier only moves where the decode work happens.
///
/// [`value`]: DecodedEvent::value
/// [`field`]: DecodedEvent::field
pub struct DecodedEvent<'c, 'a> {
    ctx: &'c ChunkContext<'a>,
    type_id: i64,
    type_name: Arc<str>,
    /// File offset of the record's size varint.
    offset: u64,
    payload: Range<usize>,
    /// Compiled plan to decode with, when one was chosen for this shape.
    plan: Option<Arc<DecodePlan>>,
    cell: OnceCell<Value>,
}

impl<'c, 'a> DecodedEvent<'c, 'a> {
    pub(crate) fn materialized(
        ctx: &'c ChunkContext<'a>,
        raw: &RawEvent,
        type_name: Arc<str>,
        value: Value,
    ) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(value);
        Self {
            ctx,
            type_id: raw.type_id,
            type_name,
            offset: ctx.body_base() + raw.start as u64,
            payload: raw.payload.clone(),
            plan: None,
            cell,
        }
    }

    pub(crate) fn deferred(
        ctx: &'c ChunkContext<'a>,
        raw: &RawEvent,
        type_name: Arc<str>,
        plan: Option<Arc<DecodePlan>>,
    ) -> Self {
        Self {
            ctx,
            type_id: raw.type_id,
            type_name,
            offset: ctx.body_base() + raw.start as u64,
            payload: raw.payload.clone(),
            plan,
            cell: OnceCell::new(),
        }
    }

    /// Fully qualified name of the event's type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Chunk-local type id of the event.
    pub fn type_id(&self) -> i64 {
        self.type_id
    }

    /// File offset where the event record starts.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the payload has been decoded yet.
    ///
    /// Purely observational. [`value`](DecodedEvent::value) decodes on
    /// demand either way.
    pub fn is_materialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The decoded payload, decoding it now if this event was deferred.
    ///
    /// The result is memoized, so repeated calls decode at most once.
    pub fn value(&self) -> Result<&Value> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let value = self.decode()?;
        Ok(self.cell.get_or_init(|| value))
    }

    /// Looks up a top-level field of the payload by name.
    ///
    /// Returns `Ok(None)` when the payload has no such field or is not an
    /// object (primitive-typed events decode to bare values).
    pub fn field(&self, name: &str) -> Result<Option<&Value>> {
        Ok(self.value()?.field(name))
    }

    /// Consumes the event and returns the decoded payload by value.
    pub fn into_value(self) -> Result<Value> {
        self.value()?;
        self.cell
            .into_inner()
            .ok_or_else(|| ParflightError::Internal("memoized event value vanished".into()))
    }

    fn decode(&self) -> Result<Value> {
        let mut reader = match self
            .ctx
            .body_reader()
            .slice(self.payload.start, self.payload.len())
        {
            Ok(reader) => reader,
            Err(err) => return Err(err.in_event(&self.type_name, self.offset)),
        };
        let decoded = match &self.plan {
            Some(plan) => deserializer::decode_with_plan(self.ctx, plan, &mut reader),
            None => deserializer::decode_value(self.ctx, self.type_id, &mut reader, 0),
        };
        decoded.map_err(|err| err.in_event(&self.type_name, self.offset))
    }
}

impl std::fmt::Debug for DecodedEvent<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedEvent")
            .field("type_name", &self.type_name)
            .field("type_id", &self.type_id)
            .field("offset", &self.offset)
            .field("materialized", &self.is_materialized())
            .finish_non_exhaustive()
    }
}

/// Iterator over decoded events, created by [`ChunkContext::events`].
pub struct Events<'c, 'a> {
    iter: EventIter<'c, 'a>,
}

impl<'c, 'a> Events<'c, 'a> {
    pub(crate) fn new(ctx: &'c ChunkContext<'a>) -> Self {
        Self {
            iter: EventIter::new(ctx),
        }
    }
}

impl<'c, 'a> Iterator for Events<'c, 'a> {
    type Item = Result<DecodedEvent<'c, 'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.iter.next()? {
            Ok(raw) => raw,
            Err(err) => return Some(Err(err)),
        };
        Some(self.iter.ctx().decode_event(&raw))
    }
}

/// Iterator over events of one named type, decoded straight into `T`.
///
/// Created by [`ChunkContext::typed_events`]. Records whose type name does
/// not match [`EventShape::EVENT_NAME`] are skipped without decoding.
pub struct TypedEvents<'c, 'a, T> {
    iter: EventIter<'c, 'a>,
    _marker: PhantomData<fn() -> T>,
}

impl<'c, 'a, T> TypedEvents<'c, 'a, T> {
    pub(crate) fn new(ctx: &'c ChunkContext<'a>) -> Self {
        Self {
            iter: EventIter::new(ctx),
            _marker: PhantomData,
        }
    }
}

impl<T> Iterator for TypedEvents<'_, '_, T>
where
    T: EventShape + 'static,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.iter.next()? {
                Ok(raw) => raw,
                Err(err) => return Some(Err(err)),
            };
            let Some(descriptor) = self.iter.ctx().types().by_index(raw.type_index) else {
                continue;
            };
            if &*descriptor.name != T::EVENT_NAME {
                continue;
            }
            return Some(self.iter.ctx().decode_typed::<T>(&raw));
        }
    }
}
