//! Parser contexts.
//!
//! Decoding state lives on two levels. A [`RootContext`] spans the whole
//! recording and owns what is safe to share between chunks: the compiled
//! decode plans, keyed by structural shape rather than by chunk-local ids.
//! A [`ChunkContext`] is built per chunk and owns everything that is not:
//! the decompressed body, the chunk's own type declarations, and its
//! constant pools.
//!
//! Contexts inherit downward. Every `ChunkContext` holds an `Arc` to the
//! root, so a plan compiled while decoding one chunk is found ready by the
//! next chunk with the same event shape, whichever thread decodes it.
//!
//! ```no_run
//! use parflight::{ChunkContext, Recording, RootContext};
//! use std::sync::Arc;
//!
//! let recording = Recording::open("profile.jfr")?;
//! let root = Arc::new(RootContext::new());
//! for chunk in recording.chunks() {
//!     let ctx = ChunkContext::new(chunk?, root.clone(), Default::default())?;
//!     for event in ctx.events() {
//!         let event = event?;
//!         println!("{} at {}", event.type_name(), event.offset());
//!     }
//! }
//! # Ok::<(), parflight::ParflightError>(())
//! ```

use std::any::TypeId;
use std::borrow::Cow;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::bytes::ByteReader;
use crate::deserializer::{self, DecodeOptions, DecodeTier, EAGER_FIELD_LIMIT};
use crate::error::{ParflightError, Result};
use crate::event::{Control, DecodedEvent, EventIter, Events, RawEvent, TypedEvents};
use crate::format::CHUNK_HEADER_SIZE;
use crate::metadata::{ChunkMetadata, TypeDescriptor, TypePool};
use crate::plan::{DecodePlan, PlanCache, ShapeKey, TypedPlan};
use crate::pool::ConstantPools;
use crate::reader::Chunk;
use crate::rt::{EventShape, SlotBuffer};
use crate::value::Value;

/// Recording-wide decode state, shared by every chunk context.
///
/// Cheap to create and internally synchronized; clone the `Arc` it lives
/// in, not the context itself. Dropping all chunk contexts and keeping the
/// root preserves the compiled plans for the next pass over the file.
#[derive(Debug, Default)]
pub struct RootContext {
    plans: PlanCache,
}

impl RootContext {
    /// Creates an empty root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared plan cache.
    pub fn plan_cache(&self) -> &PlanCache {
        &self.plans
    }
}

/// Decode state for one chunk.
///
/// Building the context does all per-chunk preparation in one step: it
/// materializes the body (decompressing if needed), parses the embedded
/// metadata event into a [`TypePool`](crate::metadata::TypePool), and
/// indexes the checkpoint chain into [`ConstantPools`]. After that every
/// accessor is cheap and event iteration can start.
///
/// The context is single-threaded; parallelism happens one context per
/// chunk, never by sharing one context across threads.
pub struct ChunkContext<'a> {
    chunk: Chunk<'a>,
    body: Cow<'a, [u8]>,
    metadata: ChunkMetadata,
    pools: ConstantPools,
    root: Arc<RootContext>,
    options: DecodeOptions,
    /// One slot per declared type, memoizing the shape key and the plan
    /// adopted from the root cache. Index matches declaration order.
    plan_slots: Vec<OnceCell<(ShapeKey, Arc<DecodePlan>)>>,
    typed_plans: RefCell<HashMap<(usize, TypeId), Arc<TypedPlan>>>,
    /// Id this chunk declared for `java.lang.String`, when it did.
    string_type: Option<i64>,
}

impl<'a> ChunkContext<'a> {
    /// Builds the decode context for `chunk`.
    ///
    /// Fails if the body cannot be materialized or the metadata event or
    /// checkpoint chain is malformed. Errors carry the chunk index.
    pub fn new(chunk: Chunk<'a>, root: Arc<RootContext>, options: DecodeOptions) -> Result<Self> {
        let index = chunk.index();
        Self::build(chunk, root, options).map_err(|err| err.at_chunk(index))
    }

    fn build(chunk: Chunk<'a>, root: Arc<RootContext>, options: DecodeOptions) -> Result<Self> {
        let header = *chunk.header();
        let body = chunk.body()?;
        let base = chunk.offset() + CHUNK_HEADER_SIZE;
        // Header offsets address the logical image, which for a compressed
        // chunk is longer than its stored bytes.
        let body_len = body.len() as u64;

        let meta = header.metadata_offset;
        if meta < CHUNK_HEADER_SIZE || meta - CHUNK_HEADER_SIZE >= body_len {
            return Err(ParflightError::InvalidMetadataEvent {
                offset: chunk.offset() + meta,
            });
        }
        let mut reader = ByteReader::with_base(&body, base);
        reader.seek((meta - CHUNK_HEADER_SIZE) as usize)?;
        let metadata = ChunkMetadata::parse(&mut reader)?;

        let pools = match header.constant_pool_offset {
            0 => ConstantPools::default(),
            cp if cp < CHUNK_HEADER_SIZE || cp - CHUNK_HEADER_SIZE >= body_len => {
                return Err(ParflightError::InvalidCheckpoint {
                    offset: chunk.offset() + cp,
                });
            }
            cp => ConstantPools::parse(
                &body,
                base,
                (cp - CHUNK_HEADER_SIZE) as usize,
                metadata.types(),
            )?,
        };

        let string_type = metadata.types().id_of("java.lang.String");
        let plan_slots = (0..metadata.types().len()).map(|_| OnceCell::new()).collect();
        debug!(
            "chunk {}: {} types, {} constants in {} pools",
            chunk.index(),
            metadata.types().len(),
            pools.entry_count(),
            pools.pool_count(),
        );

        Ok(Self {
            chunk,
            body,
            metadata,
            pools,
            root,
            options,
            plan_slots,
            typed_plans: RefCell::new(HashMap::new()),
            string_type,
        })
    }

    /// The chunk this context decodes.
    pub fn chunk(&self) -> &Chunk<'a> {
        &self.chunk
    }

    /// Zero-based index of the chunk within the recording.
    pub fn index(&self) -> usize {
        self.chunk.index()
    }

    /// The chunk's parsed metadata event.
    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    /// The chunk's type declarations.
    pub fn types(&self) -> &TypePool {
        self.metadata.types()
    }

    /// The chunk's constant pools.
    pub fn pools(&self) -> &ConstantPools {
        &self.pools
    }

    /// The options this context decodes with.
    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// The root context this chunk inherits from.
    pub fn root(&self) -> &Arc<RootContext> {
        &self.root
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    /// Absolute file offset of the first body byte.
    pub(crate) fn body_base(&self) -> u64 {
        self.chunk.offset() + CHUNK_HEADER_SIZE
    }

    pub(crate) fn body_reader(&self) -> ByteReader<'_> {
        ByteReader::with_base(&self.body, self.body_base())
    }

    pub(crate) fn payload_reader(&self, raw: &RawEvent) -> Result<ByteReader<'_>> {
        self.body_reader().slice(raw.payload.start, raw.payload.len())
    }

    /// Id of `java.lang.String` in this chunk.
    ///
    /// Only reachable while decoding a string constant, which implies the
    /// chunk declared the type; a miss is a parser inconsistency.
    pub(crate) fn string_type_id(&self) -> Result<i64> {
        self.string_type.ok_or_else(|| {
            ParflightError::Internal(
                "string constant in a chunk that declares no java.lang.String type".into(),
            )
        })
    }

    /// Maps a pool type name from a shared plan back to this chunk's id.
    ///
    /// Shape keys cover pool target names, so any chunk that matched the
    /// plan's shape declares the type; a miss is a parser inconsistency.
    pub(crate) fn pool_type_id(&self, name: &str) -> Result<i64> {
        self.types().id_of(name).ok_or_else(|| {
            ParflightError::Internal(format!("pool type {name} is not declared by this chunk"))
        })
    }

    /// Resolves one constant-pool reference.
    ///
    /// The escape hatch for callers that decode with
    /// [`resolve_pool_refs`](DecodeOptions::resolve_pool_refs) off and later
    /// chase a [`Value::PoolRef`] by hand.
    pub fn resolve_constant(&self, type_id: i64, index: i64) -> Result<Value> {
        self.pools.resolve(self, type_id, index, 0)
    }

    /// The decode plan for the type at `slot`, adopted from the root cache.
    ///
    /// The first call per type computes the shape key and compiles or
    /// fetches the plan; later calls hit the per-chunk memo.
    fn plan_entry(&self, slot: usize, type_id: i64) -> Result<&(ShapeKey, Arc<DecodePlan>)> {
        let cell = self
            .plan_slots
            .get(slot)
            .ok_or(ParflightError::UnknownTypeId { id: type_id })?;
        if let Some(entry) = cell.get() {
            return Ok(entry);
        }
        let key = ShapeKey::of_type(self.types(), type_id)?;
        let plan = self
            .root
            .plan_cache()
            .get_or_compile(&key, || DecodePlan::compile(self.types(), type_id))?;
        Ok(cell.get_or_init(|| (key, plan)))
    }

    pub(crate) fn plan_for(&self, slot: usize, type_id: i64) -> Result<Arc<DecodePlan>> {
        Ok(self.plan_entry(slot, type_id)?.1.clone())
    }

    fn typed_plan_for<T>(&self, raw: &RawEvent) -> Result<Arc<TypedPlan>>
    where
        T: EventShape + 'static,
    {
        let key = (raw.type_index, TypeId::of::<T>());
        if let Some(plan) = self.typed_plans.borrow().get(&key) {
            return Ok(plan.clone());
        }
        let entry = self.plan_entry(raw.type_index, raw.type_id)?;
        let plan = self
            .root
            .plan_cache()
            .get_or_compile_typed(&entry.0, TypeId::of::<T>(), || {
                TypedPlan::compile(entry.1.clone(), T::STRUCT_NAME, T::FIELDS)
            })?;
        self.typed_plans.borrow_mut().insert(key, plan.clone());
        Ok(plan)
    }

    /// Iterates the chunk's raw event records without decoding payloads.
    pub fn raw_events(&self) -> EventIter<'_, 'a> {
        EventIter::new(self)
    }

    /// Iterates the chunk's events, decoding per the configured tier.
    pub fn events(&self) -> Events<'_, 'a> {
        Events::new(self)
    }

    /// Iterates events whose type name matches `T::EVENT_NAME`, decoded
    /// straight into `T`. Other records are skipped without decoding.
    pub fn typed_events<T>(&self) -> TypedEvents<'_, 'a, T>
    where
        T: EventShape + 'static,
    {
        TypedEvents::new(self)
    }

    /// Decodes one located event per the configured tier.
    ///
    /// Whether the returned event is materialized or deferred is a
    /// performance property; the accessors on [`DecodedEvent`] behave the
    /// same either way.
    pub fn decode_event(&self, raw: &RawEvent) -> Result<DecodedEvent<'_, 'a>> {
        let descriptor = self
            .types()
            .by_index(raw.type_index)
            .ok_or(ParflightError::UnknownTypeId { id: raw.type_id })?;
        let type_name = descriptor.name.clone();

        match self.options.tier {
            DecodeTier::Eager => {
                let value = self.decode_now(raw, &type_name, None)?;
                Ok(DecodedEvent::materialized(self, raw, type_name, value))
            }
            DecodeTier::Lazy => Ok(DecodedEvent::deferred(self, raw, type_name, None)),
            DecodeTier::Auto => {
                // Plans only exist for composites; bare values and
                // malformed field lists go through the generic walker so
                // every tier surfaces the same result.
                if descriptor.primitive().is_some() || descriptor.fields.is_empty() {
                    let value = self.decode_now(raw, &type_name, None)?;
                    return Ok(DecodedEvent::materialized(self, raw, type_name, value));
                }
                let plan = self.plan_for(raw.type_index, raw.type_id)?;
                if plan.field_count() <= EAGER_FIELD_LIMIT {
                    let value = self.decode_now(raw, &type_name, Some(&plan))?;
                    Ok(DecodedEvent::materialized(self, raw, type_name, value))
                } else {
                    Ok(DecodedEvent::deferred(self, raw, type_name, Some(plan)))
                }
            }
        }
    }

    fn decode_now(
        &self,
        raw: &RawEvent,
        type_name: &Arc<str>,
        plan: Option<&DecodePlan>,
    ) -> Result<Value> {
        let offset = self.body_base() + raw.start as u64;
        let mut reader = self
            .payload_reader(raw)
            .map_err(|err| err.in_event(type_name, offset))?;
        let decoded = match plan {
            Some(plan) => deserializer::decode_with_plan(self, plan, &mut reader),
            None => deserializer::decode_value(self, raw.type_id, &mut reader, 0),
        };
        decoded.map_err(|err| err.in_event(type_name, offset))
    }

    /// Decodes one located event straight into `T`, skipping every field
    /// the struct does not ask for.
    ///
    /// Matching is structural: any record whose shape carries the fields
    /// `T` names decodes, regardless of its type name. Use
    /// [`typed_events`](ChunkContext::typed_events) to filter by name.
    pub fn decode_typed<T>(&self, raw: &RawEvent) -> Result<T>
    where
        T: EventShape + 'static,
    {
        let plan = self.typed_plan_for::<T>(raw)?;
        let offset = self.body_base() + raw.start as u64;
        let mut reader = self
            .payload_reader(raw)
            .map_err(|err| err.in_event(plan.base().type_name(), offset))?;
        let mut slots = SlotBuffer::new(plan.slot_count());
        deserializer::decode_typed_slots(self, &plan, &mut reader, &mut slots)
            .and_then(|()| T::from_slots(&mut slots))
            .map_err(|err| err.in_event(plan.base().type_name(), offset))
    }

    /// Drives `handler` over every event in the chunk.
    ///
    /// The handler sees the event's type descriptor alongside the decoded
    /// event and steers iteration through [`Control`]. Returns
    /// [`Control::Stop`] when the handler stopped early, otherwise
    /// [`Control::Continue`] at end of chunk.
    pub fn each_event<F>(&self, mut handler: F) -> Result<Control>
    where
        F: FnMut(&TypeDescriptor, &DecodedEvent<'_, 'a>) -> Control,
    {
        for raw in self.raw_events() {
            let raw = raw?;
            let event = self.decode_event(&raw)?;
            let descriptor = self
                .types()
                .by_index(raw.type_index)
                .ok_or(ParflightError::UnknownTypeId { id: raw.type_id })?;
            if handler(descriptor, &event) == Control::Stop {
                return Ok(Control::Stop);
            }
        }
        Ok(Control::Continue)
    }
}
