//! Event-payload decoding, in three tiers.
//!
//! Every event payload is a flat concatenation of field values laid out by
//! the chunk's type descriptors. This module turns those bytes into
//! [`Value`] trees, by one of three strategies:
//!
//! - [`DecodeTier::Eager`] walks the descriptor tree for every event and
//!   materializes the value at decode time. No setup cost, no sharing; the
//!   baseline the other tiers are measured against.
//! - [`DecodeTier::Lazy`] captures the payload range and walks the
//!   descriptors on first field access instead.
//! - [`DecodeTier::Auto`] (the default) executes a [`DecodePlan`] compiled
//!   once per shape and reused across events, chunks, and worker threads.
//!   Narrow events (at most [`EAGER_FIELD_LIMIT`] fields) materialize at
//!   decode time; wider ones defer like `Lazy`, since for them the deferral
//!   bookkeeping is cheaper than decoding fields nobody reads.
//!
//! All three produce identical values for the same bytes; the tier is a
//! performance policy. Constant-pool references resolve through the chunk's
//! pools by default; with [`DecodeOptions::resolve_pool_refs`] cleared they
//! stay symbolic as [`Value::PoolRef`].
//!
//! Decoding is bounded: nesting beyond [`MAX_DECODE_DEPTH`] fails instead
//! of recursing, so a self-referential type declaration cannot overflow the
//! stack.

use std::sync::Arc;

use crate::bytes::{ByteReader, StringValue};
use crate::context::ChunkContext;
use crate::error::{ParflightError, Result};
use crate::metadata::{FieldDescriptor, Primitive, TypePool};
use crate::plan::{DecodePlan, PlanField, PlanOp, TypedPlan};
use crate::rt::SlotBuffer;
use crate::value::{EventObject, Value};

/// Maximum nesting depth of a single value decode.
///
/// Counts composite nesting and constant-pool hops together. Recorded data
/// is a handful of levels deep; the limit exists so that a hostile type
/// declaration fails with [`ParflightError::TypeTreeCycle`] instead of
/// exhausting the stack.
pub const MAX_DECODE_DEPTH: usize = 64;

/// Field count at or below which [`DecodeTier::Auto`] materializes at
/// decode time instead of deferring.
pub(crate) const EAGER_FIELD_LIMIT: usize = 16;

/// Strategy used to decode event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeTier {
    /// Walk the type descriptors and materialize every event at decode time.
    Eager,
    /// Capture payload ranges and decode on first access.
    Lazy,
    /// Execute compiled, shape-cached decode plans; materialize narrow
    /// events immediately and defer wide ones.
    #[default]
    Auto,
}

/// Per-decode configuration.
///
/// ## Examples
///
/// ```rust
/// use parflight::{DecodeOptions, DecodeTier};
///
/// let opts = DecodeOptions {
///     tier: DecodeTier::Eager,
///     ..DecodeOptions::default()
/// };
/// assert!(opts.resolve_pool_refs);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decoding strategy.
    pub tier: DecodeTier,
    /// Resolve constant-pool references into their values. When `false`,
    /// references decode as [`Value::PoolRef`] and can be resolved later
    /// through the chunk context.
    pub resolve_pool_refs: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            tier: DecodeTier::default(),
            resolve_pool_refs: true,
        }
    }
}

/// Decodes one value of `type_id` by walking its descriptor.
///
/// The eager path, also used to materialize constant-pool entries. `depth`
/// counts nesting from the payload root.
pub(crate) fn decode_value(
    ctx: &ChunkContext<'_>,
    type_id: i64,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    let descriptor = ctx.types().resolve(type_id)?;
    if depth >= MAX_DECODE_DEPTH {
        return Err(ParflightError::TypeTreeCycle {
            type_name: descriptor.name.to_string(),
        });
    }
    if let Some(primitive) = descriptor.primitive() {
        return decode_primitive(ctx, primitive, reader, depth);
    }
    if descriptor.fields.is_empty() {
        return Err(ParflightError::UnknownPrimitiveType {
            name: descriptor.name.to_string(),
        });
    }
    let mut fields = Vec::with_capacity(descriptor.fields.len());
    for field in &descriptor.fields {
        fields.push((field.name.clone(), decode_field(ctx, field, reader, depth)?));
    }
    Ok(Value::Object(EventObject::new(
        descriptor.name.clone(),
        fields,
    )))
}

fn decode_field(
    ctx: &ChunkContext<'_>,
    field: &FieldDescriptor,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    if field.array {
        let bound = reader.remaining() as u64;
        let count = reader.read_varuint_len(bound)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(decode_field_scalar(ctx, field, reader, depth)?);
        }
        return Ok(Value::List(items));
    }
    decode_field_scalar(ctx, field, reader, depth)
}

fn decode_field_scalar(
    ctx: &ChunkContext<'_>,
    field: &FieldDescriptor,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    if field.constant_pool {
        // The payload holds a key into the pool of the field's type.
        let key = reader.read_varint()?;
        return pool_value(ctx, field.type_id, key, depth);
    }
    decode_value(ctx, field.type_id, reader, depth + 1)
}

/// Decodes one wire primitive.
pub(crate) fn decode_primitive(
    ctx: &ChunkContext<'_>,
    primitive: Primitive,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    match primitive {
        Primitive::Byte => Ok(Value::Int(i64::from(reader.read_i8()?))),
        Primitive::Char => Ok(Value::Int(reader.read_varuint()? as i64)),
        Primitive::Short | Primitive::Int | Primitive::Long => {
            Ok(Value::Int(reader.read_varint()?))
        }
        Primitive::Float => Ok(Value::Float(f64::from(reader.read_f32()?))),
        Primitive::Double => Ok(Value::Float(reader.read_f64()?)),
        Primitive::Boolean => Ok(Value::Boolean(reader.read_u8()? != 0)),
        Primitive::String => decode_string(ctx, reader, depth),
    }
}

/// Decodes a string value, chasing a pool reference if the wire says so.
fn decode_string(
    ctx: &ChunkContext<'_>,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    match reader.read_string()? {
        StringValue::Null => Ok(Value::Null),
        StringValue::Empty => Ok(Value::String(Arc::from(""))),
        StringValue::Literal(s) => Ok(Value::String(Arc::from(s.as_ref()))),
        StringValue::PoolIndex(key) => {
            let type_id = ctx.string_type_id()?;
            pool_value(ctx, type_id, key, depth)
        }
    }
}

/// Resolves a constant-pool reference, or defers it per the options.
fn pool_value(ctx: &ChunkContext<'_>, type_id: i64, key: i64, depth: usize) -> Result<Value> {
    if !ctx.options().resolve_pool_refs {
        return Ok(Value::PoolRef {
            type_id,
            index: key,
        });
    }
    ctx.pools().resolve(ctx, type_id, key, depth)
}

/// Decodes one composite payload by executing a compiled plan.
pub(crate) fn decode_with_plan(
    ctx: &ChunkContext<'_>,
    plan: &DecodePlan,
    reader: &mut ByteReader<'_>,
) -> Result<Value> {
    decode_plan_object(ctx, plan, reader, 0)
}

fn decode_plan_object(
    ctx: &ChunkContext<'_>,
    plan: &DecodePlan,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    let mut fields = Vec::with_capacity(plan.field_count());
    for field in plan.fields() {
        fields.push((
            field.name.clone(),
            decode_plan_field(ctx, field, reader, depth)?,
        ));
    }
    Ok(Value::Object(EventObject::new(plan.name().clone(), fields)))
}

fn decode_plan_field(
    ctx: &ChunkContext<'_>,
    field: &PlanField,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    if field.array {
        let bound = reader.remaining() as u64;
        let count = reader.read_varuint_len(bound)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(decode_plan_scalar(ctx, &field.op, reader, depth)?);
        }
        return Ok(Value::List(items));
    }
    decode_plan_scalar(ctx, &field.op, reader, depth)
}

fn decode_plan_scalar(
    ctx: &ChunkContext<'_>,
    op: &PlanOp,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<Value> {
    match op {
        PlanOp::Primitive(p) => decode_primitive(ctx, *p, reader, depth),
        PlanOp::Pool { type_name } => {
            let key = reader.read_varint()?;
            // Plans carry names; ids are local to the executing chunk.
            let type_id = ctx.pool_type_id(type_name)?;
            pool_value(ctx, type_id, key, depth)
        }
        PlanOp::Nested(sub) => decode_plan_object(ctx, sub, reader, depth + 1),
    }
}

/// Executes a typed plan, filling `slots` with the wanted fields.
///
/// Unwanted fields are skipped, not decoded; the base plan still drives the
/// walk so the reader stays aligned with the payload. Pool references honor
/// [`DecodeOptions::resolve_pool_refs`] like every other path, so a struct
/// with concrete field types wants resolution left on.
pub(crate) fn decode_typed_slots(
    ctx: &ChunkContext<'_>,
    plan: &TypedPlan,
    reader: &mut ByteReader<'_>,
    slots: &mut SlotBuffer,
) -> Result<()> {
    for (index, field) in plan.base().fields().iter().enumerate() {
        match plan.slot_of(index) {
            Some(slot) => {
                let value = decode_plan_field(ctx, field, reader, 0)?;
                slots.set(slot, value);
            }
            None => skip_plan_field(field, reader)?,
        }
    }
    Ok(())
}

fn skip_plan_field(field: &PlanField, reader: &mut ByteReader<'_>) -> Result<()> {
    if field.array {
        let bound = reader.remaining() as u64;
        let count = reader.read_varuint_len(bound)?;
        for _ in 0..count {
            skip_plan_scalar(&field.op, reader)?;
        }
        return Ok(());
    }
    skip_plan_scalar(&field.op, reader)
}

fn skip_plan_scalar(op: &PlanOp, reader: &mut ByteReader<'_>) -> Result<()> {
    match op {
        PlanOp::Primitive(p) => skip_primitive(*p, reader),
        PlanOp::Pool { .. } => reader.read_varint().map(|_| ()),
        PlanOp::Nested(sub) => {
            for field in sub.fields() {
                skip_plan_field(field, reader)?;
            }
            Ok(())
        }
    }
}

/// Advances past one value of `type_id` without materializing anything.
///
/// Needs only the type pool, no chunk context: used while indexing constant
/// pools, before any value can be resolved.
pub(crate) fn skip_value(
    types: &TypePool,
    type_id: i64,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<()> {
    let descriptor = types.resolve(type_id)?;
    if depth >= MAX_DECODE_DEPTH {
        return Err(ParflightError::TypeTreeCycle {
            type_name: descriptor.name.to_string(),
        });
    }
    if let Some(primitive) = descriptor.primitive() {
        return skip_primitive(primitive, reader);
    }
    if descriptor.fields.is_empty() {
        return Err(ParflightError::UnknownPrimitiveType {
            name: descriptor.name.to_string(),
        });
    }
    for field in &descriptor.fields {
        if field.array {
            let bound = reader.remaining() as u64;
            let count = reader.read_varuint_len(bound)?;
            for _ in 0..count {
                skip_field_scalar(types, field, reader, depth)?;
            }
        } else {
            skip_field_scalar(types, field, reader, depth)?;
        }
    }
    Ok(())
}

fn skip_field_scalar(
    types: &TypePool,
    field: &FieldDescriptor,
    reader: &mut ByteReader<'_>,
    depth: usize,
) -> Result<()> {
    if field.constant_pool {
        return reader.read_varint().map(|_| ());
    }
    skip_value(types, field.type_id, reader, depth + 1)
}

/// Advances past one wire primitive.
pub(crate) fn skip_primitive(primitive: Primitive, reader: &mut ByteReader<'_>) -> Result<()> {
    match primitive {
        Primitive::Byte | Primitive::Boolean => reader.skip(1),
        Primitive::Char | Primitive::Short | Primitive::Int | Primitive::Long => {
            reader.read_varuint().map(|_| ())
        }
        Primitive::Float => reader.skip(4),
        Primitive::Double => reader.skip(8),
        Primitive::String => reader.skip_string(),
    }
}
