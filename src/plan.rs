//! Compiled decode plans and the shape-keyed plan cache.
//!
//! Walking a type descriptor for every event repeats the same dispatch
//! decisions millions of times. A [`DecodePlan`] hoists that work out of the
//! hot loop: one pass over the descriptor tree produces a flat list of field
//! operations the deserializer can execute without consulting metadata
//! again.
//!
//! Plans are cached by [`ShapeKey`], a canonical encoding of a type's
//! structure (field names, leaf kinds, array and pool flags, recursively).
//! Chunks re-declare their type systems from scratch, usually identically;
//! keying on structure instead of chunk-local ids lets later chunks and
//! parallel workers reuse the plan compiled for the first one.
//! The cache installs at most one plan per key: losers of a compile race
//! drop their candidate and adopt the winner's.

use std::any::TypeId;
use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use log::trace;
use twox_hash::XxHash64;

use crate::deserializer::MAX_DECODE_DEPTH;
use crate::error::{ParflightError, Result};
use crate::metadata::{Primitive, TypeDescriptor, TypePool};

/// How one field's payload is read.
#[derive(Debug, Clone)]
pub(crate) enum PlanOp {
    /// Read a wire primitive directly.
    Primitive(Primitive),
    /// Read a varint constant-pool key for the named type.
    Pool {
        /// Name of the referenced pool's type. Plans are shared across
        /// chunks, and numeric type ids are chunk-local; the executing
        /// chunk maps the name back to its own id.
        type_name: Arc<str>,
    },
    /// Recurse into a nested composite with its own plan.
    Nested(Arc<DecodePlan>),
}

/// One field operation of a compiled plan.
#[derive(Debug, Clone)]
pub(crate) struct PlanField {
    pub name: Arc<str>,
    pub op: PlanOp,
    /// Field is a varint-counted sequence of its element type.
    pub array: bool,
}

/// A compiled decode routine for one composite type.
///
/// Immutable once built and shared behind `Arc`; workers on different chunks
/// execute the same plan concurrently.
#[derive(Debug)]
pub struct DecodePlan {
    type_name: Arc<str>,
    fields: Vec<PlanField>,
}

impl DecodePlan {
    /// Compiles a plan for `type_id` against the chunk's type pool.
    ///
    /// Nested composite fields compile recursively into sub-plans. A type
    /// that (transitively) contains itself by value fails with
    /// [`ParflightError::TypeTreeCycle`]; self-reference through a constant
    /// pool is fine, since the payload then holds a key, not a value.
    pub(crate) fn compile(types: &TypePool, type_id: i64) -> Result<Arc<Self>> {
        let mut stack = Vec::new();
        Self::compile_inner(types, type_id, &mut stack)
    }

    fn compile_inner(types: &TypePool, type_id: i64, stack: &mut Vec<i64>) -> Result<Arc<Self>> {
        let descriptor = types.resolve(type_id)?;
        if stack.contains(&type_id) || stack.len() >= MAX_DECODE_DEPTH {
            return Err(ParflightError::TypeTreeCycle {
                type_name: descriptor.name.to_string(),
            });
        }
        stack.push(type_id);
        let plan = Self::compile_fields(types, descriptor, stack);
        stack.pop();
        plan
    }

    fn compile_fields(
        types: &TypePool,
        descriptor: &TypeDescriptor,
        stack: &mut Vec<i64>,
    ) -> Result<Arc<Self>> {
        let mut fields = Vec::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            let op = if field.constant_pool {
                // The payload stores a key; the referenced type is decoded
                // during pool resolution, never inline.
                let target = types.resolve(field.type_id)?;
                PlanOp::Pool {
                    type_name: target.name.clone(),
                }
            } else {
                let target = types.resolve(field.type_id)?;
                match target.primitive() {
                    Some(p) => PlanOp::Primitive(p),
                    None if target.fields.is_empty() => {
                        return Err(ParflightError::UnknownPrimitiveType {
                            name: target.name.to_string(),
                        });
                    }
                    None => PlanOp::Nested(Self::compile_inner(types, field.type_id, stack)?),
                }
            };
            fields.push(PlanField {
                name: field.name.clone(),
                op,
                array: field.array,
            });
        }
        Ok(Arc::new(Self {
            type_name: descriptor.name.clone(),
            fields,
        }))
    }

    /// Name of the type this plan decodes.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.type_name
    }

    /// Number of top-level fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn fields(&self) -> &[PlanField] {
        &self.fields
    }
}

/// A canonical, chunk-independent encoding of a type's structure.
///
/// Two types from different chunks produce equal keys exactly when the same
/// decode routine applies to both: equal field names in order, equal leaf
/// kinds, equal array/pool flags, recursively. Chunk-local type ids never
/// enter the encoding; constant-pool references contribute the referenced
/// type's *name* only, since the payload holds just a key either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    bytes: Arc<[u8]>,
}

impl ShapeKey {
    /// Builds the shape key for `type_id` in `types`.
    pub(crate) fn of_type(types: &TypePool, type_id: i64) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut stack = Vec::new();
        encode_type(types, type_id, &mut bytes, &mut stack)?;
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    /// A 64-bit digest of the key, for logs and reports.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&self.bytes);
        hasher.finish()
    }
}

fn encode_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn encode_type(
    types: &TypePool,
    type_id: i64,
    out: &mut Vec<u8>,
    stack: &mut Vec<i64>,
) -> Result<()> {
    let descriptor = types.resolve(type_id)?;
    if stack.contains(&type_id) || stack.len() >= MAX_DECODE_DEPTH {
        return Err(ParflightError::TypeTreeCycle {
            type_name: descriptor.name.to_string(),
        });
    }
    stack.push(type_id);
    let result = encode_fields(types, descriptor, out, stack);
    stack.pop();
    result
}

fn encode_fields(
    types: &TypePool,
    descriptor: &TypeDescriptor,
    out: &mut Vec<u8>,
    stack: &mut Vec<i64>,
) -> Result<()> {
    encode_str(out, &descriptor.name);
    out.extend_from_slice(&(descriptor.fields.len() as u32).to_le_bytes());
    for field in &descriptor.fields {
        encode_str(out, &field.name);
        out.push(u8::from(field.array) | (u8::from(field.constant_pool) << 1));
        let target = types.resolve(field.type_id)?;
        if field.constant_pool {
            out.push(b'P');
            encode_str(out, &target.name);
        } else if let Some(primitive) = target.primitive() {
            out.push(b'p');
            encode_str(out, primitive.name());
        } else if target.fields.is_empty() {
            return Err(ParflightError::UnknownPrimitiveType {
                name: target.name.to_string(),
            });
        } else {
            out.push(b'C');
            encode_type(types, field.type_id, out, stack)?;
        }
    }
    Ok(())
}

/// A plan projected onto a caller's Rust struct.
///
/// Maps each field of the base plan to either a target slot or "skip". The
/// base plan still drives the byte walk (every field must be consumed to
/// stay aligned); the slot map decides which decoded values are kept.
#[derive(Debug)]
pub struct TypedPlan {
    base: Arc<DecodePlan>,
    slots: Vec<Option<usize>>,
    slot_count: usize,
}

impl TypedPlan {
    /// Projects `base` onto the target struct's field list.
    ///
    /// Every wanted field must match a distinct recorded field by name;
    /// anything else is a [`ParflightError::ShapeMismatch`] naming the first
    /// offending field.
    pub(crate) fn compile(
        base: Arc<DecodePlan>,
        target: &'static str,
        wanted: &[&str],
    ) -> Result<Arc<Self>> {
        let mut slots = vec![None; base.fields().len()];
        for (slot, name) in wanted.iter().enumerate() {
            let position = base.fields().iter().position(|f| &*f.name == *name);
            match position {
                Some(i) if slots[i].is_none() => slots[i] = Some(slot),
                _ => {
                    return Err(ParflightError::ShapeMismatch {
                        target,
                        field: (*name).to_string(),
                    });
                }
            }
        }
        Ok(Arc::new(Self {
            base,
            slots,
            slot_count: wanted.len(),
        }))
    }

    pub(crate) fn base(&self) -> &DecodePlan {
        &self.base
    }

    /// Target slot for the base plan's `field_index`, or `None` to skip.
    pub(crate) fn slot_of(&self, field_index: usize) -> Option<usize> {
        self.slots.get(field_index).copied().flatten()
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count
    }
}

type ShapeHasher = BuildHasherDefault<XxHash64>;

/// The recording-wide plan cache.
///
/// Lives in [`RootContext`](crate::context::RootContext) and is shared by
/// every chunk worker. Lookups take a read lock; a miss compiles outside any
/// lock and then installs under a write lock, keeping the critical section
/// to a map insert. When two workers race on the same shape, exactly one
/// candidate is installed and both use it.
#[derive(Debug, Default)]
pub struct PlanCache {
    generic: RwLock<HashMap<ShapeKey, Arc<DecodePlan>, ShapeHasher>>,
    typed: RwLock<HashMap<(ShapeKey, TypeId), Arc<TypedPlan>, ShapeHasher>>,
}

impl PlanCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of generic plans currently cached.
    pub fn generic_len(&self) -> usize {
        self.generic
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of typed projections currently cached.
    pub fn typed_len(&self) -> usize {
        self.typed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the plan for `key`, compiling it with `compile` on a miss.
    pub(crate) fn get_or_compile<F>(&self, key: &ShapeKey, compile: F) -> Result<Arc<DecodePlan>>
    where
        F: FnOnce() -> Result<Arc<DecodePlan>>,
    {
        if let Some(plan) = self
            .generic
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(plan.clone());
        }
        let candidate = compile()?;
        trace!(
            "compiled plan for {} (shape {:016x})",
            candidate.type_name(),
            key.fingerprint()
        );
        let mut map = self.generic.write().unwrap_or_else(PoisonError::into_inner);
        Ok(map.entry(key.clone()).or_insert(candidate).clone())
    }

    /// Returns the typed projection for `(key, target)`, compiling on a miss.
    pub(crate) fn get_or_compile_typed<F>(
        &self,
        key: &ShapeKey,
        target: TypeId,
        compile: F,
    ) -> Result<Arc<TypedPlan>>
    where
        F: FnOnce() -> Result<Arc<TypedPlan>>,
    {
        if let Some(plan) = self
            .typed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(key.clone(), target))
        {
            return Ok(plan.clone());
        }
        let candidate = compile()?;
        let mut map = self.typed.write().unwrap_or_else(PoisonError::into_inner);
        Ok(map
            .entry((key.clone(), target))
            .or_insert(candidate)
            .clone())
    }
}
