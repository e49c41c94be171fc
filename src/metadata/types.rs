//! Per-chunk type descriptors.
//!
//! Every chunk carries a complete, self-contained description of its event
//! types. Nothing here is global: type ids, field layouts, even which id
//! means "java.lang.String" can change from one chunk to the next, which is
//! why all descriptor state hangs off the chunk and not the recording.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ParflightError, Result};

/// Wire-level primitive kinds.
///
/// A leaf of the decode tree: a type whose payload is read directly rather
/// than field by field. Identified by name, exactly as recorders emit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// One raw signed byte.
    Byte,
    /// A varint code point.
    Char,
    /// A varint, reinterpreted signed.
    Short,
    /// A varint, reinterpreted signed.
    Int,
    /// A varint, reinterpreted signed.
    Long,
    /// A big-endian IEEE 754 single.
    Float,
    /// A big-endian IEEE 754 double.
    Double,
    /// One byte, zero meaning false.
    Boolean,
    /// A discriminated string value.
    String,
}

impl Primitive {
    /// Maps a recorded type name to its primitive kind, if it has one.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "byte" => Some(Self::Byte),
            "char" => Some(Self::Char),
            "short" => Some(Self::Short),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "java.lang.String" => Some(Self::String),
            _ => None,
        }
    }

    /// The recorded name of this primitive.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "java.lang.String",
        }
    }
}

/// One field of a recorded type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name as recorded.
    pub name: Arc<str>,
    /// Id of the field's type within the same chunk. May point forward to a
    /// type declared later in the metadata event; resolution is by id, on
    /// demand.
    pub type_id: i64,
    /// `true` when the field holds a varint-counted sequence of its type.
    pub array: bool,
    /// `true` when the payload stores a constant-pool key instead of an
    /// inline value.
    pub constant_pool: bool,
}

/// A recorder setting attached to an event type.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDescriptor {
    /// Setting name, e.g. `enabled` or `threshold`.
    pub name: Arc<str>,
    /// Default value as recorded, if present.
    pub default_value: Option<Arc<str>>,
    /// Id of the setting's value type, if declared.
    pub type_id: Option<i64>,
}

/// An annotation attached to a type or field.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDescriptor {
    /// Id of the annotation's own type.
    pub type_id: i64,
    /// Annotation values as key/value pairs, in recorded order.
    pub values: Vec<(Arc<str>, Arc<str>)>,
}

/// A recorded type: name, identity, and payload layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Chunk-local numeric id. Event envelopes and field descriptors refer
    /// to types by this id.
    pub id: i64,
    /// Fully qualified name, e.g. `jdk.ExecutionSample`.
    pub name: Arc<str>,
    /// Name of the supertype, if declared. `jdk.jfr.Event` marks event
    /// types.
    pub super_type: Option<Arc<str>>,
    /// Recorded `simpleType` flag.
    pub simple_type: bool,
    /// Payload fields in decode order.
    pub fields: Vec<FieldDescriptor>,
    /// Recorder settings, informational only.
    pub settings: Vec<SettingDescriptor>,
    /// Annotations on the type itself.
    pub annotations: Vec<AnnotationDescriptor>,
}

impl TypeDescriptor {
    /// The primitive kind of this type, decided by name.
    ///
    /// Primitives decode directly from the payload regardless of declared
    /// fields; everything else decodes field by field.
    pub fn primitive(&self) -> Option<Primitive> {
        Primitive::from_name(&self.name)
    }

    /// Finds a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| &*f.name == name)
    }
}

/// The id-keyed table of every type a chunk declares.
///
/// Descriptors are stored in declaration order; a side map resolves ids to
/// slots. Ids register before their field lists are filled in, so a later
/// sibling can already reference an id the tree is still describing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TypePool {
    types: Vec<TypeDescriptor>,
    by_id: HashMap<i64, usize>,
    by_name: HashMap<Arc<str>, i64>,
}

impl TypePool {
    /// Registers a descriptor shell and returns its slot.
    ///
    /// Fails with [`ParflightError::DuplicateTypeId`] when the id is already
    /// taken. The caller fills fields, settings, and annotations through
    /// [`slot_mut`](Self::slot_mut) afterwards.
    pub(crate) fn reserve(&mut self, descriptor: TypeDescriptor) -> Result<usize> {
        if self.by_id.contains_key(&descriptor.id) {
            return Err(ParflightError::DuplicateTypeId {
                id: descriptor.id,
                name: descriptor.name.to_string(),
            });
        }
        let slot = self.types.len();
        self.by_id.insert(descriptor.id, slot);
        self.by_name
            .entry(descriptor.name.clone())
            .or_insert(descriptor.id);
        self.types.push(descriptor);
        Ok(slot)
    }

    /// Mutable access to a registered descriptor by slot.
    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut TypeDescriptor> {
        self.types.get_mut(slot)
    }

    /// Looks a type up by its chunk-local id.
    pub fn get(&self, id: i64) -> Option<&TypeDescriptor> {
        self.by_id.get(&id).and_then(|&slot| self.types.get(slot))
    }

    /// Looks a type up by id, failing with
    /// [`ParflightError::UnknownTypeId`] when the chunk never declared it.
    pub fn resolve(&self, id: i64) -> Result<&TypeDescriptor> {
        self.get(id).ok_or(ParflightError::UnknownTypeId { id })
    }

    /// The slot index of a type id, if declared.
    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Looks a type up by slot index.
    pub fn by_index(&self, slot: usize) -> Option<&TypeDescriptor> {
        self.types.get(slot)
    }

    /// Finds a type by fully qualified name. Linear scan; intended for
    /// setup paths, not per-event work.
    pub fn find(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.iter().find(|t| &*t.name == name)
    }

    /// The id declared for `name` in this chunk.
    ///
    /// Ids are chunk-local, so anything that carries a type name across
    /// chunk boundaries uses this to translate back into the executing
    /// chunk's id space. First declaration wins if a name repeats.
    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    /// Number of declared types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` when no types are declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }
}
