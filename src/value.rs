//! The dynamic value model produced by generic decoding.
//!
//! Recorded payloads decode into [`Value`] trees when the caller has no
//! Rust struct for the event type. The model is deliberately small: numeric
//! primitives collapse into `Int`/`Float` (the wire keeps no width
//! information worth preserving), strings intern into `Arc<str>`, and
//! constant-pool references may stay symbolic as [`Value::PoolRef`] when the
//! caller asked to defer resolution.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::ParflightError;

/// One decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A null reference.
    Null,
    /// A boolean.
    Boolean(bool),
    /// Any integral primitive (byte, char, short, int, long), sign-extended.
    Int(i64),
    /// Any floating-point primitive, widened to double.
    Float(f64),
    /// A string.
    String(Arc<str>),
    /// A composite value: one recorded object.
    Object(EventObject),
    /// An array field's elements.
    List(Vec<Value>),
    /// An unresolved constant-pool reference.
    ///
    /// Produced when decoding with deferred pool resolution; resolve through
    /// [`ChunkContext::resolve_constant`](crate::context::ChunkContext::resolve_constant).
    PoolRef {
        /// Type id of the pool the entry lives in.
        type_id: i64,
        /// Entry key within that pool.
        index: i64,
    },
}

impl Value {
    /// A short name for this value's kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::PoolRef { .. } => "pool reference",
        }
    }

    /// The integer payload, if this is an integral value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The numeric payload widened to `f64`; integers convert.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The element list, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// The composite payload, if this is an object.
    pub fn as_object(&self) -> Option<&EventObject> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Looks up a field on a composite value. `None` for non-objects and
    /// missing fields alike.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.field(name))
    }

    /// Builds the conversion error for a value that is not what a caller
    /// needed, with enough detail to spot the offending record.
    pub(crate) fn type_error(&self, expected: &'static str) -> ParflightError {
        let found = match self {
            Self::Int(v) => format!("int {v}"),
            Self::Float(v) => format!("float {v}"),
            Self::String(s) => format!("string {s:?}"),
            Self::Object(o) => format!("object of type '{}'", o.type_name()),
            Self::PoolRef { type_id, index } => {
                format!("unresolved pool reference ({type_id}, {index})")
            }
            other => other.kind_name().to_string(),
        };
        ParflightError::ValueKind { expected, found }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Object(v) => v.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::PoolRef { type_id, index } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("$poolType", type_id)?;
                map.serialize_entry("$poolIndex", index)?;
                map.end()
            }
        }
    }
}

/// One decoded composite: an ordered set of named field values.
///
/// Field order is the recorded declaration order. Lookup is linear, which
/// beats a map for the field counts events actually have.
#[derive(Debug, Clone, PartialEq)]
pub struct EventObject {
    type_name: Arc<str>,
    fields: Vec<(Arc<str>, Value)>,
}

impl EventObject {
    pub(crate) fn new(type_name: Arc<str>, fields: Vec<(Arc<str>, Value)>) -> Self {
        Self { type_name, fields }
    }

    /// Name of the recorded type this object is an instance of.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Looks up a field value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| &**field == name)
            .map(|(_, value)| value)
    }

    /// Iterates fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (&**name, value))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` for an object with no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for EventObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("$type", &*self.type_name)?;
        for (name, value) in &self.fields {
            map.serialize_entry(&**name, value)?;
        }
        map.end()
    }
}
