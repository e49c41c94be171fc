// src/rt.rs

//! Runtime support for `#[derive(ParflightEvent)]` output.
//!
//! Everything here is an implementation detail of the derive macro: the
//! names are public because generated code must reach them from the user's
//! crate, not because they form an API surface. `lib.rs` hides the module
//! from the rendered docs.

use std::sync::Arc;

use crate::error::{ParflightError, Result};
use crate::value::Value;

/// Field values for one typed decode, positioned by slot.
///
/// The typed plan maps each wanted struct field to a slot; the deserializer
/// fills the slots in payload order and the generated `from_slots` drains
/// them in declaration order.
#[derive(Debug)]
pub struct SlotBuffer {
    slots: Vec<Option<Value>>,
}

impl SlotBuffer {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub(crate) fn set(&mut self, slot: usize, value: Value) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(value);
        }
    }

    /// Takes the value decoded into `slot`.
    ///
    /// Each slot holds exactly one value per decode; taking an unfilled or
    /// already-drained slot means the plan and the generated code disagree
    /// on the field list.
    pub fn take(&mut self, slot: usize) -> Result<Value> {
        self.slots
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| {
                ParflightError::Internal(format!("typed decode slot {slot} was never filled"))
            })
    }
}

/// Bridge between a user struct and the recorded event it mirrors.
///
/// Implemented by `#[derive(ParflightEvent)]`. Hand-written impls work the
/// same way, but the derive keeps `FIELDS` and `from_slots` in agreement
/// for free.
pub trait EventShape: Sized {
    /// Fully qualified recorded type name this struct mirrors.
    const EVENT_NAME: &'static str;
    /// Rust-side struct name, used in shape mismatch diagnostics.
    const STRUCT_NAME: &'static str;
    /// Recorded field names, in slot order.
    const FIELDS: &'static [&'static str];

    /// Builds the struct from slots filled by a typed decode.
    fn from_slots(slots: &mut SlotBuffer) -> Result<Self>;
}

/// Conversion from a decoded [`Value`] into one struct field.
pub trait FromValue: Sized {
    /// Converts `value`, or reports what the field needed instead.
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! from_value_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let raw = match value {
                        Value::Int(raw) => raw,
                        other => return Err(other.type_error(stringify!($ty))),
                    };
                    <$ty>::try_from(raw).map_err(|_| ParflightError::ValueKind {
                        expected: stringify!($ty),
                        found: format!("int {raw} (out of range)"),
                    })
                }
            }
        )*
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! from_value_float {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    // Integers widen, so tick and duration fields can land
                    // in float struct fields directly.
                    match value.as_f64() {
                        Some(raw) => Ok(raw as $ty),
                        None => Err(value.type_error(stringify!($ty))),
                    }
                }
            }
        )*
    };
}

from_value_float!(f32, f64);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| value.type_error("bool"))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s.as_ref().to_owned()),
            other => Err(other.type_error("String")),
        }
    }
}

impl FromValue for Arc<str> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(other.type_error("Arc<str>")),
        }
    }
}

/// `Null` maps to `None`; anything else converts through `T`.
///
/// This is how nullable recorded fields (strings, pool references to key
/// zero) land in user structs without failing the whole decode.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(other.type_error("Vec<_>")),
        }
    }
}

/// Identity: keep the dynamic value as is.
///
/// Lets a struct take one field symbolically (say, an unresolved pool
/// reference) while the rest decode to concrete types.
impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}
