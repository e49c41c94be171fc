//! Self-describing chunk metadata.
//!
//! Each chunk embeds one metadata event that declares every type used by the
//! chunk's payloads: a string table, an element tree, and the type
//! descriptors folded out of it. This module owns that whole pipeline; the
//! deserializer and constant pools consume the resulting [`TypePool`].
//!
//! Nothing in here is shared between chunks. Two chunks of the same
//! recording may declare the same event under different ids or with
//! different fields, and each [`ChunkMetadata`] stands alone.

mod element;
mod strings;
mod types;

pub use element::{ChunkMetadata, Element, MAX_METADATA_DEPTH, RegionInfo, kinds};
pub use strings::StringTable;
pub use types::{
    AnnotationDescriptor, FieldDescriptor, Primitive, SettingDescriptor, TypeDescriptor, TypePool,
};
