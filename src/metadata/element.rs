//! The metadata event: envelope, element tree, and the chunk model built
//! from it.
//!
//! A metadata event is a tiny document: a string table followed by a tree of
//! named elements with string attributes. The tree describes every type the
//! chunk uses. Parsing happens in two steps: the raw tree is decoded
//! strictly (unknown element kinds are errors, since the tree defines payload
//! layout), then the tree is folded into a [`TypePool`] and [`RegionInfo`].

use std::sync::Arc;

use crate::bytes::ByteReader;
use crate::error::{ParflightError, Result};
use crate::format::EVENT_TYPE_METADATA;
use crate::metadata::strings::StringTable;
use crate::metadata::types::{
    AnnotationDescriptor, FieldDescriptor, SettingDescriptor, TypeDescriptor, TypePool,
};

/// Maximum nesting depth of the metadata element tree.
///
/// Real trees are four or five levels deep; the limit exists to bound
/// recursion on hostile input.
pub const MAX_METADATA_DEPTH: usize = 64;

/// The element kind names a metadata tree may contain.
pub mod kinds {
    /// Document root.
    pub const ROOT: &str = "root";
    /// Container of all `class` declarations.
    pub const METADATA: &str = "metadata";
    /// Locale and time-zone information for the chunk.
    pub const REGION: &str = "region";
    /// One type declaration.
    pub const CLASS: &str = "class";
    /// One field of a type.
    pub const FIELD: &str = "field";
    /// An annotation on a type or field.
    pub const ANNOTATION: &str = "annotation";
    /// A recorder setting on an event type.
    pub const SETTING: &str = "setting";
}

/// Attribute keys used when folding the tree into descriptors.
mod attr {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const SUPER_TYPE: &str = "superType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const CLASS: &str = "class";
    pub const DIMENSION: &str = "dimension";
    pub const CONSTANT_POOL: &str = "constantPool";
    pub const DEFAULT_VALUE: &str = "defaultValue";
    pub const LOCALE: &str = "locale";
    pub const GMT_OFFSET: &str = "gmtOffset";
}

/// One node of the decoded metadata tree.
///
/// Names, attribute keys, and attribute values are all interned through the
/// event's string table; attribute values may be null.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element kind; one of the names in [`kinds`].
    pub name: Arc<str>,
    /// Attributes in recorded order.
    pub attributes: Vec<(Arc<str>, Option<Arc<str>>)>,
    /// Child elements in recorded order.
    pub children: Vec<Element>,
}

impl Element {
    /// The value of an attribute, treating null as absent.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attribute_arc(key).map(|s| &**s)
    }

    fn attribute_arc(&self, key: &str) -> Option<&Arc<str>> {
        self.attributes
            .iter()
            .find(|(k, _)| &**k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    fn require_attr(&self, key: &'static str) -> Result<&Arc<str>> {
        self.attribute_arc(key)
            .ok_or_else(|| ParflightError::MetadataAttribute {
                element: self.name.to_string(),
                attribute: key.to_string(),
            })
    }

    fn require_i64_attr(&self, key: &'static str) -> Result<i64> {
        self.require_attr(key)?
            .parse()
            .map_err(|_| ParflightError::MetadataAttribute {
                element: self.name.to_string(),
                attribute: key.to_string(),
            })
    }

    fn i64_attr(&self, key: &str) -> Option<i64> {
        self.attribute(key).and_then(|v| v.parse().ok())
    }

    fn bool_attr(&self, key: &str) -> bool {
        self.attribute(key) == Some("true")
    }
}

/// Locale and time-zone information from the chunk's `region` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionInfo {
    /// Locale tag, e.g. `en_US`, if recorded.
    pub locale: Option<Arc<str>>,
    /// Offset from GMT in milliseconds, if recorded.
    pub gmt_offset: Option<i64>,
}

impl RegionInfo {
    fn from_element(element: &Element) -> Self {
        Self {
            locale: element.attribute_arc(attr::LOCALE).cloned(),
            gmt_offset: element.i64_attr(attr::GMT_OFFSET),
        }
    }
}

/// The fully parsed self-description of one chunk.
///
/// Owns the string table, the raw element tree (kept for visitors and
/// diagnostics), and the [`TypePool`] folded from it.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    metadata_id: i64,
    start_time: i64,
    duration: i64,
    strings: StringTable,
    root: Element,
    types: TypePool,
    region: RegionInfo,
}

impl ChunkMetadata {
    /// Parses the metadata event the reader is positioned at.
    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let at = reader.absolute_position();
        let start = reader.position();
        let size = reader.read_varuint()?;
        if size == 0 || size > (reader.len() - start) as u64 {
            return Err(ParflightError::InconsistentEventSize {
                offset: at,
                declared: size,
            });
        }
        let type_id = reader.read_varint()?;
        if type_id != EVENT_TYPE_METADATA {
            return Err(ParflightError::InvalidMetadataEvent { offset: at });
        }
        let start_time = reader.read_varint()?;
        let duration = reader.read_varint()?;
        let metadata_id = reader.read_varint()?;

        let strings = StringTable::parse(reader)?;
        let root = parse_element(reader, &strings, 0)?;
        if &*root.name != kinds::ROOT {
            return Err(ParflightError::InvalidMetadataEvent { offset: at });
        }

        let mut types = TypePool::default();
        let mut region = RegionInfo::default();
        for child in &root.children {
            match &*child.name {
                kinds::METADATA => {
                    for node in &child.children {
                        if &*node.name == kinds::CLASS {
                            register_class(&mut types, node)?;
                        }
                    }
                }
                kinds::REGION => region = RegionInfo::from_element(child),
                _ => {}
            }
        }

        Ok(Self {
            metadata_id,
            start_time,
            duration,
            strings,
            root,
            types,
            region,
        })
    }

    /// Monotonic id recorders bump when the type system changes.
    pub fn metadata_id(&self) -> i64 {
        self.metadata_id
    }

    /// Start time of the metadata event, in ticks.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Duration of the metadata event, in ticks.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// The event's string table.
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// The raw element tree, rooted at the `root` element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The types this chunk declares.
    pub fn types(&self) -> &TypePool {
        &self.types
    }

    /// Locale and time-zone information.
    pub fn region(&self) -> &RegionInfo {
        &self.region
    }
}

/// Recursively parses one element: name index, attribute pairs, children.
fn parse_element(reader: &mut ByteReader<'_>, strings: &StringTable, depth: usize) -> Result<Element> {
    if depth >= MAX_METADATA_DEPTH {
        return Err(ParflightError::MetadataTooDeep {
            limit: MAX_METADATA_DEPTH,
        });
    }

    let name_index = reader.read_varuint()?;
    let name = strings
        .lookup(name_index)?
        .cloned()
        .ok_or_else(|| ParflightError::UnsupportedMetadataElement {
            name: "(null)".to_string(),
        })?;
    if !matches!(
        &*name,
        kinds::ROOT
            | kinds::METADATA
            | kinds::REGION
            | kinds::CLASS
            | kinds::FIELD
            | kinds::ANNOTATION
            | kinds::SETTING
    ) {
        // Strict: an unknown kind could change payload layout in ways this
        // decoder cannot see, so refusing beats silently misreading events.
        return Err(ParflightError::UnsupportedMetadataElement {
            name: name.to_string(),
        });
    }

    let bound = reader.remaining() as u64;
    let attr_count = reader.read_varuint_len(bound)?;
    let mut attributes = Vec::with_capacity(attr_count);
    for _ in 0..attr_count {
        let key_index = reader.read_varuint()?;
        let key = strings.lookup(key_index)?.cloned().ok_or_else(|| {
            ParflightError::MetadataAttribute {
                element: name.to_string(),
                attribute: "(null)".to_string(),
            }
        })?;
        let value_index = reader.read_varuint()?;
        let value = strings.lookup(value_index)?.cloned();
        attributes.push((key, value));
    }

    let bound = reader.remaining() as u64;
    let child_count = reader.read_varuint_len(bound)?;
    let mut children = Vec::with_capacity(child_count);
    for _ in 0..child_count {
        children.push(parse_element(reader, strings, depth + 1)?);
    }

    Ok(Element {
        name,
        attributes,
        children,
    })
}

/// Folds one `class` element into the pool.
///
/// The id registers before any child is examined, so fields of later
/// siblings may already reference it.
fn register_class(pool: &mut TypePool, element: &Element) -> Result<()> {
    let id = element.require_i64_attr(attr::ID)?;
    let name = element.require_attr(attr::NAME)?.clone();
    let shell = TypeDescriptor {
        id,
        name,
        super_type: element.attribute_arc(attr::SUPER_TYPE).cloned(),
        simple_type: element.bool_attr(attr::SIMPLE_TYPE),
        fields: Vec::new(),
        settings: Vec::new(),
        annotations: Vec::new(),
    };
    let slot = pool.reserve(shell)?;

    let mut fields = Vec::new();
    let mut settings = Vec::new();
    let mut annotations = Vec::new();
    for child in &element.children {
        match &*child.name {
            kinds::FIELD => fields.push(parse_field(child)?),
            kinds::SETTING => settings.push(parse_setting(child)?),
            kinds::ANNOTATION => annotations.push(parse_annotation(child)?),
            _ => {}
        }
    }
    if let Some(descriptor) = pool.slot_mut(slot) {
        descriptor.fields = fields;
        descriptor.settings = settings;
        descriptor.annotations = annotations;
    }
    Ok(())
}

fn parse_field(element: &Element) -> Result<FieldDescriptor> {
    Ok(FieldDescriptor {
        name: element.require_attr(attr::NAME)?.clone(),
        type_id: element.require_i64_attr(attr::CLASS)?,
        array: element.i64_attr(attr::DIMENSION).unwrap_or(0) > 0,
        constant_pool: element.bool_attr(attr::CONSTANT_POOL),
    })
}

fn parse_setting(element: &Element) -> Result<SettingDescriptor> {
    Ok(SettingDescriptor {
        name: element.require_attr(attr::NAME)?.clone(),
        default_value: element.attribute_arc(attr::DEFAULT_VALUE).cloned(),
        type_id: element.i64_attr(attr::CLASS),
    })
}

fn parse_annotation(element: &Element) -> Result<AnnotationDescriptor> {
    let type_id = element.require_i64_attr(attr::CLASS)?;
    let values = element
        .attributes
        .iter()
        .filter(|(k, _)| &**k != attr::CLASS)
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
        .collect();
    Ok(AnnotationDescriptor { type_id, values })
}
