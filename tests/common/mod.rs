#![allow(dead_code)]

//! In-memory recording fixtures shared by the integration tests.
//!
//! The library only decodes, so these helpers assemble wire images by hand:
//! varint envelopes, a metadata event with a deduplicated string table,
//! checkpoint chains, and the 68-byte chunk header, laid out the way the
//! `format` module documents them.

use std::collections::HashMap;

use parflight::bytes::strenc;
use parflight::format::{
    CHUNK_HEADER_SIZE, EVENT_TYPE_CHECKPOINT, EVENT_TYPE_METADATA, MAGIC, SUPPORTED_MAJOR,
};

// --- WIRE PRIMITIVES ---

/// Encodes one unsigned varint: 7-bit groups, ninth byte taken whole.
pub fn varint(value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = value;
    for _ in 0..8 {
        let low = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(low);
            return out;
        }
        out.push(low | 0x80);
    }
    out.push(rest as u8);
    out
}

/// Encodes a signed value through its unsigned two's-complement image.
pub fn varint_i(value: i64) -> Vec<u8> {
    varint(value as u64)
}

/// Encodes one inline UTF-8 string value.
pub fn utf8(text: &str) -> Vec<u8> {
    let mut out = vec![strenc::UTF8];
    out.extend_from_slice(&varint(text.len() as u64));
    out.extend_from_slice(text.as_bytes());
    out
}

/// Wraps record content (type varint plus payload) in an envelope whose
/// size varint counts its own bytes, re-encoding until the length settles.
pub fn envelope(content: &[u8]) -> Vec<u8> {
    let mut size = content.len() as u64 + 1;
    loop {
        let encoded = varint(size);
        let total = content.len() as u64 + encoded.len() as u64;
        if total == size {
            let mut out = encoded;
            out.extend_from_slice(content);
            return out;
        }
        size = total;
    }
}

/// Builds one complete event record.
pub fn event_record(type_id: i64, payload: &[u8]) -> Vec<u8> {
    let mut content = varint_i(type_id);
    content.extend_from_slice(payload);
    envelope(&content)
}

/// Encodes one checkpoint event. `delta` is the jump to the next
/// checkpoint in the chain, zero for the last.
pub fn checkpoint_event(delta: i64, pools: &[PoolSpec]) -> Vec<u8> {
    let mut content = varint_i(EVENT_TYPE_CHECKPOINT);
    content.extend_from_slice(&varint(0)); // start time
    content.extend_from_slice(&varint(0)); // duration
    content.extend_from_slice(&varint_i(delta));
    content.extend_from_slice(&varint(pools.len() as u64));
    for pool in pools {
        content.extend_from_slice(&varint_i(pool.type_id));
        content.extend_from_slice(&varint(pool.entries.len() as u64));
        for (key, value) in &pool.entries {
            content.extend_from_slice(&varint_i(*key));
            content.extend_from_slice(value);
        }
    }
    envelope(&content)
}

// --- TYPE DECLARATIONS ---

/// One `class` declaration for the metadata event.
#[derive(Clone)]
pub struct TypeSpec {
    pub id: i64,
    pub name: String,
    pub super_type: Option<String>,
    pub fields: Vec<FieldSpec>,
}

/// One `field` child of a class declaration.
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub type_id: i64,
    pub array: bool,
    pub constant_pool: bool,
}

impl TypeSpec {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            super_type: None,
            fields: Vec::new(),
        }
    }

    /// A declaration carrying the event supertype marker.
    pub fn event(id: i64, name: &str) -> Self {
        let mut spec = Self::new(id, name);
        spec.super_type = Some("jdk.jfr.Event".to_string());
        spec
    }

    pub fn field(mut self, name: &str, type_id: i64) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            type_id,
            array: false,
            constant_pool: false,
        });
        self
    }

    pub fn array_field(mut self, name: &str, type_id: i64) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            type_id,
            array: true,
            constant_pool: false,
        });
        self
    }

    pub fn pool_field(mut self, name: &str, type_id: i64) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            type_id,
            array: false,
            constant_pool: true,
        });
        self
    }
}

/// The entries of one pool within a checkpoint event.
#[derive(Clone)]
pub struct PoolSpec {
    pub type_id: i64,
    pub entries: Vec<(i64, Vec<u8>)>,
}

impl PoolSpec {
    pub fn new(type_id: i64) -> Self {
        Self {
            type_id,
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, key: i64, value: Vec<u8>) -> Self {
        self.entries.push((key, value));
        self
    }
}

// --- METADATA EVENT ---

struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    children: Vec<Element>,
}

fn intern(text: &str, table: &mut Vec<String>, interned: &mut HashMap<String, u64>) -> u64 {
    if let Some(&index) = interned.get(text) {
        return index;
    }
    let index = table.len() as u64;
    table.push(text.to_string());
    interned.insert(text.to_string(), index);
    index
}

fn encode_element(
    element: &Element,
    out: &mut Vec<u8>,
    table: &mut Vec<String>,
    interned: &mut HashMap<String, u64>,
) {
    out.extend_from_slice(&varint(intern(element.name, table, interned)));
    out.extend_from_slice(&varint(element.attributes.len() as u64));
    for (key, value) in &element.attributes {
        out.extend_from_slice(&varint(intern(key, table, interned)));
        out.extend_from_slice(&varint(intern(value, table, interned)));
    }
    out.extend_from_slice(&varint(element.children.len() as u64));
    for child in &element.children {
        encode_element(child, out, table, interned);
    }
}

/// Encodes the metadata event for `types`, string table included.
pub fn metadata_event(types: &[TypeSpec], region: Option<&(String, i64)>) -> Vec<u8> {
    let mut classes = Vec::with_capacity(types.len());
    for spec in types {
        let mut attributes = vec![("id", spec.id.to_string()), ("name", spec.name.clone())];
        if let Some(super_type) = &spec.super_type {
            attributes.push(("superType", super_type.clone()));
        }
        let children = spec
            .fields
            .iter()
            .map(|field| {
                let mut attributes = vec![
                    ("name", field.name.clone()),
                    ("class", field.type_id.to_string()),
                ];
                if field.array {
                    attributes.push(("dimension", "1".to_string()));
                }
                if field.constant_pool {
                    attributes.push(("constantPool", "true".to_string()));
                }
                Element {
                    name: "field",
                    attributes,
                    children: Vec::new(),
                }
            })
            .collect();
        classes.push(Element {
            name: "class",
            attributes,
            children,
        });
    }

    let mut top = vec![Element {
        name: "metadata",
        attributes: Vec::new(),
        children: classes,
    }];
    if let Some((locale, gmt_offset)) = region {
        top.push(Element {
            name: "region",
            attributes: vec![("locale", locale.clone()), ("gmtOffset", gmt_offset.to_string())],
            children: Vec::new(),
        });
    }
    let root = Element {
        name: "root",
        attributes: Vec::new(),
        children: top,
    };

    // The tree must be encoded first: interning while walking it is what
    // fills the table the event writes up front.
    let mut table: Vec<String> = Vec::new();
    let mut interned: HashMap<String, u64> = HashMap::new();
    let mut tree = Vec::new();
    encode_element(&root, &mut tree, &mut table, &mut interned);

    let mut content = varint_i(EVENT_TYPE_METADATA);
    content.extend_from_slice(&varint(0)); // start time
    content.extend_from_slice(&varint(0)); // duration
    content.extend_from_slice(&varint(1)); // metadata id
    content.extend_from_slice(&varint(table.len() as u64));
    for entry in &table {
        content.extend_from_slice(&utf8(entry));
    }
    content.extend_from_slice(&tree);
    envelope(&content)
}

// --- CHUNK ASSEMBLY ---

/// Assembles one chunk: header, event records, checkpoint chain, metadata.
pub struct ChunkBuilder {
    minor: u16,
    start_nanos: u64,
    duration_nanos: u64,
    start_ticks: u64,
    ticks_per_second: u64,
    region: Option<(String, i64)>,
    types: Vec<TypeSpec>,
    records: Vec<u8>,
    checkpoints: Vec<Vec<PoolSpec>>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self {
            minor: 1,
            start_nanos: 1_700_000_000_000_000_000,
            duration_nanos: 1_000_000_000,
            start_ticks: 0,
            ticks_per_second: 1_000_000_000,
            region: None,
            types: Vec::new(),
            records: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    pub fn declare(mut self, spec: TypeSpec) -> Self {
        self.types.push(spec);
        self
    }

    pub fn region(mut self, locale: &str, gmt_offset: i64) -> Self {
        self.region = Some((locale.to_string(), gmt_offset));
        self
    }

    pub fn start_nanos(mut self, nanos: u64) -> Self {
        self.start_nanos = nanos;
        self
    }

    pub fn ticks(mut self, start: u64, per_second: u64) -> Self {
        self.start_ticks = start;
        self.ticks_per_second = per_second;
        self
    }

    /// Appends one event record to the body.
    pub fn event(mut self, type_id: i64, payload: &[u8]) -> Self {
        self.records.extend_from_slice(&event_record(type_id, payload));
        self
    }

    /// Appends arbitrary bytes to the record region, for corruption tests.
    pub fn raw_record(mut self, bytes: &[u8]) -> Self {
        self.records.extend_from_slice(bytes);
        self
    }

    /// Appends one checkpoint event; multiple checkpoints chain in order.
    pub fn checkpoint(mut self, pools: Vec<PoolSpec>) -> Self {
        self.checkpoints.push(pools);
        self
    }

    /// Assembles the chunk with an uncompressed body.
    pub fn build(&self) -> Vec<u8> {
        let (body, cp_offset, meta_offset) = self.layout();
        self.assemble(&body, cp_offset, meta_offset, 0)
    }

    /// Assembles the chunk with the compressed flag set and the body stored
    /// through the pass-through codec (id 0).
    pub fn build_stored(&self) -> Vec<u8> {
        let (body, cp_offset, meta_offset) = self.layout();
        let mut stored = vec![0u8];
        stored.extend_from_slice(&varint(body.len() as u64));
        stored.extend_from_slice(&body);
        self.assemble(&stored, cp_offset, meta_offset, 1)
    }

    /// Assembles the chunk with an LZ4-compressed body (codec id 1).
    #[cfg(feature = "lz4_flex")]
    pub fn build_lz4(&self) -> Vec<u8> {
        let (body, cp_offset, meta_offset) = self.layout();
        let mut stored = vec![1u8];
        stored.extend_from_slice(&varint(body.len() as u64));
        stored.extend_from_slice(&lz4_flex::block::compress(&body));
        self.assemble(&stored, cp_offset, meta_offset, 1)
    }

    /// The logical body image plus the two header offsets into it.
    fn layout(&self) -> (Vec<u8>, u64, u64) {
        let chain = self.checkpoint_chain();
        let metadata = metadata_event(&self.types, self.region.as_ref());
        let cp_offset = if chain.is_empty() {
            0
        } else {
            CHUNK_HEADER_SIZE + self.records.len() as u64
        };
        let meta_offset = CHUNK_HEADER_SIZE + (self.records.len() + chain.len()) as u64;

        let mut body = self.records.clone();
        body.extend_from_slice(&chain);
        body.extend_from_slice(&metadata);
        (body, cp_offset, meta_offset)
    }

    fn checkpoint_chain(&self) -> Vec<u8> {
        let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(self.checkpoints.len());
        for (i, pools) in self.checkpoints.iter().enumerate() {
            if i + 1 == self.checkpoints.len() {
                encoded.push(checkpoint_event(0, pools));
            } else {
                // Each checkpoint jumps forward over itself to the next;
                // the jump width feeds back into the encoding, so iterate
                // until the length settles.
                let mut delta = checkpoint_event(0, pools).len() as i64;
                loop {
                    let bytes = checkpoint_event(delta, pools);
                    if bytes.len() as i64 == delta {
                        encoded.push(bytes);
                        break;
                    }
                    delta = bytes.len() as i64;
                }
            }
        }
        encoded.concat()
    }

    fn assemble(&self, stored_body: &[u8], cp_offset: u64, meta_offset: u64, flags: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(CHUNK_HEADER_SIZE as usize + stored_body.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&SUPPORTED_MAJOR.to_be_bytes());
        out.extend_from_slice(&self.minor.to_be_bytes());
        out.extend_from_slice(&(CHUNK_HEADER_SIZE + stored_body.len() as u64).to_be_bytes());
        out.extend_from_slice(&cp_offset.to_be_bytes());
        out.extend_from_slice(&meta_offset.to_be_bytes());
        out.extend_from_slice(&self.start_nanos.to_be_bytes());
        out.extend_from_slice(&self.duration_nanos.to_be_bytes());
        out.extend_from_slice(&self.start_ticks.to_be_bytes());
        out.extend_from_slice(&self.ticks_per_second.to_be_bytes());
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(stored_body);
        out
    }
}

// --- STANDARD FIXTURES ---

/// Chunk-local type ids used by the standard fixtures.
pub const INT: i64 = 4;
pub const STRING: i64 = 5;
pub const LONG: i64 = 6;
pub const POINT: i64 = 20;

/// A builder preloaded with the primitive declarations every fixture needs.
pub fn chunk() -> ChunkBuilder {
    ChunkBuilder::new()
        .declare(TypeSpec::new(INT, "int"))
        .declare(TypeSpec::new(STRING, "java.lang.String"))
        .declare(TypeSpec::new(LONG, "long"))
}

/// The `demo.Point` declaration: two inline int fields.
pub fn point_type() -> TypeSpec {
    TypeSpec::event(POINT, "demo.Point").field("x", INT).field("y", INT)
}

/// One chunk holding two `demo.Point` events, (3, 4) and (10, 20).
pub fn points_chunk() -> Vec<u8> {
    chunk()
        .declare(point_type())
        .event(POINT, &[varint_i(3), varint_i(4)].concat())
        .event(POINT, &[varint_i(10), varint_i(20)].concat())
        .build()
}

/// Writes `bytes` to a fresh temp file and returns the live handle.
pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(file.path(), bytes).expect("Failed to write fixture");
    file
}
