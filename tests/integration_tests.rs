#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use parflight::{
    ChunkContext, Control, DecodeOptions, DecodeTier, Decompressor, Recording, RootContext, Value,
};

use common::{
    chunk, point_type, points_chunk, utf8, varint, varint_i, TypeSpec, INT, LONG, POINT, STRING,
};

// --- HELPERS ---

/// Builds a context over the first chunk of `recording`.
fn first_chunk(
    recording: &Recording,
    options: DecodeOptions,
) -> parflight::Result<ChunkContext<'_>> {
    let chunk = recording
        .chunks()
        .next()
        .expect("Recording has no chunks")?;
    ChunkContext::new(chunk, Arc::new(RootContext::new()), options)
}

/// Decodes every event of a one-chunk recording into owned values.
fn collect_values(bytes: &[u8], options: DecodeOptions) -> parflight::Result<Vec<Value>> {
    let recording = Recording::from_bytes(bytes.to_vec());
    let ctx = first_chunk(&recording, options)?;
    let mut values = Vec::new();
    for event in ctx.events() {
        values.push(event?.into_value()?);
    }
    Ok(values)
}

fn eager() -> DecodeOptions {
    DecodeOptions {
        tier: DecodeTier::Eager,
        ..DecodeOptions::default()
    }
}

// --- TESTS ---

/// Baseline decode: two flat events come back with their declared fields.
#[test]
fn decodes_flat_events() -> parflight::Result<()> {
    // 1. Assemble a one-chunk recording with two demo.Point events.
    let recording = Recording::from_bytes(points_chunk());

    // 2. Decode with defaults.
    let ctx = first_chunk(&recording, DecodeOptions::default())?;
    let events: Vec<_> = ctx.events().collect::<parflight::Result<Vec<_>>>()?;

    // 3. Both events materialize with the declared fields.
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].type_name(), "demo.Point");
    assert_eq!(events[0].type_id(), POINT);
    assert!(events[0].is_materialized());
    assert_eq!(events[0].field("x")?, Some(&Value::Int(3)));
    assert_eq!(events[0].field("y")?, Some(&Value::Int(4)));
    assert_eq!(events[1].field("x")?, Some(&Value::Int(10)));
    assert_eq!(events[1].field("y")?, Some(&Value::Int(20)));
    assert_eq!(events[0].field("z")?, None);
    Ok(())
}

/// Every decode tier yields the same values for the same chunk.
#[test]
fn tiers_agree() -> parflight::Result<()> {
    let bytes = points_chunk();
    let lazy = DecodeOptions {
        tier: DecodeTier::Lazy,
        ..DecodeOptions::default()
    };
    let auto = DecodeOptions::default();

    let from_eager = collect_values(&bytes, eager())?;
    let from_lazy = collect_values(&bytes, lazy)?;
    let from_auto = collect_values(&bytes, auto)?;

    assert_eq!(from_eager, from_lazy);
    assert_eq!(from_eager, from_auto);

    // Eager walks descriptors directly while Auto runs the compiled plan,
    // so a composite nested inside a composite compares the two code paths
    // on the same bytes.
    let segment = TypeSpec::event(60, "demo.Segment")
        .field("from", POINT)
        .field("to", POINT)
        .field("label", STRING);
    let payload = [
        varint_i(1),
        varint_i(2),
        varint_i(7),
        varint_i(8),
        utf8("diag"),
    ]
    .concat();
    let nested = chunk()
        .declare(point_type())
        .declare(segment)
        .event(60, &payload)
        .build();

    let from_eager = collect_values(&nested, eager())?;
    assert_eq!(from_eager, collect_values(&nested, lazy)?);
    assert_eq!(from_eager, collect_values(&nested, auto)?);

    let from = from_eager[0].field("from").expect("Segment lost `from`");
    assert_eq!(from.field("x"), Some(&Value::Int(1)));
    assert_eq!(from.field("y"), Some(&Value::Int(2)));
    assert_eq!(
        from_eager[0].field("label").and_then(Value::as_str),
        Some("diag")
    );
    Ok(())
}

/// Auto defers wide events and still decodes them correctly on access.
#[test]
fn auto_defers_wide_events() -> parflight::Result<()> {
    // 1. demo.Wide carries 17 int fields, one past the materialize cutoff.
    let mut wide = TypeSpec::event(50, "demo.Wide");
    let mut payload = Vec::new();
    for i in 0..17 {
        wide = wide.field(&format!("f{i:02}"), INT);
        payload.extend_from_slice(&varint_i(i));
    }
    let bytes = chunk().declare(wide).event(50, &payload).build();
    let recording = Recording::from_bytes(bytes.clone());

    // 2. Under Auto the event comes back deferred.
    let ctx = first_chunk(&recording, DecodeOptions::default())?;
    let event = ctx.events().next().expect("Chunk has no events")?;
    assert!(!event.is_materialized());

    // 3. First access materializes; repeated access is stable.
    assert_eq!(event.field("f00")?, Some(&Value::Int(0)));
    assert!(event.is_materialized());
    assert_eq!(event.field("f16")?, Some(&Value::Int(16)));
    assert_eq!(event.field("f16")?, Some(&Value::Int(16)));

    // 4. The deferred decode matches the eager one.
    assert_eq!(vec![event.into_value()?], collect_values(&bytes, eager())?);
    Ok(())
}

/// Re-decoding the same record yields an equal value.
#[test]
fn decode_is_repeatable() -> parflight::Result<()> {
    let recording = Recording::from_bytes(points_chunk());
    let ctx = first_chunk(&recording, DecodeOptions::default())?;

    let raw = ctx.raw_events().next().expect("Chunk has no events")?;
    let first = ctx.decode_event(&raw)?.into_value()?;
    let second = ctx.decode_event(&raw)?.into_value()?;
    assert_eq!(first, second);
    Ok(())
}

/// Signed 64-bit extremes survive the nine-byte varint encoding.
#[test]
fn decodes_signed_extremes() -> parflight::Result<()> {
    let extremes = TypeSpec::event(23, "demo.Extremes")
        .field("min", LONG)
        .field("max", LONG)
        .field("minus_one", LONG);
    let payload = [varint_i(i64::MIN), varint_i(i64::MAX), varint_i(-1)].concat();
    let bytes = chunk().declare(extremes).event(23, &payload).build();

    let values = collect_values(&bytes, DecodeOptions::default())?;
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].field("min"), Some(&Value::Int(i64::MIN)));
    assert_eq!(values[0].field("max"), Some(&Value::Int(i64::MAX)));
    assert_eq!(values[0].field("minus_one"), Some(&Value::Int(-1)));
    Ok(())
}

/// Every primitive encoding decodes to its logical value.
#[test]
fn decodes_all_primitives() -> parflight::Result<()> {
    let mixed = TypeSpec::event(30, "demo.Mixed")
        .field("f", 7)
        .field("d", 8)
        .field("flag", 9)
        .field("b", 10)
        .field("s", 11)
        .field("c", 12)
        .field("label", STRING);
    let mut payload = Vec::new();
    payload.extend_from_slice(&1.5f32.to_be_bytes());
    payload.extend_from_slice(&(-2.25f64).to_be_bytes());
    payload.push(1); // boolean true
    payload.push(0xfe); // byte -2
    payload.extend_from_slice(&varint_i(-3));
    payload.extend_from_slice(&varint(65)); // char 'A'
    payload.extend_from_slice(&utf8("flight"));

    let bytes = chunk()
        .declare(TypeSpec::new(7, "float"))
        .declare(TypeSpec::new(8, "double"))
        .declare(TypeSpec::new(9, "boolean"))
        .declare(TypeSpec::new(10, "byte"))
        .declare(TypeSpec::new(11, "short"))
        .declare(TypeSpec::new(12, "char"))
        .declare(mixed)
        .event(30, &payload)
        .build();

    let values = collect_values(&bytes, DecodeOptions::default())?;
    let event = &values[0];
    assert_eq!(event.field("f"), Some(&Value::Float(1.5)));
    assert_eq!(event.field("d"), Some(&Value::Float(-2.25)));
    assert_eq!(event.field("flag"), Some(&Value::Boolean(true)));
    assert_eq!(event.field("b"), Some(&Value::Int(-2)));
    assert_eq!(event.field("s"), Some(&Value::Int(-3)));
    assert_eq!(event.field("c"), Some(&Value::Int(65)));
    assert_eq!(event.field("label"), Some(&Value::String("flight".into())));
    Ok(())
}

/// Array fields decode element-by-element into lists.
#[test]
fn decodes_array_fields() -> parflight::Result<()> {
    let samples = TypeSpec::event(31, "demo.Samples").array_field("values", LONG);
    let payload = [varint(3), varint_i(5), varint_i(-6), varint_i(7)].concat();
    let bytes = chunk().declare(samples).event(31, &payload).build();

    let values = collect_values(&bytes, DecodeOptions::default())?;
    assert_eq!(
        values[0].field("values"),
        Some(&Value::List(vec![
            Value::Int(5),
            Value::Int(-6),
            Value::Int(7)
        ]))
    );
    Ok(())
}

/// Declaration order is immaterial: a class may reference one declared later.
#[test]
fn resolves_forward_declarations() -> parflight::Result<()> {
    let line = TypeSpec::event(32, "demo.Line")
        .field("a", POINT)
        .field("b", POINT);
    let payload = [varint_i(1), varint_i(2), varint_i(3), varint_i(4)].concat();
    let bytes = chunk()
        .declare(line)
        .declare(point_type())
        .event(32, &payload)
        .build();

    let values = collect_values(&bytes, DecodeOptions::default())?;
    let a = values[0].field("a").expect("Missing field a");
    assert_eq!(a.field("x"), Some(&Value::Int(1)));
    assert_eq!(a.field("y"), Some(&Value::Int(2)));
    let b = values[0].field("b").expect("Missing field b");
    assert_eq!(b.field("y"), Some(&Value::Int(4)));
    Ok(())
}

/// Chunks are independent: the same id can map to different types.
#[test]
fn decodes_multiple_chunks() -> parflight::Result<()> {
    // 1. Chunk 0 uses id 20 for demo.Point; chunk 1 remaps it.
    let mut bytes = points_chunk();
    let second = chunk()
        .declare(TypeSpec::event(POINT, "demo.Other").field("n", INT))
        .event(POINT, &varint_i(99))
        .build();
    bytes.extend_from_slice(&second);
    let recording = Recording::from_bytes(bytes);

    // 2. Both chunks frame correctly.
    let chunks: Vec<_> = recording.chunks().collect::<parflight::Result<Vec<_>>>()?;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].index(), 0);
    assert_eq!(chunks[1].offset(), chunks[0].size());

    // 3. Each chunk decodes against its own declarations.
    let root = Arc::new(RootContext::new());
    let mut names = Vec::new();
    for chunk in chunks {
        let ctx = ChunkContext::new(chunk, Arc::clone(&root), DecodeOptions::default())?;
        for event in ctx.events() {
            names.push(event?.type_name().to_string());
        }
    }
    assert_eq!(names, ["demo.Point", "demo.Point", "demo.Other"]);
    Ok(())
}

/// Same-shape chunks share one compiled plan through the root context.
#[test]
fn shares_plans_across_chunks() -> parflight::Result<()> {
    let mut bytes = points_chunk();
    bytes.extend_from_slice(&points_chunk());
    let recording = Recording::from_bytes(bytes);

    let root = Arc::new(RootContext::new());
    for chunk in recording.chunks() {
        let ctx = ChunkContext::new(chunk?, Arc::clone(&root), DecodeOptions::default())?;
        for event in ctx.events() {
            event?.value()?;
        }
    }

    // demo.Point has one shape, so the second chunk reuses the entry.
    assert_eq!(root.plan_cache().generic_len(), 1);
    Ok(())
}

/// each_event stops cleanly when the handler says so.
#[test]
fn each_event_stops_on_request() -> parflight::Result<()> {
    let recording = Recording::from_bytes(points_chunk());
    let ctx = first_chunk(&recording, DecodeOptions::default())?;

    let mut seen = 0;
    let flow = ctx.each_event(|descriptor, event| {
        assert_eq!(&*descriptor.name, event.type_name());
        seen += 1;
        Control::Stop
    })?;

    assert_eq!(flow, Control::Stop);
    assert_eq!(seen, 1);
    Ok(())
}

/// Extra payload bytes beyond the declared fields stay inside the envelope.
#[test]
fn tolerates_trailing_payload_bytes() -> parflight::Result<()> {
    let mut payload = [varint_i(3), varint_i(4)].concat();
    payload.extend_from_slice(&[0xde, 0xad]);
    let bytes = chunk()
        .declare(point_type())
        .event(POINT, &payload)
        .event(POINT, &[varint_i(10), varint_i(20)].concat())
        .build();

    // The record envelope bounds each decode, so the second event is intact.
    let values = collect_values(&bytes, DecodeOptions::default())?;
    assert_eq!(values.len(), 2);
    assert_eq!(values[1].field("x"), Some(&Value::Int(10)));
    Ok(())
}

/// The region element surfaces locale and GMT offset through chunk metadata.
#[test]
fn reads_region_metadata() -> parflight::Result<()> {
    let bytes = chunk()
        .declare(point_type())
        .region("en_US", 3_600_000)
        .build();
    let recording = Recording::from_bytes(bytes);
    let ctx = first_chunk(&recording, DecodeOptions::default())?;

    let region = ctx.metadata().region();
    assert_eq!(region.locale.as_deref(), Some("en_US"));
    assert_eq!(region.gmt_offset, Some(3_600_000));
    Ok(())
}

/// A chunk without a region element reports empty region info.
#[test]
fn region_defaults_when_absent() -> parflight::Result<()> {
    let recording = Recording::from_bytes(points_chunk());
    let ctx = first_chunk(&recording, DecodeOptions::default())?;

    assert_eq!(ctx.metadata().region().locale, None);
    assert_eq!(ctx.metadata().region().gmt_offset, None);
    Ok(())
}

/// Visitors see the parsed element tree in document order and can prune it.
#[test]
fn walks_metadata_elements() -> parflight::Result<()> {
    use parflight::metadata::Element;
    use parflight::visitor::{Flow, MetadataVisitor};

    // Collects class names, optionally refusing to enter one of them.
    #[derive(Default)]
    struct Classes {
        names: Vec<String>,
        fields: usize,
        skip: Option<&'static str>,
    }

    impl MetadataVisitor for Classes {
        fn visit_class(&mut self, element: &Element) -> Flow {
            let name = element.attribute("name").unwrap_or("?").to_string();
            let skip = self.skip == element.attribute("name");
            self.names.push(name);
            if skip { Flow::Skip } else { Flow::Continue }
        }
        fn visit_field(&mut self, _element: &Element) -> Flow {
            self.fields += 1;
            Flow::Continue
        }
    }

    let recording = Recording::from_bytes(points_chunk());
    let ctx = first_chunk(&recording, DecodeOptions::default())?;

    // 1. A full walk sees every class and both demo.Point fields.
    let mut all = Classes::default();
    assert_eq!(ctx.metadata().walk(&mut all), Flow::Continue);
    assert_eq!(all.names, ["int", "java.lang.String", "long", "demo.Point"]);
    assert_eq!(all.fields, 2);

    // 2. Skipping demo.Point prunes its fields but not its siblings.
    let mut pruned = Classes {
        skip: Some("demo.Point"),
        ..Classes::default()
    };
    ctx.metadata().walk(&mut pruned);
    assert_eq!(pruned.names.len(), 4);
    assert_eq!(pruned.fields, 0);
    Ok(())
}

// --- COMPRESSION ---

/// A stored-codec chunk decodes identically to its plain image.
#[test]
fn decodes_stored_chunks() -> parflight::Result<()> {
    let builder = chunk()
        .declare(point_type())
        .event(POINT, &[varint_i(3), varint_i(4)].concat());
    let plain = builder.build();

    let recording = Recording::from_bytes(builder.build_stored());
    let chunk = recording.chunks().next().expect("Recording has no chunks")?;
    assert!(chunk.compressed());

    let ctx = ChunkContext::new(chunk, Arc::new(RootContext::new()), DecodeOptions::default())?;
    let mut values = Vec::new();
    for event in ctx.events() {
        values.push(event?.into_value()?);
    }
    assert_eq!(values, collect_values(&plain, DecodeOptions::default())?);
    Ok(())
}

/// An LZ4 chunk decodes through the built-in codec.
#[cfg(feature = "lz4_flex")]
#[test]
fn decodes_lz4_chunks() -> parflight::Result<()> {
    let builder = chunk()
        .declare(point_type())
        .event(POINT, &[varint_i(3), varint_i(4)].concat());
    let plain = builder.build();

    let recording = Recording::from_bytes(builder.build_lz4());
    let ctx = first_chunk(&recording, DecodeOptions::default())?;
    let mut values = Vec::new();
    for event in ctx.events() {
        values.push(event?.into_value()?);
    }
    assert_eq!(values, collect_values(&plain, DecodeOptions::default())?);
    Ok(())
}

/// Pass-through codec under a custom id, wired in per recording.
#[derive(Debug)]
struct StoredAlias;

impl Decompressor for StoredAlias {
    fn id(&self) -> u8 {
        7
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> parflight::Result<Vec<u8>> {
        assert_eq!(data.len(), uncompressed_len);
        Ok(data.to_vec())
    }
}

/// Recordings accept caller-registered codecs for ids the library lacks.
#[test]
fn registers_custom_decompressor() -> parflight::Result<()> {
    // 1. Rewrite the stored body's codec id byte to the custom id.
    let mut bytes = chunk()
        .declare(point_type())
        .event(POINT, &[varint_i(3), varint_i(4)].concat())
        .build_stored();
    bytes[68] = 7;

    // 2. Without the codec the body is unreadable.
    let recording = Recording::from_bytes(bytes.clone());
    let chunk0 = recording.chunks().next().expect("Recording has no chunks")?;
    assert!(matches!(
        chunk0.body(),
        Err(parflight::ParflightError::CompressionUnsupported { codec: 7 })
    ));

    // 3. With it the chunk decodes normally.
    let mut recording = Recording::from_bytes(bytes);
    recording.register_decompressor(Box::new(StoredAlias));
    let ctx = first_chunk(&recording, DecodeOptions::default())?;
    assert_eq!(ctx.events().count(), 1);
    Ok(())
}
