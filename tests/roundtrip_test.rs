#![allow(missing_docs)]

use graphwire::{
    ArrayData, EnumValue, FieldValue, Graph, GraphCodec, Shared, StreamInspector, TypeKey,
    TypeRegistry, Value, shared,
};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Default, Graph)]
#[graph(name = "demo.Color")]
enum Color {
    #[default]
    Red,
    Green,
    Blue,
}

#[derive(Default, Graph)]
#[graph(name = "demo.Everything")]
struct Everything {
    flag: bool,
    byte: u8,
    small: i8,
    short: i16,
    unsigned: u16,
    int: i32,
    long: i64,
    single: f32,
    double: f64,
    text: String,
    maybe: Option<String>,
    color: Color,
    palette: Vec<Color>,
    numbers: Vec<i64>,
    words: Vec<String>,
    matrix: Vec<Vec<u16>>,
    anything: Value,
    #[graph(skip)]
    scratch: i32,
}

#[derive(Default, Graph)]
#[graph(name = "shape.Shape")]
struct Shape {
    id: i32,
    label: String,
}

#[derive(Default, Graph)]
#[graph(name = "shape.Circle")]
struct Circle {
    #[graph(base)]
    shape: Shape,
    radius: f64,
}

#[derive(Default, Graph)]
#[graph(name = "shape.Ring")]
struct Ring {
    #[graph(base)]
    circle: Circle,
    inner: f64,
    shared_name: Option<Rc<str>>,
}

fn codec() -> graphwire::Result<GraphCodec> {
    let mut registry = TypeRegistry::new();
    registry.register::<Everything>()?.register::<Ring>()?;
    Ok(GraphCodec::new(registry))
}

fn round_trip(codec: &GraphCodec, value: &Value) -> graphwire::Result<Value> {
    codec.from_bytes(&codec.to_bytes(value)?)
}

#[test]
fn boxed_primitives_and_strings() -> graphwire::Result<()> {
    let codec = codec()?;
    let values = [
        Value::Bool(true),
        Value::U8(250),
        Value::I8(-5),
        Value::I16(-30_000),
        Value::U16(65_000),
        Value::I32(i32::MIN),
        Value::I64(i64::MAX),
        Value::F32(-0.0),
        Value::F64(f64::NAN),
        Value::string(""),
        Value::string("héllo wörld"),
        Value::Null,
    ];
    for value in &values {
        assert_eq!(&round_trip(&codec, value)?, value);
    }
    Ok(())
}

#[test]
fn all_field_kinds() -> graphwire::Result<()> {
    let codec = codec()?;
    let original = shared(Everything {
        flag: true,
        byte: 7,
        small: -7,
        short: -300,
        unsigned: 300,
        int: 123_456,
        long: -9_876_543_210,
        single: 1.25,
        double: -2.5e100,
        text: "text".into(),
        maybe: None,
        color: Color::Blue,
        palette: vec![Color::Green, Color::Red, Color::Green],
        numbers: (0..5_000).collect(),
        words: vec!["a".into(), "".into(), "c".into()],
        matrix: vec![vec![1, 2], vec![], vec![3]],
        anything: Value::I32(42),
        scratch: 99,
    });

    let decoded = round_trip(&codec, &Value::object(&original))?;
    let copy = decoded.downcast::<Everything>().expect("an Everything");
    let copy = copy.borrow();
    assert!(copy.flag);
    assert_eq!(copy.byte, 7);
    assert_eq!(copy.small, -7);
    assert_eq!(copy.short, -300);
    assert_eq!(copy.unsigned, 300);
    assert_eq!(copy.int, 123_456);
    assert_eq!(copy.long, -9_876_543_210);
    assert_eq!(copy.single, 1.25);
    assert_eq!(copy.double, -2.5e100);
    assert_eq!(copy.text, "text");
    assert_eq!(copy.maybe, None);
    assert_eq!(copy.color, Color::Blue);
    assert_eq!(copy.palette, vec![Color::Green, Color::Red, Color::Green]);
    assert_eq!(copy.numbers, (0..5_000).collect::<Vec<i64>>());
    assert_eq!(copy.words, vec!["a", "", "c"]);
    assert_eq!(copy.matrix, vec![vec![1, 2], vec![], vec![3]]);
    assert_eq!(copy.anything, Value::I32(42));
    assert_eq!(copy.scratch, 0, "skipped fields come back as Default");
    Ok(())
}

#[test]
fn enum_constants_round_trip() -> graphwire::Result<()> {
    let codec = codec()?;
    let decoded = round_trip(&codec, &Color::Green.to_value()?)?;
    assert_eq!(decoded, Value::Enum(EnumValue::new::<Color>("Green")));
    assert_eq!(Color::from_value(decoded)?, Color::Green);

    let mut writer = codec.writer(Vec::new())?;
    writer.write(&Color::Blue)?;
    writer.write(&Color::Blue)?;
    writer.write(&vec![Color::Red, Color::Blue])?;
    let bytes = writer.into_inner()?;

    let mut reader = codec.reader(bytes.as_slice())?;
    let first = reader.read_value()?;
    let second = reader.read_value()?;
    assert!(first.same_identity(&second));
    assert_eq!(reader.read::<Vec<Color>>()?, vec![Color::Red, Color::Blue]);
    Ok(())
}

#[test]
fn inherited_fields_round_trip() -> graphwire::Result<()> {
    let codec = codec()?;
    let name: Rc<str> = Rc::from("ring");
    let ring = shared(Ring {
        circle: Circle {
            shape: Shape { id: 3, label: "outer".into() },
            radius: 2.0,
        },
        inner: 1.0,
        shared_name: Some(name),
    });

    let decoded = round_trip(&codec, &Value::object(&ring))?;
    let copy = decoded.downcast::<Ring>().expect("a ring");
    let copy = copy.borrow();
    assert_eq!(copy.circle.shape.id, 3);
    assert_eq!(copy.circle.shape.label, "outer");
    assert_eq!(copy.circle.radius, 2.0);
    assert_eq!(copy.inner, 1.0);
    assert_eq!(copy.shared_name.as_deref(), Some("ring"));
    Ok(())
}

#[test]
fn base_fields_precede_derived_fields() -> graphwire::Result<()> {
    let codec = codec()?;
    let circle = shared(Circle {
        shape: Shape { id: 7, label: "c".into() },
        radius: 1.5,
    });
    let bytes = codec.to_bytes(&Value::object(&circle))?;

    // id (base), label (base, a string record), radius (derived)
    let mut payload = vec![0, 0, 0, 7];
    payload.extend_from_slice(&[2, 0, 0, 0, 2, 0, 0, 0, 11, 0, 0, 0, 1, b'c']);
    payload.extend_from_slice(&1.5f64.to_bits().to_be_bytes());
    assert!(bytes.ends_with(&payload));

    let report = StreamInspector::inspect(&bytes, codec.registry())?;
    let circle_desc = report
        .descriptors
        .iter()
        .find(|d| d.wire_name == "shape.Circle")
        .expect("circle descriptor");
    assert_eq!(circle_desc.super_type.as_deref(), Some("shape.Shape"));
    assert_eq!(circle_desc.fields, vec![("radius".to_string(), "f64".to_string())]);
    // The derived type takes its handle first; its base follows.
    assert_eq!(circle_desc.handle, 12);
    assert_eq!(report.descriptors[1].wire_name, "shape.Shape");
    assert_eq!(report.descriptors[1].super_type, None);
    Ok(())
}

#[test]
fn arrays_of_references() -> graphwire::Result<()> {
    let codec = codec()?;
    let shape = shared(Shape { id: 1, label: "s".into() });
    let text = Value::string("shared");
    let array = Value::array(ArrayData::Values {
        component: TypeKey::Root,
        items: vec![
            Value::object(&shape),
            text.clone(),
            Value::Null,
            Value::object(&shape),
            text,
            Value::I64(5),
            Value::Enum(EnumValue::new::<Color>("Red")),
        ],
    });

    let decoded = round_trip(&codec, &array)?;
    let cell = decoded.as_array().expect("an array");
    let data = cell.borrow();
    let ArrayData::Values { component, items } = &*data else {
        unreachable!("object arrays decode to reference arrays");
    };
    assert_eq!(component, &TypeKey::Root);
    assert_eq!(items.len(), 7);
    assert!(items[0].same_identity(&items[3]));
    assert!(items[1].same_identity(&items[4]));
    assert!(items[2].is_null());
    assert_eq!(items[5], Value::I64(5));
    assert_eq!(items[6], Value::Enum(EnumValue::new::<Color>("Red")));
    let s: Shared<Shape> = items[0].downcast().expect("a shape");
    assert_eq!(s.borrow().label, "s");
    Ok(())
}

#[test]
fn array_containing_itself() -> graphwire::Result<()> {
    let codec = codec()?;
    let cell = shared(ArrayData::Values {
        component: TypeKey::Root,
        items: Vec::new(),
    });
    if let ArrayData::Values { items, .. } = &mut *cell.borrow_mut() {
        items.push(Value::Array(cell.clone()));
    }

    let decoded = round_trip(&codec, &Value::Array(cell.clone()))?;
    let decoded_cell = decoded.as_array().expect("an array");
    let inner = match &*decoded_cell.borrow() {
        ArrayData::Values { items, .. } => items[0].clone(),
        _ => Value::Null,
    };
    assert!(inner.same_identity(&decoded));
    assert!(!decoded.same_identity(&Value::Array(cell.clone())));
    assert_eq!(decoded, Value::Array(cell.clone()));

    // Break the reference cycles so the test does not leak.
    *cell.borrow_mut() = ArrayData::U8(Vec::new());
    *decoded_cell.borrow_mut() = ArrayData::U8(Vec::new());
    Ok(())
}

#[test]
fn bulk_arrays_cross_scratch_boundaries() -> graphwire::Result<()> {
    let codec = GraphCodec::with_config(
        TypeRegistry::new(),
        graphwire::CodecConfig::default().with_scratch_size(24),
    );
    let samples = [
        ArrayData::Bool((0..101).map(|i| i % 3 == 0).collect()),
        ArrayData::U8((0..=255).collect()),
        ArrayData::I8((-100..100).collect()),
        ArrayData::I16((0..1_000).map(|i| i * 7 - 3_000).collect()),
        ArrayData::U16((0..1_000).collect()),
        ArrayData::I64((0..333).map(|i| i * i * i - 1).collect()),
        ArrayData::F32((0..77).map(|i| i as f32 / 3.0).collect()),
        ArrayData::F64((0..77).map(|i| (i as f64).sqrt()).collect()),
    ];
    for data in samples {
        let value = Value::array(data);
        assert_eq!(round_trip(&codec, &value)?, value);
    }
    Ok(())
}
