#![allow(missing_docs)]

use graphwire::{
    Graph, GraphCodec, Shared, StreamInspector, TypeRegistry, Value, deserialize, serialize, shared,
};
use std::sync::Arc;

#[derive(Default, Graph)]
#[graph(name = "doc.Section")]
struct Section {
    title: String,
    page: i32,
    body: Vec<String>,
    parent: Option<Shared<Section>>,
}

fn registry() -> graphwire::Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry.register::<Section>()?;
    Ok(registry)
}

fn create_sections() -> Shared<Section> {
    let root = shared(Section {
        title: "Contents".into(),
        page: 1,
        body: (0..200).map(|i| format!("line {i}")).collect(),
        parent: None,
    });
    shared(Section {
        title: "Chapter 1".into(),
        page: 3,
        body: vec!["It begins.".into()],
        parent: Some(root),
    })
}

// --- TESTS ---

/// Validates `GraphCodec::save` and `GraphCodec::load`.
#[test]
fn standard_file_io() -> graphwire::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sections.gw");
    let codec = GraphCodec::new(registry()?);
    let chapter = create_sections();

    codec.save(&path, &Value::object(&chapter))?;
    let loaded = codec.load(&path)?;

    let copy = loaded.downcast::<Section>().expect("a section");
    let copy = copy.borrow();
    assert_eq!(copy.title, "Chapter 1");
    let parent = copy.parent.clone().expect("a parent");
    assert_eq!(parent.borrow().body.len(), 200);
    assert_eq!(parent.borrow().body[199], "line 199");
    Ok(())
}

/// Validates the free functions over a shared registry.
#[test]
fn memory_io() -> graphwire::Result<()> {
    let registry = Arc::new(registry()?);
    let chapter = create_sections();

    let mut buffer = Vec::new();
    serialize(&Value::object(&chapter), &mut buffer, &registry)?;
    let decoded = deserialize(buffer.as_slice(), &registry)?;

    let codec = GraphCodec::from_shared(Arc::clone(&registry), Default::default());
    assert_eq!(codec.to_bytes(&Value::object(&chapter))?, buffer);
    let copy = decoded.downcast::<Section>().expect("a section");
    assert_eq!(copy.borrow().page, 3);
    Ok(())
}

#[test]
fn loading_a_missing_file_is_an_io_error() -> graphwire::Result<()> {
    let dir = tempfile::tempdir()?;
    let codec = GraphCodec::new(registry()?);
    assert!(matches!(
        codec.load(dir.path().join("missing.gw")),
        Err(graphwire::GraphError::Io(_))
    ));
    Ok(())
}

#[test]
fn inspector_report_renders() -> graphwire::Result<()> {
    let codec = GraphCodec::new(registry()?);
    let bytes = codec.to_bytes(&Value::object(&create_sections()))?;
    let report = StreamInspector::inspect(&bytes, codec.registry())?;

    assert_eq!(report.total_bytes, bytes.len() as u64);
    assert_eq!(report.roots.len(), 1);
    assert!(report.roots[0].ends_with("Section"));
    assert_eq!(report.stats.objects, 2 + 2 + 2 + 201);

    let text = report.to_string();
    assert!(text.starts_with("=== GRAPHWIRE STREAM REPORT ==="));
    assert!(text.contains("[TYPES]"));
    assert!(text.contains("#12 doc.Section"));
    assert!(text.contains("body: [string"));
    assert!(text.contains("└── parent: doc.Section"));
    Ok(())
}
