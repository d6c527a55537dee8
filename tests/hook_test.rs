#![allow(missing_docs)]

use graphwire::{
    CustomFields, Externalize, Graph, GraphCodec, GraphError, ObjectInput, ObjectOutput, PutFields,
    Shared, TypeRegistry, Value, shared,
};

const TRAILER: i32 = 0x0BAD_F00D;

#[derive(Default, Graph)]
#[graph(name = "bank.Ledger")]
struct Ledger {
    name: String,
}

#[derive(Default, Graph)]
#[graph(name = "bank.Account", custom)]
struct Account {
    #[graph(base)]
    ledger: Ledger,
    owner: String,
    balance: i64,
    #[graph(skip)]
    audited: bool,
    #[graph(skip)]
    note: Option<String>,
}

impl CustomFields for Account {
    fn write_object(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        out.default_write_fields(self)?;
        out.write_i32(TRAILER)?;
        let mut extra = PutFields::new();
        extra.put("audited", &true)?.put("note", &self.owner.to_uppercase())?;
        out.write_fields(&extra)
    }

    fn read_object(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        input.default_read_fields(self)?;
        if input.read_i32()? != TRAILER {
            return Err(GraphError::message("missing trailer"));
        }
        let extra = input.read_fields()?;
        self.audited = extra.get("audited", false)?;
        self.note = extra.get("note", None)?;
        assert!(extra.defaulted("missing"));
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Graph)]
#[graph(name = "geo.Point", externalizable)]
struct Point {
    x: i32,
    y: i32,
    tag: String,
}

impl Externalize for Point {
    fn write_external(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        out.write_i32(self.x)?;
        out.write_i32(self.y)?;
        out.write(&self.tag)
    }

    fn read_external(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        self.x = input.read_i32()?;
        self.y = input.read_i32()?;
        self.tag = input.read()?;
        Ok(())
    }
}

#[derive(Default, Graph)]
#[graph(name = "geo.Segment")]
struct Segment {
    from: Option<Shared<Point>>,
    to: Option<Shared<Point>>,
}

/// A hook that refers back to the object holding it.
#[derive(Default, Graph)]
#[graph(name = "graph.Node", custom)]
struct Node {
    id: i32,
    parent: Option<Shared<Node>>,
}

impl CustomFields for Node {
    fn write_object(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        let mut fields = PutFields::new();
        fields.put("id", &self.id)?.put("parent", &self.parent)?;
        out.write_fields(&fields)
    }

    fn read_object(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        let fields = input.read_fields()?;
        self.id = fields.get("id", -1)?;
        self.parent = fields.get("parent", None)?;
        Ok(())
    }
}

fn codec() -> graphwire::Result<GraphCodec> {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Account>()?
        .register::<Segment>()?
        .register::<Node>()?;
    Ok(GraphCodec::new(registry))
}

#[test]
fn hooks_mix_default_fields_raw_values_and_field_sets() -> graphwire::Result<()> {
    let codec = codec()?;
    let account = shared(Account {
        ledger: Ledger { name: "main".into() },
        owner: "ada".into(),
        balance: 1_000,
        audited: false,
        note: None,
    });

    let decoded = codec.from_bytes(&codec.to_bytes(&Value::object(&account))?)?;
    let copy = decoded.downcast::<Account>().expect("an account");
    let copy = copy.borrow();
    assert_eq!(copy.ledger.name, "main");
    assert_eq!(copy.owner, "ada");
    assert_eq!(copy.balance, 1_000);
    assert!(copy.audited);
    assert_eq!(copy.note.as_deref(), Some("ADA"));
    Ok(())
}

#[test]
fn hooked_levels_follow_their_base() -> graphwire::Result<()> {
    let codec = codec()?;
    let account = shared(Account {
        ledger: Ledger { name: "L".into() },
        owner: "o".into(),
        ..Default::default()
    });
    let bytes = codec.to_bytes(&Value::object(&account))?;

    // Ledger's field comes first, then the hook's default walk.
    let ledger_name = [2, 0, 0, 0, 2, 0, 0, 0, 11, 0, 0, 0, 1, b'L'];
    let owner = [2, 0, 0, 0, 3, 0, 0, 0, 11, 0, 0, 0, 1, b'o'];
    let at = |needle: &[u8]| bytes.windows(needle.len()).position(|w| w == needle);
    let (Some(ledger_at), Some(owner_at)) = (at(&ledger_name), at(&owner)) else {
        panic!("both strings are in the stream");
    };
    assert!(ledger_at < owner_at);
    Ok(())
}

#[test]
fn field_sets_carry_references_and_cycles() -> graphwire::Result<()> {
    let codec = codec()?;
    let root = shared(Node { id: 1, parent: None });
    root.borrow_mut().parent = Some(root.clone());
    let child = shared(Node { id: 2, parent: Some(root.clone()) });

    let decoded = codec.from_bytes(&codec.to_bytes(&Value::object(&child))?)?;
    let child2 = decoded.downcast::<Node>().expect("a node");
    let root2 = child2.borrow().parent.clone().expect("a parent");
    let root_parent = root2.borrow().parent.clone().expect("itself");
    assert_eq!(child2.borrow().id, 2);
    assert_eq!(root2.borrow().id, 1);
    assert!(std::rc::Rc::ptr_eq(&root2, &root_parent));

    root.borrow_mut().parent = None;
    root2.borrow_mut().parent = None;
    Ok(())
}

#[test]
fn externalizable_objects_round_trip_and_stay_shared() -> graphwire::Result<()> {
    let codec = codec()?;
    let p = shared(Point { x: -4, y: 9, tag: "corner".into() });
    let segment = shared(Segment {
        from: Some(p.clone()),
        to: Some(p.clone()),
    });

    let decoded = codec.from_bytes(&codec.to_bytes(&Value::object(&segment))?)?;
    let copy = decoded.downcast::<Segment>().expect("a segment");
    let copy = copy.borrow();
    let from = copy.from.clone().expect("from");
    let to = copy.to.clone().expect("to");
    assert!(std::rc::Rc::ptr_eq(&from, &to));
    assert_eq!(
        *from.borrow(),
        Point { x: -4, y: 9, tag: "corner".into() }
    );
    Ok(())
}

#[derive(Default, Graph)]
#[graph(name = "fail.Fragile", custom)]
struct Fragile {
    fail_on_write: bool,
    fail_on_read: bool,
}

impl CustomFields for Fragile {
    fn write_object(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        if self.fail_on_write {
            return Err(GraphError::message("refusing to write"));
        }
        out.default_write_fields(self)
    }

    fn read_object(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        input.default_read_fields(self)?;
        if self.fail_on_read {
            return Err(GraphError::message("refusing to read"));
        }
        Ok(())
    }
}

#[derive(Default, Graph)]
#[graph(name = "fail.Stubborn", externalizable)]
struct Stubborn;

impl Externalize for Stubborn {
    fn write_external(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        out.write_u8(1)
    }

    fn read_external(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        // Reads past the single byte that was written.
        input.read_u8()?;
        input.read_u8()?;
        Ok(())
    }
}

#[test]
fn failing_hooks_are_wrapped() -> graphwire::Result<()> {
    let mut registry = TypeRegistry::new();
    registry.register::<Fragile>()?.register::<Stubborn>()?;
    let codec = GraphCodec::new(registry);

    let on_write = shared(Fragile { fail_on_write: true, fail_on_read: false });
    let err = codec.to_bytes(&Value::object(&on_write)).err().expect("write fails");
    assert!(matches!(&err, GraphError::HookFailure { type_name, .. } if type_name == "fail.Fragile"));
    assert!(matches!(err.root_cause(), GraphError::Message(m) if m == "refusing to write"));

    let on_read = shared(Fragile { fail_on_write: false, fail_on_read: true });
    let bytes = codec.to_bytes(&Value::object(&on_read))?;
    let err = codec.from_bytes(&bytes).err().expect("read fails");
    assert!(matches!(err, GraphError::HookFailure { .. }));

    let bytes = codec.to_bytes(&Value::object(&shared(Stubborn)))?;
    let err = codec.from_bytes(&bytes).err().expect("read fails");
    assert!(matches!(&err, GraphError::ExternalizationFailure { type_name, .. } if type_name == "fail.Stubborn"));
    assert!(matches!(err.root_cause(), GraphError::Truncated));
    Ok(())
}

/// A plain type whose base level is externalizable.
#[derive(Default, Graph)]
#[graph(name = "geo.Marker")]
struct Marker {
    #[graph(base)]
    point: Point,
    label: String,
}

#[test]
fn externalizable_bases_encode_through_their_routines() -> graphwire::Result<()> {
    let mut registry = TypeRegistry::new();
    registry.register::<Marker>()?;
    let codec = GraphCodec::new(registry);
    let marker = shared(Marker {
        point: Point { x: 5, y: 7, tag: "origin".into() },
        label: "here".into(),
    });

    let bytes = codec.to_bytes(&Value::object(&marker))?;
    let decoded = codec.from_bytes(&bytes)?;
    let copy = decoded.downcast::<Marker>().expect("a marker");
    let copy = copy.borrow();
    assert_eq!(copy.point, Point { x: 5, y: 7, tag: "origin".into() });
    assert_eq!(copy.label, "here");

    // The base payload precedes the derived field.
    let raw_x = [0, 0, 0, 5, 0, 0, 0, 7];
    let at = |needle: &[u8]| bytes.windows(needle.len()).position(|w| w == needle);
    let (Some(x_at), Some(label_at)) = (at(&raw_x), at(b"here")) else {
        panic!("both values are in the stream");
    };
    assert!(x_at < label_at);
    Ok(())
}

#[derive(Default, Graph)]
#[graph(name = "fail.Sneaky", externalizable)]
struct Sneaky {
    walk_on_write: bool,
}

impl Externalize for Sneaky {
    fn write_external(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        if self.walk_on_write {
            return out.default_write_fields(self);
        }
        out.write_u8(0)
    }

    fn read_external(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        input.default_read_fields(self)
    }
}

#[derive(Default, Graph)]
#[graph(name = "fail.Holder", custom)]
struct Holder {
    inner: Option<Shared<Sneaky>>,
}

impl CustomFields for Holder {
    fn write_object(&self, out: &mut dyn ObjectOutput) -> graphwire::Result<()> {
        out.write(&self.inner)
    }

    fn read_object(&mut self, input: &mut dyn ObjectInput) -> graphwire::Result<()> {
        self.inner = input.read()?;
        Ok(())
    }
}

#[test]
fn externalized_payloads_have_no_default_walk() -> graphwire::Result<()> {
    let mut registry = TypeRegistry::new();
    registry.register::<Holder>()?;
    let codec = GraphCodec::new(registry);
    let inside_hook = |err: &GraphError| {
        matches!(err, GraphError::ExternalizationFailure { type_name, .. } if type_name == "fail.Sneaky")
            && matches!(err.root_cause(), GraphError::Internal(m) if m.contains("externalized payload"))
    };

    let holder = shared(Holder {
        inner: Some(shared(Sneaky { walk_on_write: true })),
    });
    let err = codec.to_bytes(&Value::object(&holder)).err().expect("write fails");
    assert!(inside_hook(&err), "unexpected error {err:?}");

    let holder = shared(Holder {
        inner: Some(shared(Sneaky { walk_on_write: false })),
    });
    let bytes = codec.to_bytes(&Value::object(&holder))?;
    let err = codec.from_bytes(&bytes).err().expect("read fails");
    assert!(inside_hook(&err), "unexpected error {err:?}");
    Ok(())
}
