//! The dynamic value model the codec reads and writes.
//!
//! A graph is made of [`Value`]s. Objects and arrays are shared cells
//! (`Rc<RefCell<_>>`), so a graph may contain shared and cyclic references; the
//! interior mutability lets the reader register an instance before its fields are
//! populated.

use crate::error::{GraphError, Result};
use std::any::{Any, TypeId, type_name};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// A shared, mutable graph node of type `T`.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wraps a value into a [`Shared`] cell.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// The primitive scalar kinds of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    /// One byte, 0 or 1.
    Bool,
    /// Unsigned byte.
    U8,
    /// Signed byte.
    I8,
    /// 2-byte signed integer.
    I16,
    /// 2-byte unsigned integer.
    U16,
    /// 4-byte signed integer.
    I32,
    /// 8-byte signed integer.
    I64,
    /// 4-byte IEEE-754 float.
    F32,
    /// 8-byte IEEE-754 float.
    F64,
}

impl PrimitiveKind {
    /// All kinds, in bootstrap handle order.
    pub const ALL: [PrimitiveKind; 9] = [
        Self::Bool,
        Self::U8,
        Self::I8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::I64,
        Self::F32,
        Self::F64,
    ];

    /// One-byte code of the kind, equal to its bootstrap descriptor handle.
    pub const fn code(self) -> u8 {
        match self {
            Self::Bool => 1,
            Self::U8 => 2,
            Self::I8 => 3,
            Self::I16 => 4,
            Self::U16 => 5,
            Self::I32 => 6,
            Self::I64 => 7,
            Self::F32 => 8,
            Self::F64 => 9,
        }
    }

    /// Inverse of [`PrimitiveKind::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// The wire name of the kind.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Inverse of [`PrimitiveKind::wire_name`].
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.wire_name() == name)
    }

    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

/// Identifies a local type, independently of any session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// A primitive scalar.
    Primitive(PrimitiveKind),
    /// The universal root type; a slot of this type accepts any value.
    Root,
    /// The string type.
    String,
    /// An array of the given component type.
    Array(Box<TypeKey>),
    /// A registered struct or enum.
    Named(TypeId),
}

impl TypeKey {
    /// The key of a registered Rust type.
    pub fn of<T: Any>() -> Self {
        Self::Named(TypeId::of::<T>())
    }

    /// The key of an array whose component is `component`.
    pub fn array_of(component: TypeKey) -> Self {
        Self::Array(Box::new(component))
    }
}

/// A constant of a registered enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// The enum's Rust type.
    pub type_id: TypeId,
    /// The constant's name.
    pub name: &'static str,
}

impl EnumValue {
    /// Creates the constant `name` of enum `T`.
    pub fn new<T: Any>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name,
        }
    }
}

/// Contents of an array value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// `[bool]`
    Bool(Vec<bool>),
    /// `[u8]`
    U8(Vec<u8>),
    /// `[i8]`
    I8(Vec<i8>),
    /// `[i16]`
    I16(Vec<i16>),
    /// `[u16]`
    U16(Vec<u16>),
    /// `[i32]`
    I32(Vec<i32>),
    /// `[i64]`
    I64(Vec<i64>),
    /// `[f32]`
    F32(Vec<f32>),
    /// `[f64]`
    F64(Vec<f64>),
    /// Array of references: strings, enums, objects, nested arrays or untyped values.
    Values {
        /// Declared element type.
        component: TypeKey,
        /// Elements; each is `Null` or a value of `component`.
        items: Vec<Value>,
    },
}

impl ArrayData {
    /// Element count.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Values { items, .. } => items.len(),
        }
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The declared component type.
    pub fn component(&self) -> TypeKey {
        match self {
            Self::Values { component, .. } => component.clone(),
            other => other.primitive_kind().map_or(TypeKey::Root, TypeKey::Primitive),
        }
    }

    /// The primitive component kind, if this is a primitive array.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::U8(_) => PrimitiveKind::U8,
            Self::I8(_) => PrimitiveKind::I8,
            Self::I16(_) => PrimitiveKind::I16,
            Self::U16(_) => PrimitiveKind::U16,
            Self::I32(_) => PrimitiveKind::I32,
            Self::I64(_) => PrimitiveKind::I64,
            Self::F32(_) => PrimitiveKind::F32,
            Self::F64(_) => PrimitiveKind::F64,
            Self::Values { .. } => return None,
        })
    }

    /// The type key of the array itself.
    pub fn type_key(&self) -> TypeKey {
        TypeKey::array_of(self.component())
    }
}

/// A shared array cell.
pub type ArrayRef = Shared<ArrayData>;

type BorrowFn = for<'a> fn(&'a dyn Any) -> Result<Ref<'a, dyn Any + 'static>>;
type BorrowMutFn = for<'a> fn(&'a dyn Any) -> Result<RefMut<'a, dyn Any + 'static>>;

/// A type-erased shared object: an `Rc<RefCell<T>>` for some registered `T`.
///
/// Cloning an `ObjectRef` clones the `Rc`; equality is pointer identity.
#[derive(Clone)]
pub struct ObjectRef {
    type_id: TypeId,
    type_name: &'static str,
    cell: Rc<dyn Any>,
    borrow: BorrowFn,
    borrow_mut: BorrowMutFn,
}

fn borrow_cell<T: Any>(cell: &dyn Any) -> Result<Ref<'_, dyn Any + 'static>> {
    let cell = cell
        .downcast_ref::<RefCell<T>>()
        .ok_or_else(|| GraphError::Internal(format!("object cell is not a {}", type_name::<T>())))?;
    let guard = cell.try_borrow().map_err(|_| {
        GraphError::Internal(format!("{} is mutably borrowed", type_name::<T>()))
    })?;
    Ok(Ref::map(guard, |v| v as &dyn Any))
}

fn borrow_cell_mut<T: Any>(cell: &dyn Any) -> Result<RefMut<'_, dyn Any + 'static>> {
    let cell = cell
        .downcast_ref::<RefCell<T>>()
        .ok_or_else(|| GraphError::Internal(format!("object cell is not a {}", type_name::<T>())))?;
    let guard = cell
        .try_borrow_mut()
        .map_err(|_| GraphError::Internal(format!("{} is already borrowed", type_name::<T>())))?;
    Ok(RefMut::map(guard, |v| v as &mut dyn Any))
}

impl ObjectRef {
    /// Erases a shared object.
    pub fn new<T: Any>(object: Shared<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            cell: object,
            borrow: borrow_cell::<T>,
            borrow_mut: borrow_cell_mut::<T>,
        }
    }

    /// The Rust type of the object.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The Rust type name of the object, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Immutably borrows the object.
    pub fn borrow(&self) -> Result<Ref<'_, dyn Any + 'static>> {
        (self.borrow)(&*self.cell)
    }

    /// Mutably borrows the object.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, dyn Any + 'static>> {
        (self.borrow_mut)(&*self.cell)
    }

    /// Recovers the typed cell.
    pub fn downcast<T: Any>(&self) -> Option<Shared<T>> {
        Rc::clone(&self.cell).downcast::<RefCell<T>>().ok()
    }

    /// Returns true if both references point to the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.address() == other.address()
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.cell).cast::<()>() as usize
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{:#x})", self.type_name, self.address())
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Identity of a value within a write session.
///
/// Objects, arrays and strings are identified by allocation; enum constants are
/// singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// An `Rc` allocation.
    Ptr(usize),
    /// An enum constant.
    Constant(TypeId, &'static str),
    /// The name string of an enum constant, shared by every use of that name.
    ConstantName(&'static str),
}

/// A dynamically typed graph value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The null reference.
    #[default]
    Null,
    /// Boxed `bool`.
    Bool(bool),
    /// Boxed `u8`.
    U8(u8),
    /// Boxed `i8`.
    I8(i8),
    /// Boxed `i16`.
    I16(i16),
    /// Boxed `u16`.
    U16(u16),
    /// Boxed `i32`.
    I32(i32),
    /// Boxed `i64`.
    I64(i64),
    /// Boxed `f32`.
    F32(f32),
    /// Boxed `f64`.
    F64(f64),
    /// A string; identity is the `Rc` allocation.
    Str(Rc<str>),
    /// An enum constant.
    Enum(EnumValue),
    /// An array.
    Array(ArrayRef),
    /// An object of a registered type.
    Object(ObjectRef),
    /// A reference to a type itself.
    Type(TypeKey),
}

impl Value {
    /// Wraps a shared object.
    pub fn object<T: Any>(object: &Shared<T>) -> Self {
        Self::Object(ObjectRef::new(Rc::clone(object)))
    }

    /// Creates a string value.
    pub fn string(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    /// Creates a new array value.
    pub fn array(data: ArrayData) -> Self {
        Self::Array(shared(data))
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The primitive kind of a boxed primitive.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::U8(_) => PrimitiveKind::U8,
            Self::I8(_) => PrimitiveKind::I8,
            Self::I16(_) => PrimitiveKind::I16,
            Self::U16(_) => PrimitiveKind::U16,
            Self::I32(_) => PrimitiveKind::I32,
            Self::I64(_) => PrimitiveKind::I64,
            Self::F32(_) => PrimitiveKind::F32,
            Self::F64(_) => PrimitiveKind::F64,
            _ => return None,
        })
    }

    /// The runtime type of the value; `None` for `Null` and type references.
    pub fn type_key(&self) -> Result<Option<TypeKey>> {
        Ok(match self {
            Self::Null | Self::Type(_) => None,
            Self::Str(_) => Some(TypeKey::String),
            Self::Enum(e) => Some(TypeKey::Named(e.type_id)),
            Self::Array(a) => Some(
                a.try_borrow()
                    .map_err(|_| GraphError::Internal("array is mutably borrowed".into()))?
                    .type_key(),
            ),
            Self::Object(o) => Some(TypeKey::Named(o.type_id())),
            other => other.primitive_kind().map(TypeKey::Primitive),
        })
    }

    /// The write-session identity; boxed primitives have none and are never shared.
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Self::Str(s) => Some(Identity::Ptr(Rc::as_ptr(s).cast::<u8>() as usize)),
            Self::Enum(e) => Some(Identity::Constant(e.type_id, e.name)),
            Self::Array(a) => Some(Identity::Ptr(Rc::as_ptr(a).cast::<()>() as usize)),
            Self::Object(o) => Some(Identity::Ptr(o.address())),
            _ => None,
        }
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The object reference, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The array cell, if this is an array.
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Recovers a typed object.
    pub fn downcast<T: Any>(&self) -> Option<Shared<T>> {
        self.as_object().and_then(ObjectRef::downcast::<T>)
    }

    /// Returns true if both values are the same shared allocation.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Structural equality for scalars, strings, enums and arrays; identity for objects.
///
/// Arrays that contain themselves compare in finite time: a pair of arrays already
/// under comparison is assumed equal when it is reached again.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_within(other, &mut HashSet::new())
    }
}

impl Value {
    fn eq_within(&self, other: &Self, visited: &mut HashSet<(*const (), *const ())>) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let pair = (Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>());
                if !visited.insert(pair) {
                    return true;
                }
                let (Ok(x), Ok(y)) = (a.try_borrow(), b.try_borrow()) else {
                    return false;
                };
                match (&*x, &*y) {
                    (
                        ArrayData::Values { component: ca, items: xs },
                        ArrayData::Values { component: cb, items: ys },
                    ) => {
                        ca == cb
                            && xs.len() == ys.len()
                            && xs.iter().zip(ys).all(|(p, q)| p.eq_within(q, visited))
                    }
                    (x, y) => x == y,
                }
            }
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Type(a), Self::Type(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from!(bool => Bool, u8 => U8, i8 => I8, i16 => I16, u16 => U16, i32 => I32, i64 => I64, f32 => F32, f64 => F64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<ArrayData> for Value {
    fn from(data: ArrayData) -> Self {
        Self::array(data)
    }
}
