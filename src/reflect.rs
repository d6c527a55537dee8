//! Traits connecting Rust types to the codec.
//!
//! * [`Reflect`] describes a struct or enum for the [`TypeRegistry`].
//! * [`FieldValue`] converts a field's Rust type to and from a [`Value`].
//! * [`ArrayElement`] converts a `Vec<E>` to and from an array value.
//! * [`CustomFields`] and [`Externalize`] replace the default field walk.
//!
//! `#[derive(Graph)]` implements the first three for user types; the primitive,
//! string, reference and vector implementations live here.

use crate::error::{GraphError, Result};
use crate::hook::{ObjectInput, ObjectOutput};
use crate::registry::{TypeInfo, TypeRegistry};
use crate::value::{ArrayData, ObjectRef, PrimitiveKind, Shared, TypeKey, Value};
use std::any::{Any, type_name};
use std::rc::Rc;

/// A type that can describe itself to a [`TypeRegistry`].
pub trait Reflect: Any {
    /// Builds the type's description, registering every type it references.
    fn describe(registry: &mut TypeRegistry) -> Result<TypeInfo>;
}

/// A unit-only enum known to the codec.
pub trait EnumType: Reflect + Sized {
    /// The constant's name.
    fn variant_name(&self) -> &'static str;
    /// The constant named `name`.
    fn from_variant_name(name: &str) -> Option<Self>;
}

/// A Rust type usable as a field of a registered struct.
pub trait FieldValue: Sized {
    /// The declared type of a field of this Rust type. Registers referenced types.
    fn field_type(registry: &mut TypeRegistry) -> Result<TypeKey>;
    /// Converts the field to a graph value.
    fn to_value(&self) -> Result<Value>;
    /// Converts a decoded graph value back to the field type.
    fn from_value(value: Value) -> Result<Self>;
}

/// A Rust type usable as the element of a `Vec` field.
pub trait ArrayElement: Sized {
    /// The array's component type.
    fn element_key() -> TypeKey;
    /// Registers the types the component references.
    fn register_element(_registry: &mut TypeRegistry) -> Result<()> {
        Ok(())
    }
    /// Builds the array contents.
    fn to_array(items: &[Self]) -> Result<ArrayData>;
    /// Extracts the elements of decoded array contents.
    fn from_array(data: &ArrayData) -> Result<Vec<Self>>;
}

/// Custom per-level encoding.
///
/// The hook runs in place of the default field walk of the type's own level;
/// base levels are still encoded before it. Inside a hook, the type may call
/// [`ObjectOutput::default_write_fields`] / [`ObjectInput::default_read_fields`]
/// for its declared fields and exchange extra named fields through
/// [`crate::PutFields`] / [`crate::GetFields`].
pub trait CustomFields: Any {
    /// Writes this level's payload.
    fn write_object(&self, out: &mut dyn ObjectOutput) -> Result<()>;
    /// Reads this level's payload into a default-initialized instance.
    fn read_object(&mut self, input: &mut dyn ObjectInput) -> Result<()>;
}

/// Full externalization: the type encodes its entire payload itself.
pub trait Externalize: Any {
    /// Writes the complete payload.
    fn write_external(&self, out: &mut dyn ObjectOutput) -> Result<()>;
    /// Reads the complete payload into a default-initialized instance.
    fn read_external(&mut self, input: &mut dyn ObjectInput) -> Result<()>;
}

pub(crate) fn mismatch<T>(value: &Value) -> GraphError {
    GraphError::TypeMismatch(format!(
        "cannot convert {} into {}",
        describe_value(value),
        type_name::<T>()
    ))
}

pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Str(_) => "a string".into(),
        Value::Enum(e) => format!("enum constant {}", e.name),
        Value::Array(_) => "an array".into(),
        Value::Object(o) => format!("an object of {}", o.type_name()),
        Value::Type(_) => "a type reference".into(),
        other => match other.primitive_kind() {
            Some(kind) => format!("a boxed {}", kind.wire_name()),
            None => "a value".into(),
        },
    }
}

macro_rules! primitive_impls {
    ($($ty:ty => $variant:ident, $kind:ident;)*) => {
        $(
            impl FieldValue for $ty {
                fn field_type(_: &mut TypeRegistry) -> Result<TypeKey> {
                    Ok(TypeKey::Primitive(PrimitiveKind::$kind))
                }

                fn to_value(&self) -> Result<Value> {
                    Ok(Value::$variant(*self))
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }

            impl ArrayElement for $ty {
                fn element_key() -> TypeKey {
                    TypeKey::Primitive(PrimitiveKind::$kind)
                }

                fn to_array(items: &[Self]) -> Result<ArrayData> {
                    Ok(ArrayData::$variant(items.to_vec()))
                }

                fn from_array(data: &ArrayData) -> Result<Vec<Self>> {
                    match data {
                        ArrayData::$variant(v) => Ok(v.clone()),
                        other => Err(GraphError::TypeMismatch(format!(
                            "expected [{}], found [{:?}]",
                            PrimitiveKind::$kind.wire_name(),
                            other.component()
                        ))),
                    }
                }
            }
        )*
    };
}

primitive_impls! {
    bool => Bool, Bool;
    u8 => U8, U8;
    i8 => I8, I8;
    i16 => I16, I16;
    u16 => U16, U16;
    i32 => I32, I32;
    i64 => I64, I64;
    f32 => F32, F32;
    f64 => F64, F64;
}

impl FieldValue for String {
    fn field_type(_: &mut TypeRegistry) -> Result<TypeKey> {
        Ok(TypeKey::String)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::string(self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FieldValue for Option<String> {
    fn field_type(_: &mut TypeRegistry) -> Result<TypeKey> {
        Ok(TypeKey::String)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(self.as_deref().map_or(Value::Null, Value::string))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => String::from_value(other).map(Some),
        }
    }
}

/// Shared strings keep their identity across a round trip.
impl FieldValue for Rc<str> {
    fn field_type(_: &mut TypeRegistry) -> Result<TypeKey> {
        Ok(TypeKey::String)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::Str(Rc::clone(self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FieldValue for Option<Rc<str>> {
    fn field_type(_: &mut TypeRegistry) -> Result<TypeKey> {
        Ok(TypeKey::String)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(self.as_ref().map_or(Value::Null, |s| Value::Str(Rc::clone(s))))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => Rc::<str>::from_value(other).map(Some),
        }
    }
}

/// An untyped slot, declared with the root type.
impl FieldValue for Value {
    fn field_type(_: &mut TypeRegistry) -> Result<TypeKey> {
        Ok(TypeKey::Root)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: Reflect> FieldValue for Option<Shared<T>> {
    fn field_type(registry: &mut TypeRegistry) -> Result<TypeKey> {
        registry.register::<T>()?;
        Ok(TypeKey::of::<T>())
    }

    fn to_value(&self) -> Result<Value> {
        Ok(match self {
            Some(cell) => Value::Object(ObjectRef::new(Rc::clone(cell))),
            None => Value::Null,
        })
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            Value::Object(o) => o.downcast::<T>().map(Some).ok_or_else(|| {
                GraphError::TypeMismatch(format!(
                    "expected {}, found {}",
                    type_name::<T>(),
                    o.type_name()
                ))
            }),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<E: ArrayElement> FieldValue for Vec<E> {
    fn field_type(registry: &mut TypeRegistry) -> Result<TypeKey> {
        E::register_element(registry)?;
        Ok(TypeKey::array_of(E::element_key()))
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::array(E::to_array(self)?))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(a) => {
                let data = a
                    .try_borrow()
                    .map_err(|_| GraphError::Internal("array is mutably borrowed".into()))?;
                E::from_array(&data)
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

fn values_of(data: &ArrayData) -> Result<&[Value]> {
    match data {
        ArrayData::Values { items, .. } => Ok(items),
        other => Err(GraphError::TypeMismatch(format!(
            "expected an array of references, found [{:?}]",
            other.component()
        ))),
    }
}

/// Collects elements that are themselves field-convertible.
fn reference_array<T: FieldValue>(component: TypeKey, items: &[T]) -> Result<ArrayData> {
    Ok(ArrayData::Values {
        component,
        items: items.iter().map(FieldValue::to_value).collect::<Result<_>>()?,
    })
}

fn reference_elements<T: FieldValue>(data: &ArrayData) -> Result<Vec<T>> {
    values_of(data)?
        .iter()
        .cloned()
        .map(T::from_value)
        .collect()
}

impl ArrayElement for String {
    fn element_key() -> TypeKey {
        TypeKey::String
    }

    fn to_array(items: &[Self]) -> Result<ArrayData> {
        reference_array(TypeKey::String, items)
    }

    fn from_array(data: &ArrayData) -> Result<Vec<Self>> {
        reference_elements(data)
    }
}

impl ArrayElement for Value {
    fn element_key() -> TypeKey {
        TypeKey::Root
    }

    fn to_array(items: &[Self]) -> Result<ArrayData> {
        reference_array(TypeKey::Root, items)
    }

    fn from_array(data: &ArrayData) -> Result<Vec<Self>> {
        Ok(values_of(data)?.to_vec())
    }
}

impl<T: Reflect> ArrayElement for Option<Shared<T>> {
    fn element_key() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn register_element(registry: &mut TypeRegistry) -> Result<()> {
        registry.register::<T>().map(|_| ())
    }

    fn to_array(items: &[Self]) -> Result<ArrayData> {
        reference_array(TypeKey::of::<T>(), items)
    }

    fn from_array(data: &ArrayData) -> Result<Vec<Self>> {
        reference_elements(data)
    }
}

/// Nested vectors become arrays of arrays.
impl<E: ArrayElement> ArrayElement for Vec<E> {
    fn element_key() -> TypeKey {
        TypeKey::array_of(E::element_key())
    }

    fn register_element(registry: &mut TypeRegistry) -> Result<()> {
        E::register_element(registry)
    }

    fn to_array(items: &[Self]) -> Result<ArrayData> {
        reference_array(Self::element_key(), items)
    }

    fn from_array(data: &ArrayData) -> Result<Vec<Self>> {
        reference_elements(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_fields_reject_other_kinds() {
        assert!(matches!(i32::from_value(Value::I32(4)), Ok(4)));
        assert!(matches!(
            i32::from_value(Value::I64(4)),
            Err(GraphError::TypeMismatch(_))
        ));
        assert!(matches!(
            String::from_value(Value::Null),
            Err(GraphError::TypeMismatch(_))
        ));
        assert!(matches!(Option::<String>::from_value(Value::Null), Ok(None)));
    }

    #[test]
    fn vectors_map_to_typed_arrays() -> Result<()> {
        let mut registry = TypeRegistry::new();
        assert_eq!(
            Vec::<i16>::field_type(&mut registry)?,
            TypeKey::array_of(TypeKey::Primitive(PrimitiveKind::I16))
        );
        let nested = vec![vec![1u8, 2], vec![3]];
        let value = nested.to_value()?;
        assert_eq!(
            value.type_key()?,
            Some(TypeKey::array_of(TypeKey::array_of(TypeKey::Primitive(
                PrimitiveKind::U8
            ))))
        );
        assert_eq!(Vec::<Vec<u8>>::from_value(value)?, nested);
        Ok(())
    }
}
