// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

use crate::error::{GraphError, Result};
use crate::hook::{ObjectInput, ObjectOutput};
use crate::reflect::{CustomFields, EnumType, Externalize, mismatch};
use crate::registry::{ExternalFns, HookFns, TypeRegistry};
use crate::value::{ArrayData, EnumValue, ObjectRef, TypeKey, Value, shared};
use std::any::{Any, TypeId, type_name};

/// Downcasts an erased instance.
pub fn downcast_ref<T: Any>(obj: &dyn Any) -> Result<&T> {
    obj.downcast_ref::<T>()
        .ok_or_else(|| GraphError::Internal(format!("instance is not a {}", type_name::<T>())))
}

/// Mutable counterpart of [`downcast_ref`].
pub fn downcast_mut<T: Any>(obj: &mut dyn Any) -> Result<&mut T> {
    obj.downcast_mut::<T>()
        .ok_or_else(|| GraphError::Internal(format!("instance is not a {}", type_name::<T>())))
}

/// Allocates a default-initialized shared instance. No constructor logic runs
/// beyond `Default`.
pub fn alloc_default<T: Any + Default>() -> ObjectRef {
    ObjectRef::new(shared(T::default()))
}

fn hook_write<T: CustomFields>(obj: &dyn Any, out: &mut dyn ObjectOutput) -> Result<()> {
    downcast_ref::<T>(obj)?.write_object(out)
}

fn hook_read<T: CustomFields>(obj: &mut dyn Any, input: &mut dyn ObjectInput) -> Result<()> {
    downcast_mut::<T>(obj)?.read_object(input)
}

/// Hook routines of a [`CustomFields`] type.
pub fn hook_fns<T: CustomFields>() -> HookFns {
    HookFns {
        write: hook_write::<T>,
        read: hook_read::<T>,
    }
}

fn external_write<T: Externalize>(obj: &dyn Any, out: &mut dyn ObjectOutput) -> Result<()> {
    downcast_ref::<T>(obj)?.write_external(out)
}

fn external_read<T: Externalize>(obj: &mut dyn Any, input: &mut dyn ObjectInput) -> Result<()> {
    downcast_mut::<T>(obj)?.read_external(input)
}

/// Externalization routines of an [`Externalize`] type.
pub fn external_fns<T: Externalize>() -> ExternalFns {
    ExternalFns {
        write: external_write::<T>,
        read: external_read::<T>,
    }
}

/// Declared type of an enum field; registers the enum.
pub fn enum_field_type<T: EnumType>(registry: &mut TypeRegistry) -> Result<TypeKey> {
    registry.register::<T>()?;
    Ok(TypeKey::of::<T>())
}

/// Converts an enum constant to a graph value.
pub fn enum_to_value<T: EnumType>(v: &T) -> Value {
    Value::Enum(EnumValue::new::<T>(v.variant_name()))
}

/// Converts a decoded enum constant back to `T`.
pub fn enum_from_value<T: EnumType>(value: Value) -> Result<T> {
    match value {
        Value::Enum(e) if e.type_id == TypeId::of::<T>() => {
            T::from_variant_name(e.name).ok_or_else(|| GraphError::UnknownEnumConstant {
                type_name: type_name::<T>().to_owned(),
                constant: e.name.to_owned(),
            })
        }
        other => Err(mismatch::<T>(&other)),
    }
}

/// Builds an enum array.
pub fn enum_array<T: EnumType>(items: &[T]) -> ArrayData {
    ArrayData::Values {
        component: TypeKey::of::<T>(),
        items: items.iter().map(enum_to_value).collect(),
    }
}

/// Extracts the constants of an enum array.
pub fn enum_elements<T: EnumType>(data: &ArrayData) -> Result<Vec<T>> {
    match data {
        ArrayData::Values { items, .. } => items.iter().cloned().map(enum_from_value).collect(),
        other => Err(GraphError::TypeMismatch(format!(
            "expected an array of {}, found [{:?}]",
            type_name::<T>(),
            other.component()
        ))),
    }
}
