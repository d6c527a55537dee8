//! The hook bridge between user encoding routines and the graph engine.
//!
//! [`ObjectOutput`] and [`ObjectInput`] are the views of the writer and the reader a
//! [`crate::CustomFields`] or [`crate::Externalize`] implementation works with. A
//! hook can mix three styles:
//!
//! * raw scalars and nested values, in an order it defines;
//! * the default field walk of its own level ([`ObjectOutput::default_write_fields`]);
//! * a named field set ([`PutFields`] / [`GetFields`]), which lets a hook add or
//!   reorder logical fields independently of the declared layout.
//!
//! # Named field set layout
//! ```text
//! prim_count(4) · prim_count × (name · kind(1) · raw scalar)
//! obj_count(4)  · obj_count  × (name · value)
//! ```
//! Entries are written in ascending name order.

use crate::error::{GraphError, Result};
use crate::reflect::{FieldValue, describe_value};
use crate::value::{PrimitiveKind, Value};
use std::any::Any;
use std::collections::BTreeMap;

/// The writer, as seen from a custom hook or an externalization routine.
pub trait ObjectOutput {
    /// Writes a complete graph value, with sharing and cycle detection.
    fn write_value(&mut self, value: &Value) -> Result<()>;
    /// Writes a raw boolean.
    fn write_bool(&mut self, v: bool) -> Result<()>;
    /// Writes a raw unsigned byte.
    fn write_u8(&mut self, v: u8) -> Result<()>;
    /// Writes a raw signed byte.
    fn write_i8(&mut self, v: i8) -> Result<()>;
    /// Writes a raw 2-byte signed integer.
    fn write_i16(&mut self, v: i16) -> Result<()>;
    /// Writes a raw 2-byte unsigned integer.
    fn write_u16(&mut self, v: u16) -> Result<()>;
    /// Writes a raw 4-byte signed integer.
    fn write_i32(&mut self, v: i32) -> Result<()>;
    /// Writes a raw 4-byte unsigned integer.
    fn write_u32(&mut self, v: u32) -> Result<()>;
    /// Writes a raw 8-byte signed integer.
    fn write_i64(&mut self, v: i64) -> Result<()>;
    /// Writes a raw `f32`.
    fn write_f32(&mut self, v: f32) -> Result<()>;
    /// Writes a raw `f64`.
    fn write_f64(&mut self, v: f64) -> Result<()>;
    /// Writes a raw length-prefixed string (not shared, not nullable).
    fn write_str(&mut self, s: &str) -> Result<()>;
    /// Runs the default field walk of the hook's own level over `source`.
    fn default_write_fields(&mut self, source: &dyn Any) -> Result<()>;
    /// Writes a named field set.
    fn write_fields(&mut self, fields: &PutFields) -> Result<()>;
}

impl dyn ObjectOutput + '_ {
    /// Writes a field-convertible Rust value as a graph value.
    pub fn write<T: FieldValue>(&mut self, value: &T) -> Result<()> {
        let value = value.to_value()?;
        self.write_value(&value)
    }
}

/// The reader, as seen from a custom hook or an externalization routine.
pub trait ObjectInput {
    /// Reads a complete graph value.
    fn read_value(&mut self) -> Result<Value>;
    /// Reads a raw boolean.
    fn read_bool(&mut self) -> Result<bool>;
    /// Reads a raw unsigned byte.
    fn read_u8(&mut self) -> Result<u8>;
    /// Reads a raw signed byte.
    fn read_i8(&mut self) -> Result<i8>;
    /// Reads a raw 2-byte signed integer.
    fn read_i16(&mut self) -> Result<i16>;
    /// Reads a raw 2-byte unsigned integer.
    fn read_u16(&mut self) -> Result<u16>;
    /// Reads a raw 4-byte signed integer.
    fn read_i32(&mut self) -> Result<i32>;
    /// Reads a raw 4-byte unsigned integer.
    fn read_u32(&mut self) -> Result<u32>;
    /// Reads a raw 8-byte signed integer.
    fn read_i64(&mut self) -> Result<i64>;
    /// Reads a raw `f32`.
    fn read_f32(&mut self) -> Result<f32>;
    /// Reads a raw `f64`.
    fn read_f64(&mut self) -> Result<f64>;
    /// Reads a raw length-prefixed string.
    fn read_string(&mut self) -> Result<String>;
    /// Runs the default field walk of the hook's own level into `target`.
    fn default_read_fields(&mut self, target: &mut dyn Any) -> Result<()>;
    /// Reads a named field set.
    fn read_fields(&mut self) -> Result<GetFields>;
}

impl dyn ObjectInput + '_ {
    /// Reads a graph value and converts it to `T`.
    pub fn read<T: FieldValue>(&mut self) -> Result<T> {
        let value = self.read_value()?;
        T::from_value(value)
    }
}

/// A named field set under construction, written by [`ObjectOutput::write_fields`].
#[derive(Debug, Clone, Default)]
pub struct PutFields {
    primitives: BTreeMap<String, Value>,
    objects: BTreeMap<String, Value>,
}

impl PutFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a field-convertible value under `name`, replacing any previous entry.
    pub fn put<T: FieldValue>(&mut self, name: impl Into<String>, value: &T) -> Result<&mut Self> {
        let value = value.to_value()?;
        Ok(self.put_value(name, value))
    }

    /// Puts a graph value under `name`. Boxed primitives go to the primitive map.
    pub fn put_value(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        let name = name.into();
        if value.primitive_kind().is_some() {
            self.objects.remove(&name);
            self.primitives.insert(name, value);
        } else {
            self.primitives.remove(&name);
            self.objects.insert(name, value);
        }
        self
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.primitives.len() + self.objects.len()
    }

    /// Returns true if no field was put.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn primitives(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.primitives.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn objects(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.objects.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A named field set read by [`ObjectInput::read_fields`].
#[derive(Debug, Clone, Default)]
pub struct GetFields {
    primitives: BTreeMap<String, Value>,
    objects: BTreeMap<String, Value>,
}

impl GetFields {
    pub(crate) fn insert_primitive(&mut self, name: String, value: Value) {
        self.primitives.insert(name, value);
    }

    pub(crate) fn insert_object(&mut self, name: String, value: Value) {
        self.objects.insert(name, value);
    }

    /// The raw value stored under `name`.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.primitives.get(name).or_else(|| self.objects.get(name))
    }

    /// The value stored under `name`, or `default` if the stream has no such field.
    pub fn get<T: FieldValue>(&self, name: &str, default: T) -> Result<T> {
        match self.get_value(name) {
            Some(value) => T::from_value(value.clone()).map_err(|e| match e {
                GraphError::TypeMismatch(_) => GraphError::TypeMismatch(format!(
                    "field `{name}` holds {}",
                    describe_value(value)
                )),
                other => other,
            }),
            None => Ok(default),
        }
    }

    /// Returns true if the stream carried no field named `name`.
    pub fn defaulted(&self, name: &str) -> bool {
        self.get_value(name).is_none()
    }

    /// Names of all fields, primitives first, each group in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.primitives.keys().chain(self.objects.keys()).map(String::as_str)
    }
}

/// Decodes the one-byte kind tag of a named primitive.
pub(crate) fn primitive_kind_of(code: u8) -> Result<PrimitiveKind> {
    PrimitiveKind::from_code(code)
        .ok_or_else(|| GraphError::Format(format!("invalid primitive kind {code} in field set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_and_objects_are_kept_apart() -> Result<()> {
        let mut put = PutFields::new();
        put.put("count", &3i32)?.put("label", &"x".to_string())?;
        put.put_value("count", Value::string("now an object"));
        assert_eq!(put.primitives().len(), 0);
        assert_eq!(put.objects().len(), 2);
        Ok(())
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() -> Result<()> {
        let mut get = GetFields::default();
        get.insert_primitive("x".into(), Value::I32(5));
        assert_eq!(get.get("x", 0i32)?, 5);
        assert_eq!(get.get("y", 9i32)?, 9);
        assert!(get.defaulted("y"));
        assert!(matches!(get.get("x", 0i64), Err(GraphError::TypeMismatch(_))));
        Ok(())
    }
}
