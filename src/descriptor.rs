//! The wire-level structural description of a type.
//!
//! A [`TypeDescriptor`] is emitted once per session, the first time a type is
//! needed, inside a `TYPE_BLOCK`:
//!
//! ```text
//! handle(4) · wire_name(str) · flags(1) · super_handle(4, 0 = none)
//!   · [component_handle(4)                      iff ARRAY]
//!   · [field_count(4) · (name(str) · type(4))*  iff not PRIMITIVE]
//! ```
//!
//! The encoding strategy of a descriptor is derived once, when it is built, and
//! exposed as [`Encoding`]; the writer and the reader dispatch on it.

use crate::error::{GraphError, Result};
use crate::format::{ROOT_WIRE_NAME, STRING_WIRE_NAME, TypeFlags};
use crate::io::{ScalarReader, ScalarWriter};
use crate::value::PrimitiveKind;
use std::hash::Hasher;
use std::io::{Read, Write};
use twox_hash::XxHash64;

/// One declared field of a plain type, as described on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Descriptor handle of the field's declared type.
    pub type_handle: u32,
}

/// How instances described by a descriptor are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// A raw scalar.
    Primitive(PrimitiveKind),
    /// The universal root type; never the type of an instance.
    Root,
    /// A length-prefixed string.
    String,
    /// Element count, then the elements.
    Array,
    /// The constant's name, as a nested string value.
    Enum,
    /// Base-first field walk; this level uses its declared fields.
    Fields,
    /// Base-first field walk; this level uses its custom hook.
    Hook,
    /// The type's own externalization routine.
    Externalizable,
}

impl Encoding {
    /// Returns true if instances are encoded by walking type levels.
    pub fn is_field_walk(self) -> bool {
        matches!(self, Self::Fields | Self::Hook)
    }
}

/// Structural description of one type within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    handle: u32,
    wire_name: String,
    flags: TypeFlags,
    super_type: Option<u32>,
    component_type: Option<u32>,
    fields: Vec<FieldDescriptor>,
    encoding: Encoding,
}

impl TypeDescriptor {
    /// Builds and validates a descriptor.
    pub fn new(
        handle: u32,
        wire_name: impl Into<String>,
        flags: TypeFlags,
        super_type: Option<u32>,
        component_type: Option<u32>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self> {
        let wire_name = wire_name.into();
        if handle == 0 {
            return Err(GraphError::Format("descriptor handle 0 is reserved".into()));
        }
        if !flags.is_consistent() {
            return Err(GraphError::Format(format!(
                "inconsistent flags {:#04x} for `{wire_name}`",
                flags.bits()
            )));
        }
        if flags.contains(TypeFlags::ARRAY) != component_type.is_some() {
            return Err(GraphError::Format(format!(
                "`{wire_name}`: component handle present iff ARRAY"
            )));
        }
        let non_plain = TypeFlags::PRIMITIVE | TypeFlags::ARRAY | TypeFlags::ENUM;
        if super_type.is_some() && flags.intersects(non_plain) {
            return Err(GraphError::Format(format!(
                "`{wire_name}`: only plain types have a super type"
            )));
        }
        let encoding = if flags.contains(TypeFlags::PRIMITIVE) {
            Encoding::Primitive(PrimitiveKind::from_wire_name(&wire_name).ok_or_else(|| {
                GraphError::Format(format!("`{wire_name}` is not a primitive type"))
            })?)
        } else if flags.contains(TypeFlags::ARRAY) {
            Encoding::Array
        } else if flags.contains(TypeFlags::ENUM) {
            Encoding::Enum
        } else if flags.contains(TypeFlags::EXTERNALIZABLE) {
            Encoding::Externalizable
        } else if flags.contains(TypeFlags::HAS_HOOK) {
            Encoding::Hook
        } else if wire_name == ROOT_WIRE_NAME {
            Encoding::Root
        } else if wire_name == STRING_WIRE_NAME {
            Encoding::String
        } else {
            Encoding::Fields
        };
        Ok(Self {
            handle,
            wire_name,
            flags,
            super_type,
            component_type,
            fields,
            encoding,
        })
    }

    /// Session-local handle.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Canonical type signature.
    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    /// Flag byte.
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Handle of the immediate base type, if any.
    pub fn super_type(&self) -> Option<u32> {
        self.super_type
    }

    /// Handle of the element type, for arrays.
    pub fn component_type(&self) -> Option<u32> {
        self.component_type
    }

    /// Declared fields, in encoding order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Encoding strategy.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Serializes the descriptor.
    pub fn write_to<W: Write>(&self, out: &mut ScalarWriter<W>) -> Result<()> {
        out.write_u32(self.handle)?;
        out.write_str(&self.wire_name)?;
        out.write_u8(self.flags.bits())?;
        out.write_u32(self.super_type.unwrap_or(0))?;
        if let Some(component) = self.component_type {
            out.write_u32(component)?;
        }
        if !self.flags.contains(TypeFlags::PRIMITIVE) {
            out.write_len(self.fields.len())?;
            for field in &self.fields {
                out.write_str(&field.name)?;
                out.write_u32(field.type_handle)?;
            }
        }
        Ok(())
    }

    /// Deserializes and validates a descriptor.
    pub fn read_from<R: Read>(input: &mut ScalarReader<R>) -> Result<Self> {
        let handle = input.read_u32()?;
        let wire_name = input.read_string()?;
        let raw_flags = input.read_u8()?;
        let flags = TypeFlags::from_bits(raw_flags).ok_or_else(|| {
            GraphError::Format(format!("unknown flag bits {raw_flags:#04x} for `{wire_name}`"))
        })?;
        let super_type = Some(input.read_u32()?).filter(|h| *h != 0);
        let component_type = if flags.contains(TypeFlags::ARRAY) {
            Some(input.read_u32()?)
        } else {
            None
        };
        let mut fields = Vec::new();
        if !flags.contains(TypeFlags::PRIMITIVE) {
            let count = input.read_u32()?;
            for _ in 0..count {
                let name = input.read_string()?;
                let type_handle = input.read_u32()?;
                fields.push(FieldDescriptor { name, type_handle });
            }
        }
        Self::new(handle, wire_name, flags, super_type, component_type, fields)
    }

    /// A 64-bit fingerprint of the type's structure: wire name, flags, and the wire
    /// names of its base, component and field types.
    ///
    /// Handles do not enter the fingerprint, so independent sessions (and the two
    /// sides of a stream) can compare schemas with it. `name_of` maps a handle to its
    /// wire name.
    pub fn fingerprint<'a>(&self, name_of: impl Fn(u32) -> Option<&'a str>) -> Result<u64> {
        let resolve = |handle: u32| name_of(handle).ok_or(GraphError::UnknownTypeHandle(handle));
        let mut hasher = XxHash64::with_seed(0);
        hash_str(&mut hasher, &self.wire_name);
        hasher.write_u8(self.flags.bits());
        if let Some(super_type) = self.super_type {
            hash_str(&mut hasher, resolve(super_type)?);
        }
        if let Some(component) = self.component_type {
            hash_str(&mut hasher, resolve(component)?);
        }
        hasher.write_usize(self.fields.len());
        for field in &self.fields {
            hash_str(&mut hasher, &field.name);
            hash_str(&mut hasher, resolve(field.type_handle)?);
        }
        Ok(hasher.finish())
    }
}

fn hash_str(hasher: &mut XxHash64, s: &str) {
    hasher.write_usize(s.len());
    hasher.write(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_node() -> Result<TypeDescriptor> {
        TypeDescriptor::new(
            12,
            "demo.ListNode",
            TypeFlags::empty(),
            None,
            None,
            vec![
                FieldDescriptor { name: "value".into(), type_handle: 6 },
                FieldDescriptor { name: "next".into(), type_handle: 12 },
            ],
        )
    }

    #[test]
    fn descriptor_layout() -> Result<()> {
        let mut out = ScalarWriter::new(Vec::new(), 64);
        list_node()?.write_to(&mut out)?;
        let mut expected = vec![0, 0, 0, 12, 0, 0, 0, 13];
        expected.extend_from_slice(b"demo.ListNode");
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 2]);
        expected.extend_from_slice(&[0, 0, 0, 5]);
        expected.extend_from_slice(b"value");
        expected.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 4]);
        expected.extend_from_slice(b"next");
        expected.extend_from_slice(&[0, 0, 0, 12]);
        let bytes = out.into_inner();
        assert_eq!(bytes, expected);

        let mut input = ScalarReader::new(bytes.as_slice(), 64, 1024);
        assert_eq!(TypeDescriptor::read_from(&mut input)?, list_node()?);
        Ok(())
    }

    #[test]
    fn encoding_is_derived_from_flags() -> Result<()> {
        let array = TypeDescriptor::new(13, "[i32", TypeFlags::ARRAY, None, Some(6), Vec::new())?;
        assert_eq!(array.encoding(), Encoding::Array);
        let hooked = TypeDescriptor::new(14, "a.B", TypeFlags::HAS_HOOK, Some(12), None, Vec::new())?;
        assert_eq!(hooked.encoding(), Encoding::Hook);
        assert!(hooked.encoding().is_field_walk());
        Ok(())
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        assert!(matches!(
            TypeDescriptor::new(13, "[i32", TypeFlags::ARRAY, None, None, Vec::new()),
            Err(GraphError::Format(_))
        ));
        assert!(matches!(
            TypeDescriptor::new(13, "x.Y", TypeFlags::PRIMITIVE, None, None, Vec::new()),
            Err(GraphError::Format(_))
        ));

        let bytes = [0u8, 0, 0, 12, 0, 0, 0, 1, b'x', 0x80, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut input = ScalarReader::new(&bytes[..], 64, 1024);
        assert!(matches!(
            TypeDescriptor::read_from(&mut input),
            Err(GraphError::Format(_))
        ));
    }

    #[test]
    fn fingerprint_ignores_handles() -> Result<()> {
        let a = list_node()?;
        let b = TypeDescriptor::new(
            40,
            "demo.ListNode",
            TypeFlags::empty(),
            None,
            None,
            vec![
                FieldDescriptor { name: "value".into(), type_handle: 6 },
                FieldDescriptor { name: "next".into(), type_handle: 40 },
            ],
        )?;
        let names_a = |h: u32| match h {
            6 => Some("i32"),
            12 => Some("demo.ListNode"),
            _ => None,
        };
        let names_b = |h: u32| match h {
            6 => Some("i32"),
            40 => Some("demo.ListNode"),
            _ => None,
        };
        assert_eq!(a.fingerprint(names_a)?, b.fingerprint(names_b)?);
        assert!(matches!(
            a.fingerprint(|_| None),
            Err(GraphError::UnknownTypeHandle(6))
        ));
        Ok(())
    }
}
