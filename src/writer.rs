//! The serialization side of a session.
//!
//! [`GraphWriter`] walks a value graph depth-first. Each value reachable from a root
//! is written once; later occurrences become back-references to its handle, which is
//! how shared and cyclic references survive the trip. Type descriptors are emitted
//! lazily, in a `TYPE_BLOCK` placed right before the first record that needs them.

use crate::config::CodecConfig;
use crate::descriptor::Encoding;
use crate::error::{GraphError, Result};
use crate::format::{MAGIC, STRING_HANDLE, TAG_NULL, TAG_OBJECT, TAG_TYPE_BLOCK, TAG_TYPE_VALUE};
use crate::hook::{ObjectOutput, PutFields};
use crate::io::ScalarWriter;
use crate::reflect::FieldValue;
use crate::registry::{ExternalFns, TypeInfo, TypeRegistry, TypeShape, project};
use crate::session::WriteSession;
use crate::value::{ArrayData, ArrayRef, Identity, ObjectRef, PrimitiveKind, TypeKey, Value};
use std::any::{Any, TypeId};
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

/// Writes value graphs to a byte sink, one session per writer.
///
/// Repeated calls to [`GraphWriter::write_value`] continue the same session: an
/// object written by an earlier root is referenced by handle.
pub struct GraphWriter<W: Write> {
    out: ScalarWriter<W>,
    session: WriteSession,
    /// Type of the hooked level currently running, innermost last; `None` while an
    /// externalized payload is being written.
    frames: Vec<Option<TypeId>>,
}

impl<W: Write> GraphWriter<W> {
    /// Starts a session on `sink` and writes the magic prefix.
    pub fn new(sink: W, registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::with_config(sink, registry, CodecConfig::default())
    }

    /// Starts a session with an explicit configuration.
    pub fn with_config(sink: W, registry: Arc<TypeRegistry>, config: CodecConfig) -> Result<Self> {
        let mut out = ScalarWriter::new(sink, config.scratch_size);
        out.write_bytes(&MAGIC)?;
        tracing::debug!(types = registry.len(), "write session started");
        Ok(Self {
            out,
            session: WriteSession::new(registry),
            frames: Vec::new(),
        })
    }

    /// The session registries.
    pub fn session(&self) -> &WriteSession {
        &self.session
    }

    /// Writes one root value.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.out.write_u8(TAG_NULL),
            Value::Type(key) => {
                let handle = self.resolve(key)?;
                self.out.write_u8(TAG_TYPE_VALUE)?;
                self.out.write_u32(handle)
            }
            _ => self.write_object(value),
        }
    }

    /// Writes a field-convertible Rust value as a root.
    pub fn write<T: FieldValue>(&mut self, value: &T) -> Result<()> {
        self.write_value(&value.to_value()?)
    }

    /// Flushes the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()
    }

    /// Flushes and returns the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out.into_inner())
    }

    /// Resolves a type, emitting the descriptors it introduces.
    fn resolve(&mut self, key: &TypeKey) -> Result<u32> {
        let mut pending = Vec::new();
        let handle = self.session.resolve_type(key, &mut pending)?;
        if !pending.is_empty() {
            self.out.write_u8(TAG_TYPE_BLOCK)?;
            self.out.write_len(pending.len())?;
            for h in &pending {
                let desc = Rc::clone(self.session.descriptor(*h)?);
                desc.write_to(&mut self.out)?;
            }
            tracing::debug!(count = pending.len(), "emitted type block");
        }
        Ok(handle)
    }

    fn back_reference(&mut self, identity: &Identity) -> Result<bool> {
        match self.session.object_handle(identity) {
            Some(handle) => {
                self.out.write_u8(TAG_OBJECT)?;
                self.out.write_u32(handle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn write_object(&mut self, value: &Value) -> Result<()> {
        let identity = value.identity();
        if let Some(identity) = &identity {
            if self.back_reference(identity)? {
                return Ok(());
            }
        }
        let key = value
            .type_key()?
            .ok_or_else(|| GraphError::Internal(format!("{value:?} has no runtime type")))?;
        let type_handle = self.resolve(&key)?;
        let handle = self.session.assign_object(identity, value);
        self.out.write_u8(TAG_OBJECT)?;
        self.out.write_u32(handle)?;
        self.out.write_u32(type_handle)?;
        let encoding = self.session.descriptor(type_handle)?.encoding();
        tracing::trace!(handle, type_handle, ?encoding, "object record");

        match (encoding, value) {
            (Encoding::Primitive(_), v) => self.write_primitive(v),
            (Encoding::String, Value::Str(s)) => self.out.write_str(s),
            (Encoding::Enum, Value::Enum(e)) => self.write_enum_name(e.name),
            (Encoding::Array, Value::Array(array)) => self.write_array(array, type_handle),
            (Encoding::Externalizable, Value::Object(obj)) => self.write_external(obj),
            (Encoding::Fields | Encoding::Hook, Value::Object(obj)) => self.write_levels(obj),
            (encoding, value) => Err(GraphError::Internal(format!(
                "cannot encode {value:?} as {encoding:?}"
            ))),
        }
    }

    fn write_primitive(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Bool(v) => self.out.write_bool(*v),
            Value::U8(v) => self.out.write_u8(*v),
            Value::I8(v) => self.out.write_i8(*v),
            Value::I16(v) => self.out.write_i16(*v),
            Value::U16(v) => self.out.write_u16(*v),
            Value::I32(v) => self.out.write_i32(*v),
            Value::I64(v) => self.out.write_i64(*v),
            Value::F32(v) => self.out.write_f32(*v),
            Value::F64(v) => self.out.write_f64(*v),
            other => Err(GraphError::TypeMismatch(format!("{other:?} is not a primitive"))),
        }
    }

    fn write_primitive_as(&mut self, kind: PrimitiveKind, value: &Value) -> Result<()> {
        if value.primitive_kind() != Some(kind) {
            return Err(GraphError::TypeMismatch(format!(
                "expected a {} field value, found {value:?}",
                kind.wire_name()
            )));
        }
        self.write_primitive(value)
    }

    /// Writes the name of an enum constant as a shared string record.
    fn write_enum_name(&mut self, name: &'static str) -> Result<()> {
        let identity = Identity::ConstantName(name);
        if self.back_reference(&identity)? {
            return Ok(());
        }
        let handle = self.session.assign_object(Some(identity), &Value::Null);
        self.out.write_u8(TAG_OBJECT)?;
        self.out.write_u32(handle)?;
        self.out.write_u32(STRING_HANDLE)?;
        self.out.write_str(name)
    }

    fn write_enum_slot(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Enum(e) => self.write_enum_name(e.name),
            Value::Null => self.out.write_u8(TAG_NULL),
            other => Err(GraphError::TypeMismatch(format!(
                "expected an enum constant, found {other:?}"
            ))),
        }
    }

    fn write_array(&mut self, array: &ArrayRef, type_handle: u32) -> Result<()> {
        let array = Rc::clone(array);
        let data = array
            .try_borrow()
            .map_err(|_| GraphError::Internal("array is mutably borrowed".into()))?;
        self.out.write_len(data.len())?;
        match &*data {
            ArrayData::Bool(v) => self.out.write_bool_slice(v),
            ArrayData::U8(v) => self.out.write_bytes(v),
            ArrayData::I8(v) => self.out.write_i8_slice(v),
            ArrayData::I16(v) => self.out.write_i16_slice(v),
            ArrayData::U16(v) => self.out.write_u16_slice(v),
            ArrayData::I32(v) => self.out.write_i32_slice(v),
            ArrayData::I64(v) => self.out.write_i64_slice(v),
            ArrayData::F32(v) => self.out.write_f32_slice(v),
            ArrayData::F64(v) => self.out.write_f64_slice(v),
            ArrayData::Values { items, .. } => {
                let component = self
                    .session
                    .descriptor(type_handle)?
                    .component_type()
                    .ok_or_else(|| GraphError::Internal("array descriptor without component".into()))?;
                let by_name = self.session.descriptor(component)?.encoding() == Encoding::Enum;
                for item in items {
                    if by_name {
                        self.write_enum_slot(item)?;
                    } else {
                        self.write_value(item)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn write_external(&mut self, obj: &ObjectRef) -> Result<()> {
        let registry = Arc::clone(self.session.registry());
        let info = registry.expect(obj.type_id())?;
        let TypeShape::Externalizable(fns) = &info.shape else {
            return Err(GraphError::Internal(format!("{} is not externalizable", info.wire_name)));
        };
        let guard = obj.borrow()?;
        self.externalize(info, fns, &*guard)
    }

    fn externalize(&mut self, info: &TypeInfo, fns: &ExternalFns, level: &dyn Any) -> Result<()> {
        self.frames.push(None);
        let result = (fns.write)(level, self);
        self.frames.pop();
        result.map_err(|e| GraphError::external(&info.wire_name, e))
    }

    /// Base-first walk over the type levels of a plain object.
    fn write_levels(&mut self, obj: &ObjectRef) -> Result<()> {
        let registry = Arc::clone(self.session.registry());
        let chain = registry.level_chain(obj.type_id())?;
        let guard = obj.borrow()?;
        for depth in (0..chain.len()).rev() {
            let info = chain[depth];
            let level = project(&*guard, &chain, depth)?;
            match (&info.shape, info.hook()) {
                (TypeShape::Externalizable(fns), _) => self.externalize(info, fns, level)?,
                (_, Some(hook)) => {
                    self.frames.push(Some(info.type_id));
                    let result = (hook.write)(level, self);
                    self.frames.pop();
                    result.map_err(|e| GraphError::hook(&info.wire_name, e))?;
                }
                (_, None) => self.write_declared_fields(info, level)?,
            }
        }
        Ok(())
    }

    fn write_declared_fields(&mut self, info: &TypeInfo, level: &dyn Any) -> Result<()> {
        let registry = Arc::clone(self.session.registry());
        for field in info.fields() {
            let value = (field.get)(level)?;
            match &field.key {
                TypeKey::Primitive(kind) => self.write_primitive_as(*kind, &value)?,
                TypeKey::Named(id) if registry.get(*id).is_some_and(TypeInfo::is_enum) => {
                    self.write_enum_slot(&value)?
                }
                _ => self.write_value(&value)?,
            }
        }
        Ok(())
    }
}

impl<W: Write> ObjectOutput for GraphWriter<W> {
    fn write_value(&mut self, value: &Value) -> Result<()> {
        GraphWriter::write_value(self, value)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.out.write_bool(v)
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.out.write_u8(v)
    }

    fn write_i8(&mut self, v: i8) -> Result<()> {
        self.out.write_i8(v)
    }

    fn write_i16(&mut self, v: i16) -> Result<()> {
        self.out.write_i16(v)
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        self.out.write_u16(v)
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.out.write_i32(v)
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.out.write_u32(v)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.out.write_i64(v)
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        self.out.write_f32(v)
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        self.out.write_f64(v)
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.out.write_str(s)
    }

    fn default_write_fields(&mut self, source: &dyn Any) -> Result<()> {
        let level = match self.frames.last() {
            Some(Some(level)) => *level,
            Some(None) => {
                return Err(GraphError::Internal(
                    "default field walk inside an externalized payload".into(),
                ));
            }
            None => return Err(GraphError::Internal("default field walk outside of a hook".into())),
        };
        let registry = Arc::clone(self.session.registry());
        let info = registry.expect(level)?;
        self.write_declared_fields(info, source)
    }

    fn write_fields(&mut self, fields: &PutFields) -> Result<()> {
        let primitives = fields.primitives();
        self.out.write_len(primitives.len())?;
        for (name, value) in primitives {
            let kind = value
                .primitive_kind()
                .ok_or_else(|| GraphError::Internal(format!("field `{name}` is not a primitive")))?;
            self.out.write_str(name)?;
            self.out.write_u8(kind.code())?;
            self.write_primitive(value)?;
        }
        let objects = fields.objects();
        self.out.write_len(objects.len())?;
        for (name, value) in objects {
            self.out.write_str(name)?;
            GraphWriter::write_value(self, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> Result<GraphWriter<Vec<u8>>> {
        GraphWriter::new(Vec::new(), Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn null_and_boxed_primitives() -> Result<()> {
        let mut w = writer()?;
        w.write_value(&Value::Null)?;
        w.write_value(&Value::I16(-2))?;
        let bytes = w.into_inner()?;
        assert_eq!(&bytes[..4], &MAGIC);
        assert_eq!(&bytes[4..], &[3, 2, 0, 0, 0, 1, 0, 0, 0, 4, 0xff, 0xfe]);
        Ok(())
    }

    #[test]
    fn shared_strings_become_back_references() -> Result<()> {
        let mut w = writer()?;
        let s = Value::string("hi");
        w.write_value(&s)?;
        w.write_value(&s)?;
        let bytes = w.into_inner()?;
        assert_eq!(
            &bytes[4..],
            &[2, 0, 0, 0, 1, 0, 0, 0, 11, 0, 0, 0, 2, b'h', b'i', 2, 0, 0, 0, 1]
        );
        Ok(())
    }

    #[test]
    fn type_values_emit_their_descriptor_once() -> Result<()> {
        let mut w = writer()?;
        let key = TypeKey::array_of(TypeKey::Primitive(PrimitiveKind::U8));
        w.write_value(&Value::Type(key.clone()))?;
        w.write_value(&Value::Type(key))?;
        let bytes = w.into_inner()?;
        let mut expected = vec![1, 0, 0, 0, 1, 0, 0, 0, 12, 0, 0, 0, 3, b'[', b'u', b'8', 2];
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0]);
        expected.extend_from_slice(&[4, 0, 0, 0, 12, 4, 0, 0, 0, 12]);
        assert_eq!(&bytes[4..], expected.as_slice());
        Ok(())
    }

    #[test]
    fn default_walk_outside_a_hook_is_rejected() -> Result<()> {
        let mut w = writer()?;
        let out: &mut dyn ObjectOutput = &mut w;
        assert!(matches!(
            out.default_write_fields(&0u8),
            Err(GraphError::Internal(_))
        ));
        Ok(())
    }
}
