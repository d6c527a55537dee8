//! The deserialization side of a session.
//!
//! [`GraphReader`] is the inverse of [`crate::GraphWriter`]. Every object is
//! allocated default-initialized and registered under its handle before its payload
//! is read, so references from inside the payload back to the object (cycles)
//! resolve to the instance under construction.
//!
//! Fields are decoded with the *wire* descriptor and assigned by name to the *local*
//! type; a field the local type lacks is decoded and dropped, a local field the
//! stream lacks keeps its default.

use crate::config::CodecConfig;
use crate::descriptor::{Encoding, TypeDescriptor};
use crate::error::{GraphError, Result};
use crate::format::{MAGIC, TAG_NULL, TAG_OBJECT, TAG_TYPE_BLOCK, TAG_TYPE_VALUE};
use crate::hook::{GetFields, ObjectInput, primitive_kind_of};
use crate::io::ScalarReader;
use crate::reflect::FieldValue;
use crate::registry::{ExternalFns, TypeInfo, TypeRegistry, TypeShape, project_mut};
use crate::session::ReadSession;
use crate::value::{ArrayData, EnumValue, PrimitiveKind, TypeKey, Value, shared};
use serde::Serialize;
use std::any::{Any, TypeId};
use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;

/// Counters collected while reading a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    /// `TYPE_BLOCK` records.
    pub type_blocks: u64,
    /// Descriptors introduced by the stream.
    pub descriptors: u64,
    /// Object records carrying a payload.
    pub objects: u64,
    /// Object records resolved to an earlier handle.
    pub back_references: u64,
    /// `NULL` records.
    pub nulls: u64,
    /// `TYPE_VALUE` records.
    pub type_values: u64,
}

/// The hooked level a custom read routine is running for.
struct ReadFrame {
    wire: Rc<TypeDescriptor>,
    local: TypeId,
}

/// Reads value graphs from a byte source, one session per reader.
pub struct GraphReader<R: Read> {
    input: ScalarReader<R>,
    session: ReadSession,
    /// `None` while an externalized payload is being read.
    frames: Vec<Option<ReadFrame>>,
    stats: ReadStats,
    config: CodecConfig,
}

impl<R: Read> GraphReader<R> {
    /// Starts a session on `source`, checking the magic prefix.
    pub fn new(source: R, registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::with_config(source, registry, CodecConfig::default())
    }

    /// Starts a session with an explicit configuration.
    pub fn with_config(source: R, registry: Arc<TypeRegistry>, config: CodecConfig) -> Result<Self> {
        let mut input = ScalarReader::new(source, config.scratch_size, config.max_string_len);
        let mut found = [0u8; 4];
        input.read_exact(&mut found)?;
        if found != MAGIC {
            return Err(GraphError::BadMagic {
                expected: MAGIC,
                found,
            });
        }
        tracing::debug!(types = registry.len(), "read session started");
        Ok(Self {
            input,
            session: ReadSession::new(registry),
            frames: Vec::new(),
            stats: ReadStats::default(),
            config,
        })
    }

    /// The session registries.
    pub fn session(&self) -> &ReadSession {
        &self.session
    }

    /// Counters collected so far.
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Consumes the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }

    /// Reads the next root value.
    pub fn read_value(&mut self) -> Result<Value> {
        let tag = self.input.read_u8()?;
        self.read_tagged(tag)
    }

    /// Reads the next root value, or `None` if the stream ends cleanly before it.
    pub fn try_read_value(&mut self) -> Result<Option<Value>> {
        match self.input.read_u8() {
            Ok(tag) => self.read_tagged(tag).map(Some),
            Err(GraphError::Truncated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads the next root value and converts it to `T`.
    pub fn read<T: FieldValue>(&mut self) -> Result<T> {
        T::from_value(self.read_value()?)
    }

    fn read_tagged(&mut self, mut tag: u8) -> Result<Value> {
        while tag == TAG_TYPE_BLOCK {
            self.read_type_block()?;
            tag = self.input.read_u8()?;
        }
        match tag {
            TAG_NULL => {
                self.stats.nulls += 1;
                Ok(Value::Null)
            }
            TAG_TYPE_VALUE => {
                let handle = self.input.read_u32()?;
                self.stats.type_values += 1;
                Ok(Value::Type(self.session.local_type(handle)?))
            }
            TAG_OBJECT => self.read_object(),
            other => Err(GraphError::Format(format!("unknown tag {other}"))),
        }
    }

    fn read_type_block(&mut self) -> Result<()> {
        let count = self.input.read_u32()?;
        for _ in 0..count {
            let desc = TypeDescriptor::read_from(&mut self.input)?;
            tracing::trace!(handle = desc.handle(), wire_name = desc.wire_name(), "read descriptor");
            self.session.insert_descriptor(desc)?;
        }
        self.stats.type_blocks += 1;
        self.stats.descriptors += u64::from(count);
        tracing::debug!(count, "read type block");
        Ok(())
    }

    fn read_object(&mut self) -> Result<Value> {
        let handle = self.input.read_u32()?;
        if let Some(value) = self.session.object(handle) {
            self.stats.back_references += 1;
            return Ok(value.clone());
        }
        let type_handle = self.input.read_u32()?;
        let desc = self.session.descriptor(type_handle)?;
        self.stats.objects += 1;
        tracing::trace!(handle, type_handle, encoding = ?desc.encoding(), "object record");

        match desc.encoding() {
            Encoding::Primitive(kind) => {
                let value = self.read_primitive(kind)?;
                self.session.register_object(handle, value.clone())?;
                Ok(value)
            }
            Encoding::String => {
                let value = Value::Str(Rc::from(self.input.read_string()?));
                self.session.register_object(handle, value.clone())?;
                Ok(value)
            }
            Encoding::Enum => {
                let key = self.session.local_type(type_handle)?;
                let name = self.read_enum_name()?.ok_or_else(|| {
                    GraphError::TypeMismatch(format!("null constant name for `{}`", desc.wire_name()))
                })?;
                let value = self.enum_constant(&key, &name)?;
                self.session.register_object(handle, value.clone())?;
                Ok(value)
            }
            Encoding::Array => self.read_array(handle, &desc),
            Encoding::Externalizable => self.read_external(handle, &desc),
            Encoding::Fields | Encoding::Hook => self.read_levels(handle, &desc),
            Encoding::Root => Err(GraphError::Format(format!(
                "object {handle} claims the root type `{}`",
                desc.wire_name()
            ))),
        }
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Value> {
        Ok(match kind {
            PrimitiveKind::Bool => Value::Bool(self.input.read_bool()?),
            PrimitiveKind::U8 => Value::U8(self.input.read_u8()?),
            PrimitiveKind::I8 => Value::I8(self.input.read_i8()?),
            PrimitiveKind::I16 => Value::I16(self.input.read_i16()?),
            PrimitiveKind::U16 => Value::U16(self.input.read_u16()?),
            PrimitiveKind::I32 => Value::I32(self.input.read_i32()?),
            PrimitiveKind::I64 => Value::I64(self.input.read_i64()?),
            PrimitiveKind::F32 => Value::F32(self.input.read_f32()?),
            PrimitiveKind::F64 => Value::F64(self.input.read_f64()?),
        })
    }

    fn read_primitive_array(&mut self, kind: PrimitiveKind, len: usize) -> Result<ArrayData> {
        Ok(match kind {
            PrimitiveKind::Bool => ArrayData::Bool(self.input.read_bool_vec(len)?),
            PrimitiveKind::U8 => ArrayData::U8(self.input.read_byte_vec(len)?),
            PrimitiveKind::I8 => ArrayData::I8(self.input.read_i8_vec(len)?),
            PrimitiveKind::I16 => ArrayData::I16(self.input.read_i16_vec(len)?),
            PrimitiveKind::U16 => ArrayData::U16(self.input.read_u16_vec(len)?),
            PrimitiveKind::I32 => ArrayData::I32(self.input.read_i32_vec(len)?),
            PrimitiveKind::I64 => ArrayData::I64(self.input.read_i64_vec(len)?),
            PrimitiveKind::F32 => ArrayData::F32(self.input.read_f32_vec(len)?),
            PrimitiveKind::F64 => ArrayData::F64(self.input.read_f64_vec(len)?),
        })
    }

    /// Reads the name of an enum constant, written as a nested string value.
    fn read_enum_name(&mut self) -> Result<Option<Rc<str>>> {
        match self.read_value()? {
            Value::Str(name) => Ok(Some(name)),
            Value::Null => Ok(None),
            other => Err(GraphError::TypeMismatch(format!(
                "expected an enum constant name, found {other:?}"
            ))),
        }
    }

    fn enum_constant(&self, key: &TypeKey, name: &str) -> Result<Value> {
        let TypeKey::Named(id) = key else {
            return Err(GraphError::TypeMismatch(format!("{key:?} is not an enum")));
        };
        let info = self.session.registry().expect(*id)?;
        if !info.is_enum() {
            return Err(GraphError::TypeMismatch(format!("`{}` is not an enum", info.wire_name)));
        }
        let constant = info.variant(name).ok_or_else(|| GraphError::UnknownEnumConstant {
            type_name: info.wire_name.clone(),
            constant: name.to_owned(),
        })?;
        Ok(Value::Enum(EnumValue {
            type_id: *id,
            name: constant,
        }))
    }

    fn read_array(&mut self, handle: u32, desc: &TypeDescriptor) -> Result<Value> {
        let len = self.input.read_u32()?;
        if len > self.config.max_array_len {
            return Err(GraphError::Format(format!(
                "array length {len} exceeds the limit of {}",
                self.config.max_array_len
            )));
        }
        let len = usize::try_from(len).map_err(|_| GraphError::Format(format!("array length {len}")))?;
        let component = desc
            .component_type()
            .ok_or_else(|| GraphError::Internal("array descriptor without component".into()))?;
        let encoding = self.session.descriptor(component)?.encoding();

        if let Encoding::Primitive(kind) = encoding {
            let value = Value::array(self.read_primitive_array(kind, len)?);
            self.session.register_object(handle, value.clone())?;
            return Ok(value);
        }

        // Registered empty first: elements may refer back to the array.
        let component = self.session.local_type(component)?;
        let array = shared(ArrayData::Values {
            component: component.clone(),
            items: Vec::new(),
        });
        let value = Value::Array(Rc::clone(&array));
        self.session.register_object(handle, value.clone())?;

        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            let item = if encoding == Encoding::Enum {
                match self.read_enum_name()? {
                    Some(name) => self.enum_constant(&component, &name)?,
                    None => Value::Null,
                }
            } else {
                self.read_value()?
            };
            items.push(item);
        }
        *array
            .try_borrow_mut()
            .map_err(|_| GraphError::Internal("array is borrowed during decoding".into()))? =
            ArrayData::Values { component, items };
        Ok(value)
    }

    fn local_info(&mut self, desc: &TypeDescriptor) -> Result<(Arc<TypeRegistry>, TypeId)> {
        match self.session.local_type(desc.handle())? {
            TypeKey::Named(id) => Ok((Arc::clone(self.session.registry()), id)),
            other => Err(GraphError::TypeMismatch(format!(
                "`{}` resolves to {other:?}",
                desc.wire_name()
            ))),
        }
    }

    fn read_external(&mut self, handle: u32, desc: &TypeDescriptor) -> Result<Value> {
        let (registry, id) = self.local_info(desc)?;
        let info = registry.expect(id)?;
        let (TypeShape::Externalizable(fns), Some(alloc)) = (&info.shape, info.alloc) else {
            return Err(GraphError::TypeMismatch(format!(
                "local type `{}` is not externalizable",
                info.wire_name
            )));
        };
        let obj = alloc();
        self.session.register_object(handle, Value::Object(obj.clone()))?;
        {
            let mut guard = obj.borrow_mut()?;
            self.externalize(info, fns, &mut *guard)?;
        }
        Ok(Value::Object(obj))
    }

    fn externalize(&mut self, info: &TypeInfo, fns: &ExternalFns, target: &mut dyn Any) -> Result<()> {
        self.frames.push(None);
        let result = (fns.read)(target, self);
        self.frames.pop();
        result.map_err(|e| GraphError::external(&info.wire_name, e))
    }

    /// Base-first walk over the type levels of a plain object.
    fn read_levels(&mut self, handle: u32, desc: &Rc<TypeDescriptor>) -> Result<Value> {
        let (registry, id) = self.local_info(desc)?;
        let chain = registry.level_chain(id)?;
        let local = chain[0];
        let (TypeShape::Plain { .. }, Some(alloc)) = (&local.shape, local.alloc) else {
            return Err(GraphError::TypeMismatch(format!(
                "local type `{}` is not a plain type",
                local.wire_name
            )));
        };
        let obj = alloc();
        self.session.register_object(handle, Value::Object(obj.clone()))?;

        let mut wire_chain = vec![Rc::clone(desc)];
        while let Some(super_type) = wire_chain.last().and_then(|d| d.super_type()) {
            if wire_chain.len() > self.session.descriptor_count() {
                return Err(GraphError::Format(format!(
                    "super type chain of `{}` does not terminate",
                    desc.wire_name()
                )));
            }
            wire_chain.push(self.session.descriptor(super_type)?);
        }

        for wire in wire_chain.iter().rev() {
            let level_key = self.session.local_type(wire.handle())?;
            let depth = chain
                .iter()
                .position(|info| TypeKey::Named(info.type_id) == level_key)
                .ok_or_else(|| {
                    GraphError::TypeMismatch(format!(
                        "`{}` is not a level of local type `{}`",
                        wire.wire_name(),
                        local.wire_name
                    ))
                })?;
            let info = chain[depth];
            match (wire.encoding(), &info.shape) {
                (Encoding::Externalizable, TypeShape::Externalizable(fns)) => {
                    let mut guard = obj.borrow_mut()?;
                    let target = project_mut(&mut *guard, &chain, depth)?;
                    self.externalize(info, fns, target)?;
                }
                (Encoding::Hook, TypeShape::Plain { hook: Some(hook), .. }) => {
                    let mut guard = obj.borrow_mut()?;
                    let target = project_mut(&mut *guard, &chain, depth)?;
                    self.frames.push(Some(ReadFrame {
                        wire: Rc::clone(wire),
                        local: info.type_id,
                    }));
                    let result = (hook.read)(target, self);
                    self.frames.pop();
                    result.map_err(|e| GraphError::hook(&info.wire_name, e))?;
                }
                (Encoding::Fields, TypeShape::Plain { .. }) => {
                    let values = self.read_declared_fields(wire)?;
                    let mut guard = obj.borrow_mut()?;
                    let target = project_mut(&mut *guard, &chain, depth)?;
                    assign_fields(info, target, values)?;
                }
                (encoding, shape) => {
                    return Err(GraphError::TypeMismatch(format!(
                        "stream level `{}` is {encoding:?} but local type `{}` is {shape:?}",
                        wire.wire_name(),
                        info.wire_name
                    )));
                }
            }
        }
        Ok(Value::Object(obj))
    }

    /// Decodes the declared fields of one wire level, in wire order.
    fn read_declared_fields(&mut self, wire: &TypeDescriptor) -> Result<Vec<(String, Value)>> {
        let mut values = Vec::with_capacity(wire.fields().len());
        for field in wire.fields() {
            let encoding = self.session.descriptor(field.type_handle)?.encoding();
            let value = match encoding {
                Encoding::Primitive(kind) => self.read_primitive(kind)?,
                Encoding::Enum => match self.read_enum_name()? {
                    Some(name) => {
                        let key = self.session.local_type(field.type_handle)?;
                        self.enum_constant(&key, &name)?
                    }
                    None => Value::Null,
                },
                _ => self.read_value()?,
            };
            values.push((field.name.clone(), value));
        }
        Ok(values)
    }
}

fn assign_fields(info: &TypeInfo, target: &mut dyn Any, values: Vec<(String, Value)>) -> Result<()> {
    for (name, value) in values {
        match info.field(&name) {
            Some(field) => (field.set)(target, value).map_err(|e| match e {
                GraphError::TypeMismatch(msg) => {
                    GraphError::TypeMismatch(format!("{}.{name}: {msg}", info.wire_name))
                }
                other => other,
            })?,
            None => tracing::warn!(
                type_name = %info.wire_name,
                field = %name,
                "dropping stream field unknown to the local type"
            ),
        }
    }
    Ok(())
}

impl<R: Read> ObjectInput for GraphReader<R> {
    fn read_value(&mut self) -> Result<Value> {
        GraphReader::read_value(self)
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.input.read_bool()
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.input.read_u8()
    }

    fn read_i8(&mut self) -> Result<i8> {
        self.input.read_i8()
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.input.read_i16()
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.input.read_u16()
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.input.read_i32()
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.input.read_u32()
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.input.read_i64()
    }

    fn read_f32(&mut self) -> Result<f32> {
        self.input.read_f32()
    }

    fn read_f64(&mut self) -> Result<f64> {
        self.input.read_f64()
    }

    fn read_string(&mut self) -> Result<String> {
        self.input.read_string()
    }

    fn default_read_fields(&mut self, target: &mut dyn Any) -> Result<()> {
        let (wire, local) = match self.frames.last() {
            Some(Some(frame)) => (Rc::clone(&frame.wire), frame.local),
            Some(None) => {
                return Err(GraphError::Internal(
                    "default field walk inside an externalized payload".into(),
                ));
            }
            None => {
                return Err(GraphError::Internal(
                    "default field walk outside of a hook".into(),
                ));
            }
        };
        let values = self.read_declared_fields(&wire)?;
        let registry = Arc::clone(self.session.registry());
        assign_fields(registry.expect(local)?, target, values)
    }

    fn read_fields(&mut self) -> Result<GetFields> {
        let mut fields = GetFields::default();
        let primitives = self.input.read_u32()?;
        for _ in 0..primitives {
            let name = self.input.read_string()?;
            let kind = primitive_kind_of(self.input.read_u8()?)?;
            let value = self.read_primitive(kind)?;
            fields.insert_primitive(name, value);
        }
        let objects = self.input.read_u32()?;
        for _ in 0..objects {
            let name = self.input.read_string()?;
            let value = GraphReader::read_value(self)?;
            fields.insert_object(name, value);
        }
        Ok(fields)
    }
}
