//! The type registry: the static type information the codec needs in place of
//! runtime reflection.
//!
//! Each registered Rust type contributes a [`TypeInfo`]: its wire name, its shape
//! (plain fields, externalizable, or enum), and an allocation routine producing a
//! default-initialized instance. `#[derive(Graph)]` generates the [`crate::Reflect`]
//! implementation that builds this table.
//!
//! A registry is immutable once built and is shared between codecs through an `Arc`.

use crate::error::{GraphError, Result};
use crate::format::{ARRAY_PREFIX, MAX_ARRAY_DIMENSIONS, ROOT_WIRE_NAME, STRING_WIRE_NAME};
use crate::hook::{ObjectInput, ObjectOutput};
use crate::reflect::Reflect;
use crate::value::{ObjectRef, PrimitiveKind, TypeKey};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Reads a field of an instance into a [`crate::Value`].
pub type FieldGetter = fn(&dyn Any) -> Result<crate::Value>;
/// Assigns a [`crate::Value`] to a field of an instance.
pub type FieldSetter = fn(&mut dyn Any, crate::Value) -> Result<()>;

/// One declared, non-transient field of a plain type.
#[derive(Clone)]
pub struct FieldInfo {
    /// Field name, unique within its declaring type.
    pub name: &'static str,
    /// Declared type of the field.
    pub key: TypeKey,
    /// Reads the field.
    pub get: FieldGetter,
    /// Writes the field.
    pub set: FieldSetter,
}

impl FieldInfo {
    /// Creates a field entry.
    pub fn new(name: &'static str, key: TypeKey, get: FieldGetter, set: FieldSetter) -> Self {
        Self {
            name,
            key,
            get,
            set,
        }
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Link from a derived type to the base type it embeds.
#[derive(Clone, Copy)]
pub struct BaseLink {
    /// The base type.
    pub type_id: TypeId,
    /// Projects a derived instance onto its embedded base.
    pub project: for<'a> fn(&'a dyn Any) -> Result<&'a dyn Any>,
    /// Mutable counterpart of `project`.
    pub project_mut: for<'a> fn(&'a mut dyn Any) -> Result<&'a mut dyn Any>,
}

impl fmt::Debug for BaseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseLink")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// Custom read/write routines of a hooked type level.
#[derive(Clone, Copy)]
pub struct HookFns {
    /// Writes the level's payload.
    pub write: fn(&dyn Any, &mut dyn ObjectOutput) -> Result<()>,
    /// Reads the level's payload into a default-initialized instance.
    pub read: fn(&mut dyn Any, &mut dyn ObjectInput) -> Result<()>,
}

/// Externalization routines of an externalizable type.
#[derive(Clone, Copy)]
pub struct ExternalFns {
    /// Writes the complete payload.
    pub write: fn(&dyn Any, &mut dyn ObjectOutput) -> Result<()>,
    /// Reads the complete payload into a default-initialized instance.
    pub read: fn(&mut dyn Any, &mut dyn ObjectInput) -> Result<()>,
}

/// How instances of a type are encoded.
#[derive(Clone)]
pub enum TypeShape {
    /// Field walk (optionally through a custom hook), after the base's fields.
    Plain {
        /// Embedded base type, if any.
        base: Option<BaseLink>,
        /// Declared fields in encoding order.
        fields: Vec<FieldInfo>,
        /// Custom routines replacing the field walk for this level.
        hook: Option<HookFns>,
    },
    /// The type encodes its whole payload itself.
    Externalizable(ExternalFns),
    /// A unit-only enum, encoded by constant name.
    Enum {
        /// Constant names.
        variants: &'static [&'static str],
    },
}

impl fmt::Debug for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { base, fields, hook } => f
                .debug_struct("Plain")
                .field("base", base)
                .field("fields", fields)
                .field("hook", &hook.is_some())
                .finish(),
            Self::Externalizable(_) => f.write_str("Externalizable"),
            Self::Enum { variants } => f.debug_struct("Enum").field("variants", variants).finish(),
        }
    }
}

/// Everything the codec knows about one registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// The Rust type.
    pub type_id: TypeId,
    /// The Rust type name, for diagnostics.
    pub type_name: &'static str,
    /// Canonical, process-independent type signature.
    pub wire_name: String,
    /// Encoding shape.
    pub shape: TypeShape,
    /// Allocates a default-initialized instance; `None` for enums.
    pub alloc: Option<fn() -> ObjectRef>,
}

impl TypeInfo {
    /// Describes a plain struct.
    pub fn plain<T: Any + Default>(
        wire_name: impl Into<String>,
        base: Option<BaseLink>,
        fields: Vec<FieldInfo>,
        hook: Option<HookFns>,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            wire_name: wire_name.into(),
            shape: TypeShape::Plain { base, fields, hook },
            alloc: Some(crate::rt::alloc_default::<T>),
        }
    }

    /// Describes an externalizable struct.
    pub fn externalizable<T: Any + Default>(wire_name: impl Into<String>, fns: ExternalFns) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            wire_name: wire_name.into(),
            shape: TypeShape::Externalizable(fns),
            alloc: Some(crate::rt::alloc_default::<T>),
        }
    }

    /// Describes a unit-only enum.
    pub fn enumeration<T: Any>(wire_name: impl Into<String>, variants: &'static [&'static str]) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            wire_name: wire_name.into(),
            shape: TypeShape::Enum { variants },
            alloc: None,
        }
    }

    /// The embedded base, for plain types.
    pub fn base(&self) -> Option<&BaseLink> {
        match &self.shape {
            TypeShape::Plain { base, .. } => base.as_ref(),
            _ => None,
        }
    }

    /// Declared fields; empty for non-plain types.
    pub fn fields(&self) -> &[FieldInfo] {
        match &self.shape {
            TypeShape::Plain { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// The hook routines of this level, if any.
    pub fn hook(&self) -> Option<&HookFns> {
        match &self.shape {
            TypeShape::Plain { hook, .. } => hook.as_ref(),
            _ => None,
        }
    }

    /// Returns true for enum types.
    pub fn is_enum(&self) -> bool {
        matches!(self.shape, TypeShape::Enum { .. })
    }

    /// Finds the constant named `name`.
    pub fn variant(&self, name: &str) -> Option<&'static str> {
        match &self.shape {
            TypeShape::Enum { variants } => variants.iter().copied().find(|v| *v == name),
            _ => None,
        }
    }
}

/// Registry of all types a codec can encode and decode.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: Vec<TypeInfo>,
    by_type: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
    reserved: HashSet<TypeId>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` and every type reachable from its fields and base.
    ///
    /// Registering an already known type is a no-op. Self-referential types are
    /// supported: a type under registration is not described a second time.
    pub fn register<T: Reflect>(&mut self) -> Result<&mut Self> {
        let id = TypeId::of::<T>();
        if self.by_type.contains_key(&id) || !self.reserved.insert(id) {
            return Ok(self);
        }
        let described = T::describe(self);
        self.reserved.remove(&id);
        self.insert(described?)?;
        Ok(self)
    }

    /// Registers a hand-built type description.
    pub fn insert(&mut self, info: TypeInfo) -> Result<()> {
        if self.by_type.contains_key(&info.type_id) {
            return Ok(());
        }
        let name = info.wire_name.as_str();
        if name.is_empty()
            || name.starts_with(ARRAY_PREFIX)
            || name == ROOT_WIRE_NAME
            || name == STRING_WIRE_NAME
            || PrimitiveKind::from_wire_name(name).is_some()
        {
            return Err(GraphError::Format(format!(
                "`{name}` is reserved and cannot name a registered type"
            )));
        }
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateWireName(name.to_owned()));
        }
        if let Some(base) = info.base().and_then(|link| self.get(link.type_id)) {
            check_base(&info, base)?;
        }
        tracing::debug!(wire_name = name, rust_type = info.type_name, "registered type");
        let index = self.entries.len();
        self.by_name.insert(info.wire_name.clone(), index);
        self.by_type.insert(info.type_id, index);
        self.entries.push(info);
        Ok(())
    }

    /// Looks up a type by Rust type.
    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.by_type.get(&id).and_then(|i| self.entries.get(*i))
    }

    /// Looks up a type by wire name.
    pub fn by_wire_name(&self, name: &str) -> Option<&TypeInfo> {
        self.by_name.get(name).and_then(|i| self.entries.get(*i))
    }

    /// Looks up a type, failing with [`GraphError::UnresolvableType`].
    pub fn expect(&self, id: TypeId) -> Result<&TypeInfo> {
        self.get(id)
            .ok_or_else(|| GraphError::UnresolvableType(format!("{id:?} (not registered)")))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.entries.iter()
    }

    /// The wire name of a local type.
    pub fn wire_name_of(&self, key: &TypeKey) -> Result<String> {
        Ok(match key {
            TypeKey::Primitive(kind) => kind.wire_name().to_owned(),
            TypeKey::Root => ROOT_WIRE_NAME.to_owned(),
            TypeKey::String => STRING_WIRE_NAME.to_owned(),
            TypeKey::Array(component) => format!("{ARRAY_PREFIX}{}", self.wire_name_of(component)?),
            TypeKey::Named(id) => self.expect(*id)?.wire_name.clone(),
        })
    }

    /// Maps a wire name back to a local type.
    ///
    /// Names nesting arrays deeper than [`MAX_ARRAY_DIMENSIONS`] are rejected.
    pub fn resolve_wire_name(&self, name: &str) -> Result<TypeKey> {
        let component = name.trim_start_matches(ARRAY_PREFIX);
        let dimensions = (name.len() - component.len()) / ARRAY_PREFIX.len_utf8();
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(GraphError::Format(format!(
                "wire name nests {dimensions} array dimensions, the limit is {MAX_ARRAY_DIMENSIONS}"
            )));
        }
        let mut key = if let Some(kind) = PrimitiveKind::from_wire_name(component) {
            TypeKey::Primitive(kind)
        } else {
            match component {
                ROOT_WIRE_NAME => TypeKey::Root,
                STRING_WIRE_NAME => TypeKey::String,
                _ => self
                    .by_wire_name(component)
                    .map(|info| TypeKey::Named(info.type_id))
                    .ok_or_else(|| GraphError::UnresolvableType(component.to_owned()))?,
            }
        };
        for _ in 0..dimensions {
            key = TypeKey::array_of(key);
        }
        Ok(key)
    }

    /// The inheritance chain of a plain type, most-derived first.
    pub fn level_chain(&self, id: TypeId) -> Result<Vec<&TypeInfo>> {
        let mut chain = vec![self.expect(id)?];
        while let Some(base) = chain.last().and_then(|info| info.base()) {
            if chain.len() > self.entries.len() {
                return Err(GraphError::Internal(format!(
                    "base chain of {} does not terminate",
                    chain[0].wire_name
                )));
            }
            let base = self.expect(base.type_id)?;
            if let Some(derived) = chain.last() {
                check_base(derived, base)?;
            }
            chain.push(base);
        }
        Ok(chain)
    }
}

/// A base level is either plain or externalizable; enums cannot be embedded.
fn check_base(derived: &TypeInfo, base: &TypeInfo) -> Result<()> {
    if base.is_enum() {
        return Err(GraphError::TypeMismatch(format!(
            "`{}` cannot use the enum `{}` as its base",
            derived.wire_name, base.wire_name
        )));
    }
    Ok(())
}

/// Projects an instance onto the level `depth` steps up its base chain.
pub(crate) fn project<'a>(
    mut target: &'a dyn Any,
    chain: &[&TypeInfo],
    depth: usize,
) -> Result<&'a dyn Any> {
    for info in chain.iter().take(depth) {
        let link = info
            .base()
            .ok_or_else(|| GraphError::Internal(format!("{} has no base", info.wire_name)))?;
        target = (link.project)(target)?;
    }
    Ok(target)
}

/// Mutable counterpart of [`project`].
pub(crate) fn project_mut<'a>(
    mut target: &'a mut dyn Any,
    chain: &[&TypeInfo],
    depth: usize,
) -> Result<&'a mut dyn Any> {
    for info in chain.iter().take(depth) {
        let link = info
            .base()
            .ok_or_else(|| GraphError::Internal(format!("{} has no base", info.wire_name)))?;
        target = (link.project_mut)(target)?;
    }
    Ok(target)
}
