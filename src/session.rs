//! Per-stream registries.
//!
//! A [`WriteSession`] maps object identities and local types to handles; a
//! [`ReadSession`] maps handles back to reconstructed values and wire descriptors.
//! Both are seeded from the process-wide bootstrap table (primitive kinds, the root
//! type, the string type), so those descriptors never travel on the wire and carry
//! the same handles in every session.

use crate::descriptor::{FieldDescriptor, TypeDescriptor};
use crate::error::{GraphError, Result};
use crate::format::{
    FIRST_DYNAMIC_HANDLE, FIRST_OBJECT_HANDLE, ROOT_HANDLE, ROOT_WIRE_NAME, STRING_HANDLE,
    STRING_WIRE_NAME, TypeFlags, primitive_handle,
};
use crate::registry::{TypeRegistry, TypeShape};
use crate::value::{Identity, PrimitiveKind, TypeKey, Value};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, LazyLock};

static BOOTSTRAP: LazyLock<Vec<(TypeKey, TypeDescriptor)>> = LazyLock::new(build_bootstrap);

fn build_bootstrap() -> Vec<(TypeKey, TypeDescriptor)> {
    let primitives = PrimitiveKind::ALL.iter().map(|kind| {
        (
            TypeKey::Primitive(*kind),
            primitive_handle(*kind),
            kind.wire_name(),
            TypeFlags::PRIMITIVE,
        )
    });
    let others = [
        (TypeKey::Root, ROOT_HANDLE, ROOT_WIRE_NAME, TypeFlags::empty()),
        (TypeKey::String, STRING_HANDLE, STRING_WIRE_NAME, TypeFlags::empty()),
    ];
    primitives
        .chain(others)
        .filter_map(|(key, handle, name, flags)| {
            TypeDescriptor::new(handle, name, flags, None, None, Vec::new())
                .ok()
                .map(|desc| (key, desc))
        })
        .collect()
}

/// The process-wide bootstrap descriptors, in handle order.
pub fn bootstrap_descriptors() -> impl Iterator<Item = &'static TypeDescriptor> {
    BOOTSTRAP.iter().map(|(_, desc)| desc)
}

/// Serialization-side registries of one stream.
#[derive(Debug)]
pub struct WriteSession {
    registry: Arc<TypeRegistry>,
    type_handles: HashMap<TypeKey, u32>,
    descriptors: HashMap<u32, Rc<TypeDescriptor>>,
    next_type_handle: u32,
    objects: HashMap<Identity, u32>,
    keep_alive: Vec<Value>,
    next_object_handle: u32,
}

impl WriteSession {
    /// Creates a session seeded with the bootstrap table.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let mut type_handles = HashMap::new();
        let mut descriptors = HashMap::new();
        for (key, desc) in BOOTSTRAP.iter() {
            type_handles.insert(key.clone(), desc.handle());
            descriptors.insert(desc.handle(), Rc::new(desc.clone()));
        }
        Self {
            registry,
            type_handles,
            descriptors,
            next_type_handle: FIRST_DYNAMIC_HANDLE,
            objects: HashMap::new(),
            keep_alive: Vec::new(),
            next_object_handle: FIRST_OBJECT_HANDLE,
        }
    }

    /// The registry local types are resolved against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The handle already assigned to an object identity.
    pub fn object_handle(&self, identity: &Identity) -> Option<u32> {
        self.objects.get(identity).copied()
    }

    /// Assigns the next object handle. The value is kept alive for the session so
    /// its identity cannot be reused by a later allocation.
    pub fn assign_object(&mut self, identity: Option<Identity>, value: &Value) -> u32 {
        let handle = self.next_object_handle;
        self.next_object_handle += 1;
        if let Some(identity) = identity {
            self.objects.insert(identity, handle);
            if matches!(value, Value::Str(_) | Value::Array(_) | Value::Object(_)) {
                self.keep_alive.push(value.clone());
            }
        }
        handle
    }

    /// Number of object handles assigned so far.
    pub fn object_count(&self) -> u32 {
        self.next_object_handle - FIRST_OBJECT_HANDLE
    }

    /// The handle of a local type, if it was already described.
    pub fn type_handle(&self, key: &TypeKey) -> Option<u32> {
        self.type_handles.get(key).copied()
    }

    /// A descriptor by handle.
    pub fn descriptor(&self, handle: u32) -> Result<&Rc<TypeDescriptor>> {
        self.descriptors
            .get(&handle)
            .ok_or(GraphError::UnknownTypeHandle(handle))
    }

    /// Resolves a local type to its descriptor handle, describing it (and every type
    /// it references) on first encounter.
    ///
    /// Handles of newly created descriptors are appended to `pending`, referenced
    /// types before the types referencing them.
    pub fn resolve_type(&mut self, key: &TypeKey, pending: &mut Vec<u32>) -> Result<u32> {
        if let Some(handle) = self.type_handles.get(key) {
            return Ok(*handle);
        }
        let handle = self.next_type_handle;
        self.next_type_handle += 1;
        self.type_handles.insert(key.clone(), handle);

        let registry = Arc::clone(&self.registry);
        let wire_name = registry.wire_name_of(key)?;
        let desc = match key {
            TypeKey::Array(component) => {
                let component = self.resolve_type(component, pending)?;
                TypeDescriptor::new(handle, wire_name, TypeFlags::ARRAY, None, Some(component), Vec::new())?
            }
            TypeKey::Named(id) => {
                let info = registry.expect(*id)?;
                match &info.shape {
                    TypeShape::Enum { .. } => {
                        TypeDescriptor::new(handle, wire_name, TypeFlags::ENUM, None, None, Vec::new())?
                    }
                    TypeShape::Externalizable(_) => TypeDescriptor::new(
                        handle,
                        wire_name,
                        TypeFlags::EXTERNALIZABLE,
                        None,
                        None,
                        Vec::new(),
                    )?,
                    TypeShape::Plain { base, fields, hook } => {
                        let super_type = match base {
                            Some(link) => Some(self.resolve_type(&TypeKey::Named(link.type_id), pending)?),
                            None => None,
                        };
                        let mut described = Vec::with_capacity(fields.len());
                        for field in fields {
                            described.push(FieldDescriptor {
                                name: field.name.to_owned(),
                                type_handle: self.resolve_type(&field.key, pending)?,
                            });
                        }
                        let flags = if hook.is_some() {
                            TypeFlags::HAS_HOOK
                        } else {
                            TypeFlags::empty()
                        };
                        TypeDescriptor::new(handle, wire_name, flags, super_type, None, described)?
                    }
                }
            }
            TypeKey::Primitive(_) | TypeKey::Root | TypeKey::String => {
                return Err(GraphError::Internal(format!(
                    "bootstrap type {key:?} missing from session"
                )));
            }
        };
        tracing::trace!(handle, wire_name = desc.wire_name(), "described type");
        self.descriptors.insert(handle, Rc::new(desc));
        pending.push(handle);
        Ok(handle)
    }

    /// Structural fingerprint of a described type.
    pub fn fingerprint(&self, handle: u32) -> Result<u64> {
        self.descriptor(handle)?
            .fingerprint(|h| self.descriptors.get(&h).map(|d| d.wire_name()))
    }
}

/// Deserialization-side registries of one stream.
#[derive(Debug)]
pub struct ReadSession {
    registry: Arc<TypeRegistry>,
    descriptors: HashMap<u32, Rc<TypeDescriptor>>,
    local_types: HashMap<u32, TypeKey>,
    objects: HashMap<u32, Value>,
}

impl ReadSession {
    /// Creates a session seeded with the bootstrap table.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let mut descriptors = HashMap::new();
        let mut local_types = HashMap::new();
        for (key, desc) in BOOTSTRAP.iter() {
            local_types.insert(desc.handle(), key.clone());
            descriptors.insert(desc.handle(), Rc::new(desc.clone()));
        }
        Self {
            registry,
            descriptors,
            local_types,
            objects: HashMap::new(),
        }
    }

    /// The registry wire names are resolved against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Adds a descriptor read from the stream.
    pub fn insert_descriptor(&mut self, desc: TypeDescriptor) -> Result<()> {
        let handle = desc.handle();
        if self.descriptors.contains_key(&handle) {
            return Err(GraphError::Format(format!(
                "descriptor handle {handle} introduced twice"
            )));
        }
        self.descriptors.insert(handle, Rc::new(desc));
        Ok(())
    }

    /// A descriptor by handle.
    pub fn descriptor(&self, handle: u32) -> Result<Rc<TypeDescriptor>> {
        self.descriptors
            .get(&handle)
            .cloned()
            .ok_or(GraphError::UnknownTypeHandle(handle))
    }

    /// Number of known descriptors, bootstrap included.
    pub fn descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Descriptors introduced by the stream (bootstrap excluded), in handle order.
    pub fn dynamic_descriptors(&self) -> Vec<Rc<TypeDescriptor>> {
        let mut out: Vec<_> = self
            .descriptors
            .values()
            .filter(|d| d.handle() >= FIRST_DYNAMIC_HANDLE)
            .cloned()
            .collect();
        out.sort_by_key(|d| d.handle());
        out
    }

    /// The local type a descriptor resolves to. Resolution happens once per handle.
    pub fn local_type(&mut self, handle: u32) -> Result<TypeKey> {
        if let Some(key) = self.local_types.get(&handle) {
            return Ok(key.clone());
        }
        let desc = self.descriptor(handle)?;
        let key = self.registry.resolve_wire_name(desc.wire_name())?;
        self.local_types.insert(handle, key.clone());
        Ok(key)
    }

    /// The value registered under an object handle.
    pub fn object(&self, handle: u32) -> Option<&Value> {
        self.objects.get(&handle)
    }

    /// Registers a (possibly still incomplete) value under an object handle.
    pub fn register_object(&mut self, handle: u32, value: Value) -> Result<()> {
        if self.objects.insert(handle, value).is_some() {
            return Err(GraphError::Format(format!(
                "object handle {handle} introduced twice"
            )));
        }
        Ok(())
    }

    /// Number of objects reconstructed so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Structural fingerprint of a type read from the stream.
    pub fn fingerprint(&self, handle: u32) -> Result<u64> {
        self.descriptor(handle)?
            .fingerprint(|h| self.descriptors.get(&h).map(|d| d.wire_name()))
    }
}
