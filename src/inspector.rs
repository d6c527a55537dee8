// src/inspector.rs

//! Tools for inspecting the structure of graphwire streams.
//! Useful for debugging schemas and checking descriptor deduplication.

use crate::error::Result;
use crate::format::{FIRST_DYNAMIC_HANDLE, TypeFlags};
use crate::reader::{GraphReader, ReadStats};
use crate::reflect::describe_value;
use crate::registry::TypeRegistry;
use crate::session::ReadSession;
use serde::Serialize;
use std::sync::Arc;

/// A structural report of a stream.
#[derive(Debug, Serialize)]
pub struct StreamReport {
    /// Total size of the stream in bytes.
    pub total_bytes: u64,
    /// One line per root value, in stream order.
    pub roots: Vec<String>,
    /// Record counters.
    pub stats: ReadStats,
    /// Descriptors introduced by the stream, in handle order.
    pub descriptors: Vec<DescriptorInfo>,
}

/// One type descriptor as found in the stream.
#[derive(Debug, Serialize)]
pub struct DescriptorInfo {
    /// Session handle.
    pub handle: u32,
    /// Wire name.
    pub wire_name: String,
    /// Flag names, `|`-separated.
    pub flags: String,
    /// Wire name of the base type.
    pub super_type: Option<String>,
    /// Wire name of the array component.
    pub component_type: Option<String>,
    /// `(field name, field type wire name)` in encoding order.
    pub fields: Vec<(String, String)>,
    /// Structural fingerprint, hex.
    pub fingerprint: String,
}

/// The graphwire stream inspector.
#[derive(Debug)]
pub struct StreamInspector;

impl StreamInspector {
    /// Reads every value of `bytes` and reports what the stream contains.
    ///
    /// Decoding needs the local types, hence the registry.
    pub fn inspect(bytes: &[u8], registry: &Arc<TypeRegistry>) -> Result<StreamReport> {
        let mut reader = GraphReader::new(bytes, Arc::clone(registry))?;
        let mut roots = Vec::new();
        while let Some(value) = reader.try_read_value()? {
            roots.push(describe_value(&value));
        }

        let session = reader.session();
        let mut descriptors = Vec::new();
        for desc in session.dynamic_descriptors() {
            let name_of = |handle: u32| Self::name_of(session, handle);
            descriptors.push(DescriptorInfo {
                handle: desc.handle(),
                wire_name: desc.wire_name().to_owned(),
                flags: Self::flag_names(desc.flags()),
                super_type: desc.super_type().map(name_of),
                component_type: desc.component_type().map(name_of),
                fields: desc
                    .fields()
                    .iter()
                    .map(|f| (f.name.clone(), name_of(f.type_handle)))
                    .collect(),
                fingerprint: format!("{:016x}", session.fingerprint(desc.handle())?),
            });
        }

        Ok(StreamReport {
            total_bytes: bytes.len() as u64,
            roots,
            stats: reader.stats(),
            descriptors,
        })
    }

    fn name_of(session: &ReadSession, handle: u32) -> String {
        session
            .descriptor(handle)
            .map(|d| d.wire_name().to_owned())
            .unwrap_or_else(|_| format!("#{handle}"))
    }

    fn flag_names(flags: TypeFlags) -> String {
        if flags.is_empty() {
            return "-".to_string();
        }
        flags.iter_names().map(|(name, _)| name).collect::<Vec<_>>().join("|")
    }
}

impl std::fmt::Display for StreamReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== GRAPHWIRE STREAM REPORT ===")?;
        writeln!(f, "Total Bytes:    {}", self.total_bytes)?;
        writeln!(f, "Roots:          {}", self.roots.len())?;
        writeln!(
            f,
            "Objects:        {} (+{} back-references, {} nulls)",
            self.stats.objects, self.stats.back_references, self.stats.nulls
        )?;
        writeln!(
            f,
            "Descriptors:    {} in {} blocks (first dynamic handle {})",
            self.stats.descriptors, self.stats.type_blocks, FIRST_DYNAMIC_HANDLE
        )?;
        writeln!(f, "\n[TYPES]")?;
        for (i, desc) in self.descriptors.iter().enumerate() {
            desc.fmt_tree(f, i == self.descriptors.len() - 1)?;
        }
        Ok(())
    }
}

impl DescriptorInfo {
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>, is_last: bool) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let lineage = match (&self.super_type, &self.component_type) {
            (Some(base), _) => format!(" : {base}"),
            (None, Some(component)) => format!(" of {component}"),
            (None, None) => String::new(),
        };
        writeln!(
            f,
            "{}#{} {}{} [{}] fp={}",
            connector, self.handle, self.wire_name, lineage, self.flags, self.fingerprint
        )?;

        for (i, (name, ty)) in self.fields.iter().enumerate() {
            let field_connector = if i == self.fields.len() - 1 { "└── " } else { "├── " };
            writeln!(f, "{}{}{}: {}", child_prefix, field_connector, name, ty)?;
        }
        Ok(())
    }
}
