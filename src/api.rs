// src/api.rs

//! High-level entry points.

use crate::config::CodecConfig;
use crate::error::Result;
use crate::reader::GraphReader;
use crate::registry::TypeRegistry;
use crate::value::Value;
use crate::writer::GraphWriter;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Serializes one value as a complete stream: magic, then the value.
pub fn serialize<W: Write>(value: &Value, sink: W, registry: &Arc<TypeRegistry>) -> Result<()> {
    let mut writer = GraphWriter::new(sink, Arc::clone(registry))?;
    writer.write_value(value)?;
    writer.flush()
}

/// Deserializes one value from a complete stream.
pub fn deserialize<R: Read>(source: R, registry: &Arc<TypeRegistry>) -> Result<Value> {
    GraphReader::new(source, Arc::clone(registry))?.read_value()
}

/// A type registry plus configuration; the factory for writers and readers.
///
/// Cheap to clone: the registry is shared.
#[derive(Debug, Clone)]
pub struct GraphCodec {
    registry: Arc<TypeRegistry>,
    config: CodecConfig,
}

impl GraphCodec {
    /// Creates a codec with the default configuration.
    pub fn new(registry: TypeRegistry) -> Self {
        Self::from_shared(Arc::new(registry), CodecConfig::default())
    }

    /// Creates a codec with an explicit configuration.
    pub fn with_config(registry: TypeRegistry, config: CodecConfig) -> Self {
        Self::from_shared(Arc::new(registry), config)
    }

    /// Creates a codec over an already shared registry.
    pub fn from_shared(registry: Arc<TypeRegistry>, config: CodecConfig) -> Self {
        Self { registry, config }
    }

    /// The type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The configuration.
    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Starts a write session on `sink`.
    pub fn writer<W: Write>(&self, sink: W) -> Result<GraphWriter<W>> {
        GraphWriter::with_config(sink, Arc::clone(&self.registry), self.config)
    }

    /// Starts a read session on `source`.
    pub fn reader<R: Read>(&self, source: R) -> Result<GraphReader<R>> {
        GraphReader::with_config(source, Arc::clone(&self.registry), self.config)
    }

    /// Writes `value` as a complete stream to `sink`.
    pub fn serialize<W: Write>(&self, value: &Value, sink: W) -> Result<()> {
        let mut writer = self.writer(sink)?;
        writer.write_value(value)?;
        writer.flush()
    }

    /// Reads one value from a complete stream.
    pub fn deserialize<R: Read>(&self, source: R) -> Result<Value> {
        self.reader(source)?.read_value()
    }

    /// Encodes `value` into a new buffer.
    pub fn to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        let mut writer = self.writer(Vec::new())?;
        writer.write_value(value)?;
        writer.into_inner()
    }

    /// Decodes one value from `bytes`.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<Value> {
        self.deserialize(bytes)
    }

    /// Saves `value` to a file.
    ///
    /// # Arguments
    /// * `path`: Destination file path; created or truncated.
    /// * `value`: The root of the graph.
    pub fn save<P: AsRef<Path>>(&self, path: P, value: &Value) -> Result<()> {
        // 1. Buffered sink; the writer flushes it when done.
        let file = File::create(path.as_ref())?;
        let mut writer = self.writer(BufWriter::new(file))?;

        // 2. One session, one root.
        writer.write_value(value)?;

        // 3. Flush both buffers and release the file.
        let sink = writer.into_inner()?;
        sink.into_inner().map_err(|e| e.into_error())?;
        Ok(())
    }

    /// Loads a value saved by [`GraphCodec::save`].
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Value> {
        let file = File::open(path.as_ref())?;
        self.deserialize(BufReader::new(file))
    }
}
