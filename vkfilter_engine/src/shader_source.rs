//! Shader bytecode loading
//!
//! Shaders are looked up by logical name ("quad.vert", "texture.frag", ...)
//! and returned as raw SPIR-V bytes.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::error::{Error, InitResource, Result};
use crate::engine_debug;

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Supplies shader bytecode by logical name
pub trait ShaderSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Loads `<root>/<name>.spv`
#[derive(Debug, Clone)]
pub struct FileShaderSource {
    root: PathBuf,
}

impl FileShaderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.spv", name))
    }
}

impl ShaderSource for FileShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name);
        let bytes = fs::read(&path).map_err(|e| {
            Error::init(
                InitResource::ShaderModule,
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        engine_debug!("vkfilter::ShaderSource", "Loaded {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }
}

/// In-memory shaders keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryShaderSource {
    shaders: FxHashMap<String, Vec<u8>>,
}

impl MemoryShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.shaders.insert(name.into(), bytes);
    }
}

impl ShaderSource for MemoryShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.shaders.get(name).cloned().ok_or_else(|| {
            Error::init(InitResource::ShaderModule, format!("unknown shader '{}'", name))
        })
    }
}

/// Validate SPIR-V bytecode and return it as words
///
/// Accepts either byte order of the magic number.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(Error::init(InitResource::ShaderModule, "empty shader bytecode"));
    }
    if bytes.len() % 4 != 0 {
        return Err(Error::init(
            InitResource::ShaderModule,
            format!("bytecode length {} is not a multiple of 4", bytes.len()),
        ));
    }

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if words[0] == SPIRV_MAGIC.swap_bytes() {
        for word in &mut words {
            *word = word.swap_bytes();
        }
    }
    if words[0] != SPIRV_MAGIC {
        return Err(Error::init(
            InitResource::ShaderModule,
            format!("bad SPIR-V magic 0x{:08x}", words[0]),
        ));
    }
    Ok(words)
}

#[cfg(test)]
#[path = "shader_source_tests.rs"]
mod tests;
