//! Synthetic read-only files
//!
//! A fixed set of single-segment names whose bytes come from the engine
//! rather than from a resolved locker: a readme, the attach table, and
//! whatever extra files the configuration declares. The set of names is
//! frozen once the engine is built; generated content is produced fresh
//! on every read.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::TableError;
use crate::path::is_valid_segment;

/// Zero-argument content generator
pub type Generator = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

/// Where a synthetic file's bytes come from
#[derive(Clone)]
pub enum SyntheticContent {
    /// Bytes fixed at startup
    Fixed(Arc<[u8]>),
    /// Bytes produced at read time
    Generated(Generator),
}

impl SyntheticContent {
    pub fn fixed(bytes: impl Into<Vec<u8>>) -> Self {
        SyntheticContent::Fixed(Arc::from(bytes.into()))
    }

    pub fn generated<F>(f: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        SyntheticContent::Generated(Arc::new(f))
    }

    /// Materialize the current bytes
    pub fn render(&self) -> Vec<u8> {
        match self {
            SyntheticContent::Fixed(bytes) => bytes.to_vec(),
            SyntheticContent::Generated(f) => f(),
        }
    }
}

impl fmt::Debug for SyntheticContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntheticContent::Fixed(bytes) => write!(f, "Fixed({} bytes)", bytes.len()),
            SyntheticContent::Generated(_) => f.write_str("Generated"),
        }
    }
}

/// Content kinds a configuration file may ask for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Static,
    AttachTab,
    LegacyAttachTab,
}

impl ContentKind {
    /// Parse the `kind` of a configured file
    pub fn parse(name: &str, kind: &str) -> Result<Self, TableError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "static" | "text" => Ok(ContentKind::Static),
            "attachtab" => Ok(ContentKind::AttachTab),
            "legacy-attachtab" | "legacy_attachtab" => Ok(ContentKind::LegacyAttachTab),
            _ => Err(TableError::InvalidContentType {
                name: name.to_string(),
                kind: kind.to_string(),
            }),
        }
    }
}

/// Registered synthetic files, keyed by bare name (no leading slash)
#[derive(Clone, Debug, Default)]
pub struct SyntheticFileTable {
    files: FxHashMap<String, SyntheticContent>,
    order: Vec<String>,
}

impl SyntheticFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`; fails if the name is not a single valid segment
    /// or is already taken
    pub fn register(&mut self, name: &str, content: SyntheticContent) -> Result<(), TableError> {
        if !is_valid_segment(name) {
            return Err(TableError::InvalidName(name.to_string()));
        }
        if self.files.contains_key(name) {
            return Err(TableError::DuplicateName(name.to_string()));
        }
        self.files.insert(name.to_string(), content);
        self.order.push(name.to_string());
        Ok(())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Current bytes of `name`, invoking its generator if it has one
    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).map(SyntheticContent::render)
    }

    /// Registered names in registration order
    pub fn list(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Copy `[offset, offset + size)` out of `data`, clipped to its length
pub fn slice_range(data: &[u8], offset: u64, size: u32) -> Vec<u8> {
    let Ok(start) = usize::try_from(offset) else {
        return Vec::new();
    };
    if start >= data.len() {
        return Vec::new();
    }
    let end = std::cmp::min(start.saturating_add(size as usize), data.len());
    data[start..end].to_vec()
}
