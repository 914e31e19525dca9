//! Source content library.
//!
//! Each `.toml` or `.json` file in the content directory holds one
//! [`SourceContent`] definition. Content is read once and never modified.

use crate::error::{Error, Result};
use crate::model::{LearningMode, SourceContent};
use std::collections::BTreeMap;
use std::path::Path;

/// Loaded source content, indexed by id.
#[derive(Debug, Default)]
pub struct ContentLibrary {
    sources: BTreeMap<String, SourceContent>,
}

impl ContentLibrary {
    /// Create an empty library.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every `.toml` and `.json` file in `dir`. Duplicate ids are an
    /// error.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut library = Self::empty();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read content dir {}: {e}", dir.display()))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        paths.sort();

        for path in paths {
            let source: SourceContent = match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => {
                    let content = std::fs::read_to_string(&path)?;
                    toml::from_str(&content).map_err(|e| {
                        Error::Config(format!("bad content file {}: {e}", path.display()))
                    })?
                }
                Some("json") => {
                    let content = std::fs::read_to_string(&path)?;
                    serde_json::from_str(&content).map_err(|e| {
                        Error::Config(format!("bad content file {}: {e}", path.display()))
                    })?
                }
                _ => continue,
            };
            if library.sources.contains_key(&source.id) {
                return Err(Error::Config(format!(
                    "duplicate content id {} in {}",
                    source.id,
                    path.display()
                )));
            }
            library.insert(source);
        }

        tracing::debug!(dir = %dir.display(), sources = library.len(), "content loaded");
        Ok(library)
    }

    /// Add or replace a source.
    pub fn insert(&mut self, source: SourceContent) {
        self.sources.insert(source.id.clone(), source);
    }

    /// Look up a source by id.
    pub fn get(&self, id: &str) -> Option<&SourceContent> {
        self.sources.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&SourceContent> {
        self.get(id).ok_or_else(|| Error::not_found("source content", id))
    }

    /// Sources ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &SourceContent> {
        self.sources.values()
    }

    pub fn by_mode(&self, mode: LearningMode) -> impl Iterator<Item = &SourceContent> {
        self.iter().filter(move |s| s.mode == mode)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
