//! Material pools - independent ordered lists of selectable items.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An ordered sequence of opaque items. Pools are independent and may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPool<T> {
    /// Display name (e.g. "intros", "backgrounds")
    #[serde(default)]
    pub name: String,
    /// Items in selection order
    pub items: Vec<T>,
}

impl<T> MaterialPool<T> {
    /// Create a named pool
    pub fn new(name: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }
}

impl<T> From<Vec<T>> for MaterialPool<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(String::new(), items)
    }
}

/// Where the files of a pool come from.
///
/// Entries containing glob metacharacters are expanded; everything else is
/// taken literally. Expanded matches are sorted so planning input is stable
/// across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSource {
    #[serde(default)]
    pub name: String,
    pub files: Vec<String>,
}

impl PoolSource {
    /// Resolve the source into a pool of paths.
    pub fn resolve(&self) -> Result<MaterialPool<PathBuf>> {
        let mut items = Vec::new();

        for entry in &self.files {
            if is_pattern(entry) {
                let mut matches: Vec<PathBuf> = glob::glob(entry)?.filter_map(|m| m.ok()).collect();
                matches.sort();
                if matches.is_empty() {
                    tracing::warn!(pool = %self.name, pattern = %entry, "Pattern matched no files");
                }
                items.extend(matches);
            } else {
                items.push(PathBuf::from(entry));
            }
        }

        Ok(MaterialPool::new(self.name.clone(), items))
    }
}

fn is_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}
