//! Per-platform extension allow-list
//!
//! The frontend ships a JSON file listing which file extensions each platform folder
//! accepts:
//!
//! ```json
//! [
//!   { "folder": "snes", "extensions": [".sfc", ".smc", ".zip"] },
//!   { "folder": "psx",  "extensions": [".chd", ".cue", ".bin"] }
//! ]
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FolderExtensions {
    folder: String,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Case-insensitive lookup of accepted extensions per platform folder
#[derive(Debug, Default, Clone)]
pub struct ExtensionAllowList {
    folders: HashMap<String, HashSet<String>>,
}

impl ExtensionAllowList {
    /// Parse the JSON allow-list
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<FolderExtensions> = serde_json::from_str(json)?;
        let mut folders: HashMap<String, HashSet<String>> = HashMap::new();
        for entry in raw {
            let set = folders.entry(entry.folder.to_lowercase()).or_default();
            set.extend(entry.extensions.iter().map(|e| normalize(e)));
        }
        Ok(Self { folders })
    }

    /// Load the allow-list from `path`
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| Error::Config {
            message: format!("cannot read extensions file {}: {}", path.display(), e),
            key: Some("extraction.extensions_file".to_string()),
        })?;
        let list = Self::from_json(&json)?;
        tracing::debug!(?path, folders = list.folders.len(), "extension allow-list loaded");
        Ok(list)
    }

    /// Whether `file`'s extension is accepted in `folder`
    ///
    /// Unknown folders and files without an extension are not supported.
    pub fn is_supported(&self, file: &str, folder: &str) -> bool {
        let Some(allowed) = self.folders.get(&folder.to_lowercase()) else {
            return false;
        };
        Path::new(file)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| allowed.contains(&normalize(ext)))
    }

    /// Number of folders with an entry
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    /// Whether the list has no folders
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// Lowercase, without a leading dot
fn normalize(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}
