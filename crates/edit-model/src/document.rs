//! On-disk edit documents.
//!
//! An edit document wraps an [`EditModel`] with identity and timestamps so
//! the editor and the CLI can exchange edits as a single JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{EditModel, EditModelError};

/// Current document schema version.
pub const DOCUMENT_VERSION: &str = "1.0";

/// Top-level edit file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDocument {
    /// Schema version.
    pub version: String,

    /// Unique document identifier.
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,

    /// Source video the edit applies to, relative to the document or absolute.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// The edit itself.
    pub model: EditModel,
}

impl EditDocument {
    /// Create a new document around `model`.
    pub fn new(model: EditModel, source: Option<PathBuf>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: DOCUMENT_VERSION.to_string(),
            id: document_id(),
            created_at: now.clone(),
            modified_at: now,
            source,
            model,
        }
    }

    /// Load a document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EditModelError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| EditModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| EditModelError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save the document as pretty JSON, refreshing `modified_at`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), EditModelError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EditModelError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.modified_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(self).map_err(|e| EditModelError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| EditModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolve the source path against the directory holding the document.
    pub fn resolved_source(&self, document_path: &Path) -> Option<PathBuf> {
        let source = self.source.as_ref()?;
        if source.is_absolute() {
            return Some(source.clone());
        }
        let base = document_path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(source))
    }
}

/// Time-derived identifier in UUID v4 layout.
fn document_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (seed & 0xFFFF_FFFF) as u32,
        ((seed >> 32) & 0xFFFF) as u16,
        ((seed >> 48) & 0x0FFF) as u16,
        (((seed >> 60) & 0x3F) | 0x80) as u16,
        (seed >> 66) & 0xFFFF_FFFF_FFFF,
    )
}
