//! Intermediate files that must not outlive an export.

use std::path::{Path, PathBuf};

/// Tracks intermediate files and removes them on drop.
///
/// Files handed back with [`ScratchFiles::keep`] survive; everything else is
/// deleted on every exit path, including early returns and panics.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for removal and return it.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    /// Stop tracking `path` so it is kept.
    pub fn keep(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every tracked file now.
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed scratch file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "Failed to remove scratch file"
                    )
                }
            }
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// `<stem>.partial.<ext>` next to `output`.
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "zoomreel-scratch-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_drop_removes_tracked_files() {
        let path = temp_file("drop");
        {
            let mut scratch = ScratchFiles::new();
            scratch.track(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_files_survive() {
        let path = temp_file("keep");
        {
            let mut scratch = ScratchFiles::new();
            scratch.track(&path);
            scratch.keep(&path);
            assert!(scratch.is_empty());
        }
        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_files_are_ignored() {
        let mut scratch = ScratchFiles::new();
        scratch.track(std::env::temp_dir().join("zoomreel-scratch-never-created"));
        scratch.cleanup();
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/out/demo.mp4")),
            PathBuf::from("/out/demo.partial.mp4")
        );
        assert_eq!(
            partial_path(Path::new("/out/demo")),
            PathBuf::from("/out/demo.partial")
        );
    }
}
