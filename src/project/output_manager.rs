use crate::error::{CodeFenceError, Result};
use crate::project::reconstructor::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationState {
    Missing,
    Empty,
    NotEmpty { entries: usize },
}

/// Guards the reconstruction destination and writes combined documents.
pub struct OutputManager {
    output_directory: PathBuf,
    force_overwrite: bool,
}

impl OutputManager {
    pub fn new<P: Into<PathBuf>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.into(),
            force_overwrite: false,
        }
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn inspect(&self) -> Result<DestinationState> {
        let path = &self.output_directory;

        if !path.exists() {
            return Ok(DestinationState::Missing);
        }

        if !path.is_dir() {
            return Err(CodeFenceError::InvalidPath {
                path: format!("{} is not a directory", path.display()),
            });
        }

        let entries = fs::read_dir(path)
            .map_err(|e| permission_or_io(e, path))?
            .count();

        Ok(if entries == 0 {
            DestinationState::Empty
        } else {
            DestinationState::NotEmpty { entries }
        })
    }

    /// Creates the destination, refusing a non-empty one unless forced.
    ///
    /// Existing files are left in place; blocks overwrite them one by one.
    pub fn initialize(&self) -> Result<DestinationState> {
        let state = self.inspect()?;

        if let DestinationState::NotEmpty { entries } = state {
            if !self.force_overwrite {
                return Err(CodeFenceError::OutputDirectoryExists {
                    path: self.output_directory.display().to_string(),
                });
            }
            log::info!(
                "Writing into non-empty {} ({} existing entries)",
                self.output_directory.display(),
                entries
            );
        }

        if state == DestinationState::Missing {
            fs::create_dir_all(&self.output_directory)
                .map_err(|e| permission_or_io(e, &self.output_directory))?;
        }

        self.validate_writable()?;
        Ok(state)
    }

    fn validate_writable(&self) -> Result<()> {
        tempfile::NamedTempFile::new_in(&self.output_directory)
            .map(drop)
            .map_err(|e| CodeFenceError::Permission {
                path: format!(
                    "No write permission for directory {}: {}",
                    self.output_directory.display(),
                    e
                ),
            })
    }
}

/// Saves a combined document, replacing any previous file atomically.
pub fn write_document(path: &Path, document: &str) -> Result<()> {
    let path = if path.parent().is_some_and(|p| p.as_os_str().is_empty()) {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    };

    write_atomic(&path, document.as_bytes()).map_err(|e| permission_or_io(e, &path))?;
    log::debug!("Saved document to {}", path.display());
    Ok(())
}

fn permission_or_io(error: std::io::Error, path: &Path) -> CodeFenceError {
    if error.kind() == std::io::ErrorKind::PermissionDenied {
        CodeFenceError::Permission {
            path: path.display().to_string(),
        }
    } else {
        CodeFenceError::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_destination_is_created() {
        let temp = TempDir::new().unwrap();
        let manager = OutputManager::new(temp.path().join("out"));

        assert_eq!(manager.inspect().unwrap(), DestinationState::Missing);
        assert_eq!(manager.initialize().unwrap(), DestinationState::Missing);
        assert!(temp.path().join("out").is_dir());
        assert_eq!(manager.inspect().unwrap(), DestinationState::Empty);
    }

    #[test]
    fn test_non_empty_destination_requires_force() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("existing.txt"), "keep").unwrap();

        let manager = OutputManager::new(temp.path());
        assert_eq!(
            manager.inspect().unwrap(),
            DestinationState::NotEmpty { entries: 1 }
        );
        assert!(matches!(
            manager.initialize(),
            Err(CodeFenceError::OutputDirectoryExists { .. })
        ));

        let forced = OutputManager::new(temp.path()).with_force_overwrite(true);
        assert!(forced.initialize().is_ok());
        assert!(temp.path().join("existing.txt").exists());
    }

    #[test]
    fn test_destination_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let manager = OutputManager::new(&file);
        assert!(matches!(
            manager.inspect(),
            Err(CodeFenceError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_write_document_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("combined.md");
        fs::write(&path, "old").unwrap();

        write_document(&path, "```\n# a.txt\nA\n```\n\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "```\n# a.txt\nA\n```\n\n");
    }
}
