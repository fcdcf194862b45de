use crate::error::{CodeFenceError, Failure, FailureKind, Result};
use crate::languages::extension_of;
use crate::scanner::exclusion::{ExclusionRule, ExclusionRules};
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub source_path: PathBuf,
    /// Path relative to the scan root with `/` separators.
    pub relative_path: String,
    pub extension: Option<String>,
    pub size: u64,
}

impl SourceFile {
    pub fn filename(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "rule", rename_all = "snake_case")]
pub enum SkipReason {
    DirectoryExcluded(String),
    FilenameExcluded(String),
    ExtensionExcluded(String),
    NotSelected,
    Symlink,
    OutputDocument,
}

impl SkipReason {
    fn from_file_rule(rule: &ExclusionRule) -> Self {
        match rule {
            ExclusionRule::Extension(_) => SkipReason::ExtensionExcluded(rule.to_string()),
            _ => SkipReason::FilenameExcluded(rule.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DirectoryExcluded(rule) => write!(f, "directory excluded by '{}'", rule),
            SkipReason::FilenameExcluded(rule) => write!(f, "filename excluded by '{}'", rule),
            SkipReason::ExtensionExcluded(rule) => write!(f, "extension excluded by '{}'", rule),
            SkipReason::NotSelected => f.write_str("extension not selected"),
            SkipReason::Symlink => f.write_str("symbolic link"),
            SkipReason::OutputDocument => f.write_str("combined document output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub relative_path: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedEntry>,
    pub failures: Vec<Failure>,
}

/// Walks a source tree in a stable order and applies selection and exclusion.
///
/// Within each directory files come before subdirectories, each sorted by
/// name. Excluded directories are pruned without being read. Symbolic links
/// are never followed.
pub struct SourceScanner {
    rules: ExclusionRules,
    selected_extensions: Vec<String>,
    ignored_paths: Vec<PathBuf>,
}

impl SourceScanner {
    pub fn new(rules: ExclusionRules, selected_extensions: Vec<String>) -> Self {
        let selected_extensions = selected_extensions
            .into_iter()
            .map(|ext| ext.to_lowercase())
            .collect();

        Self {
            rules,
            selected_extensions,
            ignored_paths: Vec::new(),
        }
    }

    /// Never report `path` as a source file, e.g. the document being written.
    ///
    /// The path does not have to exist yet.
    pub fn with_ignored_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        if let Some(canonical) = canonical_target(path.as_ref()) {
            self.ignored_paths.push(canonical);
        }
        self
    }

    pub fn rules(&self) -> &ExclusionRules {
        &self.rules
    }

    pub fn selected_extensions(&self) -> &[String] {
        &self.selected_extensions
    }

    pub fn scan_directory<P: AsRef<Path>>(&self, root: P) -> Result<ScanOutcome> {
        let root_path = root.as_ref();

        if !root_path.exists() {
            return Err(CodeFenceError::SourceNotFound {
                path: root_path.display().to_string(),
            });
        }

        if !root_path.is_dir() {
            return Err(CodeFenceError::SourceNotFound {
                path: format!("{} is not a directory", root_path.display()),
            });
        }

        let mut outcome = ScanOutcome::default();
        let mut pruned = Vec::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            .filter_entry(|entry| match self.pruning_rule(entry, root_path) {
                Some(skipped) => {
                    pruned.push(skipped);
                    false
                }
                None => true,
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Scan error: {}", err);
                    let error = CodeFenceError::from(err);
                    outcome
                        .failures
                        .push(Failure::from_error(&error, FailureKind::Read, None));
                    continue;
                }
            };

            if entry.depth() == 0 || entry.file_type().is_dir() {
                continue;
            }

            let relative_path = match relative_path_string(entry.path(), root_path) {
                Ok(relative_path) => relative_path,
                Err(err) => {
                    outcome
                        .failures
                        .push(Failure::from_error(&err, FailureKind::Read, None));
                    continue;
                }
            };

            if entry.path_is_symlink() {
                log::debug!("Skipping symbolic link {}", relative_path);
                outcome.skipped.push(SkippedEntry {
                    relative_path,
                    reason: SkipReason::Symlink,
                });
                continue;
            }

            if self.is_ignored(entry.path()) {
                log::debug!("Skipping {}: combined document output", relative_path);
                outcome.skipped.push(SkippedEntry {
                    relative_path,
                    reason: SkipReason::OutputDocument,
                });
                continue;
            }

            match self.process_file(&entry, relative_path) {
                Ok(file) => outcome.files.push(file),
                Err(skipped) => {
                    log::debug!("Skipping {}: {}", skipped.relative_path, skipped.reason);
                    outcome.skipped.push(skipped);
                }
            }
        }

        for skipped in &pruned {
            log::debug!("Pruned {}: {}", skipped.relative_path, skipped.reason);
        }
        outcome.skipped.extend(pruned);

        log::info!(
            "Scanned {}: {} selected, {} skipped, {} failed",
            root_path.display(),
            outcome.files.len(),
            outcome.skipped.len(),
            outcome.failures.len()
        );

        Ok(outcome)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignored_paths.is_empty() {
            return false;
        }

        let name = path.file_name();
        self.ignored_paths
            .iter()
            .any(|ignored| ignored.file_name() == name)
            && path
                .canonicalize()
                .map(|canonical| self.ignored_paths.contains(&canonical))
                .unwrap_or(false)
    }

    fn pruning_rule(&self, entry: &DirEntry, root_path: &Path) -> Option<SkippedEntry> {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return None;
        }

        let name = entry.file_name().to_str()?;
        let relative_path = relative_path_string(entry.path(), root_path).ok()?;

        self.rules
            .excluded_directory(name, &relative_path)
            .map(|rule| SkippedEntry {
                relative_path,
                reason: SkipReason::DirectoryExcluded(rule.to_string()),
            })
    }

    fn process_file(
        &self,
        entry: &DirEntry,
        relative_path: String,
    ) -> std::result::Result<SourceFile, SkippedEntry> {
        let name = entry.file_name().to_string_lossy().to_string();

        if let Some(rule) = self.rules.excluded_file(&name, &relative_path) {
            return Err(SkippedEntry {
                relative_path,
                reason: SkipReason::from_file_rule(rule),
            });
        }

        if !self.is_selected(&name) {
            return Err(SkippedEntry {
                relative_path,
                reason: SkipReason::NotSelected,
            });
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(SourceFile {
            source_path: entry.path().to_path_buf(),
            extension: extension_of(entry.path()),
            relative_path,
            size,
        })
    }

    fn is_selected(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.selected_extensions
            .iter()
            .any(|ext| lowered.len() > ext.len() && lowered.ends_with(ext.as_str()))
    }
}

/// Canonical form of `path`, resolving through its parent when the file
/// itself does not exist yet.
fn canonical_target(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }

    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    parent.canonicalize().ok().map(|dir| dir.join(name))
}

/// Relative path of `path` under `root`, joined with `/`.
pub fn relative_path_string(path: &Path, root: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| CodeFenceError::InvalidPath {
            path: format!(
                "Cannot calculate relative path for {} from root {}",
                path.display(),
                root.display()
            ),
        })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => match segment.to_str() {
                Some(segment) => segments.push(segment),
                None => {
                    return Err(CodeFenceError::Read {
                        path: relative.display().to_string(),
                        reason: "path is not valid UTF-8".to_string(),
                    })
                }
            },
            Component::CurDir => {}
            _ => {
                return Err(CodeFenceError::InvalidPath {
                    path: format!(
                        "Path contains parent or root references: {}",
                        relative.display()
                    ),
                })
            }
        }
    }

    Ok(segments.join("/"))
}
