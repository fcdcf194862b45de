use crate::document::{CombinedDocument, FileBlock};
use crate::error::{CodeFenceError, Failure, FailureKind, Result};
use crate::languages::SuffixLanguageMap;
use crate::project::{validate_relative_path, WorkProgress};
use crate::scanner::{ExclusionRules, SkippedEntry, SourceFile, SourceScanner};
use crate::ui::GracefulShutdown;
use crate::ui::output::format_bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCommentStatus {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncludedFile {
    pub relative_path: String,
    pub language_tag: String,
    pub size: u64,
    pub path_comment: PathCommentStatus,
    /// Content holds a bare fence line and will not read back intact.
    pub has_bare_fence: bool,
    /// Reconstruction accepts this path.
    pub portable_path: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombineReport {
    #[serde(skip)]
    pub document: String,
    pub source_dir: PathBuf,
    pub selected_extensions: Vec<String>,
    pub files: Vec<IncludedFile>,
    pub skipped: Vec<SkippedEntry>,
    pub failures: Vec<Failure>,
    pub files_by_language: BTreeMap<String, usize>,
    pub total_bytes: u64,
    pub duration: Duration,
    pub cancelled: bool,
    pub generated_at: DateTime<Utc>,
}

impl CombineReport {
    fn new(source_dir: &Path, selected_extensions: Vec<String>) -> Self {
        Self {
            document: String::new(),
            source_dir: source_dir.to_path_buf(),
            selected_extensions,
            files: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            files_by_language: BTreeMap::new(),
            total_bytes: 0,
            duration: Duration::default(),
            cancelled: false,
            generated_at: Utc::now(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "Combine Results:\n  Files included: {}\n  Total size: {}\n  Skipped entries: {}\n  Failures: {}\n",
            self.files.len(),
            format_bytes(self.total_bytes),
            self.skipped.len(),
            self.failures.len()
        );

        if !self.files_by_language.is_empty() {
            summary.push_str("  Files by language:\n");
            let mut languages: Vec<_> = self.files_by_language.iter().collect();
            languages.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (language, count) in languages {
                summary.push_str(&format!("    {}: {} files\n", language, count));
            }
        }

        summary
    }
}

/// Folds a source tree into one fenced document.
pub struct Combiner {
    languages: SuffixLanguageMap,
    selected_extensions: Vec<String>,
    rules: ExclusionRules,
    ignored_paths: Vec<PathBuf>,
    shutdown: Option<GracefulShutdown>,
}

impl Combiner {
    /// A combiner selecting every extension the language map knows.
    pub fn new(languages: SuffixLanguageMap) -> Self {
        let selected_extensions = languages.extensions();
        Self {
            languages,
            selected_extensions,
            rules: ExclusionRules::default(),
            ignored_paths: Vec::new(),
            shutdown: None,
        }
    }

    pub fn with_selected_extensions(mut self, selected_extensions: Vec<String>) -> Self {
        self.selected_extensions = selected_extensions;
        self
    }

    pub fn with_rules(mut self, rules: ExclusionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Leaves `path` out of the document even when it sits inside the source.
    pub fn with_ignored_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ignored_paths.push(path.into());
        self
    }

    pub fn with_shutdown(mut self, shutdown: GracefulShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn combine<P: AsRef<Path>>(
        &self,
        source_dir: P,
        progress_callback: Option<&dyn Fn(&WorkProgress)>,
    ) -> Result<CombineReport> {
        let source_dir = source_dir.as_ref();
        let started = Instant::now();

        let scanner = self.ignored_paths.iter().fold(
            SourceScanner::new(self.rules.clone(), self.selected_extensions.clone()),
            |scanner, path| scanner.with_ignored_path(path),
        );
        let outcome = scanner.scan_directory(source_dir)?;

        let mut report = CombineReport::new(source_dir, scanner.selected_extensions().to_vec());
        report.skipped = outcome.skipped;
        report.failures = outcome.failures;

        let mut document = CombinedDocument::new();
        let mut progress = WorkProgress::new(outcome.files.len());

        for file in &outcome.files {
            if self.is_cancelled() {
                log::warn!(
                    "Combine cancelled after {} of {} files",
                    progress.items_processed,
                    progress.total_items
                );
                report.cancelled = true;
                break;
            }

            progress.begin_item(file.relative_path.clone());
            if let Some(callback) = progress_callback {
                callback(&progress);
            }

            match self.append_file(file, &mut document, &mut report) {
                Ok(bytes) => progress.complete_item(bytes),
                Err(err) => {
                    log::warn!("Skipping {}: {}", file.relative_path, err);
                    let failure = Failure::from_error(&err, FailureKind::Read, None);
                    report.failures.push(failure.clone());
                    progress.fail_item(failure);
                }
            }
        }

        if let Some(callback) = progress_callback {
            callback(&progress);
        }

        report.document = document.render();
        report.duration = started.elapsed();
        log::info!(
            "Combined {} files ({}) from {}",
            report.files.len(),
            format_bytes(report.total_bytes),
            source_dir.display()
        );

        Ok(report)
    }

    fn append_file(
        &self,
        file: &SourceFile,
        document: &mut CombinedDocument,
        report: &mut CombineReport,
    ) -> Result<u64> {
        let content = read_text(&file.source_path, &file.relative_path)?;
        let language_tag = self.languages.language_for_path(&file.source_path).to_string();
        let size = content.len() as u64;

        let block = FileBlock::new(file.relative_path.clone(), language_tag.clone(), content);

        let has_bare_fence = block.has_bare_fence();
        if has_bare_fence {
            log::warn!(
                "{} contains a bare ``` line; it will end its block early when reconstructed",
                file.relative_path
            );
        }

        let portable_path = match validate_relative_path(&file.relative_path) {
            Ok(_) => true,
            Err(err) => {
                log::warn!(
                    "{} will be refused when reconstructed: {}",
                    file.relative_path,
                    err
                );
                false
            }
        };

        let path_comment = if block.has_path_comment() {
            PathCommentStatus::AlreadyPresent
        } else {
            PathCommentStatus::Added
        };

        document.push(block);
        log::debug!("Included {} as '{}'", file.relative_path, language_tag);

        let language_key = if language_tag.is_empty() {
            "(untagged)".to_string()
        } else {
            language_tag.clone()
        };
        *report.files_by_language.entry(language_key).or_insert(0) += 1;
        report.total_bytes += size;

        report.files.push(IncludedFile {
            relative_path: file.relative_path.clone(),
            language_tag,
            size,
            path_comment,
            has_bare_fence,
            portable_path,
        });

        Ok(size)
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| !shutdown.is_running())
    }
}

/// Reads a file as UTF-8 text. Any failure is a file-scoped read error.
pub fn read_text(path: &Path, relative_path: &str) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| CodeFenceError::Read {
        path: relative_path.to_string(),
        reason: e.to_string(),
    })?;

    String::from_utf8(bytes).map_err(|e| CodeFenceError::Read {
        path: relative_path.to_string(),
        reason: format!("not valid UTF-8 text ({})", e.utf8_error()),
    })
}
