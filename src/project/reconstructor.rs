use crate::document::{BlockParser, LocatedBlock};
use crate::error::{CodeFenceError, Failure, FailureKind, Result};
use crate::project::WorkProgress;
use crate::ui::output::format_bytes;
use crate::ui::GracefulShutdown;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

#[cfg(windows)]
const MAX_PATH: usize = 260;

#[cfg(not(windows))]
const MAX_PATH: usize = 4096;

const INVALID_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

#[derive(Debug, Clone, Serialize)]
pub struct WrittenFile {
    pub relative_path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionReport {
    pub output_dir: PathBuf,
    pub blocks_found: usize,
    pub duplicate_blocks: usize,
    pub files: Vec<WrittenFile>,
    pub failures: Vec<Failure>,
    pub total_bytes: u64,
    pub duration: Duration,
    pub dry_run: bool,
    pub cancelled: bool,
    pub generated_at: DateTime<Utc>,
}

impl ReconstructionReport {
    fn new(output_dir: &Path, dry_run: bool) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            blocks_found: 0,
            duplicate_blocks: 0,
            files: Vec::new(),
            failures: Vec::new(),
            total_bytes: 0,
            duration: Duration::default(),
            dry_run,
            cancelled: false,
            generated_at: Utc::now(),
        }
    }

    pub fn created_count(&self) -> usize {
        self.files.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn display_summary(&self) -> String {
        let verb = if self.dry_run { "Would write" } else { "Written" };
        let mut summary = format!(
            "Reconstruction Results:\n  Blocks found: {}\n  {}: {} files ({})\n  Failures: {}\n",
            self.blocks_found,
            verb,
            self.files.len(),
            format_bytes(self.total_bytes),
            self.failures.len()
        );

        if self.duplicate_blocks > 0 {
            summary.push_str(&format!(
                "  Duplicate blocks replaced: {}\n",
                self.duplicate_blocks
            ));
        }

        summary
    }
}

/// Unfolds a combined document into a directory tree.
///
/// Every block path is validated before anything is written. Each file is
/// written through a temporary sibling and renamed into place.
pub struct Reconstructor {
    dry_run: bool,
    shutdown: Option<GracefulShutdown>,
}

impl Reconstructor {
    pub fn new() -> Self {
        Self {
            dry_run: false,
            shutdown: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_shutdown(mut self, shutdown: GracefulShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn reconstruct<P: AsRef<Path>>(
        &self,
        document: &str,
        output_dir: P,
        progress_callback: Option<&dyn Fn(&WorkProgress)>,
    ) -> Result<ReconstructionReport> {
        let output_dir = output_dir.as_ref();
        let started = Instant::now();
        let mut report = ReconstructionReport::new(output_dir, self.dry_run);

        let blocks = collect_blocks(document, &mut report);

        let root = self.prepare_root(output_dir)?;
        let mut progress = WorkProgress::new(blocks.len());

        for located in &blocks {
            if self.is_cancelled() {
                log::warn!(
                    "Reconstruction cancelled after {} of {} files",
                    progress.items_processed,
                    progress.total_items
                );
                report.cancelled = true;
                break;
            }

            let relative_path = &located.block.relative_path;
            progress.begin_item(relative_path.clone());
            if let Some(callback) = progress_callback {
                callback(&progress);
            }

            match self.materialize(located, &root) {
                Ok(bytes) => {
                    report.files.push(WrittenFile {
                        relative_path: relative_path.clone(),
                        bytes,
                    });
                    report.total_bytes += bytes;
                    progress.complete_item(bytes);
                }
                Err(err) => {
                    log::warn!("Skipping block at line {}: {}", located.line, err);
                    let failure = Failure::from_error(&err, FailureKind::Write, Some(located.line));
                    report.failures.push(failure.clone());
                    progress.fail_item(failure);
                }
            }
        }

        if let Some(callback) = progress_callback {
            callback(&progress);
        }

        report.duration = started.elapsed();
        log::info!(
            "{} {} of {} blocks into {}",
            if self.dry_run { "Validated" } else { "Reconstructed" },
            report.files.len(),
            report.blocks_found,
            output_dir.display()
        );

        Ok(report)
    }

    /// Creates the output directory if needed and resolves it physically.
    fn prepare_root(&self, output_dir: &Path) -> Result<PathBuf> {
        if !output_dir.exists() {
            if self.dry_run {
                return Ok(output_dir.to_path_buf());
            }
            fs::create_dir_all(output_dir).map_err(|e| map_dir_error(e, output_dir))?;
        }

        if !output_dir.is_dir() {
            return Err(CodeFenceError::InvalidPath {
                path: format!("{} is not a directory", output_dir.display()),
            });
        }

        output_dir
            .canonicalize()
            .map_err(|e| map_dir_error(e, output_dir))
    }

    fn materialize(&self, located: &LocatedBlock, root: &Path) -> Result<u64> {
        let block = &located.block;
        let relative = validate_relative_path(&block.relative_path)?;
        let destination = root.join(&relative);

        // A dry run into a missing directory has nothing on disk to resolve.
        if root.exists() {
            ensure_within_root(root, &destination, &block.relative_path)?;
        }

        if destination.is_dir() {
            return Err(CodeFenceError::Write {
                path: block.relative_path.clone(),
                reason: "a directory already exists at this path".to_string(),
            });
        }

        let bytes = block.content.len() as u64;
        if self.dry_run {
            return Ok(bytes);
        }

        write_atomic(&destination, block.content.as_bytes()).map_err(|e| {
            CodeFenceError::Write {
                path: block.relative_path.clone(),
                reason: e.to_string(),
            }
        })?;

        log::debug!("Wrote {} ({} bytes)", block.relative_path, bytes);
        Ok(bytes)
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| !shutdown.is_running())
    }
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses all blocks, recording malformed ones and folding duplicate paths.
///
/// A repeated path keeps the position of its first block and the content of
/// its last.
fn collect_blocks(document: &str, report: &mut ReconstructionReport) -> Vec<LocatedBlock> {
    let mut blocks: Vec<LocatedBlock> = Vec::new();
    let mut positions: HashMap<PathBuf, usize> = HashMap::new();

    for item in BlockParser::new(document) {
        match item {
            Ok(located) => {
                report.blocks_found += 1;
                // `a.txt` and `./a.txt` name the same destination.
                let key = validate_relative_path(&located.block.relative_path)
                    .unwrap_or_else(|_| PathBuf::from(&located.block.relative_path));
                match positions.get(&key) {
                    Some(&index) => {
                        log::info!(
                            "{} appears again at line {}; the later block replaces the one at line {}",
                            located.block.relative_path,
                            located.line,
                            blocks[index].line
                        );
                        report.duplicate_blocks += 1;
                        blocks[index] = located;
                    }
                    None => {
                        positions.insert(key, blocks.len());
                        blocks.push(located);
                    }
                }
            }
            Err(err) => {
                log::warn!("{}", err);
                report
                    .failures
                    .push(Failure::from_error(&err, FailureKind::MalformedBlock, None));
            }
        }
    }

    blocks
}

/// Lexically validates a block path and converts it to a relative `PathBuf`.
///
/// Both `/` and `\` separate segments.
pub fn validate_relative_path(raw: &str) -> Result<PathBuf> {
    let unsafe_path = |reason: &str| CodeFenceError::unsafe_path(raw, reason);

    if raw.is_empty() {
        return Err(unsafe_path("empty path"));
    }

    if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
        return Err(unsafe_path("absolute path"));
    }

    let mut chars = raw.chars();
    if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
        if drive.is_ascii_alphabetic() {
            return Err(unsafe_path("drive prefix"));
        }
    }

    if raw.len() > MAX_PATH {
        return Err(unsafe_path("path too long"));
    }

    let mut relative = PathBuf::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(unsafe_path("parent directory segment")),
            _ => {
                if segment
                    .chars()
                    .any(|c| INVALID_CHARS.contains(&c) || c.is_control())
                {
                    return Err(unsafe_path("invalid characters in path"));
                }
                relative.push(segment);
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(unsafe_path("path has no file name"));
    }

    Ok(relative)
}

/// Rejects destinations whose existing ancestors resolve outside `root`,
/// which happens when a directory inside the output tree is a symlink.
fn ensure_within_root(root: &Path, destination: &Path, raw: &str) -> Result<()> {
    let mut existing = destination;
    while !existing.exists() {
        existing = match existing.parent() {
            Some(parent) => parent,
            None => return Ok(()),
        };
    }

    let resolved = existing
        .canonicalize()
        .map_err(|e| CodeFenceError::unsafe_path(raw, format!("cannot resolve path: {}", e)))?;

    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(CodeFenceError::unsafe_path(
            raw,
            "resolves outside the output directory",
        ))
    }
}

/// Writes through a temporary file in the destination directory, then renames.
///
/// An existing file keeps its permissions. A new file gets the mode a plain
/// create would give it under the current umask.
pub fn write_atomic(destination: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = destination.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    fs::create_dir_all(parent)?;

    let existing_permissions = fs::metadata(destination)
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.permissions());

    let mut temp = temp_file_in(parent)?;
    temp.write_all(content)?;
    if let Some(permissions) = existing_permissions {
        temp.as_file().set_permissions(permissions)?;
    }
    temp.as_file().sync_all()?;
    temp.persist(destination).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(unix)]
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    // The requested mode is masked by the umask, like `File::create`.
    tempfile::Builder::new()
        .prefix(".codefence")
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

fn map_dir_error(error: std::io::Error, path: &Path) -> CodeFenceError {
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

    fn reconstruct(document: &str, output: &Path) -> ReconstructionReport {
        Reconstructor::new().reconstruct(document, output, None).unwrap()
    }

    #[test]
    fn test_writes_files_and_parent_directories() {
        let output = TempDir::new().unwrap();
        let document = "```python\n# src/pkg/a.py\nprint(1)\n```\n\n```markdown\n# README.md\nhi\n```\n\n";

        let report = reconstruct(document, output.path());

        assert_eq!(report.created_count(), 2);
        assert!(!report.has_failures());
        assert_eq!(
            fs::read_to_string(output.path().join("src/pkg/a.py")).unwrap(),
            "print(1)"
        );
        assert_eq!(fs::read_to_string(output.path().join("README.md")).unwrap(), "hi");
    }

    #[test]
    fn test_creates_missing_output_directory() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("fresh/out");

        let report = reconstruct("```\n# a.txt\nA\n```\n", &output);

        assert_eq!(report.created_count(), 1);
        assert!(output.join("a.txt").exists());
    }

    #[test]
    fn test_overwrites_existing_file() {
        let output = TempDir::new().unwrap();
        fs::write(output.path().join("a.txt"), "old").unwrap();

        reconstruct("```\n# a.txt\nnew\n```\n", output.path());

        assert_eq!(fs::read_to_string(output.path().join("a.txt")).unwrap(), "new");
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out");
        let document = "```\n# ../../etc/evil.txt\npwned\n```\n```\n# safe.txt\nok\n```\n";

        let report = reconstruct(document, &output);

        assert_eq!(report.created_count(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::UnsafePath);
        assert_eq!(report.failures[0].line, Some(1));
        assert!(!temp.path().join("etc").exists());
        assert!(output.join("safe.txt").exists());
    }

    #[test]
    fn test_path_validation() {
        assert!(validate_relative_path("src/a.py").is_ok());
        assert_eq!(
            validate_relative_path("./src//a.py").unwrap(),
            PathBuf::from("src").join("a.py")
        );
        assert_eq!(
            validate_relative_path("src\\win\\a.py").unwrap(),
            PathBuf::from("src").join("win").join("a.py")
        );

        for bad in [
            "",
            "/etc/passwd",
            "\\server\\share",
            "C:/Windows/system.ini",
            "c:relative.txt",
            "a/../../b",
            "..",
            "bad|name.txt",
            "what?.txt",
            "tab\there",
            "./.",
        ] {
            assert!(
                matches!(
                    validate_relative_path(bad),
                    Err(CodeFenceError::UnsafePath { .. })
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_malformed_block_reported_and_others_written() {
        let output = TempDir::new().unwrap();
        let document = "```python\nno comment here\n```\n\n```python\n# ok.py\npass\n```\n";

        let report = reconstruct(document, output.path());

        assert_eq!(report.blocks_found, 1);
        assert_eq!(report.created_count(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::MalformedBlock);
        assert_eq!(report.failures[0].line, Some(1));
    }

    #[test]
    fn test_duplicate_paths_last_wins() {
        let output = TempDir::new().unwrap();
        let document = "```\n# a.txt\nfirst\n```\n```\n# b.txt\nB\n```\n```\n# a.txt\nsecond\n```\n";

        let report = reconstruct(document, output.path());

        assert_eq!(report.blocks_found, 3);
        assert_eq!(report.duplicate_blocks, 1);
        let written: Vec<_> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(written, vec!["a.txt", "b.txt"]);
        assert_eq!(fs::read_to_string(output.path().join("a.txt")).unwrap(), "second");
    }

    #[test]
    fn test_equivalent_paths_fold_into_one_file() {
        let output = TempDir::new().unwrap();
        let document = "```\n# a.txt\nfirst\n```\n```\n# ./a.txt\nsecond\n```\n";

        let report = reconstruct(document, output.path());

        assert_eq!(report.blocks_found, 2);
        assert_eq!(report.duplicate_blocks, 1);
        assert_eq!(report.created_count(), 1);
        assert_eq!(fs::read_to_string(output.path().join("a.txt")).unwrap(), "second");
    }

    #[test]
    fn test_directory_in_the_way_is_write_error() {
        let output = TempDir::new().unwrap();
        fs::create_dir(output.path().join("taken")).unwrap();

        let report = reconstruct("```\n# taken\nx\n```\n", output.path());

        assert_eq!(report.created_count(), 0);
        assert_eq!(report.failures[0].kind, FailureKind::Write);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("never");

        let report = Reconstructor::new()
            .with_dry_run(true)
            .reconstruct("```\n# a.txt\nA\n```\n```\n# /abs.txt\nB\n```\n", &output, None)
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.created_count(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(!output.exists());
    }

    #[test]
    fn test_cancelled_before_writing() {
        let output = TempDir::new().unwrap();
        let shutdown = GracefulShutdown::new_for_test();
        shutdown.request_shutdown();

        let report = Reconstructor::new()
            .with_shutdown(shutdown)
            .reconstruct("```\n# a.txt\nA\n```\n", output.path(), None)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.created_count(), 0);
        assert!(!output.path().join("a.txt").exists());
    }

    #[test]
    fn test_output_path_that_is_a_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let result = Reconstructor::new().reconstruct("```\n# a.txt\nA\n```\n", &file, None);
        assert!(matches!(result, Err(CodeFenceError::InvalidPath { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_escape_is_rejected() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        let output = temp.path().join("out");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&output).unwrap();
        std::os::unix::fs::symlink(&outside, output.join("link")).unwrap();

        let report = reconstruct("```\n# link/escaped.txt\nx\n```\n", &output);

        assert_eq!(report.created_count(), 0);
        assert_eq!(report.failures[0].kind, FailureKind::UnsafePath);
        assert!(!outside.join("escaped.txt").exists());
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let output = TempDir::new().unwrap();
        let destination = output.path().join("nested/file.txt");

        write_atomic(&destination, b"content").unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), "content");
        let entries = fs::read_dir(output.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_writes_keep_existing_mode_and_follow_umask() {
        use std::os::unix::fs::PermissionsExt;

        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

        let output = TempDir::new().unwrap();
        let script = output.path().join("run.sh");
        fs::write(&script, "old").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let reference = output.path().join("reference.txt");
        fs::write(&reference, "").unwrap();

        let document = "```bash\n# run.sh\necho hi\n```\n\n```text\n# new.txt\nnew\n```\n";
        let report = reconstruct(document, output.path());

        assert_eq!(report.created_count(), 2);
        assert_eq!(fs::read_to_string(&script).unwrap(), "echo hi");
        assert_eq!(mode(&script), 0o755);
        assert_eq!(mode(&output.path().join("new.txt")), mode(&reference));
    }
}
