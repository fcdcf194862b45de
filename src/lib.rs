pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod languages;
pub mod project;
pub mod scanner;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, FilterConfig, OutputConfig};
pub use error::{CodeFenceError, Failure, FailureKind, Result, UserFriendlyError};
pub use languages::SuffixLanguageMap;

// Core functionality re-exports
pub use document::{parse_document, CombinedDocument, FileBlock, LocatedBlock};
pub use project::{
    write_document, CombineReport, Combiner, DestinationState, OutputManager,
    ReconstructionReport, Reconstructor, WorkProgress,
};
pub use scanner::{ExclusionRule, ExclusionRules, SourceScanner};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::Path;

/// Main library interface tying configuration, output and cancellation together
pub struct CodeFence {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl CodeFence {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Instance without a Ctrl+C handler, so several can coexist in one process.
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        Self::new(config, cli_args.output_mode(), cli_args.verbose, cli_args.quiet)
    }

    /// Combines `source_dir` using the configured extensions, exclusions and
    /// language map.
    pub fn combine_project<P: AsRef<Path>>(&self, source_dir: P) -> Result<CombineReport> {
        let source_dir = source_dir.as_ref();
        self.shutdown.check_shutdown()?;

        self.output_formatter
            .start_operation(&format!("Combining {}", source_dir.display()));

        let rules = self.config.exclusion_rules();
        log::debug!("Exclusion rules: {}", describe_rules(&rules));

        let mut combiner = Combiner::new(self.config.languages.clone())
            .with_selected_extensions(self.config.selected_extensions()?)
            .with_rules(rules)
            .with_shutdown(self.shutdown.clone());
        if let Some(document_file) = &self.config.output.document_file {
            combiner = combiner.with_ignored_path(document_file);
        }

        let spinner = self.progress_manager.create_spinner("Reading files");
        let progress_callback = {
            let pb = spinner.clone();
            move |progress: &WorkProgress| {
                ui::progress::update_work_progress(&pb, "Reading", progress);
            }
        };

        let report = combiner.combine(source_dir, Some(&progress_callback))?;

        ui::progress::finish_progress_with_summary(
            &spinner,
            &format!("Combined {} files", report.files.len()),
            report.duration,
        );

        Ok(report)
    }

    /// Writes every block of `document` under `output_dir`.
    pub fn reconstruct_document<P: AsRef<Path>>(
        &self,
        document: &str,
        output_dir: P,
        dry_run: bool,
    ) -> Result<ReconstructionReport> {
        let output_dir = output_dir.as_ref();
        self.shutdown.check_shutdown()?;

        let verb = if dry_run { "Checking" } else { "Writing" };
        self.output_formatter
            .start_operation(&format!("Reconstructing into {}", output_dir.display()));

        let bar = self.progress_manager.create_file_progress(0, verb);
        let progress_callback = {
            let pb = bar.clone();
            move |progress: &WorkProgress| {
                ui::progress::update_work_progress(&pb, verb, progress);
            }
        };

        let report = Reconstructor::new()
            .with_dry_run(dry_run)
            .with_shutdown(self.shutdown.clone())
            .reconstruct(document, output_dir, Some(&progress_callback))?;

        ui::progress::finish_progress_with_summary(
            &bar,
            &format!("{} {} files", verb, report.created_count()),
            report.duration,
        );

        Ok(report)
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn progress_manager(&self) -> &ProgressManager {
        &self.progress_manager
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &CodeFenceError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Combines `source_dir` into a document string with explicit settings.
///
/// Per-file problems are logged and leave the file out; use [`Combiner`]
/// directly to inspect them.
pub fn combine<P: AsRef<Path>>(
    source_dir: P,
    selected_extensions: &[&str],
    exclusion_rules: &ExclusionRules,
    languages: &SuffixLanguageMap,
) -> Result<String> {
    let selected = selected_extensions
        .iter()
        .map(|ext| languages::normalize_extension(ext))
        .collect::<Result<Vec<_>>>()?;

    let report = Combiner::new(languages.clone())
        .with_selected_extensions(selected)
        .with_rules(exclusion_rules.clone())
        .combine(source_dir, None)?;

    Ok(report.document)
}

/// Rebuilds the files described by `document` under `output_dir`.
pub fn reconstruct<P: AsRef<Path>>(document: &str, output_dir: P) -> Result<ReconstructionReport> {
    Reconstructor::new().reconstruct(document, output_dir, None)
}

fn describe_rules(rules: &ExclusionRules) -> String {
    if rules.is_empty() {
        return "(none)".to_string();
    }

    rules
        .iter()
        .map(|rule| rule.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_codefence_creation() {
        let app = CodeFence::new_for_test(Config::default(), OutputMode::Human, 1, false);
        assert!(app.is_running());
        assert!(!app.progress_manager().is_enabled());
        assert_eq!(app.config().output.reconstruct_dir.to_str(), Some("reconstructed"));
    }

    #[test]
    fn test_combine_project_uses_config() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("main.py"), "print(1)\n").unwrap();
        fs::write(source.path().join("notes.md"), "# Notes\n").unwrap();

        let mut config = Config::default();
        config.filters.selected_extensions = Some(vec![".py".to_string()]);

        let app = CodeFence::new_for_test(config, OutputMode::Plain, 0, true);
        let report = app.combine_project(source.path()).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.document, "```python\n# main.py\nprint(1)\n\n```\n\n");
    }

    #[test]
    fn test_combine_project_skips_its_own_document() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("main.py"), "print(1)\n").unwrap();
        let document_file = source.path().join("context.md");
        fs::write(&document_file, "```python\n# main.py\nprint(1)\n```\n\n").unwrap();

        let mut config = Config::default();
        config.filters.selected_extensions = Some(vec![".py".to_string(), ".md".to_string()]);
        config.output.document_file = Some(document_file);

        let app = CodeFence::new_for_test(config, OutputMode::Plain, 0, true);
        let report = app.combine_project(source.path()).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].relative_path, "main.py");
    }

    #[test]
    fn test_cancelled_instance_refuses_work() {
        let app = CodeFence::new_for_test(Config::default(), OutputMode::Plain, 0, true);
        app.request_shutdown();

        let target = TempDir::new().unwrap();
        let result = app.reconstruct_document("", target.path(), false);
        assert!(matches!(result, Err(CodeFenceError::Cancelled)));
    }

    #[test]
    fn test_convenience_round_trip() {
        let source = TempDir::new().unwrap();
        fs::create_dir(source.path().join("pkg")).unwrap();
        fs::write(source.path().join("pkg").join("lib.rs"), "pub fn f() {}\n").unwrap();

        let languages = SuffixLanguageMap::defaults();
        let rules = ExclusionRules::default();
        let document = combine(source.path(), &[".rs"], &rules, &languages).unwrap();

        let target = TempDir::new().unwrap();
        let report = reconstruct(&document, target.path()).unwrap();

        assert_eq!(report.created_count(), 1);
        assert_eq!(
            fs::read_to_string(target.path().join("pkg").join("lib.rs")).unwrap(),
            "pub fn f() {}\n"
        );
    }

    #[test]
    fn test_combine_rejects_bad_extension() {
        let source = TempDir::new().unwrap();
        let languages = SuffixLanguageMap::defaults();
        let rules = ExclusionRules::default();
        assert!(combine(source.path(), &["a/b"], &rules, &languages).is_err());
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sample.toml");

        CodeFence::generate_sample_config(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[filters]"));
        assert!(content.contains("[output]"));
    }

    #[test]
    fn test_describe_rules() {
        assert_eq!(describe_rules(&ExclusionRules::parse("")), "(none)");
        assert!(describe_rules(&ExclusionRules::parse("build/")).contains("build/"));
    }
}
