use anyhow::Context;
use clap::Parser;
use codefence::cli::{CombineArgs, Commands, ConfigAction, ReconstructArgs};
use codefence::config::DEFAULT_CONFIG_PATHS;
use codefence::ui::setup_logger;
use codefence::{
    write_document, Cli, CodeFence, CodeFenceError, Config, DestinationState, ExclusionRules,
    OutputFormatter, OutputManager, SuffixLanguageMap,
};
use console::Term;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) = setup_logger(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Config { ref action } => handle_config(&cli, action),
        Commands::Exclusions { ref rules } => handle_exclusions(&cli, rules),
        Commands::Combine(ref args) => with_app(&cli, |app| handle_combine(&cli, app, args)),
        Commands::Reconstruct(ref args) => with_app(&cli, |app| handle_reconstruct(app, args)),
    }
}

fn with_app(cli: &Cli, command: impl FnOnce(&CodeFence) -> i32) -> i32 {
    match CodeFence::from_cli(cli) {
        Ok(app) => command(&app),
        Err(e) => {
            formatter_for(cli).print_user_friendly_error(&e);
            exit_code_for(&e)
        }
    }
}

fn handle_combine(cli: &Cli, app: &CodeFence, args: &CombineArgs) -> i32 {
    let formatter = app.output_formatter();

    let report = match app.combine_project(&args.source) {
        Ok(report) => report,
        Err(e) => {
            app.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    if report.cancelled {
        formatter.print_failures(&report.failures);
        formatter.print_combine_summary(&report);
        formatter.warning("No document was written");
        return 130;
    }

    if report.is_empty() && !report.has_failures() {
        let e = CodeFenceError::NothingToCombine {
            searched_extensions: report.selected_extensions.clone(),
        };
        app.handle_error(&e);
        return exit_code_for(&e);
    }

    if args.dry_run {
        formatter.info("DRY RUN MODE - no document will be written");
        formatter.print_combine_plan(&report);
        formatter.print_failures(&report.failures);
        formatter.print_combine_summary(&report);
        return completion_code(report.has_failures());
    }

    if let Err(e) = emit_document(app.config().output.document_file.as_deref(), &report.document)
    {
        app.handle_error(&e);
        return exit_code_for(&e);
    }

    if args.save_config {
        match save_filters(cli, app.config()) {
            Ok(path) => formatter.success(&format!("Saved selection to {}", path.display())),
            Err(e) => {
                formatter.error(&format!("{:#}", e));
                return 1;
            }
        }
    }

    formatter.print_failures(&report.failures);
    formatter.print_combine_summary(&report);
    completion_code(report.has_failures())
}

fn handle_reconstruct(app: &CodeFence, args: &ReconstructArgs) -> i32 {
    let formatter = app.output_formatter();
    let input = args.input_path(app.config());

    let document = match read_document(input) {
        Ok(document) => document,
        Err(e) => {
            formatter.error(&format!("{:#}", e));
            return 1;
        }
    };

    let output_dir = app.config().output.reconstruct_dir.clone();

    if args.dry_run {
        formatter.info("DRY RUN MODE - no files will be written");
    } else if let Err(e) = prepare_destination(&output_dir, args.force, input.is_none(), app) {
        app.handle_error(&e);
        return exit_code_for(&e);
    }

    let report = match app.reconstruct_document(&document, &output_dir, args.dry_run) {
        Ok(report) => report,
        Err(e) => {
            app.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    if report.blocks_found == 0 && !report.has_failures() {
        formatter.warning("The document contains no file blocks");
    }

    formatter.print_failures(&report.failures);
    formatter.print_reconstruction_summary(&report);

    if report.cancelled {
        130
    } else {
        completion_code(report.has_failures())
    }
}

fn handle_exclusions(cli: &Cli, rules: &str) -> i32 {
    let rules = ExclusionRules::parse(rules);
    formatter_for(cli).print_exclusion_preview(&rules);
    0
}

fn handle_config(cli: &Cli, action: &ConfigAction) -> i32 {
    let formatter = formatter_for(cli);

    match run_config_action(cli, action, &formatter) {
        Ok(()) => 0,
        Err(e) => {
            formatter.error(&format!("{:#}", e));
            1
        }
    }
}

fn run_config_action(
    cli: &Cli,
    action: &ConfigAction,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));

            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to replace it)",
                    path.display()
                );
            }

            CodeFence::generate_sample_config(&path).with_context(|| {
                format!("Failed to generate configuration file {}", path.display())
            })?;

            formatter.success(&format!(
                "Generated sample configuration file: {}",
                path.display()
            ));
            formatter.info(&format!(
                "To use it: codefence --config {} combine <DIR>",
                path.display()
            ));
        }
        ConfigAction::Show => {
            let config = Config::load_with_defaults(cli.config.as_ref())?;
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        ConfigAction::SetLanguage {
            extension,
            language,
        } => {
            let path = cli.config_path();
            let mut config = load_or_default(&path)?;

            let previous = config.languages.insert(extension, language)?;
            config.validate()?;
            config.save_to_file(&path)?;

            let message = match previous {
                Some(previous) if previous != *language => {
                    format!("Mapped {} to '{}' (was '{}')", extension, language, previous)
                }
                _ => format!("Mapped {} to '{}'", extension, language),
            };
            formatter.success(&message);
        }
        ConfigAction::RemoveLanguage { extension } => {
            let path = cli.config_path();
            let mut config = load_or_default(&path)?;

            if config.languages.remove(extension).is_none() {
                anyhow::bail!("{} is not in the language map", extension);
            }
            config
                .validate()
                .context("Refusing to leave the language map invalid")?;
            config.save_to_file(&path)?;

            formatter.success(&format!("Removed {}", extension));
        }
        ConfigAction::ResetLanguages => {
            let path = cli.config_path();
            let mut config = load_or_default(&path)?;

            config.languages = SuffixLanguageMap::defaults();
            config.save_to_file(&path)?;

            formatter.success(&format!(
                "Restored {} default language mappings",
                config.languages.len()
            ));
        }
    }

    Ok(())
}

/// Writes the document to `path`, or to stdout when none is configured.
fn emit_document(path: Option<&Path>, document: &str) -> codefence::Result<()> {
    match path {
        Some(path) => write_document(path, document),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

/// Stores the effective extension selection and exclusions, leaving the rest
/// of the file as it was.
fn save_filters(cli: &Cli, effective: &Config) -> anyhow::Result<PathBuf> {
    let path = cli.config_path();
    let mut config = load_or_default(&path)?;

    config.filters = effective.filters.clone();
    config
        .save_to_file(&path)
        .with_context(|| format!("Failed to save settings to {}", path.display()))?;

    Ok(path)
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(Config::load_from_file(path)?)
    } else {
        Ok(Config::default())
    }
}

fn read_document(input: Option<&Path>) -> anyhow::Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {}", path.display())),
        None => {
            log::info!("Reading document from stdin");
            let mut document = String::new();
            io::stdin()
                .read_to_string(&mut document)
                .context("Failed to read document from stdin")?;
            Ok(document)
        }
    }
}

/// Refuses a non-empty destination unless `--force` was given or the user
/// confirms on a terminal.
fn prepare_destination(
    output_dir: &Path,
    force: bool,
    reads_stdin: bool,
    app: &CodeFence,
) -> codefence::Result<()> {
    let mut manager = OutputManager::new(output_dir).with_force_overwrite(force);

    if !force {
        if let DestinationState::NotEmpty { entries } = manager.inspect()? {
            if can_prompt(reads_stdin) {
                let confirmed = app
                    .progress_manager()
                    .suspend(|| confirm_overwrite(output_dir, entries))
                    .unwrap_or_else(|e| {
                        log::warn!("Confirmation prompt failed: {:#}", e);
                        false
                    });
                manager = manager.with_force_overwrite(confirmed);
            }
        }
    }

    manager.initialize()?;
    Ok(())
}

fn can_prompt(reads_stdin: bool) -> bool {
    !reads_stdin && io::stdin().is_terminal() && Term::stderr().is_term()
}

fn confirm_overwrite(output_dir: &Path, entries: usize) -> anyhow::Result<bool> {
    let term = Term::stderr();
    term.write_str(&format!(
        "{} already contains {} entries. Write into it anyway? [y/N] ",
        output_dir.display(),
        entries
    ))
    .context("Failed to write confirmation prompt")?;

    let answer = term
        .read_line()
        .context("Failed to read confirmation answer")?;

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn formatter_for(cli: &Cli) -> OutputFormatter {
    OutputFormatter::new(cli.output_mode(), cli.verbosity_level(), cli.quiet)
}

fn exit_code_for(error: &CodeFenceError) -> i32 {
    match error {
        CodeFenceError::Cancelled => 130,
        CodeFenceError::NothingToCombine { .. } => 6,
        CodeFenceError::Permission { .. } => 7,
        CodeFenceError::OutputDirectoryExists { .. } => 8,
        _ => 1,
    }
}

fn completion_code(has_failures: bool) -> i32 {
    if has_failures {
        2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CodeFenceError::Cancelled), 130);
        assert_eq!(
            exit_code_for(&CodeFenceError::NothingToCombine {
                searched_extensions: vec![".py".to_string()]
            }),
            6
        );
        assert_eq!(
            exit_code_for(&CodeFenceError::Permission {
                path: "x".to_string()
            }),
            7
        );
        assert_eq!(
            exit_code_for(&CodeFenceError::OutputDirectoryExists {
                path: "x".to_string()
            }),
            8
        );
        assert_eq!(
            exit_code_for(&CodeFenceError::Config {
                message: "bad".to_string()
            }),
            1
        );
        assert_eq!(completion_code(true), 2);
        assert_eq!(completion_code(false), 0);
    }

    #[test]
    fn test_config_init_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("codefence.toml");
        let path_str = path.to_str().unwrap();

        let cli = parse(&["codefence", "-q", "-c", path_str, "config", "init"]);
        assert_eq!(handle_config(&cli, &ConfigAction::Init { force: false }), 0);
        assert!(fs::read_to_string(&path).unwrap().contains("[filters]"));

        assert_eq!(handle_config(&cli, &ConfigAction::Init { force: false }), 1);
        assert_eq!(handle_config(&cli, &ConfigAction::Init { force: true }), 0);
    }

    #[test]
    fn test_set_and_remove_language() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        let path_str = path.to_str().unwrap();
        let cli = parse(&["codefence", "-q", "-c", path_str, "config", "show"]);

        let set = ConfigAction::SetLanguage {
            extension: "zig".to_string(),
            language: "zig".to_string(),
        };
        assert_eq!(handle_config(&cli, &set), 0);
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.languages.language_for(".zig"), "zig");

        let remove = ConfigAction::RemoveLanguage {
            extension: ".zig".to_string(),
        };
        assert_eq!(handle_config(&cli, &remove), 0);
        assert_eq!(handle_config(&cli, &remove), 1);
    }

    #[test]
    fn test_save_filters_keeps_other_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("codefence.toml");

        let mut existing = Config::default();
        existing.output.reconstruct_dir = PathBuf::from("restored");
        existing.save_to_file(&path).unwrap();

        let cli = parse(&["codefence", "-c", path.to_str().unwrap(), "config", "show"]);
        let mut effective = Config::default();
        effective.filters.selected_extensions = Some(vec![".rs".to_string()]);
        effective.output.document_file = Some(PathBuf::from("ignored.md"));

        save_filters(&cli, &effective).unwrap();

        let saved = Config::load_from_file(&path).unwrap();
        assert_eq!(saved.filters.selected_extensions, Some(vec![".rs".to_string()]));
        assert_eq!(saved.output.reconstruct_dir, PathBuf::from("restored"));
        assert!(saved.output.document_file.is_none());
    }

    #[test]
    fn test_prepare_destination_requires_force() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("existing.txt"), "keep").unwrap();
        let app = CodeFence::new_for_test(Config::default(), codefence::OutputMode::Plain, 0, true);

        let refused = prepare_destination(temp_dir.path(), false, true, &app);
        assert!(matches!(
            refused,
            Err(CodeFenceError::OutputDirectoryExists { .. })
        ));
        assert!(prepare_destination(temp_dir.path(), true, true, &app).is_ok());
    }

    #[test]
    fn test_read_document_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.md");
        fs::write(&path, "```\n# a.txt\nhi\n```\n").unwrap();

        assert_eq!(read_document(Some(&path)).unwrap(), "```\n# a.txt\nhi\n```\n");
        assert!(read_document(Some(&temp_dir.path().join("missing.md"))).is_err());
    }
}
