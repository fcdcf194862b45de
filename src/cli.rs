use crate::config::{CliOverrides, Config, DEFAULT_CONFIG_PATHS};
use crate::error::Result;
use crate::ui::OutputMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "codefence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fold a project into one fenced text document and unfold it back")]
#[command(
    long_about = "CodeFence concatenates a project's text files into a single document where \
                  every file is a fenced block tagged with its language and path, and rebuilds \
                  a directory tree from such a document."
)]
#[command(before_help = "📦 CodeFence - Project Folding Tool")]
#[command(after_help = "EXAMPLES:\n  \
    codefence combine ./my-app -o context.md\n  \
    codefence combine ./my-app --ext .py,.md --exclude 'node_modules/, *.log, secrets.txt'\n  \
    codefence reconstruct context.md -d ./restored\n  \
    cat context.md | codefence reconstruct - -d ./restored --force\n  \
    codefence exclusions 'build/, *.min.js, .env.local'\n  \
    codefence config set-language .go go")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for status and reports
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Combine a source directory into one document
    Combine(CombineArgs),

    /// Rebuild a directory tree from a combined document
    Reconstruct(ReconstructArgs),

    /// Show how a comma-separated exclusion string is classified
    Exclusions {
        /// Rules such as "node_modules/, *.log, secrets.txt"
        rules: String,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Directory to combine
    pub source: PathBuf,

    /// Write the document to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Extensions to include (comma-separated, e.g. .py,.md)
    #[arg(short = 'e', long = "ext")]
    pub extensions: Option<String>,

    /// Exclusion rules (comma-separated: dir/, *.ext, filename)
    #[arg(short = 'x', long)]
    pub exclude: Option<String>,

    /// Persist the chosen extensions and exclusions to the config file
    #[arg(long)]
    pub save_config: bool,

    /// List what would be included without producing a document
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ReconstructArgs {
    /// Combined document to read, or "-" for stdin
    pub input: Option<PathBuf>,

    /// Destination directory
    #[arg(short = 'd', long)]
    pub output_dir: Option<PathBuf>,

    /// Write into a non-empty destination without asking
    #[arg(long)]
    pub force: bool,

    /// Parse and validate without writing files
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a sample configuration file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Map an extension to a fence language tag
    SetLanguage { extension: String, language: String },
    /// Remove an extension from the language map
    RemoveLanguage { extension: String },
    /// Restore the built-in language map
    ResetLanguages,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl From<&OutputFormat> for OutputMode {
    fn from(format: &OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        }
    }
}

impl Cli {
    /// Loads the configuration file, applies command flags and validates.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        match self.command {
            Commands::Combine(ref args) => CliOverrides::new()
                .with_extensions(args.extensions.clone())
                .with_exclude(args.exclude.clone())
                .with_document_file(args.output.clone()),
            Commands::Reconstruct(ref args) => {
                CliOverrides::new().with_reconstruct_dir(args.output_dir.clone())
            }
            _ => CliOverrides::new(),
        }
    }

    /// File that config commands read and write.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(Config::find_default_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]))
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(&self.output_format)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

impl ReconstructArgs {
    /// `None` means stdin.
    pub fn input_path<'a>(&'a self, config: &'a Config) -> Option<&'a Path> {
        match self.input.as_deref() {
            Some(path) if path == Path::new("-") => None,
            Some(path) => Some(path),
            None => config.output.document_file.as_deref(),
        }
    }
}
