use crate::error::{CodeFenceError, Failure, UserFriendlyError};
use crate::project::{CombineReport, ReconstructionReport};
use crate::scanner::ExclusionRules;
use console::{style, Emoji, Term};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

static CHECKMARK: Emoji = Emoji("✅ ", "+ ");
static CROSS: Emoji = Emoji("❌ ", "x ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

/// Status and summary output. Everything goes to stderr so that stdout can
/// carry a combined document.
pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let term = Term::stderr();
        let use_colors = match mode {
            OutputMode::Human => term.features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn success(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Success, message),
                OutputMode::Json => self.print_json_message("success", message),
                OutputMode::Plain => eprintln!("SUCCESS: {}", message),
            }
        }
    }

    /// Errors are shown even in quiet mode.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => eprintln!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => eprintln!("INFO: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        eprintln!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        eprintln!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => eprintln!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &CodeFenceError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => eprintln!("SUGGESTION: {}", suggestion),
            }
        }
    }

    pub fn print_failures(&self, failures: &[Failure]) {
        if failures.is_empty() || self.mode == OutputMode::Json {
            return;
        }

        for failure in failures {
            self.warning(&failure.to_string());
        }
    }

    pub fn print_combine_summary(&self, report: &CombineReport) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                self.print_separator();
                let headline = if report.cancelled {
                    "Combine cancelled, partial document produced"
                } else {
                    "Combine completed"
                };
                self.print_human_headline(headline, report.cancelled || report.has_failures());
                self.print_stat("Files included", report.files.len().to_string());
                self.print_stat("Total size", format_bytes(report.total_bytes));
                self.print_stat("Skipped", report.skipped.len().to_string());
                if report.has_failures() {
                    self.print_stat("Failures", report.failures.len().to_string());
                }
                self.print_stat("Time taken", format_duration(report.duration));

                if self.verbose_level >= 1 && !report.files_by_language.is_empty() {
                    eprintln!("  Files by language:");
                    for (language, count) in &report.files_by_language {
                        eprintln!("    {}: {}", language, count);
                    }
                }
                self.print_separator();
            }
            OutputMode::Json => self.print_json_report("combine_report", report),
            OutputMode::Plain => {
                eprintln!("COMPLETED: combine");
                eprintln!("Files included: {}", report.files.len());
                eprintln!("Bytes: {}", report.total_bytes);
                eprintln!("Skipped: {}", report.skipped.len());
                eprintln!("Failures: {}", report.failures.len());
                eprintln!("Cancelled: {}", report.cancelled);
            }
        }
    }

    /// Lists what a combine would include and skip, without content.
    pub fn print_combine_plan(&self, report: &CombineReport) {
        match self.mode {
            OutputMode::Json => self.print_json_report("combine_plan", report),
            _ => {
                for file in &report.files {
                    eprintln!("  + {} [{}]", file.relative_path, display_tag(&file.language_tag));
                }
                if self.verbose_level >= 1 {
                    for skipped in &report.skipped {
                        eprintln!("  - {} ({})", skipped.relative_path, skipped.reason);
                    }
                }
            }
        }
    }

    pub fn print_reconstruction_summary(&self, report: &ReconstructionReport) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                self.print_separator();
                let headline = match (report.cancelled, report.dry_run) {
                    (true, _) => "Reconstruction cancelled",
                    (false, true) => "Dry run completed, nothing written",
                    (false, false) => "Reconstruction completed",
                };
                self.print_human_headline(headline, report.cancelled || report.has_failures());
                self.print_stat("Blocks found", report.blocks_found.to_string());
                let label = if report.dry_run { "Would write" } else { "Files written" };
                self.print_stat(label, report.created_count().to_string());
                self.print_stat("Total size", format_bytes(report.total_bytes));
                if report.duplicate_blocks > 0 {
                    self.print_stat("Duplicates", report.duplicate_blocks.to_string());
                }
                if report.has_failures() {
                    self.print_stat("Failures", report.failures.len().to_string());
                }
                self.print_stat("Output", report.output_dir.display().to_string());
                self.print_separator();
            }
            OutputMode::Json => self.print_json_report("reconstruction_report", report),
            OutputMode::Plain => {
                eprintln!("COMPLETED: reconstruct");
                eprintln!("Blocks found: {}", report.blocks_found);
                eprintln!("Files written: {}", report.created_count());
                eprintln!("Failures: {}", report.failures.len());
                eprintln!("Dry run: {}", report.dry_run);
                eprintln!("Cancelled: {}", report.cancelled);
            }
        }
    }

    pub fn print_exclusion_preview(&self, rules: &ExclusionRules) {
        match self.mode {
            OutputMode::Json => self.print_json_report("exclusion_rules", rules),
            OutputMode::Human | OutputMode::Plain => {
                if rules.is_empty() {
                    eprintln!("No exclusion rules.");
                    return;
                }
                for rule in rules.iter() {
                    eprintln!("  {:<10} {}", rule.kind_label(), rule.pattern());
                }
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    eprintln!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    eprintln!("=== {} ===", title);
                }
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => eprintln!("=== {} ===", title),
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human if self.use_colors => {
                eprintln!("{}", style("─".repeat(60)).dim());
            }
            OutputMode::Human | OutputMode::Plain => eprintln!("{}", "-".repeat(60)),
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_headline(&self, headline: &str, with_problems: bool) {
        if !self.use_colors {
            eprintln!("{}", headline);
        } else if with_problems {
            eprintln!("{}{}", WARNING, style(headline).yellow().bold());
        } else {
            eprintln!("{}{}", CHECKMARK, style(headline).green().bold());
        }
    }

    fn print_stat(&self, label: &str, value: String) {
        let label = format!("{}:", label);
        if self.use_colors {
            eprintln!("  {:<16} {}", label, style(value).cyan().bold());
        } else {
            eprintln!("  {:<16} {}", label, value);
        }
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        if self.use_colors {
            let styled = match msg_type {
                MessageType::Success => style(message).green().bold(),
                MessageType::Error => style(message).red().bold(),
                MessageType::Warning => style(message).yellow().bold(),
                MessageType::Info => style(message).cyan(),
            };
            let emoji = match msg_type {
                MessageType::Success => CHECKMARK,
                MessageType::Error => CROSS,
                MessageType::Warning => WARNING,
                MessageType::Info => INFO,
            };
            eprintln!("{}{}", emoji, styled);
        } else {
            let prefix = match msg_type {
                MessageType::Success => "+",
                MessageType::Error => "x",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };
            eprintln!("{} {}", prefix, message);
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_report<T: Serialize>(&self, kind: &str, report: &T) {
        let value = serde_json::to_value(report).unwrap_or(serde_json::Value::Null);
        self.print_json_object(&serde_json::json!({
            "type": kind,
            "report": value,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        eprintln!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

fn display_tag(tag: &str) -> &str {
    if tag.is_empty() {
        "untagged"
    } else {
        tag
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}
