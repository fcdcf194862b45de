use crate::error::{CodeFenceError, Result};
use crate::languages::{normalize_extension, SuffixLanguageMap};
use crate::scanner::ExclusionRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "codefence.toml",
    ".codefence.toml",
    "codefence.config.toml",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub languages: SuffixLanguageMap,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Extensions to include. Absent means every extension in the language map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_extensions: Option<Vec<String>>,
    /// Comma-separated exclusion rules.
    #[serde(default)]
    pub exclude: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_file: Option<PathBuf>,
    #[serde(default = "default_reconstruct_dir")]
    pub reconstruct_dir: PathBuf,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            selected_extensions: None,
            exclude: "node_modules/, .git/, target/, __pycache__/, .venv/".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            document_file: None,
            reconstruct_dir: default_reconstruct_dir(),
        }
    }
}

fn default_reconstruct_dir() -> PathBuf {
    PathBuf::from("reconstructed")
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CodeFenceError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CodeFenceError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| CodeFenceError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => match Self::find_default_path() {
                Some(path) => Self::load_from_file(path),
                None => Ok(Self::default()),
            },
        }
    }

    /// First default config file present in the working directory.
    pub fn find_default_path() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref extensions) = cli_args.extensions {
            let selected: Vec<String> = extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            self.filters.selected_extensions = Some(selected);
        }

        if let Some(ref exclude) = cli_args.exclude {
            self.filters.exclude = exclude.clone();
        }

        if let Some(ref document_file) = cli_args.document_file {
            self.output.document_file = Some(document_file.clone());
        }

        if let Some(ref reconstruct_dir) = cli_args.reconstruct_dir {
            self.output.reconstruct_dir = reconstruct_dir.clone();
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;

        std::fs::write(path, content).map_err(|e| CodeFenceError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        log::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.languages.validate()?;

        if let Some(ref selected) = self.filters.selected_extensions {
            if selected.is_empty() {
                return Err(CodeFenceError::Config {
                    message: "At least one file extension must be selected".to_string(),
                });
            }
            for extension in selected {
                normalize_extension(extension)?;
            }
        }

        if self.output.reconstruct_dir.as_os_str().is_empty() {
            return Err(CodeFenceError::Config {
                message: "Reconstruction directory cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Selected extensions normalized to `.ext` form, in a stable order.
    pub fn selected_extensions(&self) -> Result<Vec<String>> {
        let mut extensions = match self.filters.selected_extensions {
            Some(ref selected) => selected
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect::<Result<Vec<_>>>()?,
            None => self.languages.extensions(),
        };
        extensions.sort();
        extensions.dedup();
        Ok(extensions)
    }

    pub fn exclusion_rules(&self) -> ExclusionRules {
        ExclusionRules::parse(&self.filters.exclude)
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub extensions: Option<String>,
    pub exclude: Option<String>,
    pub document_file: Option<PathBuf>,
    pub reconstruct_dir: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(mut self, extensions: Option<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_exclude(mut self, exclude: Option<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_document_file(mut self, document_file: Option<PathBuf>) -> Self {
        self.document_file = document_file;
        self
    }

    pub fn with_reconstruct_dir(mut self, reconstruct_dir: Option<PathBuf>) -> Self {
        self.reconstruct_dir = reconstruct_dir;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.filters.selected_extensions.is_none());
        assert!(config.filters.exclude.contains("node_modules/"));
        assert_eq!(config.languages.language_for(".py"), "python");
        assert_eq!(config.output.reconstruct_dir, PathBuf::from("reconstructed"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.filters.selected_extensions = Some(vec![]);
        assert!(config.validate().is_err());

        config.filters.selected_extensions = Some(vec!["*.".to_string()]);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.languages = SuffixLanguageMap::empty();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.filters.selected_extensions = Some(vec![".py".to_string(), ".md".to_string()]);
        config.languages.insert(".go", "go").unwrap();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config, loaded_config);
        assert_eq!(loaded_config.languages.language_for(".go"), "go");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[filters]\nexclude = \"build/\"").unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.filters.exclude, "build/");
        assert_eq!(config.languages, SuffixLanguageMap::defaults());
        assert_eq!(config.output.reconstruct_dir, PathBuf::from("reconstructed"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[filters\nexclude = ").unwrap();

        let result = Config::load_from_file(temp_file.path());
        assert!(matches!(result, Err(CodeFenceError::Config { .. })));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = Config::load_from_file("/definitely/not/here/codefence.toml");
        assert!(matches!(result, Err(CodeFenceError::Config { .. })));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_extensions(Some("py, md,".to_string()))
            .with_exclude(Some("dist/".to_string()))
            .with_reconstruct_dir(Some(PathBuf::from("out")));

        config.merge_with_cli_args(&overrides);

        assert_eq!(
            config.filters.selected_extensions,
            Some(vec!["py".to_string(), "md".to_string()])
        );
        assert_eq!(config.filters.exclude, "dist/");
        assert_eq!(config.output.reconstruct_dir, PathBuf::from("out"));
        assert_eq!(config.selected_extensions().unwrap(), vec![".md", ".py"]);
    }

    #[test]
    fn test_selection_defaults_to_language_map() {
        let config = Config::default();
        let selected = config.selected_extensions().unwrap();
        assert_eq!(selected.len(), config.languages.len());
        assert!(selected.contains(&".rs".to_string()));
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config();
        assert!(!sample.is_empty());
        assert!(sample.contains("[filters]"));
        assert!(sample.contains("[output]"));
        assert!(sample.contains("[languages]"));
    }
}
