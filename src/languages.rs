use crate::error::{CodeFenceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_LANGUAGES: &[(&str, &str)] = &[
    (".py", "python"),
    (".js", "javascript"),
    (".html", "html"),
    (".css", "css"),
    (".md", "markdown"),
    (".json", "json"),
    (".xml", "xml"),
    (".yaml", "yaml"),
    (".sh", "bash"),
    (".txt", "text"),
    (".rs", "rust"),
    (".toml", "toml"),
    (".ts", "typescript"),
    (".yml", "yaml"),
];

/// Extension-to-language lookup used for fence tags.
///
/// Keys carry their leading dot and compare case-insensitively. Extensions
/// missing from the map get an empty tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SuffixLanguageMap(BTreeMap<String, String>);

impl Default for SuffixLanguageMap {
    fn default() -> Self {
        Self::defaults()
    }
}

impl SuffixLanguageMap {
    pub fn defaults() -> Self {
        Self(
            DEFAULT_LANGUAGES
                .iter()
                .map(|(ext, lang)| (ext.to_string(), lang.to_string()))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Language tag for an extension such as `.PY`, or `""` when unknown.
    pub fn language_for(&self, extension: &str) -> &str {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(extension))
            .map(|(_, lang)| lang.as_str())
            .unwrap_or("")
    }

    pub fn language_for_path(&self, path: &Path) -> &str {
        match extension_of(path) {
            Some(ext) => self.language_for(&ext),
            None => "",
        }
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.0.keys().any(|key| key.eq_ignore_ascii_case(extension))
    }

    /// All configured extensions, lowercased.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.0.keys().map(|k| k.to_lowercase()).collect();
        extensions.dedup();
        extensions
    }

    /// Inserts or replaces a mapping, returning the previous tag.
    pub fn insert(&mut self, extension: &str, language: &str) -> Result<Option<String>> {
        let extension = normalize_extension(extension)?;
        let language = language.trim();
        validate_language_tag(&extension, language)?;

        let existing_key = self
            .0
            .keys()
            .find(|key| key.eq_ignore_ascii_case(&extension))
            .cloned();
        let previous = existing_key.and_then(|key| self.0.remove(&key));

        self.0.insert(extension, language.to_string());
        Ok(previous)
    }

    pub fn remove(&mut self, extension: &str) -> Option<String> {
        let extension = normalize_extension(extension).ok()?;
        let key = self
            .0
            .keys()
            .find(|key| key.eq_ignore_ascii_case(&extension))
            .cloned()?;
        self.0.remove(&key)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CodeFenceError::Config {
                message: "The language map must contain at least one extension".to_string(),
            });
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.0.len());
        for (extension, language) in &self.0 {
            if !extension.starts_with('.') || extension.len() < 2 {
                return Err(CodeFenceError::Config {
                    message: format!(
                        "Language map key '{}' must be an extension with a leading dot",
                        extension
                    ),
                });
            }

            validate_language_tag(extension, language)?;

            let lowered = extension.to_lowercase();
            if seen.contains(&lowered) {
                return Err(CodeFenceError::Config {
                    message: format!(
                        "Language map contains duplicate extension '{}' (keys are case-insensitive)",
                        extension
                    ),
                });
            }
            seen.push(lowered);
        }

        Ok(())
    }
}

/// Lowercased final extension of a path including its dot, e.g. `.rs`.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Normalizes user input like `py`, `*.PY` or `.py` to `.py`.
pub fn normalize_extension(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_start_matches('*');
    let body = trimmed.trim_start_matches('.');

    if body.is_empty()
        || body
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c.is_control())
    {
        return Err(CodeFenceError::Config {
            message: format!("Invalid extension: '{}'", raw),
        });
    }

    Ok(format!(".{}", body.to_lowercase()))
}

fn validate_language_tag(extension: &str, language: &str) -> Result<()> {
    if language.is_empty() {
        return Err(CodeFenceError::Config {
            message: format!("Language tag for '{}' cannot be empty", extension),
        });
    }

    // The tag shares the fence line, so it cannot hold whitespace or backticks.
    if language
        .chars()
        .any(|c| c.is_whitespace() || c == '`' || c.is_control())
    {
        return Err(CodeFenceError::Config {
            message: format!(
                "Language tag '{}' for '{}' contains whitespace or backticks",
                language, extension
            ),
        });
    }

    Ok(())
}
