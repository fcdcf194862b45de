use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum ExclusionRule {
    /// Exact file name, or a path relative to the source root.
    Filename(String),
    /// Directory name, or a directory path relative to the source root.
    Directory(String),
    /// Lowercased suffix with its leading dot, e.g. `.log` or `.tar.gz`.
    Extension(String),
}

impl ExclusionRule {
    /// Classifies one trimmed item by shape. Returns `None` for empty items.
    pub fn classify(item: &str) -> Option<Self> {
        let item = item.trim();
        if item.is_empty() {
            return None;
        }

        if let Some(dir) = item.strip_suffix('/') {
            let dir = dir.trim_matches('/');
            if dir.is_empty() {
                return None;
            }
            return Some(ExclusionRule::Directory(dir.to_string()));
        }

        if let Some(suffix) = item.strip_prefix('*') {
            if suffix.starts_with('.') && suffix.len() > 1 {
                return Some(ExclusionRule::Extension(suffix.to_lowercase()));
            }
        }

        // `.log` and `.gitignore` are suffixes; `.env.local` names one file.
        if item.starts_with('.') && item.len() > 1 && !item[1..].contains('.') {
            return Some(ExclusionRule::Extension(item.to_lowercase()));
        }

        Some(ExclusionRule::Filename(item.to_string()))
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            ExclusionRule::Filename(_) => "filename",
            ExclusionRule::Directory(_) => "directory",
            ExclusionRule::Extension(_) => "extension",
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            ExclusionRule::Filename(p) | ExclusionRule::Directory(p) | ExclusionRule::Extension(p) => p,
        }
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionRule::Directory(dir) => write!(f, "{}/", dir),
            ExclusionRule::Extension(ext) => write!(f, "*{}", ext),
            ExclusionRule::Filename(name) => f.write_str(name),
        }
    }
}

/// Parsed comma-separated exclusion list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExclusionRules {
    rules: Vec<ExclusionRule>,
}

impl ExclusionRules {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn parse(text: &str) -> Self {
        let mut rules: Vec<ExclusionRule> = Vec::new();
        for rule in text.split(',').filter_map(ExclusionRule::classify) {
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExclusionRule> {
        self.rules.iter()
    }

    /// Rule that prunes a directory, matched by name or by relative path.
    ///
    /// Filename rules prune directories of the same name as well.
    pub fn excluded_directory(&self, name: &str, relative_path: &str) -> Option<&ExclusionRule> {
        self.rules.iter().find(|rule| match rule {
            ExclusionRule::Directory(dir) | ExclusionRule::Filename(dir) => {
                matches_name_or_path(dir, name, relative_path)
            }
            ExclusionRule::Extension(_) => false,
        })
    }

    /// Rule that excludes a file, checking filename rules before extension rules.
    pub fn excluded_file(&self, name: &str, relative_path: &str) -> Option<&ExclusionRule> {
        let by_name = self.rules.iter().find(|rule| match rule {
            ExclusionRule::Filename(file) => matches_name_or_path(file, name, relative_path),
            _ => false,
        });

        by_name.or_else(|| {
            let lowered = name.to_lowercase();
            self.rules.iter().find(|rule| match rule {
                ExclusionRule::Extension(ext) => lowered.ends_with(ext.as_str()),
                _ => false,
            })
        })
    }
}

fn matches_name_or_path(pattern: &str, name: &str, relative_path: &str) -> bool {
    if pattern.contains('/') {
        pattern == relative_path
    } else {
        pattern == name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_shape() {
        assert_eq!(
            ExclusionRule::classify("node_modules/"),
            Some(ExclusionRule::Directory("node_modules".to_string()))
        );
        assert_eq!(
            ExclusionRule::classify("*.LOG"),
            Some(ExclusionRule::Extension(".log".to_string()))
        );
        assert_eq!(
            ExclusionRule::classify(".pyc"),
            Some(ExclusionRule::Extension(".pyc".to_string()))
        );
        assert_eq!(
            ExclusionRule::classify("*.tar.gz"),
            Some(ExclusionRule::Extension(".tar.gz".to_string()))
        );
        assert_eq!(
            ExclusionRule::classify("package-lock.json"),
            Some(ExclusionRule::Filename("package-lock.json".to_string()))
        );
        assert_eq!(
            ExclusionRule::classify(".env.local"),
            Some(ExclusionRule::Filename(".env.local".to_string()))
        );
    }

    #[test]
    fn test_dotfile_rule_is_an_extension_rule() {
        let rule = ExclusionRule::classify(".gitignore").unwrap();
        assert_eq!(rule, ExclusionRule::Extension(".gitignore".to_string()));

        let rules = ExclusionRules::new(vec![rule]);
        assert!(rules.excluded_file(".gitignore", ".gitignore").is_some());
    }

    #[test]
    fn test_parse_ignores_empty_items() {
        let rules = ExclusionRules::parse(" , build/,, *.log ,  ");
        assert_eq!(rules.len(), 2);

        assert!(ExclusionRules::parse("").is_empty());
        assert!(ExclusionRules::parse(" ,/, ").is_empty());
    }

    #[test]
    fn test_parse_deduplicates() {
        let rules = ExclusionRules::parse("dist/, dist/, *.log, .log");
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_directory_matching_is_case_sensitive() {
        let rules = ExclusionRules::parse("build/");
        assert!(rules.excluded_directory("build", "build").is_some());
        assert!(rules.excluded_directory("build", "src/build").is_some());
        assert!(rules.excluded_directory("Build", "Build").is_none());
    }

    #[test]
    fn test_directory_rule_with_relative_path() {
        let rules = ExclusionRules::parse("src/generated/");
        assert!(rules
            .excluded_directory("generated", "src/generated")
            .is_some());
        assert!(rules
            .excluded_directory("generated", "tests/generated")
            .is_none());
    }

    #[test]
    fn test_filename_rule_prunes_directories() {
        let rules = ExclusionRules::parse("node_modules");
        assert!(rules
            .excluded_directory("node_modules", "web/node_modules")
            .is_some());
    }

    #[test]
    fn test_file_matching() {
        let rules = ExclusionRules::parse("secrets.txt, *.min.js, docs/draft.md");

        assert!(rules.excluded_file("secrets.txt", "a/secrets.txt").is_some());
        assert!(rules.excluded_file("APP.MIN.JS", "APP.MIN.JS").is_some());
        assert!(rules.excluded_file("draft.md", "docs/draft.md").is_some());
        assert!(rules.excluded_file("draft.md", "other/draft.md").is_none());
        assert!(rules.excluded_file("app.js", "app.js").is_none());
    }

    #[test]
    fn test_display_round_trips_classification() {
        for text in ["build/", "*.log", "Makefile"] {
            let rule = ExclusionRule::classify(text).unwrap();
            assert_eq!(ExclusionRule::classify(&rule.to_string()), Some(rule));
        }
    }
}
