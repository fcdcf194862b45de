use serde::Serialize;

pub const FENCE: &str = "```";

/// One file inside a combined document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileBlock {
    /// Destination path relative to the project root, `/`-separated.
    pub relative_path: String,
    pub language_tag: String,
    pub content: String,
}

impl FileBlock {
    pub fn new<P, L, C>(relative_path: P, language_tag: L, content: C) -> Self
    where
        P: Into<String>,
        L: Into<String>,
        C: Into<String>,
    {
        Self {
            relative_path: relative_path.into(),
            language_tag: language_tag.into(),
            content: content.into(),
        }
    }

    pub fn path_comment(&self) -> String {
        path_comment(&self.relative_path)
    }

    /// True when the content already opens with this block's path comment.
    pub fn has_path_comment(&self) -> bool {
        starts_with_path_comment(&self.content, &self.relative_path)
    }

    /// True when a content line would be read back as a fence-close.
    pub fn has_bare_fence(&self) -> bool {
        self.content
            .split('\n')
            .any(|line| line.trim_end_matches('\r') == FENCE)
    }

    pub fn render_into(&self, out: &mut String) {
        out.push_str(FENCE);
        out.push_str(&self.language_tag);
        out.push('\n');

        if !self.has_path_comment() {
            out.push_str(&self.path_comment());
            out.push('\n');
        }

        out.push_str(&self.content);
        out.push('\n');
        out.push_str(FENCE);
        out.push_str("\n\n");
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.rendered_len_hint());
        self.render_into(&mut out);
        out
    }

    fn rendered_len_hint(&self) -> usize {
        self.content.len() + self.relative_path.len() + self.language_tag.len() + 16
    }
}

pub fn path_comment(relative_path: &str) -> String {
    format!("# {}", relative_path)
}

pub fn starts_with_path_comment(content: &str, relative_path: &str) -> bool {
    let first_line = content.split('\n').next().unwrap_or("");
    let first_line = first_line.strip_suffix('\r').unwrap_or(first_line);

    first_line
        .strip_prefix("# ")
        .is_some_and(|rest| rest == relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prepends_path_comment() {
        let block = FileBlock::new("src/a.py", "python", "print(1)");
        assert_eq!(block.render(), "```python\n# src/a.py\nprint(1)\n```\n\n");
    }

    #[test]
    fn test_render_does_not_duplicate_path_comment() {
        let block = FileBlock::new("src/a.py", "python", "# src/a.py\nprint(1)\n");
        assert!(block.has_path_comment());
        assert_eq!(block.render(), "```python\n# src/a.py\nprint(1)\n\n```\n\n");
    }

    #[test]
    fn test_similar_first_line_is_not_a_path_comment() {
        assert!(!starts_with_path_comment("# src/a.pyc\n", "src/a.py"));
        assert!(!starts_with_path_comment("#src/a.py\n", "src/a.py"));
        assert!(!starts_with_path_comment("", "src/a.py"));
        assert!(starts_with_path_comment("# src/a.py\r\nx", "src/a.py"));
    }

    #[test]
    fn test_render_untagged_empty_file() {
        let block = FileBlock::new("Makefile", "", "");
        assert_eq!(block.render(), "```\n# Makefile\n\n```\n\n");
    }

    #[test]
    fn test_bare_fence_detection() {
        assert!(FileBlock::new("a.md", "markdown", "x\n```\ny").has_bare_fence());
        assert!(FileBlock::new("a.md", "markdown", "```\r\n").has_bare_fence());
        assert!(!FileBlock::new("a.md", "markdown", "```rust\nfn x() {}").has_bare_fence());
    }
}
