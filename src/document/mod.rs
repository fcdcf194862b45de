pub mod block;
pub mod parser;

pub use block::{path_comment, FileBlock, FENCE};
pub use parser::{parse_document, BlockParser, LocatedBlock};

/// An ordered sequence of file blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedDocument {
    pub blocks: Vec<FileBlock>,
}

impl CombinedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: FileBlock) {
        self.blocks.push(block);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            block.render_into(&mut out);
        }
        out
    }

    /// Parses well-formed blocks, dropping malformed ones.
    pub fn parse(text: &str) -> Self {
        Self {
            blocks: BlockParser::new(text)
                .filter_map(|item| item.ok())
                .map(|located| located.block)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_reads_back_its_blocks() {
        let mut document = CombinedDocument::new();
        document.push(FileBlock::new("src/a.py", "python", "print(1)\n"));
        document.push(FileBlock::new("notes/empty.txt", "text", ""));
        document.push(FileBlock::new("win.txt", "text", "a\r\nb"));

        let text = document.render();
        assert_eq!(CombinedDocument::parse(&text), document);
    }
}
