use crate::document::block::FileBlock;
use crate::error::{CodeFenceError, Result};
use regex::Regex;
use std::str::SplitInclusive;
use std::sync::OnceLock;

/// A parsed block together with the 1-based line of its fence-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBlock {
    pub line: usize,
    pub block: FileBlock,
}

#[derive(Debug, PartialEq, Eq)]
enum Marker<'a> {
    /// A bare fence. Closes an open block or opens an untagged one.
    Bare,
    /// A fence followed by a language tag.
    Tagged(&'a str),
    Text,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"^```([^\s`]*)[ \t]*$").expect("valid fence regex"))
}

fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

impl<'a> Marker<'a> {
    fn of(line: &'a str) -> Self {
        match fence_regex().captures(trim_line_end(line)) {
            Some(caps) => match caps.get(1).map(|m| m.as_str()) {
                Some(tag) if !tag.is_empty() => Marker::Tagged(tag),
                _ => Marker::Bare,
            },
            None => Marker::Text,
        }
    }
}

#[derive(Debug)]
enum State {
    Seeking,
    ExpectPathComment {
        open_line: usize,
        tag: String,
        crlf: bool,
    },
    CollectingContent {
        open_line: usize,
        tag: String,
        path: String,
        crlf: bool,
        content_start: usize,
    },
    Discarding,
}

/// Lazy single-pass parser over a combined document.
///
/// Yields one `Ok` per well-formed block and one `Err(MalformedBlock)` per
/// malformed block. Text between blocks is ignored.
pub struct BlockParser<'a> {
    text: &'a str,
    lines: SplitInclusive<'a, char>,
    line_no: usize,
    offset: usize,
    state: State,
}

impl<'a> BlockParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            lines: text.split_inclusive('\n'),
            line_no: 0,
            offset: 0,
            state: State::Seeking,
        }
    }

    fn open(&mut self, tag: &str, crlf: bool) {
        self.state = State::ExpectPathComment {
            open_line: self.line_no,
            tag: tag.to_string(),
            crlf,
        };
    }

    fn content(&self, content_start: usize, content_end: usize, crlf: bool) -> &'a str {
        let raw = &self.text[content_start..content_end];
        match raw.strip_suffix('\n') {
            Some(stripped) if crlf => stripped.strip_suffix('\r').unwrap_or(stripped),
            Some(stripped) => stripped,
            None => raw,
        }
    }

    fn finish(&mut self) -> Option<Result<LocatedBlock>> {
        match std::mem::replace(&mut self.state, State::Seeking) {
            State::ExpectPathComment { open_line, .. }
            | State::CollectingContent { open_line, .. } => {
                Some(Err(malformed(open_line, "block is not closed before end of input")))
            }
            State::Seeking | State::Discarding => None,
        }
    }
}

fn malformed<R: Into<String>>(line: usize, reason: R) -> CodeFenceError {
    CodeFenceError::MalformedBlock {
        line,
        reason: reason.into(),
    }
}

impl<'a> Iterator for BlockParser<'a> {
    type Item = Result<LocatedBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line,
                None => return self.finish(),
            };

            self.line_no += 1;
            let line_start = self.offset;
            self.offset += line.len();
            let crlf = line.ends_with("\r\n");
            let marker = Marker::of(line);

            match std::mem::replace(&mut self.state, State::Seeking) {
                State::Seeking => match marker {
                    Marker::Bare => self.open("", crlf),
                    Marker::Tagged(tag) => self.open(tag, crlf),
                    Marker::Text => {}
                },

                State::ExpectPathComment {
                    open_line,
                    tag,
                    crlf: open_crlf,
                } => match marker {
                    Marker::Bare => {
                        return Some(Err(malformed(open_line, "missing path comment")));
                    }
                    Marker::Tagged(next_tag) => {
                        self.open(next_tag, crlf);
                        return Some(Err(malformed(open_line, "missing path comment")));
                    }
                    Marker::Text => {
                        let comment = trim_line_end(line);
                        let Some(rest) = comment.strip_prefix('#') else {
                            self.state = State::Discarding;
                            return Some(Err(malformed(
                                open_line,
                                format!("expected path comment, found '{}'", comment),
                            )));
                        };

                        let path = rest.trim();
                        if path.is_empty() {
                            self.state = State::Discarding;
                            return Some(Err(malformed(open_line, "empty path comment")));
                        }

                        self.state = State::CollectingContent {
                            open_line,
                            tag,
                            path: path.to_string(),
                            crlf: open_crlf,
                            content_start: self.offset,
                        };
                    }
                },

                State::CollectingContent {
                    open_line,
                    tag,
                    path,
                    crlf: open_crlf,
                    content_start,
                } => {
                    if marker == Marker::Bare {
                        let content = self.content(content_start, line_start, open_crlf);
                        return Some(Ok(LocatedBlock {
                            line: open_line,
                            block: FileBlock::new(path, tag, content),
                        }));
                    }

                    self.state = State::CollectingContent {
                        open_line,
                        tag,
                        path,
                        crlf: open_crlf,
                        content_start,
                    };
                }

                State::Discarding => match marker {
                    Marker::Bare => {}
                    Marker::Tagged(tag) => self.open(tag, crlf),
                    Marker::Text => self.state = State::Discarding,
                },
            }
        }
    }
}

impl std::iter::FusedIterator for BlockParser<'_> {}

/// Parses a whole document, splitting blocks from malformed-block errors.
pub fn parse_document(text: &str) -> (Vec<LocatedBlock>, Vec<CodeFenceError>) {
    let mut blocks = Vec::new();
    let mut errors = Vec::new();

    for item in BlockParser::new(text) {
        match item {
            Ok(block) => blocks.push(block),
            Err(err) => errors.push(err),
        }
    }

    (blocks, errors)
}
