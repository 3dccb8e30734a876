/// A file split into lines, remembering how to put it back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub lines: Vec<String>,
    crlf: bool,
    trailing_newline: bool,
}

impl SourceText {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
            crlf: content.contains("\r\n"),
            trailing_newline: content.ends_with('\n'),
        }
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            crlf: false,
            trailing_newline: true,
        }
    }

    pub fn render(&self) -> String {
        let eol = if self.crlf { "\r\n" } else { "\n" };
        let mut out = self.lines.join(eol);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(eol);
        }
        out
    }
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Collapses runs of whitespace and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
