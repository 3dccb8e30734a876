use crate::error::ParseErrorKind;
use crate::types::ContextLine;

pub const KEEP_PREFIX: &str = "  ";
pub const REMOVE_PREFIX: &str = "- ";
pub const ADD_PREFIX: &str = "+ ";

/// Classifies one line of a PATCH block. Blank and comment lines without a
/// prefix carry nothing and yield `None`.
pub fn parse_context_line(line: &str) -> Result<Option<ContextLine>, ParseErrorKind> {
    if let Some(text) = line.strip_prefix(ADD_PREFIX) {
        return Ok(Some(ContextLine::Add(text.to_string())));
    }
    if let Some(text) = line.strip_prefix(REMOVE_PREFIX) {
        return Ok(Some(ContextLine::Remove(text.to_string())));
    }
    if let Some(text) = line.strip_prefix(KEEP_PREFIX) {
        return Ok(Some(ContextLine::Keep(text.to_string())));
    }
    match line.trim_end() {
        "+" => return Ok(Some(ContextLine::Add(String::new()))),
        "-" => return Ok(Some(ContextLine::Remove(String::new()))),
        _ => {}
    }
    if super::is_insignificant(line) {
        return Ok(None);
    }
    Err(ParseErrorKind::MalformedContextLine(line.trim().to_string()))
}

pub fn render_context_line(line: &ContextLine) -> String {
    match line {
        ContextLine::Keep(text) => format!("{}{}", KEEP_PREFIX, text),
        ContextLine::Remove(text) => format!("{}{}", REMOVE_PREFIX, text),
        ContextLine::Add(text) => format!("{}{}", ADD_PREFIX, text),
    }
}
