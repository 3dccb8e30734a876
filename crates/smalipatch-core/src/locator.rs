//! Maps methods and fields of a smali class to line spans.
//!
//! Signatures are opaque: the only normalization applied is collapsing
//! whitespace. A query matches a method when it equals the whole declaration
//! line (`.method public foo(I)V`), the declaration without the `.method`
//! keyword (`public foo(I)V`) or the trailing name+descriptor (`foo(I)V`).

use crate::error::LocateError;
use crate::text::collapse_whitespace;
use log::trace;

pub const METHOD_START: &str = ".method";
pub const METHOD_END: &str = ".end method";
pub const FIELD_START: &str = ".field";
pub const FIELD_END: &str = ".end field";
pub const CLASS_START: &str = ".class";
pub const CLASS_END: &str = ".end class";
pub const SUPER: &str = ".super";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpan {
    /// Whitespace-collapsed `.method` line.
    pub declaration: String,
    pub start: usize,
    /// Index of the `.end method` line.
    pub end: usize,
}

impl MethodSpan {
    pub fn name_descriptor(&self) -> &str {
        name_descriptor(&self.declaration)
    }

    pub fn body<'a>(&self, lines: &'a [String]) -> &'a [String] {
        &lines[self.start + 1..self.end]
    }

    pub fn text<'a>(&self, lines: &'a [String]) -> &'a [String] {
        &lines[self.start..=self.end]
    }

    pub fn matches(&self, query: &str) -> bool {
        matches_signature(&self.declaration, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpan {
    pub name: String,
    /// Trimmed `.field` line.
    pub declaration: String,
    pub start: usize,
    /// Last line of the field; equals `start` unless the field carries
    /// annotations closed by `.end field`.
    pub end: usize,
}

/// Where new content goes relative to an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    AfterLine(usize),
    BeforeLine(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassLayout {
    pub class_line: Option<usize>,
    pub super_line: Option<usize>,
    pub end_class: Option<usize>,
    pub methods: Vec<MethodSpan>,
    pub fields: Vec<FieldSpan>,
    /// First line of the `#` comment run directly above the first method,
    /// or the first method itself.
    methods_header: Option<usize>,
    line_count: usize,
}

impl ClassLayout {
    pub fn scan(lines: &[String]) -> Result<Self, LocateError> {
        let mut layout = ClassLayout {
            line_count: lines.len(),
            ..Default::default()
        };

        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();
            match trimmed.split_whitespace().next().unwrap_or("") {
                CLASS_START if layout.class_line.is_none() => layout.class_line = Some(i),
                SUPER if layout.super_line.is_none() => layout.super_line = Some(i),
                METHOD_START => {
                    let end = method_end(lines, i)?;
                    let declaration = collapse_whitespace(trimmed);
                    if layout.methods.iter().any(|m| m.declaration == declaration) {
                        return Err(LocateError::Malformed {
                            line: i + 1,
                            reason: format!("duplicate method `{}`", declaration),
                        });
                    }
                    trace!("method `{}` spans lines {}..={}", declaration, i + 1, end + 1);
                    if layout.methods_header.is_none() {
                        layout.methods_header = Some(comment_run_start(lines, i));
                    }
                    layout.methods.push(MethodSpan {
                        declaration,
                        start: i,
                        end,
                    });
                    i = end;
                }
                FIELD_START => {
                    let name = field_name(trimmed).ok_or_else(|| LocateError::Malformed {
                        line: i + 1,
                        reason: "field declaration has no name".to_string(),
                    })?;
                    if layout.fields.iter().any(|f| f.name == name) {
                        return Err(LocateError::Malformed {
                            line: i + 1,
                            reason: format!("duplicate field `{}`", name),
                        });
                    }
                    let end = field_end(lines, i);
                    trace!("field `{}` spans lines {}..={}", name, i + 1, end + 1);
                    layout.fields.push(FieldSpan {
                        name: name.to_string(),
                        declaration: trimmed.to_string(),
                        start: i,
                        end,
                    });
                    i = end;
                }
                _ if trimmed == CLASS_END => layout.end_class = Some(i),
                _ => {}
            }
            i += 1;
        }

        Ok(layout)
    }

    pub fn find_method(&self, query: &str) -> Result<&MethodSpan, LocateError> {
        let found: Vec<&MethodSpan> = self.methods.iter().filter(|m| m.matches(query)).collect();
        match found.as_slice() {
            [] => Err(LocateError::NotFound),
            [one] => Ok(one),
            many => Err(LocateError::Ambiguous(many.len())),
        }
    }

    pub fn find_field(&self, name: &str) -> Result<&FieldSpan, LocateError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or(LocateError::NotFound)
    }

    pub fn field_insertion_point(&self) -> Result<Anchor, LocateError> {
        if let Some(last) = self.fields.last() {
            Ok(Anchor::AfterLine(last.end))
        } else if let Some(header) = self.methods_header {
            Ok(Anchor::BeforeLine(header))
        } else if let Some(line) = self.super_line.or(self.class_line) {
            Ok(Anchor::AfterLine(line))
        } else {
            Err(LocateError::Malformed {
                line: 1,
                reason: "no .class declaration".to_string(),
            })
        }
    }

    /// Index new methods are inserted at: the `.end class` line, or the end
    /// of the file when the class has no terminal marker.
    pub fn method_insertion_point(&self) -> usize {
        self.end_class.unwrap_or(self.line_count)
    }
}

pub fn matches_signature(declaration: &str, query: &str) -> bool {
    let query = collapse_whitespace(query);
    query == declaration
        || declaration
            .strip_prefix(METHOD_START)
            .is_some_and(|rest| rest.trim_start() == query)
        || name_descriptor(declaration) == query
}

pub fn name_descriptor(declaration: &str) -> &str {
    declaration.rsplit(' ').next().unwrap_or(declaration)
}

/// `.field private static final TAG:Ljava/lang/String; = "x"` -> `TAG`
pub fn field_name(declaration: &str) -> Option<&str> {
    declaration
        .trim()
        .strip_prefix(FIELD_START)?
        .split_whitespace()
        .find(|token| token.contains(':'))
        .and_then(|token| token.split(':').next())
        .filter(|name| !name.is_empty())
}

fn method_end(lines: &[String], start: usize) -> Result<usize, LocateError> {
    for (j, line) in lines.iter().enumerate().skip(start + 1) {
        let trimmed = line.trim();
        if trimmed == METHOD_END {
            return Ok(j);
        }
        if trimmed.split_whitespace().next() == Some(METHOD_START) {
            break;
        }
    }
    Err(LocateError::Malformed {
        line: start + 1,
        reason: "method is missing `.end method`".to_string(),
    })
}

fn comment_run_start(lines: &[String], mut line: usize) -> usize {
    while line > 0 && lines[line - 1].trim_start().starts_with('#') {
        line -= 1;
    }
    line
}

fn field_end(lines: &[String], start: usize) -> usize {
    for (j, line) in lines.iter().enumerate().skip(start + 1) {
        let trimmed = line.trim();
        if trimmed == FIELD_END {
            return j;
        }
        if !trimmed.is_empty() && !line.starts_with(char::is_whitespace) {
            break;
        }
    }
    start
}
