pub mod command_parser;
pub mod context_parser;

use crate::error::{ParseError, ParseErrorKind};
use crate::locator::{self, FIELD_START, METHOD_END, METHOD_START};
use crate::text::is_blank;
use crate::types::{ContextLine, Directive, FileEdit, PatchDocument};
use command_parser::Keyword;
use log::{debug, trace};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Parses a `.smalipatch` document.
///
/// The scan is a single pass over the lines. All state lives in an
/// [`Accumulator`]; the document is handed out only once every line was
/// accepted, so a malformed document never yields partial directives.
pub fn parse(content: &str) -> Result<PatchDocument, ParseError> {
    let mut acc = Accumulator::default();
    for (idx, line) in content.lines().enumerate() {
        acc.feed(idx + 1, line)?;
    }
    let document = acc.finish()?;
    debug!(
        "parsed {} block(s) with {} directive(s)",
        document.edits.len(),
        document.directive_count()
    );
    Ok(document)
}

pub(crate) fn is_insignificant(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//")
}

struct OpenFile {
    line: usize,
    path: PathBuf,
    directives: Vec<Directive>,
}

enum OpenBlock {
    Replace {
        line: usize,
        signature: String,
        body: Vec<String>,
    },
    Patch {
        line: usize,
        signature: String,
        context: Vec<ContextLine>,
    },
    CreateMethod {
        line: usize,
        lines: Vec<String>,
    },
    AddField {
        line: usize,
    },
    CreateFile {
        path: PathBuf,
        content: Vec<String>,
    },
}

#[derive(Default)]
struct Accumulator {
    document: PatchDocument,
    file: Option<OpenFile>,
    block: Option<OpenBlock>,
    paths: HashMap<PathBuf, usize>,
}

impl Accumulator {
    fn feed(&mut self, line_no: usize, line: &str) -> Result<(), ParseError> {
        let keyword = command_parser::split_keyword(line);

        if self.block.is_some() {
            if keyword.is_none() {
                return self.absorb(line_no, line);
            }
            let explicit_end = matches!(keyword, Some((Keyword::End, _)));
            self.close_block(explicit_end)?;
            if explicit_end {
                trace!("line {}: END closes directive block", line_no);
                return Ok(());
            }
        }

        if is_insignificant(line) {
            return Ok(());
        }

        match keyword {
            Some((keyword, rest)) => {
                if keyword.closes_file() {
                    if keyword == Keyword::End && self.file.is_none() {
                        return Err(ParseError::new(line_no, ParseErrorKind::UnexpectedEnd));
                    }
                    self.close_file()?;
                }
                self.dispatch(line_no, keyword, rest)
                    .map_err(|kind| ParseError::new(line_no, kind))
            }
            None => Err(ParseError::new(
                line_no,
                ParseErrorKind::UnknownKeyword(
                    line.split_whitespace().next().unwrap_or_default().to_string(),
                ),
            )),
        }
    }

    /// Content line of the open directive block.
    fn absorb(&mut self, line_no: usize, line: &str) -> Result<(), ParseError> {
        if matches!(self.block, Some(OpenBlock::AddField { .. })) {
            if is_insignificant(line) {
                return Ok(());
            }
            let declaration = field_declaration(line)
                .ok_or_else(|| ParseError::new(line_no, missing_field_declaration()))?;
            self.block = None;
            self.push_directive(Directive::AddField { declaration });
            return Ok(());
        }

        match &mut self.block {
            Some(OpenBlock::Replace { body, .. })
            | Some(OpenBlock::CreateMethod { lines: body, .. })
            | Some(OpenBlock::CreateFile { content: body, .. }) => body.push(line.to_string()),
            Some(OpenBlock::Patch { context, .. }) => {
                let entry = context_parser::parse_context_line(line)
                    .map_err(|kind| ParseError::new(line_no, kind))?;
                context.extend(entry);
            }
            Some(OpenBlock::AddField { .. }) | None => {}
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        line_no: usize,
        keyword: Keyword,
        rest: &str,
    ) -> Result<(), ParseErrorKind> {
        match keyword {
            Keyword::Credit => {
                if self.file.is_some() || !self.document.edits.is_empty() {
                    return Err(ParseErrorKind::CreditAfterEdits);
                }
                self.document.credits.push(rest.to_string());
            }
            Keyword::File => {
                let path = command_parser::parse_path(rest, keyword)?;
                self.claim_path(&path, line_no)?;
                self.file = Some(OpenFile {
                    line: line_no,
                    path,
                    directives: Vec::new(),
                });
            }
            Keyword::Create => {
                let path = command_parser::parse_path(rest, keyword)?;
                self.claim_path(&path, line_no)?;
                self.block = Some(OpenBlock::CreateFile {
                    path,
                    content: Vec::new(),
                });
            }
            Keyword::Remove => {
                let path = command_parser::parse_path(rest, keyword)?;
                self.claim_path(&path, line_no)?;
                self.document
                    .edits
                    .push(FileEdit::file(path, vec![Directive::RemoveFile]));
            }
            Keyword::FindReplace => {
                let (search, replace) = command_parser::parse_find_replace(rest)?;
                self.document
                    .edits
                    .push(FileEdit::tree(Directive::FindReplace { search, replace }));
            }
            Keyword::End => {}
            Keyword::Replace => {
                self.require_file(keyword)?;
                let signature = command_parser::require_arg(rest, keyword, "a method signature")?;
                self.block = Some(OpenBlock::Replace {
                    line: line_no,
                    signature: signature.to_string(),
                    body: Vec::new(),
                });
            }
            Keyword::Patch => {
                self.require_file(keyword)?;
                let signature = command_parser::require_arg(rest, keyword, "a method signature")?;
                self.block = Some(OpenBlock::Patch {
                    line: line_no,
                    signature: signature.to_string(),
                    context: Vec::new(),
                });
            }
            Keyword::CreateMethod => {
                self.require_file(keyword)?;
                let mut lines = Vec::new();
                if !rest.is_empty() {
                    lines.push(rest.to_string());
                }
                self.block = Some(OpenBlock::CreateMethod {
                    line: line_no,
                    lines,
                });
            }
            Keyword::RemoveMethod => {
                self.require_file(keyword)?;
                let signature = command_parser::require_arg(rest, keyword, "a method signature")?;
                self.push_directive(Directive::RemoveMethod {
                    signature: signature.to_string(),
                });
            }
            Keyword::AddField => {
                self.require_file(keyword)?;
                if rest.is_empty() {
                    self.block = Some(OpenBlock::AddField { line: line_no });
                } else {
                    let declaration = field_declaration(rest).ok_or_else(missing_field_declaration)?;
                    self.push_directive(Directive::AddField { declaration });
                }
            }
            Keyword::RemoveField => {
                self.require_file(keyword)?;
                let arg = command_parser::require_arg(rest, keyword, "a field name")?;
                let name = if arg.starts_with(FIELD_START) {
                    locator::field_name(arg).ok_or(ParseErrorKind::MissingArgument {
                        keyword: keyword.as_str(),
                        what: "a field name",
                    })?
                } else {
                    arg
                };
                self.push_directive(Directive::RemoveField {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// `explicit_end` is set when an `END` line closes the block, which is
    /// the only way to give REPLACE an empty body.
    fn close_block(&mut self, explicit_end: bool) -> Result<(), ParseError> {
        let Some(block) = self.block.take() else {
            return Ok(());
        };

        match block {
            OpenBlock::Replace {
                line,
                signature,
                body,
            } => {
                if !explicit_end && body.iter().all(|l| is_blank(l)) {
                    return Err(ParseError::new(
                        line,
                        ParseErrorKind::MissingBlock {
                            keyword: "REPLACE",
                            what: "method body",
                        },
                    ));
                }
                self.push_directive(Directive::ReplaceMethod { signature, body });
            }
            OpenBlock::Patch {
                line,
                signature,
                context,
            } => {
                if context.is_empty() {
                    return Err(ParseError::new(
                        line,
                        ParseErrorKind::MissingBlock {
                            keyword: "PATCH",
                            what: "context lines",
                        },
                    ));
                }
                self.push_directive(Directive::PatchContext { signature, context });
            }
            OpenBlock::CreateMethod { line, lines } => {
                let lines = trim_blank_edges(lines);
                let starts = lines
                    .first()
                    .is_some_and(|l| l.trim().split_whitespace().next() == Some(METHOD_START));
                if !starts {
                    return Err(ParseError::new(
                        line,
                        ParseErrorKind::MissingBlock {
                            keyword: "CREATE_METHOD",
                            what: "`.method` declaration",
                        },
                    ));
                }
                if lines.last().map(|l| l.trim()) != Some(METHOD_END) {
                    return Err(ParseError::new(
                        line,
                        ParseErrorKind::Unterminated {
                            keyword: "CREATE_METHOD",
                            reason: "method text must end with `.end method`",
                        },
                    ));
                }
                self.push_directive(Directive::CreateMethod { lines });
            }
            OpenBlock::AddField { line } => {
                return Err(ParseError::new(line, missing_field_declaration()));
            }
            OpenBlock::CreateFile { path, content } => {
                let content = if content.is_empty() {
                    String::new()
                } else {
                    content.join("\n") + "\n"
                };
                self.document
                    .edits
                    .push(FileEdit::file(path, vec![Directive::CreateFile { content }]));
            }
        }
        Ok(())
    }

    fn close_file(&mut self) -> Result<(), ParseError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if file.directives.is_empty() {
            return Err(ParseError::new(
                file.line,
                ParseErrorKind::MissingBlock {
                    keyword: "FILE",
                    what: "directives",
                },
            ));
        }
        trace!(
            "FILE {} closed with {} directive(s)",
            file.path.display(),
            file.directives.len()
        );
        self.document
            .edits
            .push(FileEdit::file(file.path, file.directives));
        Ok(())
    }

    fn finish(mut self) -> Result<PatchDocument, ParseError> {
        self.close_block(false)?;
        self.close_file()?;
        Ok(self.document)
    }

    fn require_file(&self, keyword: Keyword) -> Result<(), ParseErrorKind> {
        if self.file.is_some() {
            Ok(())
        } else {
            Err(ParseErrorKind::DirectiveOutsideFile(keyword.as_str()))
        }
    }

    fn claim_path(&mut self, path: &Path, line_no: usize) -> Result<(), ParseErrorKind> {
        if let Some(&first_line) = self.paths.get(path) {
            return Err(ParseErrorKind::DuplicatePath {
                path: path.display().to_string(),
                first_line,
            });
        }
        self.paths.insert(path.to_path_buf(), line_no);
        Ok(())
    }

    fn push_directive(&mut self, directive: Directive) {
        if let Some(file) = self.file.as_mut() {
            file.directives.push(directive);
        }
    }
}

fn field_declaration(line: &str) -> Option<String> {
    let trimmed = line.trim();
    locator::field_name(trimmed).map(|_| trimmed.to_string())
}

fn missing_field_declaration() -> ParseErrorKind {
    ParseErrorKind::MissingBlock {
        keyword: "ADD_FIELD",
        what: "`.field` declaration",
    }
}

fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| is_blank(l)) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| is_blank(l)).count();
    lines.drain(..leading);
    lines
}
