//! Serializes a [`PatchDocument`] back into `.smalipatch` text.
//!
//! Every directive block is closed with an explicit `END` so the output does
//! not depend on which keyword happens to follow it.

use crate::parser::command_parser::quote;
use crate::parser::context_parser::render_context_line;
use crate::types::{Directive, FileEdit, PatchDocument, Target};
use std::path::Path;

pub fn render(document: &PatchDocument) -> String {
    let mut out: Vec<String> = Vec::new();

    for credit in &document.credits {
        out.push(format!("CREDIT {}", credit));
    }

    for edit in &document.edits {
        if !out.is_empty() {
            out.push(String::new());
        }
        render_edit(edit, &mut out);
    }

    if out.is_empty() {
        String::new()
    } else {
        out.join("\n") + "\n"
    }
}

fn render_edit(edit: &FileEdit, out: &mut Vec<String>) {
    let path = match &edit.target {
        Target::File(path) => display_path(path),
        Target::Tree => {
            for directive in &edit.directives {
                if let Directive::FindReplace { search, replace } = directive {
                    out.push(format!("FIND_REPLACE {} {}", quote(search), quote(replace)));
                }
            }
            return;
        }
    };

    match edit.directives.as_slice() {
        [Directive::CreateFile { content }] => {
            out.push(format!("CREATE {}", path));
            out.extend(content.lines().map(str::to_string));
            out.push("END".to_string());
        }
        [Directive::RemoveFile] => out.push(format!("REMOVE {}", path)),
        directives => {
            out.push(format!("FILE {}", path));
            for directive in directives {
                render_member(directive, out);
            }
            out.push("END".to_string());
        }
    }
}

fn render_member(directive: &Directive, out: &mut Vec<String>) {
    match directive {
        Directive::ReplaceMethod { signature, body } => {
            out.push(format!("REPLACE {}", signature));
            out.extend(body.iter().cloned());
            out.push("END".to_string());
        }
        Directive::PatchContext { signature, context } => {
            out.push(format!("PATCH {}", signature));
            out.extend(context.iter().map(render_context_line));
            out.push("END".to_string());
        }
        Directive::CreateMethod { lines } => {
            out.push("CREATE_METHOD".to_string());
            out.extend(lines.iter().cloned());
            out.push("END".to_string());
        }
        Directive::RemoveMethod { signature } => out.push(format!("REMOVE_METHOD {}", signature)),
        Directive::AddField { declaration } => {
            out.push("ADD_FIELD".to_string());
            out.push(declaration.clone());
        }
        Directive::RemoveField { name } => out.push(format!("REMOVE_FIELD {}", name)),
        Directive::CreateFile { .. } | Directive::RemoveFile | Directive::FindReplace { .. } => {}
    }
}

/// Patch documents always use `/` separators.
fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
