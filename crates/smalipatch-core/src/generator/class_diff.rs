use super::{survives_render, GenerateWarning};
use crate::error::GenerateError;
use crate::locator::{ClassLayout, FieldSpan, MethodSpan};
use crate::operations::apply_to_lines;
use crate::text::SourceText;
use crate::types::{Directive, FileEdit};
use log::{debug, trace};
use std::path::Path;

/// Directives turning one version of a class into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub directives: Vec<Directive>,
    /// Set when replaying `directives` on the old text does not reproduce
    /// the new text exactly.
    pub warning: Option<GenerateWarning>,
}

/// Compares two versions of a class member by member.
///
/// Fields are keyed by name and methods by their declaration line, so a
/// changed modifier shows up as a removal plus an addition. Method bodies are
/// compared whole; a difference produces a `REPLACE`, never a `PATCH`.
pub fn diff_file(path: &Path, old: &str, new: &str) -> Result<FileDiff, GenerateError> {
    let old_text = SourceText::parse(old);
    let new_text = SourceText::parse(new);
    let old_layout = scan(path, &old_text)?;
    let new_layout = scan(path, &new_text)?;

    let mut directives = Vec::new();

    for field in &old_layout.fields {
        if !same_field(field, new_layout.find_field(&field.name).ok()) {
            directives.push(Directive::RemoveField {
                name: field.name.clone(),
            });
        }
    }
    for field in &new_layout.fields {
        if !same_field(field, old_layout.find_field(&field.name).ok()) {
            directives.push(Directive::AddField {
                declaration: field.declaration.clone(),
            });
        }
    }

    for method in &old_layout.methods {
        if find_declared(&new_layout, &method.declaration).is_none() {
            directives.push(Directive::RemoveMethod {
                signature: method.declaration.clone(),
            });
        }
    }
    for method in &new_layout.methods {
        if find_declared(&old_layout, &method.declaration).is_none() {
            directives.push(Directive::CreateMethod {
                lines: method.text(&new_text.lines).to_vec(),
            });
        }
    }
    for method in &new_layout.methods {
        if let Some(before) = find_declared(&old_layout, &method.declaration) {
            let old_body = before.body(&old_text.lines);
            let new_body = method.body(&new_text.lines);
            if old_body != new_body {
                trace!("body of `{}` changed", method.declaration);
                directives.push(Directive::ReplaceMethod {
                    signature: method.declaration.clone(),
                    body: new_body.to_vec(),
                });
            }
        }
    }

    debug!("{}: {} directive(s)", path.display(), directives.len());
    let warning = verify(path, &old_text, new, &directives);
    Ok(FileDiff {
        directives,
        warning,
    })
}

fn scan(path: &Path, text: &SourceText) -> Result<ClassLayout, GenerateError> {
    ClassLayout::scan(&text.lines).map_err(|source| GenerateError::Structure {
        path: path.to_path_buf(),
        source,
    })
}

fn same_field(field: &FieldSpan, other: Option<&FieldSpan>) -> bool {
    other.is_some_and(|o| o.declaration == field.declaration)
}

fn find_declared<'a>(layout: &'a ClassLayout, declaration: &str) -> Option<&'a MethodSpan> {
    layout.methods.iter().find(|m| m.declaration == declaration)
}

fn verify(path: &Path, old: &SourceText, new: &str, directives: &[Directive]) -> Option<GenerateWarning> {
    if directives.is_empty() {
        return Some(GenerateWarning::new(
            path,
            "content differs outside methods and fields; no directives emitted",
        ));
    }

    let mut lines = old.lines.clone();
    for directive in directives {
        match apply_to_lines(&lines, directive) {
            Ok(next) => lines = next,
            Err(e) => {
                return Some(GenerateWarning::new(
                    path,
                    format!("{} {} does not replay: {}", directive.kind(), directive.subject(), e),
                ));
            }
        }
    }

    let mut replayed = old.clone();
    replayed.lines = lines;
    if replayed.render() != new {
        return Some(GenerateWarning::new(
            path,
            "replaying the directives does not reproduce the new file exactly (header, member order or spacing changed)",
        ));
    }

    if survives_render(&FileEdit::file(path, directives.to_vec())) {
        None
    } else {
        Some(GenerateWarning::new(
            path,
            "directives change when written as .smalipatch text",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = ".class public Lcom/example/Widget;
.super Ljava/lang/Object;
.source \"Widget.java\"


# instance fields
.field private count:I

.field private name:Ljava/lang/String;


# virtual methods
.method public foo()V
    .registers 1

    return-void
.end method

.method public keep()I
    .registers 2

    const/4 v0, 0x0

    return v0
.end method
";

    const NEW: &str = ".class public Lcom/example/Widget;
.super Ljava/lang/Object;
.source \"Widget.java\"


# instance fields
.field private count:I

.field private name:Ljava/lang/String;


# virtual methods
.method public keep()I
    .registers 2

    const/4 v0, 0x0

    return v0
.end method

.method public bar()V
    .registers 1

    return-void
.end method
";

    #[test]
    fn test_foo_removed_bar_added() {
        let diff = diff_file(Path::new("Widget.smali"), OLD, NEW).unwrap();

        assert_eq!(
            diff.directives,
            vec![
                Directive::RemoveMethod {
                    signature: ".method public foo()V".to_string()
                },
                Directive::CreateMethod {
                    lines: vec![
                        ".method public bar()V".to_string(),
                        "    .registers 1".to_string(),
                        String::new(),
                        "    return-void".to_string(),
                        ".end method".to_string(),
                    ]
                },
            ]
        );
        assert_eq!(diff.warning, None);

        let mut lines = SourceText::parse(OLD);
        for directive in &diff.directives {
            lines.lines = apply_to_lines(&lines.lines, directive).unwrap();
        }
        assert_eq!(lines.render(), NEW);
    }

    #[test]
    fn test_emission_order_and_replace() {
        let new = OLD
            .replace(".field private count:I", ".field private count:J")
            .replace("const/4 v0, 0x0", "const/4 v0, 0x1");
        let diff = diff_file(Path::new("Widget.smali"), OLD, &new).unwrap();

        let kinds: Vec<&str> = diff.directives.iter().map(|d| d.kind().keyword()).collect();
        assert_eq!(kinds, vec!["REMOVE_FIELD", "ADD_FIELD", "REPLACE"]);
        assert_eq!(
            diff.directives[2],
            Directive::ReplaceMethod {
                signature: ".method public keep()I".to_string(),
                body: vec![
                    "    .registers 2".to_string(),
                    String::new(),
                    "    const/4 v0, 0x1".to_string(),
                    String::new(),
                    "    return v0".to_string(),
                ],
            }
        );
        // the re-added field lands after `name`, so the bytes differ
        assert!(diff.warning.is_some());
    }

    #[test]
    fn test_emptied_method_body_renders_and_parses() {
        let old = ".class LA;\n.super Ljava/lang/Object;\n\n.method public a()V\n\n.end method\n";
        let new = ".class LA;\n.super Ljava/lang/Object;\n\n.method public a()V\n.end method\n";
        let diff = diff_file(Path::new("A.smali"), old, new).unwrap();

        assert_eq!(
            diff.directives,
            vec![Directive::ReplaceMethod {
                signature: ".method public a()V".to_string(),
                body: Vec::new(),
            }]
        );
        assert_eq!(diff.warning, None);

        let document = crate::types::PatchDocument {
            credits: Vec::new(),
            edits: vec![FileEdit::file("A.smali", diff.directives)],
        };
        let text = crate::writer::render(&document);
        assert_eq!(text, "FILE A.smali\nREPLACE .method public a()V\nEND\nEND\n");
        assert_eq!(crate::parser::parse(&text).unwrap(), document);
    }

    #[test]
    fn test_header_only_change_warns() {
        let new = OLD.replace(".source \"Widget.java\"", ".source \"W.java\"");
        let diff = diff_file(Path::new("Widget.smali"), OLD, &new).unwrap();
        assert!(diff.directives.is_empty());
        assert!(diff.warning.is_some());
    }

    #[test]
    fn test_unterminated_method_is_structure_error() {
        let broken = ".class LA;\n.method a()V\n";
        assert!(matches!(
            diff_file(Path::new("A.smali"), broken, OLD),
            Err(GenerateError::Structure { .. })
        ));
    }
}
