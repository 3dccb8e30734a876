use crate::error::{ApplyError, LocateError};
use crate::locator::{field_name, name_descriptor, Anchor, ClassLayout, MethodSpan};
use crate::matcher::{find_context, ContextSearch};
use crate::text::{collapse_whitespace, is_blank};
use crate::types::{ContextLine, Directive};
use log::debug;

/// Applies one member directive to the lines of a class file.
///
/// The input is never modified; on success the complete new line list is
/// returned, on failure the caller still holds the untouched original.
pub fn apply_to_lines(lines: &[String], directive: &Directive) -> Result<Vec<String>, ApplyError> {
    let layout = ClassLayout::scan(lines).map_err(structure_error)?;

    match directive {
        Directive::ReplaceMethod { signature, body } => {
            let span = locate_method(&layout, signature)?;
            if span.body(lines) == body.as_slice() {
                return Err(ApplyError::AlreadyApplied {
                    signature: signature.clone(),
                });
            }
            debug!(
                "replacing body of `{}` (lines {}..{})",
                span.declaration,
                span.start + 2,
                span.end
            );
            let mut out = lines[..=span.start].to_vec();
            out.extend(body.iter().cloned());
            out.extend_from_slice(&lines[span.end..]);
            Ok(out)
        }
        Directive::PatchContext { signature, context } => {
            let span = locate_method(&layout, signature)?;
            patch_context(lines, span, signature, context)
        }
        Directive::CreateMethod { lines: method } => {
            let declaration = method
                .first()
                .map(|l| collapse_whitespace(l))
                .ok_or_else(|| ApplyError::Malformed {
                    line: 0,
                    reason: "CREATE_METHOD text has no `.method` line".to_string(),
                })?;
            let key = name_descriptor(&declaration);
            if layout.methods.iter().any(|m| m.name_descriptor() == key) {
                return Err(ApplyError::MethodAlreadyExists {
                    signature: declaration,
                });
            }

            let at = layout.method_insertion_point();
            let mut insert = Vec::with_capacity(method.len() + 1);
            if at > 0 && !is_blank(&lines[at - 1]) {
                insert.push(String::new());
            }
            insert.extend(method.iter().cloned());
            debug!("inserting `{}` before line {}", declaration, at + 1);

            let mut out = lines.to_vec();
            out.splice(at..at, insert);
            Ok(out)
        }
        Directive::RemoveMethod { signature } => {
            let span = locate_method(&layout, signature)?;
            Ok(remove_span(lines, span.start, span.end))
        }
        Directive::AddField { declaration } => {
            let name = field_name(declaration).ok_or_else(|| ApplyError::Malformed {
                line: 0,
                reason: format!("`{}` is not a field declaration", declaration),
            })?;
            if layout.find_field(name).is_ok() {
                return Err(ApplyError::FieldAlreadyExists {
                    name: name.to_string(),
                });
            }

            let mut out = lines.to_vec();
            match layout.field_insertion_point().map_err(structure_error)? {
                Anchor::AfterLine(i) => {
                    out.splice(i + 1..i + 1, [String::new(), declaration.clone()]);
                }
                Anchor::BeforeLine(i) => {
                    out.splice(i..i, [declaration.clone(), String::new()]);
                }
            }
            Ok(out)
        }
        Directive::RemoveField { name } => {
            let span = layout.find_field(name).map_err(|e| {
                e.into_apply(name, || ApplyError::FieldNotFound { name: name.clone() })
            })?;
            Ok(remove_span(lines, span.start, span.end))
        }
        Directive::CreateFile { .. } | Directive::RemoveFile | Directive::FindReplace { .. } => {
            Err(ApplyError::Misplaced {
                keyword: directive.kind().keyword(),
                scope: "the inside of a class file",
            })
        }
    }
}

fn patch_context(
    lines: &[String],
    span: &MethodSpan,
    signature: &str,
    context: &[ContextLine],
) -> Result<Vec<String>, ApplyError> {
    let body = span.body(lines);
    let body_offset = span.start + 1;

    let at = match find_context(body, context) {
        ContextSearch::Unique(at) => at,
        ContextSearch::Ambiguous(starts) => {
            return Err(ApplyError::AmbiguousMatch {
                needle: format!("context in {}", signature),
                count: starts.len(),
            });
        }
        ContextSearch::Missing {
            context_index,
            body_index,
        } => {
            return Err(ApplyError::ContextNotFound {
                signature: signature.to_string(),
                context_line: context_index + 1,
                expected: context
                    .get(context_index)
                    .map(|c| c.text().to_string())
                    .unwrap_or_default(),
                line: body_offset + body_index + 1,
            });
        }
    };

    let mut replacement = Vec::with_capacity(context.len());
    let mut cursor = at;
    for entry in context {
        match entry {
            ContextLine::Keep(_) => {
                replacement.push(body[cursor].clone());
                cursor += 1;
            }
            ContextLine::Remove(_) => cursor += 1,
            ContextLine::Add(text) => replacement.push(text.clone()),
        }
    }

    let start = body_offset + at;
    let end = body_offset + cursor;
    debug!(
        "patching lines {}..={} of `{}`",
        start + 1,
        end,
        span.declaration
    );
    let mut out = lines.to_vec();
    out.splice(start..end, replacement);
    Ok(out)
}

fn locate_method<'a>(layout: &'a ClassLayout, signature: &str) -> Result<&'a MethodSpan, ApplyError> {
    layout.find_method(signature).map_err(|e| {
        e.into_apply(signature, || ApplyError::MethodNotFound {
            signature: signature.to_string(),
        })
    })
}

/// Deletes `start..=end` together with one adjacent blank separator line.
fn remove_span(lines: &[String], start: usize, end: usize) -> Vec<String> {
    let mut out = lines.to_vec();
    out.drain(start..=end);
    if start > 0 && is_blank(&out[start - 1]) {
        out.remove(start - 1);
    } else if start < out.len() && is_blank(&out[start]) {
        out.remove(start);
    }
    out
}

fn structure_error(err: LocateError) -> ApplyError {
    match err {
        LocateError::Malformed { line, reason } => ApplyError::Malformed { line, reason },
        other => ApplyError::Malformed {
            line: 0,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(str::to_string).collect()
    }

    fn owned(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    const CLASS: &str = r#".class public final Lcom/android/server/pm/SigUtil;
.super Ljava/lang/Object;
.source "SigUtil.java"


# static fields
.field private static final TAG:Ljava/lang/String; = "SigUtil"


# direct methods
.method public static getMinimumSignatureSchemeVersionForTargetSdk(I)I
    .registers 2

    const/16 v0, 0x1e

    if-lt p0, v0, :cond_5

    const/4 v0, 0x2

    return v0

    :cond_5
    const/4 v0, 0x1

    return v0
.end method

.method public static isEnabled()Z
    .registers 1

    const/4 v0, 0x0

    return v0
.end method
"#;

    #[test]
    fn test_replace_method_only_touches_body() {
        let src = lines(CLASS);
        let directive = Directive::ReplaceMethod {
            signature: "getMinimumSignatureSchemeVersionForTargetSdk(I)I".to_string(),
            body: owned(&["    const/4 v0, 0x1", "    return v0"]),
        };

        let out = apply_to_lines(&src, &directive).unwrap();
        let start = src
            .iter()
            .position(|l| l.contains("getMinimumSignatureSchemeVersionForTargetSdk"))
            .unwrap();
        let end = src.iter().position(|l| l == ".end method").unwrap();

        assert_eq!(&out[..=start], &src[..=start]);
        assert_eq!(out[start + 1], "    const/4 v0, 0x1");
        assert_eq!(out[start + 2], "    return v0");
        assert_eq!(&out[start + 3..], &src[end..]);
    }

    #[test]
    fn test_replace_twice_reports_already_applied() {
        let src = lines(CLASS);
        let directive = Directive::ReplaceMethod {
            signature: "isEnabled()Z".to_string(),
            body: owned(&["    const/4 v0, 0x1", "    return v0"]),
        };
        let once = apply_to_lines(&src, &directive).unwrap();
        assert!(matches!(
            apply_to_lines(&once, &directive),
            Err(ApplyError::AlreadyApplied { .. })
        ));
    }

    #[test]
    fn test_replace_missing_method() {
        let src = lines(CLASS);
        let directive = Directive::ReplaceMethod {
            signature: "missing()V".to_string(),
            body: owned(&["    return-void"]),
        };
        assert_eq!(
            apply_to_lines(&src, &directive),
            Err(ApplyError::MethodNotFound {
                signature: "missing()V".to_string()
            })
        );
    }

    #[test]
    fn test_patch_context_keep_remove_add() {
        let src = lines(CLASS);
        let directive = Directive::PatchContext {
            signature: ".method public static isEnabled()Z".to_string(),
            context: vec![
                ContextLine::Remove("    const/4 v0, 0x0".to_string()),
                ContextLine::Add("    const/4 v0, 0x1".to_string()),
                ContextLine::Keep(String::new()),
                ContextLine::Keep("    return v0".to_string()),
            ],
        };

        let out = apply_to_lines(&src, &directive).unwrap();
        assert_eq!(out.len(), src.len());
        let changed: Vec<usize> = (0..src.len()).filter(|&i| src[i] != out[i]).collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(out[changed[0]], "    const/4 v0, 0x1");

        let again = apply_to_lines(&out, &directive).unwrap_err();
        assert!(matches!(again, ApplyError::ContextNotFound { context_line: 1, .. }));
    }

    #[test]
    fn test_patch_context_insertion() {
        let src = lines(CLASS);
        let directive = Directive::PatchContext {
            signature: "isEnabled()Z".to_string(),
            context: vec![
                ContextLine::Keep("    .registers 1".to_string()),
                ContextLine::Add("    # patched".to_string()),
                ContextLine::Keep(String::new()),
            ],
        };
        let out = apply_to_lines(&src, &directive).unwrap();
        let at = out.iter().position(|l| l == "    # patched").unwrap();
        assert_eq!(out[at - 1], "    .registers 1");
        assert_eq!(out[at + 1], "");
        assert_eq!(out.len(), src.len() + 1);
    }

    #[test]
    fn test_patch_context_not_found_reports_position() {
        let src = lines(CLASS);
        let directive = Directive::PatchContext {
            signature: "isEnabled()Z".to_string(),
            context: vec![
                ContextLine::Keep("    const/4 v0, 0x0".to_string()),
                ContextLine::Keep("    return v0".to_string()),
            ],
        };
        let err = apply_to_lines(&src, &directive).unwrap_err();
        let const_line = src.iter().rposition(|l| l == "    const/4 v0, 0x0").unwrap();
        assert_eq!(
            err,
            ApplyError::ContextNotFound {
                signature: "isEnabled()Z".to_string(),
                context_line: 2,
                expected: "    return v0".to_string(),
                line: const_line + 2,
            }
        );
    }

    #[test]
    fn test_patch_context_add_only_fails() {
        let src = lines(CLASS);
        let directive = Directive::PatchContext {
            signature: "isEnabled()Z".to_string(),
            context: vec![ContextLine::Add("    nop".to_string())],
        };
        assert!(matches!(
            apply_to_lines(&src, &directive),
            Err(ApplyError::ContextNotFound { .. })
        ));
    }

    #[test]
    fn test_patch_context_ambiguous() {
        let src = lines(CLASS);
        let directive = Directive::PatchContext {
            signature: "getMinimumSignatureSchemeVersionForTargetSdk(I)I".to_string(),
            context: vec![
                ContextLine::Keep("    return v0".to_string()),
                ContextLine::Add("    nop".to_string()),
            ],
        };
        assert!(matches!(
            apply_to_lines(&src, &directive),
            Err(ApplyError::AmbiguousMatch { count: 2, .. })
        ));
    }

    #[test]
    fn test_create_and_remove_method_are_inverse() {
        let src = lines(CLASS);
        let create = Directive::CreateMethod {
            lines: owned(&[".method public static extra()V", "    return-void", ".end method"]),
        };
        let out = apply_to_lines(&src, &create).unwrap();
        assert_eq!(&out[out.len() - 4..], &owned(&["", ".method public static extra()V", "    return-void", ".end method"])[..]);

        assert_eq!(
            apply_to_lines(&out, &create),
            Err(ApplyError::MethodAlreadyExists {
                signature: ".method public static extra()V".to_string()
            })
        );

        let remove = Directive::RemoveMethod {
            signature: "extra()V".to_string(),
        };
        assert_eq!(apply_to_lines(&out, &remove).unwrap(), src);
    }

    #[test]
    fn test_create_method_before_end_class() {
        let src = lines(".class LA;\n.super Ljava/lang/Object;\n.end class");
        let create = Directive::CreateMethod {
            lines: owned(&[".method a()V", ".end method"]),
        };
        let out = apply_to_lines(&src, &create).unwrap();
        assert_eq!(
            out,
            owned(&[".class LA;", ".super Ljava/lang/Object;", "", ".method a()V", ".end method", ".end class"])
        );
    }

    #[test]
    fn test_add_field_then_duplicate_fails() {
        let src = lines(CLASS);
        let add = Directive::AddField {
            declaration: ".field private static sCount:I".to_string(),
        };
        let out = apply_to_lines(&src, &add).unwrap();
        let tag = out.iter().position(|l| l.starts_with(".field private static final TAG")).unwrap();
        assert_eq!(out[tag + 1], "");
        assert_eq!(out[tag + 2], ".field private static sCount:I");

        assert_eq!(
            apply_to_lines(&out, &add),
            Err(ApplyError::FieldAlreadyExists {
                name: "sCount".to_string()
            })
        );

        let remove = Directive::RemoveField {
            name: "sCount".to_string(),
        };
        assert_eq!(apply_to_lines(&out, &remove).unwrap(), src);
    }

    #[test]
    fn test_add_field_without_fields_goes_before_first_method() {
        let src = lines(".class LA;\n.super Ljava/lang/Object;\n\n.method a()V\n.end method");
        let add = Directive::AddField {
            declaration: ".field public x:I".to_string(),
        };
        let out = apply_to_lines(&src, &add).unwrap();
        assert_eq!(out[3], ".field public x:I");
        assert_eq!(out[4], "");
        assert_eq!(out[5], ".method a()V");
    }

    #[test]
    fn test_remove_field_missing() {
        let src = lines(CLASS);
        assert_eq!(
            apply_to_lines(&src, &Directive::RemoveField { name: "nope".to_string() }),
            Err(ApplyError::FieldNotFound {
                name: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_file_directives_are_misplaced() {
        let src = lines(CLASS);
        assert!(matches!(
            apply_to_lines(&src, &Directive::RemoveFile),
            Err(ApplyError::Misplaced { keyword: "REMOVE", .. })
        ));
    }
}
