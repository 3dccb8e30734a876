//! Applies a parsed [`PatchDocument`] to a [`WorkTree`].

pub mod file_operations;
pub mod patch_applicator;

pub use file_operations::{DiskTree, MemoryTree, OverlayTree, WorkTree};
pub use patch_applicator::apply_to_lines;

use crate::error::ApplyError;
use crate::text::SourceText;
use crate::types::{Directive, DirectiveKind, PatchDocument, Target};
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Record failures and keep going instead of stopping at the first one.
    pub skip_failed: bool,
    /// Compute every outcome without writing anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveOutcome {
    /// 1-based index of the block within the document.
    pub block: usize,
    pub kind: DirectiveKind,
    pub subject: String,
    pub target: Target,
    pub error: Option<ApplyError>,
}

impl DirectiveOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One file mutation. `before` is `None` for created files, `after` is `None`
/// for removed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcomes: Vec<DirectiveOutcome>,
    pub changes: Vec<FileChange>,
    /// Set when a failure stopped the run before every block was attempted.
    pub aborted: bool,
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed() == 0
    }

    fn record(&mut self, block: usize, target: &Target, directive: &Directive, error: Option<ApplyError>) {
        match &error {
            None => debug!("block {}: {} {} ok", block, directive.kind(), directive.subject()),
            Some(e) => debug!("block {}: {} {} failed: {}", block, directive.kind(), directive.subject(), e),
        }
        self.outcomes.push(DirectiveOutcome {
            block,
            kind: directive.kind(),
            subject: directive.subject(),
            target: target.clone(),
            error,
        });
    }
}

pub fn apply_document(document: &PatchDocument, tree: &mut dyn WorkTree, options: ApplyOptions) -> ApplyReport {
    if options.dry_run {
        let mut overlay = OverlayTree::new(&*tree);
        run(document, &mut overlay, options)
    } else {
        run(document, tree, options)
    }
}

fn run(document: &PatchDocument, tree: &mut dyn WorkTree, options: ApplyOptions) -> ApplyReport {
    let mut report = ApplyReport::default();

    for (index, edit) in document.edits.iter().enumerate() {
        let block = index + 1;
        let first = report.outcomes.len();

        match &edit.target {
            Target::File(path) => match edit.directives.as_slice() {
                [Directive::CreateFile { content }] => {
                    let result = create_file(path, content, tree, &mut report);
                    report.record(block, &edit.target, &edit.directives[0], result.err());
                }
                [Directive::RemoveFile] => {
                    let result = remove_file(path, tree, &mut report);
                    report.record(block, &edit.target, &edit.directives[0], result.err());
                }
                directives => apply_file_edit(block, path, directives, tree, options, &mut report),
            },
            Target::Tree => {
                for directive in &edit.directives {
                    let result = match directive {
                        Directive::FindReplace { search, replace } => {
                            find_replace(search, replace, tree, &mut report)
                        }
                        other => Err(ApplyError::Misplaced {
                            keyword: other.kind().keyword(),
                            scope: "the whole work tree",
                        }),
                    };
                    let failed = result.is_err();
                    report.record(block, &edit.target, directive, result.err());
                    if failed && !options.skip_failed {
                        break;
                    }
                }
            }
        }

        let block_failed = report.outcomes[first..].iter().any(|o| !o.is_success());
        if block_failed && !options.skip_failed {
            if index + 1 < document.edits.len() {
                report.aborted = true;
            }
            warn!("stopping after failure in block {} ({})", block, edit.target);
            break;
        }
    }

    report
}

/// Reads the class once, applies every directive in memory and writes the
/// result back once.
fn apply_file_edit(
    block: usize,
    path: &Path,
    directives: &[Directive],
    tree: &mut dyn WorkTree,
    options: ApplyOptions,
    report: &mut ApplyReport,
) {
    let target = Target::File(path.to_path_buf());

    let original = match tree.read(path) {
        Ok(content) => content,
        Err(e) => {
            let err = if e.kind() == io::ErrorKind::NotFound {
                ApplyError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ApplyError::io(path, &e)
            };
            for directive in directives {
                report.record(block, &target, directive, Some(err.clone()));
                if !options.skip_failed {
                    break;
                }
            }
            return;
        }
    };

    let first = report.outcomes.len();
    let mut text = SourceText::parse(&original);
    for directive in directives {
        let result = if directive.is_member_edit() {
            apply_to_lines(&text.lines, directive)
        } else {
            Err(ApplyError::Misplaced {
                keyword: directive.kind().keyword(),
                scope: "a FILE block",
            })
        };
        match result {
            Ok(lines) => {
                text.lines = lines;
                report.record(block, &target, directive, None);
            }
            Err(e) => {
                report.record(block, &target, directive, Some(e));
                if !options.skip_failed {
                    break;
                }
            }
        }
    }

    let updated = text.render();
    if updated == original {
        return;
    }
    if let Err(e) = tree.write(path, &updated) {
        let err = ApplyError::io(path, &e);
        for outcome in report.outcomes[first..].iter_mut().filter(|o| o.is_success()) {
            outcome.error = Some(err.clone());
        }
        return;
    }
    report.changes.push(FileChange {
        path: path.to_path_buf(),
        before: Some(original),
        after: Some(updated),
    });
}

fn create_file(path: &Path, content: &str, tree: &mut dyn WorkTree, report: &mut ApplyReport) -> Result<(), ApplyError> {
    if tree.exists(path) {
        return Err(ApplyError::FileAlreadyExists {
            path: path.to_path_buf(),
        });
    }
    tree.write(path, content).map_err(|e| ApplyError::io(path, &e))?;
    report.changes.push(FileChange {
        path: path.to_path_buf(),
        before: None,
        after: Some(content.to_string()),
    });
    Ok(())
}

fn remove_file(path: &Path, tree: &mut dyn WorkTree, report: &mut ApplyReport) -> Result<(), ApplyError> {
    if !tree.exists(path) {
        return Err(ApplyError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let before = tree.read(path).ok();
    tree.remove(path).map_err(|e| ApplyError::io(path, &e))?;
    report.changes.push(FileChange {
        path: path.to_path_buf(),
        before,
        after: None,
    });
    Ok(())
}

/// Replaces the single occurrence of `search` in the whole tree.
fn find_replace(
    search: &str,
    replace: &str,
    tree: &mut dyn WorkTree,
    report: &mut ApplyReport,
) -> Result<(), ApplyError> {
    let files = tree.list_files().map_err(|e| ApplyError::io(".", &e))?;

    let mut count = 0;
    let mut hit: Option<(PathBuf, String)> = None;
    for path in files {
        let content = match tree.read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("skipping {}: not valid UTF-8", path.display());
                continue;
            }
            Err(e) => return Err(ApplyError::io(&path, &e)),
        };
        let occurrences = count_occurrences(&content, search);
        if occurrences > 0 {
            debug!("{} occurrence(s) of {:?} in {}", occurrences, search, path.display());
            count += occurrences;
            hit = Some((path, content));
        }
    }

    let (path, before) = match (count, hit) {
        (1, Some(hit)) => hit,
        (0, _) | (_, None) => {
            return Err(ApplyError::NotFound {
                needle: search.to_string(),
            })
        }
        (count, _) => {
            return Err(ApplyError::AmbiguousMatch {
                needle: search.to_string(),
                count,
            })
        }
    };

    let after = before.replacen(search, replace, 1);
    tree.write(&path, &after).map_err(|e| ApplyError::io(&path, &e))?;
    report.changes.push(FileChange {
        path,
        before: Some(before),
        after: Some(after),
    });
    Ok(())
}

/// Counts overlapping occurrences, so `aa` is found twice in `aaa`.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(at) = haystack[from..].find(needle) {
        let start = from + at;
        count += 1;
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const CLASS: &str = ".class public La/B;\n.super Ljava/lang/Object;\n\n\n# direct methods\n.method public static check()Z\n    .registers 1\n\n    const/4 v0, 0x0\n\n    return v0\n.end method\n";

    fn tree() -> MemoryTree {
        MemoryTree::new()
            .with_file("smali/a/B.smali", CLASS)
            .with_file("smali/a/C.smali", ".class La/C;\n.super Ljava/lang/Object;\n\nconst-string v0, \"token\"\n")
    }

    #[test]
    fn test_file_block_applies_in_order_and_writes_once() {
        let doc = parse(
            "FILE smali/a/B.smali\n\
             ADD_FIELD\n\
             .field private static sFlag:Z\n\
             REPLACE check()Z\n\
             \x20   .registers 1\n\
             \n\
             \x20   const/4 v0, 0x1\n\
             \n\
             \x20   return v0\n\
             END\n",
        )
        .unwrap();
        let mut tree = tree();
        let report = apply_document(&doc, &mut tree, ApplyOptions::default());

        assert!(report.is_success(), "{:?}", report);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.changes.len(), 1);
        let after = tree.get("smali/a/B.smali").unwrap();
        assert!(after.contains(".field private static sFlag:Z"));
        assert!(after.contains("const/4 v0, 0x1"));
        assert!(!after.contains("const/4 v0, 0x0"));
    }

    #[test]
    fn test_fail_fast_keeps_earlier_success_and_aborts() {
        let doc = parse(
            "FILE smali/a/B.smali\n\
             ADD_FIELD .field private x:I\n\
             REMOVE_METHOD missing()V\n\
             REMOVE_METHOD check()Z\n\
             END\n\
             REMOVE smali/a/C.smali\n",
        )
        .unwrap();
        let mut tree = tree();
        let report = apply_document(&doc, &mut tree, ApplyOptions::default());

        assert!(report.aborted);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(
            report.outcomes[1].error,
            Some(ApplyError::MethodNotFound {
                signature: "missing()V".to_string()
            })
        );
        let after = tree.get("smali/a/B.smali").unwrap();
        assert!(after.contains(".field private x:I"));
        assert!(after.contains("check()Z"));
        assert!(tree.get("smali/a/C.smali").is_some());
    }

    #[test]
    fn test_skip_failed_continues() {
        let doc = parse(
            "FILE smali/a/Missing.smali\n\
             REMOVE_FIELD a\n\
             REMOVE_FIELD b\n\
             END\n\
             REMOVE smali/a/C.smali\n",
        )
        .unwrap();
        let mut tree = tree();
        let options = ApplyOptions {
            skip_failed: true,
            ..Default::default()
        };
        let report = apply_document(&doc, &mut tree, options);

        assert!(!report.aborted);
        assert!(!report.is_success());
        assert_eq!(report.failed(), 2);
        assert_eq!(report.succeeded(), 1);
        assert!(matches!(report.outcomes[0].error, Some(ApplyError::FileNotFound { .. })));
        assert!(tree.get("smali/a/C.smali").is_none());
    }

    #[test]
    fn test_dry_run_matches_real_run_without_writing() {
        let doc = parse(
            "CREATE smali/a/New.smali\n\
             .class La/New;\n\
             END\n\
             FIND_REPLACE \"token\" \"other\"\n\
             REMOVE smali/a/B.smali\n",
        )
        .unwrap();

        let mut dry_tree = tree();
        let dry = apply_document(
            &doc,
            &mut dry_tree,
            ApplyOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        assert_eq!(dry_tree, tree());

        let mut real_tree = tree();
        let real = apply_document(&doc, &mut real_tree, ApplyOptions::default());
        assert_eq!(dry, real);
        assert!(real.is_success());
        assert_eq!(real_tree.get("smali/a/New.smali"), Some(".class La/New;\n"));
        assert!(real_tree.get("smali/a/C.smali").unwrap().contains("\"other\""));
        assert!(real_tree.get("smali/a/B.smali").is_none());
    }

    #[test]
    fn test_find_replace_ambiguous_mutates_nothing() {
        let doc = parse("FIND_REPLACE \"Ljava/lang/Object;\" \"La/Base;\"\n").unwrap();
        let mut tree = tree();
        let report = apply_document(&doc, &mut tree, ApplyOptions::default());

        assert_eq!(
            report.outcomes[0].error,
            Some(ApplyError::AmbiguousMatch {
                needle: "Ljava/lang/Object;".to_string(),
                count: 2
            })
        );
        assert!(report.changes.is_empty());
        assert_eq!(tree, self::tree());
    }

    #[test]
    fn test_find_replace_counts_overlapping_occurrences() {
        let doc = parse("FIND_REPLACE \"aa\" \"X\"\n").unwrap();
        let original = MemoryTree::new().with_file("A.smali", "const-string v0, \"aaa\"\n");
        let mut tree = original.clone();
        let report = apply_document(&doc, &mut tree, ApplyOptions::default());

        assert_eq!(
            report.outcomes[0].error,
            Some(ApplyError::AmbiguousMatch {
                needle: "aa".to_string(),
                count: 2
            })
        );
        assert_eq!(tree, original);
        assert_eq!(count_occurrences("aaa", "aa"), 2);
        assert_eq!(count_occurrences("ééé", "éé"), 2);
        assert_eq!(count_occurrences("abc", ""), 0);
    }

    #[test]
    fn test_find_replace_not_found() {
        let doc = parse("FIND_REPLACE \"nowhere\" \"x\"\n").unwrap();
        let mut tree = tree();
        let report = apply_document(&doc, &mut tree, ApplyOptions::default());
        assert!(matches!(report.outcomes[0].error, Some(ApplyError::NotFound { .. })));
    }

    #[test]
    fn test_create_existing_and_remove_missing() {
        let doc = parse("CREATE smali/a/B.smali\n.class La/B;\nEND\nREMOVE smali/a/Nope.smali\n").unwrap();
        let mut tree = tree();
        let report = apply_document(
            &doc,
            &mut tree,
            ApplyOptions {
                skip_failed: true,
                ..Default::default()
            },
        );
        assert!(matches!(report.outcomes[0].error, Some(ApplyError::FileAlreadyExists { .. })));
        assert!(matches!(report.outcomes[1].error, Some(ApplyError::FileNotFound { .. })));
        assert_eq!(tree.get("smali/a/B.smali"), Some(CLASS));
    }

    #[test]
    fn test_context_not_found_leaves_file_identical() {
        let doc = parse(
            "FILE smali/a/B.smali\n\
             PATCH check()Z\n\
             - const/4 v0, 0x5\n\
             + const/4 v0, 0x1\n\
             END\n",
        )
        .unwrap();
        let mut tree = tree();
        let report = apply_document(&doc, &mut tree, ApplyOptions::default());
        assert!(matches!(report.outcomes[0].error, Some(ApplyError::ContextNotFound { .. })));
        assert_eq!(tree.get("smali/a/B.smali"), Some(CLASS));
        assert!(report.changes.is_empty());
    }
}
