//! Builds a [`PatchDocument`] from two versions of a tree or a file.

pub mod class_diff;

pub use class_diff::{diff_file, FileDiff};

use crate::error::GenerateError;
use crate::operations::WorkTree;
use crate::parser::parse;
use crate::types::{Directive, FileEdit, PatchDocument};
use crate::writer::render;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// A file whose generated directives are not a faithful reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl GenerateWarning {
    pub fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GenerateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    pub document: PatchDocument,
    pub warnings: Vec<GenerateWarning>,
}

/// Compares two trees path by path.
///
/// Files are compared as bytes. Created or changed files that are not valid
/// UTF-8 cannot be expressed as directives; they are left out and reported
/// as warnings. Removing one is still a plain `REMOVE`.
pub fn diff_trees(old: &dyn WorkTree, new: &dyn WorkTree) -> Result<Generated, GenerateError> {
    let old_files = old.list_files().map_err(GenerateError::Listing)?;
    let new_files = new.list_files().map_err(GenerateError::Listing)?;
    let paths: BTreeSet<&PathBuf> = old_files.iter().chain(new_files.iter()).collect();

    let mut generated = Generated::default();
    for path in paths {
        let before = if old.exists(path) {
            Some(read(old, path)?)
        } else {
            None
        };
        let after = if new.exists(path) {
            Some(read(new, path)?)
        } else {
            None
        };

        let edit = match (before, after) {
            (Some(before), Some(after)) if before == after => continue,
            (Some(_), None) => {
                debug!("{}: removed", path.display());
                FileEdit::file(path.clone(), vec![Directive::RemoveFile])
            }
            (None, Some(after)) => {
                let Some(content) = decode(path, after, &mut generated.warnings) else {
                    continue;
                };
                debug!("{}: created", path.display());
                let edit = FileEdit::file(path.clone(), vec![Directive::CreateFile { content }]);
                if !survives_render(&edit) {
                    let warning = GenerateWarning::new(
                        path,
                        "content changes when written as a CREATE block (line endings, missing final newline or keyword lines)",
                    );
                    warn!("{}", warning);
                    generated.warnings.push(warning);
                }
                edit
            }
            (Some(before), Some(after)) => {
                let (Some(before), Some(after)) = (
                    decode(path, before, &mut generated.warnings),
                    decode(path, after, &mut generated.warnings),
                ) else {
                    continue;
                };
                let diff = diff_file(path, &before, &after)?;
                if let Some(warning) = diff.warning {
                    warn!("{}", warning);
                    generated.warnings.push(warning);
                }
                if diff.directives.is_empty() {
                    continue;
                }
                FileEdit::file(path.clone(), diff.directives)
            }
            (None, None) => continue,
        };
        generated.document.edits.push(edit);
    }

    Ok(generated)
}

/// Whether `edit` reads back unchanged after [`render`] and [`parse`].
pub(crate) fn survives_render(edit: &FileEdit) -> bool {
    let document = PatchDocument {
        credits: Vec::new(),
        edits: vec![edit.clone()],
    };
    parse(&render(&document)).is_ok_and(|parsed| parsed == document)
}

fn read(tree: &dyn WorkTree, path: &Path) -> Result<Vec<u8>, GenerateError> {
    tree.read_bytes(path).map_err(|source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode(path: &Path, bytes: Vec<u8>, warnings: &mut Vec<GenerateWarning>) -> Option<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            if !warnings.iter().any(|w| w.path == path) {
                let warning = GenerateWarning::new(path, "not valid UTF-8; left out of the patch");
                warn!("{}", warning);
                warnings.push(warning);
            }
            None
        }
    }
}
