pub mod error;
pub mod generator;
pub mod locator;
pub mod matcher;
pub mod operations;
pub mod parser;
pub mod text;
pub mod types;
pub mod writer;

pub use error::{ApplyError, GenerateError, LocateError, ParseError, ParseErrorKind};
pub use generator::{diff_file, diff_trees, FileDiff, GenerateWarning, Generated};
pub use operations::{
    apply_document, ApplyOptions, ApplyReport, DirectiveOutcome, DiskTree, FileChange, MemoryTree,
    OverlayTree, WorkTree,
};
pub use parser::parse;
pub use types::{ContextLine, Directive, DirectiveKind, FileEdit, PatchDocument, Target};
pub use writer::render;
