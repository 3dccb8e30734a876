use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextLine {
    Keep(String),
    Remove(String),
    Add(String),
}

impl ContextLine {
    pub fn text(&self) -> &str {
        match self {
            ContextLine::Keep(s) | ContextLine::Remove(s) | ContextLine::Add(s) => s,
        }
    }

    /// Lines that must already be present in the method body.
    pub fn is_anchor(&self) -> bool {
        !matches!(self, ContextLine::Add(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    ReplaceMethod {
        signature: String,
        body: Vec<String>,
    },
    PatchContext {
        signature: String,
        context: Vec<ContextLine>,
    },
    CreateMethod {
        lines: Vec<String>,
    },
    RemoveMethod {
        signature: String,
    },
    AddField {
        declaration: String,
    },
    RemoveField {
        name: String,
    },
    CreateFile {
        content: String,
    },
    RemoveFile,
    FindReplace {
        search: String,
        replace: String,
    },
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::ReplaceMethod { .. } => DirectiveKind::ReplaceMethod,
            Directive::PatchContext { .. } => DirectiveKind::PatchContext,
            Directive::CreateMethod { .. } => DirectiveKind::CreateMethod,
            Directive::RemoveMethod { .. } => DirectiveKind::RemoveMethod,
            Directive::AddField { .. } => DirectiveKind::AddField,
            Directive::RemoveField { .. } => DirectiveKind::RemoveField,
            Directive::CreateFile { .. } => DirectiveKind::CreateFile,
            Directive::RemoveFile => DirectiveKind::RemoveFile,
            Directive::FindReplace { .. } => DirectiveKind::FindReplace,
        }
    }

    /// Short human-readable name of what the directive acts on.
    pub fn subject(&self) -> String {
        match self {
            Directive::ReplaceMethod { signature, .. }
            | Directive::PatchContext { signature, .. }
            | Directive::RemoveMethod { signature } => signature.clone(),
            Directive::CreateMethod { lines } => lines
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string(),
            Directive::AddField { declaration } => declaration.trim().to_string(),
            Directive::RemoveField { name } => name.clone(),
            Directive::CreateFile { .. } | Directive::RemoveFile => String::new(),
            Directive::FindReplace { search, .. } => format!("\"{}\"", search),
        }
    }

    /// Directives that edit the inside of an existing class file.
    pub fn is_member_edit(&self) -> bool {
        matches!(
            self,
            Directive::ReplaceMethod { .. }
                | Directive::PatchContext { .. }
                | Directive::CreateMethod { .. }
                | Directive::RemoveMethod { .. }
                | Directive::AddField { .. }
                | Directive::RemoveField { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    ReplaceMethod,
    PatchContext,
    CreateMethod,
    RemoveMethod,
    AddField,
    RemoveField,
    CreateFile,
    RemoveFile,
    FindReplace,
}

impl DirectiveKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DirectiveKind::ReplaceMethod => "REPLACE",
            DirectiveKind::PatchContext => "PATCH",
            DirectiveKind::CreateMethod => "CREATE_METHOD",
            DirectiveKind::RemoveMethod => "REMOVE_METHOD",
            DirectiveKind::AddField => "ADD_FIELD",
            DirectiveKind::RemoveField => "REMOVE_FIELD",
            DirectiveKind::CreateFile => "CREATE",
            DirectiveKind::RemoveFile => "REMOVE",
            DirectiveKind::FindReplace => "FIND_REPLACE",
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    /// Every file under the work root.
    Tree,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Tree => f.write_str("<work tree>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub target: Target,
    pub directives: Vec<Directive>,
}

impl FileEdit {
    pub fn file(path: impl Into<PathBuf>, directives: Vec<Directive>) -> Self {
        Self {
            target: Target::File(path.into()),
            directives,
        }
    }

    pub fn tree(directive: Directive) -> Self {
        Self {
            target: Target::Tree,
            directives: vec![directive],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchDocument {
    pub credits: Vec<String>,
    pub edits: Vec<FileEdit>,
}

impl PatchDocument {
    pub fn directive_count(&self) -> usize {
        self.edits.iter().map(|e| e.directives.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}
