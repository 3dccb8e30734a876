use crate::error::ParseErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

static FIND_REPLACE_ARGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"((?:[^"\\]|\\.)*)"\s+"((?:[^"\\]|\\.)*)"$"#).expect("valid FIND_REPLACE pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Credit,
    File,
    Create,
    Remove,
    FindReplace,
    End,
    Replace,
    Patch,
    CreateMethod,
    RemoveMethod,
    AddField,
    RemoveField,
}

impl Keyword {
    pub const ALL: [Keyword; 12] = [
        Keyword::Credit,
        Keyword::File,
        Keyword::Create,
        Keyword::Remove,
        Keyword::FindReplace,
        Keyword::End,
        Keyword::Replace,
        Keyword::Patch,
        Keyword::CreateMethod,
        Keyword::RemoveMethod,
        Keyword::AddField,
        Keyword::RemoveField,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Credit => "CREDIT",
            Keyword::File => "FILE",
            Keyword::Create => "CREATE",
            Keyword::Remove => "REMOVE",
            Keyword::FindReplace => "FIND_REPLACE",
            Keyword::End => "END",
            Keyword::Replace => "REPLACE",
            Keyword::Patch => "PATCH",
            Keyword::CreateMethod => "CREATE_METHOD",
            Keyword::RemoveMethod => "REMOVE_METHOD",
            Keyword::AddField => "ADD_FIELD",
            Keyword::RemoveField => "REMOVE_FIELD",
        }
    }

    /// Top-level keywords end an open FILE block.
    pub fn closes_file(self) -> bool {
        matches!(
            self,
            Keyword::File | Keyword::Create | Keyword::Remove | Keyword::FindReplace | Keyword::End
        )
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == token)
    }
}

/// Splits a line into its keyword and the trimmed remainder, if the first
/// token is a keyword.
pub fn split_keyword(line: &str) -> Option<(Keyword, &str)> {
    let trimmed = line.trim();
    let token = trimmed.split_whitespace().next()?;
    let keyword = Keyword::from_token(token)?;
    Some((keyword, trimmed[token.len()..].trim()))
}

pub fn parse_path(arg: &str, keyword: Keyword) -> Result<PathBuf, ParseErrorKind> {
    if arg.is_empty() {
        return Err(ParseErrorKind::MissingArgument {
            keyword: keyword.as_str(),
            what: "a path",
        });
    }
    let path = Path::new(arg);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(ParseErrorKind::InvalidPath(arg.to_string()));
    }
    Ok(path.to_path_buf())
}

pub fn require_arg<'a>(
    arg: &'a str,
    keyword: Keyword,
    what: &'static str,
) -> Result<&'a str, ParseErrorKind> {
    if arg.is_empty() {
        Err(ParseErrorKind::MissingArgument {
            keyword: keyword.as_str(),
            what,
        })
    } else {
        Ok(arg)
    }
}

/// `"search" "replace"` with `\"` and `\\` escapes.
pub fn parse_find_replace(arg: &str) -> Result<(String, String), ParseErrorKind> {
    let caps = FIND_REPLACE_ARGS
        .captures(arg)
        .ok_or_else(|| ParseErrorKind::MalformedFindReplace(arg.to_string()))?;
    let search = unescape(&caps[1]);
    if search.is_empty() {
        return Err(ParseErrorKind::MalformedFindReplace(arg.to_string()));
    }
    Ok((search, unescape(&caps[2])))
}

pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('"' | '\\')) => out.push(next),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
