//! Ignore and include matching against root-relative paths.
//!
//! Ignore text follows gitignore semantics as implemented by the `ignore`
//! crate: `#` comments, trailing `/` for directories, `*`/`?`/`[...]` within a
//! segment, `**` across segments, leading `/` anchoring, and `!` negation
//! where a later rule re-includes what an earlier rule excluded. As in git, a
//! negation cannot re-include a file whose parent directory is excluded.
//!
//! Include text lists relative paths; a path is eligible when it equals one of
//! them or lies beneath one, compared segment by segment.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use log::{debug, warn};
use std::path::{Component, Path, PathBuf};

/// Compiled ignore and include rules for one request.
#[derive(Debug, Clone)]
pub struct PatternSet {
    ignores: Gitignore,
    includes: Vec<PathBuf>,
    /// Set when include text named anything, even if every entry was rejected.
    include_mode: bool,
}

impl PatternSet {
    /// Compiles both rule sets. Never fails: a line that is not a valid glob
    /// is matched literally instead.
    pub fn compile(ignore_text: &str, include_text: &str) -> Self {
        Self {
            ignores: compile_ignores(ignore_text),
            includes: compile_includes(include_text),
            include_mode: include_text.lines().any(|l| !l.trim().is_empty()),
        }
    }

    /// Matcher that ignores nothing and includes everything.
    pub fn empty() -> Self {
        Self {
            ignores: Gitignore::empty(),
            includes: Vec::new(),
            include_mode: false,
        }
    }

    /// True if `rel_path`, or any directory above it, is excluded.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        if rel_path.has_root() || rel_path.as_os_str().is_empty() {
            return false;
        }
        self.ignores
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }

    /// True if no include paths were given, or `rel_path` is one of them or beneath one.
    pub fn is_included(&self, rel_path: &Path) -> bool {
        !self.include_mode || self.includes.iter().any(|inc| rel_path.starts_with(inc))
    }

    /// Normalised include paths, in the order given.
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.includes
    }

    /// True when the scan is limited to include paths. Stays true if all of
    /// them were rejected, so nothing is scanned.
    pub fn has_includes(&self) -> bool {
        self.include_mode
    }
}

fn compile_ignores(text: &str) -> Gitignore {
    let mut builder = GitignoreBuilder::new(".");

    for line in text.lines() {
        // Trailing spaces are left for the gitignore parser, which honours `\ `.
        let line = line.trim_start().trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if builder.add_line(None, line).is_ok() {
            continue;
        }

        let literal = escape_glob(line);
        match builder.add_line(None, &literal) {
            Ok(_) => debug!("Pattern {line:?} is not a valid glob, matching it literally"),
            Err(err) => warn!("Dropping ignore pattern {line:?}: {err}"),
        }
    }

    builder.build().unwrap_or_else(|err| {
        warn!("Failed to build ignore matcher, ignoring nothing: {err}");
        Gitignore::empty()
    })
}

/// Escapes glob metacharacters so the pattern matches only itself.
/// A leading `!` stays a negation.
pub(crate) fn escape_glob(pattern: &str) -> String {
    let (prefix, body) = match pattern.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", pattern),
    };

    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str(prefix);
    for ch in body.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn compile_includes(text: &str) -> Vec<PathBuf> {
    let mut includes: Vec<PathBuf> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match normalize_relative(line) {
            Some(path) if !includes.contains(&path) => includes.push(path),
            Some(_) => {}
            None => warn!("Rejecting include path {line:?}: it escapes the project root"),
        }
    }
    includes
}

/// Lexically normalises a user-supplied relative path.
///
/// `.` segments are dropped, `..` pops the previous segment, and a leading
/// `/` is read as the project root. Returns `None` when `..` would climb above
/// the root or the path carries a drive prefix.
pub fn normalize_relative(raw: &str) -> Option<PathBuf> {
    let unified = raw.replace('\\', "/");
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Prefix(_) => return None,
        }
    }

    Some(parts.into_iter().collect())
}
