//! Extension lookup table: Markdown fence tag and comment syntax per language.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

/// One lexical comment form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentStyle {
    /// Runs from the marker to the end of the line.
    Line(&'static str),
    /// Runs from the opening marker to the next closing marker, across lines.
    Block(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    /// Info string for the code fence, e.g. `rust`.
    pub tag: &'static str,
    /// Empty when the language has no strippable comments.
    pub comments: &'static [CommentStyle],
}

const C_FAMILY: &[CommentStyle] = &[CommentStyle::Block("/*", "*/"), CommentStyle::Line("//")];
const BLOCK_ONLY: &[CommentStyle] = &[CommentStyle::Block("/*", "*/")];
const HASH: &[CommentStyle] = &[CommentStyle::Line("#")];
const PYTHON: &[CommentStyle] = &[
    CommentStyle::Block("\"\"\"", "\"\"\""),
    CommentStyle::Block("'''", "'''"),
    CommentStyle::Line("#"),
];
const MARKUP: &[CommentStyle] = &[CommentStyle::Block("<!--", "-->")];
const SQL: &[CommentStyle] = &[CommentStyle::Block("/*", "*/"), CommentStyle::Line("--")];
const DASH_DASH: &[CommentStyle] = &[CommentStyle::Line("--")];
const NONE: &[CommentStyle] = &[];

const fn lang(tag: &'static str, comments: &'static [CommentStyle]) -> LanguageSpec {
    LanguageSpec { tag, comments }
}

static BY_EXTENSION: Lazy<HashMap<&'static str, LanguageSpec>> = Lazy::new(|| {
    HashMap::from([
        ("rs", lang("rust", C_FAMILY)),
        ("js", lang("javascript", C_FAMILY)),
        ("mjs", lang("javascript", C_FAMILY)),
        ("cjs", lang("javascript", C_FAMILY)),
        ("jsx", lang("jsx", C_FAMILY)),
        ("ts", lang("typescript", C_FAMILY)),
        ("tsx", lang("tsx", C_FAMILY)),
        ("java", lang("java", C_FAMILY)),
        ("kt", lang("kotlin", C_FAMILY)),
        ("swift", lang("swift", C_FAMILY)),
        ("go", lang("go", C_FAMILY)),
        ("c", lang("c", C_FAMILY)),
        ("h", lang("c", C_FAMILY)),
        ("cpp", lang("cpp", C_FAMILY)),
        ("cc", lang("cpp", C_FAMILY)),
        ("hpp", lang("cpp", C_FAMILY)),
        ("cs", lang("csharp", C_FAMILY)),
        ("scss", lang("scss", C_FAMILY)),
        ("css", lang("css", BLOCK_ONLY)),
        ("py", lang("python", PYTHON)),
        ("sh", lang("shell", HASH)),
        ("bash", lang("shell", HASH)),
        ("zsh", lang("shell", HASH)),
        ("rb", lang("ruby", HASH)),
        ("pl", lang("perl", HASH)),
        ("r", lang("r", HASH)),
        ("yaml", lang("yaml", HASH)),
        ("yml", lang("yaml", HASH)),
        ("toml", lang("toml", HASH)),
        ("html", lang("html", MARKUP)),
        ("htm", lang("html", MARKUP)),
        ("xml", lang("xml", MARKUP)),
        ("svg", lang("xml", MARKUP)),
        ("vue", lang("vue", MARKUP)),
        ("sql", lang("sql", SQL)),
        ("lua", lang("lua", DASH_DASH)),
        ("hs", lang("haskell", DASH_DASH)),
        ("md", lang("markdown", NONE)),
        ("json", lang("json", NONE)),
    ])
});

/// Extensionless files recognised by name.
static BY_FILE_NAME: Lazy<HashMap<&'static str, LanguageSpec>> = Lazy::new(|| {
    HashMap::from([
        ("Dockerfile", lang("dockerfile", HASH)),
        ("Makefile", lang("makefile", HASH)),
        ("CMakeLists.txt", lang("cmake", HASH)),
    ])
});

/// Looks up a path's language by file name, then by lowercased extension.
pub fn language_for(path: &Path) -> Option<&'static LanguageSpec> {
    let by_name = path
        .file_name()
        .and_then(OsStr::to_str)
        .and_then(|name| BY_FILE_NAME.get(name));
    if by_name.is_some() {
        return by_name;
    }

    let ext = path.extension().and_then(OsStr::to_str)?.to_lowercase();
    BY_EXTENSION.get(ext.as_str())
}

/// Fence info string for a path; empty for unknown files.
pub fn get_language_tag(path: &Path) -> &'static str {
    language_for(path).map_or("", |l| l.tag)
}
