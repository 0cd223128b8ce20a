//! Reading file contents and optional comment removal.
//!
//! Comment stripping is lexical and best effort: markers inside string
//! literals are treated as comments too (`"http://x"` loses `//x"` in C-family
//! files). Files whose extension has no entry in the language table pass
//! through unchanged.

use crate::language::{CommentStyle, LanguageSpec};
use content_inspector::inspect;
use log::debug;
use memmap2::MmapOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str;
use std::sync::{Mutex, PoisonError};

/// Bytes inspected up front for binary signatures.
const SNIFF_LEN: usize = 8192;

/// Why a discovered file contributes no content section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
    Binary,
    Unreadable,
    /// Excluded by ignore or include rules. Such files are collected but never rendered.
    Ignored,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooLarge => "too_large",
            SkipReason::Binary => "binary",
            SkipReason::Unreadable => "unreadable",
            SkipReason::Ignored => "ignored",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of loading one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Skipped {
        reason: SkipReason,
        /// Underlying error message for `unreadable` files.
        detail: Option<String>,
    },
}

impl Content {
    fn skipped(reason: SkipReason) -> Self {
        Content::Skipped {
            reason,
            detail: None,
        }
    }

    fn unreadable(detail: impl Into<String>) -> Self {
        Content::Skipped {
            reason: SkipReason::Unreadable,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Size on disk, 0 when it could not be determined.
    pub size: u64,
    pub content: Content,
}

/// Loads a file as UTF-8 text, subject to a size limit.
///
/// The size is checked from metadata before anything is mapped. Files with a
/// NUL byte or invalid UTF-8 are `binary`. I/O failures become `unreadable`;
/// this function never returns an error.
pub fn read_file(path: &Path, max_bytes: u64) -> ReadOutcome {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            return ReadOutcome {
                size: 0,
                content: Content::unreadable(err.to_string()),
            };
        }
    };

    let size = metadata.len();
    if !metadata.is_file() {
        return ReadOutcome {
            size,
            content: Content::unreadable("not a regular file"),
        };
    }
    if size > max_bytes {
        debug!("Skipping {} ({size} bytes > {max_bytes})", path.display());
        return ReadOutcome {
            size,
            content: Content::skipped(SkipReason::TooLarge),
        };
    }

    ReadOutcome {
        size,
        content: map_and_decode(path, size, max_bytes),
    }
}

fn map_and_decode(path: &Path, size: u64, max_bytes: u64) -> Content {
    if size == 0 {
        return Content::Text(String::new());
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) => return Content::unreadable(err.to_string()),
    };

    // SAFETY: the map is read-only and dropped before returning; a concurrent
    // truncation can at worst yield garbage bytes, which decode as binary.
    let mmap = match unsafe { MmapOptions::new().map(&file) } {
        Ok(m) => m,
        Err(err) => return Content::unreadable(err.to_string()),
    };

    // The file may have grown since the metadata call.
    if mmap.len() as u64 > max_bytes {
        return Content::skipped(SkipReason::TooLarge);
    }

    decode_text(&mmap)
}

/// Classifies raw bytes as text or binary.
pub fn decode_text(bytes: &[u8]) -> Content {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    if inspect(sample).is_binary() || bytes.contains(&0) {
        return Content::skipped(SkipReason::Binary);
    }

    match str::from_utf8(bytes) {
        Ok(text) => Content::Text(text.strip_prefix('\u{feff}').unwrap_or(text).to_string()),
        Err(_) => Content::skipped(SkipReason::Binary),
    }
}

static COMMENT_REGEXES: Lazy<Mutex<HashMap<&'static [CommentStyle], Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn comment_regex(styles: &'static [CommentStyle]) -> Option<Regex> {
    if styles.is_empty() {
        return None;
    }

    let mut cache = COMMENT_REGEXES
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(styles) {
        return Some(re.clone());
    }

    let alternatives: Vec<String> = styles
        .iter()
        .map(|style| match style {
            CommentStyle::Line(marker) => format!("{}[^\\n]*", regex::escape(marker)),
            CommentStyle::Block(open, close) => {
                format!("(?s:{}.*?{})", regex::escape(open), regex::escape(close))
            }
        })
        .collect();

    let re = Regex::new(&alternatives.join("|")).ok()?;
    cache.insert(styles, re.clone());
    Some(re)
}

/// Removes comments according to `language`, then trailing whitespace left
/// on each line. Unknown languages are returned unchanged.
pub fn strip_comments(text: &str, language: Option<&LanguageSpec>) -> String {
    match language.and_then(|l| comment_regex(l.comments)) {
        Some(re) => re
            .replace_all(text, "")
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n"),
        None => text.to_string(),
    }
}

static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

/// Collapses runs of blank lines into one, drops leading blank lines and
/// trailing whitespace. Indentation of the first code line is kept.
pub fn normalize_blank_lines(text: &str) -> String {
    let collapsed = BLANK_RUN.replace_all(text, "\n\n");
    let body = collapsed.trim_end();

    let start = match body.find(|c: char| !c.is_whitespace()) {
        Some(first) => body[..first].rfind('\n').map_or(0, |nl| nl + 1),
        None => return String::new(),
    };
    body[start..].to_string()
}

/// Full transformation applied to every embedded file.
pub fn transform(text: &str, language: Option<&LanguageSpec>, strip: bool) -> String {
    if strip {
        normalize_blank_lines(&strip_comments(text, language))
    } else {
        normalize_blank_lines(text)
    }
}
