//! Markdown assembly.
//!
//! Rendering is a pure function of the collected descriptors: no filesystem
//! access happens here, so the same input always yields the same bytes.

use crate::content::SkipReason;
use crate::filewalker::{ExternalDescriptor, FileDescriptor};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Document produced when there is nothing to show.
pub const NOTHING_FOUND: &str =
    "No files were found or selected. Please check your paths and settings.";

/// Directory hierarchy of the accepted files.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TreeNode {
    dirs: BTreeMap<String, TreeNode>,
    /// File name to skip annotation.
    files: BTreeMap<String, Option<SkipReason>>,
}

impl TreeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the tree for a set of root-relative descriptors.
    pub fn from_descriptors(files: &[FileDescriptor]) -> Self {
        let mut root = Self::new();
        for file in files {
            root.insert(&file.rel_path, file.skip);
        }
        root
    }

    /// Inserts a file, creating intermediate directories as needed.
    pub fn insert(&mut self, rel_path: &Path, skip: Option<SkipReason>) {
        let parts: Vec<String> = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some((file_name, dirs)) = parts.split_last() else {
            return;
        };

        let mut node = self;
        for dir in dirs {
            node = node.dirs.entry(dir.clone()).or_default();
        }
        node.files.insert(file_name.clone(), skip);
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }

    /// Draws the tree with box connectors. Directories come first and carry
    /// a trailing `/`; skipped files carry their reason in brackets.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        self.render_into(&mut lines, "");
        lines.join("\n")
    }

    fn render_into(&self, lines: &mut Vec<String>, prefix: &str) {
        let total = self.dirs.len() + self.files.len();
        let mut index = 0;

        for (name, child) in &self.dirs {
            index += 1;
            let last = index == total;
            lines.push(format!("{prefix}{}{name}/", connector(last)));
            let extension = if last { "    " } else { "│   " };
            child.render_into(lines, &format!("{prefix}{extension}"));
        }

        for (name, skip) in &self.files {
            index += 1;
            let mut line = format!("{prefix}{}{name}", connector(index == total));
            if let Some(reason) = skip {
                let _ = write!(line, " [{reason}]");
            }
            lines.push(line);
        }
    }
}

fn connector(last: bool) -> &'static str {
    if last { "└── " } else { "├── " }
}

/// Accumulates document sections in order.
#[derive(Debug, Default)]
pub struct MarkdownWriter {
    parts: Vec<String>,
}

impl MarkdownWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_tree(&mut self, tree: &TreeNode) {
        self.parts
            .push(format!("Project Structure:\n```\n{}\n```\n", tree.render()));
    }

    /// Content section for an embedded root file. Skipped files are ignored.
    pub fn write_entry(&mut self, file: &FileDescriptor) {
        let Some(text) = &file.content else {
            return;
        };
        self.parts.push(format!(
            "---\n**File:** `{}`\n\n{}",
            display_path(&file.rel_path),
            code_block(text, file.language)
        ));
    }

    pub fn write_external_header(&mut self) {
        self.parts.push("\n---\n### External Files\n---".to_string());
    }

    pub fn write_external(&mut self, external: &ExternalDescriptor) {
        let file = &external.file;
        let mut section = format!(
            "\n**External File:** `{}`\n**Description:**\n{}\n\n",
            file.rel_path.display(),
            blockquote(&external.description)
        );
        match (&file.content, file.skip) {
            (Some(text), _) => section.push_str(&code_block(text, file.language)),
            (None, Some(reason)) => {
                let _ = writeln!(section, "[File skipped: {reason}]");
            }
            (None, None) => {}
        }
        self.parts.push(section);
    }

    pub fn finish(self) -> String {
        if self.parts.is_empty() {
            return NOTHING_FOUND.to_string();
        }
        self.parts.join("\n")
    }
}

/// Renders the whole document: tree and root files first, then external files.
pub fn render(files: &[FileDescriptor], external: &[ExternalDescriptor]) -> String {
    let mut writer = MarkdownWriter::new();

    let tree = TreeNode::from_descriptors(files);
    if !tree.is_empty() {
        writer.write_tree(&tree);
        for file in files {
            writer.write_entry(file);
        }
    }

    if !external.is_empty() {
        writer.write_external_header();
        for file in external {
            writer.write_external(file);
        }
    }

    writer.finish()
}

fn code_block(text: &str, language: &str) -> String {
    let fence = calculate_fence(text);
    format!("{fence}{language}\n{text}\n{fence}\n")
}

fn blockquote(text: &str) -> String {
    let text = if text.trim().is_empty() {
        crate::request::DEFAULT_EXTERNAL_DESCRIPTION
    } else {
        text
    };
    text.lines()
        .map(|line| format!("> {line}").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Root-relative path with `/` separators regardless of platform.
fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Calculates the appropriate fence string for wrapping content.
///
/// Returns a fence with at least 3 backticks, or more if the content
/// contains backtick sequences that would interfere with parsing.
fn calculate_fence(content: &str) -> String {
    let max_backtick_run = content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('`') {
                Some(trimmed.chars().take_while(|&c| c == '`').count())
            } else {
                None
            }
        })
        .max()
        .unwrap_or(0);

    let fence_len = max_backtick_run.max(2) + 1;
    "`".repeat(fence_len)
}
