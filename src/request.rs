//! Typed extraction requests and their JSON wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Size limit used when the caller gives none, or gives something unusable.
pub const DEFAULT_MAX_SIZE_KB: u64 = 1024;

/// Description attached to external files submitted without one.
pub const DEFAULT_EXTERNAL_DESCRIPTION: &str = "No description provided.";

/// Suggested ignore patterns: VCS and dependency directories, build output,
/// logs, OS and IDE metadata. The extractor never applies these on its own;
/// front ends may pre-fill them.
pub const DEFAULT_IGNORES: &str = "\
# Version control
.git/
.svn/
.hg/

# Dependencies
node_modules/
vendor/
.venv/
venv/
__pycache__/

# Build artifacts
target/
dist/
build/
out/
*.pyc
*.o
*.class

# Logs
*.log
logs/

# OS and IDE metadata
.DS_Store
Thumbs.db
.idea/
.vscode/
";

/// A file outside the scanned root, named explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalFileRef {
    pub path: String,
    #[serde(default = "default_description")]
    pub description: String,
}

impl ExternalFileRef {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
        }
    }
}

fn default_description() -> String {
    DEFAULT_EXTERNAL_DESCRIPTION.to_string()
}

/// Everything one extraction run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Project root. `None` when only external files are requested.
    pub root: Option<PathBuf>,
    /// Relative paths restricting collection to named subtrees. Empty means the whole tree.
    pub include_paths: Vec<String>,
    /// Gitignore-style patterns, one per line.
    pub ignore_patterns: String,
    /// Largest embeddable file, in bytes.
    pub max_file_size: u64,
    pub strip_comments: bool,
    pub external_files: Vec<ExternalFileRef>,
}

impl Default for ExtractionRequest {
    fn default() -> Self {
        Self {
            root: None,
            include_paths: Vec::new(),
            ignore_patterns: String::new(),
            max_file_size: kb_to_bytes(DEFAULT_MAX_SIZE_KB),
            strip_comments: false,
            external_files: Vec::new(),
        }
    }
}

impl ExtractionRequest {
    /// Request covering the whole tree under `root` with default limits.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Include paths as newline-separated text, the way form fields submit them.
    pub fn include_text(&self) -> String {
        self.include_paths.join("\n")
    }

    /// True when there is something to extract at all.
    pub fn has_scope(&self) -> bool {
        self.root.is_some() || !self.external_files.is_empty()
    }
}

/// Wire shape of a request as submitted by a client.
///
/// Every field is optional on the wire; [`RequestPayload::into_request`]
/// resolves missing or malformed values to documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestPayload {
    pub path: String,
    pub ignores: String,
    pub includes: String,
    /// Kilobytes. Accepts a number or a numeric string.
    pub max_size: Option<Value>,
    pub ignore_comments: bool,
    pub external_files: Vec<ExternalFileRef>,
}

impl RequestPayload {
    pub fn into_request(self) -> ExtractionRequest {
        let path = self.path.trim();
        let root = (!path.is_empty()).then(|| PathBuf::from(path));

        let external_files = self
            .external_files
            .into_iter()
            .filter(|f| !f.path.trim().is_empty())
            .collect();

        ExtractionRequest {
            root,
            include_paths: split_lines(&self.includes),
            ignore_patterns: self.ignores,
            max_file_size: kb_to_bytes(parse_max_size_kb(self.max_size.as_ref())),
            strip_comments: self.ignore_comments,
            external_files,
        }
    }
}

/// Non-empty trimmed lines of a multi-line form field.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Kilobytes to bytes, saturating at `u64::MAX`.
pub fn kb_to_bytes(kb: u64) -> u64 {
    kb.saturating_mul(1024)
}

/// Kilobyte limit from a loosely typed value; anything unusable falls back to
/// [`DEFAULT_MAX_SIZE_KB`].
pub fn parse_max_size_kb(value: Option<&Value>) -> u64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(kb) if kb > 0 => kb,
        _ => DEFAULT_MAX_SIZE_KB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_defaults() {
        let payload: RequestPayload = serde_json::from_value(json!({})).unwrap();
        let request = payload.into_request();
        assert_eq!(request.root, None);
        assert!(request.include_paths.is_empty());
        assert_eq!(request.max_file_size, 1024 * 1024);
        assert!(!request.strip_comments);
        assert!(!request.has_scope());
    }

    #[test]
    fn test_payload_full() {
        let payload: RequestPayload = serde_json::from_value(json!({
            "path": "  /tmp/project ",
            "ignores": "*.log\nnode_modules/",
            "includes": "src\n\n  docs/guide.md  \n",
            "max_size": 16,
            "ignore_comments": true,
            "external_files": [
                { "path": "/etc/hosts", "description": "hosts file" },
                { "path": "/etc/passwd" },
                { "path": "   ", "description": "blank" }
            ]
        }))
        .unwrap();

        let request = payload.into_request();
        assert_eq!(request.root, Some(PathBuf::from("/tmp/project")));
        assert_eq!(request.include_paths, vec!["src", "docs/guide.md"]);
        assert_eq!(request.max_file_size, 16 * 1024);
        assert!(request.strip_comments);
        assert_eq!(request.external_files.len(), 2);
        assert_eq!(
            request.external_files[1].description,
            DEFAULT_EXTERNAL_DESCRIPTION
        );
    }

    #[test]
    fn test_max_size_parsing() {
        assert_eq!(parse_max_size_kb(Some(&json!(2))), 2);
        assert_eq!(parse_max_size_kb(Some(&json!("64"))), 64);
        assert_eq!(parse_max_size_kb(Some(&json!("lots"))), DEFAULT_MAX_SIZE_KB);
        assert_eq!(parse_max_size_kb(Some(&json!(-5))), DEFAULT_MAX_SIZE_KB);
        assert_eq!(parse_max_size_kb(Some(&json!(0))), DEFAULT_MAX_SIZE_KB);
        assert_eq!(parse_max_size_kb(Some(&json!(1.5))), DEFAULT_MAX_SIZE_KB);
        assert_eq!(parse_max_size_kb(None), DEFAULT_MAX_SIZE_KB);
        assert_eq!(parse_max_size_kb(Some(&json!(u64::MAX))), u64::MAX);
    }

    #[test]
    fn test_huge_max_size_saturates() {
        for kb in [u64::MAX / 1024 + 1, u64::MAX] {
            let payload: RequestPayload =
                serde_json::from_value(json!({ "path": "/tmp", "max_size": kb })).unwrap();
            assert_eq!(payload.into_request().max_file_size, u64::MAX);
        }
        assert_eq!(kb_to_bytes(u64::MAX / 1024), (u64::MAX / 1024) * 1024);
    }

    #[test]
    fn test_external_only_request_has_scope() {
        let request = ExtractionRequest {
            external_files: vec![ExternalFileRef::new("/x", "y")],
            ..ExtractionRequest::default()
        };
        assert!(request.has_scope());
    }
}
