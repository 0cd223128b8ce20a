use crate::cancel::{CancellationToken, Cancelled};
use crate::content::{Content, SkipReason, read_file, transform};
use crate::language::language_for;
use crate::patterns::PatternSet;
use crate::request::{ExternalFileRef, ExtractionRequest};
use ignore::{DirEntry, WalkBuilder};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One discovered file and everything the Markdown writer needs to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path relative to the root, or the caller's label for external files.
    pub rel_path: PathBuf,
    pub abs_path: PathBuf,
    pub size: u64,
    /// Fence info string; empty for unknown types.
    pub language: &'static str,
    /// `None` means the file is embedded.
    pub skip: Option<SkipReason>,
    /// Transformed text, present exactly when `skip` is `None`.
    pub content: Option<String>,
}

impl FileDescriptor {
    /// Descriptor for a file excluded by ignore or include rules. Its content
    /// is never read, so `size` is 0.
    pub fn ignored(rel_path: PathBuf, abs_path: PathBuf) -> Self {
        let language = language_for(&rel_path).map_or("", |l| l.tag);
        Self {
            rel_path,
            abs_path,
            size: 0,
            language,
            skip: Some(SkipReason::Ignored),
            content: None,
        }
    }

    pub fn is_included(&self) -> bool {
        self.skip.is_none()
    }
}

/// An explicitly requested file from outside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDescriptor {
    pub file: FileDescriptor,
    pub description: String,
}

/// A per-file problem recorded without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// Paths chosen for reading, before any content is loaded.
#[derive(Debug, Default)]
pub struct Scan {
    /// Root-relative path to absolute path, ordered by path components.
    pub candidates: BTreeMap<PathBuf, PathBuf>,
    /// Files excluded by ignore or include rules. Pruned directories are not listed.
    pub ignored: Vec<FileDescriptor>,
    pub errors: Vec<FileError>,
}

/// Everything collected for one request.
#[derive(Debug, Default)]
pub struct Collection {
    pub files: Vec<FileDescriptor>,
    pub external: Vec<ExternalDescriptor>,
    /// Never rendered; kept for counts and callers that want to list them.
    pub ignored: Vec<FileDescriptor>,
    pub errors: Vec<FileError>,
}

/// Walks `root` (or only the include paths beneath it) and picks the files to read.
///
/// Ignored directories are pruned without being entered. Symlinked
/// directories are never followed; symlinked files are kept.
pub fn scan(
    root: &Path,
    patterns: &Arc<PatternSet>,
    token: &CancellationToken,
) -> Result<Scan, Cancelled> {
    let mut scanner = Scanner {
        root,
        patterns,
        token,
        scan: Scan::default(),
    };

    if patterns.has_includes() {
        for include in patterns.include_paths() {
            scanner.scan_include(include)?;
        }
    } else {
        scanner.walk_from(root)?;
    }

    debug!(
        "Scan found {} candidates, {} ignored",
        scanner.scan.candidates.len(),
        scanner.scan.ignored.len()
    );
    Ok(scanner.scan)
}

struct Scanner<'a> {
    root: &'a Path,
    patterns: &'a Arc<PatternSet>,
    token: &'a CancellationToken,
    scan: Scan,
}

impl Scanner<'_> {
    fn scan_include(&mut self, include: &Path) -> Result<(), Cancelled> {
        if include.as_os_str().is_empty() {
            return self.walk_from(self.root);
        }
        if crosses_symlinked_dir(self.root, include) {
            warn!(
                "Skipping include path {}: it passes through a symlinked directory",
                include.display()
            );
            return Ok(());
        }

        let abs = self.root.join(include);
        let metadata = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(_) => {
                warn!("Specified include path does not exist: {}", abs.display());
                return Ok(());
            }
        };

        if metadata.is_dir() {
            if self.patterns.is_ignored(include, true) {
                debug!("Include path {} is ignored", include.display());
                return Ok(());
            }
            self.walk_from(&abs)
        } else if metadata.file_type().is_symlink() && abs.is_dir() {
            debug!("Not following symlinked directory {}", include.display());
            Ok(())
        } else {
            self.consider(include.to_path_buf(), abs);
            Ok(())
        }
    }

    fn walk_from(&mut self, start: &Path) -> Result<(), Cancelled> {
        let mut builder = WalkBuilder::new(start);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b));

        let prune_root = self.root.to_path_buf();
        let prune_patterns = Arc::clone(self.patterns);
        builder.filter_entry(move |entry| {
            if !entry.file_type().is_some_and(|t| t.is_dir()) {
                return true;
            }
            let rel = entry.path().strip_prefix(&prune_root).unwrap_or(entry.path());
            let keep = !prune_patterns.is_ignored(rel, true);
            if !keep {
                debug!("Pruning ignored directory {}", rel.display());
            }
            keep
        });

        for result in builder.build() {
            if self.token.is_cancelled() {
                return Err(Cancelled);
            }
            match result {
                Ok(entry) => self.visit(&entry),
                Err(err) => {
                    warn!("Error walking path: {err}");
                    let path = error_path(&err).unwrap_or(start).to_path_buf();
                    self.scan.errors.push(FileError {
                        path,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn visit(&mut self, entry: &DirEntry) {
        let Some(file_type) = entry.file_type() else {
            return;
        };
        if file_type.is_dir() {
            return;
        }

        let abs = entry.path();
        if file_type.is_symlink() && abs.is_dir() {
            debug!("Not following symlinked directory {}", abs.display());
            return;
        }

        if let Ok(rel) = abs.strip_prefix(self.root) {
            self.consider(rel.to_path_buf(), abs.to_path_buf());
        }
    }

    fn consider(&mut self, rel: PathBuf, abs: PathBuf) {
        if self.patterns.is_ignored(&rel, false) || !self.patterns.is_included(&rel) {
            debug!("Ignoring {}", rel.display());
            self.scan.ignored.push(FileDescriptor::ignored(rel, abs));
            return;
        }
        self.scan.candidates.insert(rel, abs);
    }
}

/// The entry a walk error is about, if the error names one.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

/// True if any directory strictly between `root` and `root/rel` is a symlink.
fn crosses_symlinked_dir(root: &Path, rel: &Path) -> bool {
    let mut current = root.to_path_buf();
    let mut components = rel.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return true;
        }
    }
    false
}

/// Reads and transforms one file. Never fails; problems land in `skip`.
pub fn describe(
    rel_path: PathBuf,
    abs_path: PathBuf,
    max_bytes: u64,
    strip_comments: bool,
) -> (FileDescriptor, Option<FileError>) {
    let language = language_for(&rel_path);
    let outcome = read_file(&abs_path, max_bytes);

    let (skip, content, error) = match outcome.content {
        Content::Text(text) => (None, Some(transform(&text, language, strip_comments)), None),
        Content::Skipped { reason, detail } => {
            let error = detail.map(|message| {
                warn!("Could not read {}: {message}", abs_path.display());
                FileError {
                    path: abs_path.clone(),
                    message,
                }
            });
            debug!("Skipping {} ({reason})", rel_path.display());
            (Some(reason), None, error)
        }
    };

    let descriptor = FileDescriptor {
        rel_path,
        abs_path,
        size: outcome.size,
        language: language.map_or("", |l| l.tag),
        skip,
        content,
    };
    (descriptor, error)
}

/// Reads every scanned candidate, in parallel, keeping traversal order.
pub fn read_candidates(
    scan: Scan,
    request: &ExtractionRequest,
    token: &CancellationToken,
) -> Result<Collection, Cancelled> {
    let Scan {
        candidates,
        ignored,
        mut errors,
    } = scan;
    let candidates: Vec<(PathBuf, PathBuf)> = candidates.into_iter().collect();

    let described: Option<Vec<_>> = candidates
        .into_par_iter()
        .map(|(rel, abs)| {
            if token.is_cancelled() {
                return None;
            }
            Some(describe(
                rel,
                abs,
                request.max_file_size,
                request.strip_comments,
            ))
        })
        .collect();
    let described = described.ok_or(Cancelled)?;

    let mut files = Vec::with_capacity(described.len());
    for (descriptor, error) in described {
        files.push(descriptor);
        errors.extend(error);
    }

    Ok(Collection {
        files,
        external: Vec::new(),
        ignored,
        errors,
    })
}

/// Reads external files. They bypass ignore and include rules but not the
/// size gate or the binary check.
pub fn read_external(
    refs: &[ExternalFileRef],
    request: &ExtractionRequest,
    token: &CancellationToken,
) -> Result<(Vec<ExternalDescriptor>, Vec<FileError>), Cancelled> {
    let mut external = Vec::with_capacity(refs.len());
    let mut errors = Vec::new();

    for file_ref in refs {
        if token.is_cancelled() {
            return Err(Cancelled);
        }
        let label = PathBuf::from(&file_ref.path);
        let abs = std::path::absolute(&label).unwrap_or_else(|_| label.clone());
        let (file, error) = describe(label, abs, request.max_file_size, request.strip_comments);

        external.push(ExternalDescriptor {
            file,
            description: file_ref.description.clone(),
        });
        errors.extend(error);
    }

    Ok((external, errors))
}

/// Reads a finished scan and the request's external files.
pub fn read_scanned(
    scanned: Scan,
    request: &ExtractionRequest,
    token: &CancellationToken,
) -> Result<Collection, Cancelled> {
    let mut collection = read_candidates(scanned, request, token)?;
    let (external, errors) = read_external(&request.external_files, request, token)?;
    collection.external = external;
    collection.errors.extend(errors);
    Ok(collection)
}

/// Runs the full collection for a request whose root (if any) is already validated.
pub fn collect(
    request: &ExtractionRequest,
    patterns: &Arc<PatternSet>,
    token: &CancellationToken,
) -> Result<Collection, Cancelled> {
    let scanned = match &request.root {
        Some(root) => scan(root, patterns, token)?,
        None => Scan::default(),
    };
    read_scanned(scanned, request, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    fn rels(collection: &Collection) -> Vec<String> {
        collection
            .files
            .iter()
            .map(|f| f.rel_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn run(root: &Path, ignores: &str, includes: &str) -> Collection {
        let request = ExtractionRequest::for_root(root);
        let patterns = Arc::new(PatternSet::compile(ignores, includes));
        collect(&request, &patterns, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_walk_is_sorted_and_prunes_ignored_dirs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "b.py", "b");
        write(root, "a.py", "a");
        write(root, "src/z.rs", "z");
        write(root, "src/lib/m.rs", "m");
        write(root, "node_modules/x.js", "x");
        write(root, "app.log", "log");

        let collection = run(root, "node_modules/\n*.log", "");
        assert_eq!(
            rels(&collection),
            vec!["a.py", "b.py", "src/lib/m.rs", "src/z.rs"]
        );

        assert_eq!(collection.ignored.len(), 1);
        let ignored = &collection.ignored[0];
        assert_eq!(ignored.rel_path, PathBuf::from("app.log"));
        assert_eq!(ignored.skip, Some(SkipReason::Ignored));
        assert!(ignored.content.is_none());
    }

    #[test]
    fn test_include_mode_marks_other_files_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.rs", "fn main() {}");
        write(root, "src/notes.tmp", "scratch");

        let collection = run(root, "*.tmp", "src");
        assert_eq!(rels(&collection), vec!["src/main.rs"]);
        let ignored: Vec<_> = collection.ignored.iter().map(|f| f.skip).collect();
        assert_eq!(ignored, vec![Some(SkipReason::Ignored)]);
    }

    #[test]
    fn test_walk_error_names_failing_entry() {
        let inner = ignore::Error::Io(std::io::Error::other("denied"));
        let err = ignore::Error::WithDepth {
            depth: 2,
            err: Box::new(ignore::Error::WithPath {
                path: PathBuf::from("/project/locked"),
                err: Box::new(inner),
            }),
        };
        assert_eq!(error_path(&err), Some(Path::new("/project/locked")));

        let bare = ignore::Error::Io(std::io::Error::other("denied"));
        assert_eq!(error_path(&bare), None);
    }

    #[test]
    fn test_missing_walk_root_is_recorded() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let patterns = Arc::new(PatternSet::empty());
        let scanned = scan(&missing, &patterns, &CancellationToken::new()).unwrap();
        assert!(scanned.candidates.is_empty());
        assert_eq!(scanned.errors.len(), 1);
        assert_eq!(scanned.errors[0].path, missing);
    }

    #[test]
    fn test_include_mode_only_visits_listed_paths() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.rs", "fn main() {}");
        write(root, "src/util.rs", "");
        write(root, "docs/guide.md", "# Guide");
        write(root, "docs/other.md", "# Other");
        write(root, "README.md", "# Readme");

        let collection = run(root, "", "src\ndocs/guide.md\nmissing/file.txt\n../escape");
        assert_eq!(
            rels(&collection),
            vec!["docs/guide.md", "src/main.rs", "src/util.rs"]
        );
    }

    #[test]
    fn test_include_inside_ignored_dir_is_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "build/out.txt", "x");
        write(root, "build/gen/a.txt", "x");

        assert!(run(root, "build/", "build/out.txt\nbuild/gen").files.is_empty());
    }

    #[test]
    fn test_skipped_files_are_kept_with_reason() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "big.txt", &"x".repeat(2048));
        fs::write(root.join("blob.bin"), [0u8, 1, 2, 3]).unwrap();

        let request = ExtractionRequest {
            max_file_size: 1024,
            ..ExtractionRequest::for_root(root)
        };
        let patterns = Arc::new(PatternSet::empty());
        let collection = collect(&request, &patterns, &CancellationToken::new()).unwrap();

        let skips: Vec<_> = collection.files.iter().map(|f| f.skip).collect();
        assert_eq!(skips, vec![Some(SkipReason::TooLarge), Some(SkipReason::Binary)]);
        assert!(collection.files.iter().all(|f| f.content.is_none()));
        assert_eq!(collection.files[0].size, 2048);
    }

    #[test]
    fn test_content_is_transformed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "a.py", "# comment\ncode()\n");

        let request = ExtractionRequest {
            strip_comments: true,
            ..ExtractionRequest::for_root(root)
        };
        let patterns = Arc::new(PatternSet::empty());
        let collection = collect(&request, &patterns, &CancellationToken::new()).unwrap();
        assert_eq!(collection.files[0].content.as_deref(), Some("code()"));
        assert_eq!(collection.files[0].language, "python");
    }

    #[test]
    fn test_external_files_bypass_patterns() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("notes.log");
        fs::write(&outside, "kept").unwrap();

        let request = ExtractionRequest {
            external_files: vec![
                ExternalFileRef::new(outside.to_string_lossy(), "log notes"),
                ExternalFileRef::new(dir.path().join("gone.txt").to_string_lossy(), "missing"),
            ],
            ..ExtractionRequest::default()
        };
        let patterns = Arc::new(PatternSet::compile("*.log", ""));
        let collection = collect(&request, &patterns, &CancellationToken::new()).unwrap();

        assert!(collection.files.is_empty());
        assert_eq!(collection.external.len(), 2);
        assert_eq!(collection.external[0].file.content.as_deref(), Some("kept"));
        assert_eq!(collection.external[0].description, "log notes");
        assert_eq!(collection.external[1].file.skip, Some(SkipReason::Unreadable));
        assert_eq!(collection.errors.len(), 1);
    }

    #[test]
    fn test_cancelled_token_stops_collection() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", "a");

        let token = CancellationToken::new();
        token.cancel();
        let request = ExtractionRequest::for_root(dir.path());
        let patterns = Arc::new(PatternSet::empty());
        assert_eq!(collect(&request, &patterns, &token).unwrap_err(), Cancelled);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "sub/file.txt", "x");
        std::os::unix::fs::symlink(root, root.join("sub/loop")).unwrap();
        std::os::unix::fs::symlink(root.join("sub/file.txt"), root.join("link.txt")).unwrap();

        let collection = run(root, "", "");
        assert_eq!(rels(&collection), vec!["link.txt", "sub/file.txt"]);
        assert_eq!(collection.files[0].content.as_deref(), Some("x"));

        assert!(run(root, "", "sub/loop/sub").files.is_empty());
    }
}
