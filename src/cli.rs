use crate::patterns::escape_glob;
use crate::request::{
    DEFAULT_EXTERNAL_DESCRIPTION, DEFAULT_IGNORES, DEFAULT_MAX_SIZE_KB, ExternalFileRef,
    ExtractionRequest, RequestPayload, kb_to_bytes,
};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where the finished document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
}

pub struct Config {
    pub request: ExtractionRequest,
    pub output: OutputTarget,
    /// Stream JSON-lines events on stdout instead of writing a document.
    pub events: bool,
    pub verbosity: u8,
    pub quiet: bool,
}

/// Largest `--max-size` whose byte count still fits in a `u64`.
const MAX_SIZE_KB_LIMIT: u64 = u64::MAX / 1024;

fn command() -> Command {
    Command::new("codescribe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extracts a project's file tree and sources into a single Markdown file")
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .help("Project root to scan (defaults to the current directory)")
                .num_args(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Sets the output .md file path, or - for stdout")
                .num_args(1),
        )
        .arg(
            Arg::new("ignore")
                .short('i')
                .long("ignore")
                .value_name("PATTERN")
                .help("Gitignore-style pattern to exclude (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("ignore-file")
                .long("ignore-file")
                .value_name("FILE")
                .help("Reads additional ignore patterns from a file")
                .num_args(1),
        )
        .arg(
            Arg::new("no-default-ignores")
                .long("no-default-ignores")
                .help("Do not pre-fill the built-in ignore patterns")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("include")
                .long("include")
                .value_name("PATH")
                .help("Restricts extraction to this relative path (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-size")
                .short('m')
                .long("max-size")
                .value_name("KB")
                .help("Largest file to embed, in kilobytes")
                .value_parser(value_parser!(u64).range(1..=MAX_SIZE_KB_LIMIT))
                .num_args(1),
        )
        .arg(
            Arg::new("strip-comments")
                .short('c')
                .long("strip-comments")
                .help("Removes comments from recognised source files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("external")
                .short('e')
                .long("external")
                .value_name("PATH[=DESCRIPTION]")
                .help("Adds a file from outside the project (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("request")
                .long("request")
                .value_name("FILE")
                .help("Reads a JSON extraction request from FILE, or - for stdin")
                .num_args(1)
                .conflicts_with_all([
                    "path",
                    "ignore",
                    "ignore-file",
                    "no-default-ignores",
                    "include",
                    "max-size",
                    "strip-comments",
                    "external",
                ]),
        )
        .arg(
            Arg::new("events")
                .long("events")
                .help("Streams progress and the result as JSON lines on stdout")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increases log verbosity (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Silences all logging")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
}

pub fn parse_args() -> Result<Config> {
    config_from_matches(command().get_matches())
}

/// Parses an explicit argument list; the first item is the program name.
pub fn parse_args_from<I, T>(args: I) -> Result<Config>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    config_from_matches(matches)
}

fn config_from_matches(matches: ArgMatches) -> Result<Config> {
    let current_dir = std::env::current_dir()?;

    let mut request = match matches.get_one::<String>("request") {
        Some(source) => read_request(source)?,
        None => request_from_flags(&matches, &current_dir)?,
    };

    let output = match matches.get_one::<String>("output").map(String::as_str) {
        Some("-") => OutputTarget::Stdout,
        Some(path) => OutputTarget::File(PathBuf::from(path)),
        None => OutputTarget::File(current_dir.join(default_filename(request.root.as_deref()))),
    };

    // Never embed the document being written.
    if let (OutputTarget::File(out), Some(root)) = (&output, &request.root) {
        if let Some(pattern) = self_exclusion_pattern(root, out) {
            request.ignore_patterns.push('\n');
            request.ignore_patterns.push_str(&pattern);
        }
    }

    Ok(Config {
        request,
        output,
        events: matches.get_flag("events"),
        verbosity: matches.get_count("verbose"),
        quiet: matches.get_flag("quiet"),
    })
}

fn request_from_flags(matches: &ArgMatches, current_dir: &Path) -> Result<ExtractionRequest> {
    let external_files: Vec<ExternalFileRef> = matches
        .get_many::<String>("external")
        .map(|vals| vals.map(|s| parse_external(s)).collect())
        .unwrap_or_default();

    let root = match matches.get_one::<String>("path") {
        Some(path) => Some(PathBuf::from(path)),
        None if external_files.is_empty() => Some(current_dir.to_path_buf()),
        None => None,
    };

    let mut ignore_patterns = String::new();
    if !matches.get_flag("no-default-ignores") {
        ignore_patterns.push_str(DEFAULT_IGNORES);
    }
    if let Some(file) = matches.get_one::<String>("ignore-file") {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read ignore file: {file}"))?;
        ignore_patterns.push('\n');
        ignore_patterns.push_str(&text);
    }
    for pattern in matches.get_many::<String>("ignore").into_iter().flatten() {
        ignore_patterns.push('\n');
        ignore_patterns.push_str(pattern);
    }

    let include_paths = matches
        .get_many::<String>("include")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    let max_kb = matches
        .get_one::<u64>("max-size")
        .copied()
        .unwrap_or(DEFAULT_MAX_SIZE_KB);

    Ok(ExtractionRequest {
        root,
        include_paths,
        ignore_patterns,
        max_file_size: kb_to_bytes(max_kb),
        strip_comments: matches.get_flag("strip-comments"),
        external_files,
    })
}

fn read_request(source: &str) -> Result<ExtractionRequest> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read request file: {source}"))?
    };

    let payload: RequestPayload =
        serde_json::from_str(&text).context("Request is not valid JSON")?;
    Ok(payload.into_request())
}

/// Splits `PATH=DESCRIPTION`; a bare path gets the default description.
pub fn parse_external(arg: &str) -> ExternalFileRef {
    match arg.split_once('=') {
        Some((path, desc)) if !desc.trim().is_empty() => ExternalFileRef::new(path, desc.trim()),
        Some((path, _)) => ExternalFileRef::new(path, DEFAULT_EXTERNAL_DESCRIPTION),
        None => ExternalFileRef::new(arg, DEFAULT_EXTERNAL_DESCRIPTION),
    }
}

/// `{project}_content_{epoch}.md`
fn default_filename(root: Option<&Path>) -> String {
    let folder_name = root
        .and_then(|r| std::fs::canonicalize(r).ok())
        .and_then(|r| r.file_name().and_then(|n| n.to_str()).map(String::from))
        .unwrap_or_else(|| "project".to_string());

    let timestamp = Utc::now().timestamp();
    format!("{folder_name}_content_{timestamp}.md")
}

/// Anchored ignore pattern for `output` when it lies inside `root`.
fn self_exclusion_pattern(root: &Path, output: &Path) -> Option<String> {
    let root = std::fs::canonicalize(root).ok()?;
    let file_name = output.file_name()?;
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir().ok()?,
    };
    let output = std::fs::canonicalize(parent).ok()?.join(file_name);

    let rel = output.strip_prefix(&root).ok()?;
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(format!("/{}", escape_glob(&rel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flags_build_request() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let out = dir.path().join("out.md").to_string_lossy().to_string();

        let config = parse_args_from([
            "codescribe",
            root.as_str(),
            "-o",
            out.as_str(),
            "-i",
            "*.tmp",
            "--include",
            "src",
            "-m",
            "8",
            "-c",
            "-e",
            "/etc/hosts=Hosts file",
            "-vv",
        ])
        .unwrap();

        let request = &config.request;
        assert_eq!(request.root.as_deref(), Some(dir.path()));
        assert!(request.ignore_patterns.contains("node_modules/"));
        assert!(request.ignore_patterns.contains("*.tmp"));
        assert!(request.ignore_patterns.ends_with("/out.md"));
        assert_eq!(request.include_paths, vec!["src"]);
        assert_eq!(request.max_file_size, 8 * 1024);
        assert!(request.strip_comments);
        assert_eq!(
            request.external_files,
            vec![ExternalFileRef::new("/etc/hosts", "Hosts file")]
        );
        assert_eq!(config.output, OutputTarget::File(PathBuf::from(&out)));
        assert_eq!(config.verbosity, 2);
        assert!(!config.events);
    }

    #[test]
    fn test_external_only_has_no_root() {
        let config =
            parse_args_from(["codescribe", "-e", "/tmp/a.txt", "-o", "-", "--no-default-ignores"])
                .unwrap();
        assert_eq!(config.request.root, None);
        assert_eq!(config.output, OutputTarget::Stdout);
        assert!(config.request.ignore_patterns.is_empty());
        assert_eq!(
            config.request.external_files[0].description,
            DEFAULT_EXTERNAL_DESCRIPTION
        );
    }

    #[test]
    fn test_request_file() {
        let dir = tempdir().unwrap();
        let request_path = dir.path().join("request.json");
        std::fs::write(
            &request_path,
            r#"{"path": "", "max_size": "2", "external_files": [{"path": "/x", "description": "d"}]}"#,
        )
        .unwrap();

        let config = parse_args_from([
            "codescribe",
            "--request",
            request_path.to_str().unwrap(),
            "--events",
        ])
        .unwrap();
        assert!(config.events);
        assert_eq!(config.request.root, None);
        assert_eq!(config.request.max_file_size, 2048);
        assert!(config.request.ignore_patterns.is_empty());
    }

    #[test]
    fn test_request_conflicts_with_flags() {
        assert!(parse_args_from(["codescribe", "--request", "r.json", "-c"]).is_err());
    }

    #[test]
    fn test_invalid_max_size_rejected() {
        assert!(parse_args_from(["codescribe", "-m", "zero"]).is_err());
        assert!(parse_args_from(["codescribe", "-m", "0"]).is_err());

        let too_big = (MAX_SIZE_KB_LIMIT + 1).to_string();
        assert!(parse_args_from(["codescribe", "-m", too_big.as_str()]).is_err());

        let limit = MAX_SIZE_KB_LIMIT.to_string();
        let config = parse_args_from(["codescribe", "-m", limit.as_str(), "-o", "-"]).unwrap();
        assert_eq!(config.request.max_file_size, MAX_SIZE_KB_LIMIT * 1024);
    }

    #[test]
    fn test_parse_external() {
        assert_eq!(parse_external("a.txt=  notes "), ExternalFileRef::new("a.txt", "notes"));
        assert_eq!(
            parse_external("a.txt="),
            ExternalFileRef::new("a.txt", DEFAULT_EXTERNAL_DESCRIPTION)
        );
    }

    #[test]
    fn test_output_outside_root_is_not_excluded() {
        let project = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        assert_eq!(
            self_exclusion_pattern(project.path(), &elsewhere.path().join("out.md")),
            None
        );
        assert_eq!(
            self_exclusion_pattern(project.path(), &project.path().join("docs[1].md")),
            Some("/docs\\[1\\].md".to_string())
        );
    }
}
