//! One extraction request, start to finish.
//!
//! An [`Extractor`] moves `Idle -> Running -> Completed | Failed`, emitting
//! zero or more progress events followed by exactly one terminal event. A
//! cancelled run ends in `Cancelled` and emits no terminal event at all.

use crate::cancel::{CancellationToken, Cancelled};
use crate::error::{ExtractionError, Result};
use crate::filewalker::{self, Collection, FileError, Scan};
use crate::patterns::PatternSet;
use crate::request::ExtractionRequest;
use crate::writer;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Message sent to whoever requested the extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExtractionEvent {
    Progress { message: String },
    Completed { markdown: String },
    Failed { error: String },
}

impl ExtractionEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        ExtractionEvent::Progress {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtractionEvent::Progress { .. })
    }

    /// Channel name used by socket-style transports.
    pub fn name(&self) -> &'static str {
        if self.is_terminal() {
            "extraction_complete"
        } else {
            "update_status"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionState {
    Idle,
    Running,
    Completed,
    Failed(ExtractionError),
    Cancelled,
}

impl ExtractionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtractionState::Idle | ExtractionState::Running)
    }
}

/// Successful outcome with the counts a front end may want to show.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub markdown: String,
    pub embedded: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub errors: Vec<FileError>,
}

impl ExtractionReport {
    fn new(markdown: String, collection: &Collection) -> Self {
        let all = collection
            .files
            .iter()
            .chain(collection.external.iter().map(|e| &e.file));
        let (embedded, skipped) = all.fold((0, 0), |(e, s), f| {
            if f.is_included() { (e + 1, s) } else { (e, s + 1) }
        });

        Self {
            markdown,
            embedded,
            skipped,
            ignored: collection.ignored.len(),
            errors: collection.errors.clone(),
        }
    }
}

/// Runs a single request. Concurrent requests use separate instances.
pub struct Extractor {
    request: Arc<ExtractionRequest>,
    state: ExtractionState,
    events: Option<UnboundedSender<ExtractionEvent>>,
    token: CancellationToken,
}

impl Extractor {
    pub fn new(request: ExtractionRequest) -> Self {
        Self {
            request: Arc::new(request),
            state: ExtractionState::Idle,
            events: None,
            token: CancellationToken::new(),
        }
    }

    /// Streams progress and the terminal event to `sender`. A closed receiver
    /// is treated as a disconnected caller and cancels the run.
    pub fn with_events(mut self, sender: UnboundedSender<ExtractionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> &ExtractionState {
        &self.state
    }

    /// Executes the request.
    ///
    /// Returns `None` if the run was cancelled or this instance was already
    /// used; otherwise the report or the request-level error.
    pub async fn run(&mut self) -> Option<Result<ExtractionReport>> {
        if self.state != ExtractionState::Idle {
            warn!("Extractor already used; ignoring second run");
            return None;
        }
        self.state = ExtractionState::Running;

        match self.execute().await {
            Ok(Some(report)) => {
                info!(
                    "Extraction complete: {} embedded, {} skipped, {} ignored",
                    report.embedded, report.skipped, report.ignored
                );
                self.state = ExtractionState::Completed;
                self.send(ExtractionEvent::Completed {
                    markdown: report.markdown.clone(),
                });
                Some(Ok(report))
            }
            Ok(None) => {
                info!("Extraction cancelled");
                self.state = ExtractionState::Cancelled;
                None
            }
            Err(err) => {
                warn!("Extraction failed: {err}");
                self.state = ExtractionState::Failed(err.clone());
                self.send(ExtractionEvent::Failed {
                    error: err.to_string(),
                });
                Some(Err(err))
            }
        }
    }

    async fn execute(&mut self) -> Result<Option<ExtractionReport>> {
        let root = validate(&self.request)?;
        self.progress("Initializing extractor...");

        let patterns = Arc::new(PatternSet::compile(
            &self.request.ignore_patterns,
            &self.request.include_text(),
        ));

        let mut request = (*self.request).clone();
        request.root = root;
        let request = Arc::new(request);

        if self.cancelled() {
            return Ok(None);
        }

        let scanned = match &request.root {
            Some(root) => {
                self.progress("Scanning project...");
                let (root, patterns, token) = (root.clone(), patterns.clone(), self.token.clone());
                let scanned = blocking(move || filewalker::scan(&root, &patterns, &token)).await?;
                match scanned {
                    Ok(scan) => scan,
                    Err(Cancelled) => return Ok(None),
                }
            }
            None => Scan::default(),
        };

        let total = scanned.candidates.len() + request.external_files.len();
        if self.cancelled() {
            return Ok(None);
        }
        self.progress(format!("Reading {total} files..."));

        let (read_request, token) = (request.clone(), self.token.clone());
        let collected =
            blocking(move || filewalker::read_scanned(scanned, &read_request, &token)).await?;
        let collection = match collected {
            Ok(collection) => collection,
            Err(Cancelled) => return Ok(None),
        };

        if self.cancelled() {
            return Ok(None);
        }
        self.progress("Rendering markdown...");
        let markdown = writer::render(&collection.files, &collection.external);

        if self.cancelled() {
            return Ok(None);
        }
        Ok(Some(ExtractionReport::new(markdown, &collection)))
    }

    fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn progress(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        self.send(ExtractionEvent::Progress { message });
    }

    fn send(&mut self, event: ExtractionEvent) {
        let Some(sender) = &self.events else {
            return;
        };
        if sender.send(event).is_err() {
            debug!("Event receiver dropped, cancelling extraction");
            self.token.cancel();
            self.events = None;
        }
    }
}

/// Checks the request can be scoped and resolves the root to an absolute path.
fn validate(request: &ExtractionRequest) -> Result<Option<PathBuf>> {
    if !request.has_scope() {
        return Err(ExtractionError::MissingScope);
    }
    let Some(root) = &request.root else {
        return Ok(None);
    };

    let metadata =
        std::fs::metadata(root).map_err(|_| ExtractionError::RootNotFound(root.clone()))?;
    if !metadata.is_dir() {
        return Err(ExtractionError::RootNotDirectory(root.clone()));
    }

    let resolved = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
    Ok(Some(resolved))
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ExtractionError::Internal(err.to_string()))
}

/// Runs `request` to completion without progress reporting.
pub async fn extract(request: ExtractionRequest) -> Result<ExtractionReport> {
    match Extractor::new(request).run().await {
        Some(result) => result,
        None => Err(ExtractionError::Internal(
            "extraction was cancelled".to_string(),
        )),
    }
}
