//! # codescribe Library
//!
//! Turns a project directory, plus any standalone files from elsewhere, into a
//! single Markdown document for pasting into an LLM prompt: a directory tree
//! followed by one fenced code block per file.
//!
//! Files that cannot be embedded (too large, binary, unreadable) are marked in
//! the tree instead of aborting the run. Only a missing or invalid root is
//! fatal.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use codescribe::{ExtractionRequest, extract};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let request = ExtractionRequest {
//!         ignore_patterns: "target/\n*.log".to_string(),
//!         strip_comments: true,
//!         ..ExtractionRequest::for_root(std::env::current_dir()?)
//!     };
//!
//!     let report = extract(request).await?;
//!     println!("{}", report.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ### Streaming progress
//!
//! ```rust,no_run
//! use codescribe::{Extractor, ExtractionRequest};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let mut extractor = Extractor::new(ExtractionRequest::for_root(".")).with_events(tx);
//!
//!     let printer = tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             println!("{}", serde_json::to_string(&event).unwrap());
//!         }
//!     });
//!
//!     extractor.run().await;
//!     drop(extractor);
//!     printer.await.unwrap();
//! }
//! ```

pub mod cancel;
pub mod cli;
pub mod content;
pub mod error;
pub mod extractor;
pub mod filewalker;
pub mod language;
pub mod patterns;
pub mod request;
pub mod writer;

pub use cancel::CancellationToken;
pub use cli::{Config, OutputTarget};
pub use content::SkipReason;
pub use error::ExtractionError;
pub use extractor::{ExtractionEvent, ExtractionReport, ExtractionState, Extractor, extract};
pub use filewalker::{ExternalDescriptor, FileDescriptor, collect};
pub use patterns::PatternSet;
pub use request::{ExternalFileRef, ExtractionRequest, RequestPayload};
pub use writer::{MarkdownWriter, render};

use anyhow::{Context, Result, bail};
use log::info;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

/// Runs one extraction as configured on the command line.
pub async fn run_codescribe(config: Config) -> Result<()> {
    if config.events {
        return stream_events(config.request).await;
    }

    let report = extract(config.request).await?;
    for error in &report.errors {
        info!("Skipped {}: {}", error.path.display(), error.message);
    }

    match &config.output {
        OutputTarget::Stdout => {
            let mut stdout = BufWriter::new(tokio::io::stdout());
            write_document(&mut stdout, &report.markdown).await?;
        }
        OutputTarget::File(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_document(&mut writer, &report.markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote: {}", path.display());
        }
    }
    Ok(())
}

async fn write_document<W: AsyncWriteExt + Unpin>(writer: &mut W, markdown: &str) -> Result<()> {
    writer.write_all(markdown.as_bytes()).await?;
    if !markdown.ends_with('\n') {
        writer.write_all(b"\n").await?;
    }
    writer.flush().await.context("Failed to flush output")
}

/// Prints every event as one JSON line on stdout.
async fn stream_events(request: ExtractionRequest) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ExtractionEvent>();
    let mut extractor = Extractor::new(request).with_events(tx);

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = rx.recv().await {
            let line = serde_json::json!({ "event": event.name(), "data": event });
            stdout.write_all(format!("{line}\n").as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let outcome = extractor.run().await;
    drop(extractor);
    printer
        .await
        .context("Event printer task failed")?
        .context("Failed to write events")?;

    match outcome {
        Some(Ok(_)) => Ok(()),
        Some(Err(err)) => Err(err.into()),
        None => bail!("Extraction was cancelled"),
    }
}
