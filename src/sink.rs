//! Output delivery seam between the harness and its host runtime.
//!
//! Everything the harness produces, tool output chunks and harness status
//! lines alike, goes through an [`OutputSink`]. The CLI front end forwards
//! to the real stdout/stderr; embedders and tests can capture instead.

use std::io::Write;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

/// Which stream a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// Receives output chunks as they become available.
///
/// Chunks arrive in the order they were observed per stream and are not
/// guaranteed to be whole lines.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write_stdout(&self, text: &str) -> Result<()>;
    async fn write_stderr(&self, text: &str) -> Result<()>;
}

/// Forwards chunks verbatim to the host process stdout/stderr, flushing
/// after every chunk so partial lines appear as soon as the tool emits them.
pub struct StdioSink;

#[async_trait]
impl OutputSink for StdioSink {
    async fn write_stdout(&self, text: &str) -> Result<()> {
        let mut out = std::io::stdout();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    async fn write_stderr(&self, text: &str) -> Result<()> {
        let mut err = std::io::stderr();
        err.write_all(text.as_bytes())?;
        err.flush()?;
        Ok(())
    }
}

/// Records every chunk in arrival order. Used by tests and embedders that
/// want the transcript instead of terminal output.
#[derive(Default)]
pub struct CaptureSink {
    chunks: Mutex<Vec<(StreamSource, String)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All chunks captured so far, in arrival order.
    pub fn chunks(&self) -> Vec<(StreamSource, String)> {
        self.chunks.lock().unwrap().clone()
    }

    /// Concatenated stdout chunks.
    pub fn stdout(&self) -> String {
        self.collect(StreamSource::Stdout)
    }

    /// Concatenated stderr chunks.
    pub fn stderr(&self) -> String {
        self.collect(StreamSource::Stderr)
    }

    fn collect(&self, source: StreamSource) -> String {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    fn push(&self, source: StreamSource, text: &str) {
        self.chunks.lock().unwrap().push((source, text.to_string()));
    }
}

#[async_trait]
impl OutputSink for CaptureSink {
    async fn write_stdout(&self, text: &str) -> Result<()> {
        self.push(StreamSource::Stdout, text);
        Ok(())
    }

    async fn write_stderr(&self, text: &str) -> Result<()> {
        self.push(StreamSource::Stderr, text);
        Ok(())
    }
}
