//! # Container Log Streaming (`common::docker::logs`)
//!
//! File: cli/src/common/docker/logs.rs
//!
//! ## Overview
//!
//! Follows a running container's combined log output and writes it to the
//! host's stdout and stderr, each line prefixed with the container name and
//! the stream it came from:
//!
//! ```text
//! [cansu.dev-pg-primary][stdout] database system is ready to accept connections
//! [cansu.dev-pg-primary][stderr] WARNING: no password set
//! ```
//!
//! ## Architecture
//!
//! - The engine delivers stdout and stderr interleaved in one framed stream;
//!   bollard decodes the frames into `LogOutput::StdOut` / `StdErr` items.
//!   `pump` routes each item to the matching sink.
//! - `LinePrefixer` is an `io::Write` adapter that inserts the label at the
//!   start of every line. It remembers the last byte it wrote so lines split
//!   across several writes get exactly one label, and a trailing line feed
//!   defers its label until more content arrives.
//! - `spawn_log_stream` runs the pump as a background task tied to a child
//!   cancellation token. The task ends at EOF or on cancellation; on
//!   cancellation the stream is dropped, which closes the HTTP response. The
//!   stream is owned by the pump, so it can only be closed once.
//!
use super::engine::{DockerError, Engine};
use super::state::{bare_name, ContainerHandle};
use crate::core::error::{OblivionError, Result};
use anyhow::anyhow;
use bollard::container::{LogOutput, LogsOptions};
use futures_util::{Stream, StreamExt};
use std::io::{self, Write};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Which half of the container output a sink carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        }
    }
}

/// `[<name>][<channel>] `, with the engine's leading `/` removed from the name.
pub fn line_label(container: &str, channel: Channel) -> String {
    format!("[{}][{}] ", bare_name(container), channel.as_str())
}

/// Writer that prefixes every line written through it with a label.
pub struct LinePrefixer<W: Write> {
    inner: W,
    label: Vec<u8>,
    last_byte: Option<u8>,
}

impl<W: Write> LinePrefixer<W> {
    pub fn new(inner: W, container: &str, channel: Channel) -> Self {
        Self {
            inner,
            label: line_label(container, channel).into_bytes(),
            last_byte: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LinePrefixer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // First write ever, or the previous write ended a line.
        if matches!(self.last_byte, None | Some(b'\n')) {
            self.inner.write_all(&self.label)?;
        }

        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' {
                self.inner.write_all(&buf[start..=i])?;
                start = i + 1;
                // A line feed ending the buffer gets its label on the next write.
                if start < buf.len() {
                    self.inner.write_all(&self.label)?;
                }
            }
        }
        if start < buf.len() {
            self.inner.write_all(&buf[start..])?;
        }

        self.last_byte = buf.last().copied();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// How a log pump finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEnd {
    Eof,
    Cancelled,
}

/// Copies `stream` into the two sinks until EOF or cancellation.
pub async fn pump<S, O, E>(
    mut stream: S,
    stdout: &mut LinePrefixer<O>,
    stderr: &mut LinePrefixer<E>,
    cancel: &CancellationToken,
) -> Result<LogEnd>
where
    S: Stream<Item = std::result::Result<LogOutput, DockerError>> + Unpin,
    O: Write,
    E: Write,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = stream.next() => Some(item),
        };

        match next {
            None => {
                // Closing the stream unblocks the pending read on the connection.
                drop(stream);
                debug!("Log stream cancelled");
                return Ok(LogEnd::Cancelled);
            }
            Some(None) => {
                stdout.flush()?;
                stderr.flush()?;
                return Ok(LogEnd::Eof);
            }
            Some(Some(Ok(output))) => match output {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.write_all(&message)?;
                    stdout.flush()?;
                }
                LogOutput::StdErr { message } => {
                    stderr.write_all(&message)?;
                    stderr.flush()?;
                }
                LogOutput::StdIn { .. } => {}
            },
            Some(Some(Err(e))) => {
                return Err(anyhow!(OblivionError::DockerApi { source: e })
                    .context("Failed to read container log stream"));
            }
        }
    }
}

/// A running background log follower. Dropping it cancels the follower.
pub struct LogStreamHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<LogEnd>>>,
}

impl LogStreamHandle {
    /// Cancels the follower and waits for it to finish.
    pub async fn stop(mut self) -> Result<LogEnd> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| anyhow!("log stream task failed: {}", e))?,
            None => Ok(LogEnd::Cancelled),
        }
    }
}

impl Drop for LogStreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Follows the container's logs to stdout/stderr in a background task.
///
/// The task stops when the container's stream ends, when `parent` is
/// cancelled, or when the returned handle is stopped or dropped.
#[instrument(skip(engine, handle, parent), fields(container = %handle.name))]
pub fn spawn_log_stream(
    engine: &dyn Engine,
    handle: &ContainerHandle,
    parent: &CancellationToken,
) -> LogStreamHandle {
    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        tail: "all".to_string(),
        ..Default::default()
    };
    let stream = engine.logs(&handle.id, options);
    let cancel = parent.child_token();
    let token = cancel.clone();
    let name = handle.name.clone();

    let task = tokio::spawn(async move {
        let mut out = LinePrefixer::new(io::stdout(), &name, Channel::Stdout);
        let mut err = LinePrefixer::new(io::stderr(), &name, Channel::Stderr);
        let result = pump(stream, &mut out, &mut err, &token).await;
        if let Err(e) = &result {
            warn!("Log stream for '{}' ended with error: {:#}", name, e);
        }
        result
    });

    LogStreamHandle {
        cancel,
        task: Some(task),
    }
}
