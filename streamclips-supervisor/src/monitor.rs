//! Output capture for supervised children
//!
//! One reader task per stream forwards lines and a final "closed" event to a
//! single owning task per child. The owner persists lines, refreshes the
//! record's activity timestamp, issues exactly one stop on the first closed
//! stream and finally reaps the child.

use crate::supervisor::ProcessSupervisor;
use chrono::Utc;
use std::fmt;
use streamclips_storage::entities::{LogLevel, ProcessRecord};
use streamclips_storage::{LogRepository, ProcessRepository};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Which output stream of the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// stdout is informational, stderr is an error
    pub fn level(&self) -> LogLevel {
        match self {
            OutputStream::Stdout => LogLevel::Info,
            OutputStream::Stderr => LogLevel::Error,
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Message from a stream reader to the owning task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Line { stream: OutputStream, line: String },
    Closed { stream: OutputStream },
}

/// Longer lines are forwarded in pieces of this many bytes
pub(crate) const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Forward every line of `reader` until end of stream, then report closure
pub(crate) async fn read_stream<R>(reader: R, stream: OutputStream, events: mpsc::Sender<OutputEvent>)
where
    R: AsyncRead + Unpin,
{
    read_stream_with_limit(reader, stream, events, MAX_LINE_BYTES).await
}

async fn read_stream_with_limit<R>(reader: R, stream: OutputStream, events: mpsc::Sender<OutputEvent>, limit: u64)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if events.send(OutputEvent::Line { stream, line }).await.is_err() {
                    // Owner is gone
                    return;
                }
            }
            Err(e) => {
                warn!("Error reading child {}: {}", stream, e);
                break;
            }
        }
    }

    let _ = events.send(OutputEvent::Closed { stream }).await;
}

/// Owning task of one supervised child
pub(crate) struct OutputMonitor {
    pub(crate) supervisor: ProcessSupervisor,
    pub(crate) record: ProcessRecord,
    pub(crate) source: String,
    pub(crate) child: Child,
    pub(crate) events: mpsc::Receiver<OutputEvent>,
    pub(crate) open_streams: usize,
    /// Resolves once the record is committed; dropped if it never will be
    pub(crate) gate: oneshot::Receiver<()>,
    pub(crate) exited: watch::Sender<bool>,
}

impl OutputMonitor {
    pub(crate) async fn run(mut self) {
        if (&mut self.gate).await.is_err() {
            self.discard().await;
            return;
        }

        let mut open_streams = self.open_streams;
        let mut stop_issued = false;

        if open_streams == 0 {
            self.stop_once(None).await;
            stop_issued = true;
        }

        while open_streams > 0 {
            let Some(event) = self.events.recv().await else {
                break;
            };

            match event {
                OutputEvent::Line { stream, line } => {
                    self.record_line(stream, &line, !stop_issued).await;
                }
                OutputEvent::Closed { stream } => {
                    open_streams -= 1;
                    if !stop_issued {
                        stop_issued = true;
                        self.stop_once(Some(stream)).await;
                    }
                }
            }
        }

        self.reap().await;
    }

    async fn record_line(&self, stream: OutputStream, line: &str, touch: bool) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let db = self.supervisor.db();
        if let Err(e) = LogRepository::new(db).append(&self.source, stream.level(), line).await {
            warn!("Failed to persist output of {}: {}", self.source, e);
            return;
        }

        if touch {
            if let Err(e) = ProcessRepository::new(db).touch_activity(self.record.id, Utc::now()).await {
                warn!("Failed to refresh activity of process {}: {}", self.record.id, e);
            }
        }
    }

    async fn stop_once(&self, stream: Option<OutputStream>) {
        match stream {
            Some(stream) => info!(
                "Process {} (pid {}) closed {}, stopping",
                self.record.id, self.record.pid, stream
            ),
            None => info!("Process {} (pid {}) has no output streams, stopping", self.record.id, self.record.pid),
        }

        match self.supervisor.stop(self.record.id).await {
            Ok(outcome) => debug!("Stop of process {} after end of output: {:?}", self.record.id, outcome),
            Err(e) => error!("Failed to stop process {} after end of output: {}", self.record.id, e),
        }
    }

    /// The record never committed: kill the child without touching storage
    async fn discard(mut self) {
        warn!(
            "Process record {} was not committed, killing pid {}",
            self.record.id, self.record.pid
        );
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill uncommitted child {}: {}", self.record.pid, e);
        }
        self.events.close();
        self.reap().await;
    }

    async fn reap(mut self) {
        match self.child.wait().await {
            Ok(status) => info!("Process {} (pid {}) exited: {}", self.record.id, self.record.pid, status),
            Err(e) => warn!("Failed to reap process {}: {}", self.record.pid, e),
        }
        self.supervisor.forget(self.record.id);
        let _ = self.exited.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_stream_forwards_lines_then_closed() {
        let input: &[u8] = b"first\n\nsecond\xff\nlast without newline";
        let (tx, mut rx) = mpsc::channel(8);

        read_stream(input, OutputStream::Stderr, tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0],
            OutputEvent::Line {
                stream: OutputStream::Stderr,
                line: "first\n".to_string()
            }
        );
        assert!(matches!(&events[2], OutputEvent::Line { line, .. } if line.starts_with("second")));
        assert!(matches!(&events[3], OutputEvent::Line { line, .. } if line == "last without newline"));
        assert_eq!(events[4], OutputEvent::Closed { stream: OutputStream::Stderr });
    }

    #[tokio::test]
    async fn test_read_stream_splits_overlong_lines() {
        let input: &[u8] = b"abcdefghij\nxy\n";
        let (tx, mut rx) = mpsc::channel(8);

        read_stream_with_limit(input, OutputStream::Stdout, tx, 4).await;

        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            if let OutputEvent::Line { line, .. } = event {
                lines.push(line);
            }
        }
        assert_eq!(lines, ["abcd", "efgh", "ij\n", "xy\n"]);
    }

    #[test]
    fn test_stream_levels() {
        assert_eq!(OutputStream::Stdout.level(), LogLevel::Info);
        assert_eq!(OutputStream::Stderr.level(), LogLevel::Error);
    }
}
