//! Append-only diagnostic log for import runs.
//!
//! Sinks never fail from the caller's point of view: write errors are
//! swallowed at the sink boundary.
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, line: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _line: &str) {}
}

/// Appends `<rfc3339> <line>` to a file. Lines are stamped when recorded and
/// written in order by a single background task, so `record` never blocks.
#[derive(Debug)]
pub struct FileSink {
    tx: UnboundedSender<String>,
    writer: JoinHandle<()>,
}

impl FileSink {
    /// Spawns the writer task; must be called from within a tokio runtime.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(path.into(), rx));
        Self { tx, writer }
    }

    /// Stop accepting lines and wait until everything recorded is written.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(err) = self.writer.await {
            debug!(?err, "diagnostic writer stopped abnormally");
        }
    }
}

async fn append(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await
}

async fn write_lines(path: PathBuf, mut rx: UnboundedReceiver<String>) {
    let mut warned = false;
    while let Some(line) = rx.recv().await {
        if let Err(err) = append(&path, &line).await {
            if !warned {
                warned = true;
                debug!(?err, path = %path.display(), "diagnostic log write failed");
            }
        }
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, line: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        // a closed channel means the writer is gone; the line is dropped
        let _ = self
            .tx
            .send(format!("{} {}\n", stamp, line.replace('\n', " ")));
    }
}

/// Keeps lines in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_sink_appends_timestamped_lines() {
        let td = tempdir().unwrap();
        let path = td.path().join("import.log");
        let sink = FileSink::new(&path);
        sink.record("first");
        sink.record("second\nline");
        sink.close().await;

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second line"));
        assert!(lines[0].contains('T'));
    }

    #[tokio::test]
    async fn file_sink_keeps_order_across_many_lines() {
        let td = tempdir().unwrap();
        let path = td.path().join("import.log");
        let sink = FileSink::new(&path);
        for i in 0..50 {
            sink.record(&format!("line {}", i));
        }
        sink.close().await;

        let text = std::fs::read_to_string(&path).unwrap();
        let numbers: Vec<String> = text
            .lines()
            .map(|l| l.split(' ').skip(2).collect::<Vec<_>>().join(" "))
            .collect();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(numbers, expected);
    }

    #[tokio::test]
    async fn file_sink_swallows_errors() {
        let td = tempdir().unwrap();
        // a directory cannot be opened for appending
        let sink = FileSink::new(td.path());
        sink.record("lost");
        sink.record("lost again");
        sink.close().await;
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemorySink::default();
        sink.record("a");
        sink.record("b");
        assert_eq!(sink.lines(), vec!["a", "b"]);
    }
}
