use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::config::TailerConfig;
use crate::split::LineBuffer;

/// Notifications from a file tailer to its owning session tailer
#[derive(Debug)]
pub enum TailEvent {
    /// Newline-terminated lines appended to the file, in file order
    Lines { path: PathBuf, lines: Vec<String> },

    /// A read or stat failed for a reason other than deletion
    ReadError { path: PathBuf, message: String },

    /// The file shrank below the read offset; the tailer restarted from
    /// byte 0 and the owner must restart its line numbering to match
    Truncated { path: PathBuf },

    /// The file is gone; emitted at most once, after which the tailer is
    /// done — a new file at the same path is not picked up
    Deleted { path: PathBuf },
}

/// Follows one append-only file as a stream of lines.
///
/// Tolerates the file not existing yet (sub-agent transcripts are tailed
/// from the moment they are named, which can precede creation), unreliable
/// native watchers (a safety-net poll runs alongside, and watcher failure
/// degrades to pure polling), truncation, and deletion.
pub struct FileTailer {
    path: PathBuf,
    handle: JoinHandle<()>,
}

impl FileTailer {
    pub fn spawn(
        path: PathBuf,
        initial_offset: u64,
        tx: UnboundedSender<TailEvent>,
        config: TailerConfig,
    ) -> Self {
        let worker = TailWorker {
            path: path.clone(),
            offset: initial_offset,
            buffer: LineBuffer::new(),
            tx,
            config,
        };
        let handle = tokio::spawn(worker.run());
        Self { path, handle }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for FileTailer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum Phase {
    Waiting,
    Watching,
    Polling,
    Finished,
}

enum Outcome {
    Progress,
    NoChange,
    Deleted,
}

struct TailWorker {
    path: PathBuf,
    offset: u64,
    buffer: LineBuffer,
    tx: UnboundedSender<TailEvent>,
    config: TailerConfig,
}

impl TailWorker {
    async fn run(mut self) {
        let mut phase = Phase::Waiting;
        loop {
            phase = match phase {
                Phase::Waiting => self.wait_for_file().await,
                Phase::Watching => self.watch().await,
                Phase::Polling => self.poll().await,
                Phase::Finished => return,
            };
        }
    }

    async fn wait_for_file(&mut self) -> Phase {
        loop {
            match tokio::fs::try_exists(&self.path).await {
                Ok(true) => return Phase::Watching,
                Ok(false) => {}
                Err(err) => self.report_error(&err.to_string()),
            }
            tokio::time::sleep(self.config.existence_poll).await;
        }
    }

    async fn watch(&mut self) -> Phase {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let _watcher = match start_watcher(&self.path, notify_tx) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "file watcher unavailable, falling back to polling"
                );
                return Phase::Polling;
            }
        };

        // Catch bytes written before the watcher attached
        if let Outcome::Deleted = self.read_new().await {
            return self.finish_deleted();
        }

        let mut safety = interval_at(
            Instant::now() + self.config.watcher_safety_poll,
            self.config.watcher_safety_poll,
        );

        loop {
            let outcome = tokio::select! {
                event = notify_rx.recv() => match event {
                    Some(Ok(_)) => {
                        // Let rapid write bursts settle, then fold queued
                        // notifications into one read
                        tokio::time::sleep(self.config.notify_debounce).await;
                        while notify_rx.try_recv().is_ok() {}
                        self.read_new().await
                    }
                    Some(Err(err)) => {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %err,
                            "file watcher errored, falling back to polling"
                        );
                        return Phase::Polling;
                    }
                    None => return Phase::Polling,
                },
                _ = safety.tick() => self.read_new().await,
            };

            match outcome {
                Outcome::Progress | Outcome::NoChange => {}
                Outcome::Deleted => return self.finish_deleted(),
            }
        }
    }

    async fn poll(&mut self) -> Phase {
        loop {
            tokio::time::sleep(self.config.polling_fallback_interval).await;

            if let Outcome::Deleted = self.read_new().await {
                return self.finish_deleted();
            }

            // Probe whether the native watcher works again
            let (probe_tx, _probe_rx) = mpsc::unbounded_channel();
            if start_watcher(&self.path, probe_tx).is_ok() {
                return Phase::Watching;
            }
        }
    }

    /// Read `[offset, size)` and emit any completed lines.
    ///
    /// The owning task serializes calls, so overlapping triggers collapse:
    /// whichever read runs next observes the cumulative size.
    async fn read_new(&mut self) -> Outcome {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Outcome::Deleted,
            Err(err) => {
                self.report_error(&err.to_string());
                return Outcome::NoChange;
            }
        };

        if size < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                offset = self.offset,
                size,
                "file shrank below read offset, restarting from the beginning"
            );
            self.offset = 0;
            self.buffer.reset();
            let _ = self.tx.send(TailEvent::Truncated {
                path: self.path.clone(),
            });
        }

        if size == self.offset {
            return Outcome::NoChange;
        }

        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Outcome::Deleted,
            Err(err) => {
                self.report_error(&err.to_string());
                return Outcome::NoChange;
            }
        };

        if let Err(err) = file.seek(SeekFrom::Start(self.offset)).await {
            self.report_error(&err.to_string());
            return Outcome::NoChange;
        }

        let mut chunk = vec![0u8; (size - self.offset) as usize];
        if let Err(err) = file.read_exact(&mut chunk).await {
            self.report_error(&err.to_string());
            return Outcome::NoChange;
        }
        self.offset = size;

        let lines = self.buffer.push(&chunk);
        if !lines.is_empty() {
            let _ = self.tx.send(TailEvent::Lines {
                path: self.path.clone(),
                lines,
            });
        }
        Outcome::Progress
    }

    fn finish_deleted(&mut self) -> Phase {
        let _ = self.tx.send(TailEvent::Deleted {
            path: self.path.clone(),
        });
        Phase::Finished
    }

    fn report_error(&self, message: &str) {
        tracing::warn!(path = %self.path.display(), message, "tail read failed");
        let _ = self.tx.send(TailEvent::ReadError {
            path: self.path.clone(),
            message: message.to_string(),
        });
    }
}

fn start_watcher(
    path: &Path,
    tx: UnboundedSender<notify::Result<Event>>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let _ = tx.send(result);
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
