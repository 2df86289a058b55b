#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;
use tailview_runtime::{Subscriber, SubscriberId, TailerConfig};

static TRACING: OnceLock<()> = OnceLock::new();

/// Route runtime logs through the test writer; `RUST_LOG=debug` shows the
/// lifecycle transitions when a test misbehaves
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Production timings shrunk so the suite stays fast; heartbeats pushed out
/// of the way for tests that do not assert on them.
pub fn fast_config() -> TailerConfig {
    init_tracing();
    TailerConfig {
        coalesce_window: Duration::from_millis(25),
        heartbeat_interval: Duration::from_secs(60),
        idle_check_interval: Duration::from_millis(50),
        idle_threshold: Duration::from_millis(400),
        grace_period: Duration::from_millis(200),
        ring_capacity: 1000,
        drop_threshold_bytes: 1024 * 1024,
        existence_poll: Duration::from_millis(25),
        watcher_safety_poll: Duration::from_millis(100),
        notify_debounce: Duration::from_millis(10),
        polling_fallback_interval: Duration::from_millis(50),
        dir_retry_interval: Duration::from_millis(50),
    }
}

/// Subscriber that records every frame it is handed
pub struct RecordingSubscriber {
    id: SubscriberId,
    frames: Mutex<Vec<String>>,
    buffered: AtomicUsize,
}

impl RecordingSubscriber {
    pub fn new(id: SubscriberId) -> Self {
        Self {
            id,
            frames: Mutex::new(Vec::new()),
            buffered: AtomicUsize::new(0),
        }
    }

    pub fn set_buffered(&self, bytes: usize) {
        self.buffered.store(bytes, Ordering::Relaxed);
    }

    pub fn frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn frames_of_type(&self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }
}

impl Subscriber for RecordingSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn send(&self, frame: &str) -> anyhow::Result<()> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }
}

/// Poll until `cond` holds or the deadline passes
pub async fn wait_for<F>(cond: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

pub fn write_file(path: &Path, lines: &[String]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).unwrap();
}

pub fn append_line(path: &Path, line: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    writeln!(file, "{line}").unwrap();
}

pub fn agent_dir_for(session_file: &Path) -> PathBuf {
    let stem = session_file.file_stem().unwrap().to_string_lossy().into_owned();
    session_file.parent().unwrap().join(stem).join("subagents")
}

// --- transcript record builders ---

pub fn user_text(session: &str, uuid: &str, ts: &str, text: &str) -> String {
    format!(
        r#"{{"type":"user","uuid":"{uuid}","sessionId":"{session}","timestamp":"{ts}","message":{{"role":"user","content":"{text}"}}}}"#
    )
}

pub fn assistant_text(session: &str, uuid: &str, ts: &str, text: &str) -> String {
    format!(
        r#"{{"type":"assistant","uuid":"{uuid}","sessionId":"{session}","timestamp":"{ts}","message":{{"role":"assistant","content":[{{"type":"text","text":"{text}"}}]}}}}"#
    )
}

pub fn task_tool_use(
    session: &str,
    uuid: &str,
    ts: &str,
    tool_use_id: &str,
    description: &str,
) -> String {
    format!(
        r#"{{"type":"assistant","uuid":"{uuid}","sessionId":"{session}","timestamp":"{ts}","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"{tool_use_id}","name":"Task","input":{{"description":"{description}"}}}}]}}}}"#
    )
}

pub fn task_tool_result(
    session: &str,
    uuid: &str,
    ts: &str,
    tool_use_id: &str,
    agent_id: &str,
) -> String {
    format!(
        r#"{{"type":"user","uuid":"{uuid}","sessionId":"{session}","timestamp":"{ts}","toolUseResult":{{"agentId":"{agent_id}"}},"message":{{"role":"user","content":[{{"type":"tool_result","tool_use_id":"{tool_use_id}","content":"done"}}]}}}}"#
    )
}
