use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::RegistryConfig;
use crate::session_tailer::{SessionTailer, SessionTailerHandle};

/// Multiplexes session tailers across subscribers.
///
/// One tailer per session file path, shared by every subscriber watching
/// that session; capacity-capped so a burst of connections cannot spawn
/// unbounded watchers. Cheap to clone; clones share the map.
#[derive(Clone)]
pub struct TailerRegistry {
    inner: Arc<Mutex<HashMap<PathBuf, SessionTailerHandle>>>,
    config: RegistryConfig,
}

impl TailerRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// The tailer for `session_file`, spawning one if needed.
    ///
    /// Returns `None` at capacity; the caller rejects the connection.
    pub fn get_or_create(&self, session_file: &Path) -> Option<SessionTailerHandle> {
        let mut tailers = self.inner.lock().unwrap();

        if let Some(handle) = tailers.get(session_file) {
            return Some(handle.clone());
        }

        if tailers.len() >= self.config.max_tailers {
            tracing::warn!(
                session = %session_file.display(),
                max = self.config.max_tailers,
                "too many active tail sessions"
            );
            return None;
        }

        let handle = SessionTailer::spawn(session_file.to_path_buf(), self.config.tailer.clone());
        tailers.insert(session_file.to_path_buf(), handle.clone());
        Some(handle)
    }

    /// Called after a subscriber detaches from `session_file`.
    ///
    /// The tailer's own grace-based teardown runs on its side; this only
    /// schedules a sweep just past the grace period that drops the map
    /// entry if nobody came back.
    pub fn release(&self, session_file: &Path) {
        let inner = Arc::clone(&self.inner);
        let path = session_file.to_path_buf();
        let delay = self.config.tailer.grace_period + self.config.sweep_margin;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut tailers = inner.lock().unwrap();
            if let Some(handle) = tailers.get(&path)
                && handle.subscriber_count() == 0
            {
                tailers.remove(&path);
            }
        });
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
