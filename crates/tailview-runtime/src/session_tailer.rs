use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tailview_parser::{
    LogEntry, ParseState, SessionSnapshot, agent_id_from_filename, build_agent_node, parse_lines,
    parse_session, process_agent_entries, process_main_entries, session_agent_dir,
};
use tailview_types::{AgentNode, ServerMessage, SessionData, SessionEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, interval_at};

use crate::config::TailerConfig;
use crate::file_tailer::{FileTailer, TailEvent};
use crate::lifecycle::{Lifecycle, LifecycleEvent, Transition, step};
use crate::ring::ReplayRing;
use crate::subscriber::{Subscriber, SubscriberId};

enum Command {
    Subscribe {
        subscriber: Arc<dyn Subscriber>,
        resume_after_seq: Option<u64>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
    Stop,
}

/// Cloneable handle to a running session tailer.
///
/// The registry and the transport hold handles; the actor itself runs on its
/// own task and owns every piece of mutable state, so everything a handle
/// does goes through the command channel.
#[derive(Clone)]
pub struct SessionTailerHandle {
    session_file: Arc<PathBuf>,
    tx: UnboundedSender<Command>,
    subscriber_count: Arc<AtomicUsize>,
}

impl SessionTailerHandle {
    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    /// Attach a subscriber. With a usable `resume_after_seq` the buffered
    /// frames it missed are replayed; otherwise it receives a fresh
    /// snapshot.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>, resume_after_seq: Option<u64>) {
        let _ = self.tx.send(Command::Subscribe {
            subscriber,
            resume_after_seq,
        });
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.tx.send(Command::Unsubscribe { id });
    }

    /// Hard teardown, outside the grace path
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

/// Coordinates one session: the main transcript, every sub-agent
/// transcript, and the subscribers watching them.
pub struct SessionTailer;

impl SessionTailer {
    /// Spawn the tailer for `session_file`; sub-agent transcripts are
    /// expected under the conventional `<stem>/subagents` directory next to
    /// it. Must run inside a tokio runtime.
    pub fn spawn(session_file: PathBuf, config: TailerConfig) -> SessionTailerHandle {
        let agent_dir = session_agent_dir(&session_file);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (tail_tx, tail_rx) = mpsc::unbounded_channel();
        let (dir_tx, dir_rx) = mpsc::unbounded_channel();
        let subscriber_count = Arc::new(AtomicUsize::new(0));
        let ring = ReplayRing::new(config.ring_capacity);

        let actor = SessionActor {
            config,
            session_file: session_file.clone(),
            agent_dir,
            state: Lifecycle::Initializing,
            cmd_rx,
            tail_tx,
            tail_rx,
            dir_tx,
            dir_rx,
            subscribers: Vec::new(),
            subscriber_count: Arc::clone(&subscriber_count),
            parse: ParseState::new(String::new()),
            data: None,
            snapshot_sizes: HashMap::new(),
            seq: 0,
            ring,
            pending_events: Vec::new(),
            pending_agents: Vec::new(),
            coalesce_deadline: None,
            grace_deadline: None,
            dir_retry_deadline: None,
            last_write: Instant::now(),
            last_error: None,
            main_tailer: None,
            agent_tailers: HashMap::new(),
            agent_paths: HashMap::new(),
            dir_watcher: None,
        };
        tokio::spawn(actor.run());

        SessionTailerHandle {
            session_file: Arc::new(session_file),
            tx: cmd_tx,
            subscriber_count,
        }
    }
}

struct SessionActor {
    config: TailerConfig,
    session_file: PathBuf,
    agent_dir: PathBuf,
    state: Lifecycle,

    cmd_rx: UnboundedReceiver<Command>,
    tail_tx: UnboundedSender<TailEvent>,
    tail_rx: UnboundedReceiver<TailEvent>,
    dir_tx: UnboundedSender<Vec<PathBuf>>,
    dir_rx: UnboundedReceiver<Vec<PathBuf>>,

    subscribers: Vec<Arc<dyn Subscriber>>,
    subscriber_count: Arc<AtomicUsize>,

    parse: ParseState,
    data: Option<SessionData>,
    snapshot_sizes: HashMap<PathBuf, u64>,

    seq: u64,
    ring: ReplayRing,
    pending_events: Vec<SessionEvent>,
    pending_agents: Vec<AgentNode>,

    coalesce_deadline: Option<Instant>,
    grace_deadline: Option<Instant>,
    dir_retry_deadline: Option<Instant>,
    last_write: Instant,
    last_error: Option<String>,

    main_tailer: Option<FileTailer>,
    agent_tailers: HashMap<String, FileTailer>,
    agent_paths: HashMap<PathBuf, String>,
    dir_watcher: Option<RecommendedWatcher>,
}

/// Sleep until an optional deadline; pends forever when unset (the select
/// guard keeps the branch disabled in that case)
async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self) {
        let session_file = self.session_file.clone();
        let agent_dir = self.agent_dir.clone();
        let loaded =
            tokio::task::spawn_blocking(move || parse_session(&session_file, &agent_dir)).await;

        match loaded {
            Ok(Ok(snapshot)) => {
                self.install_snapshot(snapshot);
                self.dispatch(LifecycleEvent::SnapshotReady);
                self.start_tailing().await;
                let seq = self.next_seq();
                if let Some(data) = self.data.clone() {
                    self.broadcast(ServerMessage::Snapshot {
                        data: Box::new(data),
                        seq,
                    });
                }
            }
            Ok(Err(err)) => self.fail(format!("session load failed: {err}")),
            Err(err) => self.fail(format!("session load panicked: {err}")),
        }

        let mut heartbeat = interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        let mut idle_check = interval_at(
            Instant::now() + self.config.idle_check_interval,
            self.config.idle_check_interval,
        );

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        // Every handle is gone; nobody can ever subscribe
                        self.stop_all();
                        break;
                    }
                },
                event = self.tail_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_tail_event(event);
                    }
                },
                paths = self.dir_rx.recv() => {
                    if let Some(paths) = paths {
                        self.handle_dir_paths(paths);
                    }
                },
                _ = heartbeat.tick() => self.on_heartbeat(),
                _ = idle_check.tick() => self.on_idle_check(),
                _ = deadline_sleep(self.coalesce_deadline),
                    if self.coalesce_deadline.is_some() => self.flush_pending(),
                _ = deadline_sleep(self.grace_deadline),
                    if self.grace_deadline.is_some() => self.on_grace_expired(),
                _ = deadline_sleep(self.dir_retry_deadline),
                    if self.dir_retry_deadline.is_some() => self.start_dir_watcher().await,
            }

            if self.state == Lifecycle::Stopped {
                break;
            }
        }
    }

    // --- lifecycle ---

    fn dispatch(&mut self, event: LifecycleEvent) -> bool {
        match step(self.state, event) {
            Transition::To(next) => {
                tracing::debug!(
                    session = %self.session_file.display(),
                    from = ?self.state,
                    to = ?next,
                    "lifecycle transition"
                );
                self.state = next;
                true
            }
            Transition::Ignored => false,
        }
    }

    fn fail(&mut self, message: String) {
        tracing::error!(
            session = %self.session_file.display(),
            %message,
            "session tailer failed"
        );
        self.last_error = Some(message.clone());
        if self.dispatch(LifecycleEvent::Fatal) {
            self.stop_all();
            let seq = self.next_seq();
            self.broadcast(ServerMessage::Error { message, seq });
        }
    }

    /// Tear down every owned resource; safe to call repeatedly.
    /// Subscribers stay attached so a final `error` frame can reach them.
    fn stop_all(&mut self) {
        if let Some(tailer) = self.main_tailer.take() {
            tailer.stop();
        }
        for (_, tailer) in self.agent_tailers.drain() {
            tailer.stop();
        }
        self.agent_paths.clear();
        self.dir_watcher = None;
        self.coalesce_deadline = None;
        self.grace_deadline = None;
        self.dir_retry_deadline = None;
    }

    // --- startup ---

    fn install_snapshot(&mut self, snapshot: SessionSnapshot) {
        let mut parse = ParseState::new(snapshot.data.session_id.clone());
        for child in &snapshot.data.main_agent.children {
            parse.known_agent_ids.insert(child.id.clone());
        }
        for (path, count) in &snapshot.line_counts {
            parse.set_line_count(path.clone(), *count);
        }
        self.parse = parse;
        self.snapshot_sizes = snapshot.file_sizes;
        self.data = Some(snapshot.data);
    }

    async fn start_tailing(&mut self) {
        let main_offset = self
            .snapshot_sizes
            .get(&self.session_file)
            .copied()
            .unwrap_or(0);
        self.main_tailer = Some(FileTailer::spawn(
            self.session_file.clone(),
            main_offset,
            self.tail_tx.clone(),
            self.config.clone(),
        ));

        let children: Vec<(String, PathBuf)> = self
            .data
            .as_ref()
            .map(|data| {
                data.main_agent
                    .children
                    .iter()
                    .map(|child| (child.id.clone(), child.log_path.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for (agent_id, log_path) in children {
            self.start_agent_tailer(&agent_id, log_path);
        }

        self.start_dir_watcher().await;
        self.last_write = Instant::now();
    }

    fn start_agent_tailer(&mut self, agent_id: &str, log_path: PathBuf) {
        if self.agent_tailers.contains_key(agent_id) {
            return;
        }
        let offset = self.snapshot_sizes.get(&log_path).copied().unwrap_or(0);
        let tailer = FileTailer::spawn(
            log_path.clone(),
            offset,
            self.tail_tx.clone(),
            self.config.clone(),
        );
        self.agent_paths.insert(log_path, agent_id.to_string());
        self.agent_tailers.insert(agent_id.to_string(), tailer);
    }

    // --- sub-agent directory discovery ---

    async fn start_dir_watcher(&mut self) {
        // Clear the pending retry before the stat so at most one retry is
        // ever in flight
        self.dir_retry_deadline = None;

        let exists = tokio::fs::try_exists(&self.agent_dir).await.unwrap_or(false);
        if self.state.is_terminal() {
            return;
        }
        if !exists {
            self.dir_retry_deadline = Some(Instant::now() + self.config.dir_retry_interval);
            return;
        }

        let tx = self.dir_tx.clone();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            if let Ok(event) = result
                && matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                && !event.paths.is_empty()
            {
                let _ = tx.send(event.paths);
            }
        })
        .and_then(|mut watcher| {
            watcher.watch(&self.agent_dir, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });

        match watcher {
            Ok(watcher) => self.dir_watcher = Some(watcher),
            Err(err) => {
                tracing::warn!(
                    dir = %self.agent_dir.display(),
                    error = %err,
                    "agent directory watcher unavailable, retrying"
                );
                self.dir_retry_deadline = Some(Instant::now() + self.config.dir_retry_interval);
                return;
            }
        }

        // Pick up files that existed before the watcher attached
        match tokio::fs::read_dir(&self.agent_dir).await {
            Ok(mut entries) => {
                let mut paths = Vec::new();
                while let Ok(Some(entry)) = entries.next_entry().await {
                    paths.push(entry.path());
                }
                self.handle_dir_paths(paths);
            }
            Err(err) => {
                tracing::warn!(
                    dir = %self.agent_dir.display(),
                    error = %err,
                    "agent directory scan failed"
                );
            }
        }
    }

    fn handle_dir_paths(&mut self, paths: Vec<PathBuf>) {
        if self.state.is_terminal() {
            return;
        }
        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Some(agent_id) = agent_id_from_filename(&name) else {
                continue;
            };
            self.register_agent_file(agent_id.to_string(), path.clone());
        }
    }

    /// Single funnel for both discovery paths (main-log tool results and
    /// the directory watcher). An already-tailed agent is a no-op: one
    /// node, one tailer, one outbound record per id.
    fn register_agent_file(&mut self, agent_id: String, log_path: PathBuf) {
        if self.agent_tailers.contains_key(&agent_id) {
            return;
        }
        self.parse.known_agent_ids.insert(agent_id.clone());

        let node = build_agent_node(&agent_id, &self.parse, log_path.clone());
        if let Some(data) = self.data.as_mut() {
            data.main_agent.children.push(node.clone());
        }
        self.push_pending_agent(node);
        self.start_agent_tailer(&agent_id, log_path);
        self.arm_coalesce();
    }

    // --- line intake ---

    fn handle_tail_event(&mut self, event: TailEvent) {
        if self.state.is_terminal() {
            return;
        }
        match event {
            TailEvent::Lines { path, lines } => self.handle_lines(&path, lines),
            TailEvent::Truncated { path } => {
                self.parse.reset_line_count(&path);
            }
            TailEvent::ReadError { path, message } => {
                tracing::warn!(path = %path.display(), message, "tail read error");
            }
            TailEvent::Deleted { path } => {
                if path == self.session_file {
                    self.fail(format!("session file deleted: {}", path.display()));
                } else {
                    tracing::warn!(path = %path.display(), "sub-agent transcript deleted");
                }
            }
        }
    }

    fn handle_lines(&mut self, path: &Path, lines: Vec<String>) {
        self.last_write = Instant::now();
        if self.state == Lifecycle::Idle && self.dispatch(LifecycleEvent::LinesReceived) {
            let seq = self.next_seq();
            self.broadcast(ServerMessage::Active { seq });
        }

        let start_line = self.parse.line_count(path) + 1;
        let (entries, errors) = parse_lines(&lines, path, start_line);
        self.parse.add_lines(path, lines.len());

        for error in errors {
            tracing::warn!(message = %error.message, "corrupt transcript line");
            let seq = self.next_seq();
            self.broadcast(ServerMessage::Warning {
                message: error.message,
                seq,
            });
        }

        if entries.is_empty() {
            return;
        }

        if path == self.session_file {
            self.ingest_main_entries(entries);
        } else if let Some(agent_id) = self.agent_paths.get(path).cloned() {
            self.ingest_agent_entries(&agent_id, &entries);
        } else {
            tracing::warn!(path = %path.display(), "lines from untracked file");
        }

        self.arm_coalesce();
    }

    fn ingest_main_entries(&mut self, entries: Vec<LogEntry>) {
        let mentioned = ParseState::mentioned_agent_ids(&entries);
        let (events, new_agent_ids) = process_main_entries(entries, &mut self.parse);

        for agent_id in new_agent_ids {
            let log_path = self.agent_dir.join(format!("agent-{agent_id}.jsonl"));
            self.register_agent_file(agent_id, log_path);
        }

        self.refresh_stale_agents(&mentioned);
        self.append_events(events, None);
    }

    fn ingest_agent_entries(&mut self, agent_id: &str, entries: &[LogEntry]) {
        let events = process_agent_entries(entries, agent_id, &self.parse);
        self.append_events(events, Some(agent_id));
    }

    /// The directory watcher can register an agent before its spawn records
    /// land in the main log, leaving a node named after its bare id. After
    /// every main-log batch, rebuild any such node the batch mentioned and
    /// replace its pending record in place rather than emitting a second
    /// one.
    fn refresh_stale_agents(&mut self, mentioned: &[String]) {
        let mut refreshed = Vec::new();
        if let Some(data) = self.data.as_mut() {
            for agent_id in mentioned {
                let Some(node) = data
                    .main_agent
                    .children
                    .iter_mut()
                    .find(|child| &child.id == agent_id)
                else {
                    continue;
                };
                if node.name != *agent_id {
                    continue;
                }
                let mut rebuilt = build_agent_node(agent_id, &self.parse, node.log_path.clone());
                if rebuilt.name == node.name
                    && rebuilt.model.is_none()
                    && rebuilt.is_resumed.is_none()
                {
                    continue;
                }
                rebuilt.events = std::mem::take(&mut node.events);
                rebuilt.children = std::mem::take(&mut node.children);
                *node = rebuilt.clone();
                refreshed.push(rebuilt);
            }
        }
        for node in refreshed {
            self.push_pending_agent(node);
            self.arm_coalesce();
        }
    }

    fn append_events(&mut self, events: Vec<SessionEvent>, agent_id: Option<&str>) {
        if events.is_empty() {
            return;
        }
        if let Some(data) = self.data.as_mut() {
            for event in &events {
                // Keep the snapshot servable: all_events stays sorted by
                // timestamp, ties in insertion order
                let at = data
                    .all_events
                    .partition_point(|existing| existing.timestamp <= event.timestamp);
                data.all_events.insert(at, event.clone());
            }
            match agent_id {
                None => data.main_agent.events.extend(events.iter().cloned()),
                Some(id) => {
                    if let Some(child) = data
                        .main_agent
                        .children
                        .iter_mut()
                        .find(|child| child.id == id)
                    {
                        child.events.extend(events.iter().cloned());
                    }
                }
            }
        }
        self.pending_events.extend(events);
    }

    // --- outbound ---

    fn push_pending_agent(&mut self, node: AgentNode) {
        if let Some(existing) = self
            .pending_agents
            .iter_mut()
            .find(|pending| pending.id == node.id)
        {
            *existing = node;
        } else {
            self.pending_agents.push(node);
        }
    }

    fn arm_coalesce(&mut self) {
        if self.coalesce_deadline.is_none()
            && (!self.pending_events.is_empty() || !self.pending_agents.is_empty())
        {
            self.coalesce_deadline = Some(Instant::now() + self.config.coalesce_window);
        }
    }

    fn flush_pending(&mut self) {
        self.coalesce_deadline = None;
        if self.pending_events.is_empty() && self.pending_agents.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending_events);
        let agents = std::mem::take(&mut self.pending_agents);
        let seq = self.next_seq();
        self.broadcast(ServerMessage::Events { events, agents, seq });
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn broadcast(&mut self, message: ServerMessage) {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize outbound frame");
                return;
            }
        };
        self.ring.push(message.seq(), frame.clone());

        for subscriber in &self.subscribers {
            if subscriber.buffered_bytes() >= self.config.drop_threshold_bytes {
                tracing::debug!(
                    subscriber = subscriber.id(),
                    "subscriber congested, dropping frame"
                );
                continue;
            }
            if let Err(err) = subscriber.send(&frame) {
                tracing::debug!(
                    subscriber = subscriber.id(),
                    error = %err,
                    "frame delivery failed"
                );
            }
        }
    }

    // --- timers ---

    fn on_heartbeat(&mut self) {
        if matches!(self.state, Lifecycle::Streaming | Lifecycle::Idle) {
            let seq = self.next_seq();
            self.broadcast(ServerMessage::Heartbeat { seq });
        }
    }

    fn on_idle_check(&mut self) {
        if self.state == Lifecycle::Streaming
            && self.last_write.elapsed() > self.config.idle_threshold
            && self.dispatch(LifecycleEvent::IdleTimeout)
        {
            let seq = self.next_seq();
            self.broadcast(ServerMessage::Idle { seq });
        }
    }

    fn on_grace_expired(&mut self) {
        self.grace_deadline = None;
        if !self.subscribers.is_empty() {
            return;
        }
        if self.dispatch(LifecycleEvent::NoSubscribers) {
            self.stop_all();
        }
    }

    // --- subscribers ---

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Subscribe {
                subscriber,
                resume_after_seq,
            } => {
                self.handle_subscribe(subscriber, resume_after_seq);
                false
            }
            Command::Unsubscribe { id } => {
                self.handle_unsubscribe(id);
                false
            }
            Command::Stop => {
                self.stop_all();
                self.state = Lifecycle::Stopped;
                true
            }
        }
    }

    fn handle_subscribe(
        &mut self,
        subscriber: Arc<dyn Subscriber>,
        resume_after_seq: Option<u64>,
    ) {
        self.grace_deadline = None;
        self.subscribers.retain(|s| s.id() != subscriber.id());
        self.subscribers.push(Arc::clone(&subscriber));
        self.subscriber_count
            .store(self.subscribers.len(), Ordering::Relaxed);

        if self.state == Lifecycle::Error {
            let message = self
                .last_error
                .clone()
                .unwrap_or_else(|| "session tailer failed".to_string());
            if let Ok(frame) = (ServerMessage::Error {
                message,
                seq: self.seq,
            })
            .to_frame()
            {
                let _ = subscriber.send(&frame);
            }
            return;
        }

        if let Some(resume) = resume_after_seq
            && self.ring.can_resume_after(resume)
        {
            let frames: Vec<String> = self
                .ring
                .frames_after(resume)
                .map(str::to_string)
                .collect();
            for frame in frames {
                let _ = subscriber.send(&frame);
            }
            return;
        }

        if let Some(data) = &self.data {
            let message = ServerMessage::Snapshot {
                data: Box::new(data.clone()),
                seq: self.seq,
            };
            if let Ok(frame) = message.to_frame() {
                let _ = subscriber.send(&frame);
            }
        }
    }

    fn handle_unsubscribe(&mut self, id: SubscriberId) {
        self.subscribers.retain(|s| s.id() != id);
        self.subscriber_count
            .store(self.subscribers.len(), Ordering::Relaxed);
        if self.subscribers.is_empty() {
            self.grace_deadline = Some(Instant::now() + self.config.grace_period);
        }
    }
}
