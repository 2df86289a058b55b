use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tailview_types::{AgentNode, SessionEvent};

use crate::events::{TASK_TOOL, parse_events};
use crate::schema::{ContentBlock, LogEntry};

/// Parse state carried across incremental reads of one session.
///
/// Owned exclusively by the session tailer; the main log accumulates so
/// sub-agent metadata can be derived however late the agent's own file shows
/// up.
#[derive(Debug)]
pub struct ParseState {
    pub session_id: String,
    /// Every sub-agent id ever seen; grows monotonically, never re-registers
    pub known_agent_ids: HashSet<String>,
    pub main_log_entries: Vec<LogEntry>,
    /// Non-blank lines consumed per file, for absolute line numbering
    line_counts: HashMap<PathBuf, usize>,
}

impl ParseState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            known_agent_ids: HashSet::new(),
            main_log_entries: Vec::new(),
            line_counts: HashMap::new(),
        }
    }

    pub fn line_count(&self, path: &Path) -> usize {
        self.line_counts.get(path).copied().unwrap_or(0)
    }

    pub fn add_lines(&mut self, path: &Path, count: usize) {
        *self.line_counts.entry(path.to_path_buf()).or_insert(0) += count;
    }

    pub fn set_line_count(&mut self, path: PathBuf, count: usize) {
        self.line_counts.insert(path, count);
    }

    /// Truncation observed: numbering for this file starts over
    pub fn reset_line_count(&mut self, path: &Path) {
        self.line_counts.remove(path);
    }

    /// Sub-agent ids named by this batch's records, in batch order and
    /// including ids that were already known
    pub fn mentioned_agent_ids(entries: &[LogEntry]) -> Vec<String> {
        let mut seen = HashSet::new();
        entries
            .iter()
            .filter_map(|entry| entry.tool_result_agent_id())
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect()
    }
}

/// Ingest a batch of main-transcript records.
///
/// Returns the derived events plus any sub-agent ids this batch revealed,
/// in first-seen order. Revealed ids are recorded in `known_agent_ids`
/// before returning.
pub fn process_main_entries(
    entries: Vec<LogEntry>,
    state: &mut ParseState,
) -> (Vec<SessionEvent>, Vec<String>) {
    let events = parse_events(&entries, &state.session_id, None);

    let mut new_agent_ids = Vec::new();
    for entry in &entries {
        if let Some(agent_id) = entry.tool_result_agent_id()
            && state.known_agent_ids.insert(agent_id.to_string())
        {
            new_agent_ids.push(agent_id.to_string());
        }
    }

    state.main_log_entries.extend(entries);
    (events, new_agent_ids)
}

/// Ingest a batch of sub-agent transcript records, fixing attribution
pub fn process_agent_entries(
    entries: &[LogEntry],
    agent_id: &str,
    state: &ParseState,
) -> Vec<SessionEvent> {
    parse_events(entries, &state.session_id, Some(agent_id))
}

/// Derive a sub-agent's metadata from the accumulated main log.
///
/// Chases the spawning chain: the user record whose normalized result names
/// the agent yields a `tool_use_id`, which leads to the `Task` invocation
/// carrying `description`, `model`, and `subagent_type`. An agent whose
/// spawn records have not arrived yet is named after its id; the session
/// tailer rebuilds it once they do.
pub fn build_agent_node(agent_id: &str, state: &ParseState, log_path: PathBuf) -> AgentNode {
    let mut node = AgentNode::stub(agent_id, state.session_id.clone(), log_path);

    let Some(tool_use_id) = find_spawning_tool_use_id(agent_id, &state.main_log_entries) else {
        return node;
    };
    let Some((task_id, input)) = find_task_input(&tool_use_id, &state.main_log_entries) else {
        return node;
    };

    if let Some(description) = input.get("description").and_then(Value::as_str) {
        node.name = description.to_string();
        node.description = Some(description.to_string());
    }
    node.model = input
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string);
    node.subagent_type = input
        .get("subagent_type")
        .and_then(Value::as_str)
        .map(str::to_string);

    if input.get("resume").and_then(Value::as_str) == Some(agent_id) {
        node.is_resumed = Some(true);
        node.resumed_from = Some(task_id);
    }

    node
}

/// The tool_use_id of the observation that named this agent
fn find_spawning_tool_use_id(agent_id: &str, entries: &[LogEntry]) -> Option<String> {
    entries.iter().find_map(|entry| {
        let LogEntry::User(record) = entry else {
            return None;
        };
        if entry.tool_result_agent_id() != Some(agent_id) {
            return None;
        }
        record.message.as_ref()?.content.iter().find_map(|block| {
            if let ContentBlock::ToolResult { tool_use_id, .. } = block {
                Some(tool_use_id.clone())
            } else {
                None
            }
        })
    })
}

/// The matching `Task` invocation's id and input
fn find_task_input(tool_use_id: &str, entries: &[LogEntry]) -> Option<(String, Value)> {
    entries.iter().find_map(|entry| {
        let LogEntry::Assistant(record) = entry else {
            return None;
        };
        record.message.as_ref()?.content.iter().find_map(|block| {
            if let ContentBlock::ToolUse { id, name, input } = block
                && name == TASK_TOOL
                && id == tool_use_id
            {
                Some((id.clone(), input.clone()))
            } else {
                None
            }
        })
    })
}
