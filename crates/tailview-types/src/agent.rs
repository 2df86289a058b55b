use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::event::SessionEvent;

/// One node in a session's agent tree.
///
/// The main agent is the root; its `id` equals the session id and its
/// `parent` is `None`. Sub-agents spawned via a `Task` tool invocation hang
/// off the root with `parent` set to the session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNode {
    pub id: String,

    /// Display name; the spawning task's description when known, the bare
    /// agent id until then
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent agent id; `None` only for the main agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    pub children: Vec<AgentNode>,

    /// Events attributed to this agent, in transcript order
    pub events: Vec<SessionEvent>,

    /// Transcript file backing this agent
    pub log_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_resumed: Option<bool>,

    /// Id of the `Task` tool invocation that resumed this agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,
}

impl AgentNode {
    /// Create the root node for a session.
    pub fn main(session_id: impl Into<String>, log_path: PathBuf) -> Self {
        let session_id = session_id.into();
        Self {
            id: session_id.clone(),
            name: session_id,
            model: None,
            subagent_type: None,
            description: None,
            parent: None,
            children: Vec::new(),
            events: Vec::new(),
            log_path,
            is_resumed: None,
            resumed_from: None,
        }
    }

    /// Create a bare sub-agent node named after its id.
    pub fn stub(agent_id: impl Into<String>, parent: impl Into<String>, log_path: PathBuf) -> Self {
        let agent_id = agent_id.into();
        Self {
            id: agent_id.clone(),
            name: agent_id,
            model: None,
            subagent_type: None,
            description: None,
            parent: Some(parent.into()),
            children: Vec::new(),
            events: Vec::new(),
            log_path,
            is_resumed: None,
            resumed_from: None,
        }
    }
}

/// Fully assembled state of one session: the agent tree plus the
/// chronological flatten of every agent's events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub session_id: String,
    pub main_agent: AgentNode,
    /// All events across all agents, nondecreasing by timestamp
    pub all_events: Vec<SessionEvent>,
    pub log_directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_node_identity() {
        let node = AgentNode::main("session-1", PathBuf::from("/logs/session-1.jsonl"));
        assert_eq!(node.id, "session-1");
        assert_eq!(node.name, "session-1");
        assert!(node.parent.is_none());
    }

    #[test]
    fn test_stub_named_after_id() {
        let node = AgentNode::stub("abc123", "session-1", PathBuf::from("/x/agent-abc123.jsonl"));
        assert_eq!(node.name, "abc123");
        assert_eq!(node.parent.as_deref(), Some("session-1"));
    }

    #[test]
    fn test_wire_form_skips_empty_metadata() {
        let node = AgentNode::stub("a", "s", PathBuf::from("/x/agent-a.jsonl"));
        let value = serde_json::to_value(&node).unwrap();
        assert!(value.get("model").is_none());
        assert!(value.get("isResumed").is_none());
        assert_eq!(value["logPath"], "/x/agent-a.jsonl");
    }
}
