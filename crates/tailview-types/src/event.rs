use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// NOTE: Schema Design Goals
//
// 1. One event per semantic unit: a transcript record fans out into as many
//    events as it carries content blocks, so clients never re-parse nested
//    message structures.
// 2. Attribution: every event names the agent it belongs to; events of the
//    top-level conversation carry the session id as their agent id.
// 3. Pairing: tool invocations and their observations are linked through
//    `tool_use_id`, independent of event ids.

/// One typed entry in a session's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Event ID, derived from the source record's uuid
    pub id: String,

    /// uuid of the preceding record in the transcript chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Record timestamp (UTC)
    pub timestamp: DateTime<Utc>,

    /// Session this event belongs to
    pub session_id: String,

    /// Owning agent; equals `session_id` for main-agent events
    pub agent_id: String,

    /// Event type and content (flattened enum)
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Event content, tagged by `type` on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub enum EventPayload {
    UserMessage(UserMessagePayload),
    AssistantMessage(AssistantMessagePayload),
    Thinking(ThinkingPayload),
    ToolUse(ToolUsePayload),
    ToolResult(ToolResultPayload),
    Summary(SummaryPayload),
    AgentSpawn(AgentSpawnPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessagePayload {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessagePayload {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingPayload {
    pub text: String,
}

/// A tool invocation issued by an agent.
///
/// `is_resume` marks a `Task` invocation that re-enters a previously spawned
/// sub-agent rather than creating a new one; `resumes_agent_id` names it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsePayload {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
    #[serde(default)]
    pub is_resume: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumes_agent_id: Option<String>,
}

/// The observation paired with a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    pub tool_use_id: String,
    pub success: bool,
    pub output: String,
    /// Sub-agent this result spawned or resumed, when the record names one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpawnPayload {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization() {
        let event = SessionEvent {
            id: "uuid-1".to_string(),
            parent_id: None,
            timestamp: Utc::now(),
            session_id: "session-1".to_string(),
            agent_id: "session-1".to_string(),
            payload: EventPayload::UserMessage(UserMessagePayload {
                text: "Hello".to_string(),
            }),
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: SessionEvent = serde_json::from_str(&json).unwrap();

        match deserialized.payload {
            EventPayload::UserMessage(payload) => assert_eq!(payload.text, "Hello"),
            _ => panic!("Wrong payload type"),
        }
    }

    #[test]
    fn test_tagged_wire_form() {
        let event = SessionEvent {
            id: "uuid-2".to_string(),
            parent_id: Some("uuid-1".to_string()),
            timestamp: Utc::now(),
            session_id: "session-1".to_string(),
            agent_id: "agent-x".to_string(),
            payload: EventPayload::ToolResult(ToolResultPayload {
                tool_use_id: "toolu_123".to_string(),
                success: true,
                output: "ok".to_string(),
                agent_id: Some("agent-x".to_string()),
            }),
        };

        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool-result");
        assert_eq!(value["toolUseId"], "toolu_123");
        assert_eq!(value["parentId"], "uuid-1");
        assert_eq!(value["sessionId"], "session-1");
    }

    #[test]
    fn test_optional_fields_skipped() {
        let event = SessionEvent {
            id: "uuid-3".to_string(),
            parent_id: None,
            timestamp: Utc::now(),
            session_id: "s".to_string(),
            agent_id: "s".to_string(),
            payload: EventPayload::ToolUse(ToolUsePayload {
                tool_use_id: "toolu_1".to_string(),
                name: "Bash".to_string(),
                input: serde_json::json!({"command": "ls"}),
                is_resume: false,
                resumes_agent_id: None,
            }),
        };

        let value: Value = serde_json::to_value(&event).unwrap();
        assert!(value.get("parentId").is_none());
        assert!(value.get("resumesAgentId").is_none());
        assert_eq!(value["isResume"], false);
    }
}
