use chrono::{DateTime, Utc};
use serde_json::Value;
use tailview_types::{
    AssistantMessagePayload, EventPayload, SessionEvent, SummaryPayload, ThinkingPayload,
    ToolResultPayload, ToolUsePayload, UserMessagePayload,
};

use crate::schema::{ContentBlock, LogEntry, MessageRecord, SummaryRecord, result_text};

/// Parse a transcript timestamp, falling back to now when unparseable
pub(crate) fn parse_timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// The tool name that spawns (or resumes) a sub-agent
pub const TASK_TOOL: &str = "Task";

/// Convert records into typed events.
///
/// `agent_id` fixes attribution for sub-agent transcripts; `None` attributes
/// to the main agent, whose events carry the session id. Records of unknown
/// kind are dropped, as are non-summary records missing a uuid or timestamp.
pub fn parse_events(
    entries: &[LogEntry],
    session_id: &str,
    agent_id: Option<&str>,
) -> Vec<SessionEvent> {
    let attributed_to = agent_id.unwrap_or(session_id);
    let mut events = Vec::new();

    for entry in entries {
        match entry {
            LogEntry::User(record) => {
                emit_user_events(record, session_id, attributed_to, &mut events);
            }
            LogEntry::Assistant(record) => {
                emit_assistant_events(record, session_id, attributed_to, &mut events);
            }
            LogEntry::Summary(record) => {
                events.push(summary_event(record, session_id, attributed_to));
            }
            LogEntry::Unknown => {}
        }
    }

    events
}

fn summary_event(record: &SummaryRecord, session_id: &str, agent_id: &str) -> SessionEvent {
    let id = record
        .leaf_uuid
        .as_deref()
        .or(record.uuid.as_deref())
        .unwrap_or("unknown")
        .to_string();
    let timestamp = record
        .timestamp
        .as_deref()
        .map(parse_timestamp)
        .unwrap_or_else(Utc::now);

    SessionEvent {
        id,
        parent_id: None,
        timestamp,
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        payload: EventPayload::Summary(SummaryPayload {
            summary: record.summary.clone(),
        }),
    }
}

/// Base fields shared by every event a record fans out into
struct RecordContext<'a> {
    uuid: &'a str,
    parent_uuid: Option<&'a str>,
    timestamp: DateTime<Utc>,
    session_id: &'a str,
    agent_id: &'a str,
}

impl RecordContext<'_> {
    fn event(&self, id: String, payload: EventPayload) -> SessionEvent {
        SessionEvent {
            id,
            parent_id: self.parent_uuid.map(str::to_string),
            timestamp: self.timestamp,
            session_id: self.session_id.to_string(),
            agent_id: self.agent_id.to_string(),
            payload,
        }
    }
}

fn record_context<'a>(
    record: &'a MessageRecord,
    session_id: &'a str,
    agent_id: &'a str,
) -> Option<RecordContext<'a>> {
    let (Some(uuid), Some(timestamp)) = (record.uuid.as_deref(), record.timestamp.as_deref())
    else {
        tracing::warn!(
            session_id,
            "dropping record missing uuid or timestamp during event derivation"
        );
        return None;
    };
    Some(RecordContext {
        uuid,
        parent_uuid: record.parent_uuid.as_deref(),
        timestamp: parse_timestamp(timestamp),
        session_id,
        agent_id,
    })
}

/// User records: text blocks accumulate into one message, each tool_result
/// block becomes its own event
fn emit_user_events(
    record: &MessageRecord,
    session_id: &str,
    agent_id: &str,
    events: &mut Vec<SessionEvent>,
) {
    let Some(ctx) = record_context(record, session_id, agent_id) else {
        return;
    };
    let blocks: &[ContentBlock] = record
        .message
        .as_ref()
        .map(|m| m.content.as_slice())
        .unwrap_or_default();

    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    let results: Vec<(usize, &ContentBlock)> = blocks
        .iter()
        .enumerate()
        .filter(|(_, block)| matches!(block, ContentBlock::ToolResult { .. }))
        .collect();

    let multi = (usize::from(!texts.is_empty()) + results.len()) > 1;

    if !texts.is_empty() {
        events.push(ctx.event(
            ctx.uuid.to_string(),
            EventPayload::UserMessage(UserMessagePayload {
                text: texts.join("\n"),
            }),
        ));
    }

    // Attribution comes from the record-level normalized toolUseResult, not
    // from any agentId nested inside the content block
    let result_agent_id = record
        .tool_use_result
        .as_ref()
        .and_then(|result| result.agent_id.clone());

    for (idx, block) in results {
        let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
            ..
        } = block
        else {
            continue;
        };
        let id = if multi {
            format!("{}-{}", ctx.uuid, idx)
        } else {
            ctx.uuid.to_string()
        };
        events.push(ctx.event(
            id,
            EventPayload::ToolResult(ToolResultPayload {
                tool_use_id: tool_use_id.clone(),
                success: !is_error,
                output: result_text(content),
                agent_id: result_agent_id.clone(),
            }),
        ));
    }
}

/// Assistant records: every content block maps to one event
fn emit_assistant_events(
    record: &MessageRecord,
    session_id: &str,
    agent_id: &str,
    events: &mut Vec<SessionEvent>,
) {
    let Some(ctx) = record_context(record, session_id, agent_id) else {
        return;
    };
    let blocks: &[ContentBlock] = record
        .message
        .as_ref()
        .map(|m| m.content.as_slice())
        .unwrap_or_default();

    let mapped: Vec<(usize, EventPayload)> = blocks
        .iter()
        .enumerate()
        .filter_map(|(idx, block)| assistant_payload(block).map(|payload| (idx, payload)))
        .collect();

    let multi = mapped.len() > 1;
    for (idx, payload) in mapped {
        let id = if multi {
            format!("{}-{}", ctx.uuid, idx)
        } else {
            ctx.uuid.to_string()
        };
        events.push(ctx.event(id, payload));
    }
}

fn assistant_payload(block: &ContentBlock) -> Option<EventPayload> {
    match block {
        ContentBlock::Text { text } => Some(EventPayload::AssistantMessage(
            AssistantMessagePayload { text: text.clone() },
        )),
        ContentBlock::Thinking { thinking } => Some(EventPayload::Thinking(ThinkingPayload {
            text: thinking.clone(),
        })),
        ContentBlock::ToolUse { id, name, input } => {
            let resume_target = if name == TASK_TOOL {
                input.get("resume").and_then(Value::as_str)
            } else {
                None
            };
            Some(EventPayload::ToolUse(ToolUsePayload {
                tool_use_id: id.clone(),
                name: name.clone(),
                input: input.clone(),
                is_resume: name == TASK_TOOL && input.get("resume").is_some(),
                resumes_agent_id: resume_target.map(str::to_string),
            }))
        }
        // Results echoed into assistant content pair up via the user record
        ContentBlock::ToolResult { .. } => None,
        ContentBlock::Unknown => None,
    }
}
