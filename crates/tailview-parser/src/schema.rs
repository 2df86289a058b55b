use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of a session transcript, tagged by `type`.
///
/// Unrecognized kinds deserialize into `Unknown` instead of failing the line;
/// downstream event derivation drops them, which keeps the stream alive when
/// newer agent versions introduce record types this crate does not know.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum LogEntry {
    User(MessageRecord),
    Assistant(MessageRecord),
    Summary(SummaryRecord),
    #[serde(other)]
    Unknown,
}

impl LogEntry {
    /// The record's uuid, when it carries one
    pub fn uuid(&self) -> Option<&str> {
        match self {
            LogEntry::User(r) | LogEntry::Assistant(r) => r.uuid.as_deref(),
            LogEntry::Summary(r) => r.uuid.as_deref(),
            LogEntry::Unknown => None,
        }
    }

    /// Sub-agent id named by the record's normalized `toolUseResult`
    pub fn tool_result_agent_id(&self) -> Option<&str> {
        match self {
            LogEntry::User(r) | LogEntry::Assistant(r) => r
                .tool_use_result
                .as_ref()
                .and_then(|result| result.agent_id.as_deref()),
            _ => None,
        }
    }

    /// Structural checks serde cannot express.
    ///
    /// Returns the violation message for lines that deserialized but carry a
    /// message role other than `user` or `assistant`.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let message = match self {
            LogEntry::User(r) | LogEntry::Assistant(r) => r.message.as_ref(),
            _ => None,
        };
        if let Some(message) = message
            && message.role != "user"
            && message.role != "assistant"
        {
            return Err(format!("unexpected message role \"{}\"", message.role));
        }
        Ok(())
    }
}

/// Common shape of `user` and `assistant` records
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
    /// Sub-agent execution result metadata; carries the agent id that links
    /// a `Task` observation to its sub-agent transcript
    #[serde(default, skip_serializing_if = "skip_empty_tool_use_result")]
    pub tool_use_result: Option<ToolUseResult>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Message {
    pub role: String,
    #[serde(deserialize_with = "deserialize_content")]
    pub content: Vec<ContentBlock>,
}

/// `message.content` is either a bare string or an ordered list of blocks;
/// a string reads as a single text block
fn deserialize_content<'de, D>(deserializer: D) -> std::result::Result<Vec<ContentBlock>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrBlocks {
        String(String),
        Blocks(Vec<ContentBlock>),
    }

    match StringOrBlocks::deserialize(deserializer)? {
        StringOrBlocks::String(text) => Ok(vec![ContentBlock::Text { text }]),
        StringOrBlocks::Blocks(blocks) => Ok(blocks),
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: bool,
        /// Nested agent id; deserialized but not consumed — attribution
        /// reads the record-level `toolUseResult` instead
        #[serde(default, rename = "agentId")]
        agent_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Flatten a tool_result's `content` to text.
///
/// The field is absent, a bare string, or a list of blocks whose text
/// members join with newlines.
pub fn result_text(content: &Option<Value>) -> String {
    match content {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(_) => String::new(),
    }
}

/// Sub-agent execution result metadata, normalized at deserialization:
/// a bare string reads as empty, a list reads as its first element, and an
/// object reads as itself.
#[derive(Debug, Clone, Default)]
pub struct ToolUseResult {
    /// Agent id linking this result to its sub-agent transcript
    pub agent_id: Option<String>,
}

impl ToolUseResult {
    pub fn is_empty(&self) -> bool {
        self.agent_id.is_none()
    }
}

/// Skip serializing Option<ToolUseResult> if None or empty
pub(crate) fn skip_empty_tool_use_result(opt: &Option<ToolUseResult>) -> bool {
    match opt {
        None => true,
        Some(result) => result.is_empty(),
    }
}

impl<'de> serde::Deserialize<'de> for ToolUseResult {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{MapAccess, SeqAccess, Visitor};
        use std::fmt;

        struct ToolUseResultVisitor;

        impl<'de> Visitor<'de> for ToolUseResultVisitor {
            type Value = ToolUseResult;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map, sequence, or string for toolUseResult")
            }

            fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut result = ToolUseResult::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "agentId" => result.agent_id = map.next_value()?,
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(result)
            }

            // Take the first element of a sequence form
            fn visit_seq<S>(self, mut seq: S) -> std::result::Result<Self::Value, S::Error>
            where
                S: SeqAccess<'de>,
            {
                let first = seq.next_element::<ToolUseResult>()?.unwrap_or_default();
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(first)
            }

            // String values (e.g. error messages) carry no metadata
            fn visit_str<E>(self, _: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ToolUseResult::default())
            }

            fn visit_string<E>(self, _: String) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ToolUseResult::default())
            }
        }

        deserializer.deserialize_any(ToolUseResultVisitor)
    }
}

impl serde::Serialize for ToolUseResult {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        if let Some(ref agent_id) = self.agent_id {
            map.serialize_entry("agentId", agent_id)?;
        }
        map.end()
    }
}

/// `summary` records substitute `leafUuid` for a uuid and may omit the
/// timestamp entirely
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub summary: String,
    #[serde(default)]
    pub leaf_uuid: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}
