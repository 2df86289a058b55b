use serde::{Deserialize, Serialize};

use crate::agent::{AgentNode, SessionData};
use crate::error::Result;
use crate::event::SessionEvent;

/// One outbound frame, serialized as a single JSON object per datagram.
///
/// Every frame carries a `seq`; subscribers hand the last seq they saw back
/// on reconnect to resume the stream without a full snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full session state; sent on first subscribe or when replay is
    /// impossible
    Snapshot { data: Box<SessionData>, seq: u64 },

    /// Coalesced incremental batch
    Events {
        events: Vec<SessionEvent>,
        agents: Vec<AgentNode>,
        seq: u64,
    },

    /// Keepalive
    Heartbeat { seq: u64 },

    /// No writes observed for the idle threshold
    Idle { seq: u64 },

    /// Writes resumed after idle
    Active { seq: u64 },

    /// Corrupt-line report; the stream continues
    Warning { message: String, seq: u64 },

    /// Fatal; the session tailer is terminating
    Error { message: String, seq: u64 },
}

impl ServerMessage {
    pub fn seq(&self) -> u64 {
        match self {
            ServerMessage::Snapshot { seq, .. }
            | ServerMessage::Events { seq, .. }
            | ServerMessage::Heartbeat { seq }
            | ServerMessage::Idle { seq }
            | ServerMessage::Active { seq }
            | ServerMessage::Warning { seq, .. }
            | ServerMessage::Error { seq, .. } => *seq,
        }
    }

    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound subscription request, decoded by the transport adapter.
///
/// `path` must already have passed the host's path-within-root validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_after_seq: Option<u64>,
}

impl SubscribeRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_frame_tag_and_seq() {
        let msg = ServerMessage::Heartbeat { seq: 7 };
        let frame = msg.to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert_eq!(value["seq"], 7);
    }

    #[test]
    fn test_warning_round_trip() {
        let msg = ServerMessage::Warning {
            message: "/x.jsonl:3: JSON parse failed".to_string(),
            seq: 12,
        };
        let decoded: ServerMessage = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(decoded.seq(), 12);
        match decoded {
            ServerMessage::Warning { message, .. } => {
                assert!(message.contains("JSON parse failed"))
            }
            _ => panic!("Expected warning"),
        }
    }

    #[test]
    fn test_subscribe_request_optional_resume() {
        let req = SubscribeRequest::from_json(r#"{"path": "/a/b.jsonl"}"#).unwrap();
        assert_eq!(req.path, "/a/b.jsonl");
        assert!(req.resume_after_seq.is_none());

        let req =
            SubscribeRequest::from_json(r#"{"path": "/a/b.jsonl", "resumeAfterSeq": 42}"#).unwrap();
        assert_eq!(req.resume_after_seq, Some(42));
    }

    #[test]
    fn test_subscribe_request_invalid_shape() {
        assert!(SubscribeRequest::from_json(r#"{"resumeAfterSeq": 1}"#).is_err());
        assert!(SubscribeRequest::from_json("not json").is_err());
    }
}
