// Error types
pub mod error;

// Event stream schema
pub mod event;

// Agent tree and session aggregate
pub mod agent;

// Subscriber wire protocol
pub mod protocol;

pub use agent::{AgentNode, SessionData};
pub use error::{Error, Result};
pub use event::{
    AgentSpawnPayload, AssistantMessagePayload, EventPayload, SessionEvent, SummaryPayload,
    ThinkingPayload, ToolResultPayload, ToolUsePayload, UserMessagePayload,
};
pub use protocol::{ServerMessage, SubscribeRequest};
