// Error types
pub mod error;

// Raw transcript record schema
pub mod schema;

// Line-level validation
pub mod lines;

// Record-to-event derivation
pub mod events;

// Incremental parse state and agent metadata
pub mod state;

// One-shot session loading
pub mod snapshot;

pub use error::{Error, Result, SnapshotParseError};
pub use events::{TASK_TOOL, parse_events};
pub use lines::{LineError, parse_lines};
pub use schema::{ContentBlock, LogEntry, Message, MessageRecord, SummaryRecord, ToolUseResult};
pub use snapshot::{
    SessionSnapshot, agent_id_from_filename, parse_session, session_agent_dir,
};
pub use state::{ParseState, build_agent_node, process_agent_entries, process_main_entries};
