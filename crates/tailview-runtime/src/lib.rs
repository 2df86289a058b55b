// Runtime configuration
pub mod config;

// Carry-buffer line splitting
pub mod split;

// Per-file tailing
pub mod file_tailer;

// Session lifecycle state machine
pub mod lifecycle;

// Replay ring buffer
pub mod ring;

// Session coordination
pub mod session_tailer;

// Subscriber seam
pub mod subscriber;

// Session tailer multiplexing
pub mod registry;

pub use config::{RegistryConfig, TailerConfig};
pub use file_tailer::{FileTailer, TailEvent};
pub use lifecycle::{Lifecycle, LifecycleEvent, Transition, step};
pub use registry::TailerRegistry;
pub use ring::ReplayRing;
pub use session_tailer::{SessionTailer, SessionTailerHandle};
pub use split::LineBuffer;
pub use subscriber::{Subscriber, SubscriberId};
