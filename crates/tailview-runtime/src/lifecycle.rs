/// Session tailer lifecycle.
///
/// `Stopped` and `Error` are absorbing: once reached, no event re-activates
/// resources, and async continuations that observe a terminal state abandon
/// their work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initializing,
    Streaming,
    Idle,
    Stopped,
    Error,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Stopped | Lifecycle::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SnapshotReady,
    Fatal,
    IdleTimeout,
    LinesReceived,
    NoSubscribers,
    Stop,
}

/// Outcome of feeding one event into the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(Lifecycle),
    Ignored,
}

/// Pure transition function; effects are the caller's job.
/// Unlisted (state, event) pairs are ignored.
pub fn step(state: Lifecycle, event: LifecycleEvent) -> Transition {
    use Lifecycle::*;
    use LifecycleEvent::*;

    match (state, event) {
        (Initializing, SnapshotReady) => Transition::To(Streaming),
        (Initializing, Fatal) => Transition::To(Error),
        (Streaming, IdleTimeout) => Transition::To(Idle),
        (Streaming, Fatal) => Transition::To(Error),
        (Streaming, NoSubscribers) => Transition::To(Stopped),
        (Idle, LinesReceived) => Transition::To(Streaming),
        (Idle, NoSubscribers) => Transition::To(Stopped),
        (Error, Stop) => Transition::To(Stopped),
        _ => Transition::Ignored,
    }
}
