use anyhow::Result;

pub type SubscriberId = u64;

/// One connected client, as the session tailer sees it.
///
/// The transport owns the socket; the tailer only hands frames over and
/// reads the congestion gauge. A send failure affects that subscriber alone.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    /// Deliver one serialized frame
    fn send(&self, frame: &str) -> Result<()>;

    /// Bytes queued toward this client but not yet flushed; past the drop
    /// threshold the tailer skips this subscriber and lets the resume path
    /// catch it up
    fn buffered_bytes(&self) -> usize;
}
