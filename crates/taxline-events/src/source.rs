//! Message sources feeding the invalidator.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One message taken from the event log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Raw message value; `None` for tombstones.
    pub payload: Option<Vec<u8>>,
}

impl SourceMessage {
    /// A message with a payload and zeroed coordinates.
    #[must_use]
    pub fn with_payload(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            payload: Some(payload.into()),
        }
    }
}

/// Errors a source can report while polling.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reached the end of a partition. Informational.
    #[error("reached end of partition {partition}")]
    EndOfPartition {
        /// Partition that was drained.
        partition: i32,
    },
    /// A broker or network problem the source expects to recover from.
    #[error("transient source error: {0}")]
    Transient(String),
    /// The source cannot produce any more messages.
    #[error("source closed")]
    Closed,
}

/// A subscription to a stream of business-change events.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Waits for the next message.
    async fn recv(&mut self) -> Result<SourceMessage, SourceError>;

    /// Releases the subscription. Called once when the consume loop exits.
    async fn close(&mut self);

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// In-process source fed through a channel.
///
/// Handy for wiring the invalidator to events produced inside the process, and for
/// tests.
#[derive(Debug)]
pub struct ChannelEventSource {
    receiver: mpsc::Receiver<Result<SourceMessage, SourceError>>,
    closed: Arc<AtomicBool>,
}

impl ChannelEventSource {
    /// Create a source and the sender that feeds it.
    #[must_use]
    pub fn channel(
        capacity: usize,
    ) -> (mpsc::Sender<Result<SourceMessage, SourceError>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        let source = Self {
            receiver,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (sender, source)
    }

    /// Flag set once [`EventSource::close`] has run.
    #[must_use]
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn recv(&mut self) -> Result<SourceMessage, SourceError> {
        self.receiver.recv().await.unwrap_or(Err(SourceError::Closed))
    }

    async fn close(&mut self) {
        self.receiver.close();
        self.closed.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_reports_closed_after_senders_drop() {
        let (sender, mut source) = ChannelEventSource::channel(4);
        sender
            .send(Ok(SourceMessage::with_payload("t", b"{}".to_vec())))
            .await
            .unwrap();
        sender
            .send(Err(SourceError::Transient("rebalance".into())))
            .await
            .unwrap();
        drop(sender);

        let message = source.recv().await.unwrap();
        assert_eq!(message.payload.as_deref(), Some(&b"{}"[..]));
        assert!(matches!(
            source.recv().await,
            Err(SourceError::Transient(e)) if e == "rebalance"
        ));
        assert!(matches!(source.recv().await, Err(SourceError::Closed)));

        let flag = source.closed_flag();
        source.close().await;
        assert!(flag.load(Ordering::SeqCst));
    }
}
