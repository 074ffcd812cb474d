//! In-process sample source backed by an mpsc channel

use super::SampleSource;
use crate::error::{RebalancerError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Receives serialized samples pushed by another task
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new(buffer_size: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (tx, Self { rx })
    }
}

#[async_trait]
impl SampleSource for ChannelSource {
    async fn poll(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(max_wait, self.rx.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => Err(RebalancerError::transport("sample channel closed")),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_in_order() {
        let (tx, mut source) = ChannelSource::new(4);
        tx.send(b"one".to_vec()).await.unwrap();
        tx.send(b"two".to_vec()).await.unwrap();

        let wait = Duration::from_millis(50);
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_times_out_without_traffic() {
        let (_tx, mut source) = ChannelSource::new(4);
        let polled = source.poll(Duration::from_millis(10)).await.unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_is_fatal() {
        let (tx, mut source) = ChannelSource::new(4);
        drop(tx);

        let err = source.poll(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, RebalancerError::TransportFatal(_)));
    }
}
