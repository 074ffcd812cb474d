//! Sample transports
//!
//! A [`SampleSource`] hands out serialized usage samples one at a time.
//! Decoding happens in the engine so every transport shares the same
//! malformed-message handling.

mod channel;
#[cfg(feature = "kafka")]
mod kafka;
mod lines;

pub use channel::ChannelSource;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaSampleSource};
pub use lines::LineSampleSource;

use crate::error::Result;
use std::time::Duration;

pub use async_trait::async_trait;

/// Stream of serialized usage samples
#[async_trait]
pub trait SampleSource: Send {
    /// Wait at most `max_wait` for the next message
    ///
    /// `Ok(None)` means no message this round (timeout, end of partition).
    /// An error means the transport is gone for good.
    async fn poll(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>>;
}
