//! Kafka sample source
//!
//! Consumes the topic cAdvisor's Kafka storage driver publishes to.

use super::SampleSource;
use crate::error::{RebalancerError, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::Message;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

/// Kafka connection settings
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    /// Extra librdkafka options passed through verbatim
    pub extra: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "k8s-cluster".to_string(),
            group_id: "monitoring".to_string(),
            auto_offset_reset: "latest".to_string(),
            extra: HashMap::new(),
        }
    }
}

pub struct KafkaSampleSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSampleSource {
    /// Create the consumer and subscribe to the sample topic
    pub fn subscribe(config: &KafkaConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.partition.eof", "true");
        for (key, value) in &config.extra {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| RebalancerError::Startup(e.into()))?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| RebalancerError::Startup(e.into()))?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to sample topic"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl SampleSource for KafkaSampleSource {
    async fn poll(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>> {
        let received = match tokio::time::timeout(max_wait, self.consumer.recv()).await {
            Err(_elapsed) => return Ok(None),
            Ok(received) => received.map(|message| message.payload().map(<[u8]>::to_vec)),
        };

        classify(&self.topic, received)
    }
}

/// Map a consumer result onto the source contract
///
/// End of partition is "no sample"; every other consumer error ends the transport.
fn classify(
    topic: &str,
    received: std::result::Result<Option<Vec<u8>>, KafkaError>,
) -> Result<Option<Vec<u8>>> {
    match received {
        Ok(payload) => Ok(payload),
        Err(KafkaError::PartitionEOF(partition)) => {
            debug!(topic = %topic, partition, "Reached end of partition");
            Ok(None)
        }
        Err(e) => {
            error!(topic = %topic, error = %e, "Kafka consumer error");
            Err(RebalancerError::TransportFatal(e.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_payload_is_passed_through() {
        let payload = b"{\"container_Name\":\"/docker/abc\"}".to_vec();
        assert_eq!(
            classify("k8s-cluster", Ok(Some(payload.clone()))).unwrap(),
            Some(payload)
        );
        assert_eq!(classify("k8s-cluster", Ok(None)).unwrap(), None);
    }

    #[test]
    fn test_partition_eof_is_no_sample() {
        let polled = classify("k8s-cluster", Err(KafkaError::PartitionEOF(0)));
        assert_eq!(polled.unwrap(), None);
    }

    #[test]
    fn test_other_consumer_errors_are_fatal() {
        let polled = classify("k8s-cluster", Err(KafkaError::NoMessageReceived));
        assert!(matches!(polled, Err(RebalancerError::TransportFatal(_))));

        let polled = classify("k8s-cluster", Err(KafkaError::Canceled));
        assert!(matches!(polled, Err(RebalancerError::TransportFatal(_))));
    }

    #[test]
    fn test_default_config_matches_cadvisor_driver() {
        let config = KafkaConfig::default();
        assert_eq!(config.topic, "k8s-cluster");
        assert_eq!(config.group_id, "monitoring");
    }
}
