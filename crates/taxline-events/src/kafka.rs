//! Kafka-backed event source.

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::fmt;
use taxline_core::{DataError, Result};
use tracing::{debug, info};

use crate::source::{EventSource, SourceError, SourceMessage};

/// Connection and subscription settings for [`KafkaEventSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Comma-separated broker list.
    pub bootstrap_servers: String,
    /// Client id reported to the brokers.
    pub client_id: String,
    /// Consumer group.
    pub group_id: String,
    /// Topic carrying business updates.
    pub topic: String,
    /// Where to start without a committed offset (`earliest` or `latest`).
    pub offset_reset: String,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9094".to_string(),
            client_id: "orquestador-app-development".to_string(),
            group_id: "orquestador-llm-consumer-group".to_string(),
            topic: "businesses.fct.update.0".to_string(),
            offset_reset: "earliest".to_string(),
        }
    }
}

impl KafkaSettings {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", &self.offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.partition.eof", "true")
            .set("session.timeout.ms", "10000");
        config
    }
}

/// Consumer-group subscription to the business update topic.
///
/// Offsets are committed automatically in the background, whether or not the
/// refresh triggered by a message succeeded.
pub struct KafkaEventSource {
    consumer: StreamConsumer,
    settings: KafkaSettings,
}

impl fmt::Debug for KafkaEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaEventSource")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl KafkaEventSource {
    /// Create the consumer and subscribe to the configured topic.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the consumer cannot be created or
    /// subscribed.
    pub fn new(settings: KafkaSettings) -> Result<Self> {
        let consumer: StreamConsumer = settings
            .client_config()
            .create()
            .map_err(|e| DataError::Configuration(format!("cannot create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[settings.topic.as_str()])
            .map_err(|e| DataError::Configuration(format!("cannot subscribe: {e}")))?;

        info!(
            topic = %settings.topic,
            brokers = %settings.bootstrap_servers,
            group = %settings.group_id,
            "Kafka consumer subscribed"
        );
        Ok(Self { consumer, settings })
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    async fn recv(&mut self) -> std::result::Result<SourceMessage, SourceError> {
        match self.consumer.recv().await {
            Ok(message) => Ok(SourceMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec),
            }),
            Err(KafkaError::PartitionEOF(partition)) => {
                Err(SourceError::EndOfPartition { partition })
            }
            Err(e) => Err(SourceError::Transient(e.to_string())),
        }
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
        debug!(topic = %self.settings.topic, "Kafka consumer unsubscribed");
    }

    fn describe(&self) -> String {
        format!("kafka:{}", self.settings.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config() {
        let settings = KafkaSettings {
            offset_reset: "latest".to_string(),
            ..Default::default()
        };
        let config = settings.client_config();
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9094"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(config.get("enable.auto.commit"), Some("true"));
        assert_eq!(config.get("enable.partition.eof"), Some("true"));
        assert_eq!(
            config.get("group.id"),
            Some("orquestador-llm-consumer-group")
        );
    }
}
