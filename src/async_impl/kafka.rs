//! Change log transport reading the schemas topic with rdkafka.
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::info;

use crate::async_impl::change_log_sync::{ChangeLogEvent, ChangeLogTransport};
use crate::error::SRCError;

/// Reads the single partition of the schemas topic from the beginning. Offsets are never
/// committed, every start reads all the records again.
pub struct KafkaChangeLog {
    consumer: StreamConsumer,
}

impl KafkaChangeLog {
    pub fn new(bootstrap_servers: &str, topic: &str) -> Result<KafkaChangeLog, SRCError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set(
                "group.id",
                format!("schema-registry-cache-{}", std::process::id()),
            )
            .set("enable.partition.eof", "true")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| SRCError::non_retryable_with_cause(e, "could not create kafka consumer"))?;
        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, 0, Offset::Beginning)
            .map_err(|e| SRCError::non_retryable_with_cause(e, "invalid change log partition"))?;
        consumer
            .assign(&assignment)
            .map_err(|e| SRCError::retryable_with_cause(e, "could not assign change log topic"))?;
        info!(topic, bootstrap_servers, "assigned change log topic");
        Ok(KafkaChangeLog { consumer })
    }
}

#[async_trait]
impl ChangeLogTransport for KafkaChangeLog {
    async fn next_event(&mut self) -> Option<ChangeLogEvent> {
        let event = match self.consumer.recv().await {
            Ok(m) => ChangeLogEvent::Record {
                key: m.key().map(<[u8]>::to_vec).unwrap_or_default(),
                value: m.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            },
            Err(KafkaError::PartitionEOF(_)) => ChangeLogEvent::PartitionEnd,
            Err(e) => ChangeLogEvent::Error(SRCError::retryable_with_cause(
                e,
                "could not read from change log",
            )),
        };
        Some(event)
    }
}
