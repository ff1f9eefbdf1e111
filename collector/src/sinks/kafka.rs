use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, error, info, info_span, instrument, Instrument};

use crate::api::CollectorError;
use crate::config::KafkaConfig;
use crate::prometheus::{report_dropped_events, EVENTS_PUBLISHED_TOTAL};
use crate::sinks::Publisher;

struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!("collector_kafka_callback_queue_depth").set(stats.replyq as f64);
        gauge!("collector_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("collector_kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
        gauge!("collector_kafka_producer_queue_bytes").set(stats.msg_size as f64);
        gauge!("collector_kafka_producer_queue_bytes_limit").set(stats.msg_size_max as f64);

        for (topic, stats) in stats.topics {
            gauge!(
                "collector_kafka_produce_avg_batch_size_bytes",
                "topic" => topic.clone()
            )
            .set(stats.batchsize.avg as f64);
            gauge!(
                "collector_kafka_produce_avg_batch_size_events",
                "topic" => topic
            )
            .set(stats.batchcnt.avg as f64);
        }

        for (_, stats) in stats.brokers {
            let id_string = format!("{}", stats.nodeid);
            gauge!(
                "collector_kafka_broker_requests_pending",
                "broker" => id_string.clone()
            )
            .set(stats.outbuf_cnt as f64);
            counter!(
                "collector_kafka_broker_tx_errors_total",
                "broker" => id_string.clone()
            )
            .absolute(stats.txerrs);
            counter!(
                "collector_kafka_broker_rx_errors_total",
                "broker" => id_string
            )
            .absolute(stats.rxerrs);
        }
    }
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: KafkaConfig) -> anyhow::Result<KafkaPublisher> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set("compression.codec", config.kafka_compression_codec)
            .set(
                "queue.buffering.max.kbytes",
                (config.kafka_producer_queue_mib * 1024).to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext)?;

        // Ping the cluster to make sure we can reach brokers, fail after 10 seconds
        drop(producer.client().fetch_metadata(
            Some("__consumer_offsets"),
            Timeout::After(Duration::new(10, 0)),
        )?);
        info!("connected to Kafka brokers");

        Ok(KafkaPublisher {
            producer,
            topic: config.kafka_topic,
        })
    }

    /// Puts the message in the producer queue, does not wait for the broker.
    fn enqueue(&self, message: &str) -> Result<DeliveryFuture, CollectorError> {
        let record = FutureRecord::<(), str>::to(&self.topic).payload(message);

        match self.producer.send_result(record) {
            Ok(ack) => Ok(ack),
            Err((e, _)) => match e.rdkafka_error_code() {
                Some(RDKafkaErrorCode::MessageSizeTooLarge) => {
                    report_dropped_events("message_too_large", 1);
                    Err(CollectorError::PublishFailure(e.to_string()))
                }
                _ => {
                    report_dropped_events("publish_enqueue", 1);
                    Err(CollectorError::PublishFailure(e.to_string()))
                }
            },
        }
    }

    async fn process_ack(delivery: DeliveryFuture) {
        match delivery.await {
            Err(_) => {
                // Cancelled due to timeout while retrying
                report_dropped_events("publish_delivery", 1);
                error!("failed to produce to Kafka before write timeout");
            }
            Ok(Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge), _))) => {
                // Rejected by broker due to message size
                report_dropped_events("message_too_large", 1);
                error!("collector payload rejected by broker: message too large");
            }
            Ok(Err((err, _))) => {
                report_dropped_events("publish_delivery", 1);
                error!("failed to produce to Kafka: {}", err);
            }
            Ok(Ok(_)) => {
                counter!(EVENTS_PUBLISHED_TOTAL).increment(1);
            }
        }
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    #[instrument(skip_all)]
    async fn publish(&self, message: String) -> Result<(), CollectorError> {
        let ack = self.enqueue(&message)?;

        // The broker ACK is awaited off the request path
        tokio::spawn(Self::process_ack(ack).instrument(info_span!("ack_wait")));
        Ok(())
    }

    async fn flush(&self) -> Result<(), CollectorError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Duration::new(30, 0)))
            .await
            .map_err(|e| CollectorError::PublishFailure(e.to_string()))?
            .map_err(|e| CollectorError::PublishFailure(e.to_string()))
    }
}
