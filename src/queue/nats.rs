//! NATS JetStream adapters
//!
//! The publisher waits for the JetStream publish ack, so a returned `Ok`
//! means the stream persisted the event. The source is a durable pull
//! consumer with explicit acks; unsettled messages come back after
//! `ack_wait`.

use async_nats::jetstream::{self, consumer, stream, AckKind, Context};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{QueueConfig, ReplicatorConfig};
use crate::domain::TransactionEvent;

use super::{Acknowledger, Delivery, EventPublisher, EventSource, QueueError};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

async fn connect_jetstream(config: &QueueConfig) -> Result<Context, QueueError> {
    info!("Connecting to NATS JetStream at {}", config.nats_url);

    let client = async_nats::connect(&config.nats_url)
        .await
        .map_err(|e| QueueError::Connection(e.to_string()))?;
    let context = jetstream::new(client);

    context
        .get_or_create_stream(stream::Config {
            name: config.stream.clone(),
            subjects: vec![config.subject.clone()],
            description: Some("Committed ledger transactions".to_string()),
            storage: stream::StorageType::File,
            duplicate_window: Duration::from_secs(120),
            ..Default::default()
        })
        .await
        .map_err(|e| QueueError::JetStream(e.to_string()))?;

    info!("Stream {} ready", config.stream);
    Ok(context)
}

// =========================================================================
// Publisher
// =========================================================================

/// Publishes transaction events to a JetStream subject
pub struct JetStreamPublisher {
    context: Context,
    subject: String,
    max_attempts: u32,
    publish_timeout: Duration,
}

impl JetStreamPublisher {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let context = connect_jetstream(config).await?;
        Ok(Self {
            context,
            subject: config.subject.clone(),
            max_attempts: config.publish_max_attempts,
            publish_timeout: config.publish_timeout,
        })
    }

    async fn publish_once(&self, event_key: &str, payload: Bytes) -> Result<(), QueueError> {
        // The broker drops retries of an already stored message inside the
        // duplicate window
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", event_key);

        let ack = self
            .context
            .publish_with_headers(self.subject.clone(), headers, payload)
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        ack.await
            .map_err(|e| QueueError::JetStream(format!("Publish ack failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for JetStreamPublisher {
    async fn publish(&self, event: &TransactionEvent) -> Result<(), QueueError> {
        let payload = Bytes::from(event.encode()?);
        let event_key = event.event_key().to_string();

        let mut attempts = 0;
        let mut delay = INITIAL_RETRY_DELAY;

        loop {
            attempts += 1;

            let result = match tokio::time::timeout(
                self.publish_timeout,
                self.publish_once(&event_key, payload.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(QueueError::Publish(format!(
                    "timed out after {:?}",
                    self.publish_timeout
                ))),
            };

            match result {
                Ok(()) => {
                    if attempts > 1 {
                        info!(
                            transaction_id = %event.transaction_id,
                            attempts,
                            "Event published after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if attempts >= self.max_attempts => {
                    error!(
                        transaction_id = %event.transaction_id,
                        attempts,
                        error = %e,
                        "Failed to publish event"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        transaction_id = %event.transaction_id,
                        attempt = attempts,
                        error = %e,
                        "Publish failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }
}

// =========================================================================
// Source
// =========================================================================

/// Durable pull consumer over the transaction stream
pub struct JetStreamSource {
    messages: consumer::pull::Stream,
    redelivery_delay: Duration,
}

impl JetStreamSource {
    pub async fn connect(config: &ReplicatorConfig) -> Result<Self, QueueError> {
        let context = connect_jetstream(&config.queue).await?;

        let consumer_config = consumer::pull::Config {
            durable_name: Some(config.durable_name.clone()),
            description: Some("Mirrors transactions into the history store".to_string()),
            filter_subject: config.queue.subject.clone(),
            ack_policy: consumer::AckPolicy::Explicit,
            ack_wait: config.ack_wait,
            deliver_policy: consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = context
            .get_stream(&config.queue.stream)
            .await
            .map_err(|e| QueueError::JetStream(e.to_string()))?
            .create_consumer(consumer_config)
            .await
            .map_err(|e| QueueError::JetStream(e.to_string()))?;

        info!(
            durable = %config.durable_name,
            stream = %config.queue.stream,
            "JetStream consumer ready"
        );

        let messages = consumer
            .messages()
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?;

        Ok(Self {
            messages,
            redelivery_delay: config.redelivery_delay,
        })
    }
}

#[async_trait]
impl EventSource for JetStreamSource {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, QueueError>> {
        let message = match self.messages.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(QueueError::Receive(e.to_string()))),
        };

        let delivery_count = message
            .info()
            .map(|info| u64::try_from(info.delivered).unwrap_or(1))
            .unwrap_or(1);
        let payload = message.payload.clone();
        let acker = JetStreamAcker {
            message,
            redelivery_delay: self.redelivery_delay,
        };

        Some(Ok(Delivery::new(payload, delivery_count, Box::new(acker))))
    }
}

struct JetStreamAcker {
    message: jetstream::Message,
    redelivery_delay: Duration,
}

#[async_trait]
impl Acknowledger for JetStreamAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.message
            .ack()
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }

    async fn nak(&self) -> Result<(), QueueError> {
        self.message
            .ack_with(AckKind::Nak(Some(self.redelivery_delay)))
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }

    async fn term(&self) -> Result<(), QueueError> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }
}
