//! NATS JetStream event bus.
//!
//! Each producing service owns one stream capturing `<service>.>`. Every
//! `(subject, consumer)` pair is a durable pull consumer filtered on the
//! subject template, so consumers acknowledge independently and unacked
//! messages survive restarts.

use std::collections::HashMap;

use async_nats::jetstream::{self, AckKind, Context, consumer::pull, stream};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::bus::{Acker, Delivery, EventBus, Subscription};
use crate::error::BusError;

/// Event bus backed by NATS JetStream.
pub struct JetStreamBus {
    client: async_nats::Client,
    jetstream: Context,
    streams: Mutex<HashMap<String, stream::Stream>>,
}

impl JetStreamBus {
    /// Connects to the NATS server at `url`. `name` identifies the
    /// connection on the server side.
    pub async fn connect(url: &str, name: &str) -> Result<Self, BusError> {
        tracing::info!(url, "connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .name(name)
            .connect(url)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        tracing::info!("connected to NATS");

        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
            streams: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the stream that captures `subject`, creating it if needed.
    async fn stream_for(&self, subject: &str) -> Result<stream::Stream, BusError> {
        let prefix = subject.split('.').next().unwrap_or(subject);
        let name = prefix.to_uppercase();

        let mut streams = self.streams.lock().await;
        if let Some(stream) = streams.get(&name) {
            return Ok(stream.clone());
        }

        let stream = self
            .jetstream
            .get_or_create_stream(stream::Config {
                name: name.clone(),
                subjects: vec![format!("{prefix}.>")],
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Transport(format!("failed to create stream {name}: {e}")))?;
        streams.insert(name, stream.clone());
        Ok(stream)
    }
}

#[async_trait]
impl EventBus for JetStreamBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.stream_for(subject).await?;
        self.jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        tracing::debug!(subject, "published to JetStream");
        Ok(())
    }

    async fn subscribe(&self, subject: &str, consumer: &str) -> Result<Subscription, BusError> {
        let stream = self.stream_for(subject).await?;
        let durable = format!("{consumer}-{}", subject.replace('.', "-"));

        let pull_consumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: subject.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Transport(format!("failed to create consumer {durable}: {e}")))?;

        let messages = pull_consumer
            .messages()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let consumer_subject = format!("{subject}.{consumer}");
        let delivery_subject = consumer_subject.clone();
        let deliveries = messages.filter_map(move |item| {
            let subject = delivery_subject.clone();
            async move {
                match item {
                    Ok(message) => {
                        let attempt = message
                            .info()
                            .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
                            .unwrap_or(1);
                        let payload = message.payload.to_vec();
                        Some(Delivery::new(
                            subject,
                            payload,
                            attempt,
                            Box::new(JetStreamAcker(message)),
                        ))
                    }
                    Err(e) => {
                        tracing::warn!(subject = %subject, error = %e, "failed to receive message");
                        None
                    }
                }
            }
        });

        tracing::info!(subject = %consumer_subject, durable = %durable, "subscribed to JetStream");
        Ok(Subscription::new(consumer_subject, Box::pin(deliveries)))
    }

    /// Flushes pending publishes, then drains the connection. Remaining
    /// subscriptions end and later calls fail.
    async fn close(&self) -> Result<(), BusError> {
        tracing::info!("closing NATS connection");
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        self.client
            .drain()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}

struct JetStreamAcker(jetstream::Message);

#[async_trait]
impl Acker for JetStreamAcker {
    async fn ack(&self) -> Result<(), BusError> {
        self.0
            .ack()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn nak(&self) -> Result<(), BusError> {
        self.0
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}
