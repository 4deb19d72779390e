// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RabbitMQ subscription.
//!
//! Consumes one queue with a prefetch of one, so a worker never holds more
//! than the job it is processing. Job metadata travels in the message headers.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker as DeliveryAcker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Acker, Message, QueueError, Subscription};

/// Subscription to a RabbitMQ queue.
pub struct RabbitSubscription {
    // Dropping the connection closes the consumer.
    _connection: Connection,
    _channel: Channel,
    consumer: Consumer,
    queue: String,
}

impl RabbitSubscription {
    /// Connect to `server_url` and start consuming `queue`.
    pub async fn connect(server_url: &str, queue: &str) -> Result<Self, QueueError> {
        let connection = Connection::connect(server_url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let consumer_tag = format!("pkgsift-worker-{}", Uuid::new_v4().simple());
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %queue, consumer_tag = %consumer_tag, "Subscribed to queue");

        Ok(Self {
            _connection: connection,
            _channel: channel,
            consumer,
            queue: queue.to_string(),
        })
    }
}

/// String-valued headers of a delivery. Non-string headers are skipped.
fn header_metadata(headers: Option<&FieldTable>) -> HashMap<String, String> {
    let Some(headers) = headers else {
        return HashMap::new();
    };
    headers
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                AMQPValue::ShortString(s) => s.as_str().to_string(),
                _ => return None,
            };
            Some((key.as_str().to_string(), value))
        })
        .collect()
}

#[async_trait]
impl Subscription for RabbitSubscription {
    async fn receive(&mut self) -> Result<Message, QueueError> {
        let delivery = match self.consumer.next().await {
            Some(delivery) => delivery?,
            None => return Err(QueueError::Closed),
        };

        debug!(
            queue = %self.queue,
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            "Message received"
        );

        let metadata = header_metadata(delivery.properties.headers().as_ref());
        Ok(Message::new(
            metadata,
            delivery.redelivered,
            Box::new(RabbitAcker {
                acker: delivery.acker,
                delivery_tag: delivery.delivery_tag,
            }),
        ))
    }
}

struct RabbitAcker {
    acker: DeliveryAcker,
    delivery_tag: u64,
}

#[async_trait]
impl Acker for RabbitAcker {
    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        self.acker.ack(BasicAckOptions::default()).await?;
        debug!(delivery_tag = self.delivery_tag, "Message acked");
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), QueueError> {
        let options = BasicNackOptions {
            requeue,
            ..BasicNackOptions::default()
        };
        self.acker.nack(options).await?;
        debug!(delivery_tag = self.delivery_tag, requeue, "Message nacked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::{LongString, ShortString};

    #[test]
    fn test_header_metadata() {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from("name"),
            AMQPValue::LongString(LongString::from("left-pad")),
        );
        headers.insert(
            ShortString::from("ecosystem"),
            AMQPValue::ShortString(ShortString::from("npm")),
        );
        headers.insert(ShortString::from("retries"), AMQPValue::LongInt(3));

        let metadata = header_metadata(Some(&headers));

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata["name"], "left-pad");
        assert_eq!(metadata["ecosystem"], "npm");
    }

    #[test]
    fn test_no_headers() {
        assert!(header_metadata(None).is_empty());
    }
}
