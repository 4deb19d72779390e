// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job subscriptions.
//!
//! A subscription yields [`Message`]s carrying string metadata. Every message
//! is settled exactly once: acknowledged when handled, or negatively
//! acknowledged so the broker can requeue or discard it. A message dropped
//! unsettled is only redelivered once the broker gives up on the consumer.
//!
//! Subscriptions are opened from a locator URL:
//!
//! | Scheme | Backend |
//! |--------|---------|
//! | `rabbit://<queue>` | RabbitMQ queue on `RABBIT_SERVER_URL` |

mod memory;
mod rabbit;

pub use memory::{MemoryQueue, MemorySubscription};
pub use rabbit::RabbitSubscription;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Subscription errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The locator scheme has no backend.
    #[error("unsupported subscription scheme: {0}")]
    UnsupportedScheme(String),

    /// The locator could not be parsed.
    #[error("invalid subscription locator: {0}")]
    InvalidLocator(String),

    /// A `rabbit://` locator was used without a server URL.
    #[error("RABBIT_SERVER_URL is not set")]
    MissingServerUrl,

    /// AMQP protocol or connection failure.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The subscription will not yield any more messages.
    #[error("subscription closed")]
    Closed,

    /// Other failure.
    #[error("{0}")]
    Other(String),
}

/// Settles one delivered message.
#[async_trait]
pub trait Acker: Send {
    /// Acknowledge the message.
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Reject the message. With `requeue` the broker delivers it again,
    /// otherwise it is discarded (or dead-lettered, if the queue says so).
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), QueueError>;
}

/// A delivered job message.
pub struct Message {
    metadata: HashMap<String, String>,
    redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Message {
    /// Wrap delivered metadata with the backend's acker.
    pub fn new(
        metadata: HashMap<String, String>,
        redelivered: bool,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            metadata,
            redelivered,
            acker,
        }
    }

    /// String metadata attached to the message.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Whether the broker delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Acknowledge the message, consuming it.
    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    /// Reject the message, consuming it.
    pub async fn nack(self, requeue: bool) -> Result<(), QueueError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("metadata", &self.metadata)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

/// A stream of job messages.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message.
    ///
    /// An error means the subscription is unusable and should be reopened.
    async fn receive(&mut self) -> Result<Message, QueueError>;
}

/// Opens subscriptions from locators.
#[async_trait]
pub trait SubscriptionOpener: Send + Sync {
    /// Open the subscription behind `locator`.
    async fn open(&self, locator: &str) -> Result<Box<dyn Subscription>, QueueError>;
}

/// Opener dispatching on the locator's URL scheme.
#[derive(Debug, Clone, Default)]
pub struct UrlSubscriptionOpener {
    rabbit_server_url: Option<String>,
}

impl UrlSubscriptionOpener {
    /// Create an opener; `rabbit_server_url` is required for `rabbit://` locators.
    pub fn new(rabbit_server_url: Option<String>) -> Self {
        Self {
            rabbit_server_url: rabbit_server_url.filter(|u| !u.is_empty()),
        }
    }
}

/// Queue name of a `rabbit://<queue>` locator.
fn rabbit_queue_name(locator: &str, url: &Url) -> Result<String, QueueError> {
    let host = url.host_str().unwrap_or_default();
    let path = url.path().trim_start_matches('/');
    let name = match (host.is_empty(), path.is_empty()) {
        (false, true) => host.to_string(),
        (false, false) => format!("{host}/{path}"),
        (true, false) => path.to_string(),
        (true, true) => return Err(QueueError::InvalidLocator(locator.to_string())),
    };
    Ok(name)
}

#[async_trait]
impl SubscriptionOpener for UrlSubscriptionOpener {
    async fn open(&self, locator: &str) -> Result<Box<dyn Subscription>, QueueError> {
        let url = Url::parse(locator)
            .map_err(|e| QueueError::InvalidLocator(format!("{locator}: {e}")))?;

        match url.scheme() {
            "rabbit" => {
                let server = self
                    .rabbit_server_url
                    .as_deref()
                    .ok_or(QueueError::MissingServerUrl)?;
                let queue = rabbit_queue_name(locator, &url)?;
                let subscription = RabbitSubscription::connect(server, &queue).await?;
                Ok(Box::new(subscription))
            }
            other => Err(QueueError::UnsupportedScheme(other.to_string())),
        }
    }
}
