// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The worker: subscription loop and retry supervisor.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pkgsift_worker::worker::{RetryPolicy, Worker};
//!
//! let worker = Worker::builder()
//!     .config(Config::from_env()?)
//!     .ecosystems(EcosystemRegistry::with_defaults()?)
//!     .sandboxes(Arc::new(PodmanSandboxFactory::default()))
//!     .buckets(Arc::new(UrlBucketOpener::new()))
//!     .subscriptions(Arc::new(UrlSubscriptionOpener::new(rabbit_url)))
//!     .build()?;
//!
//! worker.run(RetryPolicy::default()).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::ecosystem::EcosystemRegistry;
use crate::error::{Error, Result};
use crate::handler::{HandlerContext, handle_message};
use crate::queue::{QueueError, SubscriptionOpener};
use crate::sandbox::SandboxFactory;
use crate::store::BucketOpener;

/// Backoff policy for restarting the subscription loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failures after which the worker gives up
    pub max_retries: u32,
    /// Delay multiplier in seconds (at least 1)
    pub base_interval_secs: f64,
    /// Growth per failure (greater than 1)
    pub growth_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_interval_secs: 1.0,
            growth_rate: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures:
    /// `floor(base * rate^failures)` seconds.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let secs = (self.base_interval_secs * self.growth_rate.powi(exponent)).floor();
        // Saturating cast: negative or NaN becomes 0
        Duration::from_secs(secs as u64)
    }
}

/// Builder for a [`Worker`].
#[derive(Default)]
pub struct WorkerBuilder {
    config: Option<Config>,
    ecosystems: Option<EcosystemRegistry>,
    sandboxes: Option<Arc<dyn SandboxFactory>>,
    buckets: Option<Arc<dyn BucketOpener>>,
    subscriptions: Option<Arc<dyn SubscriptionOpener>>,
}

impl WorkerBuilder {
    /// Create a builder with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the ecosystem providers (required).
    pub fn ecosystems(mut self, ecosystems: EcosystemRegistry) -> Self {
        self.ecosystems = Some(ecosystems);
        self
    }

    /// Set the sandbox backend (required).
    pub fn sandboxes(mut self, sandboxes: Arc<dyn SandboxFactory>) -> Self {
        self.sandboxes = Some(sandboxes);
        self
    }

    /// Set how bucket locators are opened (required).
    pub fn buckets(mut self, buckets: Arc<dyn BucketOpener>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Set how the subscription locator is opened (required).
    pub fn subscriptions(mut self, subscriptions: Arc<dyn SubscriptionOpener>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    /// Build the worker.
    pub fn build(self) -> anyhow::Result<Worker> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("config is required"))?;
        let ecosystems = self
            .ecosystems
            .ok_or_else(|| anyhow::anyhow!("ecosystems is required"))?;
        let sandboxes = self
            .sandboxes
            .ok_or_else(|| anyhow::anyhow!("sandboxes is required"))?;
        let buckets = self
            .buckets
            .ok_or_else(|| anyhow::anyhow!("buckets is required"))?;
        let subscriptions = self
            .subscriptions
            .ok_or_else(|| anyhow::anyhow!("subscriptions is required"))?;

        Ok(Worker {
            config,
            ecosystems: Arc::new(ecosystems),
            sandboxes,
            buckets,
            subscriptions,
        })
    }
}

/// Queue-driven analysis worker. Processes one message at a time.
pub struct Worker {
    config: Config,
    ecosystems: Arc<EcosystemRegistry>,
    sandboxes: Arc<dyn SandboxFactory>,
    buckets: Arc<dyn BucketOpener>,
    subscriptions: Arc<dyn SubscriptionOpener>,
}

impl Worker {
    /// Create a builder.
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    /// Worker configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn context(&self) -> Result<HandlerContext> {
        let packages = match self.config.packages_bucket.as_deref() {
            Some(locator) => Some(self.buckets.open(locator).await?),
            None => None,
        };
        Ok(HandlerContext {
            ecosystems: self.ecosystems.clone(),
            sandboxes: self.sandboxes.clone(),
            buckets: self.buckets.clone(),
            packages,
            results_bucket: self.config.results_bucket.clone(),
            image_tag: self.config.image_tag.clone(),
            phase_timeout: self.config.phase_timeout,
        })
    }

    /// Open the subscription and handle messages until it fails.
    ///
    /// Handler errors are logged and the loop moves on to the next message.
    /// The handler has already nacked the failed message. Only a subscription
    /// error ends the loop.
    pub async fn message_loop(&self) -> Result<()> {
        let ctx = self.context().await?;
        let mut subscription = self.subscriptions.open(&self.config.subscription).await?;

        info!(subscription = %self.config.subscription, "Listening for messages to process...");

        loop {
            let message = subscription.receive().await?;
            if let Err(e) = handle_message(&ctx, message).await {
                error!(error = %e, "Failed to process message");
            }
        }
    }

    /// Run the subscription loop, restarting it with backoff when it fails.
    ///
    /// Returns [`Error::RetriesExceeded`] once `policy.max_retries`
    /// consecutive loop failures have been observed. The counter is never
    /// reset.
    pub async fn run(&self, policy: RetryPolicy) -> Result<()> {
        let mut failures: u32 = 0;
        loop {
            let err = match self.message_loop().await {
                Ok(()) => Error::Queue(QueueError::Closed),
                Err(e) => e,
            };

            failures += 1;
            if failures >= policy.max_retries {
                error!(retry_count = failures, error = %err, "Retries exceeded");
                return Err(Error::RetriesExceeded {
                    attempts: failures,
                    source: Box::new(err),
                });
            }

            let wait = policy.delay(failures);
            warn!(
                retry_count = failures,
                wait_seconds = wait.as_secs(),
                error = %err,
                "Error encountered, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
