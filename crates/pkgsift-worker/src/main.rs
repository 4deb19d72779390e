// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! pkgsift worker - Package Analysis Worker
//!
//! Consumes analysis jobs from the configured subscription and runs them in
//! podman sandboxes until the subscription fails too many times in a row.

use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pkgsift_worker::config::{Config, LogFormat};
use pkgsift_worker::ecosystem::EcosystemRegistry;
use pkgsift_worker::queue::UrlSubscriptionOpener;
use pkgsift_worker::sandbox::{PodmanSandboxFactory, SandboxFactory};
use pkgsift_worker::store::UrlBucketOpener;
use pkgsift_worker::worker::{RetryPolicy, Worker};

fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pkgsift_worker=info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_logging(config.log_format)?;

    if let Err(e) = dotenv {
        debug!(error = %e, "No .env file loaded");
    }

    info!(
        subscription = %config.subscription,
        packages_bucket = %config.packages_bucket.as_deref().unwrap_or(""),
        results_bucket = %config.results_bucket.as_deref().unwrap_or(""),
        image_tag = %config.image_tag,
        phase_timeout_secs = config.phase_timeout.as_secs(),
        "Starting worker"
    );

    let sandboxes = Arc::new(PodmanSandboxFactory::default());
    info!(sandbox_type = sandboxes.sandbox_type(), "Sandbox initialized");

    let subscriptions = Arc::new(UrlSubscriptionOpener::new(config.rabbit_server_url.clone()));

    let worker = Worker::builder()
        .config(config)
        .ecosystems(EcosystemRegistry::with_defaults()?)
        .sandboxes(sandboxes)
        .buckets(Arc::new(UrlBucketOpener::new()))
        .subscriptions(subscriptions)
        .build()?;

    worker.run(RetryPolicy::default()).await?;
    Ok(())
}
