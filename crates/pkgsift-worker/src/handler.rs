// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-message job handling.
//!
//! [`handle_message`] validates a job, stages its artifact, resolves the
//! package, runs the ecosystem's phases in a fresh sandbox, logs the outcome
//! and uploads the results. The message is acknowledged when the job is fully
//! processed or deliberately dropped. On any error it is nacked: a first
//! delivery is requeued so the job is retried once, a redelivered message is
//! discarded so a job that always fails cannot block the queue.
//!
//! Job-local resources are scoped to the call: the staged artifact is removed
//! when its [`StagedPackage`](crate::staging::StagedPackage) drops, and the
//! sandbox is cleaned after the phases run, whether or not they succeeded.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::analysis::{JobOutcome, log_outcome, run_phases};
use crate::ecosystem::{Ecosystem, EcosystemRegistry, Package};
use crate::error::{Error, Result};
use crate::job::{Job, Rejection};
use crate::queue::{Message, QueueError};
use crate::result_store::ResultStore;
use crate::sandbox::{SandboxFactory, SandboxSpec};
use crate::staging::{self, StagedPackage};
use crate::store::{BlobStore, BucketOpener};

/// Everything a handler invocation reads. Shared across jobs.
#[derive(Clone)]
pub struct HandlerContext {
    /// Supported ecosystems
    pub ecosystems: Arc<EcosystemRegistry>,
    /// Creates one sandbox per job
    pub sandboxes: Arc<dyn SandboxFactory>,
    /// Opens results buckets by locator
    pub buckets: Arc<dyn BucketOpener>,
    /// Store that `package_path` artifacts are read from
    pub packages: Option<Arc<dyn BlobStore>>,
    /// Default results bucket locator
    pub results_bucket: Option<String>,
    /// Tag applied to sandbox images
    pub image_tag: String,
    /// Wall-clock limit per phase
    pub phase_timeout: Duration,
}

/// Why a message was acknowledged without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Metadata failed validation.
    Invalid(Rejection),
    /// No provider for the requested ecosystem.
    UnsupportedEcosystem(String),
}

/// What happened to an acknowledged message.
#[derive(Debug)]
pub enum HandleOutcome {
    /// The job ran to completion.
    Processed {
        /// Package that was analyzed
        package: Package,
        /// Phase results and final status
        outcome: JobOutcome,
        /// Key of the uploaded results, if a results bucket was configured
        results_key: Option<String>,
    },
    /// The job was dropped.
    Dropped(DropReason),
}

/// Handle one message end to end.
pub async fn handle_message(ctx: &HandlerContext, message: Message) -> Result<HandleOutcome> {
    let job = match Job::from_metadata(message.metadata()) {
        Ok(job) => job,
        Err(rejection) => {
            let name = match &rejection {
                Rejection::EmptyName => {
                    warn!("name is empty");
                    ""
                }
                Rejection::EmptyEcosystem { name } => {
                    warn!(name = %name, "ecosystem is empty");
                    name.as_str()
                }
            };
            ack(message, name, "").await?;
            return Ok(HandleOutcome::Dropped(DropReason::Invalid(rejection)));
        }
    };

    let Some(provider) = ctx.ecosystems.get(&job.ecosystem) else {
        warn!(
            name = %job.name,
            ecosystem = %job.ecosystem,
            "Unsupported pkg manager"
        );
        ack(message, &job.name, &job.ecosystem).await?;
        return Ok(HandleOutcome::Dropped(DropReason::UnsupportedEcosystem(
            job.ecosystem,
        )));
    };

    let results_bucket = job
        .results_bucket(ctx.results_bucket.as_deref())
        .map(str::to_string);

    info!(
        name = %job.name,
        ecosystem = %job.ecosystem,
        version = %job.version.as_deref().unwrap_or(""),
        package_path = %job.package_path.as_deref().unwrap_or(""),
        results_bucket_override = %job.results_bucket_override.as_deref().unwrap_or(""),
        redelivered = message.redelivered(),
        "Got request"
    );

    match process(ctx, &job, provider.as_ref(), results_bucket.as_deref()).await {
        Ok(processed) => {
            ack(message, &job.name, &job.ecosystem).await?;
            Ok(processed)
        }
        Err(e) => {
            let requeue = !message.redelivered();
            if let Err(nack_err) = message.nack(requeue).await {
                warn!(
                    name = %job.name,
                    ecosystem = %job.ecosystem,
                    error = %nack_err,
                    "Failed to nack message"
                );
            } else if !requeue {
                warn!(
                    name = %job.name,
                    ecosystem = %job.ecosystem,
                    error = %e,
                    "Giving up on redelivered message"
                );
            }
            Err(e)
        }
    }
}

async fn ack(message: Message, name: &str, ecosystem: &str) -> Result<()> {
    message.ack().await.map_err(|e: QueueError| {
        error!(
            name = %name,
            ecosystem = %ecosystem,
            error = %e,
            "Failed to ack message"
        );
        Error::Queue(e)
    })
}

async fn process(
    ctx: &HandlerContext,
    job: &Job,
    provider: &dyn Ecosystem,
    results_bucket: Option<&str>,
) -> Result<HandleOutcome> {
    let staged = match job.package_path.as_deref() {
        Some(path) => {
            let store = ctx
                .packages
                .as_deref()
                .ok_or(Error::PackagesStoreNotConfigured)?;
            Some(staging::stage(store, path).await?)
        }
        None => None,
    };

    let package = resolve(provider, job, staged.as_ref()).await?;

    let spec = SandboxSpec {
        image: provider.image().to_string(),
        tag: ctx.image_tag.clone(),
        volumes: staged.iter().map(StagedPackage::volume).collect(),
        timeout: ctx.phase_timeout,
    };
    let mut sandbox = ctx.sandboxes.create(spec);
    let phases = provider.phases();
    let run = run_phases(sandbox.as_mut(), provider, &package, &phases).await;
    sandbox.clean().await;
    let outcome = run?;

    log_outcome(&package, &outcome);

    let results_key = match results_bucket {
        Some(locator) => {
            let bucket = ctx.buckets.open(locator).await?;
            let key = ResultStore::new(bucket)
                .save(&package, &outcome.results)
                .await
                .inspect_err(|e| {
                    error!(
                        ecosystem = %package.ecosystem,
                        name = %package.name,
                        version = %package.version,
                        bucket = %locator,
                        error = %e,
                        "Failed to upload results"
                    )
                })?;
            Some(key)
        }
        None => None,
    };

    Ok(HandleOutcome::Processed {
        package,
        outcome,
        results_key,
    })
}

/// Staged artifact first, then explicit version, then the latest release.
async fn resolve(
    provider: &dyn Ecosystem,
    job: &Job,
    staged: Option<&StagedPackage>,
) -> Result<Package> {
    let version = job.version.as_deref();
    let package = match (staged, version) {
        (Some(staged), version) => {
            provider.local(&job.name, version.unwrap_or(""), staged.sandbox_path())
        }
        (None, Some(version)) => provider.package(&job.name, version),
        (None, None) => provider.latest(&job.name).await.inspect_err(|e| {
            error!(
                ecosystem = %job.ecosystem,
                name = %job.name,
                error = %e,
                "Failed to get latest version"
            )
        })?,
    };
    Ok(package)
}
