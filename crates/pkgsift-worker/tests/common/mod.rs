// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for pkgsift-worker integration tests.
//!
//! Provides a scriptable ecosystem and a TestContext wiring the handler to
//! the mock sandbox and in-memory queue and buckets.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pkgsift_worker::ecosystem::{
    AnalysisCommand, Ecosystem, EcosystemError, EcosystemRegistry, Package, Phase,
    analysis_command,
};
use pkgsift_worker::handler::HandlerContext;
use pkgsift_worker::queue::{MemoryQueue, MemorySubscription, Message, Subscription};
use pkgsift_worker::sandbox::MockSandboxFactory;
use pkgsift_worker::store::{BlobStore, MemoryBlobStore, MemoryBucketOpener};

pub const RESULTS_BUCKET: &str = "mem://results";
pub const PACKAGES_BUCKET: &str = "mem://packages";

/// Ecosystem with fixed phases and a scripted latest-version answer.
pub struct FakeEcosystem {
    name: String,
    phases: Vec<Phase>,
    latest: Option<String>,
    failing_lookups: Mutex<usize>,
    lookups: Mutex<Vec<String>>,
}

impl FakeEcosystem {
    pub fn new(name: &str, phases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            phases: phases.iter().map(|p| Phase::new(*p)).collect(),
            latest: None,
            failing_lookups: Mutex::new(0),
            lookups: Mutex::new(Vec::new()),
        }
    }

    /// Make latest-version lookups succeed with `version`.
    pub fn with_latest(mut self, version: &str) -> Self {
        self.latest = Some(version.to_string());
        self
    }

    /// Make the first `count` latest-version lookups fail.
    pub fn with_failing_lookups(self, count: usize) -> Self {
        *self.failing_lookups.lock().unwrap() = count;
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ecosystem for FakeEcosystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn image(&self) -> &str {
        "example.test/analysis"
    }

    fn phases(&self) -> Vec<Phase> {
        self.phases.clone()
    }

    async fn latest_version(&self, name: &str) -> Result<String, EcosystemError> {
        self.lookups.lock().unwrap().push(name.to_string());
        let mut failing = self.failing_lookups.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(EcosystemError::InvalidResponse("registry unavailable".to_string()));
        }
        self.latest
            .clone()
            .ok_or_else(|| EcosystemError::NotFound(name.to_string()))
    }

    fn command(&self, package: &Package, phase: &Phase) -> AnalysisCommand {
        analysis_command("/usr/local/bin/analyze.sh", package, phase)
    }
}

/// Handler wiring over mocks, with handles kept for assertions.
pub struct TestContext {
    pub ecosystem: Arc<FakeEcosystem>,
    pub sandboxes: MockSandboxFactory,
    pub buckets: Arc<MemoryBucketOpener>,
    pub packages: Arc<MemoryBlobStore>,
    pub queue: MemoryQueue,
    subscription: tokio::sync::Mutex<MemorySubscription>,
    pub results_bucket: Option<String>,
    pub with_packages: bool,
}

impl TestContext {
    /// npm-like ecosystem with phases `[install, run]`, default results bucket set.
    pub fn new() -> Self {
        Self::with_ecosystem(FakeEcosystem::new("npm", &["install", "run"]))
    }

    pub fn with_ecosystem(ecosystem: FakeEcosystem) -> Self {
        let queue = MemoryQueue::new();
        let subscription = queue.subscribe().expect("fresh queue");
        Self {
            ecosystem: Arc::new(ecosystem),
            sandboxes: MockSandboxFactory::new(),
            buckets: Arc::new(MemoryBucketOpener::new()),
            packages: Arc::new(MemoryBlobStore::new(PACKAGES_BUCKET)),
            queue,
            subscription: tokio::sync::Mutex::new(subscription),
            results_bucket: Some(RESULTS_BUCKET.to_string()),
            with_packages: true,
        }
    }

    pub fn handler_context(&self) -> HandlerContext {
        let packages = self
            .with_packages
            .then(|| self.packages.clone() as Arc<dyn BlobStore>);
        HandlerContext {
            ecosystems: Arc::new(EcosystemRegistry::new().register(self.ecosystem.clone())),
            sandboxes: Arc::new(self.sandboxes.clone()),
            buckets: self.buckets.clone(),
            packages,
            results_bucket: self.results_bucket.clone(),
            image_tag: "test".to_string(),
            phase_timeout: Duration::from_secs(30),
        }
    }

    /// Publish one message and receive it back.
    pub async fn message(&self, metadata: &[(&str, &str)]) -> Message {
        self.queue.publish(metadata.iter().copied());
        self.next_delivery().await
    }

    /// Receive whatever the queue delivers next, such as a requeued message.
    pub async fn next_delivery(&self) -> Message {
        self.subscription.lock().await.receive().await.unwrap()
    }

    /// Requeue flag of every nack, in order.
    pub fn requeue_flags(&self) -> Vec<bool> {
        self.queue.nacked().into_iter().map(|(_, requeue)| requeue).collect()
    }

    /// Objects stored in `locator`, if the bucket was ever opened.
    pub fn stored_keys(&self, locator: &str) -> Vec<String> {
        self.buckets
            .bucket(locator)
            .map(|b| b.keys())
            .unwrap_or_default()
    }
}
