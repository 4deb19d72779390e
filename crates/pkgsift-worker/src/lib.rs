// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! pkgsift worker - Queue-Driven Package Analysis
//!
//! This crate pulls package-analysis jobs off a message queue, runs each
//! package through its ecosystem's analysis phases inside a sandbox, and
//! stores the per-phase results in a bucket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Retry Supervisor (Worker::run)                                   │
//! │   restarts the loop with backoff, gives up after max retries     │
//! │ ┌──────────────────────────────────────────────────────────────┐ │
//! │ │ Subscription Loop (Worker::message_loop)                     │ │
//! │ │   one message at a time, handler errors are logged           │ │
//! │ │ ┌──────────────────────────────────────────────────────────┐ │ │
//! │ │ │ Message Handler (handler::handle_message)                │ │ │
//! │ │ │   validate → stage → resolve → run phases → classify     │ │ │
//! │ │ │   → upload → ack                                         │ │ │
//! │ │ └──────────────────────────────────────────────────────────┘ │ │
//! │ └──────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//!        │                  │                    │               │
//!        ▼                  ▼                    ▼               ▼
//!   ┌─────────┐     ┌──────────────┐     ┌────────────┐   ┌────────────┐
//!   │  queue  │     │  ecosystem   │     │  sandbox   │   │   store    │
//!   │ RabbitMQ│     │ npm, pypi... │     │  podman    │   │ file/s3/gs │
//!   └─────────┘     └──────────────┘     └────────────┘   └────────────┘
//! ```
//!
//! # Acknowledgement
//!
//! A message is acknowledged once, after the job is fully processed or after
//! it is dropped as malformed or unsupported. Any hard error (staging,
//! version lookup, sandbox infrastructure, upload) nacks it instead: a first
//! delivery is requeued, a redelivered message is discarded.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `OSSMALWARE_WORKER_SUBSCRIPTION` | Yes | - | Subscription locator (`rabbit://<queue>`) |
//! | `OSSF_MALWARE_ANALYSIS_PACKAGES` | No | - | Packages bucket (`file://`, `s3://`, `gs://`) |
//! | `OSSF_MALWARE_ANALYSIS_RESULTS` | No | - | Default results bucket (`file://`, `s3://`, `gs://`) |
//! | `OSSF_SANDBOX_IMAGE_TAG` | No | `latest` | Sandbox image tag |
//! | `RABBIT_SERVER_URL` | For `rabbit://` | - | AMQP server URI |
//! | `SANDBOX_PHASE_TIMEOUT_SECS` | No | `900` | Per-phase time limit |
//! | `LOGGER_ENV` | No | - | `prod` selects JSON logs |

#![deny(missing_docs)]

/// Worker configuration loaded from environment variables.
pub mod config;

/// Error types for the worker.
pub mod error;

/// Jobs derived from queue message metadata.
pub mod job;

/// Package ecosystems: version lookup, phases, analysis commands.
pub mod ecosystem;

/// Copying package artifacts from the packages bucket for mounting.
pub mod staging;

/// Sandboxes that run analysis phases (podman, mock).
pub mod sandbox;

/// Phase results, the phase executor, and outcome classification.
pub mod analysis;

/// Buckets holding package artifacts and results.
pub mod store;

/// Results persistence and path layout.
pub mod result_store;

/// Job subscriptions (RabbitMQ, in-memory).
pub mod queue;

/// Per-message job handling.
pub mod handler;

/// Subscription loop and retry supervisor.
pub mod worker;

pub use config::Config;
pub use error::Error;
pub use worker::{RetryPolicy, Worker};
