// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock sandbox for testing.
//!
//! A scripted sandbox that returns configured results per phase without
//! running containers, and records what it was asked to do.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::*;
use crate::analysis::{PhaseOutput, PhaseResult, Status};
use crate::ecosystem::{AnalysisCommand, Phase};

/// What the mock does when a phase runs.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Produce a result with this status
    Status(Status),
    /// Fail at the infrastructure level
    Fail(String),
}

/// Everything observed by a mock factory and the sandboxes it created.
#[derive(Debug, Default)]
pub struct MockRecord {
    /// Specs passed to `create`, in order
    pub created: Vec<SandboxSpec>,
    /// Phases run, in order, with their commands
    pub runs: Vec<(String, AnalysisCommand)>,
    /// Number of `clean` calls
    pub cleaned: usize,
}

/// Mock sandbox factory for testing.
#[derive(Clone, Default)]
pub struct MockSandboxFactory {
    steps: Arc<HashMap<String, MockStep>>,
    record: Arc<Mutex<MockRecord>>,
}

impl MockSandboxFactory {
    /// Create a mock where every phase completes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of a phase (phases not scripted complete).
    pub fn with_step(mut self, phase: &str, step: MockStep) -> Self {
        Arc::make_mut(&mut self.steps).insert(phase.to_string(), step);
        self
    }

    /// Access the recorded interactions.
    pub fn record(&self) -> MutexGuard<'_, MockRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Names of the phases run so far.
    pub fn phases_run(&self) -> Vec<String> {
        self.record().runs.iter().map(|(p, _)| p.clone()).collect()
    }
}

impl SandboxFactory for MockSandboxFactory {
    fn sandbox_type(&self) -> &'static str {
        "mock"
    }

    fn create(&self, spec: SandboxSpec) -> Box<dyn Sandbox> {
        self.record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .created
            .push(spec);
        Box::new(MockSandbox {
            steps: self.steps.clone(),
            record: self.record.clone(),
        })
    }
}

struct MockSandbox {
    steps: Arc<HashMap<String, MockStep>>,
    record: Arc<Mutex<MockRecord>>,
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn run(&mut self, phase: &Phase, command: &AnalysisCommand) -> Result<PhaseResult> {
        self.record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .runs
            .push((phase.to_string(), command.clone()));

        match self.steps.get(phase.as_str()) {
            Some(MockStep::Fail(msg)) => Err(SandboxError::Other(msg.clone())),
            Some(MockStep::Status(status)) => Ok(PhaseResult {
                status: *status,
                output: PhaseOutput {
                    exit_code: (*status == Status::Completed).then_some(0),
                    ..PhaseOutput::default()
                },
            }),
            None => Ok(PhaseResult {
                status: Status::Completed,
                output: PhaseOutput {
                    exit_code: Some(0),
                    stdout: format!("{} ok", phase),
                    ..PhaseOutput::default()
                },
            }),
        }
    }

    async fn clean(&mut self) {
        self.record.lock().unwrap_or_else(|e| e.into_inner()).cleaned += 1;
    }
}
