// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the phase executor and outcome classification.

mod common;

use std::time::Duration;

use common::FakeEcosystem;
use pkgsift_worker::analysis::{SignalLevel, Status, classify, run_phases};
use pkgsift_worker::ecosystem::{Ecosystem, Package};
use pkgsift_worker::sandbox::{
    MockSandboxFactory, MockStep, SandboxError, SandboxFactory, SandboxSpec,
};

const PHASES: [&str; 4] = ["install", "import", "run", "teardown"];

fn spec() -> SandboxSpec {
    SandboxSpec {
        image: "example.test/analysis".to_string(),
        tag: "test".to_string(),
        volumes: Vec::new(),
        timeout: Duration::from_secs(30),
    }
}

fn package() -> Package {
    Package {
        ecosystem: "npm".to_string(),
        name: "left-pad".to_string(),
        version: "1.0.0".to_string(),
        local_path: None,
    }
}

#[tokio::test]
async fn test_all_phases_complete() {
    let ecosystem = FakeEcosystem::new("npm", &PHASES);
    let factory = MockSandboxFactory::new();
    let mut sandbox = factory.create(spec());

    let outcome = run_phases(sandbox.as_mut(), &ecosystem, &package(), &ecosystem.phases())
        .await
        .unwrap();

    assert_eq!(outcome.final_status, Status::Completed);
    assert_eq!(outcome.last_phase.as_ref().map(|p| p.as_str()), Some("teardown"));
    assert_eq!(outcome.results.phases(), PHASES.to_vec());
    assert_eq!(factory.phases_run(), PHASES.to_vec());
}

#[tokio::test]
async fn test_first_failure_stops_every_later_phase() {
    let failures = [Status::ErrorAnalysis, Status::ErrorTimeout, Status::ErrorOther];
    let ecosystem = FakeEcosystem::new("npm", &PHASES);

    for (k, failing) in PHASES.iter().enumerate() {
        for status in failures {
            let factory = MockSandboxFactory::new().with_step(failing, MockStep::Status(status));
            let mut sandbox = factory.create(spec());

            let outcome = run_phases(sandbox.as_mut(), &ecosystem, &package(), &ecosystem.phases())
                .await
                .unwrap();

            assert_eq!(outcome.final_status, status, "phase {failing}");
            assert_eq!(outcome.last_phase.as_ref().map(|p| p.as_str()), Some(*failing));
            assert_eq!(outcome.results.phases(), PHASES[..=k].to_vec());
            assert_eq!(factory.phases_run(), PHASES[..=k].to_vec());
            assert_eq!(outcome.results.get(failing).unwrap().status, status);
        }
    }
}

#[tokio::test]
async fn test_infrastructure_failure_records_nothing_for_the_phase() {
    let ecosystem = FakeEcosystem::new("npm", &PHASES);
    let factory =
        MockSandboxFactory::new().with_step("run", MockStep::Fail("no podman".to_string()));
    let mut sandbox = factory.create(spec());

    let err = run_phases(sandbox.as_mut(), &ecosystem, &package(), &ecosystem.phases())
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::Other(ref m) if m == "no podman"));
    assert_eq!(factory.phases_run(), vec!["install", "import", "run"]);
}

#[tokio::test]
async fn test_commands_come_from_the_ecosystem() {
    let ecosystem = FakeEcosystem::new("npm", &["install"]);
    let factory = MockSandboxFactory::new();
    let mut sandbox = factory.create(spec());

    run_phases(sandbox.as_mut(), &ecosystem, &package(), &ecosystem.phases())
        .await
        .unwrap();

    let record = factory.record();
    let (phase, command) = &record.runs[0];
    assert_eq!(phase, "install");
    assert_eq!(
        command,
        &ecosystem.command(&package(), &ecosystem.phases()[0])
    );
}

#[tokio::test]
async fn test_empty_phase_list_defaults_to_completed() {
    let ecosystem = FakeEcosystem::new("npm", &[]);
    let factory = MockSandboxFactory::new();
    let mut sandbox = factory.create(spec());

    let outcome = run_phases(sandbox.as_mut(), &ecosystem, &package(), &[])
        .await
        .unwrap();

    assert_eq!(outcome.final_status, Status::Completed);
    assert!(outcome.last_phase.is_none());
    assert!(outcome.results.is_empty());

    let signal = classify(&outcome);
    assert_eq!(signal.level, SignalLevel::Info);
    assert_eq!(signal.message, "Analysis completed successfully");
}
