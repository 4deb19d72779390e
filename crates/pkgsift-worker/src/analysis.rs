// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Phase execution and outcome classification.
//!
//! Phases run strictly in the ecosystem's declared order. The first phase
//! whose status is not [`Status::Completed`] ends the run; later phases are
//! never attempted. When no phase runs at all the outcome is `Completed`
//! with no last phase.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::{error, info, warn};

use crate::ecosystem::{Ecosystem, Package, Phase};
use crate::sandbox::{Sandbox, SandboxError};

/// Terminal status of one analysis phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Phase ran to completion
    Completed,
    /// The analyzed package failed the phase
    ErrorAnalysis,
    /// Phase exceeded its time limit
    ErrorTimeout,
    /// Phase ended abnormally for another reason
    ErrorOther,
}

impl Status {
    /// Stable snake_case name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Completed => "completed",
            Status::ErrorAnalysis => "error_analysis",
            Status::ErrorTimeout => "error_timeout",
            Status::ErrorOther => "error_other",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output captured from a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutput {
    /// Process exit code, absent when killed or timed out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured stdout (truncated)
    #[serde(default)]
    pub stdout: String,
    /// Captured stderr (truncated)
    #[serde(default)]
    pub stderr: String,
    /// Wall-clock duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Terminal status
    pub status: Status,
    /// Captured output
    pub output: PhaseOutput,
}

/// Phase results in execution order.
///
/// Serialized as a JSON object whose key order is the execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    entries: Vec<(Phase, PhaseResult)>,
}

impl ResultSet {
    /// Create an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the result of the next phase.
    pub fn push(&mut self, phase: Phase, result: PhaseResult) {
        self.entries.push((phase, result));
    }

    /// Number of phases recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no phase was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Result for a phase by name.
    pub fn get(&self, phase: &str) -> Option<&PhaseResult> {
        self.entries
            .iter()
            .find(|(p, _)| p.as_str() == phase)
            .map(|(_, r)| r)
    }

    /// Phase names in execution order.
    pub fn phases(&self) -> Vec<&str> {
        self.entries.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// Iterate entries in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&Phase, &PhaseResult)> {
        self.entries.iter().map(|(p, r)| (p, r))
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (phase, result) in &self.entries {
            map.serialize_entry(phase.as_str(), result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResultSetVisitor;

        impl<'de> Visitor<'de> for ResultSetVisitor {
            type Value = ResultSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of phase name to phase result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ResultSet, A::Error> {
                let mut set = ResultSet::new();
                while let Some((phase, result)) = access.next_entry::<String, PhaseResult>()? {
                    set.push(Phase::new(phase), result);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ResultSetVisitor)
    }
}

/// Everything known about a job once its phases have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Status of the last phase run, or `Completed` if none ran
    pub final_status: Status,
    /// Last phase run
    pub last_phase: Option<Phase>,
    /// All phase results
    pub results: ResultSet,
}

impl JobOutcome {
    /// Outcome before any phase has run.
    pub fn empty() -> Self {
        Self {
            final_status: Status::Completed,
            last_phase: None,
            results: ResultSet::new(),
        }
    }
}

/// Run `phases` for `package` inside `sandbox`, stopping at the first
/// phase that does not complete.
///
/// An infrastructure failure aborts the run; no result is recorded for the
/// failing phase.
pub async fn run_phases(
    sandbox: &mut dyn Sandbox,
    ecosystem: &dyn Ecosystem,
    package: &Package,
    phases: &[Phase],
) -> Result<JobOutcome, SandboxError> {
    let mut outcome = JobOutcome::empty();

    for phase in phases {
        let command = ecosystem.command(package, phase);
        let result = match sandbox.run(phase, &command).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    ecosystem = %package.ecosystem,
                    name = %package.name,
                    version = %package.version,
                    phase = %phase,
                    error = %e,
                    "Analysis run failed"
                );
                return Err(e);
            }
        };

        let status = result.status;
        outcome.results.push(phase.clone(), result);
        outcome.last_phase = Some(phase.clone());
        outcome.final_status = status;

        if status != Status::Completed {
            break;
        }
    }

    Ok(outcome)
}

/// Severity of an outcome signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLevel {
    /// Normal completion
    Info,
    /// Analysis ended in an error status
    Warn,
}

/// Log signal derived from an outcome, consumed by log-based metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeSignal {
    /// Severity
    pub level: SignalLevel,
    /// Fixed message; metrics match on it
    pub message: &'static str,
}

/// Map an outcome to its log signal.
pub fn classify(outcome: &JobOutcome) -> OutcomeSignal {
    let (level, message) = match outcome.final_status {
        Status::Completed => (SignalLevel::Info, "Analysis completed successfully"),
        Status::ErrorAnalysis => (SignalLevel::Warn, "Analysis error - analysis"),
        Status::ErrorTimeout => (SignalLevel::Warn, "Analysis error - timeout"),
        Status::ErrorOther => (SignalLevel::Warn, "Analysis error - other"),
    };
    OutcomeSignal { level, message }
}

/// Emit the outcome signal for a package.
pub fn log_outcome(package: &Package, outcome: &JobOutcome) {
    let signal = classify(outcome);
    let last_phase = outcome.last_phase.as_ref().map(Phase::as_str).unwrap_or("");

    match signal.level {
        SignalLevel::Info => info!(
            ecosystem = %package.ecosystem,
            name = %package.name,
            version = %package.version,
            last_phase = %last_phase,
            status = %outcome.final_status,
            "{}",
            signal.message
        ),
        SignalLevel::Warn => warn!(
            ecosystem = %package.ecosystem,
            name = %package.name,
            version = %package.version,
            last_phase = %last_phase,
            status = %outcome.final_status,
            "{}",
            signal.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Status) -> PhaseResult {
        PhaseResult {
            status,
            output: PhaseOutput::default(),
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&Status::ErrorTimeout).unwrap(),
            "\"error_timeout\""
        );
        let status: Status = serde_json::from_str("\"error_analysis\"").unwrap();
        assert_eq!(status, Status::ErrorAnalysis);
        assert_eq!(Status::ErrorOther.to_string(), "error_other");
    }

    #[test]
    fn test_result_set_preserves_order() {
        let mut set = ResultSet::new();
        set.push(Phase::new("zeta"), result(Status::Completed));
        set.push(Phase::new("alpha"), result(Status::ErrorOther));

        let json = serde_json::to_string(&set).unwrap();
        assert!(json.find("\"zeta\"").unwrap() < json.find("\"alpha\"").unwrap());

        let back: ResultSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.phases(), vec!["zeta", "alpha"]);
        assert_eq!(back, set);
    }

    #[test]
    fn test_result_set_get() {
        let mut set = ResultSet::new();
        set.push(Phase::new("install"), result(Status::Completed));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("install").unwrap().status, Status::Completed);
        assert!(set.get("import").is_none());
    }

    #[test]
    fn test_classify_every_status() {
        let cases = [
            (Status::Completed, SignalLevel::Info, "Analysis completed successfully"),
            (Status::ErrorAnalysis, SignalLevel::Warn, "Analysis error - analysis"),
            (Status::ErrorTimeout, SignalLevel::Warn, "Analysis error - timeout"),
            (Status::ErrorOther, SignalLevel::Warn, "Analysis error - other"),
        ];
        for (status, level, message) in cases {
            let outcome = JobOutcome {
                final_status: status,
                ..JobOutcome::empty()
            };
            let signal = classify(&outcome);
            assert_eq!(signal.level, level);
            assert_eq!(signal.message, message);
        }
    }

    #[test]
    fn test_classify_no_phases() {
        let outcome = JobOutcome::empty();
        let signal = classify(&outcome);
        assert_eq!(signal.level, SignalLevel::Info);

        let package = Package {
            ecosystem: "npm".to_string(),
            name: "left-pad".to_string(),
            version: "1.0.0".to_string(),
            local_path: None,
        };
        log_outcome(&package, &outcome);
    }
}
