// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Podman sandbox implementation.
//!
//! Each phase runs in a fresh container:
//! `podman run --rm --name <id> [-v host:sandbox:ro]... <image>:<tag> <command>`.
//! Exit status is mapped onto an analysis [`Status`]; only failures of podman
//! itself surface as [`SandboxError`].

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{PhaseOutput, PhaseResult, Status};
use crate::ecosystem::{AnalysisCommand, Phase};
use crate::sandbox::{Result, Sandbox, SandboxError, SandboxFactory, SandboxSpec};

/// Exit code podman uses for errors in podman itself.
const PODMAN_ERROR_EXIT: i32 = 125;

/// Captured stdout/stderr is cut off after this many bytes.
const MAX_CAPTURED_OUTPUT: u64 = 64 * 1024;

/// Podman sandbox configuration
#[derive(Debug, Clone)]
pub struct PodmanConfig {
    /// Podman executable
    pub program: String,
    /// OCI runtime passed as `--runtime` (e.g. `runsc` for gVisor)
    pub runtime: Option<String>,
}

impl Default for PodmanConfig {
    fn default() -> Self {
        Self {
            program: "podman".to_string(),
            runtime: None,
        }
    }
}

/// Factory for podman-backed sandboxes.
#[derive(Debug, Clone, Default)]
pub struct PodmanSandboxFactory {
    config: PodmanConfig,
}

impl PodmanSandboxFactory {
    /// Create a new factory
    pub fn new(config: PodmanConfig) -> Self {
        Self { config }
    }
}

impl SandboxFactory for PodmanSandboxFactory {
    fn sandbox_type(&self) -> &'static str {
        "podman"
    }

    fn create(&self, spec: SandboxSpec) -> Box<dyn Sandbox> {
        Box::new(PodmanSandbox {
            config: self.config.clone(),
            spec,
            containers: Vec::new(),
        })
    }
}

/// A sandbox whose phases run as podman containers.
pub struct PodmanSandbox {
    config: PodmanConfig,
    spec: SandboxSpec,
    /// Every container name launched, so `clean` can remove leftovers
    containers: Vec<String>,
}

impl PodmanSandbox {
    fn run_args(&self, container_name: &str, command: &AnalysisCommand) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
        ];
        if let Some(runtime) = &self.config.runtime {
            args.push("--runtime".to_string());
            args.push(runtime.clone());
        }
        for volume in &self.spec.volumes {
            args.push("-v".to_string());
            args.push(format!(
                "{}:{}:ro",
                volume.host_path.display(),
                volume.sandbox_path
            ));
        }
        args.push(self.spec.image_ref());
        args.extend(command.args.iter().cloned());
        args
    }

    /// Kill a running container
    async fn kill_container(&self, container_name: &str) {
        let _ = Command::new(&self.config.program)
            .args(["kill", container_name])
            .output()
            .await;
    }
}

/// Keep the first [`MAX_CAPTURED_OUTPUT`] bytes of a stream and discard the
/// rest, so the child never blocks on a full pipe.
async fn read_capped<R>(stream: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    (&mut stream)
        .take(MAX_CAPTURED_OUTPUT)
        .read_to_end(&mut kept)
        .await?;
    tokio::io::copy(&mut stream, &mut tokio::io::sink()).await?;
    Ok(kept)
}

fn captured(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[async_trait]
impl Sandbox for PodmanSandbox {
    async fn run(&mut self, phase: &Phase, command: &AnalysisCommand) -> Result<PhaseResult> {
        if command.args.is_empty() {
            return Err(SandboxError::EmptyCommand(phase.to_string()));
        }

        let container_name = format!("pkgsift-{}-{}", phase, Uuid::new_v4().simple());
        let args = self.run_args(&container_name, command);
        self.containers.push(container_name.clone());

        debug!(
            container = %container_name,
            image = %self.spec.image_ref(),
            phase = %phase,
            "Launching container"
        );

        let start = Instant::now();
        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SandboxError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            tokio::try_join!(read_capped(stdout), read_capped(stderr), child.wait())
        };

        let collected = tokio::time::timeout(self.spec.timeout, collect).await;
        let (stdout, stderr, exit_status) = match collected {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    container = %container_name,
                    phase = %phase,
                    "Phase timed out, killing container"
                );
                self.kill_container(&container_name).await;
                return Ok(PhaseResult {
                    status: Status::ErrorTimeout,
                    output: PhaseOutput {
                        exit_code: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                        ..PhaseOutput::default()
                    },
                });
            }
        };

        let exit_code = exit_status.code();
        let stderr = captured(&stderr);

        if exit_code == Some(PODMAN_ERROR_EXIT) {
            return Err(SandboxError::StartFailed(stderr.trim().to_string()));
        }

        let status = match exit_code {
            Some(0) => Status::Completed,
            Some(_) => Status::ErrorAnalysis,
            // Killed by a signal
            None => Status::ErrorOther,
        };

        info!(
            container = %container_name,
            phase = %phase,
            exit_code = ?exit_code,
            status = %status,
            "Container exited"
        );

        Ok(PhaseResult {
            status,
            output: PhaseOutput {
                exit_code,
                stdout: captured(&stdout),
                stderr,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn clean(&mut self) {
        for container in self.containers.drain(..) {
            let result = Command::new(&self.config.program)
                .args(["rm", "--force", "--ignore", &container])
                .output()
                .await;
            match result {
                Ok(out) if out.status.success() => {
                    debug!(container = %container, "Container removed");
                }
                Ok(out) => {
                    warn!(
                        container = %container,
                        stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                        "Failed to remove container"
                    );
                }
                Err(e) => {
                    warn!(container = %container, error = %e, "Failed to remove container");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::VolumeMapping;
    use std::path::PathBuf;
    use std::time::Duration;

    fn spec() -> SandboxSpec {
        SandboxSpec {
            image: "gcr.io/ossf-malware-analysis/node".to_string(),
            tag: "v1".to_string(),
            volumes: vec![VolumeMapping {
                host_path: PathBuf::from("/tmp/.tmpAbc"),
                sandbox_path: "/local/left-pad.tgz".to_string(),
            }],
            timeout: Duration::from_secs(5),
        }
    }

    fn sandbox(config: PodmanConfig) -> PodmanSandbox {
        PodmanSandbox {
            config,
            spec: spec(),
            containers: Vec::new(),
        }
    }

    #[test]
    fn test_run_args() {
        let sb = sandbox(PodmanConfig {
            runtime: Some("runsc".to_string()),
            ..PodmanConfig::default()
        });
        let command = AnalysisCommand {
            args: vec!["analyze.js".to_string(), "left-pad".to_string()],
        };

        let args = sb.run_args("c1", &command);

        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "c1",
                "--runtime",
                "runsc",
                "-v",
                "/tmp/.tmpAbc:/local/left-pad.tgz:ro",
                "gcr.io/ossf-malware-analysis/node:v1",
                "analyze.js",
                "left-pad",
            ]
        );
    }

    #[tokio::test]
    async fn test_read_capped_keeps_prefix() {
        let big = vec![b'a'; MAX_CAPTURED_OUTPUT as usize * 4];
        let kept = read_capped(Some(big.as_slice())).await.unwrap();
        assert_eq!(kept.len(), MAX_CAPTURED_OUTPUT as usize);

        let none: Option<&[u8]> = None;
        assert!(read_capped(none).await.unwrap().is_empty());
    }

    /// Executable standing in for podman: runs `body` for every invocation.
    #[cfg(unix)]
    fn fake_podman(dir: &tempfile::TempDir, body: &str) -> PodmanConfig {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("podman");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        PodmanConfig {
            program: path.display().to_string(),
            runtime: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_is_capped_and_drained() {
        let dir = tempfile::TempDir::new().unwrap();
        // 8 MiB on stdout and stderr, far beyond any pipe buffer.
        let mut sb = sandbox(fake_podman(
            &dir,
            "[ \"$1\" = run ] || exit 0\n\
             head -c 8388608 /dev/zero >&2 &\n\
             head -c 8388608 /dev/zero\n\
             wait",
        ));
        let command = AnalysisCommand {
            args: vec!["analyze".to_string()],
        };

        let result = sb.run(&Phase::new("install"), &command).await.unwrap();

        assert_eq!(result.status, Status::Completed);
        assert_eq!(result.output.exit_code, Some(0));
        assert_eq!(result.output.stdout.len(), MAX_CAPTURED_OUTPUT as usize);
        assert_eq!(result.output.stderr.len(), MAX_CAPTURED_OUTPUT as usize);
        sb.clean().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_map_to_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let command = AnalysisCommand {
            args: vec!["analyze".to_string()],
        };

        let mut sb = sandbox(fake_podman(&dir, "echo suspicious >&2\nexit 3"));
        let result = sb.run(&Phase::new("install"), &command).await.unwrap();
        assert_eq!(result.status, Status::ErrorAnalysis);
        assert_eq!(result.output.stderr.trim(), "suspicious");

        let mut sb = sandbox(fake_podman(&dir, "echo no such image >&2\nexit 125"));
        let err = sb.run(&Phase::new("install"), &command).await.unwrap_err();
        assert!(matches!(err, SandboxError::StartFailed(ref m) if m == "no such image"));
    }

    #[tokio::test]
    async fn test_missing_podman_is_infrastructure_error() {
        let mut sb = sandbox(PodmanConfig {
            program: "/nonexistent/podman-binary".to_string(),
            runtime: None,
        });
        let command = AnalysisCommand {
            args: vec!["true".to_string()],
        };

        let result = sb.run(&Phase::new("install"), &command).await;
        assert!(matches!(result, Err(SandboxError::Spawn(_))));

        // clean tolerates the missing binary
        sb.clean().await;
        assert!(sb.containers.is_empty());
    }

    #[tokio::test]
    async fn test_empty_command() {
        let mut sb = sandbox(PodmanConfig::default());
        let result = sb
            .run(&Phase::new("install"), &AnalysisCommand { args: vec![] })
            .await;
        assert!(matches!(result, Err(SandboxError::EmptyCommand(_))));
    }
}
