//! `kubectl`-backed workload platform.
//!
//! Resources are created by piping JSON manifests to `kubectl apply -f -`.
//! Every call shells out; there is no client-side caching of cluster state.

use super::{
    manifest, StorageClassSpec, SoakIo, VolumeSpec, WorkloadInstance, WorkloadPlatform,
    WorkloadSpec,
};
use crate::errors::PlatformError;
use crate::fio;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Upper bound for `kubectl delete --wait`.
const DELETE_TIMEOUT: &str = "--timeout=120s";

/// Upper bound for a single API server request from `get` and `apply`.
const REQUEST_TIMEOUT: &str = "--request-timeout=30s";

/// Drives a Kubernetes cluster through the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KubectlPlatform {
    kubectl: String,
    fio_size_mb: u64,
}

impl KubectlPlatform {
    /// Create a platform using the given `kubectl` binary.
    ///
    /// `fio_size_mb` bounds the fio file on filesystem volumes.
    pub fn new(kubectl: impl Into<String>, fio_size_mb: u64) -> Self {
        Self {
            kubectl: kubectl.into(),
            fio_size_mb,
        }
    }

    /// Run `kubectl` with `args`, optionally feeding `stdin`, and return stdout.
    async fn kubectl(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<String, PlatformError> {
        let command = format!("{} {}", self.kubectl, args.join(" "));
        debug!(target: "soak.platform", command = %command, "Running kubectl");

        let spawn_err = |source| PlatformError::Spawn {
            command: command.clone(),
            source,
        };

        let mut child = Command::new(&self.kubectl)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let mut write_err = None;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // An early exit breaks the pipe; the exit status and stderr say why.
                if let Err(e) = pipe.write_all(&input).await {
                    debug!(target: "soak.platform", command = %command, error = %e, "Writing kubectl stdin failed");
                    write_err = Some(e);
                }
            }
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;

        if !output.status.success() {
            return Err(PlatformError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if let Some(source) = write_err {
            return Err(PlatformError::Stdin { command, source });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn apply(&self, manifest: &serde_json::Value) -> Result<(), PlatformError> {
        let body = serde_json::to_vec(manifest)?;
        self.kubectl(&["apply", REQUEST_TIMEOUT, "-f", "-"], Some(body)).await?;
        Ok(())
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<(), PlatformError> {
        let mut args = vec!["delete", kind, name, "--wait=true", DELETE_TIMEOUT];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        self.kubectl(&args, None).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkloadPlatform for KubectlPlatform {
    async fn create_storage_class(&self, spec: &StorageClassSpec) -> Result<(), PlatformError> {
        self.apply(&manifest::storage_class(spec)).await
    }

    async fn delete_storage_class(&self, name: &str) -> Result<(), PlatformError> {
        self.delete("storageclass", name, None).await
    }

    async fn create_namespace(&self, name: &str) -> Result<(), PlatformError> {
        self.apply(&manifest::namespace(name)).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), PlatformError> {
        self.delete("namespace", name, None).await
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<(), PlatformError> {
        self.apply(&manifest::volume_claim(spec)).await
    }

    async fn delete_volume(&self, name: &str, namespace: &str) -> Result<(), PlatformError> {
        self.delete("pvc", name, Some(namespace)).await
    }

    async fn create_workload(
        &self,
        spec: &WorkloadSpec,
    ) -> Result<WorkloadInstance, PlatformError> {
        self.apply(&manifest::workload_pod(spec)).await?;
        Ok(WorkloadInstance {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
        })
    }

    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<(), PlatformError> {
        self.delete("pod", name, Some(namespace)).await
    }

    async fn is_running(&self, name: &str, namespace: &str) -> Result<bool, PlatformError> {
        let phase = self
            .kubectl(
                &[
                    "get",
                    "pod",
                    name,
                    "-n",
                    namespace,
                    "-o",
                    "jsonpath={.status.phase}",
                    REQUEST_TIMEOUT,
                ],
                None,
            )
            .await?;
        Ok(phase.trim() == "Running")
    }

    #[instrument(skip_all, name = "soak.platform.run_soak_io", fields(instance = %instance.name))]
    async fn run_soak_io(
        &self,
        instance: &WorkloadInstance,
        io: SoakIo,
    ) -> Result<(), PlatformError> {
        let duty_cycle = crate::duty_cycle::DutyCycle {
            think_time: io.think_time,
            think_time_blocks: io.think_time_blocks,
        };
        let fio_args = fio::run_args(
            io.duration.as_secs(),
            io.volume_mode,
            duty_cycle,
            self.fio_size_mb,
        );

        let mut args: Vec<&str> = vec![
            "exec",
            instance.name.as_str(),
            "-n",
            instance.namespace.as_str(),
            "-c",
            manifest::CONTAINER_NAME,
            "--",
            "fio",
        ];
        args.extend(fio_args.iter().map(String::as_str));

        self.kubectl(&args, None).await?;
        Ok(())
    }
}
