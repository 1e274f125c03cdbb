use super::{HttpWorkerClient, WorkerSupervisor};
use crate::core::{Result, RouterError, ServerId, UpstreamResponse, WorkerHandle};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DockerSettings {
    /// Path or name of the docker CLI.
    pub docker_bin: String,
    /// Image running the worker binary.
    pub image: String,
    /// Network shared by the router and the workers; workers are reached by name.
    pub network: String,
    /// Port the worker listens on inside its container.
    pub worker_port: u16,
    pub request_timeout: Duration,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: "ds-server".to_string(),
            network: "net1".to_string(),
            worker_port: 5000,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// One detached, auto-removed container per worker.
pub struct DockerSupervisor {
    settings: DockerSettings,
    client: HttpWorkerClient,
}

impl DockerSupervisor {
    pub fn new(settings: DockerSettings) -> Result<Self> {
        let client = HttpWorkerClient::new(settings.request_timeout)?;
        Ok(Self { settings, client })
    }

    /// Arguments of the `docker run` launching `name`.
    pub fn run_args(&self, name: &str, server_id: ServerId) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--network".to_string(),
            self.settings.network.clone(),
            "--name".to_string(),
            name.to_string(),
            "-e".to_string(),
            format!("SERVER_ID={}", server_id),
            "-e".to_string(),
            format!("WORKER_PORT={}", self.settings.worker_port),
            self.settings.image.clone(),
        ]
    }

    async fn docker(&self, args: &[String]) -> std::io::Result<Output> {
        debug!(args = ?args, "invoking docker");
        Command::new(&self.settings.docker_bin)
            .args(args)
            .output()
            .await
    }
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("docker exited with {}", output.status)
    } else {
        stderr
    }
}

#[async_trait]
impl WorkerSupervisor for DockerSupervisor {
    async fn start(&self, name: &str, server_id: ServerId) -> Result<WorkerHandle> {
        let output = self
            .docker(&self.run_args(name, server_id))
            .await
            .map_err(|err| RouterError::WorkerStart {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(RouterError::WorkerStart {
                name: name.to_string(),
                reason: stderr_of(&output),
            });
        }

        let endpoint = format!("http://{}:{}", name, self.settings.worker_port);
        Ok(WorkerHandle::new(name, server_id, endpoint))
    }

    async fn heartbeat(&self, handle: &WorkerHandle) -> Result<()> {
        self.client.heartbeat(handle).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let output = self
            .docker(&["stop".to_string(), name.to_string()])
            .await
            .map_err(|err| RouterError::WorkerStop {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RouterError::WorkerStop {
                name: name.to_string(),
                reason: stderr_of(&output),
            })
        }
    }

    async fn execute(&self, handle: &WorkerHandle, path: &str) -> Result<UpstreamResponse> {
        self.client.get(handle, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_tag_container_with_server_id() {
        let supervisor = DockerSupervisor::new(DockerSettings::default()).unwrap();
        let args = supervisor.run_args("Server4", ServerId(4));
        assert_eq!(
            args,
            vec![
                "run", "-d", "--rm", "--network", "net1", "--name", "Server4", "-e",
                "SERVER_ID=4", "-e", "WORKER_PORT=5000", "ds-server"
            ]
        );
    }

    #[tokio::test]
    async fn missing_docker_binary_is_a_start_failure() {
        let supervisor = DockerSupervisor::new(DockerSettings {
            docker_bin: "/nonexistent/docker-cli".to_string(),
            ..DockerSettings::default()
        })
        .unwrap();
        let err = supervisor.start("Server1", ServerId(1)).await.unwrap_err();
        assert!(matches!(err, RouterError::WorkerStart { .. }));
    }
}
