use crate::core::{Result, RouterError, UpstreamResponse, WorkerHandle};
use std::time::Duration;

/// Talks to workers that expose the worker endpoints over HTTP.
///
/// `handle.endpoint` is the worker's base URL, e.g. `http://Server1:5000`.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RouterError::Config(format!("failed to build HTTP client: {}", err)))?;
        Ok(Self { client })
    }

    pub async fn heartbeat(&self, handle: &WorkerHandle) -> Result<()> {
        let response = self.get(handle, "heartbeat").await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(RouterError::upstream_status(&handle.name, response.status))
        }
    }

    pub async fn get(&self, handle: &WorkerHandle, path: &str) -> Result<UpstreamResponse> {
        let url = format!(
            "{}/{}",
            handle.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let response = self.client.get(&url).send().await.map_err(|err| {
            if err.is_timeout() {
                RouterError::upstream(&handle.name, "timeout")
            } else {
                RouterError::upstream(&handle.name, err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| RouterError::upstream(&handle.name, err.to_string()))?;
        Ok(UpstreamResponse::new(status, body))
    }
}
