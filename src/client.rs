// Outbound HTTP calls with a hard per-attempt deadline
//
// Every call is bounded by `timeout` on the wall clock, body read included,
// regardless of how long the peer decides to sleep. A peer that never
// accepts the connection shows up as `Unavailable`, a slow one as `Timeout`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::UpstreamError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ResilientClient {
    http: Client,
    timeout: Duration,
}

impl Default for ResilientClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ResilientClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }

    pub fn with_client(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let request = self.http.get(url).query(query);
        let (status, body) = self.send(request).await?;
        decode_success(status, &body)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let request = self.http.post(url).json(body);
        let (status, body) = self.send(request).await?;
        decode_success(status, &body)
    }

    // For calls where only the status matters
    pub async fn post_for_status<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<StatusCode, UpstreamError> {
        let request = self.http.post(url).json(body);
        let (status, _) = self.send(request).await?;
        Ok(status)
    }

    // Raw GET returning status and body, the caller interprets both
    pub async fn get_raw(&self, url: &str) -> Result<(StatusCode, Vec<u8>), UpstreamError> {
        self.send(self.http.get(url)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Vec<u8>), UpstreamError> {
        let timeout = self.timeout;
        let exchange = async {
            let response: Response = request
                .send()
                .await
                .map_err(|e| UpstreamError::from_reqwest(e, timeout))?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::from_reqwest(e, timeout))?;
            Ok::<_, UpstreamError>((status, body.to_vec()))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        }
    }
}

fn decode_success<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, UpstreamError> {
    if !status.is_success() {
        return Err(UpstreamError::BadResponse {
            status: status.as_u16(),
            message: String::from_utf8_lossy(body).trim().to_string(),
        });
    }

    serde_json::from_slice(body).map_err(|e| UpstreamError::Decode(e.to_string()))
}
