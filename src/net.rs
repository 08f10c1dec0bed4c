use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::request::{FetchRequest, FetchResponse};

/// Seam between the strategies and the outside world. Production code goes
/// through [`HttpNetwork`]; tests substitute an in-memory fake.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issues the request upstream. Any error counts as a network failure
    /// for strategy purposes; non-200 responses are returned, not errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// reqwest-backed fetcher used by the CLI when priming caches against a
/// live origin.
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.uri.to_string();
        let response = self
            .client
            .request(request.method.clone(), &url)
            .send()
            .await
            .with_context(|| format!("network fetch failed for {url}"))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body for {url}"))?
            .to_vec();

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
