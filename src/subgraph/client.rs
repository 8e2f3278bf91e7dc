use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::warn;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

/// Maximum attempts per query for transport failures
const MAX_RETRIES: u32 = 3;

/// Delay between retries (exponential backoff base)
const RETRY_DELAY_MS: u64 = 200;

/// Timeout for a single HTTP request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

/// Standard GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl<T> GraphQlResponse<T> {
    /// Turns an envelope into its data, failing on any reported error.
    pub fn into_result(self) -> Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            bail!("Subgraph returned errors: {}", messages.join("; "));
        }
        match self.data {
            Some(data) => Ok(data),
            None => bail!("Subgraph response has no data"),
        }
    }
}

/// Delivers a GraphQL request body to an endpoint and returns the JSON reply.
#[async_trait]
pub trait GraphQlTransport: Send + Sync {
    async fn post(&self, url: &str, body: &Value) -> Result<Value>;
}

/// HTTP POST transport over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }
}

#[async_trait]
impl GraphQlTransport for HttpTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

/// GraphQL client for a single subgraph endpoint.
///
/// Transport failures (connection, timeout, non-2xx status, non-JSON body)
/// are retried with exponential backoff; GraphQL errors are not.
#[derive(Clone)]
pub struct SubgraphClient {
    transport: Arc<dyn GraphQlTransport>,
    url: String,
}

impl SubgraphClient {
    pub fn new(transport: Arc<dyn GraphQlTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });

        let mut attempt = 0;
        let reply = loop {
            match self.transport.post(&self.url, &body).await {
                Ok(reply) => break reply,
                Err(e) if attempt + 1 < MAX_RETRIES => {
                    warn!(
                        "Subgraph request to {} failed (attempt {}/{}): {:#}",
                        self.url,
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    let delay = Duration::from_millis(RETRY_DELAY_MS * 2_u64.pow(attempt));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Subgraph request to {} failed after {} attempts",
                            self.url, MAX_RETRIES
                        )
                    })
                },
            }
        };

        serde_json::from_value::<GraphQlResponse<T>>(reply)
            .with_context(|| format!("Malformed response from {}", self.url))?
            .into_result()
    }
}
