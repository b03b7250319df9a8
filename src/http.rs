//! # HTTP Client
//!
//! A `reqwest` implementation of [`LogResolver`] and [`WitnessClient`].
//!
//! Logs are fetched with a GET to the log URL. Witnesses are asked for a
//! proof with a POST of the log to `{endpoint}/witness`, answered with
//! `200 {"proof": ...}` or an error status with `{"error": ...}`.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::log::DidLogEntry;
use crate::proof::Proof;
use crate::provider::{LogResolver, WitnessClient};

/// Default timeout for each HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a witness request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WitnessRequest {
    /// The DID log, ending with the entry to witness.
    pub log: Vec<DidLogEntry>,
}

/// Body of a successful witness response.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WitnessResponse {
    /// The witness's proof over the last entry's version id.
    pub proof: Proof,
}

/// Body of a failed witness response.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WitnessError {
    /// Why the witness refused.
    pub error: String,
}

/// HTTP client for fetching logs and requesting witness proofs.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    witness_endpoints: HashMap<String, String>,
}

impl HttpClient {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }
}

/// Builder for [`HttpClient`].
#[derive(Clone, Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    witness_endpoints: HashMap<String, String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            witness_endpoints: HashMap::new(),
        }
    }
}

impl HttpClientBuilder {
    /// Set the timeout applied to each request.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the base URL of the witness with DID `witness_id`.
    #[must_use]
    pub fn witness_endpoint(
        mut self, witness_id: impl Into<String>, url: impl Into<String>,
    ) -> Self {
        self.witness_endpoints.insert(witness_id.into(), url.into());
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Will fail if the underlying HTTP client cannot be initialized.
    pub fn build(self) -> crate::Result<HttpClient> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| crate::Error::Configuration(format!("invalid HTTP client: {e}")))?;
        Ok(HttpClient {
            client,
            witness_endpoints: self.witness_endpoints,
        })
    }
}

impl LogResolver for HttpClient {
    async fn fetch_log(&self, url: &str) -> Result<String> {
        tracing::debug!("fetching DID log from {url}");
        let response = self.client.get(url).send().await.with_context(|| format!("GET {url}"))?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl WitnessClient for HttpClient {
    async fn request_proof(&self, witness_id: &str, log: &[DidLogEntry]) -> Result<Proof> {
        let Some(endpoint) = self.witness_endpoints.get(witness_id) else {
            bail!("no endpoint configured for witness {witness_id}");
        };
        let url = format!("{}/witness", endpoint.trim_end_matches('/'));

        let request = WitnessRequest { log: log.to_vec() };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<WitnessError>()
                .await
                .map_or_else(|_| status.to_string(), |e| e.error);
            return Err(anyhow!("witness {witness_id} refused: {reason}"));
        }
        let body: WitnessResponse = response.json().await?;
        Ok(body.proof)
    }
}
