//! # HTTP Client Handle
//!
//! One lazily built `reqwest::Client` shared by every run in the process.
//! The handle is passed by reference into the tools; whether a client is
//! connected is explicit state checked on acquire, and a connection-level
//! failure drops the client so the next call builds a fresh one.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_USER_AGENT: &str = "PhDApplyBot/0.1 (+https://phdapply.app)";

#[derive(Debug)]
pub struct ClientHandle {
    client: Mutex<Option<reqwest::Client>>,
    user_agent: String,
    connect_timeout: Duration,
}

impl Default for ClientHandle {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl ClientHandle {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Mutex::new(None),
            user_agent: user_agent.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// The shared client, built on first use or after [`invalidate`](Self::invalidate).
    pub async fn acquire(&self) -> Result<reqwest::Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to build HTTP client")?;
        tracing::debug!("HTTP client initialized");
        *guard = Some(client.clone());
        Ok(client)
    }

    pub async fn invalidate(&self) {
        *self.client.lock().await = None;
    }

    /// Send a request built from the shared client, reconnecting next time
    /// if the connection itself failed.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: FnOnce(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let client = self.acquire().await?;
        match build(&client).send().await {
            Ok(response) => Ok(response.error_for_status()?),
            Err(e) => {
                if e.is_connect() {
                    tracing::warn!(error = %e, "Connection failed, dropping HTTP client");
                    self.invalidate().await;
                }
                Err(e.into())
            }
        }
    }

    pub async fn get_json(&self, url: &str, query: &[(&str, String)], timeout: Duration) -> Result<Value> {
        let response = self
            .send(|client| client.get(url).query(query).timeout(timeout))
            .await
            .with_context(|| format!("GET {}", url))?;
        Ok(response.json::<Value>().await?)
    }

    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .send(|client| client.get(url).timeout(timeout))
            .await
            .with_context(|| format!("GET {}", url))?;
        Ok(response.text().await?)
    }

    /// Body bytes plus the response content type
    pub async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<(Vec<u8>, Option<String>)> {
        let response = self
            .send(|client| client.get(url).timeout(timeout))
            .await
            .with_context(|| format!("GET {}", url))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((response.bytes().await?.to_vec(), content_type))
    }

    pub async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value> {
        let response = self
            .send(|client| {
                client
                    .post(url)
                    .bearer_auth(bearer)
                    .json(body)
                    .timeout(timeout)
            })
            .await
            .with_context(|| format!("POST {}", url))?;
        Ok(response.json::<Value>().await?)
    }
}
