use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::{header, Request};
use serde_json::Value;
use tracing::{debug, instrument};
use tracker_broker::{parse_next_link, TrackerBroker};

/// One decoded response plus the server-advertised next page, if any.
#[derive(Debug, Clone)]
pub struct Page {
    pub value: Value,
    pub next: Option<String>,
}

#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Page>;
    async fn get_text(&self, url: &str) -> Result<String>;
}

/// Reads a tracker through its broker, so every call is cached and retried.
pub struct BrokerTrackerClient {
    broker: Arc<dyn TrackerBroker>,
    user_agent: String,
    accept: &'static str,
}

impl BrokerTrackerClient {
    pub fn new(broker: Arc<dyn TrackerBroker>, user_agent: impl Into<String>) -> Self {
        Self {
            broker,
            user_agent: user_agent.into(),
            accept: "application/json",
        }
    }

    /// GitHub wants its vendor media type to pin the v3 payload shape.
    pub fn github(broker: Arc<dyn TrackerBroker>, user_agent: impl Into<String>) -> Self {
        Self {
            accept: "application/vnd.github+json",
            ..Self::new(broker, user_agent)
        }
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn execute(&self, url: &str, accept: &str) -> Result<http::Response<Vec<u8>>> {
        let uri: http::Uri = url.parse().with_context(|| format!("invalid url {url}"))?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(header::ACCEPT, accept)
            .body(Vec::new())?;

        debug!("dispatching tracker request");
        self.broker.enqueue(request).await
    }
}

#[async_trait]
impl TrackerClient for BrokerTrackerClient {
    async fn get_json(&self, url: &str) -> Result<Page> {
        let response = self.execute(url, self.accept).await?;
        let next = parse_next_link(response.headers());
        let value: Value = serde_json::from_slice(response.body())
            .with_context(|| format!("decoding json from {url}"))?;
        Ok(Page { value, next })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.execute(url, "text/plain").await?;
        Ok(String::from_utf8_lossy(response.body()).into_owned())
    }
}
