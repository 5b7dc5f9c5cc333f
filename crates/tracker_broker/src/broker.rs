use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use common::text::truncate_str;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backoff::RetryPolicy;
use crate::cache::{CachedResponse, FetchResult, ResponseCache};
use crate::error::RemoteFetchError;
use crate::metrics::{self, status_class};
use crate::model::{parse_rate_limit, parse_retry_after, TrackerRequest};

#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = req.into_parts();
        let resp = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let mut response = Response::new(bytes.to_vec());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Read-only access to one tracker through the shared response cache.
pub trait TrackerBroker: Send + Sync {
    fn enqueue(
        &self,
        request: Request<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Response<Vec<u8>>>>;
}

pub struct TrackerBrokerBuilder {
    cache: ResponseCache,
    http_exec: Option<Arc<dyn HttpExec>>,
    authorization: Option<HeaderValue>,
    user_agent: String,
    timeout: Duration,
    max_inflight: usize,
    retry: RetryPolicy,
}

impl TrackerBrokerBuilder {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache,
            http_exec: None,
            authorization: None,
            user_agent: "fedora-gather-easyfix".to_string(),
            timeout: Duration::from_secs(30),
            max_inflight: 8,
            retry: RetryPolicy::default(),
        }
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn basic_auth(mut self, username: &str, secret: &str) -> Result<Self> {
        let encoded = STANDARD.encode(format!("{username}:{secret}"));
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
        value.set_sensitive(true);
        self.authorization = Some(value);
        Ok(self)
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_inflight(mut self, max: usize) -> Self {
        self.max_inflight = max.max(1);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn build(self) -> Result<Arc<dyn TrackerBroker>> {
        let exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(ReqwestExecutor::new(&self.user_agent, self.timeout)?),
        };

        Ok(Arc::new(LocalTrackerBroker {
            inner: Arc::new(Inner {
                http_exec: exec,
                cache: self.cache,
                authorization: self.authorization,
                inflight: Arc::new(Semaphore::new(self.max_inflight)),
                retry: self.retry,
            }),
        }))
    }
}

struct Inner {
    http_exec: Arc<dyn HttpExec>,
    cache: ResponseCache,
    authorization: Option<HeaderValue>,
    inflight: Arc<Semaphore>,
    retry: RetryPolicy,
}

#[derive(Clone)]
pub struct LocalTrackerBroker {
    inner: Arc<Inner>,
}

impl TrackerBroker for LocalTrackerBroker {
    fn enqueue(
        &self,
        request: Request<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Response<Vec<u8>>>> {
        let inner = self.inner.clone();
        async move {
            let request = TrackerRequest::new(request)?;
            if request.method() != http::Method::GET {
                let response = fetch_with_retries(inner, request, None).await?;
                return Ok(response.into_response());
            }

            let key = request.key().to_string();
            let cache = inner.cache.clone();
            let response = cache
                .get_or_compute(&key, move |stale| {
                    fetch_with_retries(inner, request, stale).boxed()
                })
                .await?;
            Ok(response.into_response())
        }
        .boxed()
    }
}

enum Attempt {
    Done(CachedResponse),
    Retry {
        error: RemoteFetchError,
        wait: Option<Duration>,
        reason: &'static str,
    },
    Fatal(RemoteFetchError),
}

async fn fetch_with_retries(
    inner: Arc<Inner>,
    request: TrackerRequest,
    stale: Option<CachedResponse>,
) -> FetchResult {
    let host = request.host();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match execute_once(&inner, &host, &request, stale.as_ref()).await {
            Attempt::Done(response) => return Ok(response),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retry {
                error,
                wait,
                reason,
            } => {
                if inner.retry.exhausted(attempt) {
                    warn!(
                        attempt,
                        request = %request.key(),
                        error = %error,
                        "giving up after final attempt"
                    );
                    return Err(error);
                }

                let wait = wait
                    .map(|advised| inner.retry.clamp(advised))
                    .unwrap_or_else(|| inner.retry.delay(attempt));
                warn!(
                    attempt,
                    request = %request.key(),
                    reason,
                    wait_ms = wait.as_millis() as u64,
                    error = %error,
                    "tracker request attempt failed"
                );
                metrics::RETRIES_TOTAL
                    .with_label_values(&[&host, reason])
                    .inc();
                metrics::SLEEP_SECONDS
                    .with_label_values(&[&host, reason])
                    .inc_by(wait.as_secs_f64());
                sleep(wait).await;
            }
        }
    }
}

async fn execute_once(
    inner: &Inner,
    host: &str,
    request: &TrackerRequest,
    stale: Option<&CachedResponse>,
) -> Attempt {
    let url = request.uri().to_string();
    let _permit = match inner.inflight.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return Attempt::Fatal(RemoteFetchError::Abandoned {
                key: request.key().to_string(),
            })
        }
    };

    let mut outgoing = request.clone();
    if let Some(auth) = &inner.authorization {
        outgoing
            .headers_mut()
            .insert(header::AUTHORIZATION, auth.clone());
    }
    if let Some(etag) = stale.and_then(|entry| entry.etag.as_deref()) {
        if let Ok(value) = HeaderValue::from_str(etag) {
            outgoing.headers_mut().insert(header::IF_NONE_MATCH, value);
        }
    }

    debug!(url = %url, "dispatching tracker request");
    metrics::INFLIGHT.with_label_values(&[host]).inc();
    let start = std::time::Instant::now();
    let result = inner.http_exec.execute(outgoing.request()).await;
    metrics::INFLIGHT.with_label_values(&[host]).dec();

    let resp = match result {
        Ok(resp) => resp,
        Err(err) => {
            return Attempt::Retry {
                error: RemoteFetchError::transport(&url, err),
                wait: None,
                reason: "transport",
            }
        }
    };

    metrics::LATENCY
        .with_label_values(&[host])
        .observe(start.elapsed().as_secs_f64());
    let status = resp.status();
    metrics::REQUESTS_TOTAL
        .with_label_values(&[host, status_class(status)])
        .inc();

    let rate_info = parse_rate_limit(resp.headers());
    if let Some(rate) = &rate_info {
        metrics::RATE_REMAINING
            .with_label_values(&[host])
            .set(rate.remaining);
    }

    if status == StatusCode::NOT_MODIFIED {
        return match stale {
            Some(entry) => {
                metrics::CACHE_REVALIDATED.with_label_values(&[host]).inc();
                Attempt::Done(entry.clone().refreshed())
            }
            None => Attempt::Fatal(RemoteFetchError::status(status, url)),
        };
    }

    if status.is_success() {
        return Attempt::Done(CachedResponse::from_http(resp));
    }

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && rate_info.as_ref().map(|r| r.exhausted()).unwrap_or(false));

    if rate_limited || status.is_server_error() {
        if let Some(retry) = parse_retry_after(resp.headers()) {
            return Attempt::Retry {
                error: RemoteFetchError::status(status, url),
                wait: Some(retry.wait),
                reason: retry.reason,
            };
        }
    }

    if rate_limited {
        let wait = rate_info
            .as_ref()
            .filter(|r| r.exhausted())
            .map(|r| r.wait_until_reset(Utc::now()));
        warn!(
            status = %status,
            url = %url,
            rate_limit_remaining = rate_info.as_ref().map(|r| r.remaining),
            rate_limit_reset = rate_info.as_ref().map(|r| r.reset.timestamp()),
            "tracker rate limit reached"
        );
        return Attempt::Retry {
            error: RemoteFetchError::status(status, url),
            wait,
            reason: "rate_limit",
        };
    }

    if status.is_server_error() {
        return Attempt::Retry {
            error: RemoteFetchError::status(status, url),
            wait: None,
            reason: "server_error",
        };
    }

    warn!(
        status = %status,
        url = %url,
        body_preview = %body_preview(resp.body()),
        "tracker returned error response"
    );
    Attempt::Fatal(RemoteFetchError::status(status, url))
}

fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    truncate_str(&String::from_utf8_lossy(body), 256)
}
