#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use collector::gatherer::{BugzillaGatherer, GithubGatherer, GitlabGatherer, PagureGatherer};
use collector::{BrokerTrackerClient, Collector};
use common::config::CollectorConfig;
use http::{header, HeaderValue, Request, Response, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracker_broker::{HttpExec, ResponseCache, RetryPolicy, TrackerBroker, TrackerBrokerBuilder};

pub const GITHUB_API: &str = "https://api.github.com/";
pub const PAGURE: &str = "https://pagure.io/";
pub const GITLAB: &str = "https://gitlab.com/";
pub const BUGZILLA: &str = "https://bugzilla.redhat.com/";

#[derive(Clone)]
struct Route {
    status: u16,
    body: Vec<u8>,
    next: Option<String>,
}

/// Serves canned responses by exact URL and counts every request; unknown URLs get a 404.
#[derive(Default)]
pub struct RoutedExec {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl RoutedExec {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn json(&self, url: &str, body: Value) {
        self.route(url, 200, body, None).await;
    }

    pub async fn json_page(&self, url: &str, body: Value, next: &str) {
        self.route(url, 200, body, Some(next.to_string())).await;
    }

    pub async fn status(&self, url: &str, status: u16) {
        self.route(url, status, Value::Null, None).await;
    }

    async fn route(&self, url: &str, status: u16, body: Value, next: Option<String>) {
        self.routes.lock().await.insert(
            url.to_string(),
            Route {
                status,
                body: serde_json::to_vec(&body).unwrap(),
                next,
            },
        );
    }

    pub async fn calls(&self, url: &str) -> usize {
        self.calls.lock().await.get(url).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }
}

#[async_trait]
impl HttpExec for RoutedExec {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let url = req.uri().to_string();
        *self.calls.lock().await.entry(url.clone()).or_default() += 1;
        let route = self.routes.lock().await.get(&url).cloned();
        let route = route.unwrap_or(Route {
            status: 404,
            body: b"{\"message\":\"Not Found\"}".to_vec(),
            next: None,
        });

        let mut resp = Response::new(route.body);
        *resp.status_mut() = StatusCode::from_u16(route.status).unwrap();
        if let Some(next) = route.next {
            resp.headers_mut().insert(
                header::LINK,
                HeaderValue::from_str(&format!("<{next}>; rel=\"next\"")).unwrap(),
            );
        }
        Ok(resp)
    }
}

pub fn broker(exec: Arc<RoutedExec>, cache: &ResponseCache) -> Arc<dyn TrackerBroker> {
    TrackerBrokerBuilder::new(cache.clone())
        .http_exec(exec)
        .retry(RetryPolicy {
            max_attempts: 2,
            base: Duration::from_millis(1),
            max: Duration::from_millis(2),
            jitter_frac: 0.0,
        })
        .build()
        .unwrap()
}

/// A collector wired exactly like the binary, over the routed transport.
pub fn collector(exec: Arc<RoutedExec>) -> Collector {
    let cache = ResponseCache::memory(128, None);
    let client = |github: bool| {
        let broker = broker(exec.clone(), &cache);
        Arc::new(if github {
            BrokerTrackerClient::github(broker, "easyfix-tests")
        } else {
            BrokerTrackerClient::new(broker, "easyfix-tests")
        })
    };

    let github = Arc::new(GithubGatherer::new(client(true), GITHUB_API));
    Collector::new(CollectorConfig {
        max_concurrent_projects: 4,
    })
    .with_gatherer(github.clone())
    .with_org_enumerator(github)
    .with_gatherer(Arc::new(PagureGatherer::new(client(false), PAGURE)))
    .with_gatherer(Arc::new(GitlabGatherer::new(client(false), GITLAB)))
    .with_bugzilla(Arc::new(BugzillaGatherer::new(client(false), BUGZILLA)))
}

pub fn github_issue(number: u64, labels: &[&str]) -> Value {
    serde_json::json!({
        "number": number,
        "title": format!("issue {number}"),
        "html_url": format!("https://github.com/org/repo/issues/{number}"),
        "state": "open",
        "body": "details",
        "labels": labels.iter().map(|name| serde_json::json!({"name": name})).collect::<Vec<_>>(),
        "assignees": [],
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z"
    })
}
