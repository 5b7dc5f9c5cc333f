use chrono::{DateTime, Utc};
use http::{header, HeaderMap, Request};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// A read-only tracker call plus the identity it is cached and deduplicated under.
#[derive(Debug)]
pub struct TrackerRequest {
    inner: Request<Vec<u8>>,
    pub key: String,
}

impl Clone for TrackerRequest {
    fn clone(&self) -> Self {
        let mut builder = Request::builder()
            .method(self.inner.method().clone())
            .uri(self.inner.uri().clone())
            .version(self.inner.version());

        for (key, value) in self.inner.headers().iter() {
            builder = builder.header(key, value);
        }

        let inner = builder
            .body(self.inner.body().clone())
            .expect("cloning a request that was already valid");

        Self {
            inner,
            key: self.key.clone(),
        }
    }
}

impl TrackerRequest {
    pub fn new(inner: Request<Vec<u8>>) -> anyhow::Result<Self> {
        if !inner.headers().contains_key(header::USER_AGENT) {
            return Err(anyhow::anyhow!("user-agent header required"));
        }
        let key = request_key(&inner);
        Ok(Self { inner, key })
    }

    pub fn request(&self) -> Request<Vec<u8>> {
        self.clone().inner
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    pub fn method(&self) -> &http::Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &http::Uri {
        self.inner.uri()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Host label used for per-tracker metrics.
    pub fn host(&self) -> String {
        self.inner.uri().host().unwrap_or("unknown").to_string()
    }
}

/// Method plus the full URI. Credentials live in headers and never reach the key.
pub fn request_key(request: &Request<Vec<u8>>) -> String {
    let mut key = format!("{} {}", request.method(), request.uri());

    // Query-by-body calls must not collide when only the payload differs.
    if request.method() != http::Method::GET {
        let mut hasher = Sha256::new();
        hasher.update(request.body());
        let hex = format!("{:x}", hasher.finalize());
        key.push_str(" body:");
        key.push_str(&hex[..16.min(hex.len())]);
    }

    key
}

#[derive(Debug, Clone)]
pub struct RateLimitUpdate {
    pub limit: i64,
    pub remaining: i64,
    pub reset: DateTime<Utc>,
}

impl RateLimitUpdate {
    pub fn exhausted(&self) -> bool {
        self.remaining <= 0
    }

    pub fn wait_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.reset - now).to_std().unwrap_or_default()
    }
}

pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitUpdate> {
    let limit = header_i64(headers, "x-ratelimit-limit")?;
    let remaining = header_i64(headers, "x-ratelimit-remaining")?;
    let reset_ts = header_i64(headers, "x-ratelimit-reset")?;
    let reset = DateTime::from_timestamp(reset_ts, 0)?;
    Some(RateLimitUpdate {
        limit,
        remaining,
        reset,
    })
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

#[derive(Debug, Clone)]
pub struct RetryAdvice {
    pub wait: Duration,
    pub reason: &'static str,
}

pub fn parse_retry_after(headers: &HeaderMap) -> Option<RetryAdvice> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(RetryAdvice {
            wait: Duration::from_secs(seconds),
            reason: "retry_after",
        });
    }
    let date = httpdate::parse_http_date(value).ok()?;
    let wait = date
        .duration_since(std::time::SystemTime::now())
        .unwrap_or_default();
    Some(RetryAdvice {
        wait,
        reason: "retry_after_date",
    })
}

/// Extracts the `rel="next"` target of an RFC 8288 `Link` header.
pub fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|param| {
                let param = param.trim();
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                return None;
            }
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn next_link_is_found_among_relations() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LINK,
            HeaderValue::from_static(
                "<https://api.github.com/orgs/o/repos?page=2>; rel=\"next\", \
                 <https://api.github.com/orgs/o/repos?page=5>; rel=\"last\"",
            ),
        );
        assert_eq!(
            parse_next_link(&headers).as_deref(),
            Some("https://api.github.com/orgs/o/repos?page=2")
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LINK,
            HeaderValue::from_static("<https://api.github.com/x?page=1>; rel=\"prev\""),
        );
        assert!(parse_next_link(&headers).is_none());
        assert!(parse_next_link(&HeaderMap::new()).is_none());
    }

    #[test]
    fn rate_limit_headers_parse() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("60"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        let update = parse_rate_limit(&headers).unwrap();
        assert_eq!(update.limit, 60);
        assert!(update.exhausted());
        assert_eq!(update.reset.timestamp(), 1_700_000_000);
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("7"));
        let advice = parse_retry_after(&headers).unwrap();
        assert_eq!(advice.wait, Duration::from_secs(7));
        assert_eq!(advice.reason, "retry_after");
    }
}
