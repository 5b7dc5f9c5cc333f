use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::{CacheBackendKind, CacheConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{header, HeaderValue, Response};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{CacheBackendError, RemoteFetchError};
use crate::metrics;

pub type FetchResult = Result<CachedResponse, RemoteFetchError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn from_http(resp: Response<Vec<u8>>) -> Self {
        let status = resp.status().as_u16();
        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), val.to_string()))
            })
            .collect();
        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            status,
            headers,
            body: resp.into_body(),
            etag,
            stored_at: Utc::now(),
        }
    }

    pub fn into_response(self) -> Response<Vec<u8>> {
        let mut response = Response::new(self.body);
        *response.status_mut() =
            http::StatusCode::from_u16(self.status).unwrap_or(http::StatusCode::OK);
        let headers = response.headers_mut();
        for (key, value) in self.headers.iter() {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `None` TTL means entries never expire within the backend.
    pub fn is_fresh(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match ttl {
            None => true,
            Some(ttl) => match (now - self.stored_at).to_std() {
                Ok(age) => age < ttl,
                Err(_) => true,
            },
        }
    }

    /// Same payload, new timestamp; used after a 304 revalidation.
    pub fn refreshed(mut self) -> Self {
        self.stored_at = Utc::now();
        self
    }
}

mod body_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

enum Backend {
    Memory(Mutex<LruCache<String, CachedResponse>>),
    Disk(DiskStore),
    Null,
}

impl Backend {
    fn label(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Disk(_) => "disk",
            Backend::Null => "null",
        }
    }
}

struct DiskStore {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    response: CachedResponse,
}

impl DiskStore {
    fn open(dir: &Path) -> Result<Self, CacheBackendError> {
        std::fs::create_dir_all(dir).map_err(|err| CacheBackendError::io(dir, err))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    async fn load(&self, key: &str) -> Result<Option<CachedResponse>, CacheBackendError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheBackendError::io(&path, err)),
        };
        let entry: DiskEntry = serde_json::from_slice(&bytes)?;
        // Digest collisions are not worth trusting.
        Ok((entry.key == key).then_some(entry.response))
    }

    async fn save(&self, key: &str, response: &CachedResponse) -> Result<(), CacheBackendError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let encoded = serde_json::to_vec(&DiskEntry {
            key: key.to_string(),
            response: response.clone(),
        })?;
        tokio::fs::write(&tmp, encoded)
            .await
            .map_err(|err| CacheBackendError::io(&tmp, err))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| CacheBackendError::io(&path, err))
    }
}

type Waiters = Vec<oneshot::Sender<FetchResult>>;

/// Response cache shared by every gatherer of a run.
///
/// Concurrent `get_or_compute` calls for one key share a single computation;
/// only successful results are stored.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<Backend>,
    ttl: Option<Duration>,
    pending: Arc<Mutex<HashMap<String, Waiters>>>,
}

impl ResponseCache {
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheBackendError> {
        let ttl = config.ttl_secs.map(Duration::from_secs);
        match config.backend {
            CacheBackendKind::Memory => Ok(Self::memory(config.capacity, ttl)),
            CacheBackendKind::Disk => {
                let dir = config
                    .path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(".cache"));
                Self::disk(&dir, ttl)
            }
            CacheBackendKind::Null => Ok(Self::null()),
        }
    }

    pub fn memory(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self::with_backend(Backend::Memory(Mutex::new(LruCache::new(capacity))), ttl)
    }

    pub fn disk(dir: &Path, ttl: Option<Duration>) -> Result<Self, CacheBackendError> {
        Ok(Self::with_backend(Backend::Disk(DiskStore::open(dir)?), ttl))
    }

    pub fn null() -> Self {
        Self::with_backend(Backend::Null, None)
    }

    fn with_backend(backend: Backend, ttl: Option<Duration>) -> Self {
        Self {
            backend: Arc::new(backend),
            ttl,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend.label()
    }

    /// Returns the stored entry regardless of age. Backend failures read as a miss.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        match self.backend.as_ref() {
            Backend::Memory(lru) => lru.lock().await.get(key).cloned(),
            Backend::Disk(store) => match store.load(key).await {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_backend_error("load", key, &err);
                    None
                }
            },
            Backend::Null => None,
        }
    }

    pub async fn put(&self, key: String, value: CachedResponse) {
        match self.backend.as_ref() {
            Backend::Memory(lru) => {
                lru.lock().await.put(key, value);
            }
            Backend::Disk(store) => {
                if let Err(err) = store.save(&key, &value).await {
                    self.record_backend_error("store", &key, &err);
                }
            }
            Backend::Null => {}
        }
    }

    async fn get_fresh(&self, key: &str) -> (Option<CachedResponse>, bool) {
        match self.get(key).await {
            Some(entry) => {
                let fresh = entry.is_fresh(self.ttl, Utc::now());
                (Some(entry), fresh)
            }
            None => (None, false),
        }
    }

    /// Serves `key` from the cache or runs `compute` once for all concurrent callers.
    ///
    /// `compute` receives the expired entry, if any, so it can revalidate it.
    pub async fn get_or_compute<F>(&self, key: &str, compute: F) -> FetchResult
    where
        F: FnOnce(Option<CachedResponse>) -> BoxFuture<'static, FetchResult>,
    {
        let label = self.backend.label();
        if let (Some(entry), true) = self.get_fresh(key).await {
            metrics::CACHE_HITS.with_label_values(&[label]).inc();
            return Ok(entry);
        }

        let (rx, leader) = self.register_waiter(key).await;
        if leader {
            // Another leader may have stored the entry between our lookup and registration.
            match self.get_fresh(key).await {
                (Some(entry), true) => {
                    metrics::CACHE_HITS.with_label_values(&[label]).inc();
                    self.finish(key, Ok(entry)).await;
                }
                (stale, _) => {
                    metrics::CACHE_MISSES.with_label_values(&[label]).inc();
                    debug!(key = %key, backend = label, "cache miss");
                    let work = compute(stale);
                    let cache = self.clone();
                    let key = key.to_string();
                    tokio::spawn(async move {
                        let result = AssertUnwindSafe(work)
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| Err(RemoteFetchError::Abandoned { key: key.clone() }));
                        if let Ok(response) = &result {
                            cache.put(key.clone(), response.clone()).await;
                        }
                        cache.finish(&key, result).await;
                    });
                }
            }
        }

        rx.await.unwrap_or_else(|_| {
            Err(RemoteFetchError::Abandoned {
                key: key.to_string(),
            })
        })
    }

    async fn register_waiter(&self, key: &str) -> (oneshot::Receiver<FetchResult>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.pending.lock().await;
        match guard.get_mut(key) {
            Some(waiters) => {
                waiters.push(tx);
                (rx, false)
            }
            None => {
                guard.insert(key.to_string(), vec![tx]);
                (rx, true)
            }
        }
    }

    async fn finish(&self, key: &str, result: FetchResult) {
        let waiters = {
            let mut guard = self.pending.lock().await;
            guard.remove(key).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    fn record_backend_error(&self, op: &'static str, key: &str, err: &CacheBackendError) {
        metrics::CACHE_ERRORS
            .with_label_values(&[self.backend.label(), op])
            .inc();
        warn!(key = %key, op, error = %err, "cache backend failure, continuing without cache");
    }
}
