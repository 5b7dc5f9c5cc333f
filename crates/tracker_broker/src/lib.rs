pub mod backoff;
pub mod broker;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod model;

pub use backoff::RetryPolicy;
pub use broker::{HttpExec, ReqwestExecutor, TrackerBroker, TrackerBrokerBuilder};
pub use cache::{CachedResponse, ResponseCache};
pub use error::RemoteFetchError;
pub use model::{parse_next_link, TrackerRequest};
