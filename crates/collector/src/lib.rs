pub mod client;
pub mod gatherer;
pub mod metrics;
pub mod output;
pub mod service;
pub mod subscription;

pub use client::{BrokerTrackerClient, Page, TrackerClient};
pub use gatherer::{Gatherer, OrgEnumerator, OrgRepo};
pub use output::{JsonFileSink, OutputSink, Snapshot};
pub use service::{Collector, RunOutput};
