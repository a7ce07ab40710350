pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod poller;
pub mod server;
pub mod transform;

pub use cache::SnapshotCache;
pub use classify::{classify, PipeStatus};
pub use client::{ApiClient, Fetch};
pub use error::{Error, Result};
pub use metrics::{MemorySink, MetricKind, MetricSink, PrometheusSink};
pub use poller::{CycleReport, ExporterContext, Poller, ResourceKind};
