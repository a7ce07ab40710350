use super::MetricKind;

pub const NAMESPACE: &str = "sesam";

pub const PIPE_STORAGE_MB: &str = "pipe_storage_mb";
pub const PIPE_QUEUE_TOTAL: &str = "pipe_queue_total";
pub const PIPE_STATUS_TOTAL: &str = "pipe_status_total";
pub const NODE_STORAGE_TOTAL_MB: &str = "node_storage_total_mb";
pub const DATASET_DELETED_TOTAL: &str = "dataset_deleted_total";
pub const DATASET_WITHDELETED_TOTAL: &str = "dataset_withdeleted_total";
pub const DATASET_EXISTED_TOTAL: &str = "dataset_existed_total";
pub const API_UP: &str = "api_up";
pub const EXPORTER_INFO: &str = "exporter_info";

#[derive(Debug, Clone, Copy)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

pub const CATALOG: &[MetricDescriptor] = &[
    MetricDescriptor {
        name: PIPE_STORAGE_MB,
        help: "pipe storage (MB)",
        kind: MetricKind::Gauge,
        labels: &["host", "pipe", "configGroup"],
    },
    MetricDescriptor {
        name: PIPE_QUEUE_TOTAL,
        help: "entities waiting in the pipe's source and dependency queues",
        kind: MetricKind::Gauge,
        labels: &["host", "pipe", "configGroup"],
    },
    MetricDescriptor {
        name: PIPE_STATUS_TOTAL,
        help: "observed pipe health status, counted once per pipe per scrape",
        kind: MetricKind::Counter,
        labels: &["host", "pipe", "status", "configGroup"],
    },
    MetricDescriptor {
        name: NODE_STORAGE_TOTAL_MB,
        help: "total storage of user pipes (MB)",
        kind: MetricKind::Gauge,
        labels: &["host"],
    },
    MetricDescriptor {
        name: DATASET_DELETED_TOTAL,
        help: "total deleted entities in the output index",
        kind: MetricKind::Gauge,
        labels: &["host", "pipe"],
    },
    MetricDescriptor {
        name: DATASET_WITHDELETED_TOTAL,
        help: "total entities in the output index",
        kind: MetricKind::Gauge,
        labels: &["host", "pipe"],
    },
    MetricDescriptor {
        name: DATASET_EXISTED_TOTAL,
        help: "total existed in the output log",
        kind: MetricKind::Gauge,
        labels: &["host", "pipe"],
    },
    MetricDescriptor {
        name: API_UP,
        help: "API request attempts by resulting status",
        kind: MetricKind::Counter,
        labels: &["host", "path", "status"],
    },
    MetricDescriptor {
        name: EXPORTER_INFO,
        help: "target of this exporter",
        kind: MetricKind::Gauge,
        labels: &["host", "desc"],
    },
];

