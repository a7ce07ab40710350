use crate::cache::SnapshotCache;
use crate::client::Fetch;
use crate::error::{Error, Result};
use crate::metrics::catalog::{
    DATASET_DELETED_TOTAL, DATASET_EXISTED_TOTAL, DATASET_WITHDELETED_TOTAL,
    NODE_STORAGE_TOTAL_MB, PIPE_QUEUE_TOTAL, PIPE_STATUS_TOTAL, PIPE_STORAGE_MB,
};
use crate::metrics::{MetricSink, Observation};
use crate::model::{DatasetSnapshot, PipeSnapshot};
use crate::transform::{dataset_facts, pipe_facts, DatasetFacts, PipeFacts};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 256;

const PIPE_GAUGES: [&str; 2] = [PIPE_STORAGE_MB, PIPE_QUEUE_TOTAL];
const DATASET_GAUGES: [&str; 3] = [
    DATASET_DELETED_TOTAL,
    DATASET_WITHDELETED_TOTAL,
    DATASET_EXISTED_TOTAL,
];

type Labels = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pipes,
    Datasets,
}

impl ResourceKind {
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Pipes => "pipes",
            ResourceKind::Datasets => "datasets",
        }
    }

    pub fn query(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ResourceKind::Pipes => &[],
            ResourceKind::Datasets => &[("include-internal-datasets", "false")],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Everything a cycle needs that outlives it.
pub struct ExporterContext {
    pub host: String,
    pub fetcher: Arc<dyn Fetch>,
    pub sink: Arc<dyn MetricSink>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerReport {
    /// Records after stale fallback
    pub effective: usize,
    /// Records that passed the origin filter and were emitted
    pub emitted: usize,
    /// The fetch came back empty and the previous snapshot was reused
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub pipes: ProducerReport,
    pub datasets: ProducerReport,
    pub observations: usize,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

/// What a producer hands to the fan-in loop.
enum Emission {
    Observation(Observation),
    /// Sent after a fresh snapshot: series of gauge `name` outside `keep` are gone.
    Retain {
        name: &'static str,
        keep: Vec<Labels>,
    },
}

/// Drives scrape cycles against one host. Each cycle fetches pipes and
/// datasets concurrently and only returns once both producers are done.
pub struct Poller {
    context: Arc<ExporterContext>,
    interval: Duration,
    pipes: SnapshotCache<PipeSnapshot>,
    datasets: SnapshotCache<DatasetSnapshot>,
    reports: watch::Sender<Option<CycleReport>>,
}

impl Poller {
    pub fn new(context: Arc<ExporterContext>, interval: Duration) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            context,
            interval,
            pipes: SnapshotCache::new(),
            datasets: SnapshotCache::new(),
            reports,
        }
    }

    pub fn watch_reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    /// Runs cycles forever, sleeping `interval` after each one completes.
    pub async fn run(&mut self) {
        log::info!(
            "Polling {} every {}s",
            self.context.host,
            self.interval.as_secs()
        );
        loop {
            match self.run_cycle().await {
                Ok(report) => log::info!(
                    "Cycle done in {:?}: pipes {}/{}{}, datasets {}/{}{}",
                    report.duration,
                    report.pipes.emitted,
                    report.pipes.effective,
                    if report.pipes.stale { " (stale)" } else { "" },
                    report.datasets.emitted,
                    report.datasets.effective,
                    if report.datasets.stale { " (stale)" } else { "" },
                ),
                Err(e) => log::error!("Cycle aborted: {}", e),
            }
            sleep(self.interval).await;
        }
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let (pipes_tx, pipes_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (datasets_tx, datasets_rx) = mpsc::channel(CHANNEL_CAPACITY);

        // The caches move into their producers and come back on join.
        let pipes_task = tokio::spawn(produce_pipes(
            self.context.clone(),
            std::mem::take(&mut self.pipes),
            pipes_tx,
        ));
        let datasets_task = tokio::spawn(produce_datasets(
            self.context.clone(),
            std::mem::take(&mut self.datasets),
            datasets_tx,
        ));

        let sink = self.context.sink.as_ref();
        let mut stream = ReceiverStream::new(pipes_rx).merge(ReceiverStream::new(datasets_rx));
        let mut observations = 0;
        while let Some(emission) = stream.next().await {
            match emission {
                Emission::Observation(observation) => {
                    observation.emit_to(sink);
                    observations += 1;
                }
                Emission::Retain { name, keep } => {
                    let keep: Vec<Vec<(&str, &str)>> = keep
                        .iter()
                        .map(|labels| labels.iter().map(|(k, v)| (*k, v.as_str())).collect())
                        .collect();
                    sink.retain(name, &keep);
                }
            }
        }

        // Join both before reporting, so a failed producer never strands the other's cache.
        let (pipes_joined, datasets_joined) = tokio::join!(pipes_task, datasets_task);
        let mut failures = Vec::new();

        let pipes_report = match pipes_joined {
            Ok((cache, report)) => {
                self.pipes = cache;
                report
            }
            Err(e) => {
                failures.push(format!("pipes producer failed: {}", e));
                ProducerReport::default()
            }
        };
        let datasets_report = match datasets_joined {
            Ok((cache, report)) => {
                self.datasets = cache;
                report
            }
            Err(e) => {
                failures.push(format!("datasets producer failed: {}", e));
                ProducerReport::default()
            }
        };

        if !failures.is_empty() {
            return Err(Error::Internal(failures.join("; ")));
        }

        let report = CycleReport {
            pipes: pipes_report,
            datasets: datasets_report,
            observations,
            duration: started.elapsed(),
            finished_at: Utc::now(),
        };
        self.reports.send_replace(Some(report.clone()));
        Ok(report)
    }
}

async fn produce_pipes(
    context: Arc<ExporterContext>,
    mut cache: SnapshotCache<PipeSnapshot>,
    tx: mpsc::Sender<Emission>,
) -> (SnapshotCache<PipeSnapshot>, ProducerReport) {
    let fresh = fetch_records(context.fetcher.as_ref(), ResourceKind::Pipes).await;
    let authoritative = !fresh.is_empty();
    let stale = !authoritative && !cache.is_empty();
    let refreshed = cache.last_refreshed();
    let records = cache.reconcile(fresh);
    if stale {
        log::warn!(
            "No fresh pipes, reusing {} from {:?}",
            records.len(),
            refreshed.map(|ts| ts.to_rfc3339())
        );
    }

    let mut report = ProducerReport {
        effective: records.len(),
        emitted: 0,
        stale,
    };
    let now = Utc::now();
    let mut total_mb = 0.0;
    let mut seen = Vec::new();
    let mut open = true;

    for facts in records.iter().filter_map(|pipe| pipe_facts(pipe, now)) {
        total_mb += facts.storage_mb;
        if !send_all(&tx, pipe_observations(&context.host, &facts)).await {
            open = false;
            break;
        }
        seen.push(pipe_labels(&context.host, &facts));
        report.emitted += 1;
    }

    if open && report.emitted > 0 {
        let total = Observation::gauge(
            NODE_STORAGE_TOTAL_MB,
            vec![("host", context.host.clone())],
            total_mb,
        );
        open = send_all(&tx, vec![Emission::Observation(total)]).await;
    }

    if open && authoritative {
        send_all(&tx, retain_all(&PIPE_GAUGES, seen)).await;
    }

    (cache, report)
}

async fn produce_datasets(
    context: Arc<ExporterContext>,
    mut cache: SnapshotCache<DatasetSnapshot>,
    tx: mpsc::Sender<Emission>,
) -> (SnapshotCache<DatasetSnapshot>, ProducerReport) {
    let fresh = fetch_records(context.fetcher.as_ref(), ResourceKind::Datasets).await;
    let authoritative = !fresh.is_empty();
    let stale = !authoritative && !cache.is_empty();
    let refreshed = cache.last_refreshed();
    let records = cache.reconcile(fresh);
    if stale {
        log::warn!(
            "No fresh datasets, reusing {} from {:?}",
            records.len(),
            refreshed.map(|ts| ts.to_rfc3339())
        );
    }

    let mut report = ProducerReport {
        effective: records.len(),
        emitted: 0,
        stale,
    };
    let mut seen = Vec::new();
    let mut open = true;

    for facts in records.iter().filter_map(dataset_facts) {
        if !send_all(&tx, dataset_observations(&context.host, &facts)).await {
            open = false;
            break;
        }
        seen.push(dataset_labels(&context.host, &facts));
        report.emitted += 1;
    }

    if open && authoritative {
        send_all(&tx, retain_all(&DATASET_GAUGES, seen)).await;
    }

    (cache, report)
}

/// Fetches and decodes one resource kind. A failed fetch or a body that is
/// not a JSON array yields an empty list; records that don't decode are
/// skipped one by one.
async fn fetch_records<T: DeserializeOwned>(fetcher: &dyn Fetch, kind: ResourceKind) -> Vec<T> {
    let body = match fetcher.fetch(kind.path(), kind.query()).await {
        Ok(body) => body,
        Err(e) => {
            log::error!("No fresh {} this cycle: {}", kind, e);
            return Vec::new();
        }
    };

    let raw = match serde_json::from_slice::<Vec<Value>>(&body) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("Malformed {} payload: {}", kind, e);
            return Vec::new();
        }
    };

    raw.into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<T>(record) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping malformed {} record #{}: {}", kind, index, e);
                None
            }
        })
        .collect()
}

/// Returns `false` once the receiving side is gone.
async fn send_all(tx: &mpsc::Sender<Emission>, emissions: Vec<Emission>) -> bool {
    for emission in emissions {
        if tx.send(emission).await.is_err() {
            log::error!("Observation channel closed mid-cycle");
            return false;
        }
    }
    true
}

fn retain_all(gauges: &[&'static str], seen: Vec<Labels>) -> Vec<Emission> {
    gauges
        .iter()
        .map(|&name| Emission::Retain {
            name,
            keep: seen.clone(),
        })
        .collect()
}

fn pipe_labels(host: &str, facts: &PipeFacts) -> Labels {
    vec![
        ("host", host.to_string()),
        ("pipe", facts.id.clone()),
        ("configGroup", facts.config_group.to_string()),
    ]
}

fn dataset_labels(host: &str, facts: &DatasetFacts) -> Labels {
    vec![("host", host.to_string()), ("pipe", facts.id.clone())]
}

fn pipe_observations(host: &str, facts: &PipeFacts) -> Vec<Emission> {
    let labels = pipe_labels(host, facts);
    let mut status_labels = labels.clone();
    status_labels.push(("status", facts.status.to_string()));

    vec![
        Observation::gauge(PIPE_STORAGE_MB, labels.clone(), facts.storage_mb),
        Observation::gauge(PIPE_QUEUE_TOTAL, labels, facts.queue_depth),
        Observation::counter(PIPE_STATUS_TOTAL, status_labels, 1.0),
    ]
    .into_iter()
    .map(Emission::Observation)
    .collect()
}

fn dataset_observations(host: &str, facts: &DatasetFacts) -> Vec<Emission> {
    let labels = dataset_labels(host, facts);
    vec![
        Observation::gauge(DATASET_DELETED_TOTAL, labels.clone(), facts.deleted),
        Observation::gauge(DATASET_WITHDELETED_TOTAL, labels.clone(), facts.with_deleted),
        Observation::gauge(DATASET_EXISTED_TOTAL, labels, facts.existed),
    ]
    .into_iter()
    .map(Emission::Observation)
    .collect()
}
