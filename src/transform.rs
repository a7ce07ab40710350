use crate::classify::{classify, PipeStatus};
use crate::model::{DatasetSnapshot, PipeSnapshot, QueueSource, USER_ORIGIN};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PipeFacts {
    pub id: String,
    pub config_group: &'static str,
    pub storage_mb: f64,
    pub queue_depth: f64,
    pub status: PipeStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFacts {
    pub id: String,
    pub deleted: f64,
    pub with_deleted: f64,
    pub existed: f64,
}

/// Derives the numeric facts for a user pipe. System pipes yield `None`.
pub fn pipe_facts(pipe: &PipeSnapshot, now: DateTime<Utc>) -> Option<PipeFacts> {
    if pipe.origin() != USER_ORIGIN {
        return None;
    }

    let runtime = &pipe.runtime;
    Some(PipeFacts {
        id: pipe.id.clone(),
        config_group: normalize_config_group(pipe.config_group_raw()),
        storage_mb: pipe.storage_bytes / BYTES_PER_MB,
        queue_depth: queue_depth(&pipe.id, &runtime.queues.source, &runtime.queues.dependencies),
        status: classify(
            runtime.success,
            &runtime.state,
            runtime.next_run.as_deref(),
            now,
        ),
    })
}

/// User datasets and all dead-letter datasets pass; other system datasets don't.
pub fn dataset_facts(dataset: &DatasetSnapshot) -> Option<DatasetFacts> {
    if dataset.origin() != USER_ORIGIN && !dataset.is_dead_letter() {
        return None;
    }

    Some(DatasetFacts {
        id: dataset.id.clone(),
        deleted: dataset.runtime.deleted_count,
        with_deleted: dataset.runtime.with_deleted_count,
        existed: dataset.runtime.existed_count,
    })
}

/// Maps the free-form `$config-group` onto the fixed dashboard groups.
pub fn normalize_config_group(raw: &str) -> &'static str {
    match raw {
        "" => "default",
        "maintenance" => "maintenance",
        "kafka" => "kafka",
        _ => "private",
    }
}

pub fn queue_depth(pipe_id: &str, source: &QueueSource, dependencies: &BTreeMap<String, f64>) -> f64 {
    let source_depth = match source {
        QueueSource::Empty => 0.0,
        QueueSource::Scalar(value) => *value,
        QueueSource::Aggregate(queues) => queues
            .iter()
            .map(|(name, value)| {
                value.as_f64().unwrap_or_else(|| {
                    log::warn!(
                        "Pipe {}: non-numeric source queue '{}' = {}, counting as 0",
                        pipe_id,
                        name,
                        value
                    );
                    0.0
                })
            })
            .sum(),
        QueueSource::Malformed(shape) => {
            log::warn!(
                "Pipe {}: unexpected source queue shape {}, counting as 0",
                pipe_id,
                shape
            );
            0.0
        }
    };

    source_depth + dependencies.values().sum::<f64>()
}
