//! Typed views of the remote API's pipe and dataset payloads.
//!
//! Only the fields the exporter reads are modelled; everything else in the
//! payload is ignored. Missing fields fall back to neutral defaults so a
//! sparse record still decodes.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Id prefix of system datasets that collect records a pipe failed to write.
pub const DEAD_LETTER_PREFIX: &str = "system:dead-letter:";

/// Origin of records created by users, as opposed to system records.
pub const USER_ORIGIN: &str = "user";

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipeSnapshot {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "storage", default, deserialize_with = "null_as_default")]
    pub storage_bytes: f64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub config: PipeConfig,

    #[serde(default, deserialize_with = "null_as_default")]
    pub runtime: PipeRuntime,
}

impl PipeSnapshot {
    pub fn config_group_raw(&self) -> &str {
        &self.config.original.metadata.config_group
    }

    pub fn origin(&self) -> &str {
        &self.runtime.origin
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipeConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub original: OriginalConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OriginalConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: PipeMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipeMetadata {
    #[serde(rename = "$config-group", default, deserialize_with = "null_as_default")]
    pub config_group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipeRuntime {
    #[serde(default, deserialize_with = "null_as_default")]
    pub origin: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub queues: Queues,

    /// `None` until the pipe has completed its first run
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,

    #[serde(default)]
    pub next_run: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Queues {
    #[serde(default)]
    pub source: QueueSource,

    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: BTreeMap<String, f64>,
}

/// The `source` queue is reported either as a single number, as a mapping
/// of sub-queue name to number, or not at all.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Option<Value>")]
pub enum QueueSource {
    #[default]
    Empty,
    Scalar(f64),
    Aggregate(Map<String, Value>),
    /// Any other JSON shape; carries a short description for logging
    Malformed(String),
}

impl From<Option<Value>> for QueueSource {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => QueueSource::Empty,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) => QueueSource::Scalar(v),
                None => QueueSource::Malformed(n.to_string()),
            },
            Some(Value::Object(map)) => QueueSource::Aggregate(map),
            Some(other) => QueueSource::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub runtime: DatasetRuntime,
}

impl DatasetSnapshot {
    pub fn origin(&self) -> &str {
        &self.runtime.origin
    }

    pub fn is_dead_letter(&self) -> bool {
        self.id.starts_with(DEAD_LETTER_PREFIX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DatasetRuntime {
    #[serde(default, deserialize_with = "null_as_default")]
    pub origin: String,

    #[serde(rename = "count-index-deleted", default, deserialize_with = "null_as_default")]
    pub deleted_count: f64,

    #[serde(rename = "count-index-exists", default, deserialize_with = "null_as_default")]
    pub with_deleted_count: f64,

    #[serde(rename = "count-log-exists", default, deserialize_with = "null_as_default")]
    pub existed_count: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_pipe() {
        let pipe: PipeSnapshot = serde_json::from_value(json!({
            "_id": "orders",
            "storage": 2097152,
            "config": {"original": {"metadata": {"$config-group": "kafka"}}},
            "runtime": {
                "origin": "user",
                "queues": {"source": 4, "dependencies": {"customers": 1}},
                "success": true,
                "state": "running",
                "next-run": "2024-05-01T10:00:00Z"
            }
        }))
        .unwrap();

        assert_eq!(pipe.id, "orders");
        assert_eq!(pipe.storage_bytes, 2097152.0);
        assert_eq!(pipe.config_group_raw(), "kafka");
        assert_eq!(pipe.origin(), "user");
        assert_eq!(pipe.runtime.queues.source, QueueSource::Scalar(4.0));
        assert_eq!(pipe.runtime.queues.dependencies["customers"], 1.0);
        assert_eq!(pipe.runtime.success, Some(true));
        assert_eq!(pipe.runtime.next_run.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn sparse_pipe_uses_defaults() {
        let pipe: PipeSnapshot = serde_json::from_value(json!({"_id": "bare"})).unwrap();
        assert_eq!(pipe.storage_bytes, 0.0);
        assert_eq!(pipe.config_group_raw(), "");
        assert_eq!(pipe.runtime.queues.source, QueueSource::Empty);
        assert!(pipe.runtime.success.is_none());
        assert!(pipe.runtime.next_run.is_none());
    }

    #[test]
    fn null_fields_read_as_defaults() {
        let pipe: PipeSnapshot = serde_json::from_value(json!({
            "_id": "nulls",
            "storage": null,
            "config": {"original": {"metadata": {"$config-group": null}}},
            "runtime": {"origin": null, "state": null, "queues": {"dependencies": null}}
        }))
        .unwrap();
        assert_eq!(pipe.storage_bytes, 0.0);
        assert_eq!(pipe.config_group_raw(), "");
        assert_eq!(pipe.origin(), "");
        assert_eq!(pipe.runtime.state, "");
        assert!(pipe.runtime.queues.dependencies.is_empty());

        let dataset: DatasetSnapshot =
            serde_json::from_value(json!({"_id": "d", "runtime": null})).unwrap();
        assert_eq!(dataset.runtime, DatasetRuntime::default());
    }

    #[test]
    fn queue_source_variants() {
        let decode = |v: Value| -> QueueSource {
            let pipe: PipeSnapshot = serde_json::from_value(
                json!({"_id": "p", "runtime": {"queues": {"source": v}}}),
            )
            .unwrap();
            pipe.runtime.queues.source
        };

        assert_eq!(decode(Value::Null), QueueSource::Empty);
        assert_eq!(decode(json!(7)), QueueSource::Scalar(7.0));
        assert!(matches!(decode(json!({"a": 1, "b": 2})), QueueSource::Aggregate(m) if m.len() == 2));
        assert!(matches!(decode(json!("lots")), QueueSource::Malformed(_)));
        assert!(matches!(decode(json!([1, 2])), QueueSource::Malformed(_)));
    }

    #[test]
    fn decodes_dataset_counters() {
        let dataset: DatasetSnapshot = serde_json::from_value(json!({
            "_id": "system:dead-letter:orders",
            "runtime": {
                "origin": "system",
                "count-index-deleted": 3,
                "count-index-exists": 10,
                "count-log-exists": 12
            }
        }))
        .unwrap();

        assert!(dataset.is_dead_letter());
        assert_eq!(dataset.origin(), "system");
        assert_eq!(dataset.runtime.deleted_count, 3.0);
        assert_eq!(dataset.runtime.with_deleted_count, 10.0);
        assert_eq!(dataset.runtime.existed_count, 12.0);
    }
}
