use super::{MetricKind, MetricSink};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
    pub kind: MetricKind,
}

impl Recorded {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every observation in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    recorded: Mutex<Vec<Recorded>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn named(&self, name: &str) -> Vec<Recorded> {
        self.recorded()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.recorded.lock() {
            guard.clear();
        }
    }
}

impl MetricSink for MemorySink {
    fn emit(&self, name: &str, labels: &[(&str, &str)], value: f64, kind: MetricKind) {
        let entry = Recorded {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
            kind,
        };
        match self.recorded.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(e) => log::error!("MemorySink lock poisoned: {}", e),
        }
    }
}
