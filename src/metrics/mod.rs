//! The metric sink seam between the polling core and whatever stores the
//! resulting time series.

pub mod catalog;
pub mod memory;
pub mod registry;

pub use memory::{MemorySink, Recorded};
pub use registry::PrometheusSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Consumes `(name, labels, value, kind)` tuples.
///
/// For a gauge `value` is the new reading; for a counter it is the increment.
pub trait MetricSink: Send + Sync {
    fn emit(&self, name: &str, labels: &[(&str, &str)], value: f64, kind: MetricKind);

    /// Drops every series of gauge `name` whose label set is not in `keep`.
    /// Sinks that hold no series state can ignore it.
    fn retain(&self, _name: &str, _keep: &[Vec<(&str, &str)>]) {}
}

/// One emitted fact, owned so it can cross a channel between tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: &'static str,
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
    pub kind: MetricKind,
}

impl Observation {
    pub fn gauge(name: &'static str, labels: Vec<(&'static str, String)>, value: f64) -> Self {
        Self {
            name,
            labels,
            value,
            kind: MetricKind::Gauge,
        }
    }

    pub fn counter(name: &'static str, labels: Vec<(&'static str, String)>, value: f64) -> Self {
        Self {
            name,
            labels,
            value,
            kind: MetricKind::Counter,
        }
    }

    pub fn emit_to(&self, sink: &dyn MetricSink) {
        let labels: Vec<(&str, &str)> = self
            .labels
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        sink.emit(self.name, &labels, self.value, self.kind);
    }
}
