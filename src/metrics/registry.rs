use super::catalog::{MetricDescriptor, CATALOG};
use super::{MetricKind, MetricSink};
use crate::error::{Error, Result};
use prometheus::core::Collector;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

/// Prometheus-backed sink. Every family in the catalog is registered up
/// front; gauges keep their last value until overwritten or retained away.
pub struct PrometheusSink {
    registry: Registry,
    families: HashMap<&'static str, (&'static MetricDescriptor, Family)>,
}

impl PrometheusSink {
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Registry::new();
        let mut families = HashMap::new();

        for descriptor in CATALOG {
            let opts = Opts::new(descriptor.name, descriptor.help).namespace(namespace);
            let family = match descriptor.kind {
                MetricKind::Gauge => {
                    let vec = GaugeVec::new(opts, descriptor.labels)?;
                    registry.register(Box::new(vec.clone()))?;
                    Family::Gauge(vec)
                }
                MetricKind::Counter => {
                    let vec = CounterVec::new(opts, descriptor.labels)?;
                    registry.register(Box::new(vec.clone()))?;
                    Family::Counter(vec)
                }
            };
            families.insert(descriptor.name, (descriptor, family));
        }

        Ok(Self { registry, families })
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

impl MetricSink for PrometheusSink {
    fn emit(&self, name: &str, labels: &[(&str, &str)], value: f64, kind: MetricKind) {
        let Some((descriptor, family)) = self.families.get(name) else {
            log::warn!("Dropping observation for unknown metric '{}'", name);
            return;
        };

        let values = label_values(descriptor, labels);

        match (family, kind) {
            (Family::Gauge(vec), MetricKind::Gauge) => {
                match vec.get_metric_with_label_values(&values) {
                    Ok(gauge) => gauge.set(value),
                    Err(e) => log::warn!("Failed to set {}: {}", name, e),
                }
            }
            (Family::Counter(vec), MetricKind::Counter) => {
                if value < 0.0 {
                    log::warn!("Ignoring negative increment {} for counter {}", value, name);
                    return;
                }
                match vec.get_metric_with_label_values(&values) {
                    Ok(counter) => counter.inc_by(value),
                    Err(e) => log::warn!("Failed to increment {}: {}", name, e),
                }
            }
            _ => log::warn!(
                "Metric '{}' emitted as {:?} but registered as {:?}",
                name,
                kind,
                descriptor.kind
            ),
        }
    }

    fn retain(&self, name: &str, keep: &[Vec<(&str, &str)>]) {
        let Some((descriptor, Family::Gauge(vec))) = self.families.get(name) else {
            log::warn!("Cannot retain series of '{}': not a registered gauge", name);
            return;
        };

        let keep: HashSet<Vec<&str>> = keep
            .iter()
            .map(|labels| label_values(descriptor, labels))
            .collect();

        for family in vec.collect() {
            for metric in family.get_metric() {
                let pairs: Vec<(&str, &str)> = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name(), pair.get_value()))
                    .collect();
                let values = label_values(descriptor, &pairs);
                if keep.contains(&values) {
                    continue;
                }
                log::debug!("Dropping vanished series {}{:?}", name, values);
                if let Err(e) = vec.remove_label_values(&values) {
                    log::warn!("Failed to drop series of {}: {}", name, e);
                }
            }
        }
    }
}

/// Label values in registration order; a missing label is exported empty.
fn label_values<'a>(descriptor: &MetricDescriptor, labels: &[(&str, &'a str)]) -> Vec<&'a str> {
    descriptor
        .labels
        .iter()
        .map(|label| {
            labels
                .iter()
                .find(|(key, _)| key == label)
                .map(|(_, value)| *value)
                .unwrap_or("")
        })
        .collect()
}
