use serde::{Deserialize, Serialize};
use validator::Validate;

/// Target platform plus the exporter's own runtime knobs.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExporterConfig {
    /// Remote host, e.g. `datahub-1234.sesam.cloud` or `http://127.0.0.1:9042`
    #[serde(default)]
    #[validate(length(min = 1, message = "missing variable 'host'"))]
    pub host: String,

    /// Human readable description of the target
    #[serde(default)]
    #[validate(length(min = 1, message = "missing variable 'desc'"))]
    pub desc: String,

    /// Bearer token for the remote API
    #[serde(default)]
    #[validate(length(min = 1, message = "missing variable 'jwt'"))]
    pub jwt: String,

    #[serde(default = "default_interval")]
    #[validate(range(min = 1))]
    pub interval_secs: u64,

    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            desc: String::new(),
            jwt: String::new(),
            interval_secs: default_interval(),
            listen: default_listen(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
