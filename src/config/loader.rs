use crate::config::schema::ExporterConfig;
use crate::error::{Error, Result};
use config::{Environment, Source};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use validator::Validate;

/// Prefix for environment overrides, e.g. `SESAM_HOST`.
pub const ENV_PREFIX: &str = "SESAM";

/// Config files may hold the settings at the top level or nested under a
/// `SesamConfig` key, the layout of the secrets files deployments already have.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Nested {
        #[serde(rename = "SesamConfig")]
        sesam: ExporterConfig,
    },
    Flat(ExporterConfig),
}

impl From<ConfigFile> for ExporterConfig {
    fn from(file: ConfigFile) -> Self {
        match file {
            ConfigFile::Nested { sesam } => sesam,
            ConfigFile::Flat(config) => config,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the optional config file, applies `SESAM_*` overrides from the
    /// process environment and validates the result.
    pub fn load(path: Option<&Path>) -> Result<ExporterConfig> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<ExporterConfig> {
        let base = match path {
            Some(path) => Self::load_file(path)?,
            None => ExporterConfig::default(),
        };

        let config = Self::apply_env(base, &env)?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<ExporterConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let file: ConfigFile = serde_json::from_str(&content)?;
                Ok(file.into())
            }
            Some("yaml") | Some("yml") => {
                let file: ConfigFile = serde_yaml::from_str(&content)?;
                Ok(file.into())
            }
            Some("toml") => {
                let file: ConfigFile = toml::from_str(&content)?;
                Ok(file.into())
            }
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    fn apply_env(mut config: ExporterConfig, env: &Environment) -> Result<ExporterConfig> {
        for (key, value) in env.collect()? {
            match key.as_str() {
                "host" => config.host = value.into_string()?,
                "desc" => config.desc = value.into_string()?,
                "jwt" => config.jwt = value.into_string()?,
                "listen" => config.listen = value.into_string()?,
                "interval_secs" => {
                    let secs = value.into_int()?;
                    config.interval_secs = u64::try_from(secs).map_err(|_| {
                        Error::Config(format!("interval_secs must be positive, got {}", secs))
                    })?;
                }
                other => log::debug!("Ignoring unknown environment override '{}'", other),
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    fn write_config(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", ext))
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_json_file() {
        let file = write_config(
            "json",
            r#"{"host": "datahub-1.sesam.cloud", "desc": "Test", "jwt": "token"}"#,
        );
        let cfg = ConfigLoader::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(cfg.host, "datahub-1.sesam.cloud");
        assert_eq!(cfg.desc, "Test");
        assert_eq!(cfg.interval_secs, 60);
        assert_eq!(cfg.listen, "0.0.0.0:8080");
    }

    #[test]
    fn loads_settings_nested_under_sesam_config() {
        let file = write_config(
            "json",
            r#"{"SesamConfig": {"host": "datahub-1.sesam.cloud", "desc": "Nested", "jwt": "token"}}"#,
        );
        let cfg = ConfigLoader::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(cfg.host, "datahub-1.sesam.cloud");
        assert_eq!(cfg.desc, "Nested");
        assert_eq!(cfg.jwt, "token");

        let yaml = write_config("yaml", "SesamConfig:\n  host: a\n  desc: b\n  jwt: c\n");
        let cfg = ConfigLoader::load_with_env(Some(yaml.path()), env(&[])).unwrap();
        assert_eq!(cfg.host, "a");
    }

    #[test]
    fn loads_yaml_and_toml_files() {
        let yaml = write_config("yaml", "host: a\ndesc: b\njwt: c\ninterval_secs: 15\n");
        let cfg = ConfigLoader::load_with_env(Some(yaml.path()), env(&[])).unwrap();
        assert_eq!(cfg.interval_secs, 15);

        let toml = write_config("toml", "host = \"a\"\ndesc = \"b\"\njwt = \"c\"\n");
        let cfg = ConfigLoader::load_with_env(Some(toml.path()), env(&[])).unwrap();
        assert_eq!(cfg.jwt, "c");
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = write_config("json", r#"{"host": "file-host", "desc": "d", "jwt": "old"}"#);
        let cfg = ConfigLoader::load_with_env(
            Some(file.path()),
            env(&[("SESAM_JWT", "new"), ("SESAM_INTERVAL_SECS", "5")]),
        )
        .unwrap();
        assert_eq!(cfg.host, "file-host");
        assert_eq!(cfg.jwt, "new");
        assert_eq!(cfg.interval_secs, 5);
    }

    #[test]
    fn environment_alone_is_enough() {
        let cfg = ConfigLoader::load_with_env(
            None,
            env(&[("SESAM_HOST", "h"), ("SESAM_DESC", "d"), ("SESAM_JWT", "t")]),
        )
        .unwrap();
        assert_eq!(cfg.host, "h");
    }

    #[test]
    fn missing_jwt_fails_validation() {
        let file = write_config("json", r#"{"host": "h", "desc": "d"}"#);
        let err = ConfigLoader::load_with_env(Some(file.path()), env(&[])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = write_config("ini", "host=h");
        let err = ConfigLoader::load_with_env(Some(file.path()), env(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
