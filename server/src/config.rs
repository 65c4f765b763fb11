use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use config::{Config, File as ConfigFile};

pub const ENV_PREFIX: &str = "CARDIO";
pub const DEFAULT_CONFIG_PATH: &str = "config/cardio.toml";

const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    pub model_name: String,
    pub model_hash: Option<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_batch_rows: usize,
    pub log_level: String,
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            models_dir: PathBuf::from("../models"),
            model_name: "model".to_string(),
            model_hash: None,
            upload_dir: PathBuf::from("."),
            max_upload_bytes: cardio_rpc::server::DEFAULT_MAX_UPLOAD_BYTES,
            max_batch_rows: cardio_rpc::server::DEFAULT_MAX_BATCH_ROWS,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} model={}/{} uploads={} limits={}B/{} rows",
            self.host,
            self.port,
            self.models_dir.display(),
            self.model_name,
            self.upload_dir.display(),
            self.max_upload_bytes,
            self.max_batch_rows
        )
    }
}

impl AppConfig {
    /// Layer the optional config file under `CARDIO_*` environment variables.
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            path.exists().then_some(path)
        };

        Self::load_from(resolved_path.as_deref(), ENV_PREFIX)
    }

    fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(ConfigFile::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix(env_prefix));
        let config = builder
            .build()
            .context("failed to assemble configuration")?;

        let defaults = Self::default();
        Ok(Self {
            host: get_string_value(&config, &["host", "server.host"]).unwrap_or(defaults.host),
            port: get_parsed_value(&config, &["port", "server.port"])?.unwrap_or(defaults.port),
            models_dir: get_string_value(&config, &["models_dir", "model.dir"])
                .map(PathBuf::from)
                .unwrap_or(defaults.models_dir),
            model_name: get_string_value(&config, &["model_name", "model.name"])
                .unwrap_or(defaults.model_name),
            model_hash: get_string_value(&config, &["model_hash", "model.hash"]),
            upload_dir: get_string_value(&config, &["upload_dir", "upload.dir"])
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: get_parsed_value(&config, &["max_upload_bytes", "upload.max_bytes"])?
                .unwrap_or(defaults.max_upload_bytes),
            max_batch_rows: get_parsed_value(&config, &["max_batch_rows", "upload.max_rows"])?
                .unwrap_or(defaults.max_batch_rows),
            log_level: get_string_value(&config, &["log_level", "log.level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(&config, &["log_format", "log.format"])
                .unwrap_or(defaults.log_format),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("HOST must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("PORT must be greater than zero");
        }
        if self.model_name.trim().is_empty() {
            anyhow::bail!("MODEL_NAME must not be empty");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }
        if self.max_batch_rows == 0 {
            anyhow::bail!("MAX_BATCH_ROWS must be greater than zero");
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            anyhow::bail!(
                "LOG_FORMAT must be one of {}, got '{}'",
                LOG_FORMATS.join(", "),
                self.log_format
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_parsed_value<T>(config: &Config, keys: &[&str]) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    keys.iter()
        .find_map(|key| get_string_value(config, &[*key]).map(|raw| (key, raw)))
        .map(|(key, raw)| {
            raw.parse::<T>()
                .with_context(|| format!("invalid value '{raw}' for {}", key.to_uppercase()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = AppConfig::load_from(None, "CARDIO_TEST_NOTHING_SET").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        config.validate().unwrap();
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            "port = 9100\nmodel_name = \"alt\"\nmax_batch_rows = 50\nlog_format = \"json\"\n",
        );
        let config = AppConfig::load_from(Some(file.path()), "CARDIO_TEST_FILE").unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.model_name, "alt");
        assert_eq!(config.max_batch_rows, 50);
        assert_eq!(config.log_format, "json");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn nested_tables_are_accepted() {
        let file = write_config("[server]\nport = 9200\n\n[model]\nname = \"nested\"\n");
        let config = AppConfig::load_from(Some(file.path()), "CARDIO_TEST_NESTED").unwrap();
        assert_eq!(config.port, 9200);
        assert_eq!(config.model_name, "nested");
    }

    #[test]
    fn environment_overrides_file() {
        let file = write_config("port = 9100\n");
        std::env::set_var("CARDIO_TEST_ENV_PORT", "9300");
        std::env::set_var("CARDIO_TEST_ENV_MODEL_HASH", "abc123");
        let config = AppConfig::load_from(Some(file.path()), "CARDIO_TEST_ENV").unwrap();
        std::env::remove_var("CARDIO_TEST_ENV_PORT");
        std::env::remove_var("CARDIO_TEST_ENV_MODEL_HASH");

        assert_eq!(config.port, 9300);
        assert_eq!(config.model_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn unparsable_numbers_are_reported() {
        let file = write_config("port = \"eighty\"\n");
        let err = AppConfig::load_from(Some(file.path()), "CARDIO_TEST_BAD").unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = AppConfig::default();

        let mut config = base.clone();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.model_name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.max_batch_rows = 0;
        assert!(config.validate().is_err());

        let mut config = base;
        config.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_sample_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = AppConfig::load_from(Some(&path), "CARDIO_TEST_SAMPLE").unwrap();
        config.validate().unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
