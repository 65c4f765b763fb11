use anyhow::{Context, Result};
use cardio_model::Classifier;
use cardio_rpc::AppState;
use clap::{value_parser, Arg, ArgAction, Command};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use crate::config::AppConfig;
use crate::version::{git_commit_hash, CARDIO_VERSION, SERVICE_NAME};

fn build_cli() -> Command {
    Command::new(SERVICE_NAME)
        .version(CARDIO_VERSION)
        .about("Heart-disease prediction service")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version and build commit, then exit")
                .global(true),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Address to bind the HTTP server on")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Port to bind the HTTP server on")
                .global(true),
        )
        .arg(
            Arg::new("models-dir")
                .long("models-dir")
                .value_name("DIR")
                .help("Directory holding model artifacts")
                .global(true),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_name("NAME")
                .help("Model artifact name, with or without the .json extension")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .subcommand(Command::new("start").about("Load the model and serve predictions (default)"))
        .subcommand(
            Command::new("check")
                .about("Load and validate the configured model, print a summary, then exit"),
        )
        .subcommand(Command::new("hash").about("Print the canonical hash of the model artifact"))
        .subcommand(Command::new("status").about("Query /health on a running server"))
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }

    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    if let Some(models_dir) = matches.get_one::<String>("models-dir") {
        config.models_dir = models_dir.into();
    }

    if let Some(model) = matches.get_one::<String>("model") {
        config.model_name = model.clone();
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("failed to install log subscriber")?;
    }

    Ok(())
}

fn load_classifier(config: &AppConfig) -> Result<Classifier> {
    let path = Classifier::artifact_path(&config.models_dir, &config.model_name);
    Classifier::load(
        &config.models_dir,
        &config.model_name,
        config.model_hash.as_deref(),
    )
    .with_context(|| format!("failed to load model artifact {}", path.display()))
}

fn print_version_info() {
    println!("{SERVICE_NAME} {CARDIO_VERSION} (commit {})", git_commit_hash());
}

fn print_model_summary(classifier: &Classifier) {
    println!("model:    {}", classifier.name());
    println!("hash:     {}", classifier.hash_hex());
    println!("classes:  {}", classifier.classes().join(", "));
    println!("features: {}", classifier.feature_names().join(", "));
}

async fn check_status(config: &AppConfig) -> Result<()> {
    let url = format!("http://{}/health", config.bind_addr());
    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting {SERVICE_NAME} {CARDIO_VERSION} (commit {})", git_commit_hash());
    info!("Configuration: {config}");

    let classifier = load_classifier(&config)?;
    if config.model_hash.is_none() {
        warn!(
            "MODEL_HASH is not pinned; serving unverified artifact {}",
            classifier.hash_hex()
        );
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create upload directory {}",
                config.upload_dir.display()
            )
        })?;

    let state = AppState::new(classifier, config.upload_dir.clone())
        .with_limits(config.max_upload_bytes, config.max_batch_rows)
        .with_service_name(SERVICE_NAME);

    cardio_rpc::start_server(state, &config.bind_addr()).await?;
    info!("{SERVICE_NAME} stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.get_flag("version_flag") {
        print_version_info();
        return Ok(());
    }

    let config = load_config_with_overrides(&matches)?;

    match matches.subcommand() {
        Some(("check", _)) => {
            init_logging(&config)?;
            let classifier = load_classifier(&config)?;
            print_model_summary(&classifier);
            Ok(())
        }
        Some(("hash", _)) => {
            let classifier = load_classifier(&config)?;
            println!("{}", classifier.hash_hex());
            Ok(())
        }
        Some(("status", _)) => check_status(&config).await,
        _ => {
            init_logging(&config)?;
            serve(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let matches = build_cli().get_matches_from([
            "cardio-server",
            "--port",
            "9001",
            "--model",
            "other.json",
            "--log-format",
            "json",
            "start",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&matches, &mut config);

        assert_eq!(config.port, 9001);
        assert_eq!(config.model_name, "other.json");
        assert_eq!(config.log_format, "json");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let matches =
            build_cli().get_matches_from(["cardio-server", "check", "--models-dir", "/srv/models"]);
        let mut config = AppConfig::default();
        apply_overrides(&matches, &mut config);
        assert_eq!(config.models_dir, std::path::PathBuf::from("/srv/models"));
    }

    #[test]
    fn shipped_model_loads_through_config() {
        let config = AppConfig {
            models_dir: std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../models"),
            ..AppConfig::default()
        };
        let classifier = load_classifier(&config).unwrap();
        assert_eq!(classifier.classes(), ["0", "1"]);
    }

    #[test]
    fn pinned_hash_mismatch_fails_to_load() {
        let config = AppConfig {
            models_dir: std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../models"),
            model_hash: Some("00".repeat(32)),
            ..AppConfig::default()
        };
        let err = load_classifier(&config).unwrap_err();
        assert!(err.to_string().contains("failed to load model artifact"));
    }
}
