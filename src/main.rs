use clap::{Parser, Subcommand};
use sesam_exporter::config::ConfigLoader;
use sesam_exporter::metrics::catalog::{EXPORTER_INFO, NAMESPACE};
use sesam_exporter::server::{self, AppState};
use sesam_exporter::{ApiClient, ExporterContext, MetricKind, MetricSink, Poller, PrometheusSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "sesam-exporter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Prometheus exporter for Sesam pipes and datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured host and serve metrics
    Run {
        /// Path to the configuration file (JSON/YAML/TOML); SESAM_* variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to serve /metrics on, overrides the config
        #[arg(short, long)]
        listen: Option<String>,

        /// Seconds to wait between scrape cycles, overrides the config
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    env_logger::Builder::from_default_env().init();

    match cli.command {
        Commands::Run {
            config,
            listen,
            interval,
        } => {
            log::info!("Loading config from {:?}", config);
            let cfg = ConfigLoader::load(config.as_deref())?;
            let listen = listen.unwrap_or_else(|| cfg.listen.clone());
            let interval = Duration::from_secs(interval.unwrap_or(cfg.interval_secs).max(1));
            log::info!("Starting with {} ({})", cfg.desc, cfg.host);

            let sink = Arc::new(PrometheusSink::new(NAMESPACE)?);
            sink.emit(
                EXPORTER_INFO,
                &[("host", cfg.host.as_str()), ("desc", cfg.desc.as_str())],
                1.0,
                MetricKind::Gauge,
            );

            let client = ApiClient::new(&cfg.host, &cfg.jwt, sink.clone())?;
            let context = Arc::new(ExporterContext {
                host: cfg.host.clone(),
                fetcher: Arc::new(client),
                sink: sink.clone(),
            });
            let mut poller = Poller::new(context, interval);

            let state = AppState {
                host: cfg.host.clone(),
                desc: cfg.desc.clone(),
                sink,
                reports: poller.watch_reports(),
            };
            let listener = TcpListener::bind(&listen).await?;

            tokio::select! {
                result = server::serve(listener, state) => result?,
                _ = poller.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutting down...");
                }
            }
        }
        Commands::Check { config } => match ConfigLoader::load(config.as_deref()) {
            Ok(cfg) => {
                println!("✅ Config is valid:");
                println!("   Host: {}", cfg.host);
                println!("   Description: {}", cfg.desc);
                println!("   Interval: {}s", cfg.interval_secs);
                println!("   Listen: {}", cfg.listen);
            }
            Err(e) => {
                eprintln!("❌ Config error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
