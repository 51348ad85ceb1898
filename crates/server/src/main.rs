// crates/server/src/main.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use docgate_core::{ServiceConfig, SofficeEngine};
use docgate_server::service::Service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docgate")]
#[command(about = "Document conversion job service", long_about = None)]
#[command(version)]
struct Args {
    /// Port to listen on (falls back to DOCGATE_PORT, then PORT, then 5000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Root directory for job storage (uploads and outputs)
    #[arg(long, default_value = "./tasks")]
    task_root: PathBuf,

    /// Skip refreshing fields and tables-of-contents before saving
    #[arg(long)]
    disable_refresh: bool,

    /// Skip the PDF rendition
    #[arg(long)]
    disable_pdf: bool,

    /// Delete upload partitions older than the retention horizon at startup
    #[arg(long)]
    delete_uploads: bool,

    /// Delete output partitions older than the retention horizon at startup
    #[arg(long)]
    delete_outputs: bool,

    /// Retention horizon in days for --delete-uploads / --delete-outputs
    #[arg(long, default_value_t = docgate_core::config::DEFAULT_RETENTION_DAYS)]
    retention_days: u32,

    /// Require this token in the X-Api-Token header on /convert and /files
    #[arg(long, env = "DOCGATE_API_TOKEN")]
    api_token: Option<String>,

    /// LibreOffice binary used for conversions
    #[arg(long, default_value = "soffice")]
    soffice: PathBuf,

    /// Per-conversion wall-clock limit in seconds; 0 disables the limit
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    /// Evict terminal job results older than this many seconds; 0 keeps them
    /// for the lifetime of the process
    #[arg(long, default_value_t = 0)]
    ledger_ttl_secs: u64,

    /// HTML file to serve at / and /docs instead of the built-in page
    #[arg(long)]
    docs_page: Option<PathBuf>,
}

fn resolve_port(cli: Option<u16>) -> u16 {
    if let Some(port) = cli {
        return port;
    }
    for var in ["DOCGATE_PORT", "PORT"] {
        if let Ok(value) = std::env::var(var) {
            match value.parse() {
                Ok(port) => return port,
                Err(_) => tracing::warn!(var, value, "ignoring unparseable port"),
            }
        }
    }
    docgate_core::config::DEFAULT_PORT
}

fn build_config(args: &Args) -> ServiceConfig {
    let mut config = ServiceConfig::new(&args.task_root);
    config.port = resolve_port(args.port);
    config.enable_refresh = !args.disable_refresh;
    config.enable_pdf = !args.disable_pdf;
    config.auto_delete_uploads = args.delete_uploads;
    config.auto_delete_outputs = args.delete_outputs;
    config.retention_days = args.retention_days;
    config.api_token = args.api_token.clone();
    config.conversion_timeout = match args.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    config.ledger_ttl = match args.ledger_ttl_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    config.docs_page = args.docs_page.clone();
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = build_config(&args);
    let engine = Arc::new(SofficeEngine::new(&args.soffice));

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        task_root = %config.task_root.display(),
        refresh = config.enable_refresh,
        pdf = config.enable_pdf,
        "starting docgate"
    );

    let mut service = Service::new(config, engine);
    let addr = service.start().await?;
    tracing::info!(%addr, "listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("received ctrl-c");
    service.stop().await;
    Ok(())
}
