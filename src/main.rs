use clap::Parser;
use ooba_nim_proxy::config::config_search_paths;
use ooba_nim_proxy::{build_router, AppState, ProxyConfig, UpstreamClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "ooba-nim-proxy",
    about = "Serve the legacy Ooba text-generation API on top of NVIDIA NIM",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream base URL (overrides config and NVIDIA_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Upstream model id
    #[arg(long)]
    model: Option<String>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ooba_nim_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.upstream.base_url = base_url;
    }
    if let Some(model) = cli.model {
        config.upstream.model = model;
    }

    let upstream = UpstreamClient::new(&config)?;

    info!("ooba-nim-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", upstream.chat_url());
    info!("  Model:     {}", config.upstream.model);
    info!("  Timeout:   {}s", config.upstream.timeout_secs);

    if !upstream.has_api_key() {
        warn!(
            "Environment variable '{}' not set; upstream calls will be sent without credentials",
            config.upstream.api_key_env
        );
    }

    let bind_addr = config.bind_addr();
    let state = Arc::new(AppState { config, upstream });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
