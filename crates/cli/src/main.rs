use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "wag", about = "wa-gateway — multi-tenant WhatsApp worker gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides `API_PORT`'s host component; the port
    /// itself is still `API_PORT` unless `--port` is also given).
    #[arg(long, global = true, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on (overrides `API_PORT`).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve,
    /// Print the resolved configuration (paths + settings) and exit.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wa-gateway starting");

    match cli.command {
        None | Some(Commands::Serve) => {
            let paths = wag_config::Paths::resolve();
            let mut settings = wag_config::GatewaySettings::from_env();
            if let Some(port) = cli.port {
                settings.api_port = port;
            }
            wag_gateway::server::serve(&cli.bind, paths, settings).await
        },
        Some(Commands::Config) => {
            let paths = wag_config::Paths::resolve();
            let settings = wag_config::GatewaySettings::from_env();
            println!("base_dir:      {}", paths.base_dir.display());
            println!("bin_path:      {}", paths.bin_path.display());
            println!("sessions_dir:  {}", paths.sessions_dir.display());
            println!("volumes_dir:   {}", paths.volumes_dir.display());
            println!("api_port:      {}", settings.api_port);
            println!("rate_limit:    {}/{:?}", settings.api_rate_limit, settings.api_rate_limit_window);
            println!("health_check:  {:?}", settings.health_check_interval);
            Ok(())
        },
    }
}
