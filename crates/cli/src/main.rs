mod config_commands;
mod normalize_commands;

use {
    clap::{Parser, Subcommand},
    switchboard_config::{Severity, SwitchboardConfig},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard: real-time messaging relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    // Gateway arguments (used when no subcommand is provided, or with `gateway` subcommand)
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/switchboard/).
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "SWITCHBOARD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Run a stored webhook payload through the normalizer.
    Normalize(normalize_commands::NormalizeArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Directory overrides must land before the config is discovered.
fn load_config(cli: &Cli) -> SwitchboardConfig {
    if let Some(ref dir) = cli.config_dir {
        switchboard_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        switchboard_config::set_data_dir(dir.clone());
    }
    switchboard_config::discover_and_load()
}

async fn run_gateway(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli);

    // CLI args override config values
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let report = switchboard_config::validate(&config);
    for d in &report.diagnostics {
        match d.severity {
            Severity::Warning => warn!(path = d.path, "{}", d.message),
            Severity::Error => error!(path = d.path, "{}", d.message),
        }
    }
    if report.has_errors() {
        anyhow::bail!(
            "configuration has {} error(s); run `switchboard config check`",
            report.count(Severity::Error)
        );
    }

    switchboard_gateway::server::start_gateway(config, cli.data_dir).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "switchboard starting");

    match cli.command {
        // Default: start gateway when no subcommand is provided
        None | Some(Commands::Gateway) => run_gateway(cli).await,
        Some(Commands::Normalize(ref args)) => normalize_commands::handle_normalize(args),
        Some(Commands::Config { ref action }) => {
            let config = load_config(&cli);
            config_commands::handle_config(action, &config)
        },
    }
}
