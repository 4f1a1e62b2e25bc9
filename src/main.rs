//! Outreach - campaign audience targeting and multi-channel messaging

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outreach::{
    api::{build_router, AppState},
    config::{get_config_dir, get_data_dir, load_config, save_config, Config, LogFormat},
    db::init_database,
    domain::Channel,
    integrations::Transports,
    messaging::Dispatcher,
};

#[derive(Parser)]
#[command(name = "outreach")]
#[command(author = "Outreach Team")]
#[command(version = "0.1.0")]
#[command(about = "Campaign audience targeting and multi-channel messaging engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to <config dir>/outreach/config.toml)
    #[arg(short, long, env = "OUTREACH_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long, env = "OUTREACH_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "OUTREACH_PORT")]
    port: Option<u16>,

    /// Database path (defaults to <data dir>/outreach/outreach.db)
    #[arg(short, long, env = "OUTREACH_DATABASE")]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Initialize the database and write a default config file
    Init,
    /// Show configuration info
    Config,
    /// Run one dispatch batch for a channel and exit
    Dispatch {
        /// email or whatsapp
        #[arg(long)]
        channel: Channel,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref());
    init_tracing(config.log.format);

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(database) = &cli.database {
        config.database.path = Some(database.clone());
    }

    let db_path = config.database.get_path().to_string_lossy().to_string();

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing database at: {}", db_path);
            let _pool = init_database(&db_path).await?;

            let config_path = get_config_dir().join("config.toml");
            if !config_path.exists() {
                save_config(&config)?;
                println!("Wrote default config to: {}", config_path.display());
            }
            println!("Database initialized successfully!");
            Ok(())
        }
        Some(Commands::Config) => {
            let transports = Transports::from_config(&config).status();
            println!("Outreach Configuration");
            println!("======================");
            println!("Config directory: {}", get_config_dir().display());
            println!("Data directory: {}", get_data_dir().display());
            println!("Database path: {}", db_path);
            println!("Server: {}:{}", config.server.host, config.server.port);
            println!("Storefront: {}", config.storefront.base_url);
            println!("Email transport: {}", configured(transports.email));
            println!("WhatsApp transport: {}", configured(transports.whatsapp));
            Ok(())
        }
        Some(Commands::Dispatch { channel }) => run_dispatch(&config, &db_path, channel).await,
        Some(Commands::Serve) | None => run_server(config, &db_path).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "outreach=info,tower_http=debug".into());

    match format {
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn configured(flag: bool) -> &'static str {
    if flag {
        "configured"
    } else {
        "not configured"
    }
}

async fn run_server(config: Config, db_path: &str) -> anyhow::Result<()> {
    tracing::info!("Initializing database at: {}", db_path);
    let pool = init_database(db_path).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(pool, config);
    let transports = state.dispatcher.transports().status();
    let app = build_router(state);

    tracing::info!(
        email = transports.email,
        whatsapp = transports.whatsapp,
        "Starting server on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_dispatch(config: &Config, db_path: &str, channel: Channel) -> anyhow::Result<()> {
    let pool = init_database(db_path).await?;
    let dispatcher = Dispatcher::from_config(pool, Transports::from_config(config), config);

    let result = dispatcher.dispatch(channel).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
