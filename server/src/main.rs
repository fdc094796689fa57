use clap::Parser;
use log::{error, info};
use server::config::{EvictionConfig, ServerConfig};
use server::console::spawn_console;
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tank game state-synchronization server", long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// File that receives a `name ip` line per registration
    #[arg(long, default_value = server::client_log::DEFAULT_CLIENT_LOG)]
    client_log: PathBuf,

    /// Do not write the client log
    #[arg(long)]
    no_client_log: bool,

    /// Milliseconds to wait after a wake-up before draining the queue
    #[arg(long, default_value = "0")]
    reorder_window_ms: u64,

    /// Evict players that have been silent for this many seconds
    #[arg(long, conflicts_with = "max_send_failures")]
    idle_timeout_secs: Option<u64>,

    /// Evict players after this many consecutive failed sends
    #[arg(long)]
    max_send_failures: Option<u32>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let eviction = match (self.idle_timeout_secs, self.max_send_failures) {
            (Some(secs), _) => EvictionConfig::IdleTimeout(Duration::from_secs(secs)),
            (None, Some(limit)) => EvictionConfig::SendFailures(limit),
            (None, None) => EvictionConfig::Never,
        };

        ServerConfig {
            host: self.host,
            port: self.port,
            client_log: (!self.no_client_log).then_some(self.client_log),
            reorder_window: Duration::from_millis(self.reorder_window_ms),
            eviction,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let console_enabled = !args.no_console;
    let config = args.into_config();

    info!("Starting server...");
    if !config.reorder_window.is_zero() {
        info!("Reorder window: {:?}", config.reorder_window);
    }
    info!("Eviction policy: {:?}", config.eviction);

    let server = Server::bind(config).await?;

    if console_enabled {
        let ctx = server.context();
        let _console = spawn_console(ctx.stop, ctx.registry)?;
        info!("Console ready (type `help` for commands)");
    }

    {
        let stop = server.stop_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                stop.raise();
            }
        });
    }

    if let Err(e) = server.run().await {
        error!("Server stopped with error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
