use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[arg(short, long, default_value = "12345")]
    port: u16,
    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,
    /// Seconds of silence before a client is dropped (0 disables)
    #[arg(long, default_value = "10")]
    client_timeout: u64,
    /// Messages queued per client before a slow reader is dropped
    #[arg(long, default_value = "256")]
    outbound_queue: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            tick_rate: self.tick_rate,
            max_clients: self.max_clients,
            client_timeout: (self.client_timeout > 0)
                .then(|| Duration::from_secs(self.client_timeout)),
            outbound_queue: self.outbound_queue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let mut server = Server::bind(config).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
