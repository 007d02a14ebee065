use clap::Parser;
use client::input::InputManager;
use client::network::{Client, ClientConfig};
use client::rendering::Renderer;
use log::{error, info, warn};
use macroquad::window::{next_frame, Conf};
use shared::{WORLD_HEIGHT, WORLD_WIDTH};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Seconds to wait for the server to assign a player
    #[arg(long, default_value = "5")]
    handshake_timeout: u64,

    /// Hide the status overlay
    #[arg(long)]
    hide_hud: bool,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Skirmish".to_owned(),
        window_width: WORLD_WIDTH as i32,
        window_height: WORLD_HEIGHT as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("{}", e);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = ClientConfig {
        server_addr: args.server,
        handshake_timeout: Duration::from_secs(args.handshake_timeout),
    };

    // macroquad owns the main thread, so the network tasks get their own runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let mut client = runtime.block_on(Client::connect(config))?;

    info!("Controls: WASD/arrows to move, mouse to aim, click/Space to fire, R to resync");

    let mut input = InputManager::new();
    let mut renderer = Renderer::new().with_hud(!args.hide_hud);

    loop {
        if input.take_resync_request() {
            client.request_snapshot()?;
        }

        if let Err(e) = client.run_frame(&mut input, &mut renderer) {
            warn!("Stopping: {}", e);
            break;
        }

        next_frame().await;
    }

    Ok(())
}
