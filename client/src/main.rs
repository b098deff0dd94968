use clap::Parser;
use client::{Client, ClientConfig, LocalPlayer};
use log::{error, info};
use rand::Rng;
use shared::{Player, Timing};
use std::net::SocketAddrV4;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: SocketAddrV4,

    /// Largest step the simulated player takes per frame
    #[arg(long, default_value = "3")]
    max_step: i32,

    /// Delay between two sender ticks, in milliseconds
    #[arg(long, default_value = "35")]
    sender_interval: u64,

    /// Upper bound on each socket wait, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_timeout: u64,

    /// Server silence after which the client rejoins, in milliseconds
    #[arg(long, default_value = "5000")]
    disconnect_timeout: u64,
}

/// Stand-in for the game front end: moves the local player around at
/// 60 frames per second and logs what the server reports.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let config = ClientConfig::new(args.server).with_timing(Timing::from_millis(
        args.sender_interval,
        args.poll_timeout,
        args.disconnect_timeout,
    ));

    let player = LocalPlayer::new(Player::new(0, 400, 300));
    let client = Client::spawn(player.clone(), config)?;

    let mut frame = interval(Duration::from_millis(16));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(Duration::from_secs(2));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let step = args.max_step.max(0);
    let mut rng = rand::thread_rng();

    loop {
        tokio::select! {
            _ = frame.tick() => {
                player.translate(rng.gen_range(-step..=step), rng.gen_range(-step..=step));
            },

            _ = report.tick() => {
                if !client.is_running() {
                    error!("Client engine stopped unexpectedly");
                    break;
                }
                let me = player.snapshot();
                let world = client.world();
                info!(
                    "{:?} as player {} at ({}, {}); {} players in last snapshot",
                    client.state(), me.id, me.x, me.y, world.len()
                );
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    tokio::task::spawn_blocking(move || client.close()).await??;

    Ok(())
}
