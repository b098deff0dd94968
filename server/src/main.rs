use clap::Parser;
use log::{error, info};
use server::{Server, ServerConfig};
use shared::{Timing, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IPv4 address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: Ipv4Addr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "8")]
    max_players: u16,

    /// Delay between two sender ticks, in milliseconds
    #[arg(long, default_value = "35")]
    sender_interval: u64,

    /// Upper bound on each socket wait, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_timeout: u64,

    /// Silence after which a client is evicted, in milliseconds
    #[arg(long, default_value = "5000")]
    disconnect_timeout: u64,

    /// How often to log the roster, in seconds
    #[arg(long, default_value = "5")]
    report_every: u64,
}

/// Main-method of the application.
/// Parses command-line arguments, spawns the engine and logs the roster until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: SocketAddrV4::new(args.host, args.port),
        max_players: args.max_players,
        timing: Timing::from_millis(
            args.sender_interval,
            args.poll_timeout,
            args.disconnect_timeout,
        ),
    };

    let server = Server::spawn(config)?;
    info!(
        "Server listening on {} (max {} players)",
        server.local_addr(),
        args.max_players
    );

    let mut report = interval(Duration::from_secs(args.report_every.max(1)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = report.tick() => {
                if !server.is_running() {
                    error!("Server engine stopped unexpectedly");
                    break;
                }
                let players = server.roster().snapshot();
                info!("{} of {} players connected", players.len(), args.max_players);
                for player in players {
                    info!("  player {}: ({}, {})", player.id, player.x, player.y);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    // Closing joins OS threads; keep that off the async workers.
    tokio::task::spawn_blocking(move || server.close()).await??;

    Ok(())
}
