//! Raw protocol probe: speaks the wire format directly against a running
//! server, without the client engine.

use shared::{ClientPacket, Position, ServerPacket, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

async fn receive(socket: &UdpSocket, buf: &mut [u8]) -> Option<ServerPacket> {
    match timeout(Duration::from_secs(2), socket.recv_from(buf)).await {
        Ok(Ok((len, addr))) => {
            println!("Received {} bytes from {}", len, addr);
            match ServerPacket::decode(&buf[..len]) {
                Ok(packet) => Some(packet),
                Err(e) => {
                    println!("Failed to decode server packet: {}", e);
                    None
                }
            }
        }
        Ok(Err(e)) => {
            println!("Error receiving: {}", e);
            None
        }
        Err(_) => {
            println!("No answer from server");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT))
        .parse()?;

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Probe socket bound to {}", socket.local_addr()?);

    let mut buf = [0u8; 2048];

    println!("Sending JOIN to {}", server_addr);
    socket.send_to(&ClientPacket::Join.encode()?, server_addr).await?;

    let id = match receive(&socket, &mut buf).await {
        Some(ServerPacket::Accept {
            max_players,
            assigned_id,
        }) => {
            println!("Accepted as player {} (server holds {} players)", assigned_id, max_players);
            assigned_id
        }
        Some(other) => {
            println!("Expected ACCEPT but got: {:?}", other);
            return Ok(());
        }
        None => return Ok(()),
    };

    // Walk diagonally and watch the snapshots come back
    for step in 0..10u32 {
        let position = Position {
            x: step * 10,
            y: step * 5,
        };
        println!("Sending POSITION ({}, {})", position.x, position.y);
        socket
            .send_to(&ClientPacket::Position(position).encode()?, server_addr)
            .await?;

        match receive(&socket, &mut buf).await {
            Some(ServerPacket::Positions(players)) => {
                println!("Snapshot with {} players", players.len());
                for p in players {
                    let marker = if p.id == id { " (me)" } else { "" };
                    println!("  player {}: ({}, {}){}", p.id, p.x, p.y, marker);
                }
            }
            Some(other) => println!("Unexpected packet: {:?}", other),
            None => {}
        }

        sleep(Duration::from_millis(200)).await;
    }

    println!("Probe finished; the server will evict it after its disconnect timeout");
    Ok(())
}
