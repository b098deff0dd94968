//! Client-side session state machine.
//!
//! ```text
//! Joining --ACCEPT--> Playing --silence--> Rejoining --POSITIONS--> Playing
//! ```
//!
//! The session decides what the sender announces each tick and how server
//! packets change the state. It does no I/O.

use log::{info, warn};
use shared::protocol::sizes;
use shared::{ClientPacket, Player, ServerPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Announcing JOIN until the server answers with ACCEPT.
    Joining,
    /// Lost contact; announcing REJOIN with the id we were given.
    Rejoining,
    /// Sending our position every tick.
    Playing,
}

/// What a server packet did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Accepted { id: u32, max_players: u16 },
    Snapshot { players: usize },
    /// ACCEPT while not joining.
    UnexpectedAccept,
    /// POSITIONS before we were accepted.
    UnexpectedPositions,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    max_players: Option<u16>,
    world: Vec<Player>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session, announcing JOIN.
    pub fn new() -> Self {
        Self {
            state: SessionState::Joining,
            max_players: None,
            world: Vec::new(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Roster capacity announced by the server, once accepted.
    pub fn max_players(&self) -> Option<u16> {
        self.max_players
    }

    /// Latest POSITIONS snapshot, in the server's storage order.
    pub fn world(&self) -> &[Player] {
        &self.world
    }

    /// Receive buffer size needed for the next server packet.
    pub fn receive_capacity(&self) -> usize {
        sizes::max_server_packet(self.max_players.unwrap_or(0))
    }

    /// The packet the sender should emit this tick for `local`.
    pub fn outgoing(&self, local: Player) -> ClientPacket {
        match self.state {
            SessionState::Joining => ClientPacket::Join,
            SessionState::Rejoining => ClientPacket::Rejoin(local),
            SessionState::Playing => ClientPacket::Position(local.position()),
        }
    }

    /// Applies a server packet.
    ///
    /// ACCEPT only counts while joining; POSITIONS only once accepted.
    /// Anything else is reported and leaves the session untouched.
    pub fn on_packet(&mut self, packet: ServerPacket) -> SessionEvent {
        match packet {
            ServerPacket::Accept {
                max_players,
                assigned_id,
            } => {
                if self.state != SessionState::Joining {
                    info!("Received ACCEPT packet but is not joining");
                    return SessionEvent::UnexpectedAccept;
                }
                self.max_players = Some(max_players);
                self.state = SessionState::Playing;
                info!(
                    "Accepted as player {} (server holds {} players)",
                    assigned_id, max_players
                );
                SessionEvent::Accepted {
                    id: assigned_id,
                    max_players,
                }
            }
            ServerPacket::Positions(players) => {
                if self.state == SessionState::Joining {
                    warn!("Received POSITIONS packet but is not playing or rejoining");
                    return SessionEvent::UnexpectedPositions;
                }
                if self.state == SessionState::Rejoining {
                    info!("Server resumed broadcasting, back to playing");
                }
                self.state = SessionState::Playing;
                let count = players.len();
                self.world = players;
                SessionEvent::Snapshot { players: count }
            }
        }
    }

    /// Called when the server has been silent for the disconnect timeout.
    /// Returns true if that moved the session to `Rejoining`.
    ///
    /// A joining client has no id to rejoin with and keeps joining.
    pub fn on_silence(&mut self) -> bool {
        if self.state == SessionState::Playing {
            self.state = SessionState::Rejoining;
            true
        } else {
            false
        }
    }
}
