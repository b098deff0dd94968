//! Types and plumbing shared by the server and client engines: the player
//! record, the wire protocol, the UDP transport wrapper and the worker
//! thread primitives both engines run their loops on.

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use config::{Timing, DEFAULT_PORT};
pub use error::{CodecError, TransportError, WorkerError};
pub use protocol::{ClientPacket, Position, ServerPacket};
pub use transport::UdpEndpoint;
pub use worker::{lock, StopFlag, Worker};

/// A participant and its last-known position.
///
/// Positions are plain unsigned integers; this layer performs no bounds
/// checking and arithmetic on them is expected to wrap.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Player {
    pub id: u32,
    pub x: u32,
    pub y: u32,
}

impl Player {
    pub fn new(id: u32, x: u32, y: u32) -> Self {
        Self { id, x, y }
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }

    pub fn set_position(&mut self, position: Position) {
        self.x = position.x;
        self.y = position.y;
    }

    /// Moves the player by a signed offset, wrapping at the `u32` boundary.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.x = self.x.wrapping_add_signed(dx);
        self.y = self.y.wrapping_add_signed(dy);
    }
}
