//! # Player Sync Server
//!
//! The authoritative side of the player synchronisation protocol. It tracks a
//! small, fixed-capacity roster of connected players and keeps every client
//! informed of where everybody is.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! A client announces itself with JOIN and is given the next id from a
//! counter that never goes backwards. A client that lost contact comes back
//! with REJOIN, bringing its own id and position, and is placed directly into
//! play. Duplicate or conflicting announcements are ignored.
//!
//! ### Broadcast
//! Once somebody is connected a sender thread wakes up on a short fixed
//! interval and serves exactly one client per tick in round-robin order:
//! ACCEPT (max players, assigned id) while the client is joining, and a
//! POSITIONS snapshot of the entire roster once it plays.
//!
//! ### Eviction
//! Clients that have not sent anything for the disconnect timeout are
//! removed on the next sender tick. The sender stops when the roster empties
//! and is started again by the next admission.
//!
//! ## Architecture Design
//!
//! ### Threads
//! The engine runs on two OS threads: a receiver and a lazily started
//! sender. Both block only inside socket calls bounded by the poll timeout,
//! and both observe a shared stop flag every time they wake.
//!
//! ### Shared State
//! The roster is the only data both threads mutate. Its four columns
//! (player, state, address, last seen) sit behind one mutex; a lock-free
//! copy of the length serves fast-path checks, which are always confirmed
//! again under the lock before acting.
//!
//! ## Module Organization
//!
//! - `roster` - the four-column roster and its lock-guarded wrapper
//! - `admission` - JOIN / REJOIN / POSITION handling
//! - `broadcast` - round-robin choice and encoding of the next packet
//! - `network` - the [`Server`] handle and its worker threads
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerError};
//!
//! fn main() -> Result<(), ServerError> {
//!     // Wildcard bind on port 8080, room for 8 players
//!     let server = Server::spawn_on_port(8, 8080)?;
//!
//!     // The game layer reads the shared roster whenever it likes
//!     for player in server.roster().snapshot() {
//!         println!("player {} at ({}, {})", player.id, player.x, player.y);
//!     }
//!
//!     server.close()
//! }
//! ```

pub mod admission;
pub mod broadcast;
pub mod network;
pub mod roster;

pub use network::{Server, ServerConfig, ServerError};
pub use roster::{PeerState, SharedRoster};
