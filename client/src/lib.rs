//! # Player Sync Client
//!
//! The client side of the player synchronisation protocol. It owns one local
//! player, keeps announcing it to the server, and collects the roster
//! snapshots the server broadcasts back.
//!
//! ## Architecture Overview
//!
//! ### Heartbeat Announcements
//! A sender thread emits exactly one packet per short tick, chosen by the
//! session state: JOIN until accepted, POSITION while playing, REJOIN after
//! contact was lost. Nothing is acknowledged; the stream itself is the
//! heartbeat the server uses to keep the client alive.
//!
//! ### Silence Detection
//! A receiver thread applies ACCEPT and POSITIONS packets. If nothing arrives
//! from the server for the disconnect timeout, a playing client switches to
//! rejoining and keeps re-announcing its id and position until the server
//! broadcasts to it again.
//!
//! ### Shared Local Player
//! The game loop moves the local player through a [`LocalPlayer`] handle; the
//! sender copies it under a short lock every tick.
//!
//! ## Module Organization
//!
//! - `session` - the pure client state machine
//! - `player` - the [`LocalPlayer`] handle
//! - `network` - the [`Client`] handle and its worker threads
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{Client, LocalPlayer};
//! use shared::Position;
//!
//! let player = LocalPlayer::default();
//! let client = Client::spawn_loopback(player.clone(), 8080)?;
//!
//! // Game loop: move, then look at what the server last told us
//! player.set_position(Position { x: 10, y: 20 });
//! for other in client.world() {
//!     println!("player {} at ({}, {})", other.id, other.x, other.y);
//! }
//!
//! client.close()?;
//! # Ok::<(), client::ClientError>(())
//! ```

pub mod network;
pub mod player;
pub mod session;

pub use network::{Client, ClientConfig, ClientError};
pub use player::LocalPlayer;
pub use session::{Session, SessionEvent, SessionState};
