//! Binary wire format.
//!
//! Every datagram starts with a one-byte tag. All multi-byte integers are
//! big-endian; bodies are written with bincode configured for fixed-width
//! big-endian integers, so a `Player` is exactly 12 bytes on the wire.
//!
//! | direction | tag | body | size |
//! |---|---|---|---|
//! | C2S | JOIN | none | 1 |
//! | C2S | REJOIN | id, x, y | 13 |
//! | C2S | POSITION | x, y | 9 |
//! | S2C | ACCEPT | max_players: u16, assigned_id: u32 | 7 |
//! | S2C | POSITIONS | count: u16, then `count` players | 3 + 12 * count |

use crate::error::CodecError;
use crate::Player;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Client to server tags.
pub mod c2s {
    pub const JOIN: u8 = 0;
    pub const REJOIN: u8 = 1;
    pub const POSITION: u8 = 2;
}

/// Server to client tags.
pub mod s2c {
    pub const ACCEPT: u8 = 0;
    pub const POSITIONS: u8 = 1;
}

/// Encoded sizes in bytes.
pub mod sizes {
    pub const TAG: usize = 1;
    pub const PLAYER: usize = 12;
    pub const POSITION: usize = 8;
    pub const COUNT: usize = 2;

    pub const JOIN_PACKET: usize = TAG;
    pub const REJOIN_PACKET: usize = TAG + PLAYER;
    pub const POSITION_PACKET: usize = TAG + POSITION;
    pub const ACCEPT_PACKET: usize = TAG + 2 + 4;
    pub const POSITIONS_HEADER: usize = TAG + COUNT;

    /// Largest client to server datagram.
    pub const MAX_CLIENT_PACKET: usize = REJOIN_PACKET;

    pub const fn positions_packet(count: usize) -> usize {
        POSITIONS_HEADER + PLAYER * count
    }

    /// Buffer size a peer needs to receive any server packet for a roster
    /// capped at `max_players`.
    pub const fn max_server_packet(max_players: u16) -> usize {
        let positions = positions_packet(max_players as usize);
        if positions > ACCEPT_PACKET {
            positions
        } else {
            ACCEPT_PACKET
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPacket {
    Join,
    Rejoin(Player),
    Position(Position),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    Accept { max_players: u16, assigned_id: u32 },
    Positions(Vec<Player>),
}

#[derive(Serialize, Deserialize)]
struct AcceptBody {
    max_players: u16,
    assigned_id: u32,
}

fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

fn write<T: Serialize>(buf: &mut Vec<u8>, value: &T) -> Result<(), CodecError> {
    wire().serialize_into(&mut *buf, value)?;
    Ok(())
}

/// Reads a fixed-size field from the front of `body`. Trailing bytes are
/// left to the caller.
fn read<T: DeserializeOwned>(body: &[u8], len: usize) -> Result<T, CodecError> {
    let field = body.get(..len).ok_or(CodecError::Truncated {
        expected: len,
        actual: body.len(),
    })?;
    Ok(wire().deserialize(field)?)
}

fn split_tag(bytes: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    bytes
        .split_first()
        .map(|(&tag, body)| (tag, body))
        .ok_or(CodecError::Empty)
}

impl ClientPacket {
    pub fn tag(&self) -> u8 {
        match self {
            ClientPacket::Join => c2s::JOIN,
            ClientPacket::Rejoin(_) => c2s::REJOIN,
            ClientPacket::Position(_) => c2s::POSITION,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            ClientPacket::Join => sizes::JOIN_PACKET,
            ClientPacket::Rejoin(_) => sizes::REJOIN_PACKET,
            ClientPacket::Position(_) => sizes::POSITION_PACKET,
        }
    }

    /// Replaces the contents of `buf` with the encoded packet.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        buf.clear();
        buf.push(self.tag());
        match self {
            ClientPacket::Join => Ok(()),
            ClientPacket::Rejoin(player) => write(buf, player),
            ClientPacket::Position(position) => write(buf, position),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (tag, body) = split_tag(bytes)?;
        match tag {
            c2s::JOIN => Ok(ClientPacket::Join),
            c2s::REJOIN => Ok(ClientPacket::Rejoin(read(body, sizes::PLAYER)?)),
            c2s::POSITION => Ok(ClientPacket::Position(read(body, sizes::POSITION)?)),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

impl ServerPacket {
    pub fn tag(&self) -> u8 {
        match self {
            ServerPacket::Accept { .. } => s2c::ACCEPT,
            ServerPacket::Positions(_) => s2c::POSITIONS,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            ServerPacket::Accept { .. } => sizes::ACCEPT_PACKET,
            ServerPacket::Positions(players) => sizes::positions_packet(players.len()),
        }
    }

    /// Writes an ACCEPT packet into `buf`, replacing its contents.
    pub fn encode_accept_into(
        max_players: u16,
        assigned_id: u32,
        buf: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        buf.clear();
        buf.push(s2c::ACCEPT);
        write(
            buf,
            &AcceptBody {
                max_players,
                assigned_id,
            },
        )
    }

    /// Writes a POSITIONS packet for `players` into `buf`, replacing its
    /// contents. Lets the server encode straight from its roster without
    /// building an intermediate `ServerPacket`.
    pub fn encode_positions_into(players: &[Player], buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let count =
            u16::try_from(players.len()).map_err(|_| CodecError::TooManyPlayers(players.len()))?;
        buf.clear();
        buf.reserve(sizes::positions_packet(players.len()));
        buf.push(s2c::POSITIONS);
        write(buf, &count)?;
        for player in players {
            write(buf, player)?;
        }
        Ok(())
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            ServerPacket::Accept {
                max_players,
                assigned_id,
            } => Self::encode_accept_into(*max_players, *assigned_id, buf),
            ServerPacket::Positions(players) => Self::encode_positions_into(players, buf),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Full length the packet starting at `bytes` claims, read from its
    /// header alone. `None` if the header is incomplete or the tag unknown.
    pub fn announced_len(bytes: &[u8]) -> Option<usize> {
        let (tag, body) = split_tag(bytes).ok()?;
        match tag {
            s2c::ACCEPT => Some(sizes::ACCEPT_PACKET),
            s2c::POSITIONS => {
                let count = read::<u16>(body, sizes::COUNT).ok()?;
                Some(sizes::positions_packet(usize::from(count)))
            }
            _ => None,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (tag, body) = split_tag(bytes)?;
        match tag {
            s2c::ACCEPT => {
                let accept: AcceptBody = read(body, sizes::ACCEPT_PACKET - sizes::TAG)?;
                Ok(ServerPacket::Accept {
                    max_players: accept.max_players,
                    assigned_id: accept.assigned_id,
                })
            }
            s2c::POSITIONS => {
                let count = usize::from(read::<u16>(body, sizes::COUNT)?);
                let records = &body[sizes::COUNT..];
                let expected = sizes::PLAYER * count;
                if records.len() < expected {
                    return Err(CodecError::Truncated {
                        expected,
                        actual: records.len(),
                    });
                }
                let players = records[..expected]
                    .chunks_exact(sizes::PLAYER)
                    .map(|record| read::<Player>(record, sizes::PLAYER))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ServerPacket::Positions(players))
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}
