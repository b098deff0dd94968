//! Round-robin selection of the next outgoing server packet.

use crate::roster::{PeerState, SharedRoster};
use shared::protocol::sizes;
use shared::{CodecError, ServerPacket};
use std::net::SocketAddrV4;

/// Picks one client per tick and encodes the packet it is owed: ACCEPT while
/// it is still joining, otherwise a POSITIONS snapshot of the whole roster.
#[derive(Debug)]
pub struct Broadcaster {
    max: u16,
    cursor: usize,
    packet: Vec<u8>,
}

impl Broadcaster {
    pub fn new(max: u16) -> Self {
        Self {
            max,
            cursor: 0,
            packet: Vec::with_capacity(sizes::max_server_packet(max)),
        }
    }

    /// Row the next call to [`prepare`](Self::prepare) will serve, before
    /// wrapping to the current roster length.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Encodes the packet for the next client in turn and returns its
    /// address, or `None` if the roster is empty.
    pub fn prepare(&mut self, roster: &SharedRoster) -> Result<Option<SocketAddrV4>, CodecError> {
        let rows = roster.lock();
        if rows.is_empty() {
            return Ok(None);
        }

        // Evictions may have shrunk the roster under the cursor.
        let row = self.cursor % rows.len();
        let (Some(state), Some(addr)) = (rows.state(row), rows.addr(row)) else {
            return Ok(None);
        };

        match state {
            PeerState::Joining => {
                let id = rows.player(row).map_or(0, |p| p.id);
                ServerPacket::encode_accept_into(self.max, id, &mut self.packet)?;
            }
            PeerState::Playing => {
                ServerPacket::encode_positions_into(rows.players(), &mut self.packet)?;
            }
        }

        self.cursor = (row + 1) % rows.len();
        Ok(Some(addr))
    }

    /// The packet encoded by the last successful [`prepare`](Self::prepare).
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Admissions;
    use shared::{ClientPacket, Player, Position};
    use std::net::Ipv4Addr;
    use std::time::Instant;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    fn next(broadcaster: &mut Broadcaster, roster: &SharedRoster) -> (SocketAddrV4, ServerPacket) {
        let dest = broadcaster.prepare(roster).unwrap().expect("a client to serve");
        (dest, ServerPacket::decode(broadcaster.packet()).unwrap())
    }

    #[test]
    fn test_empty_roster_sends_nothing() {
        let roster = SharedRoster::new(2);
        let mut broadcaster = Broadcaster::new(2);
        assert_eq!(broadcaster.prepare(&roster).unwrap(), None);
    }

    #[test]
    fn test_joining_client_gets_accept() {
        let roster = SharedRoster::new(2);
        let mut admissions = Admissions::new();
        let mut broadcaster = Broadcaster::new(2);
        admissions.handle(&roster, ClientPacket::Join, addr(1), Instant::now());

        let (dest, packet) = next(&mut broadcaster, &roster);
        assert_eq!(dest, addr(1));
        assert_eq!(
            packet,
            ServerPacket::Accept {
                max_players: 2,
                assigned_id: 0
            }
        );
    }

    #[test]
    fn test_playing_client_gets_positions() {
        let roster = SharedRoster::new(2);
        let mut admissions = Admissions::new();
        let mut broadcaster = Broadcaster::new(2);
        let now = Instant::now();
        admissions.handle(&roster, ClientPacket::Join, addr(1), now);
        admissions.handle(&roster, ClientPacket::Position(Position { x: 5, y: 7 }), addr(1), now);

        let (dest, packet) = next(&mut broadcaster, &roster);
        assert_eq!(dest, addr(1));
        assert_eq!(packet, ServerPacket::Positions(vec![Player::new(0, 5, 7)]));
    }

    #[test]
    fn test_round_robin_alternates_between_clients() {
        let roster = SharedRoster::new(2);
        let mut admissions = Admissions::new();
        let mut broadcaster = Broadcaster::new(2);
        let now = Instant::now();

        admissions.handle(&roster, ClientPacket::Join, addr(1), now);
        admissions.handle(&roster, ClientPacket::Position(Position { x: 5, y: 7 }), addr(1), now);
        admissions.handle(&roster, ClientPacket::Join, addr(2), now);

        for _ in 0..3 {
            let (dest, packet) = next(&mut broadcaster, &roster);
            assert_eq!(dest, addr(1));
            assert_eq!(
                packet,
                ServerPacket::Positions(vec![Player::new(0, 5, 7), Player::new(1, 0, 0)])
            );

            let (dest, packet) = next(&mut broadcaster, &roster);
            assert_eq!(dest, addr(2));
            assert_eq!(
                packet,
                ServerPacket::Accept {
                    max_players: 2,
                    assigned_id: 1
                }
            );
        }
    }

    #[test]
    fn test_cursor_wraps_after_eviction() {
        let roster = SharedRoster::new(3);
        let mut admissions = Admissions::new();
        let mut broadcaster = Broadcaster::new(3);
        let now = Instant::now();
        for port in 1..=3 {
            admissions.handle(&roster, ClientPacket::Join, addr(port), now);
        }

        next(&mut broadcaster, &roster);
        next(&mut broadcaster, &roster);
        assert_eq!(broadcaster.cursor(), 2);

        roster.lock().evict(2);
        roster.lock().evict(1);

        let (dest, _) = next(&mut broadcaster, &roster);
        assert_eq!(dest, addr(1));
    }
}
