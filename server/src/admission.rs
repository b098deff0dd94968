//! Receiver-side handling of client packets.
//!
//! Turns JOIN, REJOIN and POSITION packets into roster changes. Nothing here
//! touches a socket, so the admission rules can be exercised directly.

use crate::roster::{PeerState, SharedRoster};
use log::{debug, info};
use shared::{ClientPacket, Player};
use std::net::SocketAddrV4;
use std::time::Instant;

/// Why a packet left the roster unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// JOIN or REJOIN while every row is taken.
    Full,
    /// JOIN or REJOIN from an address that already has a row.
    AlreadyJoined,
    /// REJOIN claiming an id that a different address holds.
    IdTaken,
    /// POSITION from an address with no row. Evicted peers have to REJOIN.
    UnknownAddress,
}

/// What one client packet did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Joined { id: u32 },
    Rejoined { id: u32 },
    Moved { id: u32 },
    Ignored(Rejection),
}

impl Admission {
    /// True if the packet added a row.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Joined { .. } | Admission::Rejoined { .. })
    }
}

/// Applies client packets to a roster and hands out player ids.
///
/// Ids come from a counter that only moves forward and skips any id a live
/// row still holds, so two rows never share an id.
#[derive(Debug, Default)]
pub struct Admissions {
    next_id: u32,
}

impl Admissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next JOIN will receive.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Applies one client packet from `from` received at `now` and reports
    /// what it did. Rejected packets leave the roster unchanged.
    pub fn handle(
        &mut self,
        roster: &SharedRoster,
        packet: ClientPacket,
        from: SocketAddrV4,
        now: Instant,
    ) -> Admission {
        match packet {
            ClientPacket::Join => self.join(roster, from, now),
            ClientPacket::Rejoin(player) => self.rejoin(roster, player, from, now),
            ClientPacket::Position(position) => {
                // Nobody to update; skip the lock.
                if roster.is_empty() {
                    return Admission::Ignored(Rejection::UnknownAddress);
                }
                let mut rows = roster.lock();
                match rows.find_by_addr(from) {
                    Some(row) => {
                        rows.touch(row, position, now);
                        let id = rows.player(row).map_or(0, |p| p.id);
                        debug!("Updated player {} position to ({}, {})", id, position.x, position.y);
                        Admission::Moved { id }
                    }
                    None => Admission::Ignored(Rejection::UnknownAddress),
                }
            }
        }
    }

    fn join(&mut self, roster: &SharedRoster, from: SocketAddrV4, now: Instant) -> Admission {
        if roster.len() >= roster.max() {
            info!("Client {} sent JOIN but server is full", from);
            return Admission::Ignored(Rejection::Full);
        }

        let mut rows = roster.lock();
        // Recheck: the sender may have changed the roster since the unlocked read.
        if rows.is_full() {
            info!("Client {} sent JOIN but server is full", from);
            return Admission::Ignored(Rejection::Full);
        }
        if rows.find_by_addr(from).is_some() {
            debug!("Client {} sent JOIN but has already joined", from);
            return Admission::Ignored(Rejection::AlreadyJoined);
        }

        // The counter can wrap after a REJOIN with a high id; skip ids still
        // in use. Terminates since the roster holds fewer than `max` rows.
        let mut id = self.next_id;
        while rows.find_by_id(id).is_some() {
            id = id.wrapping_add(1);
        }
        match rows.insert(Player::new(id, 0, 0), PeerState::Joining, from, now) {
            Some(_) => {
                self.next_id = id.wrapping_add(1);
                info!("Added player {} from {}", id, from);
                Admission::Joined { id }
            }
            None => Admission::Ignored(Rejection::Full),
        }
    }

    fn rejoin(
        &mut self,
        roster: &SharedRoster,
        player: Player,
        from: SocketAddrV4,
        now: Instant,
    ) -> Admission {
        if roster.len() >= roster.max() {
            info!("Client {} sent REJOIN but server is full", from);
            return Admission::Ignored(Rejection::Full);
        }

        let mut rows = roster.lock();
        if rows.is_full() {
            info!("Client {} sent REJOIN but server is full", from);
            return Admission::Ignored(Rejection::Full);
        }
        if let Some(row) = rows.find_by_id(player.id) {
            if rows.addr(row) == Some(from) {
                debug!("Client {} sent REJOIN and is already joined", from);
                return Admission::Ignored(Rejection::AlreadyJoined);
            }
            info!(
                "Client {} sent REJOIN for player {} which is joined from another address",
                from, player.id
            );
            return Admission::Ignored(Rejection::IdTaken);
        }
        if rows.find_by_addr(from).is_some() {
            info!("Client {} sent REJOIN under a new id but already has a row", from);
            return Admission::Ignored(Rejection::AlreadyJoined);
        }

        // Already acknowledged once, so no ACCEPT round: straight to playing.
        match rows.insert(player, PeerState::Playing, from, now) {
            Some(_) => {
                // Keep fresh ids clear of the one this client brought back.
                self.next_id = self.next_id.max(player.id.wrapping_add(1));
                info!("Rejoined player {} from {}", player.id, from);
                Admission::Rejoined { id: player.id }
            }
            None => Admission::Ignored(Rejection::Full),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Position;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    #[test]
    fn test_join_assigns_sequential_ids() {
        let roster = SharedRoster::new(3);
        let mut admissions = Admissions::new();
        let now = Instant::now();

        assert_eq!(
            admissions.handle(&roster, ClientPacket::Join, addr(1), now),
            Admission::Joined { id: 0 }
        );
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Join, addr(2), now),
            Admission::Joined { id: 1 }
        );
        assert_eq!(roster.len(), 2);

        let rows = roster.lock();
        assert_eq!(rows.player(0), Some(&Player::new(0, 0, 0)));
        assert_eq!(rows.state(0), Some(PeerState::Joining));
        assert_eq!(rows.addr(1), Some(addr(2)));
    }

    #[test]
    fn test_duplicate_join_is_noop() {
        let roster = SharedRoster::new(4);
        let mut admissions = Admissions::new();
        let now = Instant::now();

        admissions.handle(&roster, ClientPacket::Join, addr(1), now);
        let second = admissions.handle(&roster, ClientPacket::Join, addr(1), now);

        assert_eq!(second, Admission::Ignored(Rejection::AlreadyJoined));
        assert_eq!(roster.len(), 1);
        assert_eq!(admissions.next_id(), 1);
    }

    #[test]
    fn test_roster_never_exceeds_max() {
        let roster = SharedRoster::new(3);
        let mut admissions = Admissions::new();
        let now = Instant::now();

        for port in 1..20u16 {
            let packet = if port % 2 == 0 {
                ClientPacket::Join
            } else {
                ClientPacket::Rejoin(Player::new(1000 + u32::from(port), 1, 1))
            };
            admissions.handle(&roster, packet, addr(port), now);
            assert!(roster.len() <= roster.max());
        }

        assert_eq!(roster.len(), 3);
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Join, addr(100), now),
            Admission::Ignored(Rejection::Full)
        );
    }

    #[test]
    fn test_ids_stay_unique_across_rejoin_and_eviction() {
        let roster = SharedRoster::new(8);
        let mut admissions = Admissions::new();
        let now = Instant::now();

        admissions.handle(&roster, ClientPacket::Join, addr(1), now);
        // A client comes back with an id ahead of the counter.
        admissions.handle(
            &roster,
            ClientPacket::Rejoin(Player::new(5, 3, 3)),
            addr(2),
            now,
        );
        roster.lock().evict(0);
        for port in 3..8 {
            admissions.handle(&roster, ClientPacket::Join, addr(port), now);
        }

        let ids: Vec<u32> = roster.snapshot().iter().map(|p| p.id).collect();
        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(!ids.contains(&0));
        assert!(ids.contains(&6));
    }

    #[test]
    fn test_join_skips_live_ids_after_counter_wraps() {
        let roster = SharedRoster::new(4);
        let mut admissions = Admissions::new();
        let now = Instant::now();

        admissions.handle(&roster, ClientPacket::Join, addr(1), now);
        admissions.handle(
            &roster,
            ClientPacket::Rejoin(Player::new(u32::MAX - 1, 0, 0)),
            addr(2),
            now,
        );
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Join, addr(3), now),
            Admission::Joined { id: u32::MAX }
        );

        // Counter is back at 0, which addr(1) still holds.
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Join, addr(4), now),
            Admission::Joined { id: 1 }
        );
        assert_eq!(admissions.next_id(), 2);

        let ids: Vec<u32> = roster.snapshot().iter().map(|p| p.id).collect();
        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_rejoin_enters_playing_with_client_state() {
        let roster = SharedRoster::new(2);
        let mut admissions = Admissions::new();

        let result = admissions.handle(
            &roster,
            ClientPacket::Rejoin(Player::new(0, 12, 34)),
            addr(1),
            Instant::now(),
        );

        assert_eq!(result, Admission::Rejoined { id: 0 });
        let rows = roster.lock();
        assert_eq!(rows.player(0), Some(&Player::new(0, 12, 34)));
        assert_eq!(rows.state(0), Some(PeerState::Playing));
    }

    #[test]
    fn test_rejoin_rejections() {
        let roster = SharedRoster::new(4);
        let mut admissions = Admissions::new();
        let now = Instant::now();

        admissions.handle(&roster, ClientPacket::Join, addr(1), now);

        // Same id, same address.
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Rejoin(Player::new(0, 1, 1)), addr(1), now),
            Admission::Ignored(Rejection::AlreadyJoined)
        );
        // Same id, different address.
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Rejoin(Player::new(0, 1, 1)), addr(2), now),
            Admission::Ignored(Rejection::IdTaken)
        );
        // New id, address already in the roster.
        assert_eq!(
            admissions.handle(&roster, ClientPacket::Rejoin(Player::new(9, 1, 1)), addr(1), now),
            Admission::Ignored(Rejection::AlreadyJoined)
        );
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_position_moves_known_client_to_playing() {
        let roster = SharedRoster::new(2);
        let mut admissions = Admissions::new();
        let joined = Instant::now();
        admissions.handle(&roster, ClientPacket::Join, addr(1), joined);

        let later = joined + std::time::Duration::from_millis(50);
        let result = admissions.handle(
            &roster,
            ClientPacket::Position(Position { x: 5, y: 7 }),
            addr(1),
            later,
        );

        assert_eq!(result, Admission::Moved { id: 0 });
        let rows = roster.lock();
        assert_eq!(rows.player(0), Some(&Player::new(0, 5, 7)));
        assert_eq!(rows.state(0), Some(PeerState::Playing));
        assert_eq!(rows.last_seen(0), Some(later));
    }

    #[test]
    fn test_position_from_unknown_address_is_dropped() {
        let roster = SharedRoster::new(2);
        let mut admissions = Admissions::new();
        let now = Instant::now();
        let position = ClientPacket::Position(Position { x: 1, y: 1 });

        assert_eq!(
            admissions.handle(&roster, position, addr(1), now),
            Admission::Ignored(Rejection::UnknownAddress)
        );

        admissions.handle(&roster, ClientPacket::Join, addr(1), now);
        assert_eq!(
            admissions.handle(&roster, position, addr(2), now),
            Admission::Ignored(Rejection::UnknownAddress)
        );
        assert_eq!(roster.snapshot(), vec![Player::new(0, 0, 0)]);
    }

    #[test]
    fn test_is_admitted() {
        assert!(Admission::Joined { id: 1 }.is_admitted());
        assert!(Admission::Rejoined { id: 1 }.is_admitted());
        assert!(!Admission::Moved { id: 1 }.is_admitted());
        assert!(!Admission::Ignored(Rejection::Full).is_admitted());
    }
}
