//! The server's authoritative table of connected players.
//!
//! This module handles the bookkeeping for every remote peer:
//! - Admission of new rows (JOIN and REJOIN) within a fixed capacity
//! - Position refresh from POSITION packets
//! - Eviction of peers that have been silent for too long
//!
//! A row is one player plus its session metadata. The four columns are kept
//! as parallel vectors indexed together; every operation that changes the
//! length touches all four at once, so a row's columns never drift apart.

use log::info;
use shared::{lock, Player, Position};
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Session state of a roster row.
///
/// Rejoining clients are admitted straight into `Playing`, so there is no
/// rejoining state on this side of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Admitted by JOIN, still waiting for its ACCEPT to land.
    Joining,
    /// Has sent at least one POSITION, or came back through REJOIN.
    Playing,
}

/// A row removed by [`Roster::evict_expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    pub player: Player,
    pub addr: SocketAddrV4,
}

/// Fixed-capacity roster with four aligned columns.
#[derive(Debug)]
pub struct Roster {
    max: u16,
    players: Vec<Player>,
    states: Vec<PeerState>,
    addrs: Vec<SocketAddrV4>,
    last_seen: Vec<Instant>,
}

impl Roster {
    /// Creates an empty roster with room for `max` rows.
    pub fn new(max: u16) -> Self {
        let capacity = usize::from(max);
        Self {
            max,
            players: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            addrs: Vec::with_capacity(capacity),
            last_seen: Vec::with_capacity(capacity),
        }
    }

    /// Capacity fixed at creation.
    pub fn max(&self) -> u16 {
        self.max
    }

    /// Number of occupied rows.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True when no client is connected.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// True when every row is taken and admissions must be refused.
    pub fn is_full(&self) -> bool {
        self.len() >= usize::from(self.max)
    }

    /// The player column, in storage order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Player stored at `row`.
    pub fn player(&self, row: usize) -> Option<&Player> {
        self.players.get(row)
    }

    /// Session state of the client at `row`.
    pub fn state(&self, row: usize) -> Option<PeerState> {
        self.states.get(row).copied()
    }

    /// Transport address of the client at `row`.
    pub fn addr(&self, row: usize) -> Option<SocketAddrV4> {
        self.addrs.get(row).copied()
    }

    /// When the client at `row` was last heard from.
    pub fn last_seen(&self, row: usize) -> Option<Instant> {
        self.last_seen.get(row).copied()
    }

    /// Finds the row of the client sending from `addr`.
    ///
    /// Addresses are unique across rows, so there is at most one match.
    pub fn find_by_addr(&self, addr: SocketAddrV4) -> Option<usize> {
        self.addrs.iter().position(|a| *a == addr)
    }

    /// Finds the row holding player `id`.
    pub fn find_by_id(&self, id: u32) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    /// Appends a row. Returns the row index, or `None` if the roster is full.
    pub fn insert(
        &mut self,
        player: Player,
        state: PeerState,
        addr: SocketAddrV4,
        now: Instant,
    ) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.players.push(player);
        self.states.push(state);
        self.addrs.push(addr);
        self.last_seen.push(now);
        Some(self.len() - 1)
    }

    /// Applies a POSITION from the peer at `row`: refreshes its timestamp,
    /// moves it to `Playing` and overwrites its position.
    pub fn touch(&mut self, row: usize, position: Position, now: Instant) -> bool {
        match self.players.get_mut(row) {
            Some(player) => {
                player.set_position(position);
                self.states[row] = PeerState::Playing;
                self.last_seen[row] = now;
                true
            }
            None => false,
        }
    }

    /// Removes `row` by moving the last row into its place.
    pub fn evict(&mut self, row: usize) -> Option<Evicted> {
        if row >= self.len() {
            return None;
        }
        let player = self.players.swap_remove(row);
        self.states.swap_remove(row);
        let addr = self.addrs.swap_remove(row);
        self.last_seen.swap_remove(row);
        Some(Evicted { player, addr })
    }

    /// Evicts every row silent for longer than `timeout` as of `now`.
    pub fn evict_expired(&mut self, now: Instant, timeout: Duration) -> Vec<Evicted> {
        let mut evicted = Vec::new();
        let mut row = 0;
        while row < self.len() {
            if now.saturating_duration_since(self.last_seen[row]) > timeout {
                // The swapped-in row lands at `row`, so check it again.
                evicted.extend(self.evict(row));
            } else {
                row += 1;
            }
        }
        evicted
    }
}

/// A [`Roster`] behind a mutex, plus a lock-free copy of its length.
///
/// The length copy only serves fast-path checks ("is anyone connected?",
/// "is the roster full?"). Anything acting on the answer must lock and check
/// again, since the other engine thread may change the roster in between.
///
/// The mutex also covers the "a sender is broadcasting" bit, so that the
/// sender's decision to exit on an empty roster and the receiver's decision
/// to start a sender after an admission cannot interleave.
#[derive(Debug)]
pub struct SharedRoster {
    len: AtomicU16,
    max: u16,
    broadcasting: AtomicBool,
    rows: Mutex<Roster>,
}

/// Lock guard that republishes the roster length when released.
pub struct RosterGuard<'a> {
    len: &'a AtomicU16,
    broadcasting: &'a AtomicBool,
    rows: MutexGuard<'a, Roster>,
}

impl RosterGuard<'_> {
    /// Marks a sender as running. Returns false if one already is.
    pub fn claim_broadcast(&mut self) -> bool {
        !self.broadcasting.swap(true, Ordering::AcqRel)
    }

    /// Marks the running sender as gone.
    pub fn release_broadcast(&mut self) {
        self.broadcasting.store(false, Ordering::Release);
    }

    /// True while a sender thread holds the claim.
    pub fn is_broadcasting(&self) -> bool {
        self.broadcasting.load(Ordering::Acquire)
    }
}

impl std::ops::Deref for RosterGuard<'_> {
    type Target = Roster;

    fn deref(&self) -> &Roster {
        &self.rows
    }
}

impl std::ops::DerefMut for RosterGuard<'_> {
    fn deref_mut(&mut self) -> &mut Roster {
        &mut self.rows
    }
}

impl Drop for RosterGuard<'_> {
    fn drop(&mut self) {
        // len <= max <= u16::MAX
        self.len.store(self.rows.len() as u16, Ordering::Release);
    }
}

impl SharedRoster {
    /// Creates an empty shared roster with room for `max` rows.
    pub fn new(max: u16) -> Self {
        Self {
            len: AtomicU16::new(0),
            max,
            broadcasting: AtomicBool::new(false),
            rows: Mutex::new(Roster::new(max)),
        }
    }

    /// Capacity fixed at creation. Needs no lock.
    pub fn max(&self) -> u16 {
        self.max
    }

    /// Unlocked read of the current length. May be stale by the time the
    /// caller acts on it.
    pub fn len(&self) -> u16 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the roster. The length copy is refreshed when the guard drops.
    pub fn lock(&self) -> RosterGuard<'_> {
        RosterGuard {
            len: &self.len,
            broadcasting: &self.broadcasting,
            rows: lock(&self.rows),
        }
    }

    /// Copy of every active player, in storage order.
    pub fn snapshot(&self) -> Vec<Player> {
        self.lock().players().to_vec()
    }

    /// Evicts silent rows under the lock, logging each one.
    pub fn evict_expired(&self, now: Instant, timeout: Duration) -> Vec<Evicted> {
        if self.is_empty() {
            return Vec::new();
        }
        let evicted = self.lock().evict_expired(now, timeout);
        for row in &evicted {
            info!("Client {} (player {}) has timed out", row.addr, row.player.id);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    fn filled(max: u16, rows: u16, now: Instant) -> Roster {
        let mut roster = Roster::new(max);
        for i in 0..rows {
            roster
                .insert(
                    Player::new(u32::from(i), 0, 0),
                    PeerState::Joining,
                    addr(9000 + i),
                    now,
                )
                .unwrap();
        }
        roster
    }

    #[test]
    fn test_roster_creation() {
        let roster = Roster::new(4);
        assert_eq!(roster.max(), 4);
        assert_eq!(roster.len(), 0);
        assert!(roster.is_empty());
        assert!(!roster.is_full());
    }

    #[test]
    fn test_insert_keeps_columns_aligned() {
        let now = Instant::now();
        let mut roster = Roster::new(2);

        let row = roster
            .insert(Player::new(7, 1, 2), PeerState::Playing, addr(9000), now)
            .unwrap();

        assert_eq!(row, 0);
        assert_eq!(roster.player(0), Some(&Player::new(7, 1, 2)));
        assert_eq!(roster.state(0), Some(PeerState::Playing));
        assert_eq!(roster.addr(0), Some(addr(9000)));
        assert_eq!(roster.last_seen(0), Some(now));
    }

    #[test]
    fn test_insert_respects_capacity() {
        let now = Instant::now();
        let mut roster = filled(2, 2, now);

        assert!(roster.is_full());
        assert_eq!(
            roster.insert(Player::new(9, 0, 0), PeerState::Joining, addr(1), now),
            None
        );
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_find_rows() {
        let roster = filled(3, 3, Instant::now());
        assert_eq!(roster.find_by_addr(addr(9001)), Some(1));
        assert_eq!(roster.find_by_addr(addr(1)), None);
        assert_eq!(roster.find_by_id(2), Some(2));
        assert_eq!(roster.find_by_id(42), None);
    }

    #[test]
    fn test_touch_updates_position_and_state() {
        let start = Instant::now();
        let mut roster = filled(1, 1, start);
        let later = start + Duration::from_millis(10);

        assert!(roster.touch(0, Position { x: 5, y: 7 }, later));
        assert_eq!(roster.player(0), Some(&Player::new(0, 5, 7)));
        assert_eq!(roster.state(0), Some(PeerState::Playing));
        assert_eq!(roster.last_seen(0), Some(later));

        assert!(!roster.touch(3, Position { x: 1, y: 1 }, later));
    }

    #[test]
    fn test_evict_swaps_last_row_in() {
        let mut roster = filled(3, 3, Instant::now());

        let evicted = roster.evict(0).unwrap();
        assert_eq!(evicted.player.id, 0);
        assert_eq!(evicted.addr, addr(9000));

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.player(0).unwrap().id, 2);
        assert_eq!(roster.addr(0), Some(addr(9002)));
        assert_eq!(roster.player(1).unwrap().id, 1);
        assert_eq!(roster.addr(1), Some(addr(9001)));

        assert_eq!(roster.evict(5), None);
    }

    #[test]
    fn test_evict_expired_removes_only_stale_rows() {
        let start = Instant::now();
        let timeout = Duration::from_secs(5);
        let mut roster = filled(3, 3, start);

        // Row 1 stays fresh.
        roster.touch(1, Position { x: 3, y: 4 }, start + Duration::from_secs(4));

        let evicted = roster.evict_expired(start + Duration::from_secs(6), timeout);
        let mut ids: Vec<u32> = evicted.iter().map(|e| e.player.id).collect();
        ids.sort();

        assert_eq!(ids, vec![0, 2]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.player(0), Some(&Player::new(1, 3, 4)));
        assert_eq!(roster.addr(0), Some(addr(9001)));
    }

    #[test]
    fn test_evict_expired_at_exact_timeout_keeps_row() {
        let start = Instant::now();
        let mut roster = filled(1, 1, start);
        let evicted = roster.evict_expired(start + Duration::from_secs(5), Duration::from_secs(5));
        assert!(evicted.is_empty());
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_eviction_of_one_row_leaves_others_intact() {
        let start = Instant::now();
        let refreshed = start + Duration::from_secs(10);
        let mut roster = filled(4, 4, start);
        for row in [0, 1, 3] {
            roster.touch(row, Position { x: 1, y: 1 }, refreshed);
        }

        let before: Vec<(u32, SocketAddrV4)> = (0..4)
            .filter(|&r| r != 2)
            .map(|r| (roster.player(r).unwrap().id, roster.addr(r).unwrap()))
            .collect();

        let evicted = roster.evict_expired(refreshed, Duration::from_secs(5));
        assert_eq!(evicted.len(), 1);
        assert_eq!(roster.len(), 3);

        for (id, a) in before {
            let row = roster.find_by_id(id).unwrap();
            assert_eq!(roster.addr(row), Some(a));
        }
    }

    #[test]
    fn test_shared_roster_publishes_len_on_unlock() {
        let shared = SharedRoster::new(2);
        assert_eq!(shared.max(), 2);
        assert!(shared.is_empty());

        {
            let mut rows = shared.lock();
            rows.insert(Player::new(0, 1, 1), PeerState::Joining, addr(1), Instant::now());
        }
        assert_eq!(shared.len(), 1);
        assert_eq!(shared.snapshot(), vec![Player::new(0, 1, 1)]);

        let evicted = shared.evict_expired(
            Instant::now() + Duration::from_secs(10),
            Duration::from_secs(5),
        );
        assert_eq!(evicted.len(), 1);
        assert_eq!(shared.len(), 0);
    }

    #[test]
    fn test_broadcast_claim_is_exclusive() {
        let shared = SharedRoster::new(1);
        let mut rows = shared.lock();
        assert!(!rows.is_broadcasting());
        assert!(rows.claim_broadcast());
        assert!(!rows.claim_broadcast());
        rows.release_broadcast();
        assert!(rows.claim_broadcast());
    }
}
