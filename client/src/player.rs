use shared::{lock, Player, Position};
use std::sync::{Arc, Mutex};

/// The local player record, shared between the game loop (which moves it)
/// and the client engine (which reports it and learns its id).
///
/// Every access copies under a short lock, so the sender never reports a
/// half-written position.
#[derive(Debug, Clone, Default)]
pub struct LocalPlayer(Arc<Mutex<Player>>);

impl LocalPlayer {
    pub fn new(player: Player) -> Self {
        Self(Arc::new(Mutex::new(player)))
    }

    /// Copy of the whole record.
    pub fn snapshot(&self) -> Player {
        *lock(&self.0)
    }

    /// Server-assigned id; 0 until the server has accepted us.
    pub fn id(&self) -> u32 {
        lock(&self.0).id
    }

    pub fn position(&self) -> Position {
        lock(&self.0).position()
    }

    pub fn set_position(&self, position: Position) {
        lock(&self.0).set_position(position);
    }

    pub fn translate(&self, dx: i32, dy: i32) {
        lock(&self.0).translate(dx, dy);
    }

    pub(crate) fn set_id(&self, id: u32) {
        lock(&self.0).id = id;
    }
}
