use std::time::Duration;

/// Port used by the demo binaries when none is given.
pub const DEFAULT_PORT: u16 = 8080;

/// Loop timing shared by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause between two sender ticks.
    pub sender_interval: Duration,
    /// Upper bound on every blocking socket wait. Loops observe their stop
    /// flag at least this often.
    pub poll_timeout: Duration,
    /// Silence after which a peer counts as gone.
    pub disconnect_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sender_interval: Duration::from_millis(35),
            poll_timeout: Duration::from_millis(1000),
            disconnect_timeout: Duration::from_millis(5000),
        }
    }
}

impl Timing {
    /// Builds a timing set from millisecond values, as given on the command line.
    pub fn from_millis(sender_interval: u64, poll_timeout: u64, disconnect_timeout: u64) -> Self {
        Self {
            sender_interval: Duration::from_millis(sender_interval),
            poll_timeout: Duration::from_millis(poll_timeout),
            disconnect_timeout: Duration::from_millis(disconnect_timeout),
        }
    }
}
