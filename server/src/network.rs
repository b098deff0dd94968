//! Server network layer: the engine handle and its two worker threads.
//!
//! The receiver thread admits and updates players. The sender thread is
//! started by the receiver once somebody is connected; each tick it evicts
//! silent clients and sends exactly one packet to the next client in turn.
//! It exits by itself when the roster empties and is started again by the
//! next admission.

use crate::admission::Admissions;
use crate::broadcast::Broadcaster;
use crate::roster::SharedRoster;
use log::{debug, error, info, warn};
use shared::{
    ClientPacket, CodecError, StopFlag, Timing, TransportError, UdpEndpoint, Worker, WorkerError,
};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use thiserror::Error;

/// Room for the largest client packet plus any padding a peer adds.
const RECEIVE_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server needs room for at least one player")]
    ZeroCapacity,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddrV4,
    pub max_players: u16,
    pub timing: Timing,
}

impl ServerConfig {
    /// Wildcard bind on `port` with default timing.
    pub fn new(max_players: u16, port: u16) -> Self {
        Self {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
            max_players,
            timing: Timing::default(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}

type SenderWorker = Worker<Result<(), ServerError>>;

/// A running server engine.
///
/// Dropping it stops both threads; [`close`](Server::close) does the same
/// and reports the first fault either thread hit.
pub struct Server {
    roster: Arc<SharedRoster>,
    local_addr: SocketAddrV4,
    receiver: Worker<Result<(), ServerError>>,
}

impl Server {
    pub fn spawn(config: ServerConfig) -> Result<Self, ServerError> {
        if config.max_players == 0 {
            return Err(ServerError::ZeroCapacity);
        }

        info!("binding server socket to {}", config.bind_addr);
        let socket = Arc::new(UdpEndpoint::bind(
            config.bind_addr,
            config.timing.poll_timeout,
        )?);
        let local_addr = socket.local_addr();
        info!("server socket bound to {}", local_addr);

        let roster = Arc::new(SharedRoster::new(config.max_players));
        let stop = StopFlag::new();

        let receiver = Receiver {
            socket,
            roster: Arc::clone(&roster),
            timing: config.timing,
            stop: stop.clone(),
            admissions: Admissions::new(),
            sender: None,
        };
        let receiver = Worker::spawn("server-receiver", stop, move |_| receiver.run())?;

        Ok(Self {
            roster,
            local_addr,
            receiver,
        })
    }

    /// Convenience for the common setup: wildcard bind, default timing.
    pub fn spawn_on_port(max_players: u16, port: u16) -> Result<Self, ServerError> {
        Self::spawn(ServerConfig::new(max_players, port))
    }

    /// The roster shared with the engine threads.
    pub fn roster(&self) -> &Arc<SharedRoster> {
        &self.roster
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    /// False once the engine has stopped, normally only after a fault in
    /// either thread. A failed sender stops the receiver within one poll
    /// timeout.
    pub fn is_running(&self) -> bool {
        !self.receiver.is_finished()
    }

    /// Stops both threads, waits for them and returns the first fault.
    pub fn close(self) -> Result<(), ServerError> {
        info!("closing server on {}", self.local_addr);
        self.receiver.stop_and_join()?
    }
}

struct Receiver {
    socket: Arc<UdpEndpoint>,
    roster: Arc<SharedRoster>,
    timing: Timing,
    stop: StopFlag,
    admissions: Admissions,
    sender: Option<SenderWorker>,
}

impl Receiver {
    fn run(mut self) -> Result<(), ServerError> {
        info!("starting server receiver thread");

        let result = self.receive_loop();
        if let Err(e) = &result {
            error!("server receiver failed: {}", e);
        }

        let sender_result = match self.sender.take() {
            Some(sender) => sender.stop_and_join().map_err(ServerError::from).and_then(|r| r),
            None => Ok(()),
        };

        info!("stopping server receiver thread");
        result.and(sender_result)
    }

    fn receive_loop(&mut self) -> Result<(), ServerError> {
        let mut buf = [0u8; RECEIVE_BUFFER];

        while !self.stop.is_raised() {
            let Some((len, from)) = self.socket.recv_from(&mut buf)? else {
                debug!("receive loop timed out");
                continue;
            };
            debug!("> Received {} bytes from {}", len, from);

            let packet = match ClientPacket::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Dropping malformed packet from {}: {}", from, e);
                    continue;
                }
            };

            let admission = self
                .admissions
                .handle(&self.roster, packet, from, Instant::now());
            debug!(">>> {:?} from {}: {:?}", packet, from, admission);

            if admission.is_admitted() {
                self.ensure_sender()?;
            }
        }

        Ok(())
    }

    /// Starts a sender unless one is already broadcasting.
    fn ensure_sender(&mut self) -> Result<(), ServerError> {
        if !self.roster.lock().claim_broadcast() {
            return Ok(());
        }

        // A previous sender released its claim right before returning.
        if let Some(previous) = self.sender.take() {
            previous.join()??;
        }

        let sender = Sender {
            socket: Arc::clone(&self.socket),
            roster: Arc::clone(&self.roster),
            timing: self.timing,
            broadcaster: Broadcaster::new(self.roster.max()),
        };
        match Worker::spawn("server-sender", self.stop.clone(), move |stop| {
            sender.run(stop)
        }) {
            Ok(worker) => {
                self.sender = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.roster.lock().release_broadcast();
                Err(e.into())
            }
        }
    }
}

struct Sender {
    socket: Arc<UdpEndpoint>,
    roster: Arc<SharedRoster>,
    timing: Timing,
    broadcaster: Broadcaster,
}

impl Sender {
    fn run(mut self, stop: StopFlag) -> Result<(), ServerError> {
        info!("starting server sender thread");

        let result = self.send_loop(&stop);
        if let Err(e) = &result {
            error!("server sender failed: {}", e);
            self.roster.lock().release_broadcast();
            // Transport faults are fatal to the whole engine; the receiver
            // returns at its next wake-up and hands this error to `close`.
            stop.raise();
        }

        info!("stopping server sender thread");
        result
    }

    fn send_loop(&mut self, stop: &StopFlag) -> Result<(), ServerError> {
        while !stop.is_raised() {
            thread::sleep(self.timing.sender_interval);

            self.roster
                .evict_expired(Instant::now(), self.timing.disconnect_timeout);

            if self.roster.is_empty() {
                let mut rows = self.roster.lock();
                if rows.is_empty() {
                    rows.release_broadcast();
                    info!("All clients have disconnected");
                    return Ok(());
                }
            }

            let Some(dest) = self.broadcaster.prepare(&self.roster)? else {
                continue;
            };

            let packet = self.broadcaster.packet();
            if !self.socket.send_to(packet, dest)? {
                debug!("send loop timed out");
                continue;
            }
            debug!("< Sent {} bytes to {}", packet.len(), dest);
        }

        Ok(())
    }
}
