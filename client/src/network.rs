//! Client network layer: the engine handle and its two worker threads.
//!
//! The sender announces the session's current intent every tick (JOIN,
//! REJOIN or POSITION) without waiting for any acknowledgment. The receiver
//! applies ACCEPT and POSITIONS packets and treats a silent server as lost,
//! which turns the next announcements into REJOINs.

use crate::player::LocalPlayer;
use crate::session::{Session, SessionEvent, SessionState};
use log::{debug, error, info, warn};
use shared::{
    lock, CodecError, Player, ServerPacket, StopFlag, Timing, TransportError, UdpEndpoint,
    Worker, WorkerError,
};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use thiserror::Error;

/// Largest payload an IPv4 UDP datagram can carry.
const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_addr: SocketAddrV4,
    /// Local address to bind; port 0 lets the OS pick.
    pub bind_addr: SocketAddrV4,
    pub timing: Timing,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddrV4) -> Self {
        Self {
            server_addr,
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            timing: Timing::default(),
        }
    }

    /// Server on this machine at `port`.
    pub fn loopback(port: u16) -> Self {
        Self::new(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}

type LoopWorker = Worker<Result<(), ClientError>>;

/// A running client engine.
pub struct Client {
    session: Arc<Mutex<Session>>,
    local_player: LocalPlayer,
    local_addr: SocketAddrV4,
    sender: LoopWorker,
    receiver: LoopWorker,
}

impl Client {
    pub fn spawn(local_player: LocalPlayer, config: ClientConfig) -> Result<Self, ClientError> {
        info!("creating client socket for server {}", config.server_addr);
        let socket = Arc::new(UdpEndpoint::bind(
            config.bind_addr,
            config.timing.poll_timeout,
        )?);
        let local_addr = socket.local_addr();

        let session = Arc::new(Mutex::new(Session::new()));
        let stop = StopFlag::new();

        let sender = {
            let announcer = Announcer {
                socket: Arc::clone(&socket),
                server_addr: config.server_addr,
                timing: config.timing,
                session: Arc::clone(&session),
                local_player: local_player.clone(),
            };
            Worker::spawn("client-sender", stop.clone(), move |stop| announcer.run(stop))?
        };

        let listener = Listener {
            socket,
            server_addr: config.server_addr,
            timing: config.timing,
            session: Arc::clone(&session),
            local_player: local_player.clone(),
        };
        let receiver = match Worker::spawn("client-receiver", stop, move |stop| {
            listener.run(stop)
        }) {
            Ok(worker) => worker,
            Err(e) => {
                // Dropping the sender stops and joins it.
                drop(sender);
                return Err(e.into());
            }
        };

        Ok(Self {
            session,
            local_player,
            local_addr,
            sender,
            receiver,
        })
    }

    /// Loopback server at `port`, default timing.
    pub fn spawn_loopback(local_player: LocalPlayer, port: u16) -> Result<Self, ClientError> {
        Self::spawn(local_player, ClientConfig::loopback(port))
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    /// Latest roster snapshot received from the server.
    pub fn world(&self) -> Vec<Player> {
        lock(&self.session).world().to_vec()
    }

    pub fn local_player(&self) -> &LocalPlayer {
        &self.local_player
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    /// False once either loop has stopped, normally only after a fault.
    pub fn is_running(&self) -> bool {
        !self.sender.is_finished() && !self.receiver.is_finished()
    }

    /// Stops both loops, waits for them and returns the first fault.
    pub fn close(self) -> Result<(), ClientError> {
        info!("closing client on {}", self.local_addr);
        self.sender.stop();
        let sent = self.sender.join().map_err(ClientError::from).and_then(|r| r);
        let received = self
            .receiver
            .join()
            .map_err(ClientError::from)
            .and_then(|r| r);
        sent.and(received)
    }
}

/// Body of the sender thread.
struct Announcer {
    socket: Arc<UdpEndpoint>,
    server_addr: SocketAddrV4,
    timing: Timing,
    session: Arc<Mutex<Session>>,
    local_player: LocalPlayer,
}

impl Announcer {
    fn run(self, stop: StopFlag) -> Result<(), ClientError> {
        info!("starting client sender thread");
        let result = self.send_loop(&stop);
        if let Err(e) = &result {
            error!("client sender failed: {}", e);
        }
        info!("stopping client sender thread");
        result
    }

    fn send_loop(&self, stop: &StopFlag) -> Result<(), ClientError> {
        let mut buf = Vec::new();

        while !stop.is_raised() {
            thread::sleep(self.timing.sender_interval);

            let local = self.local_player.snapshot();
            let packet = lock(&self.session).outgoing(local);
            packet.encode_into(&mut buf)?;

            if !self.socket.send_to(&buf, self.server_addr)? {
                debug!("send loop timed out");
                continue;
            }
            debug!("<<< Sent {:?} ({} bytes) to {}", packet, buf.len(), self.server_addr);
        }

        Ok(())
    }
}

/// Body of the receiver thread.
struct Listener {
    socket: Arc<UdpEndpoint>,
    server_addr: SocketAddrV4,
    timing: Timing,
    session: Arc<Mutex<Session>>,
    local_player: LocalPlayer,
}

impl Listener {
    fn run(self, stop: StopFlag) -> Result<(), ClientError> {
        info!("starting client receiver thread");
        let result = self.receive_loop(&stop);
        if let Err(e) = &result {
            error!("client receiver failed: {}", e);
        }
        info!("stopping client receiver thread");
        result
    }

    fn receive_loop(&self, stop: &StopFlag) -> Result<(), ClientError> {
        let mut buf = vec![0u8; lock(&self.session).receive_capacity()];
        let mut last_heard = Instant::now();

        while !stop.is_raised() {
            let Some((len, from)) = self.socket.recv_from(&mut buf)? else {
                self.check_silence(&mut last_heard);
                continue;
            };

            if from != self.server_addr {
                debug!("Ignoring {} bytes from unknown peer {}", len, from);
                // Foreign traffic must not hide a silent server.
                self.check_silence(&mut last_heard);
                continue;
            }
            last_heard = Instant::now();
            debug!("> Received {} bytes from {}", len, from);

            let packet = match ServerPacket::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(CodecError::Truncated { .. }) if len == buf.len() => {
                    // The OS cut the datagram at our buffer, e.g. a restarted
                    // server with a larger roster. Make room for the next one.
                    let needed = ServerPacket::announced_len(&buf[..len])
                        .unwrap_or(MAX_DATAGRAM)
                        .min(MAX_DATAGRAM);
                    if needed > buf.len() {
                        info!("Growing receive buffer from {} to {} bytes", buf.len(), needed);
                        buf.resize(needed, 0);
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Dropping malformed packet from {}: {}", from, e);
                    continue;
                }
            };

            let mut session = lock(&self.session);
            match session.on_packet(packet) {
                SessionEvent::Accepted { id, .. } => {
                    self.local_player.set_id(id);
                    // POSITIONS for a full roster must fit from now on.
                    let capacity = session.receive_capacity();
                    if capacity > buf.len() {
                        buf.resize(capacity, 0);
                    }
                }
                SessionEvent::Snapshot { players } => {
                    debug!(">>> Received POSITIONS packet with {} players", players);
                }
                SessionEvent::UnexpectedAccept | SessionEvent::UnexpectedPositions => {}
            }
        }

        Ok(())
    }

    /// Moves a playing session to rejoining once the server has been silent
    /// for the disconnect timeout.
    fn check_silence(&self, last_heard: &mut Instant) {
        if last_heard.elapsed() < self.timing.disconnect_timeout {
            return;
        }
        if lock(&self.session).on_silence() {
            info!("No word from server for {:?}, rejoining", self.timing.disconnect_timeout);
        } else {
            debug!("receive loop timed out");
        }
        *last_heard = Instant::now();
    }
}
