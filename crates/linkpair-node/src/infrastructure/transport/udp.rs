//! UDP broadcast emulation of a connectionless MAC-addressed radio link.
//!
//! Every node on the LAN binds the same UDP port (`base_port + channel`) with
//! address reuse enabled and sends every frame to the configured broadcast
//! IP.  A frame carries the link-level destination and source addresses in
//! front of the payload:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────┐
//! │ dst MAC (6)  │ src MAC (6)  │ payload (0..=250)    │
//! └──────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! Receivers keep frames addressed to them or to FF:FF:FF:FF:FF:FF and drop
//! their own echoes, so unicast and broadcast behave like they do on the
//! air.  Different channels map to different ports and never hear each other.
//!
//! # Threads
//!
//! `init` spawns two background threads:
//!
//! - `linkpair-rx` blocks on the socket with a 500 ms read timeout, checking
//!   the running flag on every timeout, and delivers receive notifications.
//! - `linkpair-tx-status` delivers send-completion notifications queued by
//!   `send`, so completions never run inside the caller's `send`.
//!
//! Both exit once the transport is dropped.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use linkpair_core::protocol::address::MAC_LEN;
use linkpair_core::MacAddress;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::transport::{
    PeerInfo, SendStatus, Transport, TransportError, TransportObserver,
};

/// Bytes of link header in front of every payload.
pub const FRAME_HEADER_LEN: usize = 2 * MAC_LEN;

/// Largest payload one frame may carry.
pub const MAX_FRAME_PAYLOAD: usize = 250;

/// Default first port; channel `n` uses `DEFAULT_BASE_PORT + n`.
pub const DEFAULT_BASE_PORT: u16 = 47_000;

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Error returned when a datagram cannot be parsed as a link frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UdpFrameError {
    #[error("datagram of {0} bytes is shorter than the 12-byte header")]
    TooShort(usize),
}

/// A parsed link frame borrowing its payload from the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpFrame<'a> {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub payload: &'a [u8],
}

/// Builds the datagram for one frame.
pub fn encode_frame(destination: MacAddress, source: MacAddress, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    datagram.extend_from_slice(&destination.octets());
    datagram.extend_from_slice(&source.octets());
    datagram.extend_from_slice(payload);
    datagram
}

/// Splits a datagram into header addresses and payload.
///
/// # Errors
///
/// Returns [`UdpFrameError::TooShort`] if the header is incomplete.
pub fn decode_frame(datagram: &[u8]) -> Result<UdpFrame<'_>, UdpFrameError> {
    if datagram.len() < FRAME_HEADER_LEN {
        return Err(UdpFrameError::TooShort(datagram.len()));
    }
    let mut destination = [0u8; MAC_LEN];
    let mut source = [0u8; MAC_LEN];
    destination.copy_from_slice(&datagram[..MAC_LEN]);
    source.copy_from_slice(&datagram[MAC_LEN..FRAME_HEADER_LEN]);
    Ok(UdpFrame {
        destination: MacAddress::new(destination),
        source: MacAddress::new(source),
        payload: &datagram[FRAME_HEADER_LEN..],
    })
}

/// Receive filter: drops our own echoes and frames unicast to another
/// station, keeps broadcast frames and frames addressed to `local`.
pub fn accepts(frame: &UdpFrame<'_>, local: MacAddress) -> bool {
    if frame.source == local {
        return false;
    }
    frame.destination.is_broadcast() || frame.destination == local
}

/// Settings for a [`UdpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpTransportConfig {
    /// This node's link address.
    pub local: MacAddress,
    /// Interface address to bind.
    pub bind_address: IpAddr,
    /// Destination IP for every frame.
    pub broadcast_address: IpAddr,
    /// Channel `n` binds and sends on `base_port + n`.
    pub base_port: u16,
    /// Peer-list capacity.
    pub max_peers: usize,
}

impl UdpTransportConfig {
    /// LAN-wide defaults for `local`.
    pub fn new(local: MacAddress) -> Self {
        Self {
            local,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            base_port: DEFAULT_BASE_PORT,
            max_peers: 20,
        }
    }

    fn port_for(&self, channel: u8) -> Result<u16, TransportError> {
        self.base_port.checked_add(u16::from(channel)).ok_or_else(|| {
            TransportError::InitFailed(format!(
                "channel {channel} overflows base port {}",
                self.base_port
            ))
        })
    }
}

type ObserverSlot = Arc<Mutex<Option<Weak<dyn TransportObserver>>>>;

struct Link {
    socket: Arc<UdpSocket>,
    destination: SocketAddr,
    completions: mpsc::Sender<(MacAddress, SendStatus)>,
}

/// [`Transport`] over UDP broadcast.
pub struct UdpTransport {
    config: UdpTransportConfig,
    observer: ObserverSlot,
    peers: Mutex<HashMap<MacAddress, PeerInfo>>,
    link: Mutex<Option<Link>>,
    running: Arc<AtomicBool>,
}

impl UdpTransport {
    pub fn new(config: UdpTransportConfig) -> Self {
        Self {
            config,
            observer: Arc::new(Mutex::new(None)),
            peers: Mutex::new(HashMap::new()),
            link: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Local socket address once initialised.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        lock(&self.link)
            .as_ref()
            .and_then(|link| link.socket.local_addr().ok())
    }

    fn bind(&self, port: u16) -> io::Result<UdpSocket> {
        let addr = SocketAddr::new(self.config.bind_address, port);
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket2 = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        socket2.set_broadcast(true)?;
        socket2.set_read_timeout(Some(READ_TIMEOUT))?;
        socket2.bind(&addr.into())?;
        Ok(socket2.into())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Transport for UdpTransport {
    fn init(&self, channel: u8) -> Result<(), TransportError> {
        let mut link = lock(&self.link);
        if link.is_some() {
            debug!("UDP link already initialised");
            return Ok(());
        }

        let port = self.config.port_for(channel)?;
        let socket = self
            .bind(port)
            .map(Arc::new)
            .map_err(|e| TransportError::InitFailed(format!("bind UDP port {port}: {e}")))?;

        self.running.store(true, Ordering::Relaxed);

        let rx_socket = Arc::clone(&socket);
        let observer = Arc::clone(&self.observer);
        let running = Arc::clone(&self.running);
        let local = self.config.local;
        std::thread::Builder::new()
            .name("linkpair-rx".to_string())
            .spawn(move || receive_loop(&rx_socket, local, &observer, &running))
            .map_err(|e| TransportError::InitFailed(format!("spawn receive thread: {e}")))?;

        let (tx, rx) = mpsc::channel();
        let observer = Arc::clone(&self.observer);
        std::thread::Builder::new()
            .name("linkpair-tx-status".to_string())
            .spawn(move || completion_loop(&rx, &observer))
            .map_err(|e| TransportError::InitFailed(format!("spawn completion thread: {e}")))?;

        *link = Some(Link {
            socket,
            destination: SocketAddr::new(self.config.broadcast_address, port),
            completions: tx,
        });
        info!(
            local = %self.config.local,
            channel,
            "UDP link listening on port {port}"
        );
        Ok(())
    }

    fn register_observer(&self, observer: Weak<dyn TransportObserver>) {
        *lock(&self.observer) = Some(observer);
    }

    fn local_address(&self) -> MacAddress {
        self.config.local
    }

    fn add_peer(&self, peer: PeerInfo) -> Result<(), TransportError> {
        let mut peers = lock(&self.peers);
        if peers.contains_key(&peer.address) {
            return Err(TransportError::PeerExists(peer.address));
        }
        if peers.len() >= self.config.max_peers {
            return Err(TransportError::PeerLimit {
                capacity: self.config.max_peers,
            });
        }
        peers.insert(peer.address, peer);
        Ok(())
    }

    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError> {
        lock(&self.peers)
            .remove(&address)
            .map(|_| ())
            .ok_or(TransportError::UnknownPeer(address))
    }

    fn send(&self, destination: MacAddress, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        if !lock(&self.peers).contains_key(&destination) {
            return Err(TransportError::UnknownPeer(destination));
        }

        let link = lock(&self.link);
        let link = link.as_ref().ok_or(TransportError::NotInitialised)?;
        let datagram = encode_frame(destination, self.config.local, payload);
        let result = link.socket.send_to(&datagram, link.destination);

        let status = if result.is_ok() {
            SendStatus::Delivered
        } else {
            SendStatus::Failed
        };
        if link.completions.send((destination, status)).is_err() {
            debug!("completion thread has stopped");
        }

        result
            .map(|_| trace!(to = %destination, len = payload.len(), "frame sent"))
            .map_err(|e| TransportError::Link(e.to_string()))
    }
}

fn receive_loop(
    socket: &UdpSocket,
    local: MacAddress,
    observer: &ObserverSlot,
    running: &AtomicBool,
) {
    let mut buf = vec![0u8; 2048];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("UDP recv error: {e}");
                continue;
            }
        };

        let frame = match decode_frame(&buf[..len]) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping datagram from {src}: {e}");
                continue;
            }
        };
        if !accepts(&frame, local) {
            trace!(from = %frame.source, to = %frame.destination, "frame not for this station");
            continue;
        }

        let target = lock(observer).as_ref().and_then(Weak::upgrade);
        match target {
            Some(target) => target.on_receive(frame.source, frame.payload),
            None => warn!(from = %frame.source, "frame received with no observer"),
        }
    }

    info!("UDP receive loop stopped");
}

fn completion_loop(rx: &mpsc::Receiver<(MacAddress, SendStatus)>, observer: &ObserverSlot) {
    while let Ok((destination, status)) = rx.recv() {
        let target = lock(observer).as_ref().and_then(Weak::upgrade);
        if let Some(target) = target {
            target.on_send_complete(destination, status);
        }
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: MacAddress = MacAddress::new([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const PEER: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    #[test]
    fn test_frame_header_precedes_payload() {
        // Act
        let datagram = encode_frame(PEER, LOCAL, b"\x01abc");

        // Assert
        assert_eq!(datagram.len(), FRAME_HEADER_LEN + 4);
        assert_eq!(&datagram[..6], &PEER.octets());
        assert_eq!(&datagram[6..12], &LOCAL.octets());
        assert_eq!(&datagram[12..], b"\x01abc");
    }

    #[test]
    fn test_decode_frame_splits_addresses_and_payload() {
        let datagram = encode_frame(MacAddress::BROADCAST, LOCAL, b"hi");

        let frame = decode_frame(&datagram).expect("decode");

        assert!(frame.destination.is_broadcast());
        assert_eq!(frame.source, LOCAL);
        assert_eq!(frame.payload, b"hi");
    }

    #[test]
    fn test_decode_frame_accepts_empty_payload() {
        let datagram = encode_frame(PEER, LOCAL, &[]);

        assert!(decode_frame(&datagram).unwrap().payload.is_empty());
    }

    #[test]
    fn test_decode_frame_rejects_truncated_header() {
        assert_eq!(decode_frame(&[0u8; 11]), Err(UdpFrameError::TooShort(11)));
    }

    #[test]
    fn test_peer_list_enforces_capacity_and_uniqueness() {
        // Arrange
        let mut config = UdpTransportConfig::new(LOCAL);
        config.max_peers = 1;
        let transport = UdpTransport::new(config);

        // Act / Assert
        assert_eq!(transport.add_peer(PeerInfo::unencrypted(PEER, 1)), Ok(()));
        assert_eq!(
            transport.add_peer(PeerInfo::unencrypted(PEER, 1)),
            Err(TransportError::PeerExists(PEER))
        );
        assert_eq!(
            transport.add_peer(PeerInfo::unencrypted(MacAddress::BROADCAST, 1)),
            Err(TransportError::PeerLimit { capacity: 1 })
        );
        assert_eq!(transport.remove_peer(PEER), Ok(()));
        assert_eq!(
            transport.remove_peer(PEER),
            Err(TransportError::UnknownPeer(PEER))
        );
    }

    #[test]
    fn test_send_checks_peer_then_initialisation() {
        let transport = UdpTransport::new(UdpTransportConfig::new(LOCAL));

        assert_eq!(
            transport.send(PEER, b"x"),
            Err(TransportError::UnknownPeer(PEER))
        );
        transport.add_peer(PeerInfo::unencrypted(PEER, 1)).unwrap();
        assert_eq!(transport.send(PEER, b"x"), Err(TransportError::NotInitialised));
    }

    #[test]
    fn test_port_overflow_is_an_init_error() {
        let mut config = UdpTransportConfig::new(LOCAL);
        config.base_port = u16::MAX;
        let transport = UdpTransport::new(config);

        assert!(matches!(
            transport.init(1),
            Err(TransportError::InitFailed(_))
        ));
        assert!(transport.socket_addr().is_none());
    }

    // ── Receive filter ────────────────────────────────────────────────────────

    #[test]
    fn test_accepts_broadcast_and_frames_addressed_to_us() {
        let broadcast = encode_frame(MacAddress::BROADCAST, PEER, b"req");
        let unicast = encode_frame(LOCAL, PEER, b"rsp");

        assert!(accepts(&decode_frame(&broadcast).unwrap(), LOCAL));
        assert!(accepts(&decode_frame(&unicast).unwrap(), LOCAL));
    }

    #[test]
    fn test_drops_own_echo_even_when_broadcast() {
        let echo = encode_frame(MacAddress::BROADCAST, LOCAL, b"req");

        assert!(!accepts(&decode_frame(&echo).unwrap(), LOCAL));
    }

    #[test]
    fn test_drops_frames_for_another_station() {
        let other = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x07]);
        let datagram = encode_frame(other, PEER, b"data");

        assert!(!accepts(&decode_frame(&datagram).unwrap(), LOCAL));
    }

    // ── Loopback ──────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(MacAddress, Vec<u8>)>>,
        completions: Mutex<Vec<(MacAddress, SendStatus)>>,
    }

    impl TransportObserver for Recorder {
        fn on_receive(&self, sender: MacAddress, payload: &[u8]) {
            self.frames.lock().unwrap().push((sender, payload.to_vec()));
        }

        fn on_send_complete(&self, destination: MacAddress, status: SendStatus) {
            self.completions.lock().unwrap().push((destination, status));
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn test_loopback_delivers_frames_and_completions_through_threads() {
        // Arrange: borrow a free loopback port, then bind the transport to it.
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let port = UdpSocket::bind((loopback, 0))
            .and_then(|spare| spare.local_addr())
            .expect("free port")
            .port();
        let config = UdpTransportConfig {
            bind_address: loopback,
            broadcast_address: loopback,
            base_port: port,
            ..UdpTransportConfig::new(LOCAL)
        };
        let transport = UdpTransport::new(config);
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn TransportObserver> = recorder.clone();
        transport.register_observer(Arc::downgrade(&observer));
        transport.init(0).expect("bind loopback");
        transport.add_peer(PeerInfo::unencrypted(PEER, 0)).unwrap();
        let addr = transport.socket_addr().expect("bound");

        // Act: our own send loops back (an echo), then a remote station
        // sends one frame to us and one to somebody else.
        transport.send(PEER, b"outbound").expect("send");
        let remote = UdpSocket::bind((loopback, 0)).expect("remote socket");
        let stranger = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x07]);
        remote
            .send_to(&encode_frame(stranger, PEER, b"not ours"), addr)
            .unwrap();
        remote
            .send_to(&encode_frame(LOCAL, PEER, b"inbound"), addr)
            .unwrap();

        // Assert
        assert!(wait_until(|| !recorder.frames.lock().unwrap().is_empty()));
        assert!(wait_until(|| !recorder.completions.lock().unwrap().is_empty()));
        assert_eq!(
            *recorder.frames.lock().unwrap(),
            vec![(PEER, b"inbound".to_vec())]
        );
        assert_eq!(
            *recorder.completions.lock().unwrap(),
            vec![(PEER, SendStatus::Delivered)]
        );
    }
}
