//! Mock transport for unit testing.
//!
//! Records every peer registration and every send, and lets tests inject
//! receive and send-completion notifications as if they came from the radio.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use linkpair_core::MacAddress;

use crate::application::transport::{
    PeerInfo, SendStatus, Transport, TransportError, TransportObserver,
};

/// Default peer capacity, matching a typical radio peer list.
pub const DEFAULT_MOCK_CAPACITY: usize = 20;

#[derive(Default)]
struct MockState {
    init_channel: Option<u8>,
    observer: Option<Weak<dyn TransportObserver>>,
    peers: BTreeMap<MacAddress, PeerInfo>,
    removed: Vec<MacAddress>,
    sent: Vec<(MacAddress, Vec<u8>)>,
}

/// A recording implementation of [`Transport`].
pub struct MockTransport {
    local: MacAddress,
    capacity: usize,
    fail_init: bool,
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Creates a mock with the given local address.
    pub fn new(local: MacAddress) -> Self {
        Self::with_capacity(local, DEFAULT_MOCK_CAPACITY)
    }

    /// Creates a mock whose peer list holds at most `capacity` entries.
    pub fn with_capacity(local: MacAddress, capacity: usize) -> Self {
        Self {
            local,
            capacity,
            fail_init: false,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Creates a mock whose `init` always fails.
    pub fn failing_init(local: MacAddress) -> Self {
        Self {
            fail_init: true,
            ..Self::new(local)
        }
    }

    /// Injects a received frame, as if it arrived from `sender`.
    ///
    /// Does nothing if no observer is registered or it has been dropped.
    pub fn deliver(&self, sender: MacAddress, payload: &[u8]) {
        if let Some(observer) = self.observer() {
            observer.on_receive(sender, payload);
        }
    }

    /// Injects a send-completion notification.
    pub fn complete_send(&self, destination: MacAddress, status: SendStatus) {
        if let Some(observer) = self.observer() {
            observer.on_send_complete(destination, status);
        }
    }

    /// Every successful send so far, in order.
    pub fn sent(&self) -> Vec<(MacAddress, Vec<u8>)> {
        self.lock().sent.clone()
    }

    /// Payloads sent to `destination`, in order.
    pub fn sent_to(&self, destination: MacAddress) -> Vec<Vec<u8>> {
        self.lock()
            .sent
            .iter()
            .filter(|(to, _)| *to == destination)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Forgets recorded sends.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Currently registered peers, ordered by address.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.lock().peers.values().copied().collect()
    }

    /// Addresses successfully removed so far, in order.
    pub fn removed(&self) -> Vec<MacAddress> {
        self.lock().removed.clone()
    }

    /// Channel passed to the last successful `init`.
    pub fn init_channel(&self) -> Option<u8> {
        self.lock().init_channel
    }

    /// Returns `true` if a live observer is registered.
    pub fn has_observer(&self) -> bool {
        self.observer().is_some()
    }

    fn observer(&self) -> Option<Arc<dyn TransportObserver>> {
        // Upgrade outside the notification so the observer may call back in.
        self.lock().observer.as_ref().and_then(Weak::upgrade)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn init(&self, channel: u8) -> Result<(), TransportError> {
        if self.fail_init {
            return Err(TransportError::InitFailed("mock radio unavailable".into()));
        }
        self.lock().init_channel = Some(channel);
        Ok(())
    }

    fn register_observer(&self, observer: Weak<dyn TransportObserver>) {
        self.lock().observer = Some(observer);
    }

    fn local_address(&self) -> MacAddress {
        self.local
    }

    fn add_peer(&self, peer: PeerInfo) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.peers.contains_key(&peer.address) {
            return Err(TransportError::PeerExists(peer.address));
        }
        if state.peers.len() >= self.capacity {
            return Err(TransportError::PeerLimit {
                capacity: self.capacity,
            });
        }
        state.peers.insert(peer.address, peer);
        Ok(())
    }

    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.peers.remove(&address).is_none() {
            return Err(TransportError::UnknownPeer(address));
        }
        state.removed.push(address);
        Ok(())
    }

    fn send(&self, destination: MacAddress, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.init_channel.is_none() {
            return Err(TransportError::NotInitialised);
        }
        if !state.peers.contains_key(&destination) {
            return Err(TransportError::UnknownPeer(destination));
        }
        state.sent.push((destination, payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);
    const PEER: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x02]);

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

    #[test]
    fn test_add_existing_peer_is_rejected() {
        let transport = MockTransport::new(LOCAL);
        transport.add_peer(PeerInfo::unencrypted(PEER, 1)).unwrap();

        let result = transport.add_peer(PeerInfo::unencrypted(PEER, 1));

        assert_eq!(result, Err(TransportError::PeerExists(PEER)));
    }

    #[test]
    fn test_send_requires_init_and_registered_peer() {
        // Arrange
        let transport = MockTransport::new(LOCAL);

        // Act / Assert
        assert_eq!(transport.send(PEER, b"x"), Err(TransportError::NotInitialised));
        transport.init(1).unwrap();
        assert_eq!(transport.send(PEER, b"x"), Err(TransportError::UnknownPeer(PEER)));
        transport.add_peer(PeerInfo::unencrypted(PEER, 1)).unwrap();
        assert_eq!(transport.send(PEER, b"x"), Ok(()));
        assert_eq!(transport.sent(), vec![(PEER, b"x".to_vec())]);
    }

    #[test]
    fn test_notifications_reach_registered_observer() {
        // Arrange
        let transport = MockTransport::new(LOCAL);
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn TransportObserver> = recorder.clone();
        transport.register_observer(Arc::downgrade(&observer));

        // Act
        transport.deliver(PEER, b"frame");
        transport.complete_send(PEER, SendStatus::Failed);

        // Assert
        assert_eq!(*recorder.frames.lock().unwrap(), vec![(PEER, b"frame".to_vec())]);
        assert_eq!(
            *recorder.completions.lock().unwrap(),
            vec![(PEER, SendStatus::Failed)]
        );
    }

    #[test]
    fn test_dropped_observer_is_not_notified() {
        let transport = MockTransport::new(LOCAL);
        {
            let observer: Arc<dyn TransportObserver> = Arc::new(Recorder::default());
            transport.register_observer(Arc::downgrade(&observer));
        }

        transport.deliver(PEER, b"frame");

        assert!(!transport.has_observer());
    }
}
