//! In-memory broadcast medium connecting any number of simulated stations.
//!
//! Every station attached to a [`SharedMedium`] gets a [`MediumTransport`]
//! that behaves like a connectionless radio: frames are addressed by
//! [`MacAddress`], broadcast reaches every other station on the same channel,
//! and unicast reaches only the named station.
//!
//! # Delivery model
//!
//! Sends never call back into anything.  They only queue the frame; the test
//! (or simulation loop) drives delivery with [`SharedMedium::pump`] or
//! [`SharedMedium::pump_one`].  Frames sent while a frame is being delivered
//! are queued behind it, so a full handshake completes in a single `pump`.
//! Dropping queued frames with [`SharedMedium::discard_pending`] simulates
//! loss on the air.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use linkpair_core::MacAddress;
use tracing::{trace, warn};

use crate::application::transport::{
    PeerInfo, SendStatus, Transport, TransportError, TransportObserver,
};

/// Largest payload one frame may carry.
pub const MAX_FRAME_PAYLOAD: usize = 250;

/// Peer-list capacity of a station unless set otherwise.
pub const DEFAULT_PEER_CAPACITY: usize = 20;

#[derive(Default)]
struct Station {
    channel: Option<u8>,
    observer: Option<Weak<dyn TransportObserver>>,
    peers: HashMap<MacAddress, PeerInfo>,
}

struct Frame {
    from: MacAddress,
    to: MacAddress,
    channel: u8,
    payload: Vec<u8>,
}

#[derive(Default)]
struct MediumState {
    stations: HashMap<MacAddress, Station>,
    queue: VecDeque<Frame>,
}

/// The shared air between simulated stations.  Clones share the same medium.
#[derive(Clone, Default)]
pub struct SharedMedium {
    state: Arc<Mutex<MediumState>>,
}

impl SharedMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a station with address `local` and the default peer capacity.
    pub fn attach(&self, local: MacAddress) -> Arc<MediumTransport> {
        self.attach_with_capacity(local, DEFAULT_PEER_CAPACITY)
    }

    /// Attaches a station whose peer list holds at most `capacity` entries.
    ///
    /// Attaching an address that is already present resets that station.
    pub fn attach_with_capacity(&self, local: MacAddress, capacity: usize) -> Arc<MediumTransport> {
        lock(&self.state)
            .stations
            .insert(local, Station::default());
        Arc::new(MediumTransport {
            local,
            capacity,
            state: Arc::clone(&self.state),
        })
    }

    /// Number of frames waiting for delivery.
    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Drops every queued frame without delivering it.
    pub fn discard_pending(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }

    /// Delivers queued frames, including ones sent during delivery, until the
    /// queue is empty.  Returns how many frames were processed.
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        while self.pump_one() {
            processed += 1;
        }
        processed
    }

    /// Delivers the oldest queued frame.  Returns `false` if none was queued.
    pub fn pump_one(&self) -> bool {
        let (frame, receivers, sender) = {
            let mut state = lock(&self.state);
            let Some(frame) = state.queue.pop_front() else {
                return false;
            };
            let receivers: Vec<Arc<dyn TransportObserver>> = state
                .stations
                .iter()
                .filter(|(address, station)| {
                    **address != frame.from
                        && station.channel == Some(frame.channel)
                        && (frame.to.is_broadcast() || **address == frame.to)
                })
                .filter_map(|(_, station)| station.observer.as_ref().and_then(Weak::upgrade))
                .collect();
            let sender = state
                .stations
                .get(&frame.from)
                .and_then(|s| s.observer.as_ref())
                .and_then(Weak::upgrade);
            (frame, receivers, sender)
        };

        trace!(
            from = %frame.from,
            to = %frame.to,
            receivers = receivers.len(),
            "medium delivering frame"
        );
        let status = if frame.to.is_broadcast() || !receivers.is_empty() {
            SendStatus::Delivered
        } else {
            SendStatus::Failed
        };
        for receiver in &receivers {
            receiver.on_receive(frame.from, &frame.payload);
        }
        if let Some(sender) = sender {
            sender.on_send_complete(frame.to, status);
        }
        true
    }
}

/// One station's view of a [`SharedMedium`].
pub struct MediumTransport {
    local: MacAddress,
    capacity: usize,
    state: Arc<Mutex<MediumState>>,
}

impl MediumTransport {
    fn with_station<T>(
        &self,
        f: impl FnOnce(&mut Station, &mut VecDeque<Frame>) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut guard = lock(&self.state);
        let MediumState { stations, queue } = &mut *guard;
        let station = stations
            .get_mut(&self.local)
            .ok_or_else(|| TransportError::Link("station detached from medium".into()))?;
        f(station, queue)
    }
}

impl Transport for MediumTransport {
    fn init(&self, channel: u8) -> Result<(), TransportError> {
        self.with_station(|station, _| {
            station.channel = Some(channel);
            Ok(())
        })
    }

    fn register_observer(&self, observer: Weak<dyn TransportObserver>) {
        let registered = self.with_station(|station, _| {
            station.observer = Some(observer);
            Ok(())
        });
        if let Err(e) = registered {
            warn!(station = %self.local, "observer not registered: {e}");
        }
    }

    fn local_address(&self) -> MacAddress {
        self.local
    }

    fn add_peer(&self, peer: PeerInfo) -> Result<(), TransportError> {
        let capacity = self.capacity;
        self.with_station(|station, _| {
            if station.peers.contains_key(&peer.address) {
                return Err(TransportError::PeerExists(peer.address));
            }
            if station.peers.len() >= capacity {
                return Err(TransportError::PeerLimit { capacity });
            }
            station.peers.insert(peer.address, peer);
            Ok(())
        })
    }

    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError> {
        self.with_station(|station, _| {
            station
                .peers
                .remove(&address)
                .map(|_| ())
                .ok_or(TransportError::UnknownPeer(address))
        })
    }

    fn send(&self, destination: MacAddress, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        let from = self.local;
        self.with_station(|station, queue| {
            let channel = station.channel.ok_or(TransportError::NotInitialised)?;
            if !station.peers.contains_key(&destination) {
                return Err(TransportError::UnknownPeer(destination));
            }
            queue.push_back(Frame {
                from,
                to: destination,
                channel,
                payload: payload.to_vec(),
            });
            Ok(())
        })
    }
}

fn lock(state: &Mutex<MediumState>) -> MutexGuard<'_, MediumState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
