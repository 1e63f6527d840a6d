//! Link adapters implementing the [`Transport`](crate::application::transport::Transport) port.
//!
//! - `udp` emulates a broadcast radio on a LAN using UDP broadcast.
//! - `medium` connects simulated stations in memory, for multi-node tests.
//! - `mock` records calls and lets a test inject notifications.

pub mod medium;
pub mod mock;
pub mod udp;
