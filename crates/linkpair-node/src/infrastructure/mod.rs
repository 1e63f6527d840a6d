//! Infrastructure layer of a LinkPair node.
//!
//! Contains the concrete adapters: link transports (UDP, in-memory medium,
//! mock) and storage (pairing image, TOML configuration).
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `linkpair_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod storage;
pub mod transport;
