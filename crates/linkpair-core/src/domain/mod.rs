//! Domain entities for LinkPair.
//!
//! This module contains pure pairing rules with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core rules of the system.
//! - Has **no** imports from radio drivers, sockets, storage devices, or UI.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Here the domain is small: what "paired" means, which side of the
//! handshake a node plays, and how much to trust a pairing record read back
//! from non-volatile storage.

/// Pairing status, device role, and re-pairing policy.
pub mod pairing;

/// The persisted pairing record and its validation rules.
pub mod record;
