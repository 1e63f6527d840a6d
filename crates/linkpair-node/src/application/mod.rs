//! Application layer of a LinkPair node.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules, here in `linkpair-core`) and the infrastructure (sockets,
//! files).  Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil a goal ("pair with whoever
//!   answers my broadcast").
//! - **Depends on abstractions** (traits) rather than concrete adapters, so a
//!   UDP link, an in-memory medium, or a real radio can be swapped in.
//! - **Contains no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`transport`**      – the link port and its notification observer.
//! - **`persistence`**    – the non-volatile storage port and the adapter
//!   that reads and writes the 7-byte pairing record.
//! - **`peer_table`**     – which addresses are registered with the link.
//! - **`pairing_engine`** – the REQUEST / RESPONSE / CONFIRM state machine
//!   and the application-facing API.

pub mod pairing_engine;
pub mod peer_table;
pub mod persistence;
pub mod transport;
