//! Storage infrastructure: the node's configuration file and the
//! non-volatile image holding the pairing record.
//!
//! - `config` reads and writes the TOML configuration in the
//!   platform-appropriate directory, with defaults for a first run.
//! - `file` keeps the pairing image in a fixed-size file that behaves like
//!   EEPROM: writes are staged and only `commit` makes them durable.
//! - `memory` is the same contract without a file, for tests.

pub mod config;
pub mod file;
pub mod memory;
