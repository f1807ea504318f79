//! dix: distributed sharded indices
//!
//! - [`dix_core`]: identifiers, layouts, placement and the catalogue protocol
//! - [`dix_client`]: the index client
//! - [`dix_server`]: the in-memory catalogue service

pub use dix_client;
pub use dix_core;
pub use dix_server;
