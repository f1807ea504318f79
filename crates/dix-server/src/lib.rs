//! dix-server: catalogue service
//!
//! Keeps the component catalogues of distributed indices in memory and
//! answers catalogue requests over HTTP.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;

pub use config::ServerConfig;
pub use error::ServerError;
pub use routes::create_router;
pub use server::{DixServer, ServerBuilder};
pub use state::{create_shared_state, ServerState, SharedState, StoreStats};
pub use store::CatalogueStore;
