//! dix-client: distributed index client
//!
//! Splits every index operation into per-device catalogue requests,
//! retries reads across the redundancy group of each key, and merges the
//! replies of ordered scans.
//!
//! ```ignore
//! let client = DixClient::builder().pools(pools).meta_layout(meta).build()?;
//! let index = DixIndex::new(IndexId::new(1, 1)).with_descriptor(descr);
//!
//! let mut req = client.request();
//! req.put(&index, vec![Record::new(b"k", b"v")], false)?;
//! req.wait().await;
//! req.generic_result()?;
//! ```

pub mod client;
pub mod controller;
pub mod driver;
pub mod error;
mod exec;
pub mod merge;
mod meta;
pub mod request;
pub mod transport;

pub use client::{ClientBuilder, DixClient};
pub use controller::{check_quorum, ItemState, ItemTracker, Policy, Verdict};
pub use driver::{Completion, Dispatch, Driver, TargetFailure};
pub use error::{DixError, Result};
pub use merge::{NextResultSet, NextWindow, TargetWindows};
pub use request::{DixIndex, DixRequest, ReqState};
pub use transport::{CatalogueTransport, HttpTransport, TransportError};
