//! dix-core: Core types for the distributed sharded index client
//!
//! A distributed index is spread over the devices of a pool. Every key is
//! placed on a redundancy group of `N + 2K` devices chosen by the index
//! layout; the key's record is stored on the `N + K` data and parity units,
//! and the `K` spares stand in when those are unavailable.
//!
//! This crate holds what client and catalogue services share:
//! - identifiers ([`IndexId`], [`CatalogueId`])
//! - placement ([`Imask`], [`LayoutDescriptor`], [`LayoutInstance`], [`TargetRouter`])
//! - the pool map ([`PoolMap`])
//! - the meta-index record format ([`meta`])
//! - the catalogue service protocol ([`cas`])

pub mod cas;
mod config;
mod error;
mod fid;
pub mod imask;
mod layout;
pub mod meta;
mod op;
mod pool;
mod routing;

pub use cas::{CasError, CasReply, CasRequest, CasResult, Record};
pub use config::{ClientConfig, PROTOCOL_VERSION};
pub use error::Error;
pub use fid::{CatalogueId, IndexId, INDEX_ID_SIZE, LAYOUT_INDEX, LDESCR_INDEX};
pub use imask::{BitString, Imask, MaskRange, IMASK_INF};
pub use layout::{HashFunction, IndexLayout, LayoutDescriptor, LayoutId, LayoutInstance, UnitKind};
pub use meta::{EncodedBatch, MetaFormatError};
pub use op::OpKind;
pub use pool::{Device, DeviceState, PoolMap, PoolVersion};
pub use routing::{RedundancyGroup, Target, TargetRouter};

pub type Result<T> = std::result::Result<T, Error>;
