#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;
mod error;

#[cfg(feature = "async")]
pub mod async_dht;
mod dht;
pub mod rpc;
pub mod storage;

pub use crate::common::{
    messages, AddOutcome, Certificate, ClosestNodes, Command, Id, KBucket, Message, Node, Nonce,
    RoutingTable, StoredValue,
};
pub use bytes::Bytes;
pub use dht::{Dht, DhtWasShutdown, Testnet};
pub use error::Error;

pub use ed25519_dalek::SigningKey;

/// Alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
