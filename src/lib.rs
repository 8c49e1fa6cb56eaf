//! Todo tracking over SQLite.
//!
//! [`ops`] is the whole public contract: list, get, count, create, update,
//! delete and toggle, each running against any [`store::TodoStore`].
//! [`server`] and the `todos` binary are thin transports over it.

pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod id;
pub mod merge;
pub mod model;
pub mod ops;
pub mod output;
pub mod server;
pub mod store;

pub use error::{Error, Result, StoreError};
