//! Remote store client: typed requests against the application backend.

pub mod api_types;
pub mod client;
pub mod error;
#[cfg(test)]
pub mod mock;
pub mod remote;
pub mod types;

pub use client::HttpStore;
pub use error::StoreError;
pub use remote::{RemoteStore, StoreResult};
