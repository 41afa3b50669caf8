//! Listly client-side synchronization core.
//!
//! Everything a frontend needs to stay consistent with the hosted backend:
//! an entity cache with stale-while-revalidate reads, a query/mutation
//! orchestrator that coalesces concurrent fetches, a realtime invalidator
//! driven by the backend change feed, and local persistence for the few
//! things that never leave the device.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod local;
pub mod ops;
pub mod orchestrator;
pub mod pagination;
pub mod realtime;

pub use context::AppContext;
pub use error::{Result, SyncError};
