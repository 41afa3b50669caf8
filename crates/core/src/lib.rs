//! Listly Core - Shared types library.
//!
//! This crate provides common types used across all Listly components:
//! - `client` - Client-side synchronization core (cache, orchestrator, realtime)
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no caching.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs and entity types for lists, items, members,
//!   categories, comments, price history, notifications, and templates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
