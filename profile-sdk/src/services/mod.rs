//! Concrete directory backends
//!
//! `graph` talks to the unified directory REST endpoint. Anything else that
//! implements `DirectoryClient` can be handed to the aggregator directly.

pub mod graph;
mod common;

pub use common::UserAgent;
