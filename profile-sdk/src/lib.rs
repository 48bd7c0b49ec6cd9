//! # Profile SDK
//!
//! Concurrent aggregation of a user's directory profile.
//!
//! A profile screen needs several independent pieces of data: the core user
//! record, a photo, the manager, direct reports, group memberships and
//! recent files. `ProfileAggregator` fetches them all at once from a
//! `DirectoryClient` and publishes one immutable `ProfileSnapshot` when every
//! requested piece has settled.
//!
//! This crate provides:
//!
//! - `ProfileAggregator`: fan-out/fan-in refresh with cancellation and
//!   newest-request-wins semantics
//! - `DirectoryClient`: the backend seam, with an HTTP implementation in
//!   `services::graph`
//! - Error handling split between backend errors (`ServiceError`) and what a
//!   consumer sees (`RefreshError`)
//! - Opt-in retry and per-facet deadlines (`FetchPolicy`)
//! - Configuration from the environment or in-memory providers
//!
//! ## Failure model
//!
//! Only the core user fetch is mandatory. A failing secondary facet leaves
//! its field empty and marks it `FieldStatus::Failed`; the snapshot is still
//! published.

pub mod aggregator;
pub use aggregator::{AggregatorState, CycleToken, Facet, FacetSet, FieldStatus, ProfileAggregator, ProfileSnapshot};

pub mod core;
pub use crate::core::{AccessTokenProvider, DirectoryClient, ServiceClient, StaticTokenProvider};

pub mod models;
pub use models::{BasicUserInfo, FileMetadata, MembershipGroup, Thumbnail, User};

pub mod services;
pub use services::graph::{GraphDirectoryClient, GraphDirectoryClientBuilder};

pub mod error;
pub use error::{ErrorContext, RefreshError, Result, ServiceError};

pub mod resilience;
pub use resilience::{FetchPolicy, RetryConfig};

pub mod config;
pub use config::{AggregatorConfig, ConfigProvider, ConfigProviderExt, DirectoryConfig, ServiceConfig};

// Utility module for common functionality
mod util;

#[cfg(test)]
mod tests;

/// Create a builder for the HTTP directory client
pub fn graph_client() -> GraphDirectoryClientBuilder {
    GraphDirectoryClientBuilder::new()
}

/// Aggregator over `client` configured from `PROFILE_AGGREGATOR_*`
/// environment variables
pub fn aggregator_from_env<C: DirectoryClient>(client: C) -> Result<ProfileAggregator<C>> {
    let config = AggregatorConfig::from_provider(&**config::DEFAULT_PROVIDER)?;
    ProfileAggregator::from_config(client, &config)
}
