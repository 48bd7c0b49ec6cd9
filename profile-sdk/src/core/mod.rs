//! Core abstractions for the Profile SDK
//!
//! - `DirectoryClient`: the six facet fetches a profile screen needs
//! - `ServiceClient`: identity and health of a concrete backend
//! - `AccessTokenProvider`: where bearer tokens come from

use async_trait::async_trait;

use crate::error::{Result, ServiceError};
use crate::models::{BasicUserInfo, FileMetadata, MembershipGroup, Thumbnail, User};

/// Directory/backend capability the aggregator fetches facets from
///
/// Implementations decide the transport. Each call either yields its record
/// or fails with a `ServiceError`; callers treat the error as opaque.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Core identity of the user
    async fn get_user(&self, user_id: &str) -> Result<User>;

    /// Profile photo; `None` when the user has no photo
    async fn get_photo(&self, user_id: &str) -> Result<Option<Thumbnail>>;

    /// Manager; `None` when the user has no manager
    async fn get_manager(&self, user_id: &str) -> Result<Option<BasicUserInfo>>;

    async fn get_direct_reports(&self, user_id: &str) -> Result<Vec<BasicUserInfo>>;

    async fn get_group_memberships(&self, user_id: &str) -> Result<Vec<MembershipGroup>>;

    async fn get_files(&self, user_id: &str) -> Result<Vec<FileMetadata>>;
}

#[async_trait]
impl<T: DirectoryClient + ?Sized> DirectoryClient for std::sync::Arc<T> {
    async fn get_user(&self, user_id: &str) -> Result<User> {
        (**self).get_user(user_id).await
    }

    async fn get_photo(&self, user_id: &str) -> Result<Option<Thumbnail>> {
        (**self).get_photo(user_id).await
    }

    async fn get_manager(&self, user_id: &str) -> Result<Option<BasicUserInfo>> {
        (**self).get_manager(user_id).await
    }

    async fn get_direct_reports(&self, user_id: &str) -> Result<Vec<BasicUserInfo>> {
        (**self).get_direct_reports(user_id).await
    }

    async fn get_group_memberships(&self, user_id: &str) -> Result<Vec<MembershipGroup>> {
        (**self).get_group_memberships(user_id).await
    }

    async fn get_files(&self, user_id: &str) -> Result<Vec<FileMetadata>> {
        (**self).get_files(user_id).await
    }
}

/// Base trait for concrete backend clients
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// The client name/identifier
    fn name(&self) -> &str;

    /// The base URL for the service
    fn base_url(&self) -> &str;

    /// Service version
    fn version(&self) -> &str;

    /// Health check for the service
    async fn health_check(&self) -> Result<bool>;
}

/// Source of bearer tokens for directory requests
///
/// Token acquisition and refresh belong to an external identity provider;
/// the SDK only asks for a currently valid token before each request.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Token provider handing out a fixed token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider").field("token", &"[REDACTED]").finish()
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(ServiceError::authentication("No access token configured"));
        }
        Ok(self.token.clone())
    }
}
