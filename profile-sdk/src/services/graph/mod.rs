//! HTTP client for the unified directory endpoint
//!
//! Implements `DirectoryClient` over `reqwest` against the Microsoft Graph
//! style REST surface (`/{version}/users/{id}/...`). Bearer tokens come from
//! an `AccessTokenProvider` on every request.

mod models;
pub use models::{Collection, DirectoryObject, DriveItem};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{DirectoryConfig, ServiceConfig, DEFAULT_PROVIDER};
use crate::core::{AccessTokenProvider, DirectoryClient, ServiceClient, StaticTokenProvider};
use crate::error::{Result, ServiceError};
use crate::models::{BasicUserInfo, FileMetadata, MembershipGroup, Thumbnail, User};
use crate::services::common::{build_http_client, parse_error_response, UserAgent};
use crate::util::{generate_request_id, sanitize_for_logging};

const SERVICE_NAME: &str = "directory";
const USER_SELECT: &str = "id,displayName,jobTitle,department,mail,hireDate,skills";
const BASIC_SELECT: &str = "id,displayName,jobTitle,mail";
const GROUP_SELECT: &str = "id,displayName,description,mail";

/// Directory client for the unified endpoint
pub struct GraphDirectoryClient {
    http_client: Client,
    config: DirectoryConfig,
    api_root: Url,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GraphDirectoryClient {
    /// Create a client from a validated configuration
    pub fn new_with_config(
        config: DirectoryConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let http_client = build_http_client(
            Some(UserAgent {
                extra: Some("directory-client".to_string()),
                ..UserAgent::default()
            }),
            Some(Duration::from_secs(config.timeout_seconds)),
        )?;

        let mut api_root = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::configuration(format!("Invalid directory base URL: {}", e)))?;
        api_root
            .path_segments_mut()
            .map_err(|_| ServiceError::configuration("Directory base URL cannot carry a path"))?
            .pop_if_empty()
            .push(&config.api_version);

        Ok(Self {
            http_client,
            config,
            api_root,
            tokens,
        })
    }

    pub fn builder() -> GraphDirectoryClientBuilder {
        GraphDirectoryClientBuilder::default()
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// `{api_root}/users/{user_id}/{tail...}` with the id percent-encoded
    fn user_url(&self, user_id: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::configuration("Directory base URL cannot carry a path"))?
            .push("users")
            .push(user_id)
            .extend(tail);
        Ok(url)
    }

    fn with_select(mut url: Url, select: &str) -> Url {
        url.query_pairs_mut().append_pair("$select", select);
        url
    }

    /// Send an authenticated GET and fail on any non-success status
    async fn send(&self, url: Url) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let request_id = generate_request_id();
        let endpoint = url.path().to_string();

        debug!("Sending request to directory: GET {} (client-request-id {})", url, request_id);

        let response = self.http_client
            .get(url)
            .bearer_auth(token)
            .header("client-request-id", &request_id)
            .send()
            .await
            .map_err(|e| ServiceError::from(e).with_context_value("request_id", &request_id))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let error = parse_error_response(SERVICE_NAME, &endpoint, &request_id, response).await;
        if !error.is_not_found() {
            warn!("Directory request {} failed: {}", endpoint, sanitize_for_logging(&error.to_string()));
        }
        Err(error)
    }

    async fn get_json<R: DeserializeOwned>(&self, url: Url) -> Result<R> {
        let response = self.send(url).await?;
        response.json::<R>()
            .await
            .map_err(|e| ServiceError::parsing(format!("Failed to parse directory response: {}", e)))
    }

    /// A 404 means the related object does not exist
    async fn get_optional_json<R: DeserializeOwned>(&self, url: Url) -> Result<Option<R>> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Follow `@odata.nextLink` up to the configured page limit
    async fn get_collection<R: DeserializeOwned>(&self, url: Url) -> Result<Vec<R>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(url) = next.take() {
            let page: Collection<R> = self.get_json(url).await?;
            items.extend(page.value);
            pages += 1;

            if let Some(link) = page.next_link {
                if pages >= self.config.page_limit {
                    warn!("Stopping after {} pages; more results are available", pages);
                    break;
                }
                next = Some(self.next_page_url(&link)?);
            }
        }

        Ok(items)
    }

    /// The bearer token is only ever sent to the configured origin
    fn next_page_url(&self, link: &str) -> Result<Url> {
        let url = Url::parse(link)
            .map_err(|e| ServiceError::parsing(format!("Invalid next link {}: {}", link, e)))?;

        if url.origin() != self.api_root.origin() {
            let foreign = url.origin().ascii_serialization();
            warn!("Refusing to follow next link to foreign origin {}", foreign);
            return Err(ServiceError::parsing(format!(
                "Next link points outside the directory origin: {}",
                foreign
            )));
        }

        Ok(url)
    }
}

#[async_trait]
impl DirectoryClient for GraphDirectoryClient {
    async fn get_user(&self, user_id: &str) -> Result<User> {
        let url = Self::with_select(self.user_url(user_id, &[])?, USER_SELECT);
        self.get_json(url).await
    }

    async fn get_photo(&self, user_id: &str) -> Result<Option<Thumbnail>> {
        let url = self.user_url(user_id, &["photo", "$value"])?;
        let response = match self.send(url).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Ok(None);
        }

        let thumbnail = Thumbnail::new(data);
        Ok(Some(match content_type {
            Some(content_type) => thumbnail.with_content_type(content_type),
            None => thumbnail,
        }))
    }

    async fn get_manager(&self, user_id: &str) -> Result<Option<BasicUserInfo>> {
        let url = Self::with_select(self.user_url(user_id, &["manager"])?, BASIC_SELECT);
        self.get_optional_json(url).await
    }

    async fn get_direct_reports(&self, user_id: &str) -> Result<Vec<BasicUserInfo>> {
        let url = Self::with_select(self.user_url(user_id, &["directReports"])?, BASIC_SELECT);
        self.get_collection(url).await
    }

    async fn get_group_memberships(&self, user_id: &str) -> Result<Vec<MembershipGroup>> {
        let url = Self::with_select(self.user_url(user_id, &["memberOf"])?, GROUP_SELECT);
        let objects: Vec<DirectoryObject> = self.get_collection(url).await?;
        Ok(objects.into_iter().filter_map(DirectoryObject::into_group).collect())
    }

    async fn get_files(&self, user_id: &str) -> Result<Vec<FileMetadata>> {
        let url = self.user_url(user_id, &["drive", "root", "children"])?;
        let items: Vec<DriveItem> = self.get_collection(url).await?;
        Ok(items.into_iter().map(FileMetadata::from).collect())
    }
}

#[async_trait]
impl ServiceClient for GraphDirectoryClient {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn version(&self) -> &str {
        &self.config.api_version
    }

    async fn health_check(&self) -> Result<bool> {
        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::configuration("Directory base URL cannot carry a path"))?
            .push("organization");

        match self.send(url).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Directory health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

/// Builder for `GraphDirectoryClient`
#[derive(Default)]
pub struct GraphDirectoryClientBuilder {
    base_url: Option<String>,
    api_version: Option<String>,
    access_token: Option<String>,
    token_provider: Option<Arc<dyn AccessTokenProvider>>,
    timeout_seconds: Option<u64>,
    page_limit: Option<usize>,
}

impl GraphDirectoryClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Use a fixed bearer token
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Ask `provider` for a token before each request
    pub fn token_provider(mut self, provider: Arc<dyn AccessTokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Set the timeout in seconds
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn page_limit(mut self, pages: usize) -> Self {
        self.page_limit = Some(pages);
        self
    }

    /// Build the client
    ///
    /// Unset values fall back to `PROFILE_DIRECTORY_*` environment variables,
    /// then to defaults.
    pub fn build(self) -> Result<GraphDirectoryClient> {
        let mut config = DirectoryConfig::from_provider(&**DEFAULT_PROVIDER).unwrap_or_else(|e| {
            debug!("Ignoring directory settings from environment: {}", e);
            DirectoryConfig::default()
        });

        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }

        if let Some(api_version) = self.api_version {
            config.api_version = api_version;
        }

        if let Some(token) = self.access_token {
            config.access_token = token;
        }

        if let Some(timeout) = self.timeout_seconds {
            config.timeout_seconds = timeout;
        }

        if let Some(pages) = self.page_limit {
            config.page_limit = pages;
        }

        let tokens: Arc<dyn AccessTokenProvider> = match self.token_provider {
            Some(provider) => provider,
            None if !config.access_token.is_empty() => {
                Arc::new(StaticTokenProvider::new(config.access_token.clone()))
            }
            None => {
                return Err(ServiceError::configuration(
                    "An access token or token provider is required",
                ))
            }
        };

        GraphDirectoryClient::new_with_config(config, tokens)
    }
}
