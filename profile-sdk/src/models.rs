//! Directory records returned by a `DirectoryClient`
//!
//! Field names follow the directory's camelCase JSON so that the records can
//! be deserialized straight from a response body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core identity of a directory user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,

    pub display_name: String,

    #[serde(default)]
    pub job_title: Option<String>,

    #[serde(default)]
    pub department: Option<String>,

    #[serde(default)]
    pub mail: Option<String>,

    /// Raw hire date as the directory reports it
    #[serde(default)]
    pub hire_date: Option<String>,

    /// Free-form tags (skills, "ask me about" topics)
    #[serde(default, alias = "skills")]
    pub tags: Vec<String>,
}

impl User {
    /// Reduce to the shape used for managers and direct reports
    pub fn basic_info(&self) -> BasicUserInfo {
        BasicUserInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            job_title: self.job_title.clone(),
            mail: self.mail.clone(),
        }
    }
}

/// Reduced directory entry used for a manager or a direct report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicUserInfo {
    pub id: String,

    pub display_name: String,

    #[serde(default)]
    pub job_title: Option<String>,

    #[serde(default)]
    pub mail: Option<String>,
}

/// A group the user is a member of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipGroup {
    pub id: String,

    pub display_name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub mail: Option<String>,
}

/// Metadata for a file in the user's storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub web_url: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_modified_by: Option<String>,
}

/// Raw profile photo bytes, left undecoded
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Thumbnail {
    pub fn new(data: Vec<u8>) -> Self {
        Self { content_type: None, data }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thumbnail")
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}
