//! Wire shapes of the directory endpoint that differ from the SDK records

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{FileMetadata, MembershipGroup};

/// Paged collection envelope
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,

    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Entry of `memberOf`, which mixes groups with directory roles
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,

    pub id: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub mail: Option<String>,
}

pub const GROUP_ODATA_TYPE: &str = "#microsoft.graph.group";

impl DirectoryObject {
    /// Groups only; untyped entries are assumed to be groups
    pub fn into_group(self) -> Option<MembershipGroup> {
        match self.odata_type.as_deref() {
            Some(kind) if kind != GROUP_ODATA_TYPE => None,
            _ => Some(MembershipGroup {
                display_name: self.display_name.unwrap_or_else(|| self.id.clone()),
                id: self.id,
                description: self.description,
                mail: self.mail,
            }),
        }
    }
}

/// Drive item as returned by `drive/root/children`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub web_url: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub last_modified_date_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_modified_by: Option<IdentitySet>,
}

#[derive(Debug, Deserialize)]
pub struct IdentitySet {
    #[serde(default)]
    pub user: Option<Identity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub display_name: Option<String>,
}

impl From<DriveItem> for FileMetadata {
    fn from(item: DriveItem) -> Self {
        FileMetadata {
            id: item.id,
            name: item.name,
            web_url: item.web_url,
            size: item.size,
            last_modified: item.last_modified_date_time,
            last_modified_by: item
                .last_modified_by
                .and_then(|by| by.user)
                .and_then(|user| user.display_name),
        }
    }
}
