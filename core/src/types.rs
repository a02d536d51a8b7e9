//! DTOs for Graph and SharePoint REST resources.
//!
//! # Design
//! These are pass-through shapes, not a model of SharePoint. Identifiers and
//! the handful of fields callers reach for are typed; everything else the
//! server sends is kept in a flattened `extra` map so nothing is lost.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Arbitrary JSON object, as used for list item field data.
pub type FieldMap = Map<String, Value>;

/// A SharePoint site (`/sites`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub web_url: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// A SharePoint list (`/sites/{site}/lists`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpList {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub web_url: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// A list item with its expanded `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: String,
    pub web_url: Option<String>,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(flatten)]
    pub extra: FieldMap,
}

impl ListItem {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A term store group (`/sites/{site}/termStore/groups`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermGroup {
    pub id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// An Entra ID (Azure AD) user (`/users`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// A document library (`/sites/{site}/drives`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: String,
    pub name: Option<String>,
    pub drive_type: Option<String>,
    pub web_url: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// A file or folder inside a document library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub web_url: Option<String>,
    pub folder: Option<Value>,
    pub file: Option<Value>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

/// A site user as returned by SharePoint's `ensureuser`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiteUser {
    pub id: i64,
    pub login_name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub is_site_admin: Option<bool>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// A list item attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "FileName")]
    pub name: String,
    #[serde(rename = "ServerRelativeUrl")]
    pub server_relative_url: String,
}

/// File bytes plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: String,
    pub url: String,
    pub data: Vec<u8>,
}

/// Result of creating a folder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    pub server_relative_url: String,
}

/// Result of uploading a file through SharePoint REST.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadedFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub server_relative_url: String,
    pub time_created: Option<String>,
    pub time_last_modified: Option<String>,
    /// Verbose OData sends Int64 values as strings.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub length: Option<u64>,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok())))
}

/// OData query options for collection endpoints. Values are passed through
/// to the server untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ODataQuery {
    pub select: Option<String>,
    pub filter: Option<String>,
    pub expand: Option<String>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub(crate) fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(select) = &self.select {
            pairs.push(("$select", select.as_str()));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("$filter", filter.as_str()));
        }
        if let Some(expand) = &self.expand {
            pairs.push(("$expand", expand.as_str()));
        }
        pairs
    }
}

/// How to find a user in a site's hidden user information list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteUserLookup<'a> {
    Id(&'a str),
    Email(&'a str),
}

/// One page of a Graph collection.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// SharePoint verbose OData wraps every payload in `{"d": ...}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Verbose<T> {
    pub d: T,
}
