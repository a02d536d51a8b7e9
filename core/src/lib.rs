//! Blocking client for the Microsoft Graph SharePoint endpoints.
//!
//! # Overview
//! Maps sites, lists, list items, term store groups, users and document
//! libraries onto plain method calls on [`GraphClient`]. A handful of
//! operations that Graph does not cover (ensuring a site user, attachments,
//! file transfer, folder creation) go to the SharePoint REST API instead.
//!
//! # Design
//! - `GraphClient` owns its token providers; tokens are cached per client,
//!   refreshed when expired, and guarded by a mutex.
//! - Every operation is split into a `build_*` method that produces an
//!   `HttpRequest` and an executing method that sends it through
//!   [`GraphClient::send`], which attaches the bearer token and retries 429
//!   and 5xx with exponential backoff.
//! - The network sits behind the [`Transport`] trait; `UreqTransport` is the
//!   default, tests substitute their own.
//! - DTOs keep unknown JSON properties in an `extra` map rather than modelling
//!   SharePoint in full.
//!
//! ```no_run
//! use grafap_core::{GraphClient, GraphError};
//!
//! fn open_tasks() -> Result<(), GraphError> {
//!     let client = GraphClient::from_env()?;
//!     let items = client.list_items("root", "Tasks", Some("fields/Status eq 'Open'"), None)?;
//!     println!("{} open tasks", items.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod certificate;
pub mod client;
pub mod config;
pub mod doc_libraries;
pub mod error;
pub mod http;
pub mod lists;
pub mod retry;
mod sharepoint;
pub mod sites;
pub mod termstore;
pub mod transport;
pub mod types;
pub mod users;

#[cfg(test)]
mod test_support;

pub use auth::{AccessToken, TokenProvider};
pub use certificate::ClientCertificate;
pub use client::{Api, GraphClient};
pub use config::{AppCredentials, ClientConfig, ClientCredential, ConfigError};
pub use error::GraphError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use retry::RetryPolicy;
pub use transport::{Transport, TransportError, UreqTransport};
pub use types::{
    Attachment, DownloadedFile, Drive, DriveItem, FieldMap, FolderInfo, ListItem, ODataQuery, Site,
    SiteUser, SiteUserLookup, SpList, TermGroup, UploadedFile, User,
};
