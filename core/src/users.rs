//! Directory users, and the per-site users SharePoint keeps in a hidden list.
//!
//! A user only appears in a site's user information list once they have
//! interacted with the site or been picked in a people field. `ensure_user`
//! adds them, which makes them selectable in people columns.

use serde::Serialize;

use crate::client::{
    odata_string, parse_json, parse_verbose, Api, GraphClient, GRAPH_PREFER_NON_INDEXED,
    SP_ODATA_VERBOSE,
};
use crate::error::GraphError;
use crate::http::{HttpMethod, HttpRequest};
use crate::sharepoint;
use crate::types::{ListItem, ODataQuery, Page, SiteUser, SiteUserLookup, User};

/// Hidden list holding every user known to a site.
pub const USER_INFO_LIST: &str = "User Information List";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnsureUser<'a> {
    logon_name: &'a str,
}

impl GraphClient {
    pub fn build_users(&self, query: &ODataQuery) -> Result<HttpRequest, GraphError> {
        Ok(HttpRequest::get(self.graph_url(&["users"], &query.pairs())?))
    }

    /// Directory users, with `$select`/`$filter`/`$expand` passed through.
    pub fn users(&self, query: &ODataQuery) -> Result<Vec<User>, GraphError> {
        self.get_all(self.build_users(query)?, "listing users")
    }

    pub fn build_site_users(&self, site_id: &str) -> Result<HttpRequest, GraphError> {
        Ok(HttpRequest::get(self.graph_url(
            &["sites", site_id, "lists", USER_INFO_LIST, "items"],
            &[("$expand", "fields($select=Id,Email)")],
        )?))
    }

    /// Every entry of the site's user information list.
    pub fn site_users(&self, site_id: &str) -> Result<Vec<ListItem>, GraphError> {
        self.get_all(self.build_site_users(site_id)?, "listing site users")
    }

    pub fn build_site_user(
        &self,
        site_id: &str,
        lookup: SiteUserLookup<'_>,
    ) -> Result<HttpRequest, GraphError> {
        let url = match lookup {
            SiteUserLookup::Id(id) => {
                self.graph_url(&["sites", site_id, "lists", USER_INFO_LIST, "items", id], &[])?
            }
            SiteUserLookup::Email(email) => {
                let filter = format!("fields/UserName eq {}", odata_string(email));
                self.graph_url(
                    &["sites", site_id, "lists", USER_INFO_LIST, "items"],
                    &[("$filter", filter.as_str())],
                )?
            }
        };
        Ok(HttpRequest::get(url).with_header("prefer", GRAPH_PREFER_NON_INDEXED))
    }

    /// One entry of the site's user information list, by item id or by
    /// e-mail. An e-mail lookup with no match is `NotFound`.
    pub fn site_user(
        &self,
        site_id: &str,
        lookup: SiteUserLookup<'_>,
    ) -> Result<ListItem, GraphError> {
        let request = self.build_site_user(site_id, lookup)?;
        let response = self.send(Api::Graph, request, "getting site user")?;
        match lookup {
            SiteUserLookup::Id(_) => parse_json(&response),
            SiteUserLookup::Email(email) => {
                let page: Page<ListItem> = parse_json(&response)?;
                page.value.into_iter().next().ok_or_else(|| GraphError::NotFound {
                    body: format!("no user with e-mail {email} in site {site_id}"),
                })
            }
        }
    }

    pub fn build_ensure_user(&self, site_url: &str, logon_name: &str) -> Result<HttpRequest, GraphError> {
        let url = sharepoint::api_url(site_url, "web/ensureuser")?;
        let body = serde_json::to_vec(&EnsureUser { logon_name })
            .map_err(|e| GraphError::Serialization(e.to_string()))?;
        Ok(sharepoint::request(HttpMethod::Post, url).with_body(SP_ODATA_VERBOSE, body))
    }

    /// Make sure `logon_name` (usually an e-mail address) exists in the site's
    /// user list. Uses SharePoint REST; needs `SP_*` credentials.
    pub fn ensure_user(&self, site_url: &str, logon_name: &str) -> Result<SiteUser, GraphError> {
        let request = self.build_ensure_user(site_url, logon_name)?;
        let response = self.send(Api::SharePoint, request, "ensuring site user")?;
        parse_verbose(&response)
    }
}
