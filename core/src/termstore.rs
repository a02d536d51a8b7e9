//! Term store (managed metadata) groups of a site.

use crate::client::GraphClient;
use crate::error::GraphError;
use crate::http::HttpRequest;
use crate::types::TermGroup;

impl GraphClient {
    pub fn build_termstore_groups(&self, site_id: &str) -> Result<HttpRequest, GraphError> {
        Ok(HttpRequest::get(
            self.graph_url(&["sites", site_id, "termStore", "groups"], &[])?,
        ))
    }

    pub fn termstore_groups(&self, site_id: &str) -> Result<Vec<TermGroup>, GraphError> {
        self.get_all(self.build_termstore_groups(site_id)?, "listing term store groups")
    }
}
