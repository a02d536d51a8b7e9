//! Site discovery. Site ids returned here feed every other Graph call.

use crate::client::GraphClient;
use crate::error::GraphError;
use crate::http::HttpRequest;
use crate::types::Site;

impl GraphClient {
    pub fn build_sites(&self, search: Option<&str>) -> Result<HttpRequest, GraphError> {
        let query = match search {
            Some(term) => vec![("search", term)],
            None => Vec::new(),
        };
        Ok(HttpRequest::get(self.graph_url(&["sites"], &query)?))
    }

    /// Every site in the tenant.
    pub fn sites(&self) -> Result<Vec<Site>, GraphError> {
        self.get_all(self.build_sites(None)?, "listing sites")
    }

    /// Sites matching a keyword search.
    pub fn search_sites(&self, term: &str) -> Result<Vec<Site>, GraphError> {
        self.get_all(self.build_sites(Some(term))?, "searching sites")
    }
}
