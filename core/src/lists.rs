//! SharePoint lists and list items.
//!
//! List and item CRUD goes through Graph. Attachments are only exposed by
//! SharePoint REST, so those calls use the SharePoint token and verbose OData.

use serde::{Deserialize, Serialize};

use crate::client::{parse_json, parse_verbose, Api, GraphClient, GRAPH_PREFER_NON_INDEXED};
use crate::error::GraphError;
use crate::http::{HttpMethod, HttpRequest};
use crate::sharepoint;
use crate::types::{Attachment, DownloadedFile, FieldMap, ListItem, SpList};

#[derive(Serialize)]
struct NewItem<'a, T: ?Sized> {
    fields: &'a T,
}

#[derive(Deserialize)]
struct Results<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize)]
struct ItemAttachments {
    #[serde(rename = "AttachmentFiles")]
    attachment_files: Option<Results<Attachment>>,
}

fn json_body<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, GraphError> {
    serde_json::to_vec(value).map_err(|e| GraphError::Serialization(e.to_string()))
}

impl GraphClient {
    pub fn build_lists(&self, site_id: &str) -> Result<HttpRequest, GraphError> {
        Ok(HttpRequest::get(self.graph_url(&["sites", site_id, "lists"], &[])?))
    }

    /// All lists in a site.
    pub fn lists(&self, site_id: &str) -> Result<Vec<SpList>, GraphError> {
        self.get_all(self.build_lists(site_id)?, "listing lists")
    }

    /// `filter` is sent verbatim as `$filter`; `select` restricts the
    /// expanded `fields`.
    pub fn build_list_items(
        &self,
        site_id: &str,
        list_id: &str,
        filter: Option<&str>,
        select: Option<&str>,
    ) -> Result<HttpRequest, GraphError> {
        let expand = match select {
            Some(select) => format!("fields($select={select})"),
            None => "fields".to_string(),
        };
        let mut query = vec![("$expand", expand.as_str())];
        if let Some(filter) = filter {
            query.push(("$filter", filter));
        }
        let url = self.graph_url(&["sites", site_id, "lists", list_id, "items"], &query)?;
        Ok(HttpRequest::get(url).with_header("prefer", GRAPH_PREFER_NON_INDEXED))
    }

    /// Every item in a list, optionally filtered with an OData `$filter`.
    pub fn list_items(
        &self,
        site_id: &str,
        list_id: &str,
        filter: Option<&str>,
        select: Option<&str>,
    ) -> Result<Vec<ListItem>, GraphError> {
        let request = self.build_list_items(site_id, list_id, filter, select)?;
        self.get_all(request, "listing list items")
    }

    pub fn build_list_item(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
    ) -> Result<HttpRequest, GraphError> {
        let url = self.graph_url(&["sites", site_id, "lists", list_id, "items", item_id], &[])?;
        Ok(HttpRequest::get(url).with_header("prefer", GRAPH_PREFER_NON_INDEXED))
    }

    pub fn list_item(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
    ) -> Result<ListItem, GraphError> {
        let request = self.build_list_item(site_id, list_id, item_id)?;
        let response = self.send(Api::Graph, request, "getting list item")?;
        parse_json(&response)
    }

    pub fn build_create_list_item<T: Serialize + ?Sized>(
        &self,
        site_id: &str,
        list_id: &str,
        fields: &T,
    ) -> Result<HttpRequest, GraphError> {
        let url = self.graph_url(&["sites", site_id, "lists", list_id, "items"], &[])?;
        let body = json_body(&NewItem { fields })?;
        Ok(HttpRequest::new(HttpMethod::Post, url).with_body("application/json", body))
    }

    /// Create an item from its field values; returns the created item.
    pub fn create_list_item<T: Serialize + ?Sized>(
        &self,
        site_id: &str,
        list_id: &str,
        fields: &T,
    ) -> Result<ListItem, GraphError> {
        let request = self.build_create_list_item(site_id, list_id, fields)?;
        let response = self.send(Api::Graph, request, "creating list item")?;
        parse_json(&response)
    }

    pub fn build_update_list_item<T: Serialize + ?Sized>(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
        fields: &T,
    ) -> Result<HttpRequest, GraphError> {
        let url = self.graph_url(
            &["sites", site_id, "lists", list_id, "items", item_id, "fields"],
            &[],
        )?;
        Ok(HttpRequest::new(HttpMethod::Patch, url).with_body("application/json", json_body(fields)?))
    }

    /// Patch some fields of an item; returns the item's full field set.
    pub fn update_list_item<T: Serialize + ?Sized>(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
        fields: &T,
    ) -> Result<FieldMap, GraphError> {
        let request = self.build_update_list_item(site_id, list_id, item_id, fields)?;
        let response = self.send(Api::Graph, request, "updating list item")?;
        parse_json(&response)
    }

    pub fn build_delete_list_item(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
    ) -> Result<HttpRequest, GraphError> {
        let url = self.graph_url(&["sites", site_id, "lists", list_id, "items", item_id], &[])?;
        Ok(HttpRequest::new(HttpMethod::Delete, url))
    }

    pub fn delete_list_item(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
    ) -> Result<(), GraphError> {
        let request = self.build_delete_list_item(site_id, list_id, item_id)?;
        self.send(Api::Graph, request, "deleting list item")?;
        Ok(())
    }

    pub fn build_list_item_attachments(
        &self,
        site_url: &str,
        list_title: &str,
        item_id: u64,
    ) -> Result<HttpRequest, GraphError> {
        let url = sharepoint::api_url(
            site_url,
            &format!(
                "lists/getByTitle({})/items({item_id})?$select=AttachmentFiles,Title&$expand=AttachmentFiles",
                sharepoint::literal(list_title)
            ),
        )?;
        Ok(sharepoint::request(HttpMethod::Get, url))
    }

    /// Names and server-relative URLs of an item's attachments.
    pub fn list_item_attachments(
        &self,
        site_url: &str,
        list_title: &str,
        item_id: u64,
    ) -> Result<Vec<Attachment>, GraphError> {
        let request = self.build_list_item_attachments(site_url, list_title, item_id)?;
        let response = self.send(Api::SharePoint, request, "listing item attachments")?;
        let item: ItemAttachments = parse_verbose(&response)?;
        Ok(item.attachment_files.map(|f| f.results).unwrap_or_default())
    }

    /// Every attachment of an item, with its content.
    pub fn download_list_item_attachments(
        &self,
        site_url: &str,
        list_title: &str,
        item_id: u64,
    ) -> Result<Vec<DownloadedFile>, GraphError> {
        self.list_item_attachments(site_url, list_title, item_id)?
            .into_iter()
            .map(|attachment| -> Result<DownloadedFile, GraphError> {
                let url = sharepoint::api_url(
                    site_url,
                    &format!(
                        "Web/GetFileByServerRelativeUrl({})/$value",
                        sharepoint::literal(&attachment.server_relative_url)
                    ),
                )?;
                let response = self.send(
                    Api::SharePoint,
                    sharepoint::request(HttpMethod::Get, url).with_timeout(self.file_timeout()),
                    "downloading attachment",
                )?;
                Ok(DownloadedFile {
                    name: attachment.name,
                    url: attachment.server_relative_url,
                    data: response.body,
                })
            })
            .collect()
    }
}
