//! Document libraries: listing through Graph, file transfer and folder
//! creation through SharePoint REST.

use serde_json::json;
use tracing::debug;

use crate::client::{parse_verbose, Api, GraphClient, SP_ODATA_VERBOSE};
use crate::error::GraphError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::sharepoint;
use crate::types::{DownloadedFile, Drive, DriveItem, FolderInfo, UploadedFile};

/// SharePoint answers a create for an existing folder with 409 or 500 and an
/// "already exists" message.
fn folder_exists(response: &HttpResponse) -> bool {
    matches!(response.status, 409 | 500) && response.text().to_lowercase().contains("already exist")
}

impl GraphClient {
    pub fn build_drives(&self, site_id: &str) -> Result<HttpRequest, GraphError> {
        Ok(HttpRequest::get(self.graph_url(&["sites", site_id, "drives"], &[])?))
    }

    /// Document libraries of a site.
    pub fn drives(&self, site_id: &str) -> Result<Vec<Drive>, GraphError> {
        self.get_all(self.build_drives(site_id)?, "listing document libraries")
    }

    pub fn build_drive_items(
        &self,
        site_id: &str,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<HttpRequest, GraphError> {
        let url = match folder_id {
            Some(folder) => self.graph_url(
                &["sites", site_id, "drives", drive_id, "items", folder, "children"],
                &[],
            )?,
            None => self.graph_url(&["sites", site_id, "drives", drive_id, "root", "children"], &[])?,
        };
        Ok(HttpRequest::get(url))
    }

    /// Files and folders at the root of a library, or inside `folder_id`.
    pub fn drive_items(
        &self,
        site_id: &str,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveItem>, GraphError> {
        let request = self.build_drive_items(site_id, drive_id, folder_id)?;
        self.get_all(request, "listing document library items")
    }

    pub fn build_download_file(&self, file_url: &str) -> Result<HttpRequest, GraphError> {
        let (site, _) = sharepoint::split_file_url(file_url)?;
        let url = sharepoint::api_url(
            &site,
            &format!("Web/GetFileByUrl(@url)/$value?@url={}", sharepoint::literal(file_url)),
        )?;
        Ok(sharepoint::request(HttpMethod::Get, url).with_timeout(self.file_timeout()))
    }

    /// Download a file given its absolute URL.
    pub fn download_file(&self, file_url: &str) -> Result<DownloadedFile, GraphError> {
        let (_, name) = sharepoint::split_file_url(file_url)?;
        let request = self.build_download_file(file_url)?;
        let response = self.send(Api::SharePoint, request, "downloading file")?;
        Ok(DownloadedFile {
            name,
            url: file_url.to_string(),
            data: response.body,
        })
    }

    pub fn build_delete_file(&self, file_url: &str) -> Result<HttpRequest, GraphError> {
        let (site, _) = sharepoint::split_file_url(file_url)?;
        let url = sharepoint::api_url(
            &site,
            &format!("Web/GetFileByUrl(@url)?@url={}", sharepoint::literal(file_url)),
        )?;
        Ok(sharepoint::request(HttpMethod::Delete, url))
    }

    pub fn delete_file(&self, file_url: &str) -> Result<(), GraphError> {
        let request = self.build_delete_file(file_url)?;
        self.send(Api::SharePoint, request, "deleting file")?;
        Ok(())
    }

    fn build_create_folder(&self, site_url: &str, server_relative_url: &str) -> Result<HttpRequest, GraphError> {
        let url = sharepoint::api_url(site_url, "web/folders")?;
        let body = json!({
            "__metadata": {"type": "SP.Folder"},
            "ServerRelativeUrl": server_relative_url,
        });
        Ok(sharepoint::request(HttpMethod::Post, url).with_body(SP_ODATA_VERBOSE, body.to_string().into_bytes()))
    }

    /// Create `folder_path` and any missing parents. The path is relative to
    /// the site unless it starts with `/`; existing folders are fine.
    pub fn create_folder(&self, site_url: &str, folder_path: &str) -> Result<FolderInfo, GraphError> {
        let segments = sharepoint::server_relative_segments(site_url, folder_path)?;
        let Some(name) = segments.last().cloned() else {
            return Err(GraphError::InvalidUrl {
                url: folder_path.to_string(),
                reason: "empty folder path".into(),
            });
        };

        for depth in 1..=segments.len() {
            let path = sharepoint::join_path(&segments[..depth]);
            let request = self.build_create_folder(site_url, &path)?;
            let response = self.send_tolerating(Api::SharePoint, request, "creating folder", folder_exists)?;
            if !response.is_success() {
                debug!(path = %path, "folder already exists");
            }
        }

        Ok(FolderInfo {
            name,
            server_relative_url: sharepoint::join_path(&segments),
        })
    }

    pub fn build_upload_file(
        &self,
        site_url: &str,
        folder_path: &str,
        file_name: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<HttpRequest, GraphError> {
        let folder = sharepoint::join_path(&sharepoint::server_relative_segments(site_url, folder_path)?);
        let url = sharepoint::api_url(
            site_url,
            &format!(
                "web/GetFolderByServerRelativeUrl({})/Files/add(url={},overwrite={overwrite})",
                sharepoint::literal(&folder),
                sharepoint::literal(file_name),
            ),
        )?;
        Ok(sharepoint::request(HttpMethod::Post, url)
            .with_body("application/octet-stream", content)
            .with_timeout(self.file_timeout()))
    }

    /// Upload `content` as `folder_path/file_name`.
    pub fn upload_file(
        &self,
        site_url: &str,
        folder_path: &str,
        file_name: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<UploadedFile, GraphError> {
        let request = self.build_upload_file(site_url, folder_path, file_name, content, overwrite)?;
        let response = self.send(Api::SharePoint, request, "uploading file")?;
        let mut file: UploadedFile = parse_verbose(&response)?;
        if file.name.is_empty() {
            file.name = file_name.to_string();
        }
        if file.server_relative_url.is_empty() {
            let folder = sharepoint::server_relative_segments(site_url, folder_path)?;
            file.server_relative_url = format!("{}/{file_name}", sharepoint::join_path(&folder));
        }
        Ok(file)
    }
}
