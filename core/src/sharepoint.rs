//! URL and request helpers for the SharePoint REST (`/_api`) operations.
//!
//! SharePoint REST addresses resources with OData function calls embedded in
//! the path, e.g. `getByTitle('Tasks')`. String arguments are quoted OData
//! literals, percent-encoded just enough to survive as a URI.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::client::{odata_string, SP_ODATA_VERBOSE};
use crate::error::GraphError;
use crate::http::{HttpMethod, HttpRequest};

/// Characters escaped inside an OData literal. `'` and `/` stay literal.
const LITERAL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// `value` as a quoted, URI-safe OData string literal.
pub(crate) fn literal(value: &str) -> String {
    utf8_percent_encode(&odata_string(value), LITERAL).to_string()
}

fn parse(raw: &str) -> Result<Url, GraphError> {
    let url = Url::parse(raw).map_err(|e| GraphError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(GraphError::InvalidUrl {
            url: raw.to_string(),
            reason: "expected an absolute http(s) URL".into(),
        });
    }
    Ok(url)
}

/// `{site_url}/_api/{rest}`, with the site URL normalised.
pub(crate) fn api_url(site_url: &str, rest: &str) -> Result<String, GraphError> {
    let site = parse(site_url)?;
    Ok(format!("{}/_api/{rest}", site.as_str().trim_end_matches('/')))
}

/// A file URL's site: its origin plus the first two path segments
/// (`/sites/<name>`), and its decoded file name.
pub(crate) fn split_file_url(file_url: &str) -> Result<(String, String), GraphError> {
    let url = parse(file_url)?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 3 {
        return Err(GraphError::InvalidUrl {
            url: file_url.to_string(),
            reason: "expected {site}/<library>/<file>".into(),
        });
    }
    let site = format!(
        "{}/{}/{}",
        url.origin().ascii_serialization(),
        segments[0],
        segments[1]
    );
    let name = decode(segments[segments.len() - 1]);
    Ok((site, name))
}

/// Resolve `folder` against the site's path. `\` separators are accepted; a
/// leading `/` makes the folder server-relative already.
///
/// Returns the decoded path segments, e.g. `["sites", "team", "Shared Documents", "2024"]`.
pub(crate) fn server_relative_segments(
    site_url: &str,
    folder: &str,
) -> Result<Vec<String>, GraphError> {
    let site = parse(site_url)?;
    let folder = folder.replace('\\', "/");
    let mut segments: Vec<String> = Vec::new();
    if !folder.starts_with('/') {
        segments.extend(
            site.path()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(decode),
        );
    }
    segments.extend(
        folder
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string),
    );
    Ok(segments)
}

pub(crate) fn join_path(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Request carrying the verbose OData `Accept` header.
pub(crate) fn request(method: HttpMethod, url: String) -> HttpRequest {
    HttpRequest::new(method, url).with_header("accept", SP_ODATA_VERBOSE)
}
