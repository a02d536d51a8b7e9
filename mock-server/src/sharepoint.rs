//! SharePoint REST (`/_api`) routes. The paths are OData function calls, so
//! one wildcard route dispatches on the decoded remainder.

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tracing::debug;

use crate::odata;
use crate::state::{MockData, MockState, USER_INFO_LIST};

pub fn routes() -> Router<MockState> {
    Router::new().route("/sites/{site}/_api/{*rest}", any(dispatch))
}

/// SharePoint-style error body.
fn sp_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = json!({
        "error": { "code": code, "message": { "lang": "en-US", "value": message.into() } }
    });
    (status, Json(body)).into_response()
}

fn verbose(status: StatusCode, d: Value) -> Response {
    (status, Json(json!({ "d": d }))).into_response()
}

/// Parses a leading `'...'` literal, unescaping doubled quotes. Returns the
/// value and whatever follows the closing quote.
fn quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('\'')?;
    let mut value = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\'' {
            value.push(c);
        } else if let Some((_, '\'')) = chars.peek() {
            chars.next();
            value.push('\'');
        } else {
            return Some((value, &body[i + 1..]));
        }
    }
    None
}

/// Splits `name(arg)rest` into the unquoted `arg` and `rest`.
fn call<'a>(input: &'a str, name: &str) -> Option<(String, &'a str)> {
    let args = input.strip_prefix(name)?.strip_prefix('(')?;
    if args.starts_with('\'') {
        let (value, rest) = quoted(args)?;
        Some((value, rest.strip_prefix(')')?))
    } else {
        let end = args.find(')')?;
        Some((args[..end].to_string(), &args[end + 1..]))
    }
}

/// `https://host/sites/x/a.txt` -> `/sites/x/a.txt`
fn server_relative(file_url: &str) -> String {
    match url::Url::parse(file_url) {
        Ok(url) => percent_decode(url.path()),
        Err(_) => file_url.to_string(),
    }
}

fn percent_decode(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

async fn dispatch(
    State(state): State<MockState>,
    Path((site, rest)): Path<(String, String)>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let rest = rest.trim_start_matches('/');
    let query = odata::pairs(uri.query());
    let mut data = state.lock();
    debug!(%method, %site, %rest, "sharepoint request");

    if method == Method::POST && rest.eq_ignore_ascii_case("web/ensureuser") {
        return ensure_user(&mut data, &site, &body);
    }
    if method == Method::POST && rest.eq_ignore_ascii_case("web/folders") {
        return create_folder(&mut data, &body);
    }
    if let Some(rest) = rest.strip_prefix("lists/") {
        if let Some((title, tail)) = call(rest, "getByTitle") {
            if let Some((item, _)) = tail.strip_prefix('/').and_then(|t| call(t, "items")) {
                return attachments(&data, &site, &title, &item);
            }
        }
    }
    if let Some(rest) = rest.strip_prefix("Web/") {
        if let Some((path, tail)) = call(rest, "GetFileByServerRelativeUrl") {
            if method == Method::GET && tail == "/$value" {
                return download(&data, &path);
            }
        }
        if let Some((_, tail)) = call(rest, "GetFileByUrl") {
            let Some((file_url, _)) = odata::param(&query, "@url").and_then(quoted) else {
                return sp_error(
                    StatusCode::BAD_REQUEST,
                    "-1, Microsoft.SharePoint.Client.InvalidClientQueryException",
                    "The @url parameter is missing or not a string literal.",
                );
            };
            let path = server_relative(&file_url);
            return if method == Method::GET && tail == "/$value" {
                download(&data, &path)
            } else if method == Method::DELETE && tail.is_empty() {
                match data.files.remove(&path) {
                    Some(_) => StatusCode::OK.into_response(),
                    None => file_not_found(&path),
                }
            } else {
                sp_error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "-1, System.NotSupportedException",
                    "Unsupported file operation.",
                )
            };
        }
    }
    if let Some(rest) = rest.strip_prefix("web/") {
        if let Some((folder, tail)) = call(rest, "GetFolderByServerRelativeUrl") {
            if method == Method::POST {
                let args = tail.strip_prefix("/Files/add(").and_then(|a| a.strip_suffix(')'));
                if let Some(args) = args {
                    return upload(&mut data, &folder, args, body);
                }
            }
        }
    }

    sp_error(
        StatusCode::NOT_FOUND,
        "-1, Microsoft.SharePoint.Client.InvalidClientQueryException",
        format!("No mock route for {method} {rest}"),
    )
}

fn file_not_found(path: &str) -> Response {
    sp_error(
        StatusCode::NOT_FOUND,
        "-2130575338, System.IO.FileNotFoundException",
        format!("File Not Found: {path}"),
    )
}

fn ensure_user(data: &mut MockData, site: &str, body: &[u8]) -> Response {
    let logon = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("logonName").and_then(Value::as_str).map(str::to_string));
    let Some(logon) = logon else {
        return sp_error(StatusCode::BAD_REQUEST, "-1, ArgumentException", "logonName is required");
    };
    let Some(directory_user) = data
        .users
        .iter()
        .find(|u| u["mail"].as_str().is_some_and(|m| m.eq_ignore_ascii_case(&logon)))
        .cloned()
    else {
        return sp_error(
            StatusCode::NOT_FOUND,
            "-2146232832, Microsoft.SharePoint.SPException",
            format!("The specified user {logon} could not be found."),
        );
    };
    let Some(list) = data.site_mut(site).and_then(|s| s.list_mut(USER_INFO_LIST)) else {
        return sp_error(StatusCode::NOT_FOUND, "-1, SPException", format!("site {site} not found"));
    };

    let title = directory_user["displayName"].as_str().unwrap_or_default().to_string();
    let existing = list.items.iter().find(|i| {
        i.fields
            .get("UserName")
            .and_then(Value::as_str)
            .is_some_and(|u| u.eq_ignore_ascii_case(&logon))
    });
    let id = match existing {
        Some(item) => item.id.clone(),
        None => {
            let mut fields = serde_json::Map::new();
            fields.insert("Title".into(), json!(title));
            fields.insert("Email".into(), json!(logon));
            fields.insert("UserName".into(), json!(logon));
            list.insert(fields).id
        }
    };

    verbose(
        StatusCode::OK,
        json!({
            "__metadata": { "type": "SP.User" },
            "Id": id.parse::<i64>().unwrap_or_default(),
            "LoginName": format!("i:0#.f|membership|{logon}"),
            "Title": title,
            "Email": logon,
            "IsSiteAdmin": false,
        }),
    )
}

fn attachments(data: &MockData, site: &str, list_title: &str, item: &str) -> Response {
    let prefix = format!("/sites/{site}/Lists/{list_title}/Attachments/{item}/");
    let mut files: Vec<Value> = data
        .files
        .keys()
        .filter_map(|path| {
            let name = path.strip_prefix(&prefix)?;
            Some(json!({
                "__metadata": { "type": "SP.Attachment" },
                "FileName": name,
                "ServerRelativeUrl": path,
            }))
        })
        .collect();
    files.sort_by(|a, b| a["FileName"].as_str().cmp(&b["FileName"].as_str()));
    verbose(
        StatusCode::OK,
        json!({ "Title": list_title, "AttachmentFiles": { "results": files } }),
    )
}

fn download(data: &MockData, path: &str) -> Response {
    match data.files.get(path) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => file_not_found(path),
    }
}

fn create_folder(data: &mut MockData, body: &[u8]) -> Response {
    let path = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v["ServerRelativeUrl"].as_str().map(str::to_string));
    let Some(path) = path else {
        return sp_error(StatusCode::BAD_REQUEST, "-1, ArgumentException", "ServerRelativeUrl is required");
    };
    if data.folders.contains(&path) {
        return sp_error(
            StatusCode::CONFLICT,
            "-2130575257, Microsoft.SharePoint.SPException",
            format!("A file or folder with the name {path} already exists."),
        );
    }
    let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or_default();
    if !parent.is_empty() && !data.folders.contains(parent) {
        return file_not_found(parent);
    }
    data.folders.insert(path.clone());
    let name = path.rsplit('/').next().unwrap_or_default().to_string();
    verbose(
        StatusCode::CREATED,
        json!({ "__metadata": { "type": "SP.Folder" }, "Name": name, "ServerRelativeUrl": path }),
    )
}

/// `args` is `url='name',overwrite=true`.
fn upload(data: &mut MockData, folder: &str, args: &str, body: Bytes) -> Response {
    let Some((name, tail)) = args.strip_prefix("url=").and_then(quoted) else {
        return sp_error(StatusCode::BAD_REQUEST, "-1, ArgumentException", "url is required");
    };
    let overwrite = tail.trim_start_matches(',') != "overwrite=false";
    if !data.folders.contains(folder) {
        return file_not_found(folder);
    }
    let path = format!("{folder}/{name}");
    if !overwrite && data.files.contains_key(&path) {
        return sp_error(
            StatusCode::BAD_REQUEST,
            "-2130575257, Microsoft.SharePoint.SPException",
            format!("A file with the name {path} already exists."),
        );
    }
    let length = body.len();
    data.files.insert(path.clone(), body.to_vec());
    verbose(
        StatusCode::OK,
        json!({
            "__metadata": { "type": "SP.File" },
            "Name": name,
            "ServerRelativeUrl": path,
            "Length": length.to_string(),
            "TimeCreated": "2024-01-01T00:00:00Z",
            "TimeLastModified": "2024-01-01T00:00:00Z",
        }),
    )
}
