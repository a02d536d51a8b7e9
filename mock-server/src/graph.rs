//! Graph v1.0 routes: sites, lists, items, term store, drives, users.

use axum::{
    extract::{OriginalUri, Path, State},
    http::{header::HOST, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Map, Value};

use crate::graph_error;
use crate::odata::{self, FieldsExpansion};
use crate::state::{ItemData, MockData, MockState, SiteData};

const PREFER_NON_INDEXED: &str = "HonorNonIndexedQueriesWarningMayFailRandomly";

pub fn routes() -> Router<MockState> {
    Router::new()
        .route("/sites", get(list_sites))
        .route("/sites/{site}/lists", get(list_lists))
        .route("/sites/{site}/lists/{list}/items", get(list_items).post(create_item))
        .route(
            "/sites/{site}/lists/{list}/items/{item}",
            get(get_item).delete(delete_item),
        )
        .route("/sites/{site}/lists/{list}/items/{item}/fields", patch(update_fields))
        .route("/sites/{site}/termStore/groups", get(term_groups))
        .route("/sites/{site}/drives", get(list_drives))
        .route("/sites/{site}/drives/{drive}/root/children", get(root_children))
        .route(
            "/sites/{site}/drives/{drive}/items/{item}/children",
            get(folder_children),
        )
        .route("/users", get(list_users))
}

/// Where a collection response's next link should point.
struct Paging {
    host: String,
    path: String,
    query: Vec<(String, String)>,
}

impl Paging {
    fn new(headers: &HeaderMap, uri: &Uri) -> Self {
        Self {
            host: headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("localhost")
                .to_string(),
            path: uri.path().to_string(),
            query: odata::pairs(uri.query()),
        }
    }

    fn param(&self, key: &str) -> Option<&str> {
        odata::param(&self.query, key)
    }

    fn respond(&self, data: &MockData, items: Vec<Value>) -> Response {
        Json(odata::page(items, data.page_size, &self.host, &self.path, &self.query)).into_response()
    }
}

fn site_not_found(site: &str) -> Response {
    graph_error(StatusCode::NOT_FOUND, "itemNotFound", format!("Requested site {site} could not be found"))
}

fn list_not_found(list: &str) -> Response {
    graph_error(StatusCode::NOT_FOUND, "itemNotFound", format!("List '{list}' does not exist"))
}

fn item_not_found(item: &str) -> Response {
    graph_error(StatusCode::NOT_FOUND, "itemNotFound", format!("Item {item} not found"))
}

fn item_json(site_url: &str, list: &str, item: &ItemData, expansion: &FieldsExpansion) -> Value {
    let mut value = json!({
        "id": item.id,
        "webUrl": format!("{site_url}/Lists/{list}/DispForm.aspx?ID={}", item.id),
    });
    if let Some(fields) = odata::project_fields(&item.fields, expansion) {
        value["fields"] = fields;
    }
    value
}

async fn list_sites(State(state): State<MockState>, headers: HeaderMap, OriginalUri(uri): OriginalUri) -> Response {
    let paging = Paging::new(&headers, &uri);
    let data = state.lock();
    let search = paging.param("search").map(str::to_lowercase);
    let sites = data
        .sites
        .iter()
        .filter(|site| match &search {
            Some(term) => {
                site.display_name.to_lowercase().contains(term) || site.name.to_lowercase().contains(term)
            }
            None => true,
        })
        .map(SiteData::to_json)
        .collect();
    paging.respond(&data, sites)
}

async fn list_lists(
    State(state): State<MockState>,
    Path(site_key): Path<String>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let paging = Paging::new(&headers, &uri);
    let mut data = state.lock();
    let Some(site) = data.site_mut(&site_key) else {
        return site_not_found(&site_key);
    };
    let lists = site.lists.iter().map(|l| l.to_json(site)).collect();
    paging.respond(&data, lists)
}

async fn list_items(
    State(state): State<MockState>,
    Path((site_key, list_key)): Path<(String, String)>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let paging = Paging::new(&headers, &uri);
    let clauses = match paging.param("$filter") {
        Some(filter) => {
            let prefers = headers
                .get("prefer")
                .and_then(|h| h.to_str().ok())
                .is_some_and(|p| p.contains(PREFER_NON_INDEXED));
            if !prefers {
                return graph_error(
                    StatusCode::BAD_REQUEST,
                    "invalidRequest",
                    "Field cannot be referenced in filter or orderby as it is not indexed.",
                );
            }
            match odata::parse_filter(filter) {
                Ok(clauses) => clauses,
                Err(message) => return graph_error(StatusCode::BAD_REQUEST, "invalidRequest", message),
            }
        }
        None => Vec::new(),
    };
    let expansion = odata::fields_expansion(paging.param("$expand"));

    let mut data = state.lock();
    let Some(site) = data.site_mut(&site_key) else {
        return site_not_found(&site_key);
    };
    let site_url = site.web_url.clone();
    let Some(list) = site.list_mut(&list_key) else {
        return list_not_found(&list_key);
    };
    let items = list
        .items
        .iter()
        .filter(|item| odata::matches(&json!({ "fields": item.fields }), &clauses))
        .map(|item| item_json(&site_url, &list.name, item, &expansion))
        .collect();
    paging.respond(&data, items)
}

async fn get_item(
    State(state): State<MockState>,
    Path((site_key, list_key, item_id)): Path<(String, String, String)>,
) -> Response {
    let mut data = state.lock();
    let Some(site) = data.site_mut(&site_key) else {
        return site_not_found(&site_key);
    };
    let site_url = site.web_url.clone();
    let Some(list) = site.list_mut(&list_key) else {
        return list_not_found(&list_key);
    };
    match list.items.iter().find(|i| i.id == item_id) {
        Some(item) => Json(item_json(&site_url, &list.name, item, &FieldsExpansion::All)).into_response(),
        None => item_not_found(&item_id),
    }
}

async fn create_item(
    State(state): State<MockState>,
    Path((site_key, list_key)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let Some(fields) = body.get("fields").and_then(Value::as_object).cloned() else {
        return graph_error(StatusCode::BAD_REQUEST, "invalidRequest", "Request body must contain 'fields'");
    };
    let mut data = state.lock();
    let Some(site) = data.site_mut(&site_key) else {
        return site_not_found(&site_key);
    };
    let site_url = site.web_url.clone();
    let Some(list) = site.list_mut(&list_key) else {
        return list_not_found(&list_key);
    };
    let item = list.insert(fields);
    let body = item_json(&site_url, &list.name, &item, &FieldsExpansion::All);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_fields(
    State(state): State<MockState>,
    Path((site_key, list_key, item_id)): Path<(String, String, String)>,
    Json(patch): Json<Map<String, Value>>,
) -> Response {
    let mut data = state.lock();
    let Some(list) = data.site_mut(&site_key).and_then(|s| s.list_mut(&list_key)) else {
        return list_not_found(&list_key);
    };
    let Some(item) = list.items.iter_mut().find(|i| i.id == item_id) else {
        return item_not_found(&item_id);
    };
    for (key, value) in patch {
        if key != "id" {
            item.fields.insert(key, value);
        }
    }
    Json(Value::Object(item.fields.clone())).into_response()
}

async fn delete_item(
    State(state): State<MockState>,
    Path((site_key, list_key, item_id)): Path<(String, String, String)>,
) -> Response {
    let mut data = state.lock();
    let Some(list) = data.site_mut(&site_key).and_then(|s| s.list_mut(&list_key)) else {
        return list_not_found(&list_key);
    };
    let before = list.items.len();
    list.items.retain(|i| i.id != item_id);
    if list.items.len() == before {
        return item_not_found(&item_id);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn term_groups(
    State(state): State<MockState>,
    Path(site_key): Path<String>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let paging = Paging::new(&headers, &uri);
    let mut data = state.lock();
    let Some(site) = data.site_mut(&site_key) else {
        return site_not_found(&site_key);
    };
    let groups = site.term_groups.clone();
    paging.respond(&data, groups)
}

async fn list_drives(
    State(state): State<MockState>,
    Path(site_key): Path<String>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let paging = Paging::new(&headers, &uri);
    let mut data = state.lock();
    let Some(site) = data.site_mut(&site_key) else {
        return site_not_found(&site_key);
    };
    let drives = site
        .drives
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "name": d.name,
                "driveType": "documentLibrary",
                "webUrl": format!("{}/{}", site.web_url, d.name),
            })
        })
        .collect();
    paging.respond(&data, drives)
}

async fn root_children(
    State(state): State<MockState>,
    Path((site_key, drive_id)): Path<(String, String)>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    children(state, &site_key, &drive_id, None, Paging::new(&headers, &uri))
}

async fn folder_children(
    State(state): State<MockState>,
    Path((site_key, drive_id, item_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    children(state, &site_key, &drive_id, Some(&item_id), Paging::new(&headers, &uri))
}

fn children(state: MockState, site_key: &str, drive_id: &str, folder: Option<&str>, paging: Paging) -> Response {
    let mut data = state.lock();
    let Some(drive) = data
        .site_mut(site_key)
        .and_then(|s| s.drives.iter().find(|d| d.id == drive_id))
    else {
        return graph_error(StatusCode::NOT_FOUND, "itemNotFound", format!("Drive {drive_id} not found"));
    };
    let items = match folder {
        None => drive.root.clone(),
        Some(id) => match drive.folders.get(id) {
            Some(items) => items.clone(),
            None => return item_not_found(id),
        },
    };
    paging.respond(&data, items)
}

async fn list_users(State(state): State<MockState>, headers: HeaderMap, OriginalUri(uri): OriginalUri) -> Response {
    let paging = Paging::new(&headers, &uri);
    let clauses = match paging.param("$filter").map(odata::parse_filter).transpose() {
        Ok(clauses) => clauses.unwrap_or_default(),
        Err(message) => return graph_error(StatusCode::BAD_REQUEST, "Request_UnsupportedQuery", message),
    };
    let select: Option<Vec<&str>> = paging.param("$select").map(|s| s.split(',').map(str::trim).collect());

    let data = state.lock();
    let users = data
        .users
        .iter()
        .filter(|user| odata::matches(user, &clauses))
        .map(|user| match (&select, user.as_object()) {
            (Some(keys), Some(object)) => Value::Object(
                object
                    .iter()
                    .filter(|(k, _)| k.as_str() == "id" || keys.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => user.clone(),
        })
        .collect();
    paging.respond(&data, users)
}
