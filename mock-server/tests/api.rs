use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, MockState};
use serde_json::{json, Value};
use tower::ServiceExt;

const GRAPH_SCOPE: &str = "https%3A%2F%2Fgraph.microsoft.com%2F.default";
const SP_SCOPE: &str = "https%3A%2F%2Fcontoso.sharepoint.com%2F.default";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn token_request(client_id: &str, secret: &str, scope: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/login/tenant-1/oauth2/v2.0/token")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=client_credentials&client_id={client_id}&client_secret={secret}&scope={scope}"
        ))
        .unwrap()
}

async fn token(app: &Router, client_id: &str, secret: &str, scope: &str) -> String {
    let resp = app
        .clone()
        .oneshot(token_request(client_id, secret, scope))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["access_token"].as_str().unwrap().to_string()
}

async fn graph_token(app: &Router) -> String {
    token(app, MockState::GRAPH_CLIENT_ID, MockState::GRAPH_CLIENT_SECRET, GRAPH_SCOPE).await
}

fn authed(method: &str, uri: &str, token: &str) -> http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::HOST, "mock.test")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
}

async fn get(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(authed("GET", uri, token).body(String::new()).unwrap())
        .await
        .unwrap()
}

// --- token endpoint ---

#[tokio::test]
async fn token_is_issued_for_a_known_client() {
    let state = MockState::new();
    let app = app_with_state(state.clone());
    let resp = app
        .oneshot(token_request("graph-client", "graph-secret", GRAPH_SCOPE))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert!(body["access_token"].as_str().unwrap().starts_with("mock-"));
    assert_eq!(state.tokens_issued(), 1);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let resp = app()
        .oneshot(token_request("graph-client", "nope", GRAPH_SCOPE))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_client");
}

#[tokio::test]
async fn unknown_client_is_rejected() {
    let resp = app()
        .oneshot(token_request("stranger", "graph-secret", GRAPH_SCOPE))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "unauthorized_client");
}

#[tokio::test]
async fn scope_must_be_a_default_scope() {
    let resp = app()
        .oneshot(token_request("graph-client", "graph-secret", "User.Read"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_scope");
}

#[tokio::test]
async fn client_assertion_is_accepted() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login/tenant-1/oauth2/v2.0/token")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(format!(
                    "grant_type=client_credentials&client_id=graph-client&scope={GRAPH_SCOPE}\
                     &client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer\
                     &client_assertion=aGVhZGVy.Y2xhaW1z.c2ln"
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

// --- guard ---

#[tokio::test]
async fn missing_token_is_401_and_recorded() {
    let state = MockState::new();
    let app = app_with_state(state.clone());
    let resp = app
        .oneshot(Request::builder().uri("/v1.0/sites").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"]["code"], "InvalidAuthenticationToken");
    let requests = state.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/v1.0/sites");
    assert_eq!(requests[0].authorization, None);
}

#[tokio::test]
async fn sharepoint_token_is_refused_by_graph_routes() {
    let app = app();
    let sp = token(&app, "sp-client", "sp-secret", SP_SCOPE).await;
    let resp = get(&app, "/v1.0/sites", &sp).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let graph = graph_token(&app).await;
    let resp = app
        .clone()
        .oneshot(
            authed("POST", "/sites/team/_api/web/ensureuser", &graph)
                .body(r#"{"logonName":"leeg@contoso.com"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_tokens_stop_working() {
    let state = MockState::new();
    let app = app_with_state(state.clone());
    let token = graph_token(&app).await;
    assert_eq!(get(&app, "/v1.0/sites", &token).await.status(), StatusCode::OK);

    state.revoke_tokens();
    assert_eq!(get(&app, "/v1.0/sites", &token).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn queued_faults_are_served_in_order() {
    let state = MockState::new();
    let app = app_with_state(state.clone());
    let token = graph_token(&app).await;
    state.push_fault(429);
    state.push_fault(503);

    assert_eq!(get(&app, "/v1.0/sites", &token).await.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(get(&app, "/v1.0/sites", &token).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(get(&app, "/v1.0/sites", &token).await.status(), StatusCode::OK);
}

// --- graph ---

#[tokio::test]
async fn site_search_matches_display_name() {
    let app = app();
    let token = graph_token(&app).await;
    let body = body_json(get(&app, "/v1.0/sites?search=arch", &token).await).await;
    let names: Vec<&str> = body["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["archive"]);
}

#[tokio::test]
async fn list_items_page_with_next_link() {
    let state = MockState::new();
    state.set_page_size(2);
    let app = app_with_state(state);
    let token = graph_token(&app).await;

    let first = body_json(get(&app, "/v1.0/sites/root/lists/Tasks/items?$expand=fields", &token).await).await;
    assert_eq!(first["value"].as_array().unwrap().len(), 2);
    let next = first["@odata.nextLink"].as_str().unwrap();
    assert!(next.starts_with("http://mock.test/v1.0/sites/root/lists/Tasks/items?"));

    let path = next.strip_prefix("http://mock.test").unwrap();
    let second = body_json(get(&app, path, &token).await).await;
    assert_eq!(second["value"][0]["fields"]["Title"], "Send invites");
    assert!(second.get("@odata.nextLink").is_none());
}

#[tokio::test]
async fn filter_without_prefer_header_is_rejected() {
    let app = app();
    let token = graph_token(&app).await;
    let uri = "/v1.0/sites/root/lists/Tasks/items?$expand=fields&$filter=fields/Status%20eq%20'Open'";

    let resp = get(&app, uri, &token).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(
            authed("GET", uri, &token)
                .header("prefer", "HonorNonIndexedQueriesWarningMayFailRandomly")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let titles: Vec<Value> = body_json(resp).await["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["fields"]["Title"].clone())
        .collect();
    assert_eq!(titles, [json!("Draft budget"), json!("Send invites")]);
}

#[tokio::test]
async fn item_crud() {
    let app = app();
    let token = graph_token(&app).await;

    let resp = app
        .clone()
        .oneshot(
            authed("POST", "/v1.0/sites/root/lists/Tasks/items", &token)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(r#"{"fields":{"Title":"Order cake","Status":"Open"}}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["id"], "4");

    let resp = app
        .clone()
        .oneshot(
            authed("PATCH", "/v1.0/sites/root/lists/Tasks/items/4/fields", &token)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(r#"{"Status":"Done"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["Status"], "Done");

    let resp = app
        .clone()
        .oneshot(
            authed("DELETE", "/v1.0/sites/root/lists/Tasks/items/4", &token)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = get(&app, "/v1.0/sites/root/lists/Tasks/items/4", &token).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"]["code"], "itemNotFound");
}

#[tokio::test]
async fn users_filter_and_select() {
    let app = app();
    let token = graph_token(&app).await;
    let body = body_json(
        get(&app, "/v1.0/users?$filter=mail%20eq%20'leeg@contoso.com'&$select=displayName", &token).await,
    )
    .await;
    assert_eq!(body["value"], json!([{"id": "u-3", "displayName": "Lee Gu"}]));
}

// --- sharepoint ---

#[tokio::test]
async fn ensure_user_adds_to_user_information_list() {
    let app = app();
    let token = token(&app, "sp-client", "sp-secret", SP_SCOPE).await;

    let resp = app
        .clone()
        .oneshot(
            authed("POST", "/sites/team/_api/web/ensureuser", &token)
                .body(r#"{"logonName":"leeg@contoso.com"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["d"]["Id"], 3);
    assert_eq!(body["d"]["Title"], "Lee Gu");
    assert_eq!(body["d"]["LoginName"], "i:0#.f|membership|leeg@contoso.com");

    let resp = app
        .clone()
        .oneshot(
            authed("POST", "/sites/team/_api/web/ensureuser", &token)
                .body(r#"{"logonName":"ghost@contoso.com"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_json(resp).await["error"]["message"]["value"]
        .as_str()
        .unwrap()
        .contains("could not be found"));
}

#[tokio::test]
async fn attachments_and_file_download() {
    let app = app();
    let token = token(&app, "sp-client", "sp-secret", SP_SCOPE).await;

    let body = body_json(
        get(&app, "/sites/team/_api/lists/getByTitle('Tasks')/items(1)?$expand=AttachmentFiles", &token).await,
    )
    .await;
    let files = &body["d"]["AttachmentFiles"]["results"];
    assert_eq!(files[0]["FileName"], "budget.csv");

    let resp = get(
        &app,
        "/sites/team/_api/Web/GetFileByServerRelativeUrl('/sites/team/Lists/Tasks/Attachments/1/budget.csv')/$value",
        &token,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp).await.starts_with(b"item,amount"));

    let resp = get(
        &app,
        "/sites/team/_api/Web/GetFileByUrl(@url)/$value?@url='https://contoso.sharepoint.com/sites/team/Shared%2520Documents/readme.txt'",
        &token,
    )
    .await;
    assert_eq!(body_bytes(resp).await.as_ref(), b"hello from sharepoint");
}

#[tokio::test]
async fn folders_and_uploads() {
    let state = MockState::new();
    let app = app_with_state(state.clone());
    let token = token(&app, "sp-client", "sp-secret", SP_SCOPE).await;
    let create = |path: &str| {
        authed("POST", "/sites/team/_api/web/folders", &token)
            .body(json!({"ServerRelativeUrl": path}).to_string())
            .unwrap()
    };

    let resp = app.clone().oneshot(create("/sites/team/Shared Documents/2024")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(state.has_folder("/sites/team/Shared Documents/2024"));

    let resp = app.clone().oneshot(create("/sites/team/Shared Documents/2024")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let upload = |overwrite: bool| {
        authed(
            "POST",
            &format!(
                "/sites/team/_api/web/GetFolderByServerRelativeUrl('/sites/team/Shared%20Documents/2024')/Files/add(url='notes.txt',overwrite={overwrite})"
            ),
            &token,
        )
        .body("draft".to_string())
        .unwrap()
    };
    let resp = app.clone().oneshot(upload(false)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["d"]["Length"], "5");
    assert_eq!(
        state.file("/sites/team/Shared Documents/2024/notes.txt").as_deref(),
        Some(b"draft".as_slice())
    );

    let resp = app.clone().oneshot(upload(false)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = app.clone().oneshot(upload(true)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
