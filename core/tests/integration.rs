//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock on a random port with its own state, then drives
//! the real client (ureq transport, token provider, retry loop) against it.
//! The mock records every API request, so tests can check what went over the
//! wire as well as what came back.

use std::net::SocketAddr;
use std::time::Duration;

use grafap_core::{
    AppCredentials, ClientCertificate, ClientConfig, ClientCredential, GraphClient, GraphError,
    ODataQuery, RetryPolicy, SiteUserLookup,
};
use mock_server::{odata, MockState};
use serde_json::json;

const SP_SCOPE: &str = "https://contoso.sharepoint.com/.default";

/// Start the mock server on a random port, serving `state`.
fn start_mock(state: MockState) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, state).await
        })
    });

    addr
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: false,
    }
}

fn config(addr: SocketAddr) -> ClientConfig {
    let login = format!("http://{addr}/login");
    let graph = AppCredentials::with_secret(
        "tenant-1",
        MockState::GRAPH_CLIENT_ID,
        MockState::GRAPH_CLIENT_SECRET,
        "https://graph.microsoft.com/.default",
    )
    .login_base_url(&login);
    let mut config = ClientConfig::new(graph);
    config.sharepoint = Some(
        AppCredentials::with_secret(
            "tenant-1",
            MockState::SP_CLIENT_ID,
            MockState::SP_CLIENT_SECRET,
            SP_SCOPE,
        )
        .login_base_url(&login),
    );
    config.graph_base_url = format!("http://{addr}/v1.0");
    config.retry = fast_retry();
    config.timeout = Duration::from_secs(5);
    config
}

fn setup() -> (GraphClient, MockState, SocketAddr) {
    let state = MockState::new();
    let addr = start_mock(state.clone());
    let client = GraphClient::new(config(addr)).unwrap();
    (client, state, addr)
}

fn site_url(addr: SocketAddr) -> String {
    format!("http://{addr}/sites/team")
}

// --- tokens ---

#[test]
fn token_is_fetched_once_and_sent_as_bearer() {
    let (client, state, _) = setup();

    assert_eq!(client.sites().unwrap().len(), 2);
    assert_eq!(client.lists("root").unwrap().len(), 2);
    assert_eq!(state.tokens_issued(), 1);

    let requests = state.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref().is_some_and(|a| a.starts_with("Bearer mock-"))));
}

#[test]
fn short_lived_tokens_are_refreshed() {
    let (client, state, _) = setup();
    state.set_token_ttl(30);

    client.sites().unwrap();
    client.sites().unwrap();
    assert_eq!(state.tokens_issued(), 2);
}

#[test]
fn revoked_token_fails_once_then_is_replaced() {
    let (client, state, _) = setup();
    client.sites().unwrap();
    state.revoke_tokens();

    let err = client.sites().unwrap_err();
    assert_eq!(err.status(), Some(401));

    client.sites().unwrap();
    assert_eq!(state.tokens_issued(), 2);
}

#[test]
fn wrong_secret_is_an_authentication_error() {
    let state = MockState::new();
    let addr = start_mock(state.clone());
    let mut config = config(addr);
    config.graph = AppCredentials::with_secret(
        "tenant-1",
        MockState::GRAPH_CLIENT_ID,
        "wrong",
        "https://graph.microsoft.com/.default",
    )
    .login_base_url(format!("http://{addr}/login"));
    let client = GraphClient::new(config).unwrap();

    let err = client.sites().unwrap_err();
    assert!(matches!(err, GraphError::Authentication { status: Some(401), .. }), "{err:?}");
    assert!(state.requests().is_empty());
}

#[test]
fn encrypted_certificate_credentials_get_a_token() {
    let state = MockState::new();
    let addr = start_mock(state.clone());
    let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
    let certificate = ClientCertificate::from_pem_files(
        format!("{fixtures}/app.crt"),
        format!("{fixtures}/app.enc.key"),
        Some("hunter2"),
    )
    .unwrap();
    let mut config = config(addr);
    config.graph.credential = ClientCredential::Certificate(certificate);
    let client = GraphClient::new(config).unwrap();

    assert_eq!(client.termstore_groups("root").unwrap().len(), 2);
    assert_eq!(state.tokens_issued(), 1);
}

// --- retries ---

#[test]
fn throttling_and_server_errors_are_retried() {
    let (client, state, _) = setup();
    state.push_fault(429);
    state.push_fault(503);

    let sites = client.sites().unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(state.requests().len(), 3);
}

#[test]
fn persistent_failure_exhausts_retries() {
    let (client, state, _) = setup();
    for _ in 0..3 {
        state.push_fault(503);
    }

    let err = client.sites().unwrap_err();
    match err {
        GraphError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.status(), Some(503));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(state.requests().len(), 3);
}

#[test]
fn client_errors_are_not_retried() {
    let (client, state, _) = setup();
    state.push_fault(400);

    let err = client.sites().unwrap_err();
    assert!(matches!(err, GraphError::Http { status: 400, .. }), "{err:?}");
    assert_eq!(state.requests().len(), 1);
}

// --- sites, lists and items ---

#[test]
fn site_search() {
    let (client, _, _) = setup();
    let sites = client.search_sites("team").unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].id, MockState::SITE_ID);
    assert_eq!(sites[0].display_name.as_deref(), Some("Team Site"));
}

#[test]
fn filter_is_passed_through_verbatim() {
    let (client, state, _) = setup();
    let filter = "fields/Status eq 'Open'";

    let items = client.list_items(MockState::SITE_ID, "Tasks", Some(filter), None).unwrap();
    let titles: Vec<_> = items.iter().filter_map(|i| i.field("Title")).collect();
    assert_eq!(titles, [&json!("Draft budget"), &json!("Send invites")]);

    let recorded = state.requests();
    let query = odata::pairs(recorded[0].query.as_deref());
    assert_eq!(odata::param(&query, "$filter"), Some(filter));
}

#[test]
fn collections_follow_next_links() {
    let (client, state, _) = setup();
    state.set_page_size(1);

    let items = client.list_items("root", "Tasks", None, Some("Title")).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2].field("Title"), Some(&json!("Send invites")));
    assert_eq!(items[2].field("Status"), None);
    assert_eq!(state.requests().len(), 3);
}

#[test]
fn list_item_lifecycle() {
    let (client, _, _) = setup();

    let created = client
        .create_list_item("root", "Tasks", &json!({"Title": "Order cake", "Status": "Open"}))
        .unwrap();
    assert_eq!(created.id, "4");

    let fetched = client.list_item("root", "Tasks", &created.id).unwrap();
    assert_eq!(fetched.field("Title"), Some(&json!("Order cake")));

    let fields = client
        .update_list_item("root", "Tasks", &created.id, &json!({"Status": "Done"}))
        .unwrap();
    assert_eq!(fields.get("Status"), Some(&json!("Done")));
    assert_eq!(fields.get("Title"), Some(&json!("Order cake")));

    client.delete_list_item("root", "Tasks", &created.id).unwrap();
    let err = client.list_item("root", "Tasks", &created.id).unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }), "{err:?}");
}

#[test]
fn term_store_groups() {
    let (client, _, _) = setup();
    let groups = client.termstore_groups(MockState::SITE_ID).unwrap();
    let names: Vec<_> = groups.iter().filter_map(|g| g.display_name.as_deref()).collect();
    assert_eq!(names, ["Departments", "Site Collection - team"]);
}

// --- users ---

#[test]
fn directory_users_with_filter() {
    let (client, _, _) = setup();
    assert_eq!(client.users(&ODataQuery::new()).unwrap().len(), 3);

    let users = client
        .users(&ODataQuery::new().filter("mail eq 'leeg@contoso.com'"))
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].display_name.as_deref(), Some("Lee Gu"));
}

#[test]
fn site_users_and_lookup() {
    let (client, _, _) = setup();
    assert_eq!(client.site_users("root").unwrap().len(), 2);

    let by_email = client
        .site_user("root", SiteUserLookup::Email("meganb@contoso.com"))
        .unwrap();
    assert_eq!(by_email.id, "2");

    let by_id = client.site_user("root", SiteUserLookup::Id("1")).unwrap();
    assert_eq!(by_id.field("Email"), Some(&json!("adelev@contoso.com")));

    let err = client
        .site_user("root", SiteUserLookup::Email("nobody@contoso.com"))
        .unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }), "{err:?}");
}

#[test]
fn ensure_user_adds_a_site_user() {
    let (client, state, addr) = setup();

    let user = client.ensure_user(&site_url(addr), "leeg@contoso.com").unwrap();
    assert_eq!(user.id, 3);
    assert_eq!(user.title.as_deref(), Some("Lee Gu"));
    assert_eq!(client.site_users("root").unwrap().len(), 3);

    let err = client.ensure_user(&site_url(addr), "ghost@contoso.com").unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }), "{err:?}");

    // One token per resource.
    assert_eq!(state.tokens_issued(), 2);
}

#[test]
fn sharepoint_calls_need_sharepoint_credentials() {
    let state = MockState::new();
    let addr = start_mock(state.clone());
    let mut config = config(addr);
    config.sharepoint = None;
    let client = GraphClient::new(config).unwrap();

    let err = client.ensure_user(&site_url(addr), "leeg@contoso.com").unwrap_err();
    assert!(matches!(err, GraphError::SharePointNotConfigured), "{err:?}");
    assert!(state.requests().is_empty());
}

// --- document libraries and files ---

#[test]
fn drives_and_items() {
    let (client, _, _) = setup();
    let drives = client.drives("root").unwrap();
    assert_eq!(drives.len(), 1);

    let root = client.drive_items("root", &drives[0].id, None).unwrap();
    assert_eq!(root.len(), 2);
    let reports = root.iter().find(|i| i.is_folder()).unwrap();
    assert_eq!(reports.name.as_deref(), Some("Reports"));

    let inside = client.drive_items("root", &drives[0].id, Some(&reports.id)).unwrap();
    assert_eq!(inside[0].name.as_deref(), Some("q1.xlsx"));
}

#[test]
fn item_attachments_are_downloaded() {
    let (client, _, addr) = setup();

    let attachments = client.list_item_attachments(&site_url(addr), "Tasks", 1).unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].name, "budget.csv");

    let files = client
        .download_list_item_attachments(&site_url(addr), "Tasks", 1)
        .unwrap();
    assert_eq!(files[0].url, "/sites/team/Lists/Tasks/Attachments/1/budget.csv");
    assert!(files[0].data.starts_with(b"item,amount"));

    assert!(client.list_item_attachments(&site_url(addr), "Tasks", 2).unwrap().is_empty());
}

#[test]
fn file_lifecycle() {
    let (client, state, addr) = setup();
    let site = site_url(addr);

    let folder = client.create_folder(&site, "Shared Documents/2024/Q1").unwrap();
    assert_eq!(folder.name, "Q1");
    assert_eq!(folder.server_relative_url, "/sites/team/Shared Documents/2024/Q1");
    assert!(state.has_folder("/sites/team/Shared Documents/2024/Q1"));

    // Existing folders along the way are not an error.
    client.create_folder(&site, "Shared Documents/2024/Q1").unwrap();

    let uploaded = client
        .upload_file(&site, "Shared Documents/2024/Q1", "notes & plans.txt", b"draft".to_vec(), false)
        .unwrap();
    assert_eq!(uploaded.name, "notes & plans.txt");
    assert_eq!(uploaded.length, Some(5));
    assert_eq!(
        state.file("/sites/team/Shared Documents/2024/Q1/notes & plans.txt").as_deref(),
        Some(b"draft".as_slice())
    );

    let err = client
        .upload_file(&site, "Shared Documents/2024/Q1", "notes & plans.txt", b"again".to_vec(), false)
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    let file_url = format!("{site}/Shared%20Documents/2024/Q1/notes%20%26%20plans.txt");
    let downloaded = client.download_file(&file_url).unwrap();
    assert_eq!(downloaded.name, "notes & plans.txt");
    assert_eq!(downloaded.data, b"draft");

    client.delete_file(&file_url).unwrap();
    assert!(state.file("/sites/team/Shared Documents/2024/Q1/notes & plans.txt").is_none());
    let err = client.download_file(&file_url).unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }), "{err:?}");
}
