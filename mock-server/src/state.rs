//! In-memory tenant: app registrations, issued tokens, sites and their
//! content, plus the knobs tests use to script failures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{json, Map, Value};

pub const USER_INFO_LIST: &str = "User Information List";

/// One request as seen by the API routes (the token endpoint is not recorded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItemData {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ListData {
    pub id: String,
    pub name: String,
    pub items: Vec<ItemData>,
    pub next_id: u64,
}

impl ListData {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            items: Vec::new(),
            next_id: 1,
        }
    }

    pub fn insert(&mut self, mut fields: Map<String, Value>) -> ItemData {
        let id = self.next_id.to_string();
        self.next_id += 1;
        fields.insert("id".into(), Value::String(id.clone()));
        let item = ItemData { id, fields };
        self.items.push(item.clone());
        item
    }

    pub fn to_json(&self, site: &SiteData) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "displayName": self.name,
            "webUrl": format!("{}/Lists/{}", site.web_url, self.name),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DriveData {
    pub id: String,
    pub name: String,
    pub root: Vec<Value>,
    /// Children keyed by folder item id.
    pub folders: HashMap<String, Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct SiteData {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub web_url: String,
    pub lists: Vec<ListData>,
    pub term_groups: Vec<Value>,
    pub drives: Vec<DriveData>,
}

impl SiteData {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "displayName": self.display_name,
            "webUrl": self.web_url,
        })
    }

    /// Lists are addressable by id or by name.
    pub fn list_mut(&mut self, key: &str) -> Option<&mut ListData> {
        self.lists
            .iter_mut()
            .find(|l| l.id == key || l.name.eq_ignore_ascii_case(key))
    }
}

#[derive(Debug)]
pub struct MockData {
    /// client_id -> client_secret
    pub clients: HashMap<String, String>,
    pub token_ttl_secs: u64,
    pub tokens_issued: u32,
    /// Issued token -> the scope it was issued for.
    pub valid_tokens: HashMap<String, String>,
    /// Statuses returned, in order, for the next API requests.
    pub faults: VecDeque<u16>,
    pub requests: Vec<RecordedRequest>,
    pub page_size: usize,
    pub sites: Vec<SiteData>,
    pub users: Vec<Value>,
    /// SharePoint folders by server-relative URL.
    pub folders: HashSet<String>,
    /// SharePoint files by server-relative URL.
    pub files: HashMap<String, Vec<u8>>,
}

impl MockData {
    /// `root` is the first site.
    pub fn site_mut(&mut self, key: &str) -> Option<&mut SiteData> {
        if key == "root" {
            return self.sites.first_mut();
        }
        self.sites
            .iter_mut()
            .find(|s| s.id == key || s.name.eq_ignore_ascii_case(key))
    }
}

/// Shared handle to the mock tenant. Cloning shares the same data.
#[derive(Debug, Clone)]
pub struct MockState {
    inner: Arc<Mutex<MockData>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    pub const GRAPH_CLIENT_ID: &'static str = "graph-client";
    pub const GRAPH_CLIENT_SECRET: &'static str = "graph-secret";
    pub const SP_CLIENT_ID: &'static str = "sp-client";
    pub const SP_CLIENT_SECRET: &'static str = "sp-secret";
    pub const SITE_ID: &'static str = "contoso.sharepoint.com,site-1,web-1";

    /// A tenant seeded with one team site, its lists, term groups and a
    /// document library, plus a few directory users.
    pub fn new() -> Self {
        let data = MockData {
            clients: HashMap::from([
                (Self::GRAPH_CLIENT_ID.to_string(), Self::GRAPH_CLIENT_SECRET.to_string()),
                (Self::SP_CLIENT_ID.to_string(), Self::SP_CLIENT_SECRET.to_string()),
            ]),
            token_ttl_secs: 3600,
            tokens_issued: 0,
            valid_tokens: HashMap::new(),
            faults: VecDeque::new(),
            requests: Vec::new(),
            page_size: 100,
            sites: vec![seed_team_site(), seed_archive_site()],
            users: seed_users(),
            folders: ["/sites", "/sites/team", "/sites/team/Shared Documents"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            files: HashMap::from([
                (
                    "/sites/team/Shared Documents/readme.txt".to_string(),
                    b"hello from sharepoint".to_vec(),
                ),
                (
                    "/sites/team/Lists/Tasks/Attachments/1/budget.csv".to_string(),
                    b"item,amount\nvenue,1200\n".to_vec(),
                ),
            ]),
        };
        Self {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MockData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tokens_issued(&self) -> u32 {
        self.lock().tokens_issued
    }

    pub fn set_token_ttl(&self, secs: u64) {
        self.lock().token_ttl_secs = secs;
    }

    pub fn set_page_size(&self, size: usize) {
        self.lock().page_size = size.max(1);
    }

    /// The next API request answers with `status` instead of being served.
    pub fn push_fault(&self, status: u16) {
        self.lock().faults.push_back(status);
    }

    /// Forget every issued token, as if they had all been revoked.
    pub fn revoke_tokens(&self) {
        self.lock().valid_tokens.clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn file(&self, server_relative_url: &str) -> Option<Vec<u8>> {
        self.lock().files.get(server_relative_url).cloned()
    }

    pub fn has_folder(&self, server_relative_url: &str) -> bool {
        self.lock().folders.contains(server_relative_url)
    }
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn seed_team_site() -> SiteData {
    let mut tasks = ListData::new("list-tasks", "Tasks");
    for (title, status, priority) in [
        ("Draft budget", "Open", 1),
        ("Book venue", "Done", 2),
        ("Send invites", "Open", 3),
    ] {
        tasks.insert(fields(json!({
            "Title": title,
            "Status": status,
            "Priority": priority,
            "Attachments": false,
        })));
    }

    let mut user_info = ListData::new("list-users", USER_INFO_LIST);
    for (name, email) in [("Adele Vance", "adelev@contoso.com"), ("Megan Bowen", "meganb@contoso.com")] {
        user_info.insert(fields(json!({
            "Title": name,
            "Email": email,
            "UserName": email,
        })));
    }

    let documents = DriveData {
        id: "drive-docs".into(),
        name: "Documents".into(),
        root: vec![
            json!({"id": "item-reports", "name": "Reports", "folder": {"childCount": 1}}),
            json!({"id": "item-readme", "name": "readme.txt", "size": 21, "file": {"mimeType": "text/plain"}}),
        ],
        folders: HashMap::from([(
            "item-reports".to_string(),
            vec![json!({"id": "item-q1", "name": "q1.xlsx", "size": 2048, "file": {}})],
        )]),
    };

    SiteData {
        id: MockState::SITE_ID.into(),
        name: "team".into(),
        display_name: "Team Site".into(),
        web_url: "https://contoso.sharepoint.com/sites/team".into(),
        lists: vec![tasks, user_info],
        term_groups: vec![
            json!({"id": "tg-1", "displayName": "Departments", "description": "", "scope": "global"}),
            json!({"id": "tg-2", "displayName": "Site Collection - team", "scope": "siteCollection"}),
        ],
        drives: vec![documents],
    }
}

fn seed_archive_site() -> SiteData {
    SiteData {
        id: "contoso.sharepoint.com,site-2,web-2".into(),
        name: "archive".into(),
        display_name: "Archive".into(),
        web_url: "https://contoso.sharepoint.com/sites/archive".into(),
        lists: vec![ListData::new("list-archive-users", USER_INFO_LIST)],
        term_groups: Vec::new(),
        drives: Vec::new(),
    }
}

fn seed_users() -> Vec<Value> {
    [
        ("u-1", "Adele Vance", "adelev@contoso.com"),
        ("u-2", "Megan Bowen", "meganb@contoso.com"),
        ("u-3", "Lee Gu", "leeg@contoso.com"),
    ]
    .into_iter()
    .map(|(id, name, mail)| {
        json!({
            "id": id,
            "displayName": name,
            "userPrincipalName": mail,
            "mail": mail,
        })
    })
    .collect()
}
