//! Client configuration, normally read from environment variables.
//!
//! # Variables
//!
//! | Variable | Meaning |
//! |---|---|
//! | `GRAPH_TENANT_ID`, `GRAPH_CLIENT_ID` | app registration used for Graph calls (required) |
//! | `GRAPH_CLIENT_SECRET` | client secret, or |
//! | `GRAPH_CERTIFICATE_PATH` / `GRAPH_CERTIFICATE_KEY_PATH` | PEM certificate and key (key defaults to the certificate file) |
//! | `GRAPH_CERTIFICATE_PASSWORD` | decrypts an `ENCRYPTED PRIVATE KEY` |
//! | `GRAPH_LOGIN_BASE_URL` | identity platform, default `https://login.microsoftonline.com` |
//! | `GRAPH_SCOPES` | default `https://graph.microsoft.com/.default` |
//! | `GRAPH_BASE_URL` | default `https://graph.microsoft.com/v1.0` |
//! | `SP_CLIENT_ID` | enables SharePoint REST calls; the other `SP_*` values mirror the `GRAPH_*` ones |
//! | `SP_SCOPES` or `SP_SITE` | SharePoint scope; `SP_SITE` derives `{origin}/.default` |
//! | `GRAFAP_MAX_RETRIES`, `GRAFAP_RETRY_MIN_DELAY_MS`, `GRAFAP_RETRY_MAX_DELAY_MS` | retry policy |
//! | `GRAFAP_TIMEOUT_SECS` | per-request timeout |
//! | `GRAFAP_FILE_TIMEOUT_SECS` | timeout for file uploads and downloads, default 60 |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::certificate::ClientCertificate;
use crate::error::GraphError;
use crate::retry::RetryPolicy;

pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_GRAPH_SCOPES: &str = "https://graph.microsoft.com/.default";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// How the app proves its identity to the token endpoint.
#[derive(Clone)]
pub enum ClientCredential {
    Secret(String),
    Certificate(ClientCertificate),
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCredential::Secret(_) => f.write_str("Secret(<redacted>)"),
            ClientCredential::Certificate(cert) => f.debug_tuple("Certificate").field(cert).finish(),
        }
    }
}

/// One app registration: where to get tokens and with what.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub login_base_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub credential: ClientCredential,
    /// Space-separated scopes, usually a single `<resource>/.default`.
    pub scopes: String,
}

impl AppCredentials {
    pub fn with_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        scopes: impl Into<String>,
    ) -> Self {
        Self {
            login_base_url: DEFAULT_LOGIN_BASE_URL.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            credential: ClientCredential::Secret(secret.into()),
            scopes: scopes.into(),
        }
    }

    pub fn login_base_url(mut self, url: impl Into<String>) -> Self {
        self.login_base_url = url.into();
        self
    }

    /// `{login_base_url}/{tenant_id}/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub graph: AppCredentials,
    /// Credentials for the SharePoint REST API; `None` disables those calls.
    pub sharepoint: Option<AppCredentials>,
    pub graph_base_url: String,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    /// Timeout for file uploads and downloads.
    pub file_timeout: Duration,
}

impl ClientConfig {
    pub fn new(graph: AppCredentials) -> Self {
        Self {
            graph,
            sharepoint: None,
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            file_timeout: DEFAULT_FILE_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, GraphError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let graph = AppCredentials {
            login_base_url: env
                .get("GRAPH_LOGIN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string()),
            tenant_id: env.require("GRAPH_TENANT_ID")?,
            client_id: env.require("GRAPH_CLIENT_ID")?,
            credential: env.credential("GRAPH")?,
            scopes: env
                .get("GRAPH_SCOPES")
                .unwrap_or_else(|| DEFAULT_GRAPH_SCOPES.to_string()),
        };
        validate_url("GRAPH_LOGIN_BASE_URL", &graph.login_base_url)?;

        let sharepoint = match env.get("SP_CLIENT_ID") {
            Some(client_id) => {
                let scopes = match env.get("SP_SCOPES") {
                    Some(scopes) => scopes,
                    None => sharepoint_scope(&env.require("SP_SITE")?)?,
                };
                let credentials = AppCredentials {
                    login_base_url: env
                        .get("SP_LOGIN_BASE_URL")
                        .unwrap_or_else(|| graph.login_base_url.clone()),
                    tenant_id: env
                        .get("SP_TENANT_ID")
                        .unwrap_or_else(|| graph.tenant_id.clone()),
                    client_id,
                    credential: env.credential("SP")?,
                    scopes,
                };
                validate_url("SP_LOGIN_BASE_URL", &credentials.login_base_url)?;
                Some(credentials)
            }
            None => None,
        };

        let graph_base_url = env
            .get("GRAPH_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string());
        validate_url("GRAPH_BASE_URL", &graph_base_url)?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: env.parse("GRAFAP_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            min_delay: env
                .parse("GRAFAP_RETRY_MIN_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_delay),
            max_delay: env
                .parse("GRAFAP_RETRY_MAX_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            jitter: defaults.jitter,
        };
        let timeout = env
            .parse("GRAFAP_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let file_timeout = env
            .parse("GRAFAP_FILE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FILE_TIMEOUT);

        Ok(Self {
            graph,
            sharepoint,
            graph_base_url,
            retry,
            timeout,
            file_timeout,
        })
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank are the same thing.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                    var: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// `{prefix}_CLIENT_SECRET` wins over `{prefix}_CERTIFICATE_PATH`.
    fn credential(&self, prefix: &str) -> Result<ClientCredential, GraphError> {
        if let Some(secret) = self.get(&format!("{prefix}_CLIENT_SECRET")) {
            return Ok(ClientCredential::Secret(secret));
        }
        let cert_var = format!("{prefix}_CERTIFICATE_PATH");
        let Some(cert_path) = self.get(&cert_var) else {
            return Err(ConfigError::Missing(format!(
                "{prefix}_CLIENT_SECRET or {cert_var}"
            ))
            .into());
        };
        let password = self.get(&format!("{prefix}_CERTIFICATE_PASSWORD"));
        let key_path = self
            .get(&format!("{prefix}_CERTIFICATE_KEY_PATH"))
            .unwrap_or_else(|| cert_path.clone());
        Ok(ClientCredential::Certificate(
            ClientCertificate::from_pem_files(cert_path, key_path, password.as_deref())?,
        ))
    }
}

fn validate_url(var: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        var: var.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var: var.to_string(),
            reason: "expected an http(s) URL".into(),
        });
    }
    Ok(())
}

/// `https://contoso.sharepoint.com/sites/x` -> `https://contoso.sharepoint.com/.default`
fn sharepoint_scope(site: &str) -> Result<String, ConfigError> {
    let url = Url::parse(site).map_err(|e| ConfigError::Invalid {
        var: "SP_SITE".into(),
        reason: e.to_string(),
    })?;
    Ok(format!("{}/.default", url.origin().ascii_serialization()))
}
