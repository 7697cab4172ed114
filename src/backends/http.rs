//! Shared plumbing for backends reached over an HTTP/JSON API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, HeaderName, HeaderValue},
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::adapter::{Connection, Driver};
use crate::{Error, Result};

/// Longest backend error body quoted back to the caller
const MAX_ERROR_BODY: usize = 500;

/// How requests authenticate against the backend
#[derive(Clone, Default)]
pub enum Credentials {
    /// No authentication
    #[default]
    None,
    /// HTTP basic authentication
    Basic {
        /// User name
        user: String,
        /// Password
        password: Option<String>,
    },
    /// A fixed header, e.g. `Authorization: ApiKey ...` or `api-key: ...`
    Header {
        /// Header name
        name: HeaderName,
        /// Header value (marked sensitive)
        value: HeaderValue,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { user, .. } => f.debug_struct("Basic").field("user", user).finish_non_exhaustive(),
            Self::Header { name, .. } => f.debug_struct("Header").field("name", name).finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Basic auth when a user is given, otherwise none
    #[must_use]
    pub fn basic(user: Option<String>, password: Option<String>) -> Self {
        match user {
            Some(user) => Self::Basic { user, password },
            None => Self::None,
        }
    }

    /// A secret carried in a header
    pub fn header(name: &'static str, value: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(value)
            .map_err(|_| Error::Config(format!("{name} credential is not a valid header value")))?;
        value.set_sensitive(true);
        Ok(Self::Header {
            name: HeaderName::from_static(name),
            value,
        })
    }

    /// `Authorization: <scheme> <token>`
    pub fn authorization(scheme: &str, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("{scheme} {token}"))
            .map_err(|_| Error::Config("authorization token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        Ok(Self::Header {
            name: AUTHORIZATION,
            value,
        })
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::None => request,
            Self::Basic { user, password } => request.basic_auth(user, password.as_ref()),
            Self::Header { name, value } => request.header(name.clone(), value.clone()),
        }
    }
}

/// Everything needed to reach one HTTP backend
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Base URL; operation paths are appended to it
    pub base_url: Url,
    /// Authentication
    pub credentials: Credentials,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Bound on a whole request, from connect to the last body byte
    pub request_timeout: Duration,
}

impl HttpSettings {
    /// Settings for `base_url` without authentication
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid backend URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("backend URL '{base_url}' cannot be a base")));
        }
        Ok(Self {
            base_url,
            credentials: Credentials::None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Attach credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Read an optional, non-empty environment variable
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a required environment variable
pub fn require_env(name: &str) -> Result<String> {
    env_var(name).ok_or_else(|| Error::Config(format!("{name} is not set")))
}

/// Connection slot of an HTTP adapter, as handed to its handlers
pub type HttpConnection = Arc<Connection<HttpDriver>>;

/// Where a driver gets its settings when it connects
#[derive(Debug, Clone)]
enum SettingsSource {
    Fixed(HttpSettings),
    Env(fn() -> Result<HttpSettings>),
}

/// [`Driver`] for HTTP backends: the handle is a client bound to a base URL
#[derive(Debug, Clone)]
pub struct HttpDriver {
    source: SettingsSource,
    probe: &'static [&'static str],
}

impl HttpDriver {
    /// Settings read from the environment at connect time
    #[must_use]
    pub fn from_env(read: fn() -> Result<HttpSettings>) -> Self {
        Self {
            source: SettingsSource::Env(read),
            probe: &[],
        }
    }

    /// Fixed settings
    #[must_use]
    pub fn with_settings(settings: HttpSettings) -> Self {
        Self {
            source: SettingsSource::Fixed(settings),
            probe: &[],
        }
    }

    /// Path probed by the liveness check (default: the base URL)
    #[must_use]
    pub fn probe_path(mut self, segments: &'static [&'static str]) -> Self {
        self.probe = segments;
        self
    }
}

#[async_trait]
impl Driver for HttpDriver {
    type Handle = HttpEndpoint;

    async fn open(&self) -> Result<HttpEndpoint> {
        let settings = match &self.source {
            SettingsSource::Fixed(settings) => settings.clone(),
            SettingsSource::Env(read) => read()?,
        };
        let endpoint = HttpEndpoint::new(settings)?;
        // Verify reachability and credentials before handing the handle out
        endpoint.get(self.probe).await?;
        Ok(endpoint)
    }

    async fn ping(&self, endpoint: &HttpEndpoint) -> Result<()> {
        endpoint.get(self.probe).await.map(|_| ())
    }
}

/// A connected HTTP backend
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    base_url: Url,
    credentials: Credentials,
}

impl HttpEndpoint {
    /// Build the client
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url,
            credentials: settings.credentials,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        if !segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| Error::Config(format!("backend URL '{}' cannot be a base", self.base_url)))?
                .pop_if_empty()
                .extend(segments);
        }
        Ok(url)
    }

    /// Start an authenticated request
    pub fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!(%method, %url, "Backend request");
        Ok(self.credentials.apply(self.client.request(method, url)))
    }

    /// Send a request and decode the JSON answer
    pub async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        decode(response).await
    }

    /// GET `segments`
    pub async fn get(&self, segments: &[&str]) -> Result<Value> {
        self.send(self.request(Method::GET, segments)?).await
    }

    /// GET `segments` with query parameters
    pub async fn get_with_query(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value> {
        self.send(self.request(Method::GET, segments)?.query(query)).await
    }

    /// POST a JSON body to `segments`
    pub async fn post(&self, segments: &[&str], body: &Value) -> Result<Value> {
        self.send(self.request(Method::POST, segments)?.json(body)).await
    }

    /// PUT a JSON body to `segments`
    pub async fn put(&self, segments: &[&str], body: &Value) -> Result<Value> {
        self.send(self.request(Method::PUT, segments)?.json(body)).await
    }

    /// DELETE `segments` with query parameters
    pub async fn delete(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value> {
        self.send(self.request(Method::DELETE, segments)?.query(query)).await
    }
}

/// Map the HTTP status to the error taxonomy, then parse the body as JSON.
/// An empty body decodes to `null`.
async fn decode(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| Error::Backend(format!("backend returned invalid JSON: {e}")))
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Connectivity(format!("authentication rejected ({status}): {excerpt}"))
        }
        _ => Error::Backend(format!("HTTP {status}: {excerpt}")),
    }
}
