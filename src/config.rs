//! Client configuration: endpoint URLs, transport timeouts and the
//! client-identification fields sent with every login.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::{MelCloudError, Result};

/// Vendor host all three endpoints live on.
pub const DEFAULT_BASE_URL: &str = "https://app.melcloud.com/";

const LOGIN_PATH: &str = "Mitsubishi.Wifi.Client/Login/ClientLogin";
const DEVICE_LIST_PATH: &str = "Mitsubishi.Wifi.Client/User/ListDevices";
const DEVICE_INFO_PATH: &str = "Mitsubishi.Wifi.Client/Device/Get";

/// App version reported to the login endpoint.
pub const DEFAULT_APP_VERSION: &str = "1.21.6.0";

/// MELCloud language code 19 (English).
pub const DEFAULT_LANGUAGE: u32 = 19;

/// Covers TCP + TLS handshake only.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Full round trip of a single request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Absolute URLs of the three MELCloud endpoints.
///
/// Parsed once at construction, so building a query never fails at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// `POST` target for [`crate::auth::Authenticator::login`].
    pub login: Url,
    /// `GET` target for the device list.
    pub device_list: Url,
    /// `GET` target for device info (`id` and `buildingID` are appended).
    pub device_info: Url,
}

impl Endpoints {
    /// Rebases all endpoints onto another origin, e.g. a local mock server.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| MelCloudError::Config(format!("invalid base URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(MelCloudError::Config(format!(
                "base URL {base_url:?} cannot carry a path"
            )));
        }

        let join = |path: &str| {
            base.join(path)
                .map_err(|e| MelCloudError::Config(format!("invalid endpoint path {path}: {e}")))
        };

        Ok(Endpoints {
            login: join(LOGIN_PATH)?,
            device_list: join(DEVICE_LIST_PATH)?,
            device_info: join(DEVICE_INFO_PATH)?,
        })
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints::with_base_url(DEFAULT_BASE_URL)
            .expect("built-in MELCloud base URL must parse")
    }
}

/// Configuration for [`crate::client::MelCloudClient`].
///
/// ```
/// use std::time::Duration;
/// use melcloud::config::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_secs(60))
///     .with_user_agent("my-thermostat/1.0");
/// assert_eq!(config.timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint URLs.
    pub endpoints: Endpoints,
    /// TCP + TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
    /// `AppVersion` field of the login payload.
    pub app_version: String,
    /// `Language` field of the login payload.
    pub language: u32,
    /// `Persist` field of the login payload.
    pub persist: bool,
    /// Injected transport. When `None`, one is built from the timeouts above.
    pub http_client: Option<Client>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("melcloud-rs/{}", env!("CARGO_PKG_VERSION")),
            app_version: DEFAULT_APP_VERSION.to_string(),
            language: DEFAULT_LANGUAGE,
            persist: true,
            http_client: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the endpoint set.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the app version reported at login.
    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = app_version.into();
        self
    }

    /// Set the language code reported at login.
    pub fn with_language(mut self, language: u32) -> Self {
        self.language = language;
        self
    }

    /// Use an existing `reqwest::Client` instead of building one.
    /// The configured timeouts and user agent are then not applied.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Returns the injected client, or builds one with explicit timeouts.
    pub(crate) fn http_client(&self) -> Result<Client> {
        if let Some(client) = &self.http_client {
            return Ok(client.clone());
        }

        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| MelCloudError::Config(format!("failed to build HTTP client: {e}")))
    }
}
