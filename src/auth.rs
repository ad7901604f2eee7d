//! Username/password authentication against the MELCloud login endpoint.
//!
//! [`Authenticator`] performs a single login and returns the session token
//! (the "context key"). [`Session`] caches that token for the lifetime of a
//! client and knows how to replace it: it retains the original
//! [`Credentials`] and re-runs the login on demand.
//!
//! Reauthentication is single-flight. Concurrent callers that all saw a 401
//! with the same token queue on one lock; the first performs the login and
//! the rest pick up its result, success or failure, instead of logging in
//! again.

use std::fmt;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, trace};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{MelCloudError, Operation, Result};

/// Email/password pair supplied once when the client is built.
///
/// The password never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Wraps an email and password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// The account email.
    pub fn email(&self) -> &str {
        &self.email
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// JSON body posted to the login endpoint.
/// Keys are PascalCase to match the MELCloud contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginRequest<'a> {
    /// Client app version the service expects.
    pub app_version: &'a str,
    /// Always `null`; captcha login is not supported.
    pub captcha_response: Option<&'a str>,
    /// Account email.
    pub email: &'a str,
    /// Account password.
    pub password: &'a str,
    /// MELCloud language code.
    pub language: u32,
    /// Ask for a long-lived session.
    pub persist: bool,
}

/// Subset of the login response we need. MELCloud returns a large
/// `LoginData` object; everything except the context key is ignored.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    /// Set when the login was rejected.
    #[serde(rename = "ErrorId", alias = "errorId", default)]
    pub error_id: Option<i64>,
    /// Set when the login succeeded.
    #[serde(rename = "LoginData", alias = "loginData", default)]
    pub login_data: Option<LoginData>,
}

/// The part of `LoginData` we keep.
#[derive(Debug, Deserialize)]
pub struct LoginData {
    /// The session token.
    #[serde(rename = "ContextKey", alias = "contextKey")]
    pub context_key: String,
}

impl LoginResponse {
    /// Resolves the response to exactly one outcome: a context key or an
    /// authentication error. An error id takes precedence over login data.
    pub fn into_context_key(self) -> Result<String> {
        if let Some(error_id) = self.error_id {
            return Err(MelCloudError::Authentication { error_id });
        }

        match self.login_data {
            Some(data) if !data.context_key.is_empty() => Ok(data.context_key),
            Some(_) => Err(MelCloudError::Protocol {
                operation: Operation::Login,
                message: "login response carried an empty context key".to_string(),
                source: None,
            }),
            None => Err(MelCloudError::Protocol {
                operation: Operation::Login,
                message: "login response carried neither an error id nor login data".to_string(),
                source: None,
            }),
        }
    }
}

/// Runs the login procedure with a fixed set of credentials.
#[derive(Debug, Clone)]
pub struct Authenticator {
    http: Client,
    login_url: Url,
    credentials: Credentials,
    app_version: String,
    language: u32,
    persist: bool,
}

impl Authenticator {
    /// Takes the login URL and identification fields from `config`.
    pub fn new(http: Client, credentials: Credentials, config: &ClientConfig) -> Self {
        Authenticator {
            http,
            login_url: config.endpoints.login.clone(),
            credentials,
            app_version: config.app_version.clone(),
            language: config.language,
            persist: config.persist,
        }
    }

    /// The credentials sent on every login.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Posts the credentials to the login endpoint and returns the context key.
    ///
    /// The body is decoded regardless of HTTP status: MELCloud reports bad
    /// credentials through `ErrorId`, not through the status line. No retry
    /// happens here.
    pub async fn login(&self) -> Result<String> {
        info!("authenticating with MELCloud");

        let request = LoginRequest {
            app_version: &self.app_version,
            captcha_response: None,
            email: self.credentials.email(),
            password: self.credentials.password(),
            language: self.language,
            persist: self.persist,
        };

        let response = self
            .http
            .post(self.login_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| MelCloudError::transport(Operation::Login, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| MelCloudError::transport(Operation::Login, e))?;
        trace!(status = status.as_u16(), bytes = body.len(), "received MELCloud login response");

        let decoded: LoginResponse = serde_json::from_slice(&body)
            .map_err(|e| MelCloudError::decode(Operation::Login, e))?;
        let context_key = decoded.into_context_key()?;

        info!("successfully authenticated with MELCloud");
        Ok(context_key)
    }
}

/// A snapshot of the session token as seen by one request.
///
/// Requests carry this snapshot into [`Session::reauthenticate`] when they
/// are rejected. Comparing its counters with the session's current ones
/// tells whether some other caller has already tried to log in since the
/// snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Value sent as `X-MitsContextKey`.
    pub context_key: String,
    /// Successful reauthentications so far.
    pub generation: u64,
    /// Reauthentication attempts so far, successful or not.
    pub attempts: u64,
}

/// Token snapshot plus the outcome of the most recent login attempt.
struct SessionState {
    token: SessionToken,
    last_failure: Option<Arc<MelCloudError>>,
}

/// Cached session token plus the means to renew it.
///
/// Design decisions:
/// - The token sits behind an `RwLock` so every request can read it
///   concurrently. It is written only at the end of a login attempt.
/// - `refresh` is a separate `Mutex` held for the whole login. Callers
///   rejected with 401 queue on it, so at most one login is in flight per
///   session. The `RwLock` is never held across the login round trip, so
///   requests that were not rejected keep flowing.
/// - Every login attempt bumps `attempts` and records its outcome, and a
///   success also bumps `generation`. A queued caller whose snapshot is
///   older than the latest attempt did not see that attempt start. It
///   reuses the outcome instead of logging in again: the new token on
///   success, the same shared error on failure. With bad credentials a burst
///   of concurrent 401s therefore costs one login, not one per request.
/// - A caller whose snapshot already includes a failed attempt is a new
///   logical request, so it gets a fresh login. A past failure is never
///   cached for longer than the burst that shared it.
/// - A failed attempt leaves the cached token untouched.
pub struct Session {
    authenticator: Authenticator,
    state: RwLock<SessionState>,
    refresh: Mutex<()>,
}

impl Session {
    /// Logs in and wraps the resulting token. Nothing is constructed if the
    /// login fails.
    pub async fn establish(authenticator: Authenticator) -> Result<Self> {
        let context_key = authenticator.login().await?;
        Ok(Self::with_context_key(authenticator, context_key))
    }

    /// Wraps a context key obtained earlier, skipping the initial login.
    pub fn with_context_key(authenticator: Authenticator, context_key: impl Into<String>) -> Self {
        Session {
            authenticator,
            state: RwLock::new(SessionState {
                token: SessionToken {
                    context_key: context_key.into(),
                    generation: 0,
                    attempts: 0,
                },
                last_failure: None,
            }),
            refresh: Mutex::new(()),
        }
    }

    /// The token to attach to the next request.
    pub async fn current(&self) -> SessionToken {
        self.state.read().await.token.clone()
    }

    /// Number of successful reauthentications since the session was created.
    pub async fn reauthentication_count(&self) -> u64 {
        self.state.read().await.token.generation
    }

    /// Number of reauthentication logins attempted, including failed ones.
    pub async fn reauthentication_attempts(&self) -> u64 {
        self.state.read().await.token.attempts
    }

    /// The credentials used for every login.
    pub fn credentials(&self) -> &Credentials {
        self.authenticator.credentials()
    }

    /// Replaces `rejected` with a fresh token.
    ///
    /// If another caller attempted a login while we waited for the lock,
    /// its outcome is returned without logging in again. Failures are
    /// returned as [`MelCloudError::Shared`] so that every waiter can hold
    /// the same error.
    pub async fn reauthenticate(&self, rejected: &SessionToken) -> Result<SessionToken> {
        let _guard = self.refresh.lock().await;

        {
            let state = self.state.read().await;
            if state.token.attempts != rejected.attempts {
                return match &state.last_failure {
                    Some(failure) => {
                        debug!(
                            attempts = state.token.attempts,
                            "reusing failure from concurrent reauthentication"
                        );
                        Err(MelCloudError::Shared(Arc::clone(failure)))
                    }
                    None => {
                        debug!(
                            generation = state.token.generation,
                            "reusing token from concurrent reauthentication"
                        );
                        Ok(state.token.clone())
                    }
                };
            }
        }

        let outcome = self.authenticator.login().await;

        let mut state = self.state.write().await;
        state.token.attempts += 1;
        match outcome {
            Ok(context_key) => {
                state.token.context_key = context_key;
                state.token.generation += 1;
                state.last_failure = None;
                Ok(state.token.clone())
            }
            Err(e) => {
                let failure = Arc::new(e);
                state.last_failure = Some(Arc::clone(&failure));
                Err(MelCloudError::Shared(failure))
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credentials", self.credentials())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("user@example.com", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user@example.com"));
        assert!(!debug.contains("hunter2"), "password leaked: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn login_request_serializes_with_vendor_keys() {
        let req = LoginRequest {
            app_version: "1.21.6.0",
            captcha_response: None,
            email: "user@example.com",
            password: "pw",
            language: 19,
            persist: true,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "AppVersion": "1.21.6.0",
                "CaptchaResponse": null,
                "Email": "user@example.com",
                "Password": "pw",
                "Language": 19,
                "Persist": true
            })
        );
    }

    #[test]
    fn successful_login_response_yields_context_key() {
        let json = r#"{
            "ErrorId": null,
            "ErrorMessage": null,
            "LoginData": { "ContextKey": "ABC123", "Name": "Alice", "Language": 19 }
        }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_context_key().unwrap(), "ABC123");
    }

    #[test]
    fn camel_case_login_response_is_accepted() {
        let json = r#"{ "errorId": null, "loginData": { "contextKey": "xyz" } }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_context_key().unwrap(), "xyz");
    }

    #[test]
    fn error_id_maps_to_authentication_error() {
        let json = r#"{ "ErrorId": 1, "LoginData": null }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_context_key().unwrap_err();
        assert!(matches!(err, MelCloudError::Authentication { error_id: 1 }));
    }

    #[test]
    fn error_id_wins_over_login_data() {
        let json = r#"{ "ErrorId": 6, "LoginData": { "ContextKey": "ignored" } }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_context_key().unwrap_err().error_id(), Some(6));
    }

    #[test]
    fn response_without_outcome_is_protocol_error() {
        let resp: LoginResponse = serde_json::from_str("{}").unwrap();
        let err = resp.into_context_key().unwrap_err();
        assert!(matches!(
            err,
            MelCloudError::Protocol {
                operation: Operation::Login,
                ..
            }
        ));
    }

    #[test]
    fn empty_context_key_is_protocol_error() {
        let json = r#"{ "ErrorId": null, "LoginData": { "ContextKey": "" } }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.into_context_key(),
            Err(MelCloudError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn session_with_context_key_starts_at_generation_zero() {
        let config = ClientConfig::default();
        let authenticator = Authenticator::new(
            Client::new(),
            Credentials::new("user@example.com", "pw"),
            &config,
        );
        let session = Session::with_context_key(authenticator, "seeded");
        let token = session.current().await;
        assert_eq!(token.context_key, "seeded");
        assert_eq!(token.generation, 0);
        assert_eq!(session.reauthentication_count().await, 0);
    }

    fn offline_session(context_key: &str) -> Session {
        let config = ClientConfig::default();
        let authenticator = Authenticator::new(
            Client::new(),
            Credentials::new("user@example.com", "pw"),
            &config,
        );
        Session::with_context_key(authenticator, context_key)
    }

    #[tokio::test]
    async fn reauthenticate_reuses_token_already_replaced() {
        let session = offline_session("fresh");
        {
            let mut state = session.state.write().await;
            state.token.generation = 1;
            state.token.attempts = 1;
        }

        // A caller whose snapshot predates that attempt must not trigger a
        // login (which would hit the real vendor host here).
        let stale = SessionToken {
            context_key: "stale".to_string(),
            generation: 0,
            attempts: 0,
        };
        let token = session.reauthenticate(&stale).await.unwrap();
        assert_eq!(token.context_key, "fresh");
        assert_eq!(token.generation, 1);
    }

    #[tokio::test]
    async fn reauthenticate_reuses_failure_from_earlier_attempt() {
        let session = offline_session("stale");
        {
            let mut state = session.state.write().await;
            state.token.attempts = 1;
            state.last_failure = Some(Arc::new(MelCloudError::Authentication { error_id: 1 }));
        }

        let stale = SessionToken {
            context_key: "stale".to_string(),
            generation: 0,
            attempts: 0,
        };
        let err = session.reauthenticate(&stale).await.unwrap_err();
        assert!(matches!(err, MelCloudError::Shared(_)), "got: {err:?}");
        assert_eq!(err.error_id(), Some(1));
        assert_eq!(session.current().await.context_key, "stale");
        assert_eq!(session.reauthentication_attempts().await, 1);
    }
}
