//! Authenticated HTTP client for the MELCloud API.
//!
//! `MelCloudClient` owns a `reqwest::Client` and a [`Session`]. Every read
//! goes through [`MelCloudClient::get_authenticated`], which:
//! - attaches the current context key as `X-MitsContextKey` plus
//!   `Accept: application/json`;
//! - hands any non-401 response back unchanged, error statuses included;
//! - on `401 Unauthorized`, drops the stale body, reauthenticates through
//!   the session and retries the same request once. A second 401 after a
//!   successful reauthentication is terminal (`SessionRejected`).
//!
//! Transport failures are returned immediately and never retried.

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{trace, warn};
use url::Url;

use crate::auth::{Authenticator, Credentials, Session};
use crate::config::{ClientConfig, Endpoints};
use crate::error::{MelCloudError, Operation, Result};

/// Header carrying the session token on every authenticated request.
pub const CONTEXT_KEY_HEADER: &str = "X-MitsContextKey";

/// Reauthentications allowed per logical request.
const MAX_REAUTHENTICATIONS: u32 = 1;

/// Authenticated client for the MELCloud API.
///
/// Methods take `&self`, so a single client can be shared across tasks
/// (e.g. behind an `Arc`). The session lock is never held across a device
/// request, only across a login.
#[derive(Debug)]
pub struct MelCloudClient {
    http: Client,
    endpoints: Endpoints,
    session: Session,
}

impl MelCloudClient {
    /// Logs in with default configuration.
    pub async fn authenticate(email: &str, password: &str) -> Result<Self> {
        Self::authenticate_with_config(Credentials::new(email, password), ClientConfig::default())
            .await
    }

    /// Logs in with a custom configuration (endpoints, timeouts, transport).
    pub async fn authenticate_with_config(
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self> {
        let http = config.http_client()?;
        let authenticator = Authenticator::new(http.clone(), credentials, &config);
        let session = Session::establish(authenticator).await?;

        Ok(MelCloudClient {
            http,
            endpoints: config.endpoints,
            session,
        })
    }

    /// Resumes with a context key obtained earlier, without logging in.
    /// The credentials are used only if the key turns out to be stale.
    pub fn from_context_key(
        credentials: Credentials,
        context_key: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let http = config.http_client()?;
        let authenticator = Authenticator::new(http.clone(), credentials, &config);

        Ok(MelCloudClient {
            http,
            endpoints: config.endpoints,
            session: Session::with_context_key(authenticator, context_key),
        })
    }

    /// The endpoint set requests are sent to.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The session holding the cached token and credentials.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The context key currently attached to requests.
    pub async fn context_key(&self) -> String {
        self.session.current().await.context_key
    }

    /// Sends an authenticated `GET` to `url` and returns the open response.
    ///
    /// State machine per call:
    /// `Sending -> {Success, TransportFailure, Unauthorized}`,
    /// `Unauthorized -> Reauthenticating -> {Sending, ReauthFailure}`.
    /// The loop runs at most `MAX_REAUTHENTICATIONS + 1` times.
    pub async fn get_authenticated(&self, operation: Operation, url: Url) -> Result<ResponseBody> {
        let mut reauthentications = 0;

        loop {
            let token = self.session.current().await;

            let response = self
                .http
                .get(url.clone())
                .header(CONTEXT_KEY_HEADER, &token.context_key)
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| MelCloudError::transport(operation, e))?;

            let status = response.status();
            trace!(%operation, status = status.as_u16(), "received response from MELCloud");

            if status != StatusCode::UNAUTHORIZED {
                return Ok(ResponseBody { operation, response });
            }

            // Release the connection before logging in again.
            drop(response);

            if reauthentications >= MAX_REAUTHENTICATIONS {
                return Err(MelCloudError::SessionRejected { operation });
            }
            reauthentications += 1;

            warn!(%operation, "session token rejected, performing MELCloud reauthentication");
            self.session
                .reauthenticate(&token)
                .await
                .map_err(|e| MelCloudError::Reauthentication {
                    operation,
                    source: Box::new(e),
                })?;
        }
    }
}

/// An open response body handed to the caller, who owns decoding it.
///
/// Design decisions:
/// - The body is not read eagerly. The device endpoints return documents
///   whose schema belongs to the caller, so the caller picks between
///   buffering (`bytes`, `text`, `json`) and streaming (`into_stream`).
/// - The status is not interpreted. Any non-2xx response other than 401
///   arrives here, and `status()` is the only signal of business-level
///   errors.
/// - Errors raised while reading carry the `Operation` that opened the
///   response, so a body failure still names the query it came from.
/// - Dropping the value releases the underlying connection, on every exit
///   path.
#[derive(Debug)]
pub struct ResponseBody {
    operation: Operation,
    response: Response,
}

impl ResponseBody {
    /// HTTP status, returned as-is.
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// The operation that produced this response.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        let operation = self.operation;
        self.response
            .bytes()
            .await
            .map_err(|e| MelCloudError::transport(operation, e))
    }

    /// Reads the whole body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let operation = self.operation;
        self.response
            .text()
            .await
            .map_err(|e| MelCloudError::transport(operation, e))
    }

    /// Reads and decodes the body as JSON into a caller-chosen type.
    ///
    /// The body is buffered first so that a decode failure surfaces as
    /// `Protocol` and a read failure as `Transport`. `reqwest`'s own `json()`
    /// reports both as one error kind.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let operation = self.operation;
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| MelCloudError::decode(operation, e))
    }

    /// Streams the body chunk by chunk.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> {
        let operation = self.operation;
        self.response
            .bytes_stream()
            .map_err(move |e| MelCloudError::transport(operation, e))
    }

    /// The raw `reqwest::Response`.
    pub fn into_inner(self) -> Response {
        self.response
    }
}
