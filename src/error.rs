//! Typed error hierarchy for the melcloud crate.
//!
//! Every variant maps to a failure boundary of the authenticated-request
//! lifecycle:
//! - `Transport` wraps `reqwest::Error` for connection, TLS and timeout
//!   failures. These are never retried.
//! - `Protocol` covers response bodies that do not match the expected shape.
//! - `Authentication` carries the numeric error id MELCloud returns when it
//!   rejects the credentials.
//! - `Reauthentication` is raised when a request hit 401 and the follow-up
//!   login failed. The login error stays reachable through `source()`.
//! - `SessionRejected` is raised when a freshly reauthenticated request is
//!   rejected with 401 again.
//! - `Shared` wraps a login failure that several concurrent callers receive
//!   from one reauthentication attempt. `reqwest::Error` is not `Clone`, so
//!   the failure is handed out behind an `Arc`.
//!
//! Each variant names the [`Operation`] that failed so the display text tells
//! the caller whether login, a device query or reauthentication broke.

use std::fmt;
use std::sync::Arc;

/// The logical operation an error (or log event) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Initial login with the supplied credentials.
    Login,
    /// Repeat login after the service rejected the session token.
    Reauthentication,
    /// `GET` of the device list endpoint.
    DeviceList,
    /// `GET` of the device info endpoint.
    DeviceInfo,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Login => "login",
            Operation::Reauthentication => "reauthentication",
            Operation::DeviceList => "device list query",
            Operation::DeviceInfo => "device info query",
        };
        f.write_str(name)
    }
}

/// Unified error type for all melcloud operations.
#[derive(Debug, thiserror::Error)]
pub enum MelCloudError {
    /// The request never produced a usable response (DNS, TCP, TLS, timeout,
    /// or a failure while reading the body).
    #[error("{operation} failed: network error: {source}")]
    Transport {
        /// Operation that was in flight.
        operation: Operation,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("{operation} failed: unexpected response: {message}")]
    Protocol {
        /// Operation whose response was malformed.
        operation: Operation,
        /// What was wrong with the body.
        message: String,
        /// The decoder error, when there was one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// MELCloud rejected the credentials (bad password, locked account, ...).
    #[error("login rejected by MELCloud (error id {error_id}), check the credentials")]
    Authentication {
        /// The `ErrorId` reported by the login endpoint.
        error_id: i64,
    },

    /// The session expired during `operation` and logging in again failed.
    #[error("session expired during {operation} and reauthentication failed: {source}")]
    Reauthentication {
        /// The request that triggered reauthentication.
        operation: Operation,
        /// The login error.
        #[source]
        source: Box<MelCloudError>,
    },

    /// The request was rejected with 401 even after a fresh login.
    #[error("{operation} failed: session token rejected again after reauthentication")]
    SessionRejected {
        /// The request that was rejected twice.
        operation: Operation,
    },

    /// Invalid client configuration (bad endpoint override, HTTP client
    /// build failure).
    #[error("configuration error: {0}")]
    Config(String),

    /// A failure shared by every caller that waited on the same
    /// reauthentication attempt. Display and `source()` are those of the
    /// wrapped error.
    #[error(transparent)]
    Shared(Arc<MelCloudError>),
}

impl MelCloudError {
    pub(crate) fn transport(operation: Operation, source: reqwest::Error) -> Self {
        MelCloudError::Transport { operation, source }
    }

    pub(crate) fn decode(operation: Operation, source: serde_json::Error) -> Self {
        MelCloudError::Protocol {
            operation,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// The operation that failed, if the error is tied to one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            MelCloudError::Transport { operation, .. }
            | MelCloudError::Protocol { operation, .. }
            | MelCloudError::Reauthentication { operation, .. }
            | MelCloudError::SessionRejected { operation } => Some(*operation),
            MelCloudError::Authentication { .. } => Some(Operation::Login),
            MelCloudError::Config(_) => None,
            MelCloudError::Shared(inner) => inner.operation(),
        }
    }

    /// The error that actually occurred, looking through `Shared` wrappers.
    pub fn origin(&self) -> &MelCloudError {
        match self {
            MelCloudError::Shared(inner) => inner.origin(),
            other => other,
        }
    }

    /// The MELCloud `ErrorId`, looking through a failed reauthentication.
    pub fn error_id(&self) -> Option<i64> {
        match self {
            MelCloudError::Authentication { error_id } => Some(*error_id),
            MelCloudError::Reauthentication { source, .. } => source.error_id(),
            MelCloudError::Shared(inner) => inner.error_id(),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, MelCloudError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn authentication_error_displays_error_id() {
        let err = MelCloudError::Authentication { error_id: 1 };
        let msg = err.to_string();
        assert!(msg.contains("error id 1"), "got: {msg}");
        assert_eq!(err.error_id(), Some(1));
        assert_eq!(err.operation(), Some(Operation::Login));
    }

    #[test]
    fn protocol_error_names_operation_and_chains_serde_error() {
        let json_err = serde_json::from_str::<String>("not-json").unwrap_err();
        let err = MelCloudError::decode(Operation::Login, json_err);
        assert!(err.to_string().starts_with("login failed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn reauthentication_error_chains_login_failure() {
        let err = MelCloudError::Reauthentication {
            operation: Operation::DeviceInfo,
            source: Box::new(MelCloudError::Authentication { error_id: 6 }),
        };
        let msg = err.to_string();
        assert!(msg.contains("device info query"), "got: {msg}");
        assert!(msg.contains("error id 6"), "got: {msg}");
        assert_eq!(err.error_id(), Some(6));

        let source = err.source().expect("login error must be chained");
        assert!(source.to_string().contains("login rejected"));
    }

    #[test]
    fn session_rejected_names_operation() {
        let err = MelCloudError::SessionRejected {
            operation: Operation::DeviceList,
        };
        assert!(err.to_string().contains("device list query"));
        assert_eq!(err.error_id(), None);
    }

    #[test]
    fn config_error_has_no_operation() {
        let err = MelCloudError::Config("bad base url".to_string());
        assert_eq!(err.operation(), None);
        assert!(err.to_string().contains("bad base url"));
    }

    #[test]
    fn shared_error_is_transparent() {
        let shared = MelCloudError::Shared(Arc::new(MelCloudError::Authentication { error_id: 3 }));
        assert_eq!(shared.to_string(), "login rejected by MELCloud (error id 3), check the credentials");
        assert_eq!(shared.error_id(), Some(3));
        assert_eq!(shared.operation(), Some(Operation::Login));
        assert!(matches!(
            shared.origin(),
            MelCloudError::Authentication { error_id: 3 }
        ));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MelCloudError>();
    }
}
