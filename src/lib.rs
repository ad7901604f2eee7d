//! Async Rust client for the MELCloud device-control API.
//!
//! Logs in once with an email and password, caches the session token
//! ("context key"), and transparently logs in again when the service
//! rejects the token mid-session.
//!
//! # Modules
//!
//! - [`auth`] — Credentials, the login procedure and the cached session.
//! - [`client`] — Authenticated `GET` with one reauthenticate-and-retry on 401.
//! - [`config`] — Endpoints, timeouts and login client-identification fields.
//! - [`devices`] — Device list and device info queries.
//! - [`error`] — Typed error hierarchy (`MelCloudError`).
//!
//! # Quick Start
//!
//! ```no_run
//! use melcloud::client::MelCloudClient;
//! use melcloud::devices::list_devices;
//!
//! # async fn example() -> melcloud::error::Result<()> {
//! let client = MelCloudClient::authenticate("user@example.com", "password").await?;
//! let body = list_devices(&client).await?;
//! let devices: serde_json::Value = body.json().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod config;
pub mod devices;
pub mod error;
