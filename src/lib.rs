#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod app;
pub mod auth;
pub mod capabilities;
pub mod event;
pub mod geo;
pub mod model;
pub mod search;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::Event;
pub use model::{Model, ViewModel};

pub const DEFAULT_API_BASE: &str = "https://api.cachetrail.app";

/// Radius bounds enforced by the `/caches/within-radius` endpoint.
pub const MIN_RADIUS_KM: f64 = 0.1;
pub const MAX_RADIUS_KM: f64 = 100.0;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

/// Page size requested from the region search endpoints (server caps at
/// 200).
pub const SEARCH_PAGE_SIZE: u32 = 100;

/// Terminal authentication conditions. Everything here ends the current
/// session; recoverable 401s never surface as an `AuthError`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    #[error("no access token available")]
    Unauthenticated,
    #[error("no refresh token held; sign-in required")]
    RefreshUnavailable,
    #[error("token refresh rejected by the server")]
    RefreshFailed,
}

/// A fetch that failed for non-auth reasons. Display-only: pagination and
/// pick-session state are left untouched by these.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl LoadError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Unable to reach the server. Check your connection and try again.".into()
            }
            Self::Status(401) => "Your session has expired. Please sign in again.".into(),
            Self::Status(status) => format!("The server rejected the request (HTTP {status})."),
            Self::Decode(_) => "The server sent an unexpected response.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_messages_are_user_facing() {
        assert!(LoadError::Network("ECONNRESET".into())
            .user_message()
            .contains("connection"));
        assert!(LoadError::Status(500).user_message().contains("500"));
        assert!(LoadError::Status(401).user_message().contains("sign in"));
    }
}
