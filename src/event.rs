use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::api::ApiCall;
use crate::auth::Attempt;
use crate::geo::RegionKind;
use crate::search::SearchFilters;

/// Raw HTTP result as delivered by the shell, before any decoding.
pub type ApiResult = crux_http::Result<crux_http::Response<Vec<u8>>>;

/// Raw key-value read as delivered by the shell.
pub type KvRestore = Result<Option<Vec<u8>>, crux_kv::error::KeyValueError>;

// --- Secret wrapper: redacts Debug, zeroizes on Drop ---

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// --- Typed identifier for geocaches (the backend's `_id`) ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheId(pub String);

impl CacheId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Event enum: shell-facing events plus capability responses ---

#[derive(Serialize, Deserialize)]
pub enum Event {
    /// Idempotent startup: restore persisted credentials, at most once
    /// per application lifetime.
    Start,
    /// Point the core at an environment-specific backend.
    ApiBaseConfigured { base_url: String },

    // Auth
    LoginSubmitted { identifier: String, password: Secret },
    LogoutRequested,
    HomeLocationSubmitted { lat: f64, lon: f64 },

    // Map & search
    PickArmed { kind: RegionKind },
    MapClicked { lat: f64, lng: f64 },
    MapPointerMoved { lat: f64, lng: f64 },
    RadiusChanged { radius_km: f64 },
    FiltersChanged(SearchFilters),
    SearchRequested,

    // Capability responses (internal; never cross the FFI boundary)
    #[serde(skip)]
    LoginCompleted(Box<ApiResult>),
    #[serde(skip)]
    RefreshCompleted(Box<ApiResult>),
    #[serde(skip)]
    ApiResponded {
        call: ApiCall,
        attempt: Attempt,
        result: Box<ApiResult>,
    },
    #[serde(skip)]
    AccessTokenRestored(KvRestore),
    #[serde(skip)]
    RefreshTokenRestored(KvRestore),
    StorageSynced { ok: bool },
}
