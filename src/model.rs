use serde::{Deserialize, Serialize};

use crate::api::ApiConfig;
use crate::auth::AuthSession;
use crate::capabilities::MapShape;
use crate::geo::PickSession;
use crate::search::RegionSearch;
use crate::{AuthError, LoadError, DEFAULT_RADIUS_KM};

/// Whole-core state: the shared credential session plus the state owned
/// by the search page instance (pick session, accumulator, radius).
#[derive(Debug)]
pub struct Model {
    pub config: ApiConfig,
    pub auth: AuthSession,
    pub pick: PickSession,
    pub search: RegionSearch,
    /// Current radius setting; applies to the next committed center too.
    pub radius_km: f64,
    /// Terminal auth condition (refresh unavailable/failed); the routing
    /// layer redirects on it.
    pub auth_error: Option<AuthError>,
    /// Last load failure, shown alongside whatever results are already
    /// on screen.
    pub last_error: Option<LoadError>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            config: ApiConfig::default(),
            auth: AuthSession::default(),
            pick: PickSession::default(),
            search: RegionSearch::default(),
            radius_km: DEFAULT_RADIUS_KM,
            auth_error: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub signed_in: bool,
    pub username: Option<String>,
    /// The session ended for good (no refresh token, or refresh
    /// rejected); redirect-worthy.
    pub session_expired: bool,
    pub home_location: Option<(f64, f64)>,
    pub picking: bool,
    pub pick_hint: Option<String>,
    pub region: Option<MapShape>,
    pub radius_km: f64,
    pub loading: bool,
    pub can_search: bool,
    pub total_results: u64,
    pub results_shown: usize,
    pub error: Option<String>,
}
