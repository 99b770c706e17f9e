use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::event::CacheId;
use crate::geo::Region;
use crate::search::{PageRequest, SearchFilters};
use crate::{DEFAULT_API_BASE, SEARCH_PAGE_SIZE};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const PROFILE_PATH: &str = "/my/profile";
pub const LOCATION_PATH: &str = "/my/profile/location";
pub const RADIUS_SEARCH_PATH: &str = "/caches/within-radius";
pub const BBOX_SEARCH_PATH: &str = "/caches/within-bbox";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiUrlError {
    #[error("invalid API base URL '{base}': {reason}")]
    InvalidBase { base: String, reason: String },
}

/// Where the backend lives. Shells may override the default via
/// `Event::ApiBaseConfigured` before anything else runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    base_url: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiUrlError> {
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|e| ApiUrlError::InvalidBase {
            base: base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ApiUrlError> {
        let base = Url::parse(&self.base_url).map_err(|e| ApiUrlError::InvalidBase {
            base: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        base.join(path).map_err(|e| ApiUrlError::InvalidBase {
            base: self.base_url.clone(),
            reason: e.to_string(),
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// A replayable description of one protected backend call. The pipeline
/// dispatches these, and re-dispatches the same value after a token
/// refresh, so everything needed to rebuild the request lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiCall {
    Profile,
    HomeLocation,
    SaveHomeLocation { lat: f64, lon: f64 },
    SearchPage(PageRequest),
}

impl ApiCall {
    pub fn url(&self, config: &ApiConfig) -> Result<Url, ApiUrlError> {
        match self {
            Self::Profile => config.endpoint(PROFILE_PATH),
            Self::HomeLocation | Self::SaveHomeLocation { .. } => config.endpoint(LOCATION_PATH),
            Self::SearchPage(request) => search_url(config, request),
        }
    }
}

fn search_url(config: &ApiConfig, request: &PageRequest) -> Result<Url, ApiUrlError> {
    let path = match request.region {
        Region::Circle { .. } => RADIUS_SEARCH_PATH,
        Region::Box(_) => BBOX_SEARCH_PATH,
    };
    let mut url = config.endpoint(path)?;
    {
        let mut query = url.query_pairs_mut();
        match &request.region {
            Region::Circle { center, radius_km } => {
                query.append_pair("lat", &center.lat().to_string());
                query.append_pair("lon", &center.lng().to_string());
                query.append_pair("radius_km", &radius_km.to_string());
            }
            Region::Box(bbox) => {
                query.append_pair("min_lat", &bbox.south.to_string());
                query.append_pair("min_lon", &bbox.west.to_string());
                query.append_pair("max_lat", &bbox.north.to_string());
                query.append_pair("max_lon", &bbox.east.to_string());
            }
        }
        append_filters(&mut query, &request.filters);
        query.append_pair("page", &request.page.to_string());
        query.append_pair("page_size", &SEARCH_PAGE_SIZE.to_string());
    }
    Ok(url)
}

fn append_filters(
    query: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>,
    filters: &SearchFilters,
) {
    if let Some(type_id) = &filters.cache_type {
        query.append_pair("type_id", type_id);
    }
    if let Some(size_id) = &filters.size {
        query.append_pair("size_id", size_id);
    }
    query.append_pair("sort", filters.sort.as_str());
}

// --- Wire payloads ---

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lon: f64,
}

/// `/auth/login` and `/auth/refresh` response. Refresh responses carry no
/// new refresh token; the held one stays valid.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    pub lat: f64,
    pub lon: f64,
    /// Pre-formatted degrees/minutes rendering, as the backend sends it.
    #[serde(default)]
    pub coords: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocacheSummary {
    #[serde(alias = "_id")]
    pub id: CacheId,
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub terrain: Option<f64>,
    #[serde(default)]
    pub favorites: Option<u32>,
}

/// One page of a region query. Every field except `items` is optional on
/// the wire; the accessors define the fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CachePage {
    #[serde(default)]
    pub items: Vec<GeocacheSummary>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub nb_pages: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl CachePage {
    /// Total as shown to the user: server total, else this page's item
    /// count, else zero.
    #[must_use]
    pub fn displayed_total(&self) -> u64 {
        self.total.unwrap_or(self.items.len() as u64)
    }

    /// Page count: `nb_pages` when reported, else derived from
    /// `total`/`page_size`, else the page we are on (no further pages
    /// assumed).
    #[must_use]
    pub fn total_pages(&self, reported_page: u32) -> u32 {
        if let Some(nb_pages) = self.nb_pages {
            return nb_pages.max(1);
        }
        let size = self.page_size.unwrap_or(SEARCH_PAGE_SIZE) as u64;
        match self.total {
            Some(total) if size > 0 => (total.div_ceil(size) as u32).max(1),
            _ => reported_page.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{BoundingBox, Coordinate};
    use crate::search::SortOrder;

    fn config() -> ApiConfig {
        ApiConfig::new("https://api.example.com").unwrap()
    }

    #[test]
    fn config_rejects_garbage_base() {
        assert!(ApiConfig::new("not a url").is_err());
        assert!(ApiConfig::new("https://api.example.com").is_ok());
    }

    #[test]
    fn radius_search_url_carries_shape_and_cursor() {
        let request = PageRequest {
            region: Region::Circle {
                center: Coordinate::new(43.1, 5.94).unwrap(),
                radius_km: 10.0,
            },
            filters: SearchFilters::default(),
            page: 2,
            generation: 0,
        };
        let url = ApiCall::SearchPage(request).url(&config()).unwrap();
        assert_eq!(url.path(), "/caches/within-radius");
        let query = url.query().unwrap();
        assert!(query.contains("lat=43.1"));
        assert!(query.contains("lon=5.94"));
        assert!(query.contains("radius_km=10"));
        assert!(query.contains("page=2"));
        assert!(query.contains("page_size=100"));
        assert!(query.contains("sort=-placed_at"));
    }

    #[test]
    fn bbox_search_url_carries_bounds() {
        let request = PageRequest {
            region: Region::Box(BoundingBox {
                south: 43.10,
                west: 5.80,
                north: 43.20,
                east: 5.94,
            }),
            filters: SearchFilters {
                cache_type: Some("651f00000000000000000001".into()),
                size: None,
                sort: SortOrder::FavoritesDesc,
            },
            page: 1,
            generation: 3,
        };
        let url = ApiCall::SearchPage(request).url(&config()).unwrap();
        assert_eq!(url.path(), "/caches/within-bbox");
        let query = url.query().unwrap();
        assert!(query.contains("min_lat=43.1"));
        assert!(query.contains("min_lon=5.8"));
        assert!(query.contains("max_lat=43.2"));
        assert!(query.contains("max_lon=5.94"));
        assert!(query.contains("type_id=651f00000000000000000001"));
        assert!(!query.contains("size_id"));
        assert!(query.contains("sort=-favorites"));
    }

    #[test]
    fn profile_parses_mongo_id_alias() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"_id": "650aa", "username": "alice", "email": "a@example.com"}"#,
        )
        .unwrap();
        assert_eq!(profile.id, "650aa");
        assert_eq!(profile.role, None);

        let by_name: UserProfile =
            serde_json::from_str(r#"{"id": "650aa", "username": "alice"}"#).unwrap();
        assert_eq!(by_name.id, "650aa");
    }

    #[test]
    fn cache_page_tolerates_missing_fields() {
        let page: CachePage = serde_json::from_str(r"{}").unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.displayed_total(), 0);
        assert_eq!(page.total_pages(1), 1);
    }

    #[test]
    fn displayed_total_falls_back_to_item_count() {
        let page: CachePage = serde_json::from_str(
            r#"{"items": [{"_id": "a", "lat": 1.0, "lon": 2.0}, {"_id": "b", "lat": 1.0, "lon": 2.0}]}"#,
        )
        .unwrap();
        assert_eq!(page.displayed_total(), 2);

        let with_total: CachePage =
            serde_json::from_str(r#"{"items": [], "total": 123}"#).unwrap();
        assert_eq!(with_total.displayed_total(), 123);
    }

    #[test]
    fn total_pages_prefers_nb_pages_then_derives() {
        let reported: CachePage =
            serde_json::from_str(r#"{"items": [], "nb_pages": 4}"#).unwrap();
        assert_eq!(reported.total_pages(1), 4);

        let derived: CachePage =
            serde_json::from_str(r#"{"items": [], "total": 250, "page_size": 100}"#).unwrap();
        assert_eq!(derived.total_pages(1), 3);

        let bare: CachePage = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert_eq!(bare.total_pages(2), 2);
    }
}
