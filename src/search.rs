use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::api::{CachePage, GeocacheSummary};
use crate::event::CacheId;
use crate::geo::Region;

/// Server-side sort orders accepted by the region search endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    PlacedAtDesc,
    FavoritesDesc,
    Difficulty,
    Terrain,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlacedAtDesc => "-placed_at",
            Self::FavoritesDesc => "-favorites",
            Self::Difficulty => "difficulty",
            Self::Terrain => "terrain",
        }
    }
}

/// Optional referential filters forwarded verbatim to the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub cache_type: Option<String>,
    pub size: Option<String>,
    pub sort: SortOrder,
}

/// Everything needed to issue (or re-issue) one page fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub region: Region,
    pub filters: SearchFilters,
    pub page: u32,
    pub generation: u64,
}

/// Why a search request is currently a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchGate {
    Ready,
    /// A fetch is already in progress.
    Busy,
    /// No region has been committed yet.
    RegionUndefined,
    /// The cursor moved past the last known page.
    PageExhausted,
}

/// Cumulative "load more" state for one search page instance: page
/// cursor, last known page count, and the set of identifiers already
/// rendered. Owned by the page; never shared.
#[derive(Clone, Debug, Default)]
pub struct RegionSearch {
    region: Option<Region>,
    filters: SearchFilters,
    page: u32,
    total_pages: u32,
    seen: HashSet<CacheId>,
    in_flight: bool,
    displayed_total: u64,
    generation: u64,
}

impl RegionSearch {
    /// Start a fresh accumulation window for `region`, discarding the
    /// cursor, the page count and every remembered identifier. Responses
    /// still in flight for the previous window are recognisably stale.
    pub fn reset_for(&mut self, region: Option<Region>) {
        self.region = region;
        self.page = 1;
        self.total_pages = 1;
        self.seen.clear();
        self.in_flight = false;
        self.displayed_total = 0;
        self.generation += 1;
    }

    pub fn set_filters(&mut self, filters: SearchFilters) {
        self.filters = filters;
        let region = self.region.take();
        self.reset_for(region);
    }

    #[must_use]
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    #[must_use]
    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    #[must_use]
    pub fn gate(&self) -> SearchGate {
        if self.in_flight {
            SearchGate::Busy
        } else if self.region.is_none() {
            SearchGate::RegionUndefined
        } else if self.page > self.total_pages {
            SearchGate::PageExhausted
        } else {
            SearchGate::Ready
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.page > self.total_pages
    }

    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    #[must_use]
    pub fn displayed_total(&self) -> u64 {
        self.displayed_total
    }

    #[must_use]
    pub fn rendered_count(&self) -> usize {
        self.seen.len()
    }

    /// Hand out the next page fetch, or nothing if the gate is closed.
    pub fn begin_fetch(&mut self) -> Option<PageRequest> {
        if self.gate() != SearchGate::Ready {
            return None;
        }
        let region = self.region.clone()?;
        self.in_flight = true;
        Some(PageRequest {
            region,
            filters: self.filters.clone(),
            page: self.page,
            generation: self.generation,
        })
    }

    /// Fold one successful page into the window: advance the cursor from
    /// the server's reported position, remember every identifier, and
    /// return only the items not rendered before.
    pub fn absorb(&mut self, requested_page: u32, page: CachePage) -> Vec<GeocacheSummary> {
        self.in_flight = false;

        let reported = page.page.unwrap_or(requested_page).max(1);
        self.total_pages = page.total_pages(reported);
        // Cursor never runs past total_pages + 1.
        self.page = (reported + 1).min(self.total_pages + 1);
        self.displayed_total = page.displayed_total();

        page.items
            .into_iter()
            .filter(|item| self.seen.insert(item.id.clone()))
            .collect()
    }

    /// A failed fetch releases the gate but leaves the cursor and the
    /// seen-set exactly as they were.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use proptest::prelude::*;

    fn circle() -> Region {
        Region::Circle {
            center: Coordinate::new(43.1, 5.94).unwrap(),
            radius_km: 10.0,
        }
    }

    fn cache(id: &str) -> GeocacheSummary {
        GeocacheSummary {
            id: CacheId::new(id),
            name: None,
            lat: 43.1,
            lon: 5.9,
            difficulty: None,
            terrain: None,
            favorites: None,
        }
    }

    fn page_of(ids: &[&str], page: u32, nb_pages: u32) -> CachePage {
        CachePage {
            items: ids.iter().map(|id| cache(id)).collect(),
            total: None,
            page: Some(page),
            nb_pages: Some(nb_pages),
            page_size: None,
        }
    }

    #[test]
    fn search_is_disabled_without_a_region() {
        let mut search = RegionSearch::default();
        assert_eq!(search.gate(), SearchGate::RegionUndefined);
        assert!(search.begin_fetch().is_none());
    }

    #[test]
    fn search_is_disabled_while_a_fetch_is_in_flight() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));
        assert!(search.begin_fetch().is_some());
        assert_eq!(search.gate(), SearchGate::Busy);
        assert!(search.begin_fetch().is_none());
    }

    #[test]
    fn load_more_dedups_and_forwards_only_fresh_items() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));

        let request = search.begin_fetch().unwrap();
        assert_eq!(request.page, 1);
        let fresh = search.absorb(request.page, page_of(&["a", "b"], 1, 2));
        assert_eq!(fresh.len(), 2);

        let request = search.begin_fetch().unwrap();
        assert_eq!(request.page, 2);
        let fresh = search.absorb(request.page, page_of(&["b", "c"], 2, 2));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id.as_str(), "c");

        assert_eq!(search.rendered_count(), 3);
        assert_eq!(search.gate(), SearchGate::PageExhausted);
        assert!(search.begin_fetch().is_none());
    }

    #[test]
    fn refetching_the_same_page_adds_nothing() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));

        let request = search.begin_fetch().unwrap();
        search.absorb(request.page, page_of(&["a", "b"], 1, 3));
        assert_eq!(search.rendered_count(), 2);

        // A retried page 1 (e.g. the shell resubmitted) yields no new
        // markers and only grows the set by genuinely new ids.
        let fresh = search.absorb(1, page_of(&["a", "b"], 1, 3));
        assert!(fresh.is_empty());
        assert_eq!(search.rendered_count(), 2);
    }

    #[test]
    fn reset_discards_cursor_and_seen_set() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));
        let request = search.begin_fetch().unwrap();
        let generation = request.generation;
        search.absorb(request.page, page_of(&["a", "b"], 1, 5));

        search.reset_for(Some(circle()));
        assert_eq!(search.rendered_count(), 0);
        assert_eq!(search.displayed_total(), 0);
        assert!(!search.is_current(generation));
        let request = search.begin_fetch().unwrap();
        assert_eq!(request.page, 1);
        // Previously-seen ids render again in the fresh window.
        let fresh = search.absorb(request.page, page_of(&["a"], 1, 1));
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn filter_change_resets_but_keeps_region() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));
        let request = search.begin_fetch().unwrap();
        search.absorb(request.page, page_of(&["a"], 1, 2));

        search.set_filters(SearchFilters {
            sort: SortOrder::Difficulty,
            ..SearchFilters::default()
        });
        assert!(search.region().is_some());
        assert_eq!(search.rendered_count(), 0);
        assert_eq!(search.begin_fetch().unwrap().page, 1);
    }

    #[test]
    fn failure_releases_gate_without_advancing() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));
        let request = search.begin_fetch().unwrap();
        search.absorb(request.page, page_of(&["a"], 1, 3));

        let before_page = search.begin_fetch().unwrap().page;
        search.fail();
        let retried = search.begin_fetch().unwrap();
        assert_eq!(retried.page, before_page);
        assert_eq!(search.rendered_count(), 1);
    }

    #[test]
    fn cursor_is_clamped_to_one_past_the_end() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));
        let request = search.begin_fetch().unwrap();
        // Server claims page 7 of 2; the cursor still stops at 3.
        search.absorb(request.page, page_of(&["a"], 7, 2));
        assert!(search.is_exhausted());
        assert_eq!(search.gate(), SearchGate::PageExhausted);
    }

    #[test]
    fn stale_generations_are_detectable() {
        let mut search = RegionSearch::default();
        search.reset_for(Some(circle()));
        let request = search.begin_fetch().unwrap();
        search.reset_for(Some(circle()));
        assert!(!search.is_current(request.generation));
    }

    proptest! {
        #[test]
        fn seen_set_growth_matches_fresh_ids(
            first in proptest::collection::vec("[a-f]{1,2}", 0..8),
            second in proptest::collection::vec("[a-f]{1,2}", 0..8),
        ) {
            let mut search = RegionSearch::default();
            search.reset_for(Some(circle()));

            let request = search.begin_fetch().unwrap();
            let ids: Vec<&str> = first.iter().map(String::as_str).collect();
            search.absorb(request.page, page_of(&ids, 1, 2));
            let after_first = search.rendered_count();

            if let Some(request) = search.begin_fetch() {
                let ids: Vec<&str> = second.iter().map(String::as_str).collect();
                let fresh = search.absorb(request.page, page_of(&ids, 2, 2));
                prop_assert_eq!(search.rendered_count(), after_first + fresh.len());
            }
        }
    }
}
