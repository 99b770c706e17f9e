use tracing::{debug, info, warn};

use crate::api::{
    ApiCall, CachePage, HomeLocation, LocationUpdate, RefreshRequest, TokenPair, UserProfile,
    LOGIN_PATH, REFRESH_PATH,
};
use crate::auth::{Attempt, RefreshDirective, StoreKey};
use crate::capabilities::{marker_features, Capabilities, MapShape};
use crate::event::{ApiResult, Event, KvRestore, Secret};
use crate::geo::{clamp_radius, Coordinate, PickOutcome, PickSession, Region, RegionKind};
use crate::model::{Model, ViewModel};
use crate::search::{SearchFilters, SearchGate};
use crate::{AuthError, LoadError};

/// A classified HTTP outcome. 401 is split out because the pipeline is
/// its sole handler; every other status passes through untouched.
enum Fetched {
    Success(Vec<u8>),
    Unauthorized,
    Failed(LoadError),
}

fn classify(result: ApiResult) -> Fetched {
    match result {
        Ok(mut response) => {
            let status: u16 = response.status().into();
            match status {
                401 => Fetched::Unauthorized,
                200..=299 => Fetched::Success(response.take_body().unwrap_or_default()),
                _ => Fetched::Failed(LoadError::Status(status)),
            }
        }
        Err(err) => Fetched::Failed(LoadError::Network(err.to_string())),
    }
}

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        match event {
            Event::Start => self.start(model, caps),
            Event::ApiBaseConfigured { base_url } => {
                match crate::api::ApiConfig::new(base_url) {
                    Ok(config) => model.config = config,
                    Err(err) => warn!(?err, "ignoring invalid API base"),
                }
            }

            Event::LoginSubmitted {
                identifier,
                password,
            } => self.send_login(&identifier, &password, model, caps),
            Event::LoginCompleted(result) => self.on_login(*result, model, caps),
            Event::LogoutRequested => {
                model.auth_error = None;
                self.do_logout(model, caps);
            }
            Event::RefreshCompleted(result) => self.on_refresh(*result, model, caps),
            Event::HomeLocationSubmitted { lat, lon } => match Coordinate::new(lat, lon) {
                Ok(_) => {
                    self.dispatch(
                        ApiCall::SaveHomeLocation { lat, lon },
                        Attempt::first(),
                        model,
                        caps,
                    );
                }
                Err(err) => warn!(?err, "rejecting out-of-range home location"),
            },

            Event::ApiResponded {
                call,
                attempt,
                result,
            } => match classify(*result) {
                Fetched::Success(body) => self.on_call_succeeded(call, &body, model, caps),
                Fetched::Unauthorized => self.recover_unauthorized(call, attempt, model, caps),
                Fetched::Failed(error) => self.on_call_failed(&call, error, model, caps),
            },

            Event::AccessTokenRestored(restored) => self.on_access_restored(restored, model, caps),
            Event::RefreshTokenRestored(restored) => {
                match restored {
                    Ok(Some(bytes)) => match String::from_utf8(bytes) {
                        Ok(token) if !token.is_empty() => {
                            model.auth.set_refresh_token(Secret::new(token));
                        }
                        _ => warn!("stored refresh token is unreadable"),
                    },
                    Ok(None) => debug!("no durable refresh token"),
                    Err(err) => warn!(?err, "durable storage read failed"),
                }
            }
            Event::StorageSynced { ok } => {
                if !ok {
                    warn!("credential storage write failed");
                }
            }

            Event::PickArmed { kind } => self.arm_pick(kind, model, caps),
            Event::MapClicked { lat, lng } => self.on_map_click(lat, lng, model, caps),
            Event::MapPointerMoved { lat, lng } => self.on_pointer_move(lat, lng, model, caps),
            Event::RadiusChanged { radius_km } => self.on_radius_change(radius_km, model, caps),
            Event::FiltersChanged(filters) => self.on_filters_change(filters, model, caps),
            Event::SearchRequested => self.start_search(model, caps),
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let pick_hint = if model.pick.is_active() {
            Some(match model.pick.kind() {
                RegionKind::Radius => "Click the map to set the search center".to_string(),
                RegionKind::BoundingBox if model.pick.awaiting_second() => {
                    "Click the opposite corner".to_string()
                }
                RegionKind::BoundingBox => "Click the first corner".to_string(),
            })
        } else {
            None
        };

        ViewModel {
            signed_in: model.auth.is_authenticated(),
            username: model.auth.profile.as_ref().map(|p| p.username.clone()),
            session_expired: model.auth_error.is_some(),
            home_location: model.auth.home_location.as_ref().map(|l| (l.lat, l.lon)),
            picking: model.pick.is_active(),
            pick_hint,
            region: model.search.region().map(MapShape::from),
            radius_km: model.radius_km,
            loading: model.search.is_loading(),
            can_search: model.search.gate() == SearchGate::Ready,
            total_results: model.search.displayed_total(),
            results_shown: model.search.rendered_count(),
            error: model.last_error.as_ref().map(LoadError::user_message),
        }
    }
}

impl App {
    // --- Lifecycle ---

    fn start(&self, model: &mut Model, caps: &Capabilities) {
        if !model.auth.mark_started() {
            return;
        }
        // Restore the refresh token first: if the restored access token
        // turns out to be expired, the first snapshot fetch needs it.
        caps.key_value.get(
            StoreKey::RefreshToken.raw().to_string(),
            Event::RefreshTokenRestored,
        );
        caps.key_value.get(
            StoreKey::AccessToken.raw().to_string(),
            Event::AccessTokenRestored,
        );
    }

    fn on_access_restored(&self, restored: KvRestore, model: &mut Model, caps: &Capabilities) {
        match restored {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(token) if !token.is_empty() => {
                    model.auth.set_access_token(Secret::new(token));
                    self.fetch_user_snapshot(model, caps);
                    caps.render.render();
                }
                _ => warn!("stored access token is unreadable"),
            },
            // No session to restore: return without touching the
            // network, so a cold start never fires an unauthenticated
            // profile fetch.
            Ok(None) => debug!("no stored session"),
            Err(err) => warn!(?err, "session storage read failed"),
        }
    }

    // --- Credential store operations ---

    fn send_login(&self, identifier: &str, password: &Secret, model: &Model, caps: &Capabilities) {
        let url = match model.config.endpoint(LOGIN_PATH) {
            Ok(url) => url,
            Err(err) => {
                warn!(?err, "cannot build login URL");
                return;
            }
        };
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", identifier)
            .append_pair("password", password.expose())
            .finish();
        caps.http
            .post(url.as_str())
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send(|result| Event::LoginCompleted(Box::new(result)));
    }

    fn on_login(&self, result: ApiResult, model: &mut Model, caps: &Capabilities) {
        match classify(result) {
            Fetched::Success(body) => match serde_json::from_slice::<TokenPair>(&body) {
                Ok(pair) => {
                    model.auth_error = None;
                    model.last_error = None;
                    self.store_credentials(pair, model, caps);
                    info!("signed in");
                    self.fetch_user_snapshot(model, caps);
                }
                Err(err) => {
                    warn!(?err, "login response unreadable");
                    model.last_error = Some(LoadError::Decode(err.to_string()));
                }
            },
            // Wrong credentials, not an expired token: the pipeline
            // never refreshes the login call.
            Fetched::Unauthorized => model.last_error = Some(LoadError::Status(401)),
            Fetched::Failed(error) => model.last_error = Some(error),
        }
        caps.render.render();
    }

    fn store_credentials(&self, pair: TokenPair, model: &mut Model, caps: &Capabilities) {
        model.auth.set_access_token(Secret::new(pair.access_token.clone()));
        caps.key_value.set(
            StoreKey::AccessToken.raw().to_string(),
            pair.access_token.into_bytes(),
            |result| Event::StorageSynced {
                ok: result.is_ok(),
            },
        );
        if let Some(refresh) = pair.refresh_token {
            model.auth.set_refresh_token(Secret::new(refresh.clone()));
            caps.key_value.set(
                StoreKey::RefreshToken.raw().to_string(),
                refresh.into_bytes(),
                |result| Event::StorageSynced {
                    ok: result.is_ok(),
                },
            );
        }
    }

    fn do_logout(&self, model: &mut Model, caps: &Capabilities) {
        model.auth.clear();
        caps.key_value
            .delete(StoreKey::AccessToken.raw().to_string(), |result| {
                Event::StorageSynced {
                    ok: result.is_ok(),
                }
            });
        caps.key_value
            .delete(StoreKey::RefreshToken.raw().to_string(), |result| {
                Event::StorageSynced {
                    ok: result.is_ok(),
                }
            });
        caps.render.render();
    }

    /// Profile and home location, issued together. Each is individually
    /// best-effort; one failing never rolls back the login.
    fn fetch_user_snapshot(&self, model: &Model, caps: &Capabilities) {
        self.dispatch(ApiCall::Profile, Attempt::first(), model, caps);
        self.dispatch(ApiCall::HomeLocation, Attempt::first(), model, caps);
    }

    // --- Authenticated request pipeline ---

    fn dispatch(&self, call: ApiCall, attempt: Attempt, model: &Model, caps: &Capabilities) {
        let url = match call.url(&model.config) {
            Ok(url) => url,
            Err(err) => {
                warn!(?err, "cannot build endpoint URL");
                return;
            }
        };

        let mut builder = match &call {
            ApiCall::SaveHomeLocation { lat, lon } => {
                let update = LocationUpdate {
                    lat: *lat,
                    lon: *lon,
                };
                let body = match serde_json::to_string(&update) {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(?err, "cannot encode location payload");
                        return;
                    }
                };
                caps.http
                    .put(url.as_str())
                    .header("content-type", "application/json")
                    .body(body)
            }
            _ => caps.http.get(url.as_str()),
        };

        if let Some(token) = &model.auth.access_token {
            builder = builder.header("authorization", format!("Bearer {}", token.expose()));
        }

        debug!(call = ?call, replay = attempt.is_replay(), "dispatching API call");
        builder.send(move |result| Event::ApiResponded {
            call,
            attempt,
            result: Box::new(result),
        });
    }

    fn recover_unauthorized(
        &self,
        call: ApiCall,
        attempt: Attempt,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match model.auth.on_unauthorized(call.clone(), attempt) {
            RefreshDirective::StartRefresh => {
                debug!("starting the shared token refresh");
                self.send_refresh(model, caps);
            }
            RefreshDirective::AwaitInFlight => {
                debug!("joining the in-flight token refresh");
            }
            RefreshDirective::LogoutAndPropagate => {
                warn!("401 with no refresh token; signing out");
                self.do_logout(model, caps);
                model.auth_error = Some(AuthError::RefreshUnavailable);
                self.on_call_failed(&call, LoadError::Status(401), model, caps);
            }
            RefreshDirective::Propagate => {
                self.on_call_failed(&call, LoadError::Status(401), model, caps);
            }
        }
    }

    fn send_refresh(&self, model: &mut Model, caps: &Capabilities) {
        let Some(token) = &model.auth.refresh_token else {
            // on_unauthorized guards this; nothing sensible left to do.
            self.refresh_failed(model, caps);
            return;
        };
        let url = match model.config.endpoint(REFRESH_PATH) {
            Ok(url) => url,
            Err(err) => {
                warn!(?err, "cannot build refresh URL");
                self.refresh_failed(model, caps);
                return;
            }
        };
        let request = RefreshRequest {
            refresh_token: token.expose(),
        };
        let body = match serde_json::to_string(&request) {
            Ok(body) => body,
            Err(err) => {
                warn!(?err, "cannot encode refresh payload");
                self.refresh_failed(model, caps);
                return;
            }
        };
        caps.http
            .post(url.as_str())
            .header("content-type", "application/json")
            .body(body)
            .send(|result| Event::RefreshCompleted(Box::new(result)));
    }

    fn on_refresh(&self, result: ApiResult, model: &mut Model, caps: &Capabilities) {
        match classify(result) {
            Fetched::Success(body) => match serde_json::from_slice::<TokenPair>(&body) {
                Ok(pair) => {
                    self.store_credentials(pair, model, caps);
                    let waiting = model.auth.settle_refresh();
                    info!(replays = waiting.len(), "access token refreshed");
                    for pending in waiting {
                        self.dispatch(pending.call, pending.attempt, model, caps);
                    }
                    caps.render.render();
                }
                Err(err) => {
                    warn!(?err, "refresh response unreadable");
                    self.refresh_failed(model, caps);
                }
            },
            // A 401 from the refresh endpoint itself is terminal; this
            // handler never feeds back into recovery, so no loop exists.
            Fetched::Unauthorized => self.refresh_failed(model, caps),
            Fetched::Failed(error) => {
                warn!(?error, "token refresh failed");
                self.refresh_failed(model, caps);
            }
        }
    }

    fn refresh_failed(&self, model: &mut Model, caps: &Capabilities) {
        let waiting = model.auth.settle_refresh();
        self.do_logout(model, caps);
        model.auth_error = Some(AuthError::RefreshFailed);
        for pending in waiting {
            self.on_call_failed(&pending.call, LoadError::Status(401), model, caps);
        }
        caps.render.render();
    }

    fn on_call_succeeded(
        &self,
        call: ApiCall,
        body: &[u8],
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match call {
            ApiCall::Profile => match serde_json::from_slice::<UserProfile>(body) {
                Ok(profile) => {
                    model.auth.profile = Some(profile);
                    caps.render.render();
                }
                Err(err) => warn!(?err, "profile response unreadable"),
            },
            ApiCall::HomeLocation => match serde_json::from_slice::<HomeLocation>(body) {
                Ok(location) => {
                    model.auth.home_location = Some(location);
                    caps.render.render();
                }
                Err(err) => warn!(?err, "location response unreadable"),
            },
            ApiCall::SaveHomeLocation { lat, lon } => {
                model.auth.home_location = Some(HomeLocation {
                    lat,
                    lon,
                    coords: None,
                    updated_at: None,
                });
                caps.render.render();
            }
            ApiCall::SearchPage(request) => {
                if !model.search.is_current(request.generation) {
                    debug!("dropping results for a superseded search window");
                    return;
                }
                match serde_json::from_slice::<CachePage>(body) {
                    Ok(page) => {
                        let fresh = model.search.absorb(request.page, page);
                        if !fresh.is_empty() {
                            caps.map.add_markers(marker_features(&fresh));
                        }
                        model.last_error = None;
                    }
                    Err(err) => {
                        warn!(?err, "search response unreadable");
                        model.search.fail();
                        model.last_error = Some(LoadError::Decode(err.to_string()));
                    }
                }
                caps.render.render();
            }
        }
    }

    fn on_call_failed(
        &self,
        call: &ApiCall,
        error: LoadError,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match call {
            // Snapshot fetches are best-effort by contract.
            ApiCall::Profile | ApiCall::HomeLocation => {
                warn!(?error, "user snapshot fetch failed");
            }
            ApiCall::SaveHomeLocation { .. } => {
                model.last_error = Some(error);
                caps.render.render();
            }
            ApiCall::SearchPage(request) => {
                if !model.search.is_current(request.generation) {
                    debug!("dropping failure for a superseded search window");
                    return;
                }
                model.search.fail();
                model.last_error = Some(error);
                caps.render.render();
            }
        }
    }

    // --- Geo search state machine ---

    fn arm_pick(&self, kind: RegionKind, model: &mut Model, caps: &Capabilities) {
        // Arming clears the previous region and everything accumulated
        // under it before the picker goes live.
        model.search.reset_for(None);
        model.pick = PickSession::armed(kind);
        model.last_error = None;
        caps.map.clear_markers();
        caps.map.clear_region();
        caps.map.clear_preview();
        caps.map.set_pick_cursor(true);
        caps.render.render();
    }

    fn on_map_click(&self, lat: f64, lng: f64, model: &mut Model, caps: &Capabilities) {
        let point = match Coordinate::new(lat, lng) {
            Ok(point) => point,
            Err(err) => {
                warn!(?err, "ignoring out-of-range map click");
                return;
            }
        };
        match model.pick.capture(point) {
            PickOutcome::Ignored => {}
            PickOutcome::FirstCorner(_) => caps.render.render(),
            PickOutcome::CenterCommitted(center) => {
                self.commit_region(Region::circle(center, model.radius_km), model, caps);
            }
            PickOutcome::BoxCommitted(bbox) => {
                self.commit_region(Region::Box(bbox), model, caps);
            }
        }
    }

    fn on_pointer_move(&self, lat: f64, lng: f64, model: &Model, caps: &Capabilities) {
        let Ok(cursor) = Coordinate::new(lat, lng) else {
            return;
        };
        if let Some(preview) = model.pick.preview(cursor) {
            caps.map.show_preview(preview.into());
        }
    }

    fn commit_region(&self, region: Region, model: &mut Model, caps: &Capabilities) {
        let shape = MapShape::from(&region);
        model.search.reset_for(Some(region));
        caps.map.clear_preview();
        caps.map.clear_markers();
        caps.map.show_region(shape);
        caps.map.set_pick_cursor(false);
        caps.render.render();
    }

    fn on_radius_change(&self, radius_km: f64, model: &mut Model, caps: &Capabilities) {
        let radius = clamp_radius(radius_km);
        model.radius_km = radius;
        // The committed center survives a radius change; only the
        // accumulator starts over.
        if let Some(Region::Circle { center, .. }) = model.search.region().cloned() {
            self.commit_region(
                Region::Circle {
                    center,
                    radius_km: radius,
                },
                model,
                caps,
            );
        } else {
            caps.render.render();
        }
    }

    fn on_filters_change(&self, filters: SearchFilters, model: &mut Model, caps: &Capabilities) {
        model.search.set_filters(filters);
        caps.map.clear_markers();
        caps.render.render();
    }

    fn start_search(&self, model: &mut Model, caps: &Capabilities) {
        match model.search.gate() {
            SearchGate::Ready => {
                if let Some(request) = model.search.begin_fetch() {
                    self.dispatch(ApiCall::SearchPage(request), Attempt::first(), model, caps);
                    caps.render.render();
                }
            }
            gate => debug!(?gate, "search request is a no-op"),
        }
    }
}
