use serde::{Deserialize, Serialize};

use crate::api::{ApiCall, HomeLocation, UserProfile};
use crate::event::Secret;

/// Which of the two shell storage scopes a key lives in: session-scoped
/// storage is cleared when the browsing session ends, durable storage
/// survives until explicit logout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageScope {
    Session,
    Durable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
}

impl StoreKey {
    #[must_use]
    pub const fn scope(self) -> StorageScope {
        match self {
            Self::AccessToken => StorageScope::Session,
            Self::RefreshToken => StorageScope::Durable,
        }
    }

    /// Raw key as handed to the key-value shell; the prefix tells the
    /// shell which scope backs it.
    #[must_use]
    pub const fn raw(self) -> &'static str {
        match self {
            Self::AccessToken => "session.access_token",
            Self::RefreshToken => "durable.refresh_token",
        }
    }
}

/// By-value retry marker carried alongside every protected call. A call
/// that was already replayed once can never be replayed again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    replayed: bool,
}

impl Attempt {
    #[must_use]
    pub const fn first() -> Self {
        Self { replayed: false }
    }

    #[must_use]
    pub const fn replay(self) -> Self {
        Self { replayed: true }
    }

    #[must_use]
    pub const fn is_replay(self) -> bool {
        self.replayed
    }
}

/// A call parked while the shared refresh settles.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingCall {
    pub call: ApiCall,
    pub attempt: Attempt,
}

/// What the pipeline must do about a 401.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshDirective {
    /// First 401 in this window: the caller starts the one refresh.
    StartRefresh,
    /// A refresh is already in flight; the call was queued behind it.
    AwaitInFlight,
    /// No refresh token held; the session is over.
    LogoutAndPropagate,
    /// The call was already replayed once; no further recovery.
    Propagate,
}

/// The single mutable credential state shared by every page: tokens, the
/// user snapshot, and the bookkeeping that keeps token refresh
/// single-flight. Only the operations here may mutate it.
#[derive(Debug, Default)]
pub struct AuthSession {
    pub access_token: Option<Secret>,
    pub refresh_token: Option<Secret>,
    pub profile: Option<UserProfile>,
    pub home_location: Option<HomeLocation>,
    refresh_in_flight: bool,
    waiting_replay: Vec<PendingCall>,
    started: bool,
}

impl AuthSession {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    #[must_use]
    pub fn refresh_in_flight(&self) -> bool {
        self.refresh_in_flight
    }

    /// One-shot guard for `init`; the first caller wins.
    pub fn mark_started(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        true
    }

    /// Decide how to recover a 401 for `call`. At most one refresh is in
    /// flight at any time; every 401 that arrives while it is pending
    /// joins the same flight instead of racing its own.
    pub fn on_unauthorized(&mut self, call: ApiCall, attempt: Attempt) -> RefreshDirective {
        if attempt.is_replay() {
            return RefreshDirective::Propagate;
        }
        if self.refresh_token.is_none() {
            return RefreshDirective::LogoutAndPropagate;
        }
        self.waiting_replay.push(PendingCall {
            call,
            attempt: attempt.replay(),
        });
        if self.refresh_in_flight {
            RefreshDirective::AwaitInFlight
        } else {
            self.refresh_in_flight = true;
            RefreshDirective::StartRefresh
        }
    }

    /// The shared refresh settled; hand back everything waiting on it.
    pub fn settle_refresh(&mut self) -> Vec<PendingCall> {
        self.refresh_in_flight = false;
        std::mem::take(&mut self.waiting_replay)
    }

    pub fn set_access_token(&mut self, token: Secret) {
        self.access_token = Some(token);
    }

    pub fn set_refresh_token(&mut self, token: Secret) {
        self.refresh_token = Some(token);
    }

    /// Clear every credential and snapshot. Never touches the network;
    /// always succeeds.
    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.profile = None;
        self.home_location = None;
        self.refresh_in_flight = false;
        self.waiting_replay.clear();
    }
}
