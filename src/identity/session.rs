//! Server-side session store

use std::time::Duration;

use dashmap::DashMap;
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tracing::debug;

use super::AuthenticatedUser;

/// Name of the session slot holding the signed-in user's claims
pub const USER_KEY: &str = "user";

/// Idle lifetime of a session that has not completed a login
pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct SessionData {
    /// Pending `state` of a login round-trip
    login_state: Option<String>,
    /// Claims stored under [`USER_KEY`]
    user: Option<AuthenticatedUser>,
    last_seen: Instant,
}

impl SessionData {
    fn is_live(&self, ttl: Duration, now: Instant) -> bool {
        let ttl = if self.user.is_some() {
            ttl
        } else {
            ttl.min(PENDING_LOGIN_TTL)
        };
        now.duration_since(self.last_seen) <= ttl
    }
}

/// In-memory sessions keyed by an opaque cookie value.
///
/// Sessions idle for longer than the TTL are treated as absent and
/// removed on access or by [`purge_expired`](Self::purge_expired).
/// Sessions without a signed-in user expire after [`PENDING_LOGIN_TTL`].
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, SessionData>,
    ttl: Duration,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Start a new empty session and return its id
    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            id.clone(),
            SessionData {
                login_state: None,
                user: None,
                last_seen: Instant::now(),
            },
        );
        debug!(sessions = self.sessions.len(), "Session created");
        id
    }

    /// Whether `id` names a live session
    pub fn contains(&self, id: &str) -> bool {
        self.with_live(id, |_| ()).is_some()
    }

    /// The signed-in user of a session, if any
    pub fn user(&self, id: &str) -> Option<AuthenticatedUser> {
        self.with_live(id, |s| s.user.clone()).flatten()
    }

    /// Store the signed-in user; returns false if the session is gone
    pub fn set_user(&self, id: &str, user: AuthenticatedUser) -> bool {
        self.with_live(id, |s| {
            s.user = Some(user);
            s.login_state = None;
        })
        .is_some()
    }

    /// Finish a login: drop `previous_id` and return a new session id
    /// holding `user`
    pub fn sign_in(&self, previous_id: &str, user: AuthenticatedUser) -> String {
        self.sessions.remove(previous_id);
        let id = self.create();
        self.set_user(&id, user);
        id
    }

    /// Remember the `state` sent with a login redirect
    pub fn set_login_state(&self, id: &str, state: String) -> bool {
        self.with_live(id, |s| s.login_state = Some(state)).is_some()
    }

    /// Consume the pending login state and compare it with `returned`.
    ///
    /// The pending state is cleared whatever the outcome.
    pub fn verify_login_state(&self, id: &str, returned: &str) -> bool {
        self.with_live(id, |s| s.login_state.take())
            .flatten()
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(returned.as_bytes())))
    }

    /// Drop a session
    pub fn remove(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            debug!("Session removed");
        }
    }

    /// Remove every idle session, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions
            .retain(|_, s| s.is_live(self.ttl, now));
        before.saturating_sub(self.sessions.len())
    }

    /// Number of stored sessions (including idle ones not yet purged)
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `f` on a live session, refreshing its idle timer
    fn with_live<T>(&self, id: &str, f: impl FnOnce(&mut SessionData) -> T) -> Option<T> {
        let now = Instant::now();
        {
            let mut entry = self.sessions.get_mut(id)?;
            if entry.is_live(self.ttl, now) {
                entry.last_seen = now;
                return Some(f(&mut entry));
            }
        }
        // Entry guard must be dropped before remove
        self.sessions.remove(id);
        None
    }
}
