//! Bearer-token session state and single-flight invalidation.
//!
//! The invalidation flag is the only mutable state shared across concurrent
//! requests. It is a check-and-set guarded by one mutex, so the "at most one
//! teardown" invariant holds even off a single-threaded event loop. The flag
//! is an `Instant` window rather than a boolean: it expires on its own after
//! [`INVALIDATE_COOLDOWN`], so a teardown that never completes cannot wedge
//! future invalidations.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::{KeyValueStore, TOKEN_KEY};

/// How long one invalidation suppresses the next. Inside the observed
/// 1-1.5 s band of the deployed backend contract.
pub const INVALIDATE_COOLDOWN: Duration = Duration::from_millis(1200);

/// Path prefixes that never need a bearer token.
const PUBLIC_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/captcha",
    "/auth/sms-code",
    "/public/",
    "/sse/close",
];

/// Collaborator invoked once per winning invalidation (clear app state,
/// navigate to the login screen, and so on).
pub trait LogoutHandler: Send + Sync {
    fn on_logout(&self);
}

/// Default handler when the host registers nothing: log and carry on.
#[derive(Debug, Default)]
pub struct LogLogout;

impl LogoutHandler for LogLogout {
    fn on_logout(&self) {
        warn!("session invalidated with no logout handler registered");
    }
}

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    invalidating_until: Option<Instant>,
}

/// Per-client authentication session.
pub struct AuthSession {
    state: Mutex<AuthState>,
    store: Arc<dyn KeyValueStore>,
    logout: Arc<dyn LogoutHandler>,
    cooldown: Duration,
}

impl AuthSession {
    pub fn new(store: Arc<dyn KeyValueStore>, logout: Arc<dyn LogoutHandler>) -> Self {
        Self {
            state: Mutex::new(AuthState::default()),
            store,
            logout,
            cooldown: INVALIDATE_COOLDOWN,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Current bearer token: in-memory state first, persisted store second.
    /// A store hit is cached back into memory.
    pub fn resolve_token(&self) -> Option<String> {
        if let Ok(state) = self.state.lock() {
            if let Some(token) = &state.token {
                return Some(token.clone());
            }
        }
        let stored = self.store.get(TOKEN_KEY)?;
        if let Ok(mut state) = self.state.lock() {
            state.token = Some(stored.clone());
        }
        Some(stored)
    }

    /// Store a fresh token (memory and persisted store).
    pub fn set_token(&self, token: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.token = Some(token.to_string());
        }
        self.store.set(TOKEN_KEY, token);
    }

    /// Whether a request to `path` must carry a bearer token. The explicit
    /// per-call override wins; otherwise everything outside the public
    /// allow-list needs auth.
    pub fn requires_auth(&self, path: &str, explicit: Option<bool>) -> bool {
        if let Some(explicit) = explicit {
            return explicit;
        }
        !PUBLIC_PATHS.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Pre-flight gate: resolve the token for `path`, failing with
    /// [`Error::NotAuthenticated`] before any I/O when auth is required but
    /// no token exists. Returns the token to attach, if any.
    pub fn preflight(&self, path: &str, explicit: Option<bool>) -> Result<Option<String>> {
        if !self.requires_auth(path, explicit) {
            return Ok(None);
        }
        match self.resolve_token() {
            Some(token) => Ok(Some(token)),
            None => Err(Error::NotAuthenticated),
        }
    }

    /// Single-flight session teardown. Returns `true` when this call won the
    /// flight and performed the side effects (token cleared, logout
    /// collaborator notified); `false` when another invalidation is already
    /// inside its cooldown window.
    pub fn invalidate(&self) -> bool {
        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(_) => return false,
            };
            let now = Instant::now();
            if let Some(until) = state.invalidating_until {
                if now < until {
                    debug!("session invalidation already in flight, skipping");
                    return false;
                }
            }
            state.invalidating_until = Some(now + self.cooldown);
            state.token = None;
        }
        // Side effects run outside the lock; the window above already
        // serializes them.
        self.store.remove(TOKEN_KEY);
        info!("session invalidated, notifying logout handler");
        self.logout.on_logout();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingLogout(AtomicU32);

    impl LogoutHandler for CountingLogout {
        fn on_logout(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session() -> (AuthSession, Arc<CountingLogout>) {
        let logout = Arc::new(CountingLogout::default());
        let session = AuthSession::new(Arc::new(MemoryStore::new()), logout.clone());
        (session, logout)
    }

    #[test]
    fn allow_list_and_override() {
        let (session, _) = session();
        assert!(!session.requires_auth("/auth/login", None));
        assert!(!session.requires_auth("/public/templates", None));
        assert!(session.requires_auth("/video/task/submit", None));
        // Explicit override wins in both directions.
        assert!(session.requires_auth("/auth/login", Some(true)));
        assert!(!session.requires_auth("/video/task/submit", Some(false)));
    }

    #[test]
    fn preflight_fails_without_token() {
        let (session, _) = session();
        assert!(matches!(
            session.preflight("/video/task/submit", None),
            Err(Error::NotAuthenticated)
        ));
        session.set_token("tok");
        assert_eq!(
            session.preflight("/video/task/submit", None).unwrap(),
            Some("tok".to_string())
        );
        assert_eq!(session.preflight("/auth/login", None).unwrap(), None);
    }

    #[test]
    fn token_falls_back_to_store() {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, "persisted");
        let session = AuthSession::new(store, Arc::new(LogLogout));
        assert_eq!(session.resolve_token().as_deref(), Some("persisted"));
    }

    #[test]
    fn invalidate_is_single_flight() {
        let (session, logout) = session();
        session.set_token("tok");

        assert!(session.invalidate());
        assert!(!session.invalidate());
        assert!(!session.invalidate());

        assert_eq!(logout.0.load(Ordering::SeqCst), 1);
        assert_eq!(session.resolve_token(), None);
    }

    #[test]
    fn cooldown_expiry_allows_a_new_flight() {
        let logout = Arc::new(CountingLogout::default());
        let session = AuthSession::new(Arc::new(MemoryStore::new()), logout.clone())
            .with_cooldown(Duration::from_millis(0));

        assert!(session.invalidate());
        // Zero-length window: the flag has already expired.
        assert!(session.invalidate());
        assert_eq!(logout.0.load(Ordering::SeqCst), 2);
    }
}
