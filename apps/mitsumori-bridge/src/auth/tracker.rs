use std::sync::Arc;

use bytes::Bytes;
use mitsumori_core::{AuthEvent, Session, SessionState};
use parking_lot::{Mutex, RwLock};
use port_bus::Bus;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::error::AuthError;

/// Internal inbound port carrying backend session notifications into the
/// bridge's dispatch loop.
pub const AUTH_EVENT_TOPIC: &str = "authStateChange";

/// The bridge's single view of who is signed in.
///
/// Explicit calls (`authenticate`, `clear`) come from the request handlers;
/// backend notifications arrive through [`SessionTracker::apply`] after being
/// routed over the bus by the subscription set up in [`SessionTracker::attach`].
#[derive(Default)]
pub struct SessionTracker {
    state: RwLock<SessionState>,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl SessionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn current(&self) -> Option<Session> {
        self.state.read().session().cloned()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id().map(str::to_owned)
    }

    pub fn require_user(&self) -> Result<String, AuthError> {
        self.user_id().ok_or(AuthError::NotSignedIn)
    }

    pub fn authenticate(&self, session: Session) {
        debug!(target: "mitsumori::auth", user_id = %session.user_id, "session established");
        *self.state.write() = SessionState::Authenticated(session);
    }

    pub fn clear(&self) {
        *self.state.write() = SessionState::Anonymous;
    }

    /// Applies a backend notification. Returns the new state when it changed.
    ///
    /// Notifications travel on their own queue, so by the time one is applied
    /// the handlers may have signed in or out again. `backend_session` reads
    /// the backend's session under the tracker's lock, and a notification that
    /// no longer matches it is stale and dropped: `SignedOut` only applies
    /// while the backend holds no session, `TokenRefreshed` only while the
    /// backend still holds that very token.
    ///
    /// Notifications are ignored while anonymous, and `SignedIn` is always
    /// ignored since explicit sign-ins already went through `authenticate`.
    pub fn apply<F>(&self, event: &AuthEvent, backend_session: F) -> Option<SessionState>
    where
        F: FnOnce() -> Option<Session>,
    {
        let mut state = self.state.write();
        let SessionState::Authenticated(current) = &*state else {
            debug!(target: "mitsumori::auth", "ignoring notification while anonymous");
            return None;
        };

        match event {
            AuthEvent::SignedIn(_) => None,
            AuthEvent::TokenRefreshed(session) => {
                if session.user_id != current.user_id {
                    warn!(
                        target: "mitsumori::auth",
                        tracked = %current.user_id,
                        notified = %session.user_id,
                        "refresh notification for a different user; ignoring"
                    );
                    return None;
                }
                if session == current {
                    return None;
                }
                let live = backend_session();
                if live.as_ref().map(|live| &live.access_token) != Some(&session.access_token) {
                    debug!(
                        target: "mitsumori::auth",
                        user_id = %session.user_id,
                        "stale refresh notification; ignoring"
                    );
                    return None;
                }
                *state = SessionState::Authenticated(session.clone());
                debug!(target: "mitsumori::auth", user_id = %session.user_id, "session refreshed");
                Some((*state).clone())
            }
            AuthEvent::SignedOut => {
                if backend_session().is_some() {
                    debug!(
                        target: "mitsumori::auth",
                        user_id = %current.user_id,
                        "backend holds a newer session; ignoring sign-out notification"
                    );
                    return None;
                }
                info!(
                    target: "mitsumori::auth",
                    user_id = %current.user_id,
                    "session ended by backend"
                );
                *state = SessionState::Anonymous;
                Some(SessionState::Anonymous)
            }
        }
    }

    /// Forwards backend notifications onto the bus as [`AUTH_EVENT_TOPIC`]
    /// messages for as long as the bridge runs. Only one subscription may be
    /// live at a time.
    pub fn attach(
        &self,
        mut events: broadcast::Receiver<AuthEvent>,
        bus: Arc<dyn Bus>,
    ) -> Result<(), AuthError> {
        let mut subscription = self.subscription.lock();
        if subscription
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return Err(AuthError::AlreadySubscribed);
        }

        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "mitsumori::auth", skipped, "session notifications lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let payload = match serde_json::to_vec(&event) {
                    Ok(payload) => Bytes::from(payload),
                    Err(err) => {
                        warn!(
                            target: "mitsumori::auth",
                            error = %err,
                            "failed to encode session notification"
                        );
                        continue;
                    }
                };
                if let Err(err) = bus.send(AUTH_EVENT_TOPIC, payload) {
                    warn!(
                        target: "mitsumori::auth",
                        error = %err,
                        "bridge stopped; dropping session subscription"
                    );
                    break;
                }
            }
            debug!(target: "mitsumori::auth", "session subscription ended");
        });
        *subscription = Some(handle);
        Ok(())
    }

    pub fn detach(&self) {
        if let Some(handle) = self.subscription.lock().take() {
            handle.abort();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        self.detach();
    }
}
