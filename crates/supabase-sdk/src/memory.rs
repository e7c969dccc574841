use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mitsumori_core::{newest_first, AuthEvent, Credential, Quote, QuoteId, Session};
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{Backend, BackendError, BackendResult};

const MIN_PASSWORD_LEN: usize = 6;
const SESSION_LIFETIME: Duration = Duration::hours(1);

/// In-process stand-in for the managed backend.
///
/// Accounts, sessions and the quote table live in memory. Row ownership is
/// enforced the way the hosted row-level policies do it: other owners' rows
/// are invisible, and writes on them behave as if the row did not exist.
pub struct InMemoryBackend {
    state: Mutex<State>,
    events: broadcast::Sender<AuthEvent>,
    epoch: OffsetDateTime,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    quotes: Vec<Quote>,
    offline: bool,
    sign_out_failure: Option<BackendError>,
    next_id: u64,
    clock_ms: i64,
    token_serial: u64,
}

struct Account {
    user_id: String,
    password: String,
    email: String,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// While offline every call except `current_session` fails with a
    /// network error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Makes the next `sign_out` fail with `err`; the session is kept.
    pub fn fail_next_sign_out(&self, err: BackendError) {
        self.state.lock().sign_out_failure = Some(err);
    }

    /// Rotates the access token of the current session as the refresh timer
    /// would, and announces it.
    pub fn simulate_token_refresh(&self) -> Option<Session> {
        let refreshed = {
            let mut state = self.state.lock();
            let current = state.session.clone()?;
            let token = next_token(&mut state);
            let refreshed = current.refreshed(token, OffsetDateTime::now_utc() + SESSION_LIFETIME);
            state.session = Some(refreshed.clone());
            refreshed
        };
        let _ = self.events.send(AuthEvent::TokenRefreshed(refreshed.clone()));
        Some(refreshed)
    }

    /// Drops the session as a revoked refresh token would.
    pub fn simulate_session_loss(&self) {
        self.state.lock().session = None;
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    /// Every stored row regardless of owner.
    pub fn quotes(&self) -> Vec<Quote> {
        self.state.lock().quotes.clone()
    }

    fn online(&self) -> BackendResult<parking_lot::MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.offline {
            return Err(BackendError::Network("backend offline".into()));
        }
        Ok(state)
    }

    fn caller(state: &State) -> BackendResult<String> {
        state
            .session
            .as_ref()
            .map(|session| session.user_id.clone())
            .ok_or_else(|| BackendError::Auth("not signed in".into()))
    }

    fn open_session(
        &self,
        mut state: parking_lot::MutexGuard<'_, State>,
        user_id: String,
        email: String,
    ) -> Session {
        let session = Session {
            access_token: next_token(&mut state),
            expires_at: OffsetDateTime::now_utc() + SESSION_LIFETIME,
            user_id,
            email: Some(email),
        };
        state.session = Some(session.clone());
        drop(state);
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        session
    }

    fn stamp(&self, state: &mut State) -> OffsetDateTime {
        state.clock_ms += 1;
        self.epoch + Duration::milliseconds(state.clock_ms)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(State::default()),
            events,
            epoch: OffsetDateTime::now_utc(),
        }
    }
}

fn next_token(state: &mut State) -> String {
    state.token_serial += 1;
    format!("mem-token-{}", state.token_serial)
}

fn find_owned<'a>(state: &'a mut State, id: &QuoteId, owner: &str) -> BackendResult<&'a mut Quote> {
    state
        .quotes
        .iter_mut()
        .find(|quote| quote.id.as_ref() == Some(id) && quote.owner_id.as_deref() == Some(owner))
        .ok_or_else(|| BackendError::NotFound(format!("quote {id}")))
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn sign_up(&self, credential: &Credential) -> BackendResult<Session> {
        let mut state = self.online()?;
        if credential.password.len() < MIN_PASSWORD_LEN {
            return Err(BackendError::Validation(format!(
                "password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let key = credential.email.trim().to_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(BackendError::Validation("user already registered".into()));
        }
        let account = Account {
            user_id: Uuid::new_v4().to_string(),
            password: credential.password.clone(),
            email: credential.email.trim().to_string(),
        };
        let (user_id, email) = (account.user_id.clone(), account.email.clone());
        state.accounts.insert(key, account);
        Ok(self.open_session(state, user_id, email))
    }

    async fn sign_in(&self, credential: &Credential) -> BackendResult<Session> {
        let state = self.online()?;
        let account = state
            .accounts
            .get(&credential.email.trim().to_lowercase())
            .filter(|account| account.password == credential.password)
            .ok_or_else(|| BackendError::Auth("invalid login credentials".into()))?;
        let (user_id, email) = (account.user_id.clone(), account.email.clone());
        Ok(self.open_session(state, user_id, email))
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let mut state = self.online()?;
        if let Some(err) = state.sign_out_failure.take() {
            return Err(err);
        }
        state.session = None;
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn list_quotes(&self, owner_id: &str) -> BackendResult<Vec<Quote>> {
        let state = self.online()?;
        let caller = Self::caller(&state)?;
        if caller != owner_id {
            return Ok(Vec::new());
        }
        let mut quotes: Vec<Quote> = state
            .quotes
            .iter()
            .filter(|quote| quote.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect();
        newest_first(&mut quotes);
        Ok(quotes)
    }

    async fn create_quote(&self, quote: &Quote) -> BackendResult<Quote> {
        let mut state = self.online()?;
        let caller = Self::caller(&state)?;
        let owner = quote.owner_id.clone().unwrap_or_else(|| caller.clone());
        if owner != caller {
            return Err(BackendError::Auth(
                "new row violates row-level security policy".into(),
            ));
        }
        state.next_id += 1;
        let created_at = self.stamp(&mut state);
        let stored = Quote {
            id: Some(QuoteId::from(state.next_id.to_string())),
            text: quote.text.clone(),
            author: quote.author.clone(),
            reference: quote.reference.clone(),
            owner_id: Some(owner),
            created_at: Some(created_at),
        };
        state.quotes.push(stored.clone());
        Ok(stored)
    }

    async fn update_quote(&self, quote: &Quote) -> BackendResult<Quote> {
        let id = quote
            .id
            .as_ref()
            .ok_or_else(|| BackendError::Validation("quote id is required for update".into()))?;
        let mut state = self.online()?;
        let caller = Self::caller(&state)?;
        let stored = find_owned(&mut state, id, &caller)?;
        stored.text = quote.text.clone();
        stored.author = quote.author.clone();
        stored.reference = quote.reference.clone();
        Ok(stored.clone())
    }

    async fn delete_quote(&self, id: &QuoteId) -> BackendResult<()> {
        let mut state = self.online()?;
        let caller = Self::caller(&state)?;
        find_owned(&mut state, id, &caller)?;
        state.quotes.retain(|quote| quote.id.as_ref() != Some(id));
        Ok(())
    }
}
