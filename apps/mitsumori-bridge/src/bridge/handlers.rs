use std::sync::Arc;

use bytes::Bytes;
use mitsumori_core::{AuthEvent, Quote, Session};
use quote_cache::QuoteCache;
use serde::Serialize;
use supabase_sdk::Backend;
use tracing::warn;

use crate::auth::SessionTracker;
use crate::bridge::envelope::{ChannelError, Envelope};
use crate::bridge::ports::InboundPort;
use crate::bridge::requests;

type Handled<T> = Result<T, ChannelError>;

const UNENCODABLE: &[u8] =
    br#"{"ok":false,"error":{"kind":"internal","message":"response could not be encoded"}}"#;

/// What every channel handler works against.
#[derive(Clone)]
pub(crate) struct Services {
    pub backend: Arc<dyn Backend>,
    pub cache: Arc<dyn QuoteCache>,
    pub tracker: Arc<SessionTracker>,
}

/// Outcome of one handled message, ready to publish.
pub(crate) struct Reply {
    pub ok: bool,
    pub payload: Bytes,
}

impl Reply {
    pub(crate) fn encode<T: Serialize>(result: Handled<T>) -> Self {
        let envelope = Envelope::from(result);
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => Self {
                ok: envelope.is_ok(),
                payload: Bytes::from(bytes),
            },
            Err(err) => Self::failure(ChannelError::internal(format!(
                "failed to encode response: {err}"
            ))),
        }
    }

    pub(crate) fn failure(err: ChannelError) -> Self {
        let payload = serde_json::to_vec(&Envelope::<()>::Err(err))
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(UNENCODABLE));
        Self { ok: false, payload }
    }
}

impl Services {
    /// Handles one inbound message. `None` means nothing is to be published,
    /// which only happens for notifications that did not change the session.
    pub(crate) async fn dispatch(&self, port: InboundPort, payload: &[u8]) -> Option<Reply> {
        let reply = match port {
            InboundPort::SignUp => Reply::encode(self.sign_up(payload).await),
            InboundPort::SignIn => Reply::encode(self.sign_in(payload).await),
            InboundPort::SignOut => Reply::encode(self.sign_out(payload).await),
            InboundPort::GetSession => Reply::encode(self.get_session(payload)),
            InboundPort::GetQuotes => Reply::encode(self.get_quotes(payload).await),
            InboundPort::AddQuote => Reply::encode(self.add_quote(payload).await),
            InboundPort::EditQuote => Reply::encode(self.edit_quote(payload).await),
            InboundPort::DeleteQuote => Reply::encode(self.delete_quote(payload).await),
            InboundPort::DataStoreGetQuotes => Reply::encode(self.cached_quotes(payload).await),
            InboundPort::DataStoreSetQuote => Reply::encode(self.cache_quote(payload).await),
            InboundPort::AuthStateChange => return self.auth_state_change(payload),
        };
        Some(reply)
    }

    async fn sign_up(&self, payload: &[u8]) -> Handled<Session> {
        let credential = requests::sign_up(payload)?;
        let session = self.backend.sign_up(&credential).await?;
        self.tracker.authenticate(session.clone());
        Ok(session)
    }

    async fn sign_in(&self, payload: &[u8]) -> Handled<Session> {
        let credential = requests::sign_in(payload)?;
        let session = self.backend.sign_in(&credential).await?;
        self.tracker.authenticate(session.clone());
        Ok(session)
    }

    /// The tracker is cleared only once the backend confirmed the sign-out.
    async fn sign_out(&self, payload: &[u8]) -> Handled<()> {
        requests::empty(payload)?;
        self.backend.sign_out().await?;
        self.tracker.clear();
        Ok(())
    }

    fn get_session(&self, payload: &[u8]) -> Handled<Option<Session>> {
        requests::empty(payload)?;
        Ok(self.tracker.current())
    }

    async fn get_quotes(&self, payload: &[u8]) -> Handled<Vec<Quote>> {
        let owner = requests::owner(payload)?;
        self.tracker.require_user()?;
        Ok(self.backend.list_quotes(&owner).await?)
    }

    async fn add_quote(&self, payload: &[u8]) -> Handled<Vec<Quote>> {
        let mut quote = requests::new_quote(payload)?;
        let user = self.tracker.require_user()?;
        let owner = quote.owner_id.get_or_insert(user).clone();
        self.backend.create_quote(&quote).await?;
        Ok(self.backend.list_quotes(&owner).await?)
    }

    async fn edit_quote(&self, payload: &[u8]) -> Handled<Vec<Quote>> {
        let quote = requests::existing_quote(payload)?;
        let user = self.tracker.require_user()?;
        self.backend.update_quote(&quote).await?;
        let owner = quote.owner_id.unwrap_or(user);
        Ok(self.backend.list_quotes(&owner).await?)
    }

    async fn delete_quote(&self, payload: &[u8]) -> Handled<Vec<Quote>> {
        let request = requests::delete(payload)?;
        let user = self.tracker.require_user()?;
        self.backend.delete_quote(&request.id).await?;
        let owner = request.owner_id.unwrap_or(user);
        Ok(self.backend.list_quotes(&owner).await?)
    }

    async fn cached_quotes(&self, payload: &[u8]) -> Handled<Option<Vec<Quote>>> {
        let key = requests::cache_key(payload)?;
        Ok(self.cache.get(&key).await?)
    }

    async fn cache_quote(&self, payload: &[u8]) -> Handled<Vec<Quote>> {
        let write = requests::cache_write(payload)?;
        Ok(self.cache.put(&write.key, write.quote).await?)
    }

    fn auth_state_change(&self, payload: &[u8]) -> Option<Reply> {
        let event: AuthEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    target: "mitsumori::bridge",
                    error = %err,
                    "undecodable session notification"
                );
                return None;
            }
        };
        let state = self.tracker.apply(&event, || self.backend.current_session())?;
        Some(Reply::encode::<Option<Session>>(Ok(state.session().cloned())))
    }
}
