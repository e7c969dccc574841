use std::sync::Arc;

use async_trait::async_trait;
use mitsumori_core::{newest_first, AuthEvent, Credential, Quote, QuoteId, Session};
use parking_lot::{Mutex, RwLock};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SupabaseConfig;
use crate::refresh;
use crate::wire::{error_from_status, QuoteRow, QuoteWrite, SignUpResponse, TokenResponse};
use crate::{Backend, BackendError, BackendResult};

const EVENT_CAPACITY: usize = 16;

/// HTTPS client for the auth and REST endpoints of the managed backend.
///
/// Cloning is cheap; clones share the session, the refresh timer and the
/// event stream.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    http: Client,
    config: SupabaseConfig,
    auth: RwLock<Option<StoredSession>>,
    events: broadcast::Sender<AuthEvent>,
    pub(crate) refresh_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: Session,
    refresh_token: String,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| BackendError::Config(err.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                auth: RwLock::new(None),
                events,
                refresh_task: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.inner.config
    }

    fn establish(&self, tokens: TokenResponse) -> Session {
        let session = self.inner.store(tokens);
        refresh::schedule(&self.inner);
        self.inner.emit(AuthEvent::SignedIn(session.clone()));
        session
    }
}

impl ClientInner {
    fn anonymous(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    fn authorized(&self, builder: RequestBuilder) -> BackendResult<RequestBuilder> {
        let token = self
            .auth
            .read()
            .as_ref()
            .map(|stored| stored.session.access_token.clone())
            .ok_or_else(|| BackendError::Auth("not signed in".into()))?;
        Ok(builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(token))
    }

    fn table(&self) -> BackendResult<reqwest::Url> {
        self.config
            .endpoint(&format!("rest/v1/{}", self.config.quotes_table))
    }

    async fn grant<B: Serialize>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> BackendResult<TokenResponse> {
        let url = self.config.endpoint("auth/v1/token")?;
        let response = self
            .anonymous(self.http.post(url))
            .query(&[("grant_type", grant_type)])
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    pub(crate) async fn refresh(&self, refresh_token: &str) -> BackendResult<TokenResponse> {
        #[derive(Serialize)]
        struct RefreshRequest<'a> {
            refresh_token: &'a str,
        }

        self.grant("refresh_token", &RefreshRequest { refresh_token })
            .await
    }

    pub(crate) fn store(&self, tokens: TokenResponse) -> Session {
        let (session, refresh_token) = tokens.into_parts();
        *self.auth.write() = Some(StoredSession {
            session: session.clone(),
            refresh_token,
        });
        session
    }

    pub(crate) fn clear(&self) {
        self.auth.write().take();
    }

    pub(crate) fn refresh_state(&self) -> Option<(String, time::OffsetDateTime)> {
        self.auth
            .read()
            .as_ref()
            .map(|stored| (stored.refresh_token.clone(), stored.session.expires_at))
    }

    pub(crate) fn holds_refresh_token(&self, refresh_token: &str) -> bool {
        self.auth
            .read()
            .as_ref()
            .is_some_and(|stored| stored.refresh_token == refresh_token)
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        // No subscribers is fine; the bridge may not be attached yet.
        let _ = self.events.send(event);
    }

    fn cancel_refresh(&self) {
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel_refresh();
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_status(status.as_u16(), &body))
}

fn id_filter(id: &QuoteId) -> String {
    format!("eq.{id}")
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn sign_up(&self, credential: &Credential) -> BackendResult<Session> {
        #[derive(Serialize)]
        struct SignUpData<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            username: Option<&'a str>,
        }

        #[derive(Serialize)]
        struct SignUpRequest<'a> {
            email: &'a str,
            password: &'a str,
            data: SignUpData<'a>,
        }

        let url = self.inner.config.endpoint("auth/v1/signup")?;
        let body = SignUpRequest {
            email: &credential.email,
            password: &credential.password,
            data: SignUpData {
                username: credential.username.as_deref(),
            },
        };
        let response = self
            .inner
            .anonymous(self.inner.http.post(url))
            .json(&body)
            .send()
            .await?;

        match read_json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(tokens) => {
                let session = self.establish(tokens);
                info!(target: "supabase_sdk", user_id = %session.user_id, "account created");
                Ok(session)
            }
            SignUpResponse::User(user) => {
                info!(
                    target: "supabase_sdk",
                    user_id = %user.id,
                    "account created; e-mail confirmation pending"
                );
                Err(BackendError::Auth(format!(
                    "confirmation required for {}",
                    credential.email
                )))
            }
        }
    }

    async fn sign_in(&self, credential: &Credential) -> BackendResult<Session> {
        #[derive(Serialize)]
        struct PasswordRequest<'a> {
            email: &'a str,
            password: &'a str,
        }

        let tokens = self
            .inner
            .grant(
                "password",
                &PasswordRequest {
                    email: &credential.email,
                    password: &credential.password,
                },
            )
            .await?;
        let session = self.establish(tokens);
        info!(target: "supabase_sdk", user_id = %session.user_id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        if self.inner.auth.read().is_none() {
            return Ok(());
        }

        let url = self.inner.config.endpoint("auth/v1/logout")?;
        let response = self
            .inner
            .authorized(self.inner.http.post(url))?
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            self.inner.cancel_refresh();
            self.inner.clear();
            info!(target: "supabase_sdk", "signed out");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status.as_u16(), &body))
    }

    fn current_session(&self) -> Option<Session> {
        self.inner
            .auth
            .read()
            .as_ref()
            .map(|stored| stored.session.clone())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    async fn list_quotes(&self, owner_id: &str) -> BackendResult<Vec<Quote>> {
        let owner_filter = format!("eq.{owner_id}");
        let response = self
            .inner
            .authorized(self.inner.http.get(self.inner.table()?))?
            .query(&[
                ("select", "*"),
                ("user_id", owner_filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;
        let rows: Vec<QuoteRow> = read_json(response).await?;
        let mut quotes: Vec<Quote> = rows.into_iter().map(Quote::from).collect();
        newest_first(&mut quotes);
        debug!(target: "supabase_sdk", owner_id, count = quotes.len(), "listed quotes");
        Ok(quotes)
    }

    async fn create_quote(&self, quote: &Quote) -> BackendResult<Quote> {
        let response = self
            .inner
            .authorized(self.inner.http.post(self.inner.table()?))?
            .header("Prefer", "return=representation")
            .json(&QuoteWrite::from(quote))
            .send()
            .await?;
        let rows: Vec<QuoteRow> = read_json(response).await?;
        rows.into_iter()
            .next()
            .map(Quote::from)
            .ok_or_else(|| BackendError::Decode("insert returned no rows".into()))
    }

    async fn update_quote(&self, quote: &Quote) -> BackendResult<Quote> {
        let id = quote
            .id
            .as_ref()
            .ok_or_else(|| BackendError::Validation("quote id is required for update".into()))?;
        let response = self
            .inner
            .authorized(self.inner.http.patch(self.inner.table()?))?
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=representation")
            .json(&QuoteWrite::from(quote))
            .send()
            .await?;
        let rows: Vec<QuoteRow> = read_json(response).await?;
        rows.into_iter()
            .next()
            .map(Quote::from)
            .ok_or_else(|| BackendError::NotFound(format!("quote {id}")))
    }

    async fn delete_quote(&self, id: &QuoteId) -> BackendResult<()> {
        let response = self
            .inner
            .authorized(self.inner.http.delete(self.inner.table()?))?
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<QuoteRow> = read_json(response).await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound(format!("quote {id}")));
        }
        Ok(())
    }
}
