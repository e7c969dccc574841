//! Asynchronous client for the managed auth + storage backend.
//!
//! The bridge talks to the backend only through the [`Backend`] trait:
//! account lifecycle (sign-up, sign-in, sign-out, local session read), CRUD
//! on the quote table, and a broadcast stream of session changes the client
//! initiates on its own (token refreshes, lost sessions).

mod client;
mod config;
mod memory;
mod refresh;
mod wire;

use async_trait::async_trait;
use mitsumori_core::{AuthEvent, Credential, Quote, QuoteId, Session};
use thiserror::Error;
use tokio::sync::broadcast;

pub use client::SupabaseClient;
pub use config::SupabaseConfig;
pub use memory::InMemoryBackend;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("backend unreachable: {0}")]
    Network(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend rejected request: {0}")]
    Validation(String),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Creates the account and starts a session in one step.
    async fn sign_up(&self, credential: &Credential) -> BackendResult<Session>;

    async fn sign_in(&self, credential: &Credential) -> BackendResult<Session>;

    /// Invalidates the session server-side. On failure the client keeps its
    /// session.
    async fn sign_out(&self) -> BackendResult<()>;

    /// Whatever session the client currently holds; never hits the network.
    fn current_session(&self) -> Option<Session>;

    /// Session changes the client initiates itself.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    /// Quotes owned by `owner_id`, newest first.
    async fn list_quotes(&self, owner_id: &str) -> BackendResult<Vec<Quote>>;

    async fn create_quote(&self, quote: &Quote) -> BackendResult<Quote>;

    /// Replaces the quote identified by `quote.id`.
    async fn update_quote(&self, quote: &Quote) -> BackendResult<Quote>;

    async fn delete_quote(&self, id: &QuoteId) -> BackendResult<()>;
}
