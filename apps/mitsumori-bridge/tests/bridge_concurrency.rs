mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mitsumori_bridge::bridge::{ErrorKind, InboundPort, OutboundPort};
use mitsumori_core::{AuthEvent, Credential, Quote, QuoteId, Session};
use serde_json::json;
use supabase_sdk::{Backend, BackendResult, InMemoryBackend};
use tokio::sync::{Notify, broadcast};

use support::{Harness, next, settle};

/// Delegates to the in-memory backend; listing is counted, waits for the gate
/// and may be rigged to panic.
struct GatedBackend {
    inner: Arc<InMemoryBackend>,
    gate: Notify,
    panics_left: AtomicUsize,
    lists: AtomicUsize,
}

impl GatedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryBackend::new(),
            gate: Notify::new(),
            panics_left: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Backend for GatedBackend {
    async fn sign_up(&self, credential: &Credential) -> BackendResult<Session> {
        self.inner.sign_up(credential).await
    }

    async fn sign_in(&self, credential: &Credential) -> BackendResult<Session> {
        self.inner.sign_in(credential).await
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.inner.sign_out().await
    }

    fn current_session(&self) -> Option<Session> {
        self.inner.current_session()
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.auth_events()
    }

    async fn list_quotes(&self, owner_id: &str) -> BackendResult<Vec<Quote>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            panic!("listing exploded");
        }
        self.gate.notified().await;
        self.inner.list_quotes(owner_id).await
    }

    async fn create_quote(&self, quote: &Quote) -> BackendResult<Quote> {
        self.inner.create_quote(quote).await
    }

    async fn update_quote(&self, quote: &Quote) -> BackendResult<Quote> {
        self.inner.update_quote(quote).await
    }

    async fn delete_quote(&self, id: &QuoteId) -> BackendResult<()> {
        self.inner.delete_quote(id).await
    }
}

async fn sign_up(harness: &Harness) -> Session {
    let mut responses = harness.ui.subscribe(OutboundPort::SignUpResponse);
    harness
        .ui
        .send(
            InboundPort::SignUp,
            &json!({"email": "a@b.com", "password": "pw123456"}),
        )
        .unwrap();
    next::<Session>(&mut responses).await.into_result().unwrap()
}

#[tokio::test]
async fn requests_on_one_channel_are_answered_in_order() {
    let (harness, _backend) = Harness::in_memory();
    sign_up(&harness).await;
    let mut quotes = harness.ui.subscribe(OutboundPort::QuoteResponse);

    for text in ["one", "two", "three", "four"] {
        harness
            .ui
            .send(InboundPort::AddQuote, &json!({"quote": text, "author": "anon"}))
            .unwrap();
    }

    for expected_len in 1..=4 {
        let listed = next::<Vec<Quote>>(&mut quotes).await.into_result().unwrap();
        assert_eq!(listed.len(), expected_len);
    }
}

#[tokio::test]
async fn a_slow_channel_does_not_block_the_others() {
    let backend = GatedBackend::new();
    let harness = Harness::start(backend.clone());
    let session = sign_up(&harness).await;
    let mut quotes = harness.ui.subscribe(OutboundPort::QuoteResponse);
    let mut sessions = harness.ui.subscribe(OutboundPort::SessionResponse);
    let mut cached = harness.ui.subscribe(OutboundPort::DataStoreGetQuoteResponse);

    harness
        .ui
        .send(InboundPort::GetQuotes, &session.user_id)
        .unwrap();
    settle().await;

    harness.ui.send_empty(InboundPort::GetSession).unwrap();
    let current = next::<Option<Session>>(&mut sessions).await.into_result().unwrap();
    assert_eq!(current, Some(session));

    harness
        .ui
        .send(InboundPort::DataStoreGetQuotes, &"k")
        .unwrap();
    assert!(next::<Option<Vec<Quote>>>(&mut cached).await.is_ok());

    assert!(quotes.try_next::<Vec<Quote>>().is_none());
    backend.gate.notify_one();
    let listed = next::<Vec<Quote>>(&mut quotes).await.into_result().unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn a_panicking_handler_still_answers() {
    let backend = GatedBackend::new();
    let harness = Harness::start(backend.clone());
    let session = sign_up(&harness).await;
    let mut quotes = harness.ui.subscribe(OutboundPort::QuoteResponse);

    backend.panics_left.store(1, Ordering::SeqCst);
    harness
        .ui
        .send(InboundPort::GetQuotes, &session.user_id)
        .unwrap();
    let failed = next::<Vec<Quote>>(&mut quotes).await.into_result().unwrap_err();
    assert_eq!(failed.kind, ErrorKind::Internal);
    assert!(failed.message.contains("listing exploded"));

    backend.gate.notify_one();
    harness
        .ui
        .send(InboundPort::GetQuotes, &session.user_id)
        .unwrap();
    assert!(next::<Vec<Quote>>(&mut quotes).await.is_ok());
}

#[tokio::test]
async fn a_failed_write_is_not_followed_by_a_listing() {
    let backend = GatedBackend::new();
    let harness = Harness::start(backend.clone());
    let session = sign_up(&harness).await;
    let mut quotes = harness.ui.subscribe(OutboundPort::QuoteResponse);

    backend.inner.set_offline(true);
    harness
        .ui
        .send(
            InboundPort::AddQuote,
            &json!({"quote": "Carpe diem", "author": "Horace"}),
        )
        .unwrap();
    let failed = next::<Vec<Quote>>(&mut quotes).await.into_result().unwrap_err();
    assert_eq!(failed.kind, ErrorKind::Network);
    backend.inner.set_offline(false);

    harness
        .ui
        .send(
            InboundPort::EditQuote,
            &json!({
                "id": 404,
                "quote": "Memento mori",
                "author": "Anon",
                "userId": session.user_id,
            }),
        )
        .unwrap();
    let failed = next::<Vec<Quote>>(&mut quotes).await.into_result().unwrap_err();
    assert_eq!(failed.kind, ErrorKind::NotFound);

    harness
        .ui
        .send(InboundPort::DeleteQuote, &json!({"id": 404}))
        .unwrap();
    let failed = next::<Vec<Quote>>(&mut quotes).await.into_result().unwrap_err();
    assert_eq!(failed.kind, ErrorKind::NotFound);

    assert_eq!(backend.lists.load(Ordering::SeqCst), 0);
    assert!(backend.inner.quotes().is_empty());
}
