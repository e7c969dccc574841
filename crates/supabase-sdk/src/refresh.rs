//! Background renewal of the access token.

use std::sync::{Arc, Weak};
use std::time::Duration;

use mitsumori_core::AuthEvent;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::client::ClientInner;
use crate::BackendError;

const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Time to wait before renewing a token that expires at `expires_at`.
///
/// Long-lived tokens renew `REFRESH_MARGIN` ahead of expiry; short-lived ones
/// at half of their remaining lifetime.
pub(crate) fn refresh_delay(expires_at: OffsetDateTime, now: OffsetDateTime) -> Duration {
    let remaining = Duration::try_from(expires_at - now).unwrap_or(Duration::ZERO);
    if remaining > REFRESH_MARGIN * 2 {
        remaining - REFRESH_MARGIN
    } else {
        remaining / 2
    }
}

/// Replaces any running refresh timer with one for the current session.
pub(crate) fn schedule(inner: &Arc<ClientInner>) {
    let handle = tokio::spawn(run(Arc::downgrade(inner)));
    if let Some(previous) = inner.refresh_task.lock().replace(handle) {
        previous.abort();
    }
}

async fn run(client: Weak<ClientInner>) {
    let Some(mut delay) = client
        .upgrade()
        .and_then(|inner| inner.refresh_state())
        .map(|(_, expires_at)| refresh_delay(expires_at, OffsetDateTime::now_utc()))
    else {
        return;
    };

    loop {
        tokio::time::sleep(delay).await;

        let Some(inner) = client.upgrade() else {
            return;
        };
        let Some((refresh_token, expires_at)) = inner.refresh_state() else {
            return;
        };

        match inner.refresh(&refresh_token).await {
            Ok(tokens) => {
                if !inner.holds_refresh_token(&refresh_token) {
                    debug!(
                        target: "supabase_sdk",
                        "session replaced during refresh; dropping result"
                    );
                    return;
                }
                let session = inner.store(tokens);
                delay = refresh_delay(session.expires_at, OffsetDateTime::now_utc());
                info!(
                    target: "supabase_sdk",
                    user_id = %session.user_id,
                    expires_at = %session.expires_at,
                    "access token refreshed"
                );
                inner.emit(AuthEvent::TokenRefreshed(session));
            }
            Err(BackendError::Auth(reason)) => {
                lose_session(&inner, &refresh_token, &reason);
                return;
            }
            Err(err) => {
                if OffsetDateTime::now_utc() >= expires_at {
                    lose_session(&inner, &refresh_token, &err.to_string());
                    return;
                }
                warn!(
                    target: "supabase_sdk",
                    error = %err,
                    retry_in = ?RETRY_INTERVAL,
                    "token refresh failed; retrying"
                );
                delay = RETRY_INTERVAL;
            }
        }
    }
}

fn lose_session(inner: &ClientInner, refresh_token: &str, reason: &str) {
    if !inner.holds_refresh_token(refresh_token) {
        return;
    }
    inner.clear();
    warn!(target: "supabase_sdk", reason, "session lost");
    inner.emit(AuthEvent::SignedOut);
}
