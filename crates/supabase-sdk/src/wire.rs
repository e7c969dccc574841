//! Request and response bodies of the auth and REST endpoints.

use mitsumori_core::{Quote, QuoteId, Session};
use serde::{Deserialize, Deserializer, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::BackendError;

const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Debug, Deserialize)]
pub(crate) struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: UserResponse,
}

impl TokenResponse {
    /// Splits into the UI-facing session and the refresh token.
    pub(crate) fn into_parts(self) -> (Session, String) {
        let expires_at = self
            .expires_at
            .and_then(|stamp| OffsetDateTime::from_unix_timestamp(stamp).ok())
            .unwrap_or_else(|| {
                OffsetDateTime::now_utc()
                    + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN))
            });
        let session = Session {
            access_token: self.access_token,
            expires_at,
            user_id: self.user.id,
            email: self.user.email,
        };
        (session, self.refresh_token)
    }
}

/// Sign-up answers with a session, or with a bare user when e-mail
/// confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SignUpResponse {
    Session(TokenResponse),
    User(UserResponse),
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn rejects_credentials(&self) -> bool {
        matches!(self.error.as_deref(), Some("invalid_grant"))
            || matches!(
                self.error_code.as_deref(),
                Some("invalid_credentials") | Some("refresh_token_not_found")
            )
    }

    fn detail(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

pub(crate) fn error_from_status(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let rejects_credentials = parsed.rejects_credentials();
    let detail = parsed
        .detail()
        .unwrap_or_else(|| if body.is_empty() { "unknown error".into() } else { body.to_string() });

    match status {
        401 | 403 => BackendError::Auth(detail),
        400 if rejects_credentials => BackendError::Auth(detail),
        404 => BackendError::NotFound(detail),
        400 | 422 => BackendError::Validation(detail),
        _ => BackendError::UnexpectedStatus {
            status,
            body: detail,
        },
    }
}

/// A row of the quote table.
#[derive(Debug, Deserialize)]
pub(crate) struct QuoteRow {
    pub id: QuoteId,
    pub quote: String,
    pub author: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<OffsetDateTime>,
}

impl From<QuoteRow> for Quote {
    fn from(row: QuoteRow) -> Self {
        Quote {
            id: Some(row.id),
            text: row.quote,
            author: row.author,
            reference: row.reference,
            owner_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

/// Insert / patch body. A missing owner is left to the column default.
#[derive(Debug, Serialize)]
pub(crate) struct QuoteWrite<'a> {
    quote: &'a str,
    author: &'a str,
    reference: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

impl<'a> From<&'a Quote> for QuoteWrite<'a> {
    fn from(quote: &'a Quote) -> Self {
        Self {
            quote: &quote.text,
            author: &quote.author,
            reference: quote.reference.as_deref(),
            user_id: quote.owner_id.as_deref(),
        }
    }
}

// `timestamptz` columns carry an offset, plain `timestamp` columns do not.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(stamp) = OffsetDateTime::parse(&raw, &Rfc3339) {
        return Ok(Some(stamp));
    }
    OffsetDateTime::parse(&format!("{raw}Z"), &Rfc3339)
        .map(Some)
        .map_err(serde::de::Error::custom)
}
