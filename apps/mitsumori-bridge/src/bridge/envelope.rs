use std::fmt;

use quote_cache::CacheError;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use supabase_sdk::BackendError;

use crate::auth::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed inbound payload; never forwarded to the backend.
    Validation,
    Auth,
    Network,
    NotFound,
    Storage,
    Internal,
}

/// Error half of a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ChannelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ChannelError {}

impl From<BackendError> for ChannelError {
    fn from(err: BackendError) -> Self {
        let kind = match &err {
            BackendError::Auth(_) => ErrorKind::Auth,
            BackendError::Network(_) | BackendError::UnexpectedStatus { .. } => ErrorKind::Network,
            BackendError::NotFound(_) => ErrorKind::NotFound,
            BackendError::Validation(_) => ErrorKind::Validation,
            BackendError::Decode(_) | BackendError::Config(_) => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<CacheError> for ChannelError {
    fn from(err: CacheError) -> Self {
        Self::new(ErrorKind::Storage, err.to_string())
    }
}

impl From<AuthError> for ChannelError {
    fn from(err: AuthError) -> Self {
        Self::new(ErrorKind::Auth, err.to_string())
    }
}

/// `{"ok": true, "value": T}` or `{"ok": false, "error": ChannelError}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Ok(T),
    Err(ChannelError),
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<T, ChannelError> {
        match self {
            Envelope::Ok(value) => Ok(value),
            Envelope::Err(err) => Err(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Ok(_))
    }
}

impl<T> From<Result<T, ChannelError>> for Envelope<T> {
    fn from(result: Result<T, ChannelError>) -> Self {
        match result {
            Ok(value) => Envelope::Ok(value),
            Err(err) => Envelope::Err(err),
        }
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Envelope", 2)?;
        match self {
            Envelope::Ok(value) => {
                state.serialize_field("ok", &true)?;
                state.serialize_field("value", value)?;
            }
            Envelope::Err(err) => {
                state.serialize_field("ok", &false)?;
                state.serialize_field("error", err)?;
            }
        }
        state.end()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            ok: bool,
            #[serde(default)]
            value: serde_json::Value,
            #[serde(default)]
            error: Option<ChannelError>,
        }

        let raw = Raw::deserialize(deserializer)?;
        if raw.ok {
            serde_json::from_value(raw.value)
                .map(Envelope::Ok)
                .map_err(serde::de::Error::custom)
        } else {
            raw.error
                .map(Envelope::Err)
                .ok_or_else(|| serde::de::Error::missing_field("error"))
        }
    }
}
