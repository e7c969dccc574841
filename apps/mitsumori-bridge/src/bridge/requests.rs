//! Decoding and validation of inbound payloads. Anything rejected here is
//! answered with a validation error and never reaches the backend.

use mitsumori_core::{Credential, Quote, QuoteId};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::bridge::envelope::ChannelError;

pub(crate) type Decoded<T> = Result<T, ChannelError>;

fn parse<T: DeserializeOwned>(payload: &[u8]) -> Decoded<T> {
    serde_json::from_slice(payload)
        .map_err(|err| ChannelError::validation(format!("malformed payload: {err}")))
}

fn non_blank(field: &str, value: String) -> Decoded<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ChannelError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Requests without arguments accept no bytes, `null` or `{}`.
pub(crate) fn empty(payload: &[u8]) -> Decoded<()> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    match parse::<serde_json::Value>(payload)? {
        serde_json::Value::Null => Ok(()),
        serde_json::Value::Object(map) if map.is_empty() => Ok(()),
        _ => Err(ChannelError::validation("this request takes no payload")),
    }
}

fn credential(payload: &[u8]) -> Decoded<Credential> {
    let mut credential: Credential = parse(payload)?;
    credential.email = non_blank("email", credential.email)?;
    if !credential.email.contains('@') {
        return Err(ChannelError::validation("email must contain '@'"));
    }
    if credential.password.is_empty() {
        return Err(ChannelError::validation("password must not be empty"));
    }
    Ok(credential)
}

pub(crate) fn sign_up(payload: &[u8]) -> Decoded<Credential> {
    let mut credential = credential(payload)?;
    credential.username = credential
        .username
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    Ok(credential)
}

pub(crate) fn sign_in(payload: &[u8]) -> Decoded<Credential> {
    let mut credential = credential(payload)?;
    credential.username = None;
    Ok(credential)
}

/// `getQuotes` takes the owner id as a bare string or as `{ownerId}`.
pub(crate) fn owner(payload: &[u8]) -> Decoded<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bare(String),
        Object {
            #[serde(rename = "ownerId", alias = "userId")]
            owner_id: String,
        },
    }

    let owner = match parse::<Raw>(payload)? {
        Raw::Bare(owner) | Raw::Object { owner_id: owner } => owner,
    };
    non_blank("ownerId", owner)
}

fn quote_fields(mut quote: Quote) -> Decoded<Quote> {
    quote.text = non_blank("quote", quote.text)?;
    quote.author = non_blank("author", quote.author)?;
    quote.reference = quote
        .reference
        .map(|reference| reference.trim().to_string())
        .filter(|reference| !reference.is_empty());
    quote.owner_id = quote
        .owner_id
        .map(|owner| owner.trim().to_string())
        .filter(|owner| !owner.is_empty());
    Ok(quote)
}

pub(crate) fn new_quote(payload: &[u8]) -> Decoded<Quote> {
    let quote = quote_fields(parse(payload)?)?;
    if quote.id.is_some() {
        return Err(ChannelError::validation("a new quote must not carry an id"));
    }
    Ok(quote)
}

pub(crate) fn existing_quote(payload: &[u8]) -> Decoded<Quote> {
    let quote = quote_fields(parse(payload)?)?;
    if quote.id.is_none() {
        return Err(ChannelError::validation("quote id is required"));
    }
    Ok(quote)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct DeleteRequest {
    pub id: QuoteId,
    #[serde(rename = "ownerId", alias = "userId", default)]
    pub owner_id: Option<String>,
}

pub(crate) fn delete(payload: &[u8]) -> Decoded<DeleteRequest> {
    let mut request: DeleteRequest = parse(payload)?;
    request.owner_id = request
        .owner_id
        .map(|owner| owner.trim().to_string())
        .filter(|owner| !owner.is_empty());
    Ok(request)
}

/// `dataStoreGetQuotes` takes the key as a bare string or as `{key}`.
pub(crate) fn cache_key(payload: &[u8]) -> Decoded<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bare(String),
        Object { key: String },
    }

    let key = match parse::<Raw>(payload)? {
        Raw::Bare(key) | Raw::Object { key } => key,
    };
    non_blank("key", key)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheWrite {
    pub key: String,
    pub quote: Quote,
}

/// `dataStoreSetQuote` takes `{key, quote}` or the pair `[key, quote]`.
pub(crate) fn cache_write(payload: &[u8]) -> Decoded<CacheWrite> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Pair(String, Quote),
        Object { key: String, quote: Quote },
    }

    let (key, quote) = match parse::<Raw>(payload)? {
        Raw::Pair(key, quote) | Raw::Object { key, quote } => (key, quote),
    };
    Ok(CacheWrite {
        key: non_blank("key", key)?,
        quote: quote_fields(quote)?,
    })
}
