use serde::{de, Deserialize, Deserializer, Serialize};
use std::cmp::Reverse;
use std::fmt;
use time::OffsetDateTime;

/// Backend-assigned quote identifier.
///
/// The storage service may hand out integer or textual keys; both decode and
/// the value is always carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QuoteId(String);

impl QuoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QuoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for QuoteId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for QuoteId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(QuoteId(value.to_string())),
            Raw::Text(value) if value.trim().is_empty() => {
                Err(de::Error::custom("quote id must not be empty"))
            }
            Raw::Text(value) => Ok(QuoteId(value)),
        }
    }
}

/// The single CRUD entity managed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuoteId>,
    #[serde(rename = "quote", alias = "text")]
    pub text: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "userId", alias = "ownerId", default)]
    pub owner_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl Quote {
    pub fn new(text: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            author: author.into(),
            reference: None,
            owner_id: None,
            created_at: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<QuoteId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Orders quotes most recently created first. Quotes without a creation
/// stamp sort last and keep their relative order.
pub fn newest_first(quotes: &mut [Quote]) {
    quotes.sort_by_key(|quote| Reverse(quote.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn quote_id_accepts_numbers_and_strings() {
        let numeric: QuoteId = serde_json::from_str("42").unwrap();
        let textual: QuoteId = serde_json::from_str("\"a1b2\"").unwrap();
        assert_eq!(numeric.as_str(), "42");
        assert_eq!(textual.as_str(), "a1b2");
        assert!(serde_json::from_str::<QuoteId>("\"  \"").is_err());
    }

    #[test]
    fn quote_decodes_ui_aliases() {
        let quote: Quote = serde_json::from_value(serde_json::json!({
            "text": "Carpe diem",
            "author": "Horace",
            "ownerId": "user-1"
        }))
        .unwrap();
        assert_eq!(quote.text, "Carpe diem");
        assert_eq!(quote.owner_id.as_deref(), Some("user-1"));
        assert!(quote.id.is_none());

        let encoded = serde_json::to_value(&quote).unwrap();
        assert_eq!(encoded["quote"], "Carpe diem");
        assert_eq!(encoded["userId"], "user-1");
        assert!(encoded.get("id").is_none());
    }

    #[test]
    fn owner_serializes_as_null_when_absent() {
        let encoded = serde_json::to_value(Quote::new("a", "b")).unwrap();
        assert!(encoded["userId"].is_null());
    }

    #[test]
    fn newest_first_orders_by_creation() {
        let base = OffsetDateTime::UNIX_EPOCH;
        let mut quotes = vec![
            Quote {
                created_at: Some(base),
                ..Quote::new("old", "x")
            },
            Quote::new("unstamped", "x"),
            Quote {
                created_at: Some(base + Duration::seconds(5)),
                ..Quote::new("new", "x")
            },
        ];
        newest_first(&mut quotes);
        let texts: Vec<&str> = quotes.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, ["new", "old", "unstamped"]);
    }
}
