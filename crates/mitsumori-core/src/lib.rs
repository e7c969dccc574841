//! Primitives shared by the Mitsumori bridge, its backend client and its
//! local cache. Everything here is plain data; no I/O happens in this crate.

mod quote;
mod session;

pub use quote::{newest_first, Quote, QuoteId};
pub use session::{AuthEvent, Credential, Session, SessionState};
