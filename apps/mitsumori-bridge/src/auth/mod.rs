pub mod error;
pub mod tracker;

pub use error::AuthError;
pub use tracker::{AUTH_EVENT_TOPIC, SessionTracker};
