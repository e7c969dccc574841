use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session tracker is already subscribed to backend notifications")]
    AlreadySubscribed,
    #[error("not signed in")]
    NotSignedIn,
}
