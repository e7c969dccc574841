use crate::auth::AUTH_EVENT_TOPIC;

/// Channels the UI core sends requests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundPort {
    SignUp,
    SignIn,
    SignOut,
    GetSession,
    GetQuotes,
    AddQuote,
    EditQuote,
    DeleteQuote,
    DataStoreGetQuotes,
    DataStoreSetQuote,
    /// Backend session notifications, fed by the session tracker.
    AuthStateChange,
}

/// Channels the bridge answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundPort {
    SignUpResponse,
    SignInResponse,
    SignOutResponse,
    SessionResponse,
    QuoteResponse,
    DataStoreGetQuoteResponse,
}

impl InboundPort {
    pub const ALL: [InboundPort; 11] = [
        InboundPort::SignUp,
        InboundPort::SignIn,
        InboundPort::SignOut,
        InboundPort::GetSession,
        InboundPort::GetQuotes,
        InboundPort::AddQuote,
        InboundPort::EditQuote,
        InboundPort::DeleteQuote,
        InboundPort::DataStoreGetQuotes,
        InboundPort::DataStoreSetQuote,
        InboundPort::AuthStateChange,
    ];

    pub fn topic(self) -> &'static str {
        match self {
            InboundPort::SignUp => "signUp",
            InboundPort::SignIn => "signIn",
            InboundPort::SignOut => "signOut",
            InboundPort::GetSession => "getSession",
            InboundPort::GetQuotes => "getQuotes",
            InboundPort::AddQuote => "addQuote",
            InboundPort::EditQuote => "editQuote",
            InboundPort::DeleteQuote => "deleteQuote",
            InboundPort::DataStoreGetQuotes => "dataStoreGetQuotes",
            InboundPort::DataStoreSetQuote => "dataStoreSetQuote",
            InboundPort::AuthStateChange => AUTH_EVENT_TOPIC,
        }
    }

    pub fn response(self) -> OutboundPort {
        match self {
            InboundPort::SignUp => OutboundPort::SignUpResponse,
            InboundPort::SignIn => OutboundPort::SignInResponse,
            InboundPort::SignOut => OutboundPort::SignOutResponse,
            InboundPort::GetSession | InboundPort::AuthStateChange => {
                OutboundPort::SessionResponse
            }
            InboundPort::GetQuotes
            | InboundPort::AddQuote
            | InboundPort::EditQuote
            | InboundPort::DeleteQuote => OutboundPort::QuoteResponse,
            InboundPort::DataStoreGetQuotes | InboundPort::DataStoreSetQuote => {
                OutboundPort::DataStoreGetQuoteResponse
            }
        }
    }

    /// Ports the UI core may send on; excludes internal notification ports.
    pub fn is_public(self) -> bool {
        self != InboundPort::AuthStateChange
    }
}

impl OutboundPort {
    pub fn topic(self) -> &'static str {
        match self {
            OutboundPort::SignUpResponse => "signUpResponse",
            OutboundPort::SignInResponse => "signInResponse",
            OutboundPort::SignOutResponse => "signOutResponse",
            OutboundPort::SessionResponse => "sessionResponse",
            OutboundPort::QuoteResponse => "quoteResponse",
            OutboundPort::DataStoreGetQuoteResponse => "dataStoreGetQuoteResponse",
        }
    }
}
