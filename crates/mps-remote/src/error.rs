use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`crate::MarketplaceApi`] call may return.
///
/// Every variant is pass-scoped: the engine logs it, leaves its state
/// untouched and relies on the next timer tick.
#[derive(Debug)]
pub enum RemoteError {
    /// Network failure, connection refused or timeout.
    Transport(String),
    /// The marketplace answered with a status other than 200/201.
    Http { status: u16, body: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The client could not be built (bad base URL, TLS init, ...).
    Config(String),
}

impl RemoteError {
    pub fn is_timeout_or_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(msg) => write!(f, "transport error: {msg}"),
            RemoteError::Http { status, body } => {
                write!(f, "marketplace http error status={status}: {body}")
            }
            RemoteError::Decode(msg) => write!(f, "decode error: {msg}"),
            RemoteError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}
