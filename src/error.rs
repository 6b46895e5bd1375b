use thiserror::Error;

/// Every failure the session and collection stores can report.
///
/// Callers decide how to surface these; the stores never display anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// An authorized call was attempted without a token. Detected locally.
    #[error("not authenticated, please log in")]
    NotAuthenticated,

    /// The server rejected the token (401 or 403). The session has already
    /// been cleared when this is returned.
    #[error("session expired or unauthorized ({status}), please log in again")]
    SessionExpired { status: u16 },

    /// Any other non-2xx response.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Login was refused.
    #[error("{0}")]
    Authentication(String),

    /// Connection failures and malformed responses.
    #[error("request failed: {0}")]
    Transport(String),

    /// Input rejected before any request was made.
    #[error("{0}")]
    Validation(String),

    #[error("token storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True when the caller should treat the session as gone.
    pub fn is_session_terminated(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::SessionExpired { .. })
    }

    /// HTTP status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SessionExpired { status } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
