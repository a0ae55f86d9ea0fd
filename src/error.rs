/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum SunsyncError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// The request succeeded at HTTP level but the body was empty.
    #[error("empty response from {method} {url}")]
    EmptyResponse { method: String, url: String },
    /// Response body was not the JSON shape we expected.
    #[error("decode error: {0}")]
    Decode(String),
    /// JSON decoded fine but the API reported `success` as false.
    #[error("request rejected by API: {message}")]
    Business { message: String },
    /// No bearer token has been obtained.
    #[error("no bearer token available")]
    NoToken,
    /// A cloud call was attempted without a valid token.
    #[error("not authenticated: acquire a token first")]
    Unauthenticated,
    /// A required credential (username, password or static token) is missing.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    /// Caller-supplied arguments were empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Every attempt allowed by the retry policy failed.
    #[error("giving up after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<SunsyncError>,
    },
}

impl SunsyncError {
    /// Whether another attempt under the same policy may succeed.
    ///
    /// Input and credential problems fail immediately; everything that can
    /// come back from the wire is worth another try.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Http { .. }
                | Self::EmptyResponse { .. }
                | Self::Decode(_)
                | Self::Business { .. }
        )
    }

    /// The concrete error behind a [`SunsyncError::MaxRetriesExceeded`], or `self`.
    pub fn root_cause(&self) -> &SunsyncError {
        match self {
            Self::MaxRetriesExceeded { last, .. } => last.root_cause(),
            other => other,
        }
    }
}
