use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("key {kid} not found in key set {url}")]
    KeyNotFound { kid: String, url: String },
    #[error("upstream {target} unavailable: {detail}")]
    UpstreamUnavailable {
        target: String,
        status: Option<u16>,
        detail: String,
    },
    #[error("untrusted token issuer: {0}")]
    UntrustedIssuer(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("signing key not initialized")]
    KeyNotInitialized,
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("jwt error: {0}")]
    Jwt(jsonwebtoken::errors::Error),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

impl AuthzError {
    pub fn upstream(target: impl Into<String>, detail: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            target: target.into(),
            status: None,
            detail: detail.to_string(),
        }
    }

    pub fn upstream_status(target: impl Into<String>, status: u16, detail: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            target: target.into(),
            status: Some(status),
            detail: detail.to_string(),
        }
    }

    /// True for failures caused by the presented token rather than by this
    /// service or its collaborators.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::Expired
                | Self::KeyNotFound { .. }
                | Self::UntrustedIssuer(_)
                | Self::MalformedToken(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthzError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        // Collapse signature/claim failures onto the taxonomy; keep the rest opaque.
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::ImmatureSignature => Self::MalformedToken(err.to_string()),
            _ => Self::Jwt(err),
        }
    }
}
