use serde_json::Value;
use thiserror::Error;

use crate::ports::PortError;

pub const CODE_UNAUTHORIZED: i64 = 4100;
pub const CODE_USER_REJECTED: i64 = 4001;
pub const CODE_UNSUPPORTED_METHOD: i64 = 4200;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INTERNAL: i64 = -32603;
pub const CODE_TRANSACTION_REJECTED: i64 = -32003;

/// Which part of an `{r, s, v}` triple failed self-verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureComponent {
    R,
    S,
    V,
    Signature,
}

impl SignatureComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::R => "r",
            Self::S => "s",
            Self::V => "v",
            Self::Signature => "signature",
        }
    }
}

impl std::fmt::Display for SignatureComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to the calling origin.
///
/// `Clone` is required because a single in-flight read may be observed by
/// several callers at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    #[error("invalid signature component `{component}` from {keyring_type} keyring")]
    SignatureInvalid {
        component: SignatureComponent,
        keyring_type: String,
    },
    #[error("submit failed: {0}")]
    SubmitFailed(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Unauthorized(_) => CODE_UNAUTHORIZED,
            Self::InvalidParams(_) => CODE_INVALID_PARAMS,
            Self::UserRejected(_) => CODE_USER_REJECTED,
            Self::SubmitFailed(_) => CODE_TRANSACTION_REJECTED,
            Self::UnsupportedOperation(_) => CODE_UNSUPPORTED_METHOD,
            Self::MethodNotFound(_) => CODE_METHOD_NOT_FOUND,
            Self::SignatureInvalid { .. } | Self::Internal(_) => CODE_INTERNAL,
        }
    }

    /// Structured JSON-RPC error object returned to the page.
    pub fn to_rpc_error(&self) -> Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}

impl From<PortError> for ProviderError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Cancelled(reason) => Self::UserRejected(reason),
            PortError::Validation(reason) => Self::InvalidParams(reason),
            PortError::NotImplemented(what) => Self::UnsupportedOperation(what.to_owned()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_and_unauthorized_are_distinguishable() {
        let rejected = ProviderError::UserRejected("no".to_owned());
        let unauthorized = ProviderError::Unauthorized("no".to_owned());
        assert_ne!(rejected.code(), unauthorized.code());
        assert_eq!(rejected.to_rpc_error()["code"], 4001);
        assert_eq!(unauthorized.to_rpc_error()["code"], 4100);
    }

    #[test]
    fn cancelled_port_maps_to_user_rejected() {
        let err: ProviderError = PortError::Cancelled("page closed".to_owned()).into();
        assert!(matches!(err, ProviderError::UserRejected(_)));
        let err: ProviderError = PortError::Transport("boom".to_owned()).into();
        assert!(matches!(err, ProviderError::Internal(_)));
    }
}
