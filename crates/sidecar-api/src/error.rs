//! Client error types shared by the registry, controller and rules adapters

/// Error type for remote client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The registry no longer knows the instance (expired or never registered)
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server returned error: code={code}, message={message}")]
    ServerError { code: u16, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timeout")]
    Timeout,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether the error means the registered instance must be registered again
    pub fn is_unknown_instance(&self) -> bool {
        matches!(self, ClientError::UnknownInstance(_))
    }

    /// Whether retrying the same request later can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_) | ClientError::ServiceUnavailable(_) | ClientError::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::UnknownInstance("abc".to_string());
        assert_eq!(err.to_string(), "unknown instance: abc");

        let err = ClientError::ServerError {
            code: 500,
            message: "internal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server returned error: code=500, message=internal error"
        );

        let err = ClientError::Timeout;
        assert_eq!(err.to_string(), "request timeout");
    }

    #[test]
    fn test_classification() {
        assert!(ClientError::UnknownInstance("x".into()).is_unknown_instance());
        assert!(!ClientError::Timeout.is_unknown_instance());

        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::Connection("refused".into()).is_retryable());
        assert!(!ClientError::Unauthorized("bad token".into()).is_retryable());
    }

    #[test]
    fn test_from_anyhow() {
        let err: ClientError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, ClientError::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
