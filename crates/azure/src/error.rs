use std::time::Duration;

use thiserror::Error;

/// Errors returned by the Blob Storage and Event Hubs clients.
#[derive(Debug, Error)]
pub enum AzureError {
    /// The Azure service returned an error.
    #[error("Azure service error: {0}")]
    Service(String),

    /// The container, blob or event hub does not exist.
    #[error("Azure resource not found: {0}")]
    NotFound(String),

    /// The container or blob already exists.
    #[error("Azure resource already exists: {0}")]
    AlreadyExists(String),

    /// The request was throttled by the Azure service.
    #[error("Azure request throttled")]
    Throttled,

    /// A network or connection error occurred communicating with Azure.
    #[error("Azure connection error: {0}")]
    Connection(String),

    /// The request did not complete within the allotted time.
    #[error("Azure request timed out after {0:?}")]
    Timeout(Duration),

    /// An event or blob body was invalid.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Azure credential resolution failed.
    #[error("credential error: {0}")]
    Credential(String),

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A client was requested from a `FileTrigger` that was built without it.
    #[error("{0} client is not configured")]
    NotConfigured(&'static str),

    /// Local file I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AzureError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled | Self::Timeout(_) | Self::Connection(_)
        )
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Classify an Azure SDK error string into the appropriate [`AzureError`].
///
/// Inspects the error message for common patterns (throttling, timeout,
/// missing or conflicting resources, connection) and maps them to the
/// matching variant.
pub fn classify_azure_error(error_str: &str) -> AzureError {
    let lower = error_str.to_lowercase();
    if lower.contains("429")
        || lower.contains("throttl")
        || lower.contains("rate exceed")
        || lower.contains("too many")
    {
        AzureError::Throttled
    } else if lower.contains("timeout") || lower.contains("timed out") {
        AzureError::Timeout(Duration::ZERO)
    } else if lower.contains("404")
        || lower.contains("notfound")
        || lower.contains("not found")
        || lower.contains("does not exist")
    {
        AzureError::NotFound(error_str.to_owned())
    } else if lower.contains("409")
        || lower.contains("alreadyexists")
        || lower.contains("already exists")
    {
        AzureError::AlreadyExists(error_str.to_owned())
    } else if lower.contains("connection")
        || lower.contains("connect")
        || lower.contains("dns")
        || lower.contains("network")
    {
        AzureError::Connection(error_str.to_owned())
    } else {
        AzureError::Service(error_str.to_owned())
    }
}

/// Log a failed SDK call and classify its error.
pub(crate) fn sdk_error(operation: &str, err: &impl std::fmt::Display) -> AzureError {
    let err_str = err.to_string();
    tracing::error!(error = %err_str, operation, "Azure request failed");
    classify_azure_error(&err_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        assert!(AzureError::Throttled.is_retryable());
        assert!(AzureError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(AzureError::Connection("reset".into()).is_retryable());
        assert!(!AzureError::Service("bad".into()).is_retryable());
        assert!(!AzureError::NotFound("gone".into()).is_retryable());
        assert!(!AzureError::Configuration("x".into()).is_retryable());
    }

    #[test]
    fn classify_throttled_429() {
        let err = classify_azure_error("HTTP 429: Too Many Requests");
        assert!(matches!(err, AzureError::Throttled));
    }

    #[test]
    fn classify_throttled_keyword() {
        let err = classify_azure_error("Throttling: Rate exceeded");
        assert!(matches!(err, AzureError::Throttled));
    }

    #[test]
    fn classify_timeout() {
        let err = classify_azure_error("Request timed out after 30s");
        assert!(matches!(err, AzureError::Timeout(_)));
    }

    #[test]
    fn classify_container_not_found() {
        let err = classify_azure_error("ContainerNotFound: The specified container does not exist");
        assert!(matches!(err, AzureError::NotFound(_)));
    }

    #[test]
    fn classify_container_already_exists() {
        let err = classify_azure_error("HttpError 409: ContainerAlreadyExists");
        assert!(matches!(err, AzureError::AlreadyExists(_)));
    }

    #[test]
    fn classify_connection() {
        let err = classify_azure_error("Connection refused: 10.0.0.1:443");
        assert!(matches!(err, AzureError::Connection(_)));
    }

    #[test]
    fn classify_generic_service_error() {
        let err = classify_azure_error("AuthorizationPermissionMismatch");
        assert!(matches!(err, AzureError::Service(_)));
    }

    #[test]
    fn error_display() {
        assert_eq!(AzureError::Throttled.to_string(), "Azure request throttled");
        assert_eq!(
            AzureError::Timeout(Duration::from_secs(2)).to_string(),
            "Azure request timed out after 2s"
        );
        assert_eq!(
            AzureError::NotConfigured("blob").to_string(),
            "blob client is not configured"
        );
        assert_eq!(
            AzureError::Service("bad".into()).to_string(),
            "Azure service error: bad"
        );
    }
}
