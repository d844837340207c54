//! Error types shared by all checks

use thiserror::Error;

/// Result type for check operations
pub type CheckResult<T> = Result<T, CheckError>;

/// Errors that can occur while polling a monitored API
#[derive(Error, Debug)]
pub enum CheckError {
    /// Network failure, timeout or TLS problem while talking to the API
    #[error("Transport error for '{url}': {message}")]
    Transport { url: String, message: String },

    /// The API answered with a non-success status code
    #[error("HTTP {status} from '{url}'")]
    Http { url: String, status: u16 },

    /// The API answered with a payload that does not have the expected shape
    #[error("Invalid response format: {details}")]
    InvalidResponse { details: String },

    /// Instance configuration is unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl CheckError {
    /// Create a new transport error
    pub fn transport<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new HTTP status error
    pub fn http<U: Into<String>>(url: U, status: u16) -> Self {
        Self::Http {
            url: url.into(),
            status,
        }
    }

    /// Create a new invalid response error
    pub fn invalid_response<S: Into<String>>(details: S) -> Self {
        Self::InvalidResponse {
            details: details.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Status code carried by an HTTP error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CheckError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The credentials lack privileges for the requested resource (HTTP 403)
    pub fn is_authorization(&self) -> bool {
        self.status_code() == Some(403)
    }

    /// The requested resource does not exist (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if this error happened below the HTTP layer
    pub fn is_transport(&self) -> bool {
        matches!(self, CheckError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        let forbidden = CheckError::http("http://harbor/api/registries", 403);
        assert!(forbidden.is_authorization());
        assert!(!forbidden.is_transport());
        assert_eq!(forbidden.status_code(), Some(403));

        let gone = CheckError::http("http://nova/servers/1/diagnostics", 404);
        assert!(gone.is_not_found());
        assert!(!gone.is_authorization());

        let transport = CheckError::transport("http://nova", "connection refused");
        assert!(transport.is_transport());
        assert_eq!(transport.status_code(), None);
    }

    #[test]
    fn test_error_display() {
        let error = CheckError::http("http://keystone/v3", 500);
        assert_eq!(error.to_string(), "HTTP 500 from 'http://keystone/v3'");

        let error = CheckError::configuration("missing url");
        assert!(matches!(error, CheckError::Configuration { .. }));
        assert_eq!(error.to_string(), "Configuration error: missing url");
    }
}
