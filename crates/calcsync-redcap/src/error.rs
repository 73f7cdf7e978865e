//! REDCap API error types.

/// Errors that can occur while talking to the REDCap API.
#[derive(Debug, thiserror::Error)]
pub enum RedcapError {
    /// The server answered with a non-200 status.
    #[error("REDCap returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the server (usually `{"error": ...}`).
        body: String,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request to REDCap failed: {0}")]
    Transport(String),

    /// The response body was not the JSON shape we expected.
    #[error("unexpected response from REDCap ({what}): {source}")]
    Decode {
        /// Which export/import the body belonged to.
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The requested field is not in the data dictionary.
    #[error("no metadata found for '{0}'")]
    UnknownField(String),
}

/// Convenience alias used throughout the client crate.
pub type Result<T> = std::result::Result<T, RedcapError>;

impl RedcapError {
    /// Creates a [`RedcapError::Decode`] for the given response kind.
    pub fn decode(what: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { what, source }
    }

    /// Returns `true` if the server rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_includes_body() {
        let err = RedcapError::Status {
            status: 403,
            body: r#"{"error":"You do not have permissions to use the API"}"#.into(),
        };
        assert!(err.is_unauthorized());
        assert!(err.to_string().starts_with("REDCap returned HTTP 403"));
        assert!(err.to_string().contains("permissions"));
    }

    #[test]
    fn unknown_field_message() {
        assert_eq!(
            RedcapError::UnknownField("bmi".into()).to_string(),
            "no metadata found for 'bmi'"
        );
        assert!(!RedcapError::UnknownField("bmi".into()).is_unauthorized());
    }
}
