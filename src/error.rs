//! Error taxonomy shared by every device client.
//!
//! Only conditions the caller genuinely has to branch on become variants:
//! transport failures, rejected logins, and bad parameters. Everything else
//! (a 4xx/5xx the caller asked for, an undecodable body) is reported as an
//! ordinary `(status, body)` pair, not an error.

use thiserror::Error;

/// Result alias used across the crate.
pub type RestResult<T> = Result<T, RestError>;

#[derive(Error, Debug)]
pub enum RestError {
    /// Transport-level failure: DNS, refused connection, TLS handshake,
    /// timeout. Never retried.
    #[error("cannot reach {address}: {source}")]
    Connectivity {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    /// The device rejected the login call.
    #[error("authentication failed for {username}@{address}: {reason}")]
    Auth {
        address: String,
        username: String,
        reason: String,
    },

    /// Invalid client configuration or a value that cannot be put on the
    /// wire (for example a session key with bytes illegal in a header).
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client initialization failed: {0}")]
    Init(#[source] reqwest::Error),
}

impl RestError {
    pub(crate) fn connectivity(address: &str, source: reqwest::Error) -> Self {
        RestError::Connectivity {
            address: address.to_string(),
            source,
        }
    }

    pub(crate) fn auth(address: &str, username: &str, reason: impl Into<String>) -> Self {
        RestError::Auth {
            address: address.to_string(),
            username: username.to_string(),
            reason: reason.into(),
        }
    }
}

/// Maximum length for response bodies quoted in error messages and logs.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body so error messages stay readable.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..cut],
            body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(truncate_body("ok"), "ok");
    }

    #[test]
    fn test_truncate_body_long() {
        let body = "x".repeat(600);
        let truncated = truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.ends_with("(truncated, 600 total bytes)"));
    }

    #[test]
    fn test_truncate_body_multibyte_boundary() {
        // 2-byte characters that straddle the cut point must not panic
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_auth_error_display() {
        let err = RestError::auth("10.0.0.1", "monitor", "bad password");
        assert_eq!(
            err.to_string(),
            "authentication failed for monitor@10.0.0.1: bad password"
        );
    }
}
