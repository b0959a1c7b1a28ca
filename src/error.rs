use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = NsrdbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum NsrdbError {
    #[error("missing NSRDB credential `{field}` (pass it explicitly or add {key}= to {source_hint})")]
    MissingCredential {
        field: &'static str,
        key: &'static str,
        source_hint: String,
    },

    #[error("failed to read credential file {path}")]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("NSRDB request failed: HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Request {
        status: u16,
        body: String,
        message: Option<String>,
    },

    #[error("NSRDB rejected the request: {}", .errors.join("; "))]
    Rejected { errors: Vec<String> },

    #[error("network request failed for {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse API JSON from {url}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("malformed data in column `{column}` at row {row}: {reason}")]
    MalformedData {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("failed to write {path}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl NsrdbError {
    pub(crate) fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        NsrdbError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status carried by a [`NsrdbError::Request`].
    pub fn status(&self) -> Option<u16> {
        match self {
            NsrdbError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Error document shapes returned by the NSRDB / api.data.gov gateway.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    // Gateway errors (bad key, rate limit): {"error": {"code": ..., "message": ...}}
    #[serde(default)]
    pub(crate) error: Option<GatewayError>,
    // Parameter validation errors: {"errors": ["...", ...]}
    #[serde(default)]
    pub(crate) errors: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct GatewayError {
    #[serde(default)]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// Builds the error for a non-success reply. The body is kept verbatim.
pub(crate) fn request_error(status: StatusCode, body: String) -> NsrdbError {
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .ok()
        .and_then(|e| summarize(status, &e));

    NsrdbError::Request {
        status: status.as_u16(),
        body,
        message,
    }
}

fn summarize(status: StatusCode, e: &ApiErrorResponse) -> Option<String> {
    if let Some(err) = &e.error {
        let code = err.code.as_deref().unwrap_or("");
        let message = err.message.as_deref().unwrap_or("");

        if code == "API_KEY_INVALID" || code == "API_KEY_MISSING" {
            return Some(format!(
                "{message}\n- Check API_KEY in your credential file (~/.nsrdb) or the key passed explicitly\n- Keys are issued at https://developer.nrel.gov/signup/"
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || code == "OVER_RATE_LIMIT" {
            return Some(format!("rate limit exceeded: {message}"));
        }
        if !message.is_empty() {
            return Some(message.to_string());
        }
        if !code.is_empty() {
            return Some(code.to_string());
        }
    }

    if !e.errors.is_empty() {
        return Some(e.errors.join("; "));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_message_is_extracted() {
        let body = r#"{"error":{"code":"API_KEY_INVALID","message":"An invalid api_key was supplied."}}"#;
        let err = request_error(StatusCode::FORBIDDEN, body.to_string());

        match &err {
            NsrdbError::Request {
                status,
                body: kept,
                message,
            } => {
                assert_eq!(*status, 403);
                assert_eq!(kept, body);
                assert!(message.as_deref().unwrap().starts_with("An invalid api_key"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("HTTP 403"));
    }

    #[test]
    fn validation_errors_are_joined() {
        let body = r#"{"inputs":{},"errors":["No data available","Bad interval"]}"#;
        let err = request_error(StatusCode::BAD_REQUEST, body.to_string());
        assert_eq!(
            err.to_string(),
            "NSRDB request failed: HTTP 400: No data available; Bad interval"
        );
    }

    #[test]
    fn plain_text_body_has_no_message() {
        let err = request_error(StatusCode::BAD_GATEWAY, "upstream down".to_string());
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "NSRDB request failed: HTTP 502");
    }
}
