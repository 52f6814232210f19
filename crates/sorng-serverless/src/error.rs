//! Error types for provider calls and for the reconciliation layer.
//!
//! `AwsError` is what comes back across the wire: the decoded error code and
//! message of a failed control-plane call. Internal logic never branches on
//! the raw code string; it asks [`AwsError::kind`] for one of the closed
//! [`ErrorKind`] variants instead.
//!
//! `ServerlessError` is what the managers return. Provider failures pass
//! through untouched in `ServerlessError::Aws`; the only locally produced
//! variants are the "does not exist" translation for deletes and the
//! structural errors of the SDK transfer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A failed call to one of the provider's control-plane APIs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsError {
    /// Provider error code, e.g. "ResourceNotFoundException".
    pub code: String,
    pub message: String,
    /// HTTP status of the response (0 when no response was received).
    pub status_code: u16,
    pub request_id: Option<String>,
    /// Service that produced the error ("lambda", "iam", ...).
    pub service: String,
    pub action: Option<String>,
    /// Whether the transport layer may retry this call on its own.
    pub retryable: bool,
}

/// Closed classification of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The addressed resource does not exist.
    NotFound,
    /// A request parameter was rejected. During function creation this is the
    /// signal that a freshly created role has not propagated yet.
    InvalidParameter,
    /// Anything else: auth, validation, throttling that outlived transport
    /// retries, malformed responses.
    Fatal,
}

impl fmt::Display for AwsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AWS {} error [{}]: {} (HTTP {})",
            self.service, self.code, self.message, self.status_code
        )?;
        if let Some(ref req_id) = self.request_id {
            write!(f, " [RequestId: {}]", req_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for AwsError {}

impl AwsError {
    pub fn new(service: &str, code: &str, message: &str, status_code: u16) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            status_code,
            request_id: None,
            service: service.to_string(),
            action: None,
            retryable: Self::is_retryable_code(code, status_code),
        }
    }

    /// A response body that did not have the expected shape.
    pub fn parse(service: &str, message: &str) -> Self {
        Self::new(service, "ParseError", message, 0)
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    /// Classify this failure.
    pub fn kind(&self) -> ErrorKind {
        match self.code.as_str() {
            "ResourceNotFoundException" | "NotFoundException" | "NoSuchEntity" => {
                ErrorKind::NotFound
            }
            "InvalidParameterValueException" => ErrorKind::InvalidParameter,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Throttling and server-side failures are retried by the transport.
    fn is_retryable_code(code: &str, status_code: u16) -> bool {
        if matches!(status_code, 429 | 502 | 503 | 504) {
            return true;
        }
        matches!(
            code,
            "Throttling"
                | "ThrottlingException"
                | "TooManyRequestsException"
                | "RequestLimitExceeded"
                | "ServiceException"
                | "ServiceUnavailable"
                | "ServiceUnavailableException"
                | "InternalFailure"
                | "RequestTimeout"
                | "RequestTimeoutException"
        )
    }

    /// Decode an XML error body (Query protocol services such as IAM).
    ///
    /// ```xml
    /// <ErrorResponse>
    ///   <Error><Code>NoSuchEntity</Code><Message>...</Message></Error>
    ///   <RequestId>abc-123</RequestId>
    /// </ErrorResponse>
    /// ```
    pub fn parse_xml_error(service: &str, status_code: u16, body: &str) -> Self {
        let code = crate::client::xml_text(body, "Code").unwrap_or_else(|| "UnknownError".to_string());
        let message = crate::client::xml_text(body, "Message")
            .unwrap_or_else(|| format!("HTTP {} from {}", status_code, service));
        let mut err = Self::new(service, &code, &message, status_code);
        err.request_id = crate::client::xml_text(body, "RequestId");
        err
    }

    /// Decode a JSON error body.
    ///
    /// Lambda and CloudWatch Logs report the code in `__type` (sometimes with
    /// a `namespace#` prefix); API Gateway only sends `message` and puts the
    /// code in the `x-amzn-errortype` header, which the caller passes as
    /// `header_code`.
    pub fn parse_json_error(
        service: &str,
        status_code: u16,
        body: &str,
        header_code: Option<&str>,
    ) -> Self {
        let strip = |s: &str| -> String {
            let s = s.rsplit('#').next().unwrap_or(s);
            s.split(':').next().unwrap_or(s).to_string()
        };
        let val: serde_json::Value = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
        let code = val
            .get("__type")
            .or_else(|| val.get("code"))
            .or_else(|| val.get("Code"))
            .and_then(|v| v.as_str())
            .or(header_code)
            .map(strip)
            .unwrap_or_else(|| Self::code_for_status(status_code).to_string());
        let message = val
            .get("message")
            .or_else(|| val.get("Message"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| body.chars().take(200).collect());
        Self::new(service, &code, &message, status_code)
    }

    fn code_for_status(status_code: u16) -> &'static str {
        match status_code {
            404 => "NotFoundException",
            429 => "TooManyRequestsException",
            _ => "UnknownError",
        }
    }
}

impl From<reqwest::Error> for AwsError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            code: "HttpError".to_string(),
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()).unwrap_or(0),
            request_id: None,
            service: "http".to_string(),
            action: None,
            retryable: err.is_timeout() || err.is_connect(),
        }
    }
}

pub type AwsResult<T> = Result<T, AwsError>;

/// Errors surfaced by the reconciliation operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerlessError {
    /// A provider failure, passed through unmodified.
    #[error(transparent)]
    Aws(#[from] AwsError),

    /// The resource addressed by a delete (or lookup) is already gone.
    #[error("resource does not exist: {0}")]
    ResourceDoesNotExist(String),

    /// The generated SDK archive did not contain a single top-level directory.
    #[error("the downloaded SDK had an unexpected directory structure: {}", .entries.join(", "))]
    UnexpectedSdkLayout { entries: Vec<String> },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid SDK archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerlessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Provider-level classification, if this is a provider failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Aws(e) => Some(e.kind()),
            _ => None,
        }
    }
}

pub type ServerlessResult<T> = Result<T, ServerlessError>;
