//! Maps pipeline outcomes onto the JSON bodies and status codes of the HTTP API.
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | code found | 200 | `{"success":true,"type":"code","code":"…","id":"…","snippet":"…"}` |
//! | link found | 200 | `{"success":true,"type":"link","link":"…","id":"…","snippet":"…"}` |
//! | bad input | 400 | `{"success":false,"message":"…"}` |
//! | not registered | 403 | `{"success":false,"message":"…"}` |
//! | nothing found | 404 | `{"success":false,"message":"…"}` |
//! | connection failure | 500 | `{"success":false,"message":"…"}` |
//!
//! Outside production, failure bodies also carry `category` and `detail`.

use crate::error::{Error, ErrorCategory, Result};
use crate::extract::{Extracted, Finding};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

const NOT_REGISTERED_MESSAGE: &str = "This email is not registered. Please register your email first.";
const NOT_FOUND_MESSAGE: &str = "No verification code or link found in recent emails";
const CONNECTION_MESSAGE: &str = "Failed to fetch emails. Please try again later.";

/// Response body of the fetch-code endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FetchResponse {
    /// A code or link was found.
    Found(FoundBody),
    /// Anything else.
    Failed(FailureBody),
}

/// Success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundBody {
    /// Always `true`.
    pub success: bool,
    /// `type` plus `code` or `link`.
    #[serde(flatten)]
    pub value: FoundValue,
    /// Identifier of the message the value came from.
    pub id: String,
    /// Subject of that message.
    pub snippet: String,
}

/// The extracted value, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FoundValue {
    /// `{"type":"code","code":"…"}`
    Code {
        /// The code.
        code: String,
    },
    /// `{"type":"link","link":"…"}`
    Link {
        /// The URL.
        link: String,
    },
}

/// Failure body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBody {
    /// Always `false`.
    pub success: bool,
    /// Message safe to show to the caller.
    pub message: String,
    /// Error category, outside production only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Underlying error chain, outside production only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Status code plus body, ready to be returned from a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON body.
    pub body: FetchResponse,
}

impl IntoResponse for Normalized {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Finding> for FoundBody {
    fn from(finding: Finding) -> Self {
        let value = match finding.extracted {
            Extracted::Code(code) => FoundValue::Code { code },
            Extracted::Link(link) => FoundValue::Link { link },
        };
        Self {
            success: true,
            value,
            id: finding.message_id,
            snippet: finding.subject,
        }
    }
}

/// HTTP status for an error category.
#[must_use]
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::NotRegistered => StatusCode::FORBIDDEN,
        ErrorCategory::NotFound | ErrorCategory::FetchTimeout => StatusCode::NOT_FOUND,
        ErrorCategory::Connection => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Turns a pipeline result into a status and body.
///
/// With `production` set, failure bodies carry only the generic message.
#[must_use]
pub fn normalize(result: Result<Finding>, production: bool) -> Normalized {
    match result {
        Ok(finding) => Normalized {
            status: StatusCode::OK,
            body: FetchResponse::Found(finding.into()),
        },
        Err(err) => failure(&err, production),
    }
}

fn failure(err: &Error, production: bool) -> Normalized {
    let category = err.category();
    let message = match category {
        ErrorCategory::Validation => capitalize(&err.to_string()),
        ErrorCategory::NotRegistered => NOT_REGISTERED_MESSAGE.to_string(),
        ErrorCategory::NotFound | ErrorCategory::FetchTimeout => NOT_FOUND_MESSAGE.to_string(),
        ErrorCategory::Connection => CONNECTION_MESSAGE.to_string(),
    };

    let verbose = !production && category != ErrorCategory::NotRegistered;

    Normalized {
        status: status_for(category),
        body: FetchResponse::Failed(FailureBody {
            success: false,
            message,
            category: verbose.then(|| category.to_string()),
            detail: verbose.then(|| error_chain(err)),
        }),
    }
}

/// Renders an error and its sources as "outer: inner: innermost".
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        source = inner.source();
    }
    chain
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn finding(extracted: Extracted) -> Finding {
        Finding {
            extracted,
            subject: "Your Netflix temporary access code".into(),
            message_id: "9142".into(),
            rule: "test",
        }
    }

    fn to_json(normalized: &Normalized) -> Value {
        serde_json::to_value(&normalized.body).unwrap()
    }

    #[test]
    fn test_code_body() {
        let normalized = normalize(Ok(finding(Extracted::Code("4821".into()))), true);
        assert_eq!(normalized.status, StatusCode::OK);
        assert_eq!(
            to_json(&normalized),
            json!({
                "success": true,
                "type": "code",
                "code": "4821",
                "id": "9142",
                "snippet": "Your Netflix temporary access code",
            })
        );
    }

    #[test]
    fn test_link_body() {
        let link = "https://www.netflix.com/account/update-primary?t=1";
        let normalized = normalize(Ok(finding(Extracted::Link(link.into()))), true);
        let body = to_json(&normalized);
        assert_eq!(body["type"], "link");
        assert_eq!(body["link"], link);
        assert!(body.get("code").is_none());
    }

    #[test]
    fn test_statuses() {
        let cases = [
            (Error::MissingEmail, StatusCode::BAD_REQUEST),
            (Error::NotRegistered, StatusCode::FORBIDDEN),
            (Error::NoMatch, StatusCode::NOT_FOUND),
            (
                Error::FetchTimeout {
                    range: "1:10".into(),
                    timeout: std::time::Duration::from_secs(20),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                Error::RequestTimeout {
                    timeout: std::time::Duration::from_secs(30),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(normalize(Err(err), true).status, status);
        }
    }

    #[test]
    fn test_production_hides_detail() {
        let err = || Error::TcpConnect {
            target: "imap.gmail.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };

        let prod = to_json(&normalize(Err(err()), true));
        assert_eq!(
            prod,
            json!({ "success": false, "message": CONNECTION_MESSAGE })
        );

        let dev = to_json(&normalize(Err(err()), false));
        assert_eq!(dev["category"], "connection");
        assert_eq!(
            dev["detail"],
            "failed to connect to imap.gmail.com:993: refused"
        );
    }

    #[test]
    fn test_not_registered_never_has_detail() {
        let body = to_json(&normalize(Err(Error::NotRegistered), false));
        assert_eq!(
            body,
            json!({ "success": false, "message": NOT_REGISTERED_MESSAGE })
        );
    }

    #[test]
    fn test_validation_message() {
        let body = to_json(&normalize(Err(Error::MissingEmail), true));
        assert_eq!(body["message"], "Email address is required");
    }
}
