//! Gmail REST API retrieval path.
//!
//! Used instead of IMAP when the service runs with `CODE_RELAY_BACKEND=gmail-api`.
//! Credentials are a long-lived OAuth refresh token for one Gmail user, so
//! this path reads that single mailbox regardless of which registered address
//! asked. The newest `window` message ids are listed once on open; their
//! positions map onto sequence numbers so the rest of the pipeline treats
//! both paths the same.

use crate::config::{GmailApiConfig, MailboxConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::mailbox::{MailBackend, MailboxSession, RawMessage, SequenceWindow};
use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct RawMessageResponse {
    id: String,
    raw: Option<String>,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
}

/// Reads the configured Gmail mailbox over the REST API.
#[derive(Debug, Clone)]
pub struct GmailApiBackend {
    client: reqwest::Client,
    config: GmailApiConfig,
    window: usize,
    query: Option<String>,
    token_url: String,
    api_base: String,
}

impl GmailApiBackend {
    /// Creates a backend listing the newest `window` messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GmailApiConfig, window: usize, timeouts: &TimeoutConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|source| Error::ApiRequest {
                endpoint: "client".into(),
                source,
            })?;

        Ok(Self {
            client,
            config,
            window,
            query: None,
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
        })
    }

    /// Restricts listing to messages matching a Gmail search query, e.g. `from:netflix.com`.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Overrides the OAuth token endpoint and API base URL.
    #[must_use]
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[instrument(name = "gmail::access_token", skip(self))]
    async fn access_token(&self) -> Result<SecretString> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret()),
            ("refresh_token", self.config.refresh_token()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|source| Error::ApiRequest {
                endpoint: "token".into(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(Error::ApiStatus {
                endpoint: "token".into(),
                status: response.status().as_u16(),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|source| Error::ApiRequest {
            endpoint: "token".into(),
            source,
        })?;

        Ok(SecretString::from(token.access_token))
    }

    #[instrument(name = "gmail::list_recent", skip_all, fields(user = %self.config.user))]
    async fn list_recent(&self, token: &SecretString) -> Result<Vec<String>> {
        let mut query = vec![("maxResults", self.window.to_string())];
        if let Some(q) = &self.query {
            query.push(("q", q.clone()));
        }

        let response = self
            .client
            .get(format!("{}/users/{}/messages", self.api_base, self.config.user))
            .bearer_auth(token.expose_secret())
            .query(&query)
            .send()
            .await
            .map_err(|source| Error::ApiRequest {
                endpoint: "messages.list".into(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(Error::ApiStatus {
                endpoint: "messages.list".into(),
                status: response.status().as_u16(),
            });
        }

        let payload: ListMessagesResponse =
            response.json().await.map_err(|source| Error::ApiRequest {
                endpoint: "messages.list".into(),
                source,
            })?;

        let mut ids: Vec<String> = payload.messages.into_iter().map(|m| m.id).collect();
        ids.truncate(self.window);

        debug!(count = ids.len(), "Listed recent messages");

        Ok(ids)
    }
}

#[async_trait]
impl MailBackend for GmailApiBackend {
    async fn open(&self, config: &MailboxConfig) -> Result<Box<dyn MailboxSession>> {
        let timeouts = &config.timeouts;

        let token = tokio::time::timeout(timeouts.auth, self.access_token())
            .await
            .map_err(|_| Error::AuthTimeout {
                email: self.config.user.clone(),
                timeout: timeouts.auth,
            })??;

        let ids = tokio::time::timeout(timeouts.select, self.list_recent(&token))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: "INBOX".into(),
                timeout: timeouts.select,
            })??;

        Ok(Box::new(GmailMailbox {
            client: self.client.clone(),
            messages_url: format!("{}/users/{}/messages", self.api_base, self.config.user),
            token,
            ids,
        }))
    }

    fn name(&self) -> &'static str {
        "gmail-api"
    }
}

struct GmailMailbox {
    client: reqwest::Client,
    messages_url: String,
    token: SecretString,
    /// Newest first.
    ids: Vec<String>,
}

impl GmailMailbox {
    /// Maps a sequence position onto the newest-first id list.
    fn id_at(&self, sequence: u32) -> Option<&str> {
        let total = self.total();
        if sequence == 0 || sequence > total {
            return None;
        }
        self.ids.get((total - sequence) as usize).map(String::as_str)
    }
}

#[async_trait]
impl MailboxSession for GmailMailbox {
    fn total(&self) -> u32 {
        u32::try_from(self.ids.len()).unwrap_or(u32::MAX)
    }

    #[instrument(name = "gmail::fetch_window", skip(self), fields(range = %window))]
    async fn fetch(&mut self, window: SequenceWindow) -> Result<Vec<RawMessage>> {
        let mut messages = Vec::with_capacity(window.len());

        for sequence in (window.start..=window.end).rev() {
            let Some(id) = self.id_at(sequence) else {
                continue;
            };

            let response = self
                .client
                .get(format!("{}/{id}", self.messages_url))
                .bearer_auth(self.token.expose_secret())
                .query(&[("format", "raw")])
                .send()
                .await
                .map_err(|source| Error::ApiRequest {
                    endpoint: "messages.get".into(),
                    source,
                })?;

            if !response.status().is_success() {
                debug!(id, status = response.status().as_u16(), "Message unavailable, skipping");
                continue;
            }

            let payload: RawMessageResponse =
                response.json().await.map_err(|source| Error::ApiRequest {
                    endpoint: "messages.get".into(),
                    source,
                })?;

            let Some(raw) = payload.raw else {
                debug!(id, "Message has no raw payload, skipping");
                continue;
            };

            messages.push(RawMessage {
                sequence,
                id: payload.id,
                date: payload
                    .internal_date
                    .as_deref()
                    .and_then(parse_internal_date),
                body: decode_raw(&raw)?,
            });
        }

        Ok(messages)
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Releasing Gmail access token");
        Ok(())
    }
}

fn decode_raw(raw: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(raw.as_bytes())
        .or_else(|_| URL_SAFE.decode(raw.as_bytes()))
        .map_err(|err| Error::ApiPayload {
            message: format!("invalid raw message encoding: {err}"),
        })
}

fn parse_internal_date(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const NEWEST: &str = "From: info@account.netflix.com\r\nSubject: Code\r\n\r\nYour code is 4821";
    const OLDER: &str = "From: info@netflix.com\r\nSubject: Old\r\n\r\nnothing";

    async fn token() -> Json<Value> {
        Json(json!({ "access_token": "test-token", "expires_in": 3599 }))
    }

    async fn list(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(params.get("maxResults").map(String::as_str), Some("10"));
        assert_eq!(params.get("q").map(String::as_str), Some("from:netflix.com"));
        Json(json!({ "messages": [{ "id": "m2" }, { "id": "m1" }] }))
    }

    async fn message(Path((_user, id)): Path<(String, String)>) -> Json<Value> {
        let (body, date) = match id.as_str() {
            "m2" => (NEWEST, "1741953600000"),
            _ => (OLDER, "1741867200000"),
        };
        Json(json!({
            "id": id,
            "raw": URL_SAFE_NO_PAD.encode(body),
            "internalDate": date,
        }))
    }

    async fn mock_server() -> String {
        let app = Router::new()
            .route("/token", post(token))
            .route("/users/{user}/messages", get(list))
            .route("/users/{user}/messages/{id}", get(message));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn mailbox_config() -> MailboxConfig {
        MailboxConfig::builder()
            .email("viewer@gmail.com")
            .password("unused")
            .build()
            .unwrap()
    }

    #[test]
    fn test_decode_raw_accepts_padded_and_unpadded() {
        assert_eq!(decode_raw("aGk").unwrap(), b"hi");
        assert_eq!(decode_raw("aGk=").unwrap(), b"hi");
        assert!(decode_raw("***").is_err());
    }

    #[test]
    fn test_parse_internal_date() {
        let date = parse_internal_date("1741953600000").unwrap();
        assert_eq!(date.to_rfc3339(), "2025-03-14T12:00:00+00:00");
        assert!(parse_internal_date("soon").is_none());
    }

    #[tokio::test]
    async fn test_open_and_fetch_against_mock_api() {
        let base = mock_server().await;
        let gmail = GmailApiConfig::new("client", "secret", "refresh", None);
        let backend = GmailApiBackend::new(gmail, 10, &TimeoutConfig::default())
            .unwrap()
            .with_query("from:netflix.com")
            .with_endpoints(format!("{base}/token"), base.clone());

        let mut session = backend.open(&mailbox_config()).await.unwrap();
        assert_eq!(session.total(), 2);

        let window = SequenceWindow::latest(session.total(), 10).unwrap();
        let messages = session.fetch(window).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence, 2);
        assert_eq!(messages[0].id, "m2");
        assert_eq!(messages[0].body, NEWEST.as_bytes());
        assert_eq!(messages[1].id, "m1");
        assert!(messages[0].date > messages[1].date);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_rejection_is_reported() {
        let app = Router::new().route(
            "/token",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "invalid_grant") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let gmail = GmailApiConfig::new("client", "secret", "refresh", None);
        let backend = GmailApiBackend::new(gmail, 10, &TimeoutConfig::default())
            .unwrap()
            .with_endpoints(format!("http://{addr}/token"), format!("http://{addr}"));

        let err = backend.open(&mailbox_config()).await.err().unwrap();
        assert!(matches!(err, Error::ApiStatus { status: 401, .. }));
    }
}
