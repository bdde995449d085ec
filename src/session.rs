//! IMAP retrieval path.
//!
//! Thin wrappers over async-imap operations, plus [`ImapBackend`], which
//! strings them together behind the [`MailBackend`] trait.

use crate::config::MailboxConfig;
use crate::connection::{self, BoxedStream};
use crate::error::{Error, Result};
use crate::mailbox::{MailBackend, MailboxSession, RawMessage, SequenceWindow};
use async_imap::types::Fetch;
use async_imap::Session;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, instrument, warn};

pub(crate) type ImapSession = Session<BoxedStream>;

const INBOX: &str = "INBOX";

/// Items requested per message. `BODY.PEEK[]` leaves the `\Seen` flag alone.
const FETCH_ITEMS: &str = "(UID INTERNALDATE BODY.PEEK[])";

/// Logs in with the account's credentials.
#[instrument(name = "session::authenticate", skip_all, fields(email = %email))]
pub(crate) async fn authenticate(
    stream: BoxedStream,
    email: &str,
    password: &str,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(stream);

    debug!("Authenticating to IMAP server");

    client
        .login(email, password)
        .await
        .map_err(|e| Error::ImapLogin {
            email: email.to_string(),
            source: e.0,
        })
}

/// Selects the inbox and returns how many messages it holds.
#[instrument(name = "session::select", skip(session))]
pub(crate) async fn select_inbox(session: &mut ImapSession) -> Result<u32> {
    let mailbox = session
        .select(INBOX)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: INBOX.to_string(),
            source,
        })?;

    debug!(exists = mailbox.exists, "Selected inbox");

    Ok(mailbox.exists)
}

/// Fetches every message in `window` with one FETCH command.
///
/// Messages the server returns without a body are skipped.
#[instrument(name = "session::fetch_window", skip(session), fields(range = %window))]
pub(crate) async fn fetch_window(
    session: &mut ImapSession,
    window: SequenceWindow,
) -> Result<Vec<RawMessage>> {
    let range = window.to_string();

    let mut stream = session
        .fetch(&range, FETCH_ITEMS)
        .await
        .map_err(|source| Error::ImapFetch {
            range: range.clone(),
            source,
        })?
        .boxed();

    let mut messages = Vec::with_capacity(window.len());
    while let Some(item) = stream.next().await {
        let fetch = item.map_err(|source| Error::FetchMessage { source })?;
        match raw_message(&fetch) {
            Some(message) => messages.push(message),
            None => debug!(sequence = fetch.message, "Message has no body, skipping"),
        }
    }

    debug!(fetched = messages.len(), "Fetched window");

    Ok(messages)
}

fn raw_message(fetch: &Fetch) -> Option<RawMessage> {
    let body = fetch.body()?;
    Some(RawMessage {
        sequence: fetch.message,
        id: fetch
            .uid
            .map_or_else(|| fetch.message.to_string(), |uid| uid.to_string()),
        date: fetch.internal_date().map(|date| date.with_timezone(&Utc)),
        body: body.to_vec(),
    })
}

#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })
}

/// Reads mailboxes over IMAP, one short-lived connection per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapBackend;

impl ImapBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailBackend for ImapBackend {
    async fn open(&self, config: &MailboxConfig) -> Result<Box<dyn MailboxSession>> {
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_connection(
                &config.host,
                &target_addr,
                config.secure,
                config.proxy.as_ref(),
            ),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("Connection established");

        let mut session = tokio::time::timeout(
            timeouts.auth,
            authenticate(stream, config.email(), config.password()),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: config.email().to_string(),
            timeout: timeouts.auth,
        })??;

        let selected = tokio::time::timeout(timeouts.select, select_inbox(&mut session))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: INBOX.to_string(),
                timeout: timeouts.select,
            })
            .and_then(|result| result);

        let total = match selected {
            Ok(total) => total,
            Err(e) => {
                // Authenticated but unusable; do not leave it open.
                if tokio::time::timeout(timeouts.logout, logout(&mut session))
                    .await
                    .is_err()
                {
                    warn!("Logout after failed select timed out");
                }
                return Err(e);
            }
        };

        Ok(Box::new(ImapMailbox { session, total }))
    }

    fn name(&self) -> &'static str {
        "imap"
    }
}

struct ImapMailbox {
    session: ImapSession,
    total: u32,
}

#[async_trait]
impl MailboxSession for ImapMailbox {
    fn total(&self) -> u32 {
        self.total
    }

    async fn fetch(&mut self, window: SequenceWindow) -> Result<Vec<RawMessage>> {
        fetch_window(&mut self.session, window).await
    }

    async fn close(&mut self) -> Result<()> {
        logout(&mut self.session).await
    }
}
