//! The retrieval pipeline.
//!
//! [`CodeRelay`] is the entry point the HTTP layer calls: it validates the
//! address, resolves the account, and runs the [`Retriever`] under the overall
//! request deadline. The retriever opens one session, fetches the recent
//! window, decodes and classifies messages newest first, and stops at the
//! first hit. The session is closed exactly once on every path.
//!
//! # Example
//!
//! ```no_run
//! use mail_code_relay::{CodeRelay, JsonAccountRegistry, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> mail_code_relay::Result<()> {
//! let config = ServiceConfig::from_env()?;
//! let registry = Arc::new(JsonAccountRegistry::load(&config.accounts_file)?);
//! let relay = CodeRelay::from_config(config, registry)?;
//!
//! let finding = relay.fetch_code("viewer@gmail.com").await?;
//! println!("{}", finding.extracted.value());
//! # Ok(())
//! # }
//! ```

use crate::config::{validate_email, Backend, MailboxConfig, ServiceConfig};
use crate::decoder::{Decoded, Decoder};
use crate::error::{Error, Result};
use crate::extract::{ExtractionEngine, Finding};
use crate::fetcher;
use crate::gmail::GmailApiBackend;
use crate::mailbox::{MailBackend, SessionGuard};
use crate::registry::{resolve_account, AccountRegistry};
use crate::session::ImapBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Reads one mailbox and extracts the first code or link.
pub struct Retriever {
    backend: Arc<dyn MailBackend>,
    decoder: Decoder,
    engine: ExtractionEngine,
    window: usize,
}

impl Retriever {
    /// Creates a retriever scanning the newest `window` messages from `sender_domain`.
    #[must_use]
    pub fn new(backend: Arc<dyn MailBackend>, sender_domain: &str, window: usize) -> Self {
        Self {
            backend,
            decoder: Decoder::new(sender_domain),
            engine: ExtractionEngine::standard(sender_domain),
            window,
        }
    }

    /// Replaces the extraction rules.
    #[must_use]
    pub fn with_engine(mut self, engine: ExtractionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Opens the mailbox described by `config` and scans its recent window.
    ///
    /// # Errors
    ///
    /// - [`Error::NoMatch`] if no message in the window yielded a value,
    ///   including when the window is empty or the fetch timed out
    /// - a connection-category error if the session could not be opened or
    ///   the fetch failed
    #[instrument(
        name = "Retriever::retrieve",
        skip_all,
        fields(email = %config.email(), backend = self.backend.name(), window = self.window)
    )]
    pub async fn retrieve(&self, config: &MailboxConfig) -> Result<Finding> {
        let session = self.backend.open(config).await?;
        let mut guard = SessionGuard::new(session, config.timeouts.logout);

        let outcome = self.scan(&mut guard, config.timeouts.fetch).await;

        if let Err(e) = guard.close().await {
            warn!(error = %e, "Failed to close mailbox session");
        }

        outcome
    }

    async fn scan(&self, guard: &mut SessionGuard, fetch_timeout: Duration) -> Result<Finding> {
        let messages = fetcher::fetch_recent(guard.session(), self.window, fetch_timeout).await?;

        for raw in &messages {
            let message = match self.decoder.decode(raw) {
                Decoded::Message(message) => message,
                Decoded::ForeignSender { .. } | Decoded::Unreadable => continue,
            };

            if let Some(finding) = self.engine.scan(&message) {
                info!(
                    id = %finding.message_id,
                    rule = finding.rule,
                    "Found code or link"
                );
                return Ok(finding);
            }
        }

        debug!(inspected = messages.len(), "No code or link in recent messages");
        Err(Error::NoMatch)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("backend", &self.backend.name())
            .field("decoder", &self.decoder)
            .field("engine", &self.engine)
            .field("window", &self.window)
            .finish()
    }
}

/// Resolves a registered address to its mailbox and retrieves a code or link.
pub struct CodeRelay {
    registry: Arc<dyn AccountRegistry>,
    retriever: Retriever,
    config: ServiceConfig,
}

impl CodeRelay {
    /// Creates a relay from its parts.
    #[must_use]
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        retriever: Retriever,
        config: ServiceConfig,
    ) -> Self {
        Self {
            registry,
            retriever,
            config,
        }
    }

    /// Creates a relay with the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Gmail API backend is selected but cannot be built.
    pub fn from_config(config: ServiceConfig, registry: Arc<dyn AccountRegistry>) -> Result<Self> {
        let backend: Arc<dyn MailBackend> = match (config.backend, &config.gmail) {
            (Backend::Imap, _) => Arc::new(ImapBackend::new()),
            (Backend::GmailApi, Some(gmail)) => Arc::new(
                GmailApiBackend::new(gmail.clone(), config.window, &config.timeouts)?
                    .with_query(format!("from:{}", config.sender_domain)),
            ),
            (Backend::GmailApi, None) => {
                return Err(Error::InvalidConfig {
                    message: "gmail-api backend requires Google OAuth credentials".into(),
                })
            }
        };

        let retriever = Retriever::new(backend, &config.sender_domain, config.window);
        Ok(Self::new(registry, retriever, config))
    }

    /// Service configuration the relay runs with.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Runs the whole pipeline for `email`.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingEmail`] / [`Error::InvalidEmailFormat`] for bad input
    /// - [`Error::NotRegistered`] if the address is absent or disabled
    /// - [`Error::RequestTimeout`] if the request deadline elapses
    /// - anything [`Retriever::retrieve`] returns
    #[instrument(name = "CodeRelay::fetch_code", skip_all)]
    pub async fn fetch_code(&self, email: &str) -> Result<Finding> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::MissingEmail);
        }
        validate_email(email)?;

        let account = resolve_account(self.registry.as_ref(), email)?;
        let mailbox = MailboxConfig::for_account(&account, &self.config)?;

        let deadline = self.config.request_timeout;
        tokio::time::timeout(deadline, self.retriever.retrieve(&mailbox))
            .await
            .map_err(|_| Error::RequestTimeout { timeout: deadline })?
    }
}

impl std::fmt::Debug for CodeRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRelay")
            .field("retriever", &self.retriever)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Extracted, Rule};
    use crate::mailbox::{MailboxSession, RawMessage, SequenceWindow};
    use crate::decoder::DecodedMessage;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        closes: AtomicUsize,
        requested: Mutex<Option<SequenceWindow>>,
    }

    #[derive(Clone, Copy)]
    enum FetchBehavior {
        Messages,
        Fail,
    }

    struct StubBackend {
        total: u32,
        messages: Vec<RawMessage>,
        behavior: FetchBehavior,
        counters: Arc<Counters>,
    }

    struct StubSession {
        total: u32,
        messages: Vec<RawMessage>,
        behavior: FetchBehavior,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl MailBackend for StubBackend {
        async fn open(&self, _config: &MailboxConfig) -> Result<Box<dyn MailboxSession>> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubSession {
                total: self.total,
                messages: self.messages.clone(),
                behavior: self.behavior,
                counters: Arc::clone(&self.counters),
            }))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    #[async_trait]
    impl MailboxSession for StubSession {
        fn total(&self) -> u32 {
            self.total
        }

        async fn fetch(&mut self, window: SequenceWindow) -> Result<Vec<RawMessage>> {
            *self.counters.requested.lock().unwrap() = Some(window);
            match self.behavior {
                FetchBehavior::Messages => Ok(self
                    .messages
                    .iter()
                    .filter(|m| window.contains(m.sequence))
                    .cloned()
                    .collect()),
                FetchBehavior::Fail => Err(Error::ApiStatus {
                    endpoint: "fetch".into(),
                    status: 503,
                }),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records the ids of every message it is shown and never matches.
    struct RecordingRule {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Rule for RecordingRule {
        fn apply(&self, message: &DecodedMessage) -> Option<Extracted> {
            self.seen.lock().unwrap().push(message.id.clone());
            None
        }

        fn description(&self) -> &'static str {
            "recorder"
        }
    }

    fn email(sequence: u32, from: &str, body: &str) -> RawMessage {
        RawMessage {
            sequence,
            id: format!("uid-{sequence}"),
            date: Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i64::from(sequence))),
            body: format!("From: {from}\r\nSubject: Message {sequence}\r\n\r\n{body}").into_bytes(),
        }
    }

    fn backend(total: u32, messages: Vec<RawMessage>, behavior: FetchBehavior) -> (Arc<StubBackend>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let backend = Arc::new(StubBackend {
            total,
            messages,
            behavior,
            counters: Arc::clone(&counters),
        });
        (backend, counters)
    }

    fn mailbox() -> MailboxConfig {
        MailboxConfig::builder()
            .email("viewer@gmail.com")
            .password("pw")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_returns_newest_match() {
        let messages = vec![
            email(1, "info@netflix.com", "Your code is 1111"),
            email(2, "info@account.netflix.com", "Your code is 2222"),
            email(3, "friend@example.com", "Your code is 3333"),
        ];
        let (backend, counters) = backend(3, messages, FetchBehavior::Messages);
        let retriever = Retriever::new(backend, "netflix.com", 10);

        let finding = retriever.retrieve(&mailbox()).await.unwrap();

        assert_eq!(finding.extracted, Extracted::Code("2222".into()));
        assert_eq!(finding.message_id, "uid-2");
        assert_eq!(finding.subject, "Message 2");
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_connection_error_and_still_closes() {
        let (backend, counters) = backend(5, Vec::new(), FetchBehavior::Fail);
        let retriever = Retriever::new(backend, "netflix.com", 10);

        let err = retriever.retrieve(&mailbox()).await.unwrap_err();

        assert_eq!(err.category(), crate::ErrorCategory::Connection);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_mailbox_invokes_no_rule() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (backend, counters) = backend(0, Vec::new(), FetchBehavior::Messages);
        let retriever = Retriever::new(backend, "netflix.com", 10).with_engine(
            ExtractionEngine::with_rules(vec![Box::new(RecordingRule {
                seen: Arc::clone(&seen),
            })]),
        );

        let err = retriever.retrieve(&mailbox()).await.unwrap_err();

        assert!(matches!(err, Error::NoMatch));
        assert!(seen.lock().unwrap().is_empty());
        assert!(counters.requested.lock().unwrap().is_none());
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inspects_at_most_window_newest_first() {
        let messages: Vec<RawMessage> = (1..=25)
            .map(|seq| email(seq, "info@netflix.com", "Welcome aboard"))
            .collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (backend, counters) = backend(25, messages, FetchBehavior::Messages);
        let retriever = Retriever::new(backend, "netflix.com", 10).with_engine(
            ExtractionEngine::with_rules(vec![Box::new(RecordingRule {
                seen: Arc::clone(&seen),
            })]),
        );

        assert!(retriever.retrieve(&mailbox()).await.is_err());

        let seen = seen.lock().unwrap();
        let expected: Vec<String> = (16..=25).rev().map(|seq| format!("uid-{seq}")).collect();
        assert_eq!(*seen, expected);
        assert_eq!(
            *counters.requested.lock().unwrap(),
            Some(SequenceWindow { start: 16, end: 25 })
        );
    }

    #[tokio::test]
    async fn test_opens_one_session_per_request() {
        let (backend, counters) = backend(
            1,
            vec![email(1, "info@netflix.com", "Your code is 4821")],
            FetchBehavior::Messages,
        );
        let retriever = Retriever::new(backend, "netflix.com", 10);

        retriever.retrieve(&mailbox()).await.unwrap();
        retriever.retrieve(&mailbox()).await.unwrap();

        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }
}
