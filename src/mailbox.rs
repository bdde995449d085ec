//! Mail store abstraction shared by the IMAP and Gmail API retrieval paths.
//!
//! A [`MailBackend`] opens a [`MailboxSession`] for one account. The session
//! knows how many messages the inbox holds and can fetch a contiguous
//! [`SequenceWindow`] of them in a single call. [`SessionGuard`] makes sure the
//! session is closed on every exit path.

use crate::config::MailboxConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

/// A message as it came off the wire, before any parsing.
#[derive(Clone)]
pub struct RawMessage {
    /// Position in the inbox (1-based, oldest first).
    pub sequence: u32,
    /// Stable identifier reported back to the caller (IMAP UID or API message id).
    pub id: String,
    /// Date the store received the message, if it reported one.
    pub date: Option<DateTime<Utc>>,
    /// Full RFC 822 message.
    pub body: Vec<u8>,
}

impl std::fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawMessage")
            .field("sequence", &self.sequence)
            .field("id", &self.id)
            .field("date", &self.date)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Inclusive range of sequence positions, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceWindow {
    /// First position, at least 1.
    pub start: u32,
    /// Last position, the newest message in the window.
    pub end: u32,
}

impl SequenceWindow {
    /// The `size` most recent positions of a mailbox holding `total` messages.
    ///
    /// Returns `None` for an empty mailbox or a zero size.
    #[must_use]
    pub fn latest(total: u32, size: usize) -> Option<Self> {
        if total == 0 || size == 0 {
            return None;
        }
        let size = u32::try_from(size).unwrap_or(u32::MAX);
        let start = total.saturating_sub(size - 1).max(1);
        Some(Self { start, end: total })
    }

    /// Number of positions in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// Always `false`; a window holds at least one position.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `sequence` falls inside the window.
    #[must_use]
    pub fn contains(&self, sequence: u32) -> bool {
        (self.start..=self.end).contains(&sequence)
    }
}

impl std::fmt::Display for SequenceWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// An open, inbox-selected connection to a mail store.
#[async_trait]
pub trait MailboxSession: Send {
    /// Number of messages in the inbox when it was selected.
    fn total(&self) -> u32;

    /// Fetches every message in `window`, headers and full body, in one round trip.
    async fn fetch(&mut self, window: SequenceWindow) -> Result<Vec<RawMessage>>;

    /// Ends the session. Called exactly once per session.
    async fn close(&mut self) -> Result<()>;
}

/// Opens mailbox sessions.
#[async_trait]
pub trait MailBackend: Send + Sync {
    /// Connects, authenticates and selects the inbox.
    ///
    /// Implementations apply the connect and auth timeouts from `config`, and
    /// never return a half-open session on failure.
    async fn open(&self, config: &MailboxConfig) -> Result<Box<dyn MailboxSession>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Owns an open session and closes it on every exit path.
///
/// Call [`close`](Self::close) on the normal path. If the guard is dropped
/// while the session is still open (for example because the request deadline
/// cancelled the pipeline), the close is spawned onto the current tokio
/// runtime instead.
pub struct SessionGuard {
    inner: Option<Box<dyn MailboxSession>>,
    logout_timeout: Duration,
}

impl SessionGuard {
    /// Wraps an open session.
    #[must_use]
    pub fn new(session: Box<dyn MailboxSession>, logout_timeout: Duration) -> Self {
        Self {
            inner: Some(session),
            logout_timeout,
        }
    }

    /// Returns the guarded session.
    ///
    /// # Panics
    ///
    /// Never in practice: the session is only taken by [`close`](Self::close),
    /// which consumes the guard, or by `Drop`.
    pub fn session(&mut self) -> &mut dyn MailboxSession {
        self.inner
            .as_deref_mut()
            .expect("session present until the guard is consumed")
    }

    /// Closes the session under the logout timeout and consumes the guard.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails or times out. The session is gone
    /// either way.
    pub async fn close(mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut session) => close_with_timeout(session.as_mut(), self.logout_timeout).await,
            None => Ok(()),
        }
    }
}

async fn close_with_timeout(session: &mut dyn MailboxSession, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, session.close())
        .await
        .map_err(|_| Error::LogoutTimeout { timeout })?
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.inner.take() {
            let logout_timeout = self.logout_timeout;

            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        match close_with_timeout(session.as_mut(), logout_timeout).await {
                            Ok(()) => debug!("Abandoned session closed"),
                            Err(e) => warn!(error = %e, "Abandoned session close failed"),
                        }
                    });
                }
                Err(_) => {
                    warn!(
                        "SessionGuard dropped outside of tokio runtime context. \
                         Connection will be closed without a proper logout."
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("open", &self.inner.is_some())
            .field("logout_timeout", &self.logout_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MailboxSession for CountingSession {
        fn total(&self) -> u32 {
            0
        }

        async fn fetch(&mut self, _window: SequenceWindow) -> Result<Vec<RawMessage>> {
            Ok(Vec::new())
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn guard(closes: &Arc<AtomicUsize>) -> SessionGuard {
        SessionGuard::new(
            Box::new(CountingSession {
                closes: Arc::clone(closes),
            }),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_window_latest() {
        assert_eq!(SequenceWindow::latest(0, 10), None);
        assert_eq!(
            SequenceWindow::latest(3, 10),
            Some(SequenceWindow { start: 1, end: 3 })
        );
        assert_eq!(
            SequenceWindow::latest(36_000, 10),
            Some(SequenceWindow {
                start: 35_991,
                end: 36_000
            })
        );
        assert_eq!(
            SequenceWindow::latest(10, 10),
            Some(SequenceWindow { start: 1, end: 10 })
        );
    }

    #[test]
    fn test_window_len_and_display() {
        let window = SequenceWindow::latest(36_000, 10).unwrap();
        assert_eq!(window.len(), 10);
        assert_eq!(window.to_string(), "35991:36000");
        assert!(window.contains(36_000));
        assert!(!window.contains(35_990));
    }

    #[tokio::test]
    async fn test_explicit_close_runs_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        guard(&closes).close().await.unwrap();

        tokio::task::yield_now().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_spawns_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        drop(guard(&closes));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_outside_runtime_does_not_panic() {
        let closes = Arc::new(AtomicUsize::new(0));
        drop(guard(&closes));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }
}
