//! Error types for the mail-code-relay crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Every error belongs to exactly one [`ErrorCategory`], which is what crosses the
//! HTTP boundary - see [`Error::category`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving an account or reading its mailbox.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Input / configuration errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Request did not carry an email address.
    #[error("email address is required")]
    MissingEmail,

    /// Request body was not the expected JSON.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// What was wrong with the body.
        message: String,
    },

    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Account registry errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Address is absent from the registry or its account is disabled.
    ///
    /// The two cases are deliberately not distinguished.
    #[error("email address is not registered")]
    NotRegistered,

    /// Accounts file could not be read.
    #[error("failed to read accounts file {path}")]
    RegistryRead {
        /// Path of the accounts file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Accounts file is not valid JSON of the expected shape.
    #[error("failed to parse accounts file {path}")]
    RegistryParse {
        /// Path of the accounts file.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect via SOCKS5 proxy.
    #[error("failed to connect via SOCKS5 proxy {proxy_host} to {target}")]
    Socks5Connect {
        /// The SOCKS5 proxy hostname.
        proxy_host: String,
        /// The target address.
        target: String,
        /// The underlying SOCKS5 error.
        #[source]
        source: tokio_socks::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The email address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Mailbox selection timeout.
    #[error("mailbox selection timeout for '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Recent-window fetch timeout.
    #[error("message fetch timeout for sequence range {range} after {timeout:?}")]
    FetchTimeout {
        /// The sequence range being fetched.
        range: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The overall request deadline elapsed before the pipeline finished.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The email address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch command failed.
    #[error("IMAP fetch failed for sequence range {range}")]
    ImapFetch {
        /// The sequence range that failed.
        range: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to read a message from the fetch response.
    #[error("failed to fetch message from stream")]
    FetchMessage {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Vendor mail API errors
    // ─────────────────────────────────────────────────────────────────────────
    /// HTTP request to the mail API failed in transport.
    #[error("mail API request to {endpoint} failed")]
    ApiRequest {
        /// The endpoint that was called.
        endpoint: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// Mail API answered with a non-success status.
    #[error("mail API {endpoint} returned status {status}")]
    ApiStatus {
        /// The endpoint that was called.
        endpoint: String,
        /// HTTP status code returned.
        status: u16,
    },

    /// Mail API returned a payload that could not be decoded.
    #[error("mail API returned an unreadable payload: {message}")]
    ApiPayload {
        /// Description of what was wrong with the payload.
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Email parsing errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse email message.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Search result
    // ─────────────────────────────────────────────────────────────────────────
    /// No message in the scanned window yielded a code or link.
    #[error("no matching email found")]
    NoMatch,
}

impl Error {
    /// Returns the category this error is reported under.
    ///
    /// The category decides the HTTP status and whether any detail is shown
    /// to the caller.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MissingEmail
            | Error::MalformedRequest { .. }
            | Error::InvalidEmailFormat { .. } => ErrorCategory::Validation,

            Error::NotRegistered => ErrorCategory::NotRegistered,

            Error::FetchTimeout { .. } => ErrorCategory::FetchTimeout,

            Error::NoMatch => ErrorCategory::NotFound,

            Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::RegistryRead { .. }
            | Error::RegistryParse { .. }
            | Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::Socks5Connect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::LogoutTimeout { .. }
            | Error::RequestTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. }
            | Error::ImapLogout { .. }
            | Error::ApiRequest { .. }
            | Error::ApiStatus { .. }
            | Error::ApiPayload { .. }
            | Error::ParseEmail { .. } => ErrorCategory::Connection,
        }
    }
}

/// Error categories reported across the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or missing input.
    Validation,
    /// Account absent or disabled.
    NotRegistered,
    /// Transport, authentication or protocol failure talking to the mail store.
    Connection,
    /// The bounded fetch step ran out of time.
    ///
    /// The pipeline degrades this to an empty window, so callers see [`NotFound`](Self::NotFound).
    FetchTimeout,
    /// Mailbox reachable, nothing matched in the scanned window.
    NotFound,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::NotRegistered => write!(f, "not_registered"),
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::FetchTimeout => write!(f, "fetch_timeout"),
            ErrorCategory::NotFound => write!(f, "not_found"),
        }
    }
}
