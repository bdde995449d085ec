//! # mail-code-relay
//!
//! HTTP service that reads the newest messages of a registered mailbox and
//! hands back the one-time verification code or account-update link they contain.
//!
//! A request names an email address. The relay:
//!
//! 1. validates the address and resolves it to an enabled account in the registry
//! 2. opens one short-lived session (IMAP, optionally through SOCKS5, or the Gmail API)
//! 3. fetches the ten most recent messages in a single bounded operation
//! 4. decodes each one newest first, skipping anything not from the expected sender
//! 5. applies ordered extraction rules and stops at the first hit
//! 6. closes the session, whatever happened
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_code_relay::{CodeRelay, JsonAccountRegistry, ServiceConfig};
//! use mail_code_relay::extract::Extracted;
//! use std::sync::Arc;
//!
//! # async fn example() -> mail_code_relay::Result<()> {
//! let config = ServiceConfig::builder()
//!     .accounts_file("data/email-accounts.json")
//!     .build()?;
//! let registry = Arc::new(JsonAccountRegistry::load(&config.accounts_file)?);
//! let relay = CodeRelay::from_config(config, registry)?;
//!
//! match relay.fetch_code("viewer@gmail.com").await?.extracted {
//!     Extracted::Code(code) => println!("code {code}"),
//!     Extracted::Link(link) => println!("link {link}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Serving HTTP
//!
//! ```no_run
//! use mail_code_relay::server::{self, AppState};
//! use mail_code_relay::{CodeRelay, JsonAccountRegistry, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::from_env()?;
//! let registry = Arc::new(JsonAccountRegistry::load(&config.accounts_file)?);
//! let bind_addr = config.bind_addr;
//! let app = server::router(AppState::new(Arc::new(CodeRelay::from_config(config, registry)?)));
//!
//! let listener = tokio::net::TcpListener::bind(bind_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every [`Error`] belongs to one [`ErrorCategory`], which decides the HTTP
//! status: validation 400, not registered 403, nothing found 404, anything
//! talking to the mail store 500.
//!
//! ```
//! use mail_code_relay::{Error, ErrorCategory};
//!
//! assert_eq!(Error::NotRegistered.category(), ErrorCategory::NotRegistered);
//! assert_eq!(Error::NoMatch.category(), ErrorCategory::NotFound);
//! ```
//!
//! ## Observability
//!
//! All I/O steps emit `tracing` spans with structured fields.
//!
//! ### Span Naming Convention
//!
//! - `server::fetch_code` - one HTTP request
//! - `CodeRelay::fetch_code` - validation, lookup and deadline
//! - `Retriever::retrieve` - one mailbox session
//! - `connection::establish` - TCP/TLS connection
//! - `connection::socks5` - SOCKS5 tunnel
//! - `session::authenticate` - IMAP login
//! - `session::select` - inbox selection
//! - `fetcher::fetch_recent` - the bounded window fetch
//! - `gmail::access_token`, `gmail::list_recent`, `gmail::fetch_window` - Gmail API path
//!
//! Credentials never appear in span fields or `Debug` output.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod decoder;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod gmail;
pub mod mailbox;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod response;
pub mod retriever;
pub mod server;

// Internal modules
mod connection;
mod session;

// Re-exports for ergonomic API
pub use config::{
    Backend, GmailApiConfig, MailboxConfig, MailboxConfigBuilder, ServiceConfig,
    ServiceConfigBuilder, TimeoutConfig, MAX_WINDOW,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use extract::{Extracted, Finding};
pub use gmail::GmailApiBackend;
pub use mailbox::{MailBackend, MailboxSession, RawMessage, SequenceWindow, SessionGuard};
pub use provider::Provider;
pub use proxy::{ProxyAuth, Socks5Proxy};
pub use registry::{resolve_account, Account, AccountRegistry, ImapEndpoint, JsonAccountRegistry};
pub use retriever::{CodeRelay, Retriever};
pub use session::ImapBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let _ = MailboxConfig::builder();
        let _ = ServiceConfig::builder();
        let _ = Socks5Proxy::new("localhost", 1080);
        let _ = extract::ExtractionEngine::standard("netflix.com");
        let _ = ImapBackend::new();
    }
}
