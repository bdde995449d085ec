//! Account registry: which addresses may use the relay, and how to reach their mailboxes.
//!
//! The registry is a keyed lookup the core treats as opaque. The bundled
//! implementation reads a JSON file of the form:
//!
//! ```json
//! {
//!   "accounts": [
//!     {
//!       "email": "viewer@gmail.com",
//!       "password": "abcd efgh ijkl mnop",
//!       "provider": "gmail",
//!       "imap": { "host": "imap.gmail.com", "port": 993, "secure": true },
//!       "enabled": true
//!     }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use crate::provider::Provider;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// IMAP endpoint of an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImapEndpoint {
    /// Server hostname. May be empty, in which case the provider default is used.
    #[serde(default)]
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether the connection is wrapped in TLS.
    #[serde(default = "default_secure")]
    pub secure: bool,
}

impl Default for ImapEndpoint {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            secure: default_secure(),
        }
    }
}

fn default_port() -> u16 {
    993
}

fn default_secure() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

/// A registered account. Immutable once loaded.
#[derive(Clone)]
pub struct Account {
    email: String,
    password: SecretString,
    /// Mailbox provider.
    pub provider: Provider,
    /// IMAP connection parameters.
    pub imap: ImapEndpoint,
    /// Disabled accounts are invisible to lookups.
    pub enabled: bool,
}

impl Account {
    /// Creates an enabled account.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        provider: Provider,
        imap: ImapEndpoint,
    ) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
            provider,
            imap,
            enabled: true,
        }
    }

    /// Returns a copy of this account with the enabled flag set.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the account's address as stored.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the stored credential.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("provider", &self.provider)
            .field("imap", &self.imap)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Deserialize)]
struct AccountRecord {
    email: String,
    password: String,
    #[serde(default)]
    provider: Option<Provider>,
    #[serde(default)]
    imap: ImapEndpoint,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        let provider = record
            .provider
            .unwrap_or_else(|| Provider::detect(&record.email));
        Account::new(record.email, record.password, provider, record.imap)
            .with_enabled(record.enabled)
    }
}

#[derive(Deserialize)]
struct AccountFile {
    #[serde(default)]
    accounts: Vec<AccountRecord>,
}

/// Lookup of registered accounts by address.
pub trait AccountRegistry: Send + Sync {
    /// Returns the account registered under `email`, compared case-insensitively.
    ///
    /// Implementations return disabled accounts too; [`resolve_account`] filters them.
    /// When an address is registered more than once, an enabled record wins.
    fn find(&self, email: &str) -> Option<Account>;
}

/// Resolves an address to an enabled account.
///
/// Absent and disabled accounts both yield [`Error::NotRegistered`], so callers
/// cannot tell which addresses exist.
///
/// # Errors
///
/// Returns [`Error::NotRegistered`] if no enabled account matches.
pub fn resolve_account(registry: &dyn AccountRegistry, email: &str) -> Result<Account> {
    match registry.find(email.trim()) {
        Some(account) if account.enabled => Ok(account),
        Some(_) => {
            debug!("Account is disabled");
            Err(Error::NotRegistered)
        }
        None => Err(Error::NotRegistered),
    }
}

/// Registry held in memory, loaded once from a JSON accounts file.
#[derive(Debug, Clone, Default)]
pub struct JsonAccountRegistry {
    accounts: Vec<Account>,
}

impl JsonAccountRegistry {
    /// Creates a registry from already-built accounts.
    #[must_use]
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    /// Parses a registry from the JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryParse`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: AccountFile =
            serde_json::from_str(json).map_err(|source| Error::RegistryParse {
                path: "<inline>".into(),
                source,
            })?;
        Ok(Self::from_accounts(
            file.accounts.into_iter().map(Account::from).collect(),
        ))
    }

    /// Loads the registry from a file.
    ///
    /// A missing file yields an empty registry, so every lookup is "not registered".
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %shown, "Accounts file not found, registry is empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(Error::RegistryRead {
                    path: shown,
                    source,
                })
            }
        };

        let file: AccountFile =
            serde_json::from_str(&json).map_err(|source| Error::RegistryParse {
                path: shown.clone(),
                source,
            })?;

        let registry = Self::from_accounts(file.accounts.into_iter().map(Account::from).collect());
        info!(
            path = %shown,
            accounts = registry.len(),
            enabled = registry.accounts.iter().filter(|a| a.enabled).count(),
            "Loaded account registry"
        );
        Ok(registry)
    }

    /// Number of accounts, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if the registry holds no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountRegistry for JsonAccountRegistry {
    fn find(&self, email: &str) -> Option<Account> {
        let mut matching = self
            .accounts
            .iter()
            .filter(|account| account.email.eq_ignore_ascii_case(email));
        let first = matching.next()?;
        if first.enabled {
            return Some(first.clone());
        }
        Some(matching.find(|account| account.enabled).unwrap_or(first).clone())
    }
}
