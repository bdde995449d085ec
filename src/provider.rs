//! Mail provider detection and default IMAP hosts.
//!
//! Account records carry an explicit IMAP host, but records written by hand
//! sometimes leave it blank. The provider (or failing that the address's
//! domain) fills the gap.
//!
//! ```
//! use mail_code_relay::provider::{Provider, discover_imap_host};
//!
//! assert_eq!(Provider::detect("someone@hotmail.com"), Provider::Outlook);
//! assert_eq!(discover_imap_host("someone@gmail.com"), "imap.gmail.com");
//! assert_eq!(discover_imap_host("someone@example.org"), "imap.example.org");
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Map of email domains to the provider that hosts them.
static KNOWN_DOMAINS: LazyLock<HashMap<&'static str, Provider>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    m.insert("gmail.com", Provider::Gmail);
    m.insert("googlemail.com", Provider::Gmail);

    m.insert("outlook.com", Provider::Outlook);
    m.insert("hotmail.com", Provider::Outlook);
    m.insert("live.com", Provider::Outlook);

    m.insert("yahoo.com", Provider::Yahoo);

    m
});

/// Hosting provider of an account's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Mail.
    Gmail,
    /// Microsoft Outlook / Hotmail / Live.
    Outlook,
    /// Yahoo Mail.
    Yahoo,
    /// Anything else; the host must come from the record or the domain.
    #[default]
    Custom,
}

impl Provider {
    /// Detects the provider from an email address's domain.
    #[must_use]
    pub fn detect(email: &str) -> Self {
        let domain = domain_of(email).to_lowercase();
        KNOWN_DOMAINS
            .get(domain.as_str())
            .copied()
            .unwrap_or(Provider::Custom)
    }

    /// Returns the provider's IMAP host, if it has a well-known one.
    #[must_use]
    pub fn default_imap_host(self) -> Option<&'static str> {
        match self {
            Provider::Gmail => Some("imap.gmail.com"),
            Provider::Outlook => Some("outlook.office365.com"),
            Provider::Yahoo => Some("imap.mail.yahoo.com"),
            Provider::Custom => None,
        }
    }
}

/// Discovers the IMAP hostname for an email address.
///
/// Known providers map to their published host; anything else falls back to
/// `imap.{domain}`.
#[must_use]
pub fn discover_imap_host(email: &str) -> String {
    match Provider::detect(email).default_imap_host() {
        Some(host) => host.to_string(),
        None => format!("imap.{}", domain_of(email).to_lowercase()),
    }
}

/// Returns the part after the last `@`, or the whole input if there is none.
pub(crate) fn domain_of(email: &str) -> &str {
    email.rsplit_once('@').map_or(email, |(_, domain)| domain)
}
