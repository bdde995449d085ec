//! Configuration for the relay service and for individual mailbox connections.
//!
//! [`ServiceConfig`] is built once per process (usually with
//! [`ServiceConfig::from_env`]) and injected into the components that need it.
//! [`MailboxConfig`] is built per request from the resolved account:
//!
//! ```
//! use mail_code_relay::MailboxConfig;
//!
//! let config = MailboxConfig::builder()
//!     .email("user@example.com")
//!     .password("abcd efgh ijkl mnop")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.password(), "abcdefghijklmnop");
//! assert_eq!(config.server_address(), "imap.example.com:993");
//! ```

use crate::error::{Error, Result};
use crate::provider::discover_imap_host;
use crate::proxy::Socks5Proxy;
use crate::registry::Account;
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on how many recent messages a single request may inspect.
pub const MAX_WINDOW: usize = 10;

/// Configuration for connecting to one mailbox.
///
/// Note: The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of sensitive credentials.
#[derive(Clone)]
pub struct MailboxConfig {
    email: EmailAddress,
    password: SecretString,
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (default: 993 for IMAPS).
    pub port: u16,
    /// Whether to wrap the connection in TLS.
    pub secure: bool,
    /// Optional SOCKS5 proxy for connection.
    pub proxy: Option<Socks5Proxy>,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("proxy", &self.proxy)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl MailboxConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::default()
    }

    /// Builds the connection configuration for a resolved account.
    ///
    /// Host resolution: the record's host, then the provider default, then
    /// `imap.{domain}`. Proxy and timeouts come from the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the account's address is malformed.
    pub fn for_account(account: &Account, service: &ServiceConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .email(account.email())
            .password(account.password())
            .imap_port(account.imap.port)
            .secure(account.imap.secure)
            .timeouts(service.timeouts.clone());

        let host = account.imap.host.trim();
        if !host.is_empty() {
            builder = builder.imap_host(host);
        } else if let Some(host) = account.provider.default_imap_host() {
            builder = builder.imap_host(host);
        }

        if let Some(proxy) = &service.proxy {
            builder = builder.proxy(proxy.clone());
        }

        builder.build()
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the password as a string slice.
    ///
    /// Use this method when you need to pass the password to authentication.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeout configuration for the individual mailbox operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing the TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for authentication.
    pub auth: Duration,
    /// Timeout for selecting the inbox.
    pub select: Duration,
    /// Timeout for fetching the recent window.
    pub fetch: Duration,
    /// Timeout for the close/logout step.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            auth: Duration::from_secs(10),
            select: Duration::from_secs(10),
            fetch: Duration::from_secs(20),
            logout: Duration::from_secs(5),
        }
    }
}

/// Validates an email address format.
///
/// Returns the validated `EmailAddress` if valid, or an error if invalid.
pub(crate) fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`MailboxConfig`].
#[derive(Debug, Default)]
pub struct MailboxConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    secure: Option<bool>,
    proxy: Option<Socks5Proxy>,
    timeouts: Option<TimeoutConfig>,
}

impl MailboxConfigBuilder {
    /// Sets the email address (required).
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required). Whitespace is stripped on build.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname explicitly.
    ///
    /// If not set, the server is discovered from the email domain.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port. Default is 993.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets whether the connection uses TLS. Default is `true`.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Sets a SOCKS5 proxy for the connection.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .fetch = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<MailboxConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;

        let email = validate_email(email_raw.trim())?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;
        // App passwords are often stored the way they are displayed: "abcd efgh ijkl mnop".
        let password: String = password_raw.chars().filter(|c| !c.is_whitespace()).collect();
        if password.is_empty() {
            return Err(Error::InvalidConfig {
                message: "password is required".into(),
            });
        }

        let host = self
            .imap_host
            .unwrap_or_else(|| discover_imap_host(email.as_str()));

        Ok(MailboxConfig {
            email,
            password: SecretString::from(password),
            host,
            port: self.imap_port.unwrap_or(993),
            secure: self.secure.unwrap_or(true),
            proxy: self.proxy,
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

/// Which retrieval path reads the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Direct IMAP connection using the account's credentials.
    #[default]
    Imap,
    /// Hosted Gmail REST API using OAuth credentials from the environment.
    GmailApi,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imap" => Ok(Backend::Imap),
            "gmail-api" | "gmail_api" | "gmail" => Ok(Backend::GmailApi),
            other => Err(Error::InvalidConfig {
                message: format!("unknown backend '{other}' (expected imap or gmail-api)"),
            }),
        }
    }
}

/// OAuth credentials for the Gmail API retrieval path.
#[derive(Clone)]
pub struct GmailApiConfig {
    /// OAuth client id.
    pub client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    /// Mailbox user to read; `me` means the owner of the refresh token.
    pub user: String,
}

impl GmailApiConfig {
    /// Creates a new Gmail API configuration.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        user: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            refresh_token: SecretString::from(refresh_token.into()),
            user: user
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| "me".to_string()),
        }
    }

    /// Returns the OAuth client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Returns the OAuth refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose_secret()
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let client_id = lookup("GOOGLE_CLIENT_ID")?;
        let client_secret = lookup("GOOGLE_CLIENT_SECRET")?;
        let refresh_token = lookup("GMAIL_REFRESH_TOKEN")?;
        Some(Self::new(
            client_id,
            client_secret,
            refresh_token,
            lookup("GMAIL_USER"),
        ))
    }
}

impl std::fmt::Debug for GmailApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailApiConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Process-wide service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Path of the JSON accounts file.
    pub accounts_file: PathBuf,
    /// Domain a message's sender must belong to before it is inspected.
    pub sender_domain: String,
    /// Number of most recent messages to inspect (1..=[`MAX_WINDOW`]).
    pub window: usize,
    /// Overall deadline for one request.
    pub request_timeout: Duration,
    /// Hide internal error detail from responses.
    pub production: bool,
    /// Retrieval path.
    pub backend: Backend,
    /// Optional SOCKS5 proxy for IMAP connections.
    pub proxy: Option<Socks5Proxy>,
    /// Gmail API credentials, required when `backend` is [`Backend::GmailApi`].
    pub gmail: Option<GmailApiConfig>,
    /// Per-operation timeouts.
    pub timeouts: TimeoutConfig,
}

impl ServiceConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Reads the configuration from `CODE_RELAY_*` and Google OAuth environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unparseable values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(bind) = lookup("CODE_RELAY_BIND") {
            let addr = bind.parse().map_err(|_| Error::InvalidConfig {
                message: format!("CODE_RELAY_BIND is not a socket address: {bind}"),
            })?;
            builder = builder.bind_addr(addr);
        }
        if let Some(path) = lookup("CODE_RELAY_ACCOUNTS_FILE") {
            builder = builder.accounts_file(path);
        }
        if let Some(domain) = lookup("CODE_RELAY_SENDER_DOMAIN") {
            builder = builder.sender_domain(domain);
        }
        if let Some(window) = lookup("CODE_RELAY_WINDOW") {
            builder = builder.window(parse_number("CODE_RELAY_WINDOW", &window)?);
        }
        if let Some(secs) = lookup("CODE_RELAY_REQUEST_TIMEOUT_SECS") {
            builder = builder.request_timeout(parse_secs("CODE_RELAY_REQUEST_TIMEOUT_SECS", &secs)?);
        }

        let mut timeouts = TimeoutConfig::default();
        if let Some(secs) = lookup("CODE_RELAY_CONNECT_TIMEOUT_SECS") {
            timeouts.connect = parse_secs("CODE_RELAY_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("CODE_RELAY_AUTH_TIMEOUT_SECS") {
            timeouts.auth = parse_secs("CODE_RELAY_AUTH_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("CODE_RELAY_FETCH_TIMEOUT_SECS") {
            timeouts.fetch = parse_secs("CODE_RELAY_FETCH_TIMEOUT_SECS", &secs)?;
        }
        builder = builder.timeouts(timeouts);

        if let Some(env) = lookup("CODE_RELAY_ENV") {
            builder = builder.production(env.trim().eq_ignore_ascii_case("production"));
        }
        if let Some(backend) = lookup("CODE_RELAY_BACKEND") {
            builder = builder.backend(backend.parse()?);
        }
        if let Some(proxy) = lookup("CODE_RELAY_SOCKS5_PROXY").filter(|p| !p.trim().is_empty()) {
            builder = builder.proxy(Socks5Proxy::parse(&proxy)?);
        }
        if let Some(gmail) = GmailApiConfig::from_lookup(&lookup) {
            builder = builder.gmail(gmail);
        }

        builder.build()
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| Error::InvalidConfig {
        message: format!("{key} is not a number: {value}"),
    })
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| Error::InvalidConfig {
            message: format!("{key} is not a number of seconds: {value}"),
        })
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    bind_addr: Option<SocketAddr>,
    accounts_file: Option<PathBuf>,
    sender_domain: Option<String>,
    window: Option<usize>,
    request_timeout: Option<Duration>,
    production: bool,
    backend: Backend,
    proxy: Option<Socks5Proxy>,
    gmail: Option<GmailApiConfig>,
    timeouts: Option<TimeoutConfig>,
}

impl ServiceConfigBuilder {
    /// Sets the HTTP bind address. Default is `0.0.0.0:3000`.
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Sets the accounts file path. Default is `data/email-accounts.json`.
    #[must_use]
    pub fn accounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.accounts_file = Some(path.into());
        self
    }

    /// Sets the expected sender domain. Default is `netflix.com`.
    #[must_use]
    pub fn sender_domain(mut self, domain: impl Into<String>) -> Self {
        self.sender_domain = Some(domain.into());
        self
    }

    /// Sets how many recent messages are inspected. Default and maximum is 10.
    #[must_use]
    pub fn window(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    /// Sets the overall request deadline. Default is 30 seconds.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Hides internal error detail from responses when `true`.
    #[must_use]
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Sets the retrieval backend. Default is IMAP.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Routes IMAP connections through a SOCKS5 proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets Gmail API credentials.
    #[must_use]
    pub fn gmail(mut self, gmail: GmailApiConfig) -> Self {
        self.gmail = Some(gmail);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the window is out of range, the sender domain is
    /// empty, or the Gmail backend is selected without credentials.
    pub fn build(self) -> Result<ServiceConfig> {
        let window = self.window.unwrap_or(MAX_WINDOW);
        if window == 0 || window > MAX_WINDOW {
            return Err(Error::InvalidConfig {
                message: format!("window must be between 1 and {MAX_WINDOW}, got {window}"),
            });
        }

        let sender_domain = self
            .sender_domain
            .unwrap_or_else(|| "netflix.com".to_string())
            .trim()
            .trim_start_matches('@')
            .to_ascii_lowercase();
        if sender_domain.is_empty() {
            return Err(Error::InvalidConfig {
                message: "sender domain must not be empty".into(),
            });
        }

        if self.backend == Backend::GmailApi && self.gmail.is_none() {
            return Err(Error::InvalidConfig {
                message: "gmail-api backend requires GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GMAIL_REFRESH_TOKEN".into(),
            });
        }

        Ok(ServiceConfig {
            bind_addr: self
                .bind_addr
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000))),
            accounts_file: self
                .accounts_file
                .unwrap_or_else(|| PathBuf::from("data/email-accounts.json")),
            sender_domain,
            window,
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            production: self.production,
            backend: self.backend,
            proxy: self.proxy,
            gmail: self.gmail,
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use crate::registry::ImapEndpoint;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_mailbox_builder_minimal() {
        let config = MailboxConfig::builder()
            .email("user@example.com")
            .password("secret")
            .build()
            .unwrap();

        assert_eq!(config.email(), "user@example.com");
        assert_eq!(config.password(), "secret");
        assert_eq!(config.port, 993);
        assert!(config.secure);
        assert!(config.proxy.is_none());
        assert_eq!(config.timeouts.connect, Duration::from_secs(10));
        assert_eq!(config.timeouts.fetch, Duration::from_secs(20));
    }

    #[test]
    fn test_mailbox_builder_timeout_overrides() {
        let config = MailboxConfig::builder()
            .email("user@example.com")
            .password("secret")
            .connect_timeout(Duration::from_secs(3))
            .fetch_timeout(Duration::from_secs(7))
            .build()
            .unwrap();

        assert_eq!(config.timeouts.connect, Duration::from_secs(3));
        assert_eq!(config.timeouts.fetch, Duration::from_secs(7));
        assert_eq!(config.timeouts.auth, TimeoutConfig::default().auth);
        assert_eq!(config.timeouts.logout, TimeoutConfig::default().logout);
    }

    #[test]
    fn test_mailbox_builder_strips_password_whitespace() {
        let config = MailboxConfig::builder()
            .email("user@gmail.com")
            .password("abcd efgh\tijkl mnop")
            .build()
            .unwrap();
        assert_eq!(config.password(), "abcdefghijklmnop");
        assert_eq!(config.host, "imap.gmail.com");
    }

    #[test]
    fn test_mailbox_builder_rejects_bad_input() {
        assert!(MailboxConfig::builder().password("secret").build().is_err());
        assert!(MailboxConfig::builder()
            .email("user@example.com")
            .build()
            .is_err());
        assert!(MailboxConfig::builder()
            .email("invalid-email")
            .password("secret")
            .build()
            .is_err());
        assert!(MailboxConfig::builder()
            .email("user@example.com")
            .password("   ")
            .build()
            .is_err());
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = MailboxConfig::builder()
            .email("user@example.com")
            .password("super-secret-password")
            .build()
            .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_for_account_host_resolution() {
        let service = ServiceConfig::builder().build().unwrap();

        let explicit = Account::new(
            "user@outlook.com",
            "pw",
            Provider::Outlook,
            ImapEndpoint {
                host: "mail.custom.net".into(),
                port: 143,
                secure: false,
            },
        );
        let config = MailboxConfig::for_account(&explicit, &service).unwrap();
        assert_eq!(config.server_address(), "mail.custom.net:143");
        assert!(!config.secure);

        let blank = Account::new(
            "user@company.com",
            "pw",
            Provider::Outlook,
            ImapEndpoint::default(),
        );
        let config = MailboxConfig::for_account(&blank, &service).unwrap();
        assert_eq!(config.host, "outlook.office365.com");

        let custom = Account::new(
            "user@company.com",
            "pw",
            Provider::Custom,
            ImapEndpoint::default(),
        );
        let config = MailboxConfig::for_account(&custom, &service).unwrap();
        assert_eq!(config.host, "imap.company.com");
    }

    #[test]
    fn test_for_account_carries_service_proxy_and_timeouts() {
        let service = ServiceConfig::builder()
            .proxy(Socks5Proxy::new("proxy.local", 1080))
            .timeouts(TimeoutConfig {
                fetch: Duration::from_secs(15),
                ..TimeoutConfig::default()
            })
            .build()
            .unwrap();
        let account = Account::new(
            "user@gmail.com",
            "pw",
            Provider::Gmail,
            ImapEndpoint::default(),
        );

        let config = MailboxConfig::for_account(&account, &service).unwrap();
        assert!(config.proxy.is_some());
        assert_eq!(config.timeouts.fetch, Duration::from_secs(15));
    }

    #[test]
    fn test_service_defaults() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.sender_domain, "netflix.com");
        assert_eq!(config.window, MAX_WINDOW);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.production);
        assert_eq!(config.backend, Backend::Imap);
        assert!(config.gmail.is_none());
    }

    #[test]
    fn test_service_from_lookup() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("CODE_RELAY_BIND", "127.0.0.1:8080"),
            ("CODE_RELAY_SENDER_DOMAIN", "@Example.COM"),
            ("CODE_RELAY_WINDOW", "5"),
            ("CODE_RELAY_FETCH_TIMEOUT_SECS", "15"),
            ("CODE_RELAY_ENV", "Production"),
            ("CODE_RELAY_SOCKS5_PROXY", "socks5://proxy.local:1080"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.sender_domain, "example.com");
        assert_eq!(config.window, 5);
        assert_eq!(config.timeouts.fetch, Duration::from_secs(15));
        assert!(config.production);
        assert_eq!(config.proxy.unwrap().address(), "proxy.local:1080");
    }

    #[test]
    fn test_service_rejects_bad_values() {
        assert!(ServiceConfig::from_lookup(lookup_from(&[("CODE_RELAY_WINDOW", "11")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[("CODE_RELAY_WINDOW", "0")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[("CODE_RELAY_BIND", "nope")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[(
            "CODE_RELAY_REQUEST_TIMEOUT_SECS",
            "soon"
        )]))
        .is_err());
    }

    #[test]
    fn test_gmail_backend_requires_credentials() {
        let missing =
            ServiceConfig::from_lookup(lookup_from(&[("CODE_RELAY_BACKEND", "gmail-api")]));
        assert!(missing.is_err());

        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("CODE_RELAY_BACKEND", "gmail-api"),
            ("GOOGLE_CLIENT_ID", "client"),
            ("GOOGLE_CLIENT_SECRET", "shh"),
            ("GMAIL_REFRESH_TOKEN", "refresh"),
        ]))
        .unwrap();
        let gmail = config.gmail.unwrap();
        assert_eq!(gmail.user, "me");
        assert_eq!(gmail.refresh_token(), "refresh");
        assert!(!format!("{gmail:?}").contains("shh"));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("IMAP".parse::<Backend>().unwrap(), Backend::Imap);
        assert_eq!("gmail-api".parse::<Backend>().unwrap(), Backend::GmailApi);
        assert!("pop3".parse::<Backend>().is_err());
    }
}
