//! MIME decoding and the sender gate.
//!
//! Turns a [`RawMessage`] into a [`DecodedMessage`]: subject, sender address,
//! a plain-text rendering of the body and, when present, the raw HTML part.
//! Messages that cannot be parsed or that come from outside the expected
//! sender domain are reported as such and never reach the extraction rules.

use crate::error::{Error, Result};
use crate::mailbox::RawMessage;
use crate::provider::domain_of;
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(style|script|head)\b.*?</(style|script|head)\s*>").expect("valid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A parsed message, ready for extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Identifier carried over from the raw message.
    pub id: String,
    /// Decoded `Subject` header, empty if absent.
    pub subject: String,
    /// First address of the `From` header, empty if absent or unparseable.
    pub sender: String,
    /// Plain-text body. Derived from the HTML part when there is no text part.
    pub text: String,
    /// Raw HTML part, if the message has one.
    pub html: Option<String>,
}

/// Outcome of decoding one message.
#[derive(Debug)]
pub enum Decoded {
    /// Parsed, and from the expected sender.
    Message(DecodedMessage),
    /// Parsed, but from some other domain.
    ForeignSender {
        /// The sender address that failed the gate.
        sender: String,
    },
    /// Could not be parsed; skipped.
    Unreadable,
}

/// Decodes raw messages and applies the sender gate.
#[derive(Debug, Clone)]
pub struct Decoder {
    sender_domain: String,
}

impl Decoder {
    /// Creates a decoder accepting mail from `sender_domain` and its subdomains.
    #[must_use]
    pub fn new(sender_domain: impl Into<String>) -> Self {
        Self {
            sender_domain: sender_domain.into().to_ascii_lowercase(),
        }
    }

    /// Decodes `raw`. Never fails: unreadable messages are reported as [`Decoded::Unreadable`].
    pub fn decode(&self, raw: &RawMessage) -> Decoded {
        let message = match parse_message(&raw.id, &raw.body) {
            Ok(message) => message,
            Err(e) => {
                warn!(id = %raw.id, error = %e, "Failed to parse email, skipping message");
                return Decoded::Unreadable;
            }
        };

        if !sender_in_domain(&message.sender, &self.sender_domain) {
            debug!(id = %raw.id, sender = %message.sender, "Sender outside expected domain");
            return Decoded::ForeignSender {
                sender: message.sender,
            };
        }

        Decoded::Message(message)
    }
}

/// Parses an RFC 822 message without applying the sender gate.
///
/// # Errors
///
/// Returns [`Error::ParseEmail`] if the message structure cannot be parsed.
pub fn parse_message(id: &str, bytes: &[u8]) -> Result<DecodedMessage> {
    let parsed = mailparse::parse_mail(bytes).map_err(|source| Error::ParseEmail { source })?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .unwrap_or_default()
        .trim()
        .to_string();
    let sender = parsed
        .headers
        .get_first_header("From")
        .and_then(|header| mailparse::addrparse_header(header).ok())
        .and_then(|list| {
            list.iter().find_map(|addr| match addr {
                MailAddr::Single(info) => Some(info.addr.clone()),
                MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
            })
        })
        .unwrap_or_default();

    let mut plain = None;
    let mut html = None;
    collect_bodies(&parsed, &mut plain, &mut html);

    let text = match plain {
        Some(plain) if !plain.trim().is_empty() => plain,
        _ => html.as_deref().map(html_to_text).unwrap_or_default(),
    };

    Ok(DecodedMessage {
        id: id.to_string(),
        subject,
        sender,
        text,
        html,
    })
}

/// Walks the MIME tree and keeps the first inline text/plain and text/html parts.
fn collect_bodies(part: &ParsedMail<'_>, plain: &mut Option<String>, html: &mut Option<String>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_bodies(sub, plain, html);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }

    let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/plain" => plain,
        "text/html" => html,
        _ => return,
    };
    if slot.is_some() {
        return;
    }

    match part.get_body() {
        Ok(body) => *slot = Some(body),
        Err(e) => debug!(mimetype = %part.ctype.mimetype, error = %e, "Unreadable body part"),
    }
}

/// Renders HTML as plain text.
///
/// Tags become spaces, the common entities are decoded and whitespace runs
/// collapse to a single space. Style, script and head blocks are dropped whole.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let stripped = HIDDEN_BLOCKS.replace_all(html, " ");
    let stripped = TAG.replace_all(&stripped, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Returns `true` if the address's domain is `domain` or a subdomain of it.
#[must_use]
pub fn sender_in_domain(sender: &str, domain: &str) -> bool {
    if !sender.contains('@') || domain.is_empty() {
        return false;
    }
    let sender_domain = domain_of(sender).trim_end_matches('>').to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    sender_domain == domain
        || sender_domain
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}
