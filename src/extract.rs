//! Code and link extraction from decoded messages.
//!
//! Extraction is an ordered list of [`Rule`]s; the first rule that returns a
//! value wins. The standard order, from most to least specific:
//!
//! 1. [`LinkRule`]: an account-update link on the expected domain.
//! 2. [`KeywordCodeRule`]: a 4-8 digit code right after a trigger word.
//! 3. [`ContextualCodeRule`]: a standalone 4-8 digit run with a corroborating
//!    word nearby, excluding years, dates and small numbers.
//! 4. [`MarkupCodeRule`]: a 4-8 digit run that is the whole text of an HTML element.
//!
//! ```
//! use mail_code_relay::decoder::DecodedMessage;
//! use mail_code_relay::extract::{ExtractionEngine, Extracted};
//!
//! let engine = ExtractionEngine::standard("netflix.com");
//! let message = DecodedMessage {
//!     text: "Your verification code is 583021, expires in 15 minutes.".into(),
//!     ..Default::default()
//! };
//! assert_eq!(
//!     engine.classify(&message).map(|(value, _)| value),
//!     Some(Extracted::Code("583021".into()))
//! );
//! ```

use crate::decoder::DecodedMessage;
use chrono::NaiveDate;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::debug;

static KEYWORD_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:code|verification|enter|use|your)\b[\s:]*(?:(?:is|was|below|here)\b[\s:]*)?(\d{4,8})\b",
    )
    .expect("valid regex")
});

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4,8}\b").expect("valid regex"));

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:19|20)\d{2}$").expect("valid regex"));

static MARKUP_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s*(\d{4,8})\s*<").expect("valid regex"));

/// Characters inspected on each side of a standalone digit run.
const CONTEXT_RADIUS: usize = 50;

/// Words that make a nearby standalone digit run look like a code.
const CONTEXT_WORDS: [&str; 5] = ["code", "verification", "enter", "minutes", "expires"];

/// Standalone runs at or below this value are rejected.
const MIN_CODE_VALUE: u64 = 1000;

/// What a message yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// A numeric verification code.
    Code(String),
    /// An account-update link.
    Link(String),
}

impl Extracted {
    /// The extracted code or URL.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Extracted::Code(value) | Extracted::Link(value) => value,
        }
    }
}

/// A successful extraction, tied to the message it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// The code or link.
    pub extracted: Extracted,
    /// Subject of the source message.
    pub subject: String,
    /// Identifier of the source message.
    pub message_id: String,
    /// Description of the rule that matched.
    pub rule: &'static str,
}

/// One extraction heuristic.
pub trait Rule: Send + Sync {
    /// Returns a value if this rule recognizes one in `message`.
    fn apply(&self, message: &DecodedMessage) -> Option<Extracted>;

    /// Human-readable description, used in logs and [`Finding::rule`].
    fn description(&self) -> &'static str;
}

/// Account-update links on the expected domain.
///
/// Searches the plain text first, then the raw HTML with `&amp;` unescaped,
/// since links often live only in `href` attributes.
#[derive(Debug, Clone)]
pub struct LinkRule {
    regex: Regex,
}

impl LinkRule {
    /// Creates a rule for links on `domain` (optionally `www.`-prefixed).
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern cannot be compiled (should not happen: the domain is escaped).
    #[must_use]
    pub fn new(domain: &str) -> Self {
        let pattern = format!(
            r#"(?i)https?://(?:www\.)?{}/account/(?:update-primary|set-primary)[^\s"'<>]*"#,
            regex::escape(domain)
        );
        Self {
            regex: Regex::new(&pattern).expect("valid regex"),
        }
    }

    fn find(&self, haystack: &str) -> Option<String> {
        self.regex.find(haystack).map(|m| {
            m.as_str()
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')'))
                .to_string()
        })
    }
}

impl Rule for LinkRule {
    fn apply(&self, message: &DecodedMessage) -> Option<Extracted> {
        self.find(&message.text)
            .or_else(|| {
                let html = message.html.as_deref()?;
                let unescaped: Cow<'_, str> = if html.contains("&amp;") {
                    Cow::Owned(html.replace("&amp;", "&"))
                } else {
                    Cow::Borrowed(html)
                };
                self.find(&unescaped)
            })
            .map(Extracted::Link)
    }

    fn description(&self) -> &'static str {
        "account-update link"
    }
}

/// A code immediately following a trigger word, as in "code: 4821" or
/// "Your verification code is 583021".
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordCodeRule;

impl Rule for KeywordCodeRule {
    fn apply(&self, message: &DecodedMessage) -> Option<Extracted> {
        KEYWORD_CODE
            .captures(&message.text)
            .and_then(|caps| caps.get(1))
            .map(|m| Extracted::Code(m.as_str().to_string()))
    }

    fn description(&self) -> &'static str {
        "code after trigger word"
    }
}

/// A standalone digit run with a corroborating word within
/// 50 characters on either side.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualCodeRule;

impl Rule for ContextualCodeRule {
    fn apply(&self, message: &DecodedMessage) -> Option<Extracted> {
        let text = message.text.as_str();
        DIGIT_RUN
            .find_iter(text)
            .filter(|m| is_plausible_code(text, m.start(), m.end()))
            .find(|m| has_context(text, m.start(), m.end()))
            .map(|m| Extracted::Code(m.as_str().to_string()))
    }

    fn description(&self) -> &'static str {
        "standalone code with context"
    }
}

/// A digit run that is the entire text content of an HTML element.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupCodeRule;

impl Rule for MarkupCodeRule {
    fn apply(&self, message: &DecodedMessage) -> Option<Extracted> {
        let html = message.html.as_deref()?;
        MARKUP_CODE
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .find(|m| is_plausible_code(html, m.start(), m.end()))
            .map(|m| Extracted::Code(m.as_str().to_string()))
    }

    fn description(&self) -> &'static str {
        "code in markup"
    }
}

/// Rejects years, date fragments and small numbers.
fn is_plausible_code(text: &str, start: usize, end: usize) -> bool {
    let digits = &text[start..end];
    !YEAR.is_match(digits)
        && !is_date_like(text, start, end)
        && digits.parse::<u64>().is_ok_and(|value| value > MIN_CODE_VALUE)
}

/// A run joined to another number by a date separator ("2025-03-14",
/// "14.03.2025"), or an eight-digit run that reads as a valid `YYYYMMDD`.
fn is_date_like(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let is_separator = |b: u8| matches!(b, b'-' | b'/' | b'.');

    let joined_before = start >= 2 && is_separator(bytes[start - 1]) && bytes[start - 2].is_ascii_digit();
    let joined_after =
        end + 1 < bytes.len() && is_separator(bytes[end]) && bytes[end + 1].is_ascii_digit();
    if joined_before || joined_after {
        return true;
    }

    let digits = &text[start..end];
    if digits.len() != 8 {
        return false;
    }
    let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
    match (field(0..4), field(4..6), field(6..8)) {
        (Some(year), Some(month), Some(day)) => {
            (1900..=2099).contains(&year)
                && i32::try_from(year)
                    .ok()
                    .and_then(|year| NaiveDate::from_ymd_opt(year, month, day))
                    .is_some()
        }
        _ => false,
    }
}

/// Looks for a context word within `CONTEXT_RADIUS` characters either side of `start..end`.
fn has_context(text: &str, start: usize, end: usize) -> bool {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_RADIUS - 1)
        .map_or(0, |(index, _)| index);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_RADIUS)
        .map_or(text.len(), |(index, _)| end + index);
    let window = text[from..to].to_lowercase();
    CONTEXT_WORDS.iter().any(|word| window.contains(word))
}
