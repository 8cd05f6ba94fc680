use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::domain::{Inquiry, InquiryId, InquirySubmission};

pub const SUBJECT_MAX_CHARS: usize = 500;
pub const BODY_MAX_CHARS: usize = 10_000;
pub const CANONICAL_MAX_CHARS: usize = 10_500;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").expect("url pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("email pattern")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static SENDER_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("sender email pattern")
});

/// Validation errors raised while admitting a submission.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("subject and body are empty after normalization")]
    EmptyText,
    #[error("subject exceeds {max} characters (found {found})")]
    SubjectTooLong { max: usize, found: usize },
    #[error("body exceeds {max} characters (found {found})")]
    BodyTooLong { max: usize, found: usize },
    #[error("'{value}' is not a valid sender email address")]
    InvalidSenderEmail { value: String },
}

/// Canonical classifier input: one bounded string with the subject prefix
/// boundary retained so scorers can weight subject matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalText {
    text: String,
    subject_len: usize,
}

impl CanonicalText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn subject(&self) -> &str {
        &self.text[..self.subject_len]
    }

    pub fn body(&self) -> &str {
        self.text[self.subject_len..].trim_start()
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Produces canonical text from raw subject and body.
///
/// Steps, in order: strip HTML tags, mask URLs as `<URL>`, mask email
/// addresses as `<EMAIL>`, collapse whitespace runs, trim, then bound the
/// total length by truncating the body tail while preserving the subject
/// prefix.
pub fn canonicalize(subject: &str, body: &str) -> Result<CanonicalText, IntakeError> {
    let subject = clean_fragment(subject);
    let body = clean_fragment(body);

    if subject.is_empty() && body.is_empty() {
        return Err(IntakeError::EmptyText);
    }

    let subject = truncate_chars(&subject, CANONICAL_MAX_CHARS);
    let subject_chars = subject.chars().count();

    if body.is_empty() {
        let subject_len = subject.len();
        return Ok(CanonicalText {
            text: subject,
            subject_len,
        });
    }
    if subject.is_empty() {
        return Ok(CanonicalText {
            text: truncate_chars(&body, CANONICAL_MAX_CHARS),
            subject_len: 0,
        });
    }

    let budget = CANONICAL_MAX_CHARS.saturating_sub(subject_chars + 1);
    let subject_len = subject.len();
    let mut text = subject;
    if budget > 0 {
        text.push(' ');
        text.push_str(&truncate_chars(&body, budget));
    }

    Ok(CanonicalText { text, subject_len })
}

fn clean_fragment(raw: &str) -> String {
    let stripped = HTML_TAG.replace_all(raw, " ");
    let masked = URL.replace_all(&stripped, "<URL>");
    let masked = EMAIL.replace_all(&masked, "<EMAIL>");
    WHITESPACE.replace_all(&masked, " ").trim().to_string()
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => value[..index].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// Guard producing stored [`Inquiry`] records from inbound submissions.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard;

impl IntakeGuard {
    /// Validate a submission and convert it into an unprocessed inquiry plus
    /// the canonical text its predictors will consume.
    pub fn admit(
        &self,
        submission: InquirySubmission,
        received_at: DateTime<Utc>,
    ) -> Result<(Inquiry, CanonicalText), IntakeError> {
        let subject_chars = submission.subject.chars().count();
        if subject_chars > SUBJECT_MAX_CHARS {
            return Err(IntakeError::SubjectTooLong {
                max: SUBJECT_MAX_CHARS,
                found: subject_chars,
            });
        }
        let body_chars = submission.body.chars().count();
        if body_chars > BODY_MAX_CHARS {
            return Err(IntakeError::BodyTooLong {
                max: BODY_MAX_CHARS,
                found: body_chars,
            });
        }

        let sender_email = submission.sender_email.trim().to_string();
        if !SENDER_EMAIL.is_match(&sender_email) {
            return Err(IntakeError::InvalidSenderEmail {
                value: submission.sender_email,
            });
        }

        let canonical = canonicalize(&submission.subject, &submission.body)?;

        let inquiry = Inquiry {
            id: InquiryId::generate(),
            subject: submission.subject,
            body: submission.body,
            sender_email,
            sender_name: submission.sender_name,
            metadata: submission.metadata,
            received_at,
            processed: false,
            processing_attempts: 0,
            last_error: None,
            poisoned: false,
        };

        Ok((inquiry, canonical))
    }
}
