//! Reply text for the URL plugins.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::registry::UrlRecord;

/// IRC colour code for red; the same code closes the highlight.
const HIGHLIGHT: &str = "\x0304";

/// Shown when an HTML page has no usable `<title>`.
pub const NO_TITLE: &str = "(no title)";

/// "Someone else posted this first" marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepostAnnotation {
    pub original_user: String,
    pub first_seen_at: DateTime<Utc>,
}

impl RepostAnnotation {
    /// Annotation for `poster` reposting `record`'s URL. Reposting your own
    /// link is not flagged.
    pub fn for_repost(record: &UrlRecord, poster: &str) -> Option<Self> {
        if record.user == poster {
            return None;
        }
        Some(Self {
            original_user: record.user.clone(),
            first_seen_at: record.first_seen_at,
        })
    }
}

impl fmt::Display for RepostAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " - {HIGHLIGHT}OLD! Originally posted by {} on {}{HIGHLIGHT}",
            self.original_user,
            self.first_seen_at.format("%d.%m.%Y"),
        )
    }
}

/// `"{label} - {display_url}{annotation}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub label: String,
    pub display_url: String,
    pub repost: Option<RepostAnnotation>,
}

impl OutboundReply {
    /// `label` of `None` (an untitled page) renders as [`NO_TITLE`].
    pub fn new(label: Option<&str>, display_url: String, repost: Option<RepostAnnotation>) -> Self {
        Self {
            label: label.unwrap_or(NO_TITLE).to_string(),
            display_url,
            repost,
        }
    }
}

impl fmt::Display for OutboundReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.label, self.display_url)?;
        if let Some(repost) = &self.repost {
            write!(f, "{repost}")?;
        }
        Ok(())
    }
}

/// Drop mIRC colour/format codes, for logs and comparisons.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x03' => {
                // Up to two foreground digits, then optionally ",bg" digits.
                for _ in 0..2 {
                    if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                        break;
                    }
                }
                let mut lookahead = chars.clone();
                if lookahead.next() == Some(',') && lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                    chars.next();
                    for _ in 0..2 {
                        if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                            break;
                        }
                    }
                }
            }
            '\x02' | '\x0f' | '\x16' | '\x1d' | '\x1f' => {}
            c => out.push(c),
        }
    }
    out
}
