//! Issue reference expansion.
//!
//! Turns `owner/repo#N` in observed chat text into an `m.notice` of the form
//! `"<url> : <title>"`.
//!
//! Expansion is **fail-open**: if the issue cannot be resolved the host gets
//! nothing back and the conversation carries on untouched.

use regex::Regex;
use tracing::{debug, instrument};

use crate::detect::{find_references, reference_pattern};
use crate::resolve::ReferenceResolver;
use crate::transport::ChatMessage;

/// A text pattern a service wants the host to call it for.
#[derive(Debug, Clone, Copy)]
pub struct Expansion {
    pub pattern: &'static Regex,
}

impl Expansion {
    /// The issue reference expansion.
    pub fn issue_references() -> Self {
        Self {
            pattern: reference_pattern(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Resolves the first issue reference in a piece of text.
#[derive(Clone)]
pub struct ExpansionEngine {
    resolver: ReferenceResolver,
}

impl ExpansionEngine {
    pub fn new(resolver: ReferenceResolver) -> Self {
        Self { resolver }
    }

    /// Expand the first reference found in `text`.
    ///
    /// Later references in the same text are left alone: one expansion per
    /// invocation.
    #[instrument(skip(self, text))]
    pub async fn expand(&self, room_id: &str, text: &str) -> Option<ChatMessage> {
        let reference = find_references(text).next()?;
        debug!(reference = %reference, "Expanding issue reference");

        let summary = self.resolver.resolve(&reference).await?;
        Some(ChatMessage::notice(format!(
            "{} : {}",
            summary.url, summary.title
        )))
    }
}
