//! Reference resolution.
//!
//! [`IssueLookup`] is the seam to the issue tracker. Lookups report an
//! explicit [`Resolution`]; [`ReferenceResolver`] decides what to do with
//! each outcome (log and drop on anything but success).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::detect::IssueReference;
use crate::error::ResolveError;

/// Human readable summary of an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSummary {
    pub url: String,
    pub title: String,
}

impl IssueSummary {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Outcome of a single lookup.
#[derive(Debug)]
pub enum Resolution {
    /// The item exists.
    Resolved(IssueSummary),
    /// The tracker answered, but there is no such item.
    Absent,
    /// The lookup could not be completed.
    Failed(ResolveError),
}

/// Something that can fetch issue summaries.
#[async_trait]
pub trait IssueLookup: Send + Sync {
    async fn fetch_issue(&self, reference: &IssueReference) -> Resolution;
}

/// Applies the drop-and-log policy on top of an [`IssueLookup`].
#[derive(Clone)]
pub struct ReferenceResolver {
    lookup: Arc<dyn IssueLookup>,
}

impl ReferenceResolver {
    pub fn new(lookup: Arc<dyn IssueLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve a reference. Never fails: anything other than
    /// [`Resolution::Resolved`] is logged and becomes `None`.
    pub async fn resolve(&self, reference: &IssueReference) -> Option<IssueSummary> {
        match self.lookup.fetch_issue(reference).await {
            Resolution::Resolved(summary) => Some(summary),
            Resolution::Absent => {
                debug!(
                    owner = %reference.owner,
                    repo = %reference.repo,
                    number = reference.number,
                    "Referenced issue does not exist"
                );
                None
            }
            Resolution::Failed(e) => {
                warn!(
                    error = %e,
                    owner = %reference.owner,
                    repo = %reference.repo,
                    number = reference.number,
                    "Failed to fetch issue"
                );
                None
            }
        }
    }
}
