//! Issue reference detection in chat text.
//!
//! Finds short-form references such as `octocat/Hello-World#123` and turns
//! them into [`IssueReference`] values.

use regex::{Captures, Regex};
use std::fmt;
use std::sync::OnceLock;

/// A parsed `owner/repo#number` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueReference {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// Repository in `owner/repo` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for IssueReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Compiled reference pattern.
///
/// Owner and repo are runs of ASCII alphanumerics, `-` and `_`; the number
/// is a run of ASCII digits.
pub fn reference_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_-]+)/([A-Za-z0-9_-]+)#([0-9]+)")
            .expect("issue reference regex is valid")
    })
}

/// Lazily yield every reference in `text`, left to right.
///
/// Candidates whose number does not fit in a `u64` are skipped.
pub fn find_references(text: &str) -> impl Iterator<Item = IssueReference> + '_ {
    reference_pattern()
        .captures_iter(text)
        .filter_map(|cap| reference_from_captures(&cap))
}

/// First reference in `text`, if any.
pub fn parse_reference(text: &str) -> Option<IssueReference> {
    find_references(text).next()
}

fn reference_from_captures(cap: &Captures<'_>) -> Option<IssueReference> {
    let number = cap[3].parse::<u64>().ok()?;
    Some(IssueReference::new(&cap[1], &cap[2], number))
}
