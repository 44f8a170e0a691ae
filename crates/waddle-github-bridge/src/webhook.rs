//! GitHub webhook decoding.
//!
//! Verifies the delivery signature, refines the `X-GitHub-Event` type into
//! the names rooms subscribe to, and renders the notification text.
//!
//! | Header event | Routed as |
//! |---|---|
//! | `push` | `push` |
//! | `issues` | `issue` |
//! | `issue_comment` | `issue_comment` |
//! | `pull_request` | `pull_request` |
//! | `pull_request_review_comment` | `pull_request_review_comment` |
//! | `ping` | `ping` |

use hmac::{Hmac, Mac};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::DecodeError;
use crate::transport::ChatMessage;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Raw inputs of one webhook delivery, as lifted off the HTTP request.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookRequest<'a> {
    /// `X-GitHub-Event`
    pub event: Option<&'a str>,
    /// `X-Hub-Signature` (`sha1=<hex>`)
    pub signature: Option<&'a str>,
    /// `X-Hub-Signature-256` (`sha256=<hex>`)
    pub signature_256: Option<&'a str>,
    pub body: &'a [u8],
}

/// A decoded webhook, ready for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_type: String,
    /// Repository full name (`owner/repo`).
    pub repository: String,
    pub message: ChatMessage,
}

/// Decode a webhook delivery.
///
/// When `secret` is set and non-empty the payload must carry a valid
/// signature; the SHA-256 header wins over the legacy SHA-1 one.
pub fn decode(request: &WebhookRequest<'_>, secret: Option<&str>) -> Result<WebhookEvent, DecodeError> {
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        verify_signature(request, secret.as_bytes())?;
    }

    let event = request
        .event
        .filter(|e| !e.is_empty())
        .ok_or_else(|| DecodeError::bad_request("Missing X-GitHub-Event header"))?;

    let (event_type, repository, body) = match event {
        "push" => {
            let p: PushEvent = parse(request.body)?;
            let body = render_push(&p);
            ("push", p.repository.full_name, body)
        }
        "issues" => {
            let p: IssuesEvent = parse(request.body)?;
            let body = format!(
                "[{}] {} {} issue #{}: {} - {}",
                p.repository.full_name,
                p.sender.login,
                p.action,
                p.issue.number,
                p.issue.title,
                p.issue.html_url
            );
            ("issue", p.repository.full_name, body)
        }
        "issue_comment" => {
            let p: IssueCommentEvent = parse(request.body)?;
            let body = format!(
                "[{}] {} commented on issue #{}: {} - {}",
                p.repository.full_name,
                p.sender.login,
                p.issue.number,
                p.issue.title,
                p.comment.html_url
            );
            ("issue_comment", p.repository.full_name, body)
        }
        "pull_request" => {
            let p: PullRequestEvent = parse(request.body)?;
            let body = format!(
                "[{}] {} {} pull request #{}: {} [{}] - {}",
                p.repository.full_name,
                p.sender.login,
                p.action,
                p.pull_request.number,
                p.pull_request.title,
                p.pull_request.state,
                p.pull_request.html_url
            );
            ("pull_request", p.repository.full_name, body)
        }
        "pull_request_review_comment" => {
            let p: ReviewCommentEvent = parse(request.body)?;
            let body = format!(
                "[{}] {} commented on pull request #{}: {} - {}",
                p.repository.full_name,
                p.sender.login,
                p.pull_request.number,
                p.pull_request.title,
                p.comment.html_url
            );
            ("pull_request_review_comment", p.repository.full_name, body)
        }
        "ping" => {
            let p: PingEvent = parse(request.body)?;
            let repository = p.repository.map(|r| r.full_name).unwrap_or_default();
            let body = format!("[{}] webhook configured: {}", repository, p.zen);
            ("ping", repository, body)
        }
        other => {
            return Err(DecodeError::bad_request(format!(
                "Unsupported event type: {other}"
            )))
        }
    };

    Ok(WebhookEvent {
        event_type: event_type.to_string(),
        repository,
        message: ChatMessage::notice(body),
    })
}

fn verify_signature(request: &WebhookRequest<'_>, secret: &[u8]) -> Result<(), DecodeError> {
    let valid = if let Some(sig) = request.signature_256 {
        let hex_sig = sig.strip_prefix("sha256=").unwrap_or(sig);
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| DecodeError::new(500, "Invalid webhook secret"))?;
        mac.update(request.body);
        hex::decode(hex_sig).is_ok_and(|expected| mac.verify_slice(&expected).is_ok())
    } else if let Some(sig) = request.signature {
        let hex_sig = sig.strip_prefix("sha1=").unwrap_or(sig);
        let mut mac = HmacSha1::new_from_slice(secret)
            .map_err(|_| DecodeError::new(500, "Invalid webhook secret"))?;
        mac.update(request.body);
        hex::decode(hex_sig).is_ok_and(|expected| mac.verify_slice(&expected).is_ok())
    } else {
        return Err(DecodeError::forbidden("Missing webhook signature"));
    };

    if valid {
        Ok(())
    } else {
        Err(DecodeError::forbidden("Webhook signature mismatch"))
    }
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(body)
        .map_err(|e| DecodeError::bad_request(format!("Malformed webhook payload: {e}")))
}

fn render_push(p: &PushEvent) -> String {
    let branch = p.git_ref.strip_prefix("refs/heads/").unwrap_or(&p.git_ref);
    let pusher = p
        .pusher
        .as_ref()
        .map(|u| u.name.as_str())
        .unwrap_or(p.sender.login.as_str());
    let count = p.commits.len();
    let noun = if count == 1 { "commit" } else { "commits" };
    format!(
        "[{}] {} pushed {} {} to {}: {}",
        p.repository.full_name, pusher, count, noun, branch, p.compare
    )
}

// === Payload shapes (only the fields we render) ===

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Pusher {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    compare: String,
    #[serde(default)]
    commits: Vec<IgnoredAny>,
    pusher: Option<Pusher>,
    sender: User,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: u64,
    title: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct IssuesEvent {
    action: String,
    issue: Issue,
    sender: User,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct Comment {
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct IssueCommentEvent {
    issue: Issue,
    comment: Comment,
    sender: User,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    title: String,
    state: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: String,
    pull_request: PullRequest,
    sender: User,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct ReviewCommentEvent {
    pull_request: PullRequest,
    comment: Comment,
    sender: User,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct PingEvent {
    #[serde(default)]
    zen: String,
    repository: Option<Repository>,
}
