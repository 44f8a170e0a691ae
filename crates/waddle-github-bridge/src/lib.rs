//! Waddle GitHub Bridge
//!
//! Connects GitHub repository webhooks to chat rooms, and expands inline
//! `owner/repo#N` references in chat into `"<url> : <title>"` notices.
//!
//! ## Webhooks
//!
//! ```text
//! POST /services/hooks/{service_id}
//!   -> webhook::decode        (signature, event type, rendered message)
//!   -> WebhookRouter::route   (rooms subscribed to the event type)
//!   -> ChatTransport::deliver (one call per room, failures isolated)
//! ```
//!
//! ## Expansions
//!
//! ```text
//! "see octocat/Hello-World#1"
//!   -> detect::find_references (first match only)
//!   -> ReferenceResolver       (GitHub issues API, fail-open)
//!   -> "https://github.com/octocat/Hello-World/issues/1 : Fix bug"
//! ```
//!
//! Services are created from configuration through a [`ServiceRegistry`],
//! which maps a type tag (`"github"`) to a constructor.

pub mod client;
pub mod config;
pub mod detect;
pub mod error;
pub mod expand;
pub mod resolve;
pub mod router;
pub mod service;
pub mod subscription;
pub mod transport;
pub mod webhook;

pub use client::GitHubClient;
pub use config::{load_config_from, load_config_from_str, BridgeConfig, ServiceConfig};
pub use detect::{find_references, parse_reference, reference_pattern, IssueReference};
pub use error::{BridgeError, ConfigError, DecodeError, DeliveryError, ResolveError};
pub use expand::{Expansion, ExpansionEngine};
pub use resolve::{IssueLookup, IssueSummary, ReferenceResolver, Resolution};
pub use router::{RoutingReport, WebhookRouter};
pub use service::{
    GitHubService, Service, ServiceContext, ServiceFactory, ServiceRegistry, GITHUB_SERVICE_TYPE,
};
pub use subscription::SubscriptionTable;
pub use transport::{ChatMessage, ChatTransport, MatrixTransport};
pub use webhook::{WebhookEvent, WebhookRequest};
