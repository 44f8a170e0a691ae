//! Services and the registry that hosts them.
//!
//! A [`Service`] is one configured integration. It exposes a fixed set of
//! capabilities to the host: the rooms it serves, a webhook handler and text
//! expansions. [`ServiceRegistry`] maps type tags to constructors and service
//! ids to live instances.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::client::GitHubClient;
use crate::config::{BridgeConfig, ServiceConfig};
use crate::error::{BridgeError, DecodeError, Result};
use crate::expand::{Expansion, ExpansionEngine};
use crate::resolve::{IssueLookup, ReferenceResolver};
use crate::router::{RoutingReport, WebhookRouter};
use crate::subscription::SubscriptionTable;
use crate::transport::{ChatMessage, ChatTransport};
use crate::webhook::{self, WebhookRequest};

/// Type tag of [`GitHubService`].
pub const GITHUB_SERVICE_TYPE: &str = "github";

/// Capabilities every integration provides to the host.
#[async_trait]
pub trait Service: Send + Sync {
    fn service_id(&self) -> &str;

    fn service_type(&self) -> &'static str;

    /// Account the service delivers messages as.
    fn service_user_id(&self) -> &str;

    /// Rooms currently subscribed to this service.
    fn room_ids(&self) -> Vec<String>;

    /// Decode and route one webhook delivery.
    ///
    /// Only a decode failure is an error; per-room delivery failures are in
    /// the report.
    async fn handle_webhook(
        &self,
        request: &WebhookRequest<'_>,
    ) -> std::result::Result<RoutingReport, DecodeError>;

    /// Patterns the host should call [`Service::expand`] for.
    fn expansions(&self) -> Vec<Expansion>;

    /// Expand observed text in `room_id`, if the service has something to say.
    async fn expand(&self, room_id: &str, text: &str) -> Option<ChatMessage>;
}

/// Shared collaborators handed to service constructors.
#[derive(Clone)]
pub struct ServiceContext {
    pub transport: Arc<dyn ChatTransport>,
    /// Issue lookup override; when unset each service builds a GitHub client
    /// from its own token.
    pub lookup: Option<Arc<dyn IssueLookup>>,
}

impl ServiceContext {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn IssueLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }
}

/// Builds a service of one type from its configuration.
pub type ServiceFactory = fn(&ServiceConfig, &ServiceContext) -> Result<Arc<dyn Service>>;

/// GitHub integration: repository webhooks in, issue expansions out.
pub struct GitHubService {
    id: String,
    user_id: String,
    webhook_secret: Option<String>,
    subscriptions: RwLock<Arc<SubscriptionTable>>,
    router: WebhookRouter,
    engine: ExpansionEngine,
}

impl GitHubService {
    pub fn new(config: &ServiceConfig, context: &ServiceContext) -> Result<Self> {
        let lookup: Arc<dyn IssueLookup> = match &context.lookup {
            Some(lookup) => lookup.clone(),
            None => Arc::new(GitHubClient::new(config.github_token.clone())?),
        };

        Ok(Self {
            id: config.id.clone(),
            user_id: config.user_id.clone(),
            webhook_secret: config.webhook_secret.clone(),
            subscriptions: RwLock::new(Arc::new(config.rooms.clone())),
            router: WebhookRouter::new(context.transport.clone()),
            engine: ExpansionEngine::new(ReferenceResolver::new(lookup)),
        })
    }

    fn factory(config: &ServiceConfig, context: &ServiceContext) -> Result<Arc<dyn Service>> {
        Ok(Arc::new(Self::new(config, context)?))
    }

    /// Current subscription snapshot. Later replacements do not affect it.
    pub fn subscriptions(&self) -> Arc<SubscriptionTable> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new subscription table.
    pub fn replace_subscriptions(&self, table: SubscriptionTable) {
        *self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
        debug!(service_id = %self.id, "Replaced subscription table");
    }
}

#[async_trait]
impl Service for GitHubService {
    fn service_id(&self) -> &str {
        &self.id
    }

    fn service_type(&self) -> &'static str {
        GITHUB_SERVICE_TYPE
    }

    fn service_user_id(&self) -> &str {
        &self.user_id
    }

    fn room_ids(&self) -> Vec<String> {
        self.subscriptions().room_ids()
    }

    async fn handle_webhook(
        &self,
        request: &WebhookRequest<'_>,
    ) -> std::result::Result<RoutingReport, DecodeError> {
        let event = webhook::decode(request, self.webhook_secret.as_deref())?;
        let table = self.subscriptions();
        Ok(self.router.route(&table, &event).await)
    }

    fn expansions(&self) -> Vec<Expansion> {
        vec![Expansion::issue_references()]
    }

    async fn expand(&self, room_id: &str, text: &str) -> Option<ChatMessage> {
        self.engine.expand(room_id, text).await
    }
}

/// Type tag → constructor, and service id → live service.
pub struct ServiceRegistry {
    context: ServiceContext,
    factories: HashMap<&'static str, ServiceFactory>,
    services: DashMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    /// Registry with no service types known.
    pub fn empty(context: ServiceContext) -> Self {
        Self {
            context,
            factories: HashMap::new(),
            services: DashMap::new(),
        }
    }

    /// Registry that knows every built-in service type.
    pub fn new(context: ServiceContext) -> Self {
        let mut registry = Self::empty(context);
        registry.register_factory(GITHUB_SERVICE_TYPE, GitHubService::factory);
        registry
    }

    pub fn register_factory(&mut self, service_type: &'static str, factory: ServiceFactory) {
        self.factories.insert(service_type, factory);
    }

    /// Construct and register a service from its configuration.
    pub fn register(&self, config: &ServiceConfig) -> Result<Arc<dyn Service>> {
        let factory = self
            .factories
            .get(config.service_type.as_str())
            .ok_or_else(|| BridgeError::UnknownServiceType(config.service_type.clone()))?;

        // The entry holds the shard lock, so the id check and the insert
        // are one step for concurrent registrations.
        let service = match self.services.entry(config.id.clone()) {
            Entry::Occupied(_) => return Err(BridgeError::DuplicateService(config.id.clone())),
            Entry::Vacant(slot) => {
                let service = factory(config, &self.context)?;
                slot.insert(service.clone());
                service
            }
        };
        info!(
            service_id = %config.id,
            service_type = %config.service_type,
            rooms = service.room_ids().len(),
            "Registered service"
        );
        Ok(service)
    }

    /// Register every service in `config`.
    pub fn load(&self, config: &BridgeConfig) -> Result<()> {
        for service in &config.services {
            self.register(service)?;
        }
        Ok(())
    }

    pub fn deregister(&self, service_id: &str) -> Option<Arc<dyn Service>> {
        let removed = self.services.remove(service_id).map(|(_, service)| service);
        if removed.is_some() {
            info!(service_id, "Deregistered service");
        }
        removed
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<dyn Service>> {
        self.services.get(service_id).map(|entry| entry.value().clone())
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.services.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Offer observed text to a service.
    ///
    /// The service is only invoked when one of its expansion patterns
    /// matches. Errors if the service does not exist.
    pub async fn expand(
        &self,
        service_id: &str,
        room_id: &str,
        text: &str,
    ) -> Result<Option<ChatMessage>> {
        let service = self
            .get(service_id)
            .ok_or_else(|| BridgeError::ServiceNotFound(service_id.to_string()))?;

        if !service.expansions().iter().any(|e| e.matches(text)) {
            return Ok(None);
        }
        Ok(service.expand(room_id, text).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::IssueReference;
    use crate::resolve::tests::StaticLookup;
    use crate::resolve::IssueSummary;
    use crate::router::tests::RecordingTransport;
    use serde_json::json;

    fn service_config(id: &str) -> ServiceConfig {
        ServiceConfig {
            id: id.to_string(),
            service_type: GITHUB_SERVICE_TYPE.to_string(),
            user_id: "@bridge:example.org".to_string(),
            webhook_secret: None,
            github_token: None,
            rooms: SubscriptionTable::from_iter([
                ("!roomA", vec!["issue"]),
                ("!roomB", vec!["push"]),
            ]),
        }
    }

    fn context(transport: Arc<RecordingTransport>) -> ServiceContext {
        let lookup = StaticLookup::default().with(
            IssueReference::new("octocat", "Hello-World", 1),
            IssueSummary::new("http://x/1", "Fix bug"),
        );
        ServiceContext::new(transport).with_lookup(Arc::new(lookup))
    }

    fn issues_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": "opened",
            "issue": { "number": 5, "title": "T", "html_url": "https://github.com/o/r/issues/5" },
            "sender": { "login": "u" },
            "repository": { "full_name": "o/r" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_routes_through_service() {
        let transport = Arc::new(RecordingTransport::default());
        let registry = ServiceRegistry::new(context(transport.clone()));
        let service = registry.register(&service_config("gh")).unwrap();

        let body = issues_body();
        let request = WebhookRequest {
            event: Some("issues"),
            body: &body,
            ..Default::default()
        };
        let report = service.handle_webhook(&request).await.unwrap();

        assert_eq!(report.delivered, vec!["!roomA".to_string()]);
        assert_eq!(transport.sent_rooms(), vec!["!roomA"]);
    }

    #[tokio::test]
    async fn test_decode_error_routes_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let registry = ServiceRegistry::new(context(transport.clone()));
        let mut config = service_config("gh");
        config.webhook_secret = Some("s3cret".into());
        let service = registry.register(&config).unwrap();

        let body = issues_body();
        let request = WebhookRequest {
            event: Some("issues"),
            signature_256: Some("sha256=00"),
            body: &body,
            ..Default::default()
        };
        let err = service.handle_webhook(&request).await.unwrap_err();

        assert_eq!(err.status, 403);
        assert!(transport.attempted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replaced_subscriptions_apply_to_next_pass() {
        let transport = Arc::new(RecordingTransport::default());
        let service =
            GitHubService::new(&service_config("gh"), &context(transport.clone())).unwrap();

        let before = service.subscriptions();
        service.replace_subscriptions(SubscriptionTable::new().with_room("!roomC", ["issue"]));

        assert!(before.is_subscribed("!roomA", "issue"));
        assert_eq!(service.room_ids(), vec!["!roomC".to_string()]);

        let body = issues_body();
        let request = WebhookRequest {
            event: Some("issues"),
            body: &body,
            ..Default::default()
        };
        service.handle_webhook(&request).await.unwrap();
        assert_eq!(transport.sent_rooms(), vec!["!roomC"]);
    }

    #[tokio::test]
    async fn test_registry_expand() {
        let transport = Arc::new(RecordingTransport::default());
        let registry = ServiceRegistry::new(context(transport));
        registry.register(&service_config("gh")).unwrap();

        let msg = registry
            .expand("gh", "!roomA", "see octocat/Hello-World#1 for details")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.body, "http://x/1 : Fix bug");

        assert!(registry
            .expand("gh", "!roomA", "nothing to see")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            registry.expand("missing", "!roomA", "a/b#1").await,
            Err(BridgeError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_registry_lifecycle() {
        let registry = ServiceRegistry::new(context(Arc::new(RecordingTransport::default())));
        let service = registry.register(&service_config("gh")).unwrap();

        assert_eq!(service.service_id(), "gh");
        assert_eq!(service.service_type(), "github");
        assert_eq!(service.service_user_id(), "@bridge:example.org");
        let mut rooms = service.room_ids();
        rooms.sort();
        assert_eq!(rooms, vec!["!roomA", "!roomB"]);

        assert!(matches!(
            registry.register(&service_config("gh")),
            Err(BridgeError::DuplicateService(_))
        ));
        assert_eq!(registry.service_ids(), vec!["gh".to_string()]);

        assert!(registry.deregister("gh").is_some());
        assert!(registry.get("gh").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_registration_keeps_one_service() {
        let registry = ServiceRegistry::new(context(Arc::new(RecordingTransport::default())));

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.register(&service_config("gh"))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BridgeError::DuplicateService(id) if id == "gh")));
        assert!(Arc::ptr_eq(winners[0], &registry.get("gh").unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let registry = ServiceRegistry::new(context(Arc::new(RecordingTransport::default())));
        let original = registry.register(&service_config("gh")).unwrap();

        let mut replacement = service_config("gh");
        replacement.user_id = "@other:example.org".to_string();
        assert!(matches!(
            registry.register(&replacement),
            Err(BridgeError::DuplicateService(_))
        ));

        let live = registry.get("gh").unwrap();
        assert!(Arc::ptr_eq(&original, &live));
        assert_eq!(live.service_user_id(), "@bridge:example.org");
    }

    #[test]
    fn test_unknown_service_type() {
        let registry = ServiceRegistry::new(context(Arc::new(RecordingTransport::default())));
        let mut config = service_config("x");
        config.service_type = "gitlab".into();
        assert!(matches!(
            registry.register(&config),
            Err(BridgeError::UnknownServiceType(t)) if t == "gitlab"
        ));
    }

    #[test]
    fn test_empty_registry_knows_no_types() {
        let registry = ServiceRegistry::empty(context(Arc::new(RecordingTransport::default())));
        assert!(registry.register(&service_config("gh")).is_err());
    }
}
