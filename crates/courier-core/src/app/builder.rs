//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! Every collaborator is injected here; anything left unset gets the
//! in-memory default. `build()` validates the configuration and checks that
//! every expected kind has a handler, so a missing registration fails at
//! start-up rather than as a dead letter in production.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use super::engine::{Engine, EngineInner};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{ActionKind, Decider};
use crate::impls::{
    BroadcastEventSink, FanoutEventSink, InMemoryDeadLetterSink, InMemoryJobStore,
    TracingEventSink, WindowRateLimiter,
};
use crate::ports::{
    AuditLog, Clock, DeadLetterSink, EventSink, IdGenerator, JobStore, RateLimiter, SystemClock,
    UlidGenerator,
};
use crate::typed::{Action, DynHandler, Handler, HandlerRegistry, RegistryError};

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing handlers for kinds {0:?}; these kinds were expected but not registered")]
    MissingKinds(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .config(EngineConfig::with_presets())
///     .register::<SendDm, _>(DmHandler::new(client))?
///     .expect_kinds(&[ActionKind::SEND_DM])
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    registry: HandlerRegistry,
    expected_kinds: Option<Vec<String>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    store: Option<(Arc<dyn JobStore>, Arc<dyn AuditLog>)>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    limiter: Option<Arc<dyn RateLimiter>>,
    event_sinks: Vec<Arc<dyn EventSink>>,
    decider: Option<Arc<dyn Decider>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: HandlerRegistry::new(),
            expected_kinds: None,
            clock: None,
            ids: None,
            store: None,
            dead_letters: None,
            limiter: None,
            event_sinks: Vec::new(),
            decider: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Job store plus the audit log it writes to.
    pub fn store(mut self, store: Arc<dyn JobStore>, audit: Arc<dyn AuditLog>) -> Self {
        self.store = Some((store, audit));
        self
    }

    pub fn dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Extra sink next to the built-in tracing and broadcast sinks.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sinks.push(sink);
        self
    }

    /// Override the per-kind backoff decider for every kind.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn register<A: Action, H: Handler<A> + 'static>(mut self, handler: H) -> Result<Self, RegistryError> {
        self.registry.register::<A, H>(handler)?;
        Ok(self)
    }

    pub fn register_dyn(mut self, handler: Arc<dyn DynHandler>) -> Result<Self, RegistryError> {
        self.registry.register_dyn(handler)?;
        Ok(self)
    }

    /// Kinds that must have a handler by the time `build()` runs.
    pub fn expect_kinds(mut self, kinds: &[&str]) -> Self {
        self.expected_kinds = Some(kinds.iter().map(|k| k.to_string()).collect());
        self
    }

    fn default_limiter(config: &EngineConfig, registry: &HandlerRegistry, clock: Arc<dyn Clock>) -> WindowRateLimiter {
        let mut limiter = WindowRateLimiter::new(clock);
        for (kind, kind_config) in &config.kinds {
            if let Some(quota) = kind_config.quota {
                limiter = limiter.with_quota(kind.as_str(), quota);
            }
        }
        // kinds without their own entry inherit the default quota
        if let Some(quota) = config.default_kind.quota {
            for kind in registry.kinds() {
                if !config.kinds.contains_key(&kind) {
                    limiter = limiter.with_quota(kind.as_str(), quota);
                }
            }
        }
        if let Some(quota) = config.global_quota {
            limiter = limiter.with_global_quota(quota);
        }
        limiter
    }

    /// 検証してから Engine を生成
    pub fn build(self) -> Result<Engine, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_kinds {
            let missing: Vec<String> = expected
                .iter()
                .filter(|kind| !self.registry.contains(&ActionKind::new(kind.as_str())))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingKinds(missing));
            }
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let (store, audit) = match self.store {
            Some(pair) => pair,
            None => {
                let store = InMemoryJobStore::new(Arc::clone(&clock), ids)
                    .with_priority_cap(self.config.priority_cap);
                let audit: Arc<dyn AuditLog> = store.audit_log();
                let store: Arc<dyn JobStore> = Arc::new(store);
                (store, audit)
            }
        };

        let limiter: Arc<dyn RateLimiter> = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(Self::default_limiter(&self.config, &self.registry, Arc::clone(&clock))),
        };

        let status_feed = BroadcastEventSink::new(self.config.event_buffer);
        let mut events = FanoutEventSink::new()
            .with(Arc::new(TracingEventSink))
            .with(Arc::new(status_feed.clone()));
        for sink in self.event_sinks {
            events = events.with(sink);
        }

        Ok(Engine::from_inner(EngineInner {
            config: self.config,
            store,
            audit,
            dead_letters: self
                .dead_letters
                .unwrap_or_else(|| Arc::new(InMemoryDeadLetterSink::new())),
            limiter,
            events: Arc::new(events),
            status_feed,
            registry: Arc::new(self.registry),
            decider: self.decider,
            clock,
            paused: RwLock::new(HashSet::new()),
            started: AtomicBool::new(false),
        }))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::actions::{SendDm, WebhookDelivery};
    use crate::typed::handler::test_support::{EchoDmHandler, RejectingWebhookHandler};

    #[test]
    fn build_success() {
        let engine = EngineBuilder::new()
            .register::<SendDm, _>(EchoDmHandler)
            .unwrap()
            .expect_kinds(&[SendDm::KIND])
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn build_missing_kinds() {
        let engine = EngineBuilder::new()
            .register::<SendDm, _>(EchoDmHandler)
            .unwrap()
            .expect_kinds(&[SendDm::KIND, WebhookDelivery::KIND])
            .build();
        assert!(matches!(
            engine,
            Err(BuildError::MissingKinds(missing)) if missing == vec![WebhookDelivery::KIND.to_string()]
        ));
    }

    #[test]
    fn build_without_expectations() {
        let engine = EngineBuilder::new()
            .register::<WebhookDelivery, _>(RejectingWebhookHandler)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn invalid_config_fails_the_build() {
        let mut config = EngineConfig::default();
        config.stale_grace_factor = 0.0;
        let engine = EngineBuilder::new().config(config).build();
        assert!(matches!(engine, Err(BuildError::Config(_))));
    }

    #[test]
    fn duplicate_registration_surfaces_immediately() {
        let result = EngineBuilder::new()
            .register::<SendDm, _>(EchoDmHandler)
            .unwrap()
            .register::<SendDm, _>(EchoDmHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }
}
