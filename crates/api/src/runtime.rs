//! Process wiring: builds the participants this process hosts, starts their
//! consumers and collects their routes.

use std::sync::Arc;

use axum::Router;
use common::{Service, resource};
use events::{Consumer, ConsumerHandle, EventBus, EventError, EventHandler, EventRegistry};
use policy::{CacheConfig, CachedPolicyStorage, HttpPolicySource, PolicyEnforcer, PolicySource};
use saga::{
    AuthzService, EventContext, IdentityService, InMemoryAccountRepository,
    InMemoryInventoryRepository, InMemoryOrderRepository, InMemoryPaymentRepository,
    InMemoryPolicyRepository, InventoryService, OrderService, PaymentService,
};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::routes;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to start {service} consumer: {source}")]
    Consumer {
        service: Service,
        #[source]
        source: EventError,
    },
}

/// Running participants of one process.
pub struct Runtime {
    router: Router,
    consumers: Vec<ConsumerHandle>,
    janitors: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Starts every service named by `config` on `bus`.
    ///
    /// When the authorization service runs in the same process, the other
    /// services' caches read from it directly instead of over HTTP.
    pub async fn start(config: &Config, bus: Arc<dyn EventBus>) -> Result<Self, StartupError> {
        let mut wiring = Wiring {
            config,
            registry: Arc::new(EventRegistry::standard()),
            bus,
            local_authz: None,
            routers: Vec::new(),
            consumers: Vec::new(),
            janitors: Vec::new(),
        };

        let mut services = config.services();
        services.sort_by_key(|s| *s != Service::Authz);
        for service in services {
            if let Err(e) = wiring.add(service).await {
                let mut partial = Self {
                    router: Router::new(),
                    consumers: wiring.consumers,
                    janitors: wiring.janitors,
                };
                partial.shutdown().await;
                return Err(e);
            }
        }

        Ok(Self {
            router: wiring
                .routers
                .into_iter()
                .fold(Router::new(), Router::merge),
            consumers: wiring.consumers,
            janitors: wiring.janitors,
        })
    }

    /// Routes of every hosted service.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Unsubscribes every consumer and stops the cache sweepers. Call before
    /// closing the bus.
    pub async fn shutdown(&mut self) {
        for consumer in &mut self.consumers {
            consumer.shutdown().await;
        }
        for janitor in self.janitors.drain(..) {
            janitor.abort();
        }
        tracing::info!("consumers stopped");
    }
}

type LocalAuthz = AuthzService<InMemoryPolicyRepository>;

struct Wiring<'a> {
    config: &'a Config,
    registry: Arc<EventRegistry>,
    bus: Arc<dyn EventBus>,
    local_authz: Option<Arc<LocalAuthz>>,
    routers: Vec<Router>,
    consumers: Vec<ConsumerHandle>,
    janitors: Vec<JoinHandle<()>>,
}

impl Wiring<'_> {
    fn events(&self, service: Service) -> EventContext {
        EventContext::new(self.registry.clone(), self.bus.clone(), service)
    }

    fn enforcer(&mut self, resource_types: &[&str]) -> PolicyEnforcer {
        let source: Arc<dyn PolicySource> = match &self.local_authz {
            Some(authz) => authz.clone(),
            None => Arc::new(HttpPolicySource::new(self.config.authz_url.clone())),
        };
        let storage = Arc::new(CachedPolicyStorage::new(
            source,
            resource_types.iter().copied(),
            CacheConfig {
                ttl: self.config.policy_cache_ttl,
                sweep_interval: self.config.policy_cache_sweep,
            },
        ));
        self.janitors.push(storage.spawn_janitor());
        PolicyEnforcer::new(storage)
    }

    async fn consume<H: EventHandler>(
        &mut self,
        service: Service,
        handler: Arc<H>,
    ) -> Result<(), StartupError> {
        let handle = Consumer::new(
            self.registry.clone(),
            self.bus.clone(),
            service.as_str(),
            handler,
        )
        .start()
        .await
        .map_err(|source| StartupError::Consumer { service, source })?;
        tracing::info!(%service, subscriptions = handle.subscription_count(), "consumer started");
        self.consumers.push(handle);
        Ok(())
    }

    async fn add(&mut self, service: Service) -> Result<(), StartupError> {
        let router = match service {
            Service::Authz => {
                let authz = Arc::new(AuthzService::new(
                    InMemoryPolicyRepository::new(),
                    self.events(service),
                ));
                self.consume(service, authz.clone()).await?;
                self.local_authz = Some(authz.clone());
                routes::policies::router(authz)
            }
            Service::Identity => {
                let identity = Arc::new(IdentityService::new(
                    InMemoryAccountRepository::new(),
                    self.events(service),
                    self.enforcer(&[resource::ACCOUNTS]),
                ));
                self.consume(service, identity.clone()).await?;
                routes::accounts::router(identity)
            }
            Service::Inventory => {
                let inventory = Arc::new(InventoryService::new(
                    InMemoryInventoryRepository::new(),
                    self.events(service),
                    self.enforcer(&[resource::MERCHANTS, resource::PRODUCTS]),
                ));
                self.consume(service, inventory.clone()).await?;
                routes::inventory::router(inventory)
            }
            Service::Order => {
                let order = Arc::new(OrderService::new(
                    InMemoryOrderRepository::new(),
                    self.events(service),
                    self.enforcer(&[resource::ORDERS]),
                ));
                self.consume(service, order.clone()).await?;
                routes::orders::router(order)
            }
            Service::Payment => {
                let payment = Arc::new(PaymentService::new(
                    InMemoryPaymentRepository::new(),
                    self.events(service),
                    self.enforcer(&[resource::TRANSACTIONS]),
                    self.config.initial_wallet_balance,
                ));
                self.consume(service, payment.clone()).await?;
                routes::payments::router(payment)
            }
        };
        self.routers.push(router);
        Ok(())
    }
}
