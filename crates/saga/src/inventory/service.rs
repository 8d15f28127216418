//! Inventory client operations and saga handlers.

use async_trait::async_trait;
use common::{Claims, CorrelationId, MerchantId, Money, Role, action, resource};
use events::{
    AccountCreated, EventHandler, EventPayload, InboundEvent, OrderCreated, PaymentProcessed,
    PaymentStatus, PolicyUpdated, ProductReserved, ReservationFailed, names,
};
use policy::{PolicyEnforcer, ResourceFilter};

use super::model::{Merchant, Product, Reservation};
use super::repository::InventoryRepository;
use crate::context::{EventContext, apply_policy_update, grant};
use crate::error::{Result, SagaError};
use crate::query::QueryParams;

/// Events consumed by the inventory service.
#[derive(Debug, Clone)]
pub enum InventoryEvent {
    AccountCreated(AccountCreated),
    PolicyUpdated(PolicyUpdated),
    OrderCreated(OrderCreated),
    Payment(PaymentProcessed),
}

impl InboundEvent for InventoryEvent {
    const NAMES: &'static [&'static str] = &[
        names::ACCOUNT_CREATED,
        names::POLICY_UPDATED,
        names::ORDER_CREATED,
        names::PAYMENT,
    ];

    fn from_payload(payload: EventPayload) -> Option<Self> {
        match payload {
            EventPayload::AccountCreated(p) => Some(InventoryEvent::AccountCreated(p)),
            EventPayload::PolicyUpdated(p) => Some(InventoryEvent::PolicyUpdated(p)),
            EventPayload::OrderCreated(p) => Some(InventoryEvent::OrderCreated(p)),
            EventPayload::Payment(p) => Some(InventoryEvent::Payment(p)),
            _ => None,
        }
    }
}

/// Manages merchants and products and holds stock for orders.
pub struct InventoryService<R> {
    repo: R,
    events: EventContext,
    enforcer: PolicyEnforcer,
}

impl<R: InventoryRepository> InventoryService<R> {
    pub fn new(repo: R, events: EventContext, enforcer: PolicyEnforcer) -> Self {
        Self {
            repo,
            events,
            enforcer,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Opens a merchant owned by the caller.
    #[tracing::instrument(skip(self, correlation_id, claims), fields(%correlation_id, caller = %claims.account_id))]
    pub async fn create_merchant(
        &self,
        correlation_id: &CorrelationId,
        claims: &Claims,
        name: &str,
    ) -> Result<Merchant> {
        self.enforcer
            .authorize(claims, resource::MERCHANTS, action::POST, "*")
            .await?;
        if name.trim().is_empty() {
            return Err(SagaError::Validation("merchant name is required".to_string()));
        }

        let merchant = self
            .repo
            .create_merchant(Merchant::new(name.trim(), claims.account_id))
            .await?;
        tracing::info!(merchant_id = %merchant.id, "merchant created");

        let sub = claims.subject();
        let mut publisher = self.events.publisher(correlation_id);
        grant(
            &mut publisher,
            &sub,
            resource::MERCHANTS,
            &merchant.id.to_string(),
            action::ANY,
        )?;
        grant(&mut publisher, &sub, resource::PRODUCTS, "*", action::POST)?;
        self.events.publish(&publisher).await?;

        Ok(merchant)
    }

    pub async fn list_merchants(
        &self,
        claims: &Claims,
        query: &QueryParams,
    ) -> Result<Vec<Merchant>> {
        let filter = self
            .enforcer
            .resource_filter(claims, resource::MERCHANTS)
            .await?;
        self.repo.list_merchants(&filter, query).await
    }

    /// Adds a product to one of the caller's merchants.
    #[tracing::instrument(skip(self, correlation_id, claims, name), fields(%correlation_id, caller = %claims.account_id))]
    pub async fn create_product(
        &self,
        correlation_id: &CorrelationId,
        claims: &Claims,
        merchant_id: MerchantId,
        name: &str,
        price: Money,
        quantity: u32,
    ) -> Result<Product> {
        self.enforcer
            .authorize(claims, resource::PRODUCTS, action::POST, "*")
            .await?;
        self.enforcer
            .authorize(
                claims,
                resource::MERCHANTS,
                action::PUT,
                &merchant_id.to_string(),
            )
            .await?;
        if name.trim().is_empty() {
            return Err(SagaError::Validation("product name is required".to_string()));
        }
        if !price.is_positive() {
            return Err(SagaError::Validation(format!("invalid price: {price}")));
        }

        let product = self
            .repo
            .create_product(Product::new(merchant_id, name.trim(), price, quantity))
            .await?;
        tracing::info!(product_id = %product.id, quantity, "product created");

        let mut publisher = self.events.publisher(correlation_id);
        grant(
            &mut publisher,
            &claims.subject(),
            resource::PRODUCTS,
            &product.id.to_string(),
            action::ANY,
        )?;
        self.events.publish(&publisher).await?;

        Ok(product)
    }

    /// Customers browse the whole catalog; everyone else sees what they
    /// were granted.
    pub async fn list_products(
        &self,
        claims: &Claims,
        query: &QueryParams,
    ) -> Result<Vec<Product>> {
        let filter = match claims.role {
            Role::Customer => ResourceFilter::Unrestricted,
            _ => {
                self.enforcer
                    .resource_filter(claims, resource::PRODUCTS)
                    .await?
            }
        };
        self.repo.list_products(&filter, query).await
    }

    async fn on_account_created(
        &self,
        correlation_id: &CorrelationId,
        created: AccountCreated,
    ) -> Result<()> {
        let sub = created.accnt_id.subject();
        let mut publisher = self.events.publisher(correlation_id);
        match created.role {
            Role::Customer => {
                grant(&mut publisher, &sub, resource::PRODUCTS, "*", action::GET)?
            }
            Role::Seller => {
                grant(&mut publisher, &sub, resource::MERCHANTS, "*", action::POST)?
            }
            Role::Admin => {}
        }
        self.events.publish(&publisher).await
    }

    /// Holds stock for a new order and reports the outcome.
    async fn on_order_created(
        &self,
        correlation_id: &CorrelationId,
        order: OrderCreated,
    ) -> Result<()> {
        let reservation = self
            .repo
            .reserve_product(order.order_id, order.product_id, order.quantity)
            .await?;

        let mut publisher = self.events.publisher(correlation_id);
        match reservation {
            Reservation::Reserved(reserved) => {
                tracing::info!(
                    order_id = %order.order_id,
                    product_id = %reserved.product_id,
                    quantity = reserved.quantity,
                    payable = %reserved.payable,
                    "stock reserved"
                );
                metrics::counter!("saga_reservations_total", "outcome" => "reserved")
                    .increment(1);
                publisher.add(
                    names::PRODUCT_RESERVED,
                    ProductReserved {
                        order_id: order.order_id,
                        account_id: order.account_id,
                        payable: reserved.payable,
                    },
                )?;
            }
            Reservation::Rejected(reason) => {
                tracing::info!(order_id = %order.order_id, %reason, "stock not reserved");
                metrics::counter!("saga_reservations_total", "outcome" => "rejected")
                    .increment(1);
                publisher.add(
                    names::ERR_RESERVING_PRODUCT,
                    ReservationFailed {
                        order_id: order.order_id,
                        reason: reason.to_string(),
                    },
                )?;
            }
            Reservation::Settled => {
                tracing::debug!(order_id = %order.order_id, "order already settled, ignoring");
            }
        }
        self.events.publish(&publisher).await
    }

    /// Consumes the hold on success and returns the stock on failure. An
    /// absent hold means the payment outcome was already applied.
    async fn on_payment(&self, payment: PaymentProcessed) -> Result<()> {
        match payment.status {
            PaymentStatus::PaymentSuccessful => {
                match self.repo.remove_reserved_product(payment.order_id).await? {
                    Some(_) => tracing::info!(order_id = %payment.order_id, "stock consumed"),
                    None => tracing::debug!(order_id = %payment.order_id, "no open hold"),
                }
            }
            PaymentStatus::PaymentFailed => {
                match self.repo.undo_reserve_product(payment.order_id).await? {
                    Some(reserved) => {
                        tracing::info!(
                            order_id = %payment.order_id,
                            product_id = %reserved.product_id,
                            quantity = reserved.quantity,
                            "stock returned"
                        );
                        metrics::counter!("saga_compensations_total", "step" => "undo_reserve")
                            .increment(1);
                    }
                    None => tracing::debug!(order_id = %payment.order_id, "no open hold"),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R: InventoryRepository + 'static> EventHandler for InventoryService<R> {
    type Event = InventoryEvent;
    type Error = SagaError;

    async fn handle(&self, correlation_id: &CorrelationId, event: InventoryEvent) -> Result<()> {
        match event {
            InventoryEvent::AccountCreated(created) => {
                self.on_account_created(correlation_id, created).await
            }
            InventoryEvent::PolicyUpdated(update) => {
                apply_policy_update(&self.enforcer, update).await
            }
            InventoryEvent::OrderCreated(order) => {
                self.on_order_created(correlation_id, order).await
            }
            InventoryEvent::Payment(payment) => self.on_payment(payment).await,
        }
    }
}
