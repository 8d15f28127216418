//! Order client operations and saga handlers.

use async_trait::async_trait;
use common::{Claims, CorrelationId, OrderId, ProductId, Role, action, resource};
use events::{
    AccountCreated, EventHandler, EventPayload, InboundEvent, OrderCreated, PaymentProcessed,
    PaymentStatus, PolicyUpdated, ProductReserved, ReservationFailed, names,
};
use policy::PolicyEnforcer;

use super::model::{Order, StatusChange};
use super::repository::OrderRepository;
use super::status::OrderStatus;
use crate::context::{EventContext, apply_policy_update, grant};
use crate::error::{Result, SagaError};
use crate::query::QueryParams;

/// Events consumed by the order service.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    AccountCreated(AccountCreated),
    PolicyUpdated(PolicyUpdated),
    ProductReserved(ProductReserved),
    ReservationFailed(ReservationFailed),
    Payment(PaymentProcessed),
}

impl InboundEvent for OrderEvent {
    const NAMES: &'static [&'static str] = &[
        names::ACCOUNT_CREATED,
        names::POLICY_UPDATED,
        names::PRODUCT_RESERVED,
        names::ERR_RESERVING_PRODUCT,
        names::PAYMENT,
    ];

    fn from_payload(payload: EventPayload) -> Option<Self> {
        match payload {
            EventPayload::AccountCreated(p) => Some(OrderEvent::AccountCreated(p)),
            EventPayload::PolicyUpdated(p) => Some(OrderEvent::PolicyUpdated(p)),
            EventPayload::ProductReserved(p) => Some(OrderEvent::ProductReserved(p)),
            EventPayload::ReservationFailed(p) => Some(OrderEvent::ReservationFailed(p)),
            EventPayload::Payment(p) => Some(OrderEvent::Payment(p)),
            _ => None,
        }
    }
}

/// Starts orders and records how the saga resolves them.
pub struct OrderService<R> {
    repo: R,
    events: EventContext,
    enforcer: PolicyEnforcer,
}

impl<R: OrderRepository> OrderService<R> {
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

    /// Places an order and starts the saga.
    ///
    /// The buyer is granted `get` and `put` on the new order.
    #[tracing::instrument(skip(self, correlation_id, claims), fields(%correlation_id, caller = %claims.account_id))]
    pub async fn create_order(
        &self,
        correlation_id: &CorrelationId,
        claims: &Claims,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order> {
        self.enforcer
            .authorize(claims, resource::ORDERS, action::POST, "*")
            .await?;
        if quantity == 0 {
            return Err(SagaError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let order = self
            .repo
            .create_order(Order::new(claims.account_id, product_id, quantity))
            .await?;
        tracing::info!(order_id = %order.id, "order created");
        metrics::counter!("orders_created_total").increment(1);

        let sub = claims.subject();
        let oid = order.id.to_string();
        let mut publisher = self.events.publisher(correlation_id);
        publisher.add(
            names::ORDER_CREATED,
            OrderCreated {
                order_id: order.id,
                order_status: order.status.as_str().to_string(),
                account_id: order.account_id,
                product_id,
                quantity,
            },
        )?;
        grant(&mut publisher, &sub, resource::ORDERS, &oid, action::GET)?;
        grant(&mut publisher, &sub, resource::ORDERS, &oid, action::PUT)?;
        self.events.publish(&publisher).await?;

        Ok(order)
    }

    pub async fn list_orders(
        &self,
        claims: &Claims,
        query: &QueryParams,
    ) -> Result<Vec<Order>> {
        let filter = self
            .enforcer
            .resource_filter(claims, resource::ORDERS)
            .await?;
        self.repo.list_orders(&filter, query).await
    }

    async fn transition(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        match self.repo.update_status(order_id, status).await? {
            Some(StatusChange::Applied { from, to }) => {
                tracing::info!(%order_id, %from, %to, "order status changed");
                metrics::counter!("order_transitions_total", "to" => to.as_str()).increment(1);
                Ok(())
            }
            Some(StatusChange::Ignored { current }) => {
                tracing::debug!(%order_id, %current, requested = %status, "stale status update ignored");
                Ok(())
            }
            None => Err(SagaError::not_found("Order", order_id)),
        }
    }

    async fn on_account_created(
        &self,
        correlation_id: &CorrelationId,
        created: AccountCreated,
    ) -> Result<()> {
        if created.role != Role::Customer {
            return Ok(());
        }
        let mut publisher = self.events.publisher(correlation_id);
        grant(
            &mut publisher,
            &created.accnt_id.subject(),
            resource::ORDERS,
            "*",
            action::POST,
        )?;
        self.events.publish(&publisher).await
    }
}

#[async_trait]
impl<R: OrderRepository + 'static> EventHandler for OrderService<R> {
    type Event = OrderEvent;
    type Error = SagaError;

    async fn handle(&self, correlation_id: &CorrelationId, event: OrderEvent) -> Result<()> {
        match event {
            OrderEvent::AccountCreated(created) => {
                self.on_account_created(correlation_id, created).await
            }
            OrderEvent::PolicyUpdated(update) => apply_policy_update(&self.enforcer, update).await,
            OrderEvent::ProductReserved(reserved) => {
                self.transition(reserved.order_id, OrderStatus::PaymentPending)
                    .await
            }
            OrderEvent::ReservationFailed(failed) => {
                tracing::info!(order_id = %failed.order_id, reason = %failed.reason, "reservation failed");
                self.transition(failed.order_id, OrderStatus::ProductOutOfStock)
                    .await
            }
            OrderEvent::Payment(payment) => {
                let status = match payment.status {
                    PaymentStatus::PaymentSuccessful => OrderStatus::Paid,
                    PaymentStatus::PaymentFailed => OrderStatus::Failed,
                };
                self.transition(payment.order_id, status).await
            }
        }
    }
}
