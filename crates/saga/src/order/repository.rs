//! Order storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use policy::ResourceFilter;
use tokio::sync::RwLock;

use super::model::{Order, StatusChange};
use super::status::OrderStatus;
use crate::error::{Result, SagaError};
use crate::query::QueryParams;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: Order) -> Result<Order>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    /// One page of the orders visible through `filter`.
    async fn list_orders(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Order>>;

    /// Moves an order forward. `None` if the order does not exist.
    async fn update_status(&self, id: OrderId, status: OrderStatus)
    -> Result<Option<StatusChange>>;
}

/// In-memory order repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SagaError::StoreUnavailable("order store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: Order) -> Result<Order> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(SagaError::Conflict(format!("order exists: {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.check_available()?;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Order>> {
        self.check_available()?;
        let orders = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| filter.allows(&o.id.to_string()))
            .cloned()
            .collect();
        Ok(query.apply(orders))
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<StatusChange>> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };

        let from = order.status;
        if !from.can_transition_to(status) {
            return Ok(Some(StatusChange::Ignored { current: from }));
        }
        order.status = status;
        order.updated_at = Utc::now();
        Ok(Some(StatusChange::Applied { from, to: status }))
    }
}
