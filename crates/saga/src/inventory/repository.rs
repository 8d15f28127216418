//! Inventory storage trait and in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{MerchantId, OrderId, ProductId};
use policy::ResourceFilter;
use tokio::sync::RwLock;

use super::model::{Merchant, Product, RejectReason, Reservation, ReservedProduct};
use crate::error::{Result, SagaError};
use crate::query::QueryParams;

/// Inventory storage. Each hold operation is atomic.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn create_merchant(&self, merchant: Merchant) -> Result<Merchant>;

    async fn merchant(&self, id: MerchantId) -> Result<Option<Merchant>>;

    async fn list_merchants(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Merchant>>;

    /// Stores a product. Its merchant must exist.
    async fn create_product(&self, product: Product) -> Result<Product>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn list_products(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Product>>;

    /// Withholds `quantity` units of a product for an order.
    ///
    /// Succeeds only if the product has at least `quantity` units, not
    /// merely some stock, so a hold never drives stock below zero. Also
    /// rejected when the order total does not fit in `Money`. Repeated
    /// calls for the same order return the first outcome and leave stock
    /// untouched.
    async fn reserve_product(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation>;

    /// Drops an order's hold, keeping the stock consumed. `None` if there
    /// was no open hold.
    async fn remove_reserved_product(&self, order_id: OrderId) -> Result<Option<ReservedProduct>>;

    /// Drops an order's hold and returns its quantity to the product.
    /// `None` if there was no open hold.
    async fn undo_reserve_product(&self, order_id: OrderId) -> Result<Option<ReservedProduct>>;

    async fn reserved_product(&self, order_id: OrderId) -> Result<Option<ReservedProduct>>;
}

/// Lifecycle of the hold for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Held,
    Rejected(RejectReason),
    Consumed,
    Returned,
}

#[derive(Debug, Default)]
struct InventoryState {
    merchants: BTreeMap<MerchantId, Merchant>,
    products: BTreeMap<ProductId, Product>,
    reserved: HashMap<OrderId, ReservedProduct>,
    holds: HashMap<OrderId, Hold>,
}

impl InventoryState {
    /// Closes an open hold. Returns the released record.
    fn settle(&mut self, order_id: OrderId, outcome: Hold) -> Option<ReservedProduct> {
        let reserved = self.reserved.remove(&order_id)?;
        self.holds.insert(order_id, outcome);
        Some(reserved)
    }
}

/// In-memory inventory repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryRepository {
    state: Arc<RwLock<InventoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`SagaError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of open holds.
    pub async fn reserved_count(&self) -> usize {
        self.state.read().await.reserved.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SagaError::StoreUnavailable("inventory store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn create_merchant(&self, merchant: Merchant) -> Result<Merchant> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.merchants.values().any(|m| m.name == merchant.name) {
            return Err(SagaError::Conflict(format!(
                "merchant name taken: {}",
                merchant.name
            )));
        }
        state.merchants.insert(merchant.id, merchant.clone());
        Ok(merchant)
    }

    async fn merchant(&self, id: MerchantId) -> Result<Option<Merchant>> {
        self.check_available()?;
        Ok(self.state.read().await.merchants.get(&id).cloned())
    }

    async fn list_merchants(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Merchant>> {
        self.check_available()?;
        let merchants = self
            .state
            .read()
            .await
            .merchants
            .values()
            .filter(|m| filter.allows(&m.id.to_string()))
            .cloned()
            .collect();
        Ok(query.apply(merchants))
    }

    async fn create_product(&self, product: Product) -> Result<Product> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.merchants.contains_key(&product.merchant_id) {
            return Err(SagaError::not_found("Merchant", product.merchant_id));
        }
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Product>> {
        self.check_available()?;
        let products = self
            .state
            .read()
            .await
            .products
            .values()
            .filter(|p| filter.allows(&p.id.to_string()))
            .cloned()
            .collect();
        Ok(query.apply(products))
    }

    async fn reserve_product(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation> {
        self.check_available()?;
        let mut state = self.state.write().await;

        match state.holds.get(&order_id).copied() {
            Some(Hold::Held) => {
                return Ok(state
                    .reserved
                    .get(&order_id)
                    .cloned()
                    .map_or(Reservation::Settled, Reservation::Reserved));
            }
            Some(Hold::Rejected(reason)) => return Ok(Reservation::Rejected(reason)),
            Some(Hold::Consumed | Hold::Returned) => return Ok(Reservation::Settled),
            None => {}
        }

        let Some(product) = state.products.get_mut(&product_id) else {
            let reason = RejectReason::ProductNotFound;
            state.holds.insert(order_id, Hold::Rejected(reason));
            return Ok(Reservation::Rejected(reason));
        };
        // Stricter than a plain in-stock check so stock never goes negative.
        if product.quantity < quantity {
            let reason = RejectReason::OutOfStock {
                available: product.quantity,
                requested: quantity,
            };
            state.holds.insert(order_id, Hold::Rejected(reason));
            return Ok(Reservation::Rejected(reason));
        }
        let Some(payable) = product.price.checked_mul(quantity) else {
            let reason = RejectReason::PayableOverflow;
            state.holds.insert(order_id, Hold::Rejected(reason));
            return Ok(Reservation::Rejected(reason));
        };

        product.quantity -= quantity;
        let reserved = ReservedProduct {
            order_id,
            product_id,
            quantity,
            payable,
        };
        state.reserved.insert(order_id, reserved.clone());
        state.holds.insert(order_id, Hold::Held);
        Ok(Reservation::Reserved(reserved))
    }

    async fn remove_reserved_product(&self, order_id: OrderId) -> Result<Option<ReservedProduct>> {
        self.check_available()?;
        Ok(self.state.write().await.settle(order_id, Hold::Consumed))
    }

    async fn undo_reserve_product(&self, order_id: OrderId) -> Result<Option<ReservedProduct>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let Some(reserved) = state.settle(order_id, Hold::Returned) else {
            return Ok(None);
        };
        if let Some(product) = state.products.get_mut(&reserved.product_id) {
            product.quantity += reserved.quantity;
        }
        Ok(Some(reserved))
    }

    async fn reserved_product(&self, order_id: OrderId) -> Result<Option<ReservedProduct>> {
        self.check_available()?;
        Ok(self.state.read().await.reserved.get(&order_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AccountId, Money};

    async fn seeded(quantity: u32) -> (InMemoryInventoryRepository, ProductId) {
        let repo = InMemoryInventoryRepository::new();
        let merchant = repo
            .create_merchant(Merchant::new("acme", AccountId::new(1)))
            .await
            .unwrap();
        let product = repo
            .create_product(Product::new(merchant.id, "widget", Money::from_cents(250), quantity))
            .await
            .unwrap();
        (repo, product.id)
    }

    async fn quantity(repo: &InMemoryInventoryRepository, id: ProductId) -> u32 {
        repo.product(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn reserve_decrements_and_prices_the_hold() {
        let (repo, product_id) = seeded(10).await;
        let order_id = OrderId::new();

        let outcome = repo.reserve_product(order_id, product_id, 3).await.unwrap();
        let Reservation::Reserved(reserved) = outcome else {
            panic!("expected a hold, got {outcome:?}");
        };
        assert_eq!(reserved.payable, Money::from_cents(750));
        assert_eq!(quantity(&repo, product_id).await, 7);
        assert_eq!(repo.reserved_count().await, 1);
    }

    #[tokio::test]
    async fn reserve_is_idempotent_per_order() {
        let (repo, product_id) = seeded(10).await;
        let order_id = OrderId::new();

        let first = repo.reserve_product(order_id, product_id, 3).await.unwrap();
        let second = repo.reserve_product(order_id, product_id, 3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(quantity(&repo, product_id).await, 7);
    }

    #[tokio::test]
    async fn reserve_requires_full_quantity() {
        let (repo, product_id) = seeded(2).await;
        let outcome = repo
            .reserve_product(OrderId::new(), product_id, 3)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Reservation::Rejected(RejectReason::OutOfStock {
                available: 2,
                requested: 3
            })
        );
        assert_eq!(quantity(&repo, product_id).await, 2);

        let exact = repo
            .reserve_product(OrderId::new(), product_id, 2)
            .await
            .unwrap();
        assert!(matches!(exact, Reservation::Reserved(_)));
        assert_eq!(quantity(&repo, product_id).await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let (repo, _) = seeded(2).await;
        let outcome = repo
            .reserve_product(OrderId::new(), ProductId::new(), 1)
            .await
            .unwrap();
        assert_eq!(outcome, Reservation::Rejected(RejectReason::ProductNotFound));
    }

    #[tokio::test]
    async fn overflowing_total_is_rejected_without_holding_stock() {
        let repo = InMemoryInventoryRepository::new();
        let merchant = repo
            .create_merchant(Merchant::new("acme", AccountId::new(1)))
            .await
            .unwrap();
        let product = repo
            .create_product(Product::new(
                merchant.id,
                "yacht",
                Money::from_cents(i64::MAX / 2),
                10,
            ))
            .await
            .unwrap();
        let order_id = OrderId::new();

        let outcome = repo.reserve_product(order_id, product.id, 3).await.unwrap();
        assert_eq!(outcome, Reservation::Rejected(RejectReason::PayableOverflow));
        assert_eq!(quantity(&repo, product.id).await, 10);
        assert_eq!(repo.reserved_count().await, 0);

        let again = repo.reserve_product(order_id, product.id, 3).await.unwrap();
        assert_eq!(again, outcome);
    }

    #[tokio::test]
    async fn undo_restores_stock_once() {
        let (repo, product_id) = seeded(10).await;
        let order_id = OrderId::new();
        repo.reserve_product(order_id, product_id, 3).await.unwrap();

        assert!(repo.undo_reserve_product(order_id).await.unwrap().is_some());
        assert_eq!(quantity(&repo, product_id).await, 10);

        assert!(repo.undo_reserve_product(order_id).await.unwrap().is_none());
        assert_eq!(quantity(&repo, product_id).await, 10);
    }

    #[tokio::test]
    async fn settled_order_is_never_reserved_again() {
        let (repo, product_id) = seeded(10).await;
        let order_id = OrderId::new();
        repo.reserve_product(order_id, product_id, 3).await.unwrap();
        repo.remove_reserved_product(order_id).await.unwrap();

        let again = repo.reserve_product(order_id, product_id, 3).await.unwrap();
        assert_eq!(again, Reservation::Settled);
        assert_eq!(quantity(&repo, product_id).await, 7);
        assert!(repo.undo_reserve_product(order_id).await.unwrap().is_none());
        assert_eq!(quantity(&repo, product_id).await, 7);
    }

    #[tokio::test]
    async fn product_requires_existing_merchant() {
        let repo = InMemoryInventoryRepository::new();
        let err = repo
            .create_product(Product::new(MerchantId::new(), "x", Money::from_units(1), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::NotFound { entity: "Merchant", .. }));
    }

    #[tokio::test]
    async fn list_products_applies_filter() {
        let (repo, product_id) = seeded(1).await;
        let only = ResourceFilter::Only(vec![product_id.to_string()]);
        let query = QueryParams::default();
        assert_eq!(repo.list_products(&only, &query).await.unwrap().len(), 1);
        let none = ResourceFilter::Only(vec!["other".to_string()]);
        assert!(repo.list_products(&none, &query).await.unwrap().is_empty());
        assert_eq!(
            repo.list_products(&ResourceFilter::Unrestricted, &query)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn list_products_pages_in_requested_order() {
        let repo = InMemoryInventoryRepository::new();
        let merchant = repo
            .create_merchant(Merchant::new("acme", AccountId::new(1)))
            .await
            .unwrap();
        for (name, cents) in [("drill", 900), ("awl", 300), ("clamp", 700), ("bolt", 100)] {
            repo.create_product(Product::new(merchant.id, name, Money::from_cents(cents), 5))
                .await
                .unwrap();
        }
        let all = ResourceFilter::Unrestricted;
        let names = |products: Vec<Product>| -> Vec<String> {
            products.into_iter().map(|p| p.name).collect()
        };

        let first = QueryParams::new(1, 3).ordered_by("name__asc");
        let page = repo.list_products(&all, &first).await.unwrap();
        assert_eq!(names(page), ["awl", "bolt", "clamp"]);

        let second = QueryParams::new(2, 3).ordered_by("name__asc");
        let page = repo.list_products(&all, &second).await.unwrap();
        assert_eq!(names(page), ["drill"]);

        let by_price = QueryParams::new(1, 2).ordered_by("price__desc");
        let page = repo.list_products(&all, &by_price).await.unwrap();
        assert_eq!(names(page), ["drill", "clamp"]);
    }
}
