//! Payment client operations and saga handlers.

use async_trait::async_trait;
use common::{Claims, CorrelationId, Money, Role, action, resource};
use events::{
    AccountCreated, EventHandler, EventPayload, InboundEvent, PaymentProcessed, PaymentStatus,
    PolicyUpdated, ProductReserved, names,
};
use policy::PolicyEnforcer;

use super::model::{Debit, Transaction};
use super::repository::PaymentRepository;
use crate::context::{EventContext, apply_policy_update, grant};
use crate::error::{Result, SagaError};
use crate::query::QueryParams;

/// Events consumed by the payment service.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    AccountCreated(AccountCreated),
    PolicyUpdated(PolicyUpdated),
    ProductReserved(ProductReserved),
}

impl InboundEvent for PaymentEvent {
    const NAMES: &'static [&'static str] = &[
        names::ACCOUNT_CREATED,
        names::POLICY_UPDATED,
        names::PRODUCT_RESERVED,
    ];

    fn from_payload(payload: EventPayload) -> Option<Self> {
        match payload {
            EventPayload::AccountCreated(p) => Some(PaymentEvent::AccountCreated(p)),
            EventPayload::PolicyUpdated(p) => Some(PaymentEvent::PolicyUpdated(p)),
            EventPayload::ProductReserved(p) => Some(PaymentEvent::ProductReserved(p)),
            _ => None,
        }
    }
}

/// Charges wallets for reserved orders.
pub struct PaymentService<R> {
    repo: R,
    events: EventContext,
    enforcer: PolicyEnforcer,
    initial_balance: Money,
}

impl<R: PaymentRepository> PaymentService<R> {
    /// `initial_balance` funds every new wallet.
    pub fn new(
        repo: R,
        events: EventContext,
        enforcer: PolicyEnforcer,
        initial_balance: Money,
    ) -> Self {
        Self {
            repo,
            events,
            enforcer,
            initial_balance,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Adds funds to the caller's wallet.
    ///
    /// Not deduplicated: every call is a new credit.
    #[tracing::instrument(skip(self, correlation_id, claims), fields(%correlation_id, caller = %claims.account_id))]
    pub async fn recharge_wallet(
        &self,
        correlation_id: &CorrelationId,
        claims: &Claims,
        amount: Money,
    ) -> Result<Transaction> {
        self.enforcer
            .authorize(claims, resource::TRANSACTIONS, action::POST, "*")
            .await?;
        if !amount.is_positive() {
            return Err(SagaError::Validation(format!("invalid amount: {amount}")));
        }

        let tx = self.repo.credit(claims.account_id, amount).await?;
        tracing::info!(transaction_id = %tx.id, %amount, "wallet recharged");

        let mut publisher = self.events.publisher(correlation_id);
        grant(
            &mut publisher,
            &claims.subject(),
            resource::TRANSACTIONS,
            &tx.id.to_string(),
            action::GET,
        )?;
        self.events.publish(&publisher).await?;

        Ok(tx)
    }

    pub async fn list_transactions(
        &self,
        claims: &Claims,
        query: &QueryParams,
    ) -> Result<Vec<Transaction>> {
        let filter = self
            .enforcer
            .resource_filter(claims, resource::TRANSACTIONS)
            .await?;
        self.repo.list_transactions(&filter, query).await
    }

    async fn on_account_created(
        &self,
        correlation_id: &CorrelationId,
        created: AccountCreated,
    ) -> Result<()> {
        let wallet = self
            .repo
            .open_wallet(created.accnt_id, self.initial_balance)
            .await?;
        tracing::info!(account_id = %wallet.account_id, balance = %wallet.balance, "wallet ready");

        if created.role != Role::Customer {
            return Ok(());
        }
        let mut publisher = self.events.publisher(correlation_id);
        grant(
            &mut publisher,
            &created.accnt_id.subject(),
            resource::TRANSACTIONS,
            "*",
            action::POST,
        )?;
        self.events.publish(&publisher).await
    }

    /// Charges the buyer and reports the outcome.
    ///
    /// A refused charge is answered with a failed payment event rather than
    /// an error so the delivery is acknowledged.
    async fn on_product_reserved(
        &self,
        correlation_id: &CorrelationId,
        reserved: ProductReserved,
    ) -> Result<()> {
        let debit = self
            .repo
            .debit_for_order(reserved.account_id, reserved.order_id, reserved.payable)
            .await?;

        let mut publisher = self.events.publisher(correlation_id);
        let status = match &debit {
            Debit::Approved(tx) => {
                tracing::info!(order_id = %reserved.order_id, transaction_id = %tx.id, amount = %tx.amount, "payment captured");
                grant(
                    &mut publisher,
                    &reserved.account_id.subject(),
                    resource::TRANSACTIONS,
                    &tx.id.to_string(),
                    action::GET,
                )?;
                PaymentStatus::PaymentSuccessful
            }
            Debit::InsufficientFunds { balance } => {
                tracing::info!(order_id = %reserved.order_id, %balance, payable = %reserved.payable, "insufficient funds");
                PaymentStatus::PaymentFailed
            }
            Debit::NoWallet => {
                tracing::warn!(order_id = %reserved.order_id, account_id = %reserved.account_id, "no wallet for buyer");
                PaymentStatus::PaymentFailed
            }
            Debit::InvalidAmount { amount } => {
                tracing::warn!(order_id = %reserved.order_id, %amount, "refusing non-positive charge");
                PaymentStatus::PaymentFailed
            }
        };
        let outcome = if debit.is_approved() { "successful" } else { "failed" };
        metrics::counter!("saga_payments_total", "outcome" => outcome).increment(1);

        publisher.add(
            names::PAYMENT,
            PaymentProcessed {
                order_id: reserved.order_id,
                account_id: reserved.account_id,
                status,
            },
        )?;
        self.events.publish(&publisher).await
    }
}

#[async_trait]
impl<R: PaymentRepository + 'static> EventHandler for PaymentService<R> {
    type Event = PaymentEvent;
    type Error = SagaError;

    async fn handle(&self, correlation_id: &CorrelationId, event: PaymentEvent) -> Result<()> {
        match event {
            PaymentEvent::AccountCreated(created) => {
                self.on_account_created(correlation_id, created).await
            }
            PaymentEvent::PolicyUpdated(update) => {
                apply_policy_update(&self.enforcer, update).await
            }
            PaymentEvent::ProductReserved(reserved) => {
                self.on_product_reserved(correlation_id, reserved).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::payment::InMemoryPaymentRepository;
    use common::{AccountId, OrderId, Service};
    use events::{EventRegistry, InMemoryEventBus, Retryable};
    use policy::{CacheConfig, CachedPolicyStorage, Grant, StaticPolicySource};

    fn setup() -> (
        PaymentService<InMemoryPaymentRepository>,
        InMemoryEventBus,
        StaticPolicySource,
    ) {
        let bus = InMemoryEventBus::new();
        let source = StaticPolicySource::new();
        let storage = CachedPolicyStorage::new(
            Arc::new(source.clone()),
            [resource::TRANSACTIONS],
            CacheConfig::default(),
        );
        let service = PaymentService::new(
            InMemoryPaymentRepository::new(),
            EventContext::new(
                Arc::new(EventRegistry::standard()),
                Arc::new(bus.clone()),
                Service::Payment,
            ),
            PolicyEnforcer::new(Arc::new(storage)),
            Money::from_cents(1000),
        );
        (service, bus, source)
    }

    async fn open_customer(service: &PaymentService<InMemoryPaymentRepository>) {
        service
            .handle(
                &CorrelationId::generate(),
                PaymentEvent::AccountCreated(AccountCreated {
                    accnt_id: AccountId::new(1),
                    role: Role::Customer,
                }),
            )
            .await
            .unwrap();
    }

    fn reserved(order_id: OrderId, cents: i64) -> PaymentEvent {
        PaymentEvent::ProductReserved(ProductReserved {
            order_id,
            account_id: AccountId::new(1),
            payable: Money::from_cents(cents),
        })
    }

    async fn payment_statuses(bus: &InMemoryEventBus) -> Vec<String> {
        bus.published()
            .await
            .iter()
            .filter(|(s, _)| s == "paymentsvc.EventPayment")
            .map(|(_, body)| {
                let v: serde_json::Value = serde_json::from_slice(body).unwrap();
                v["payload"]["status"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn account_created_opens_wallet_once() {
        let (service, bus, _) = setup();
        open_customer(&service).await;
        open_customer(&service).await;

        let wallet = service
            .repository()
            .wallet(AccountId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.balance, Money::from_cents(1000));
        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn successful_payment_grants_transaction() {
        let (service, bus, _) = setup();
        open_customer(&service).await;

        service
            .handle(&CorrelationId::generate(), reserved(OrderId::new(), 300))
            .await
            .unwrap();

        assert_eq!(payment_statuses(&bus).await, vec!["payment_successful"]);
        let published = bus.published().await;
        let upsert: serde_json::Value = serde_json::from_slice(&published[1].1).unwrap();
        assert_eq!(upsert["payload"]["resource_type"], "transactions");
        assert_eq!(upsert["payload"]["action"], "get");
    }

    #[tokio::test]
    async fn insufficient_funds_is_acknowledged_with_failed_payment() {
        let (service, bus, _) = setup();
        open_customer(&service).await;

        service
            .handle(&CorrelationId::generate(), reserved(OrderId::new(), 1000))
            .await
            .unwrap();

        assert_eq!(payment_statuses(&bus).await, vec!["payment_failed"]);
        assert_eq!(service.repository().ledger_len().await, 0);
    }

    #[tokio::test]
    async fn redelivered_reservation_does_not_charge_twice() {
        let (service, bus, _) = setup();
        open_customer(&service).await;
        let order_id = OrderId::new();

        for _ in 0..2 {
            service
                .handle(&CorrelationId::generate(), reserved(order_id, 300))
                .await
                .unwrap();
        }

        let wallet = service
            .repository()
            .wallet(AccountId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.balance, Money::from_cents(700));
        assert_eq!(
            payment_statuses(&bus).await,
            vec!["payment_successful", "payment_successful"]
        );
    }

    #[tokio::test]
    async fn recharge_requires_grant_and_positive_amount() {
        let (service, _, source) = setup();
        open_customer(&service).await;
        let claims = Claims::new(AccountId::new(1), "c@example.com", Role::Customer);
        let cid = CorrelationId::generate();

        let err = service
            .recharge_wallet(&cid, &claims, Money::from_cents(500))
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());

        source
            .grant(Grant::new("1", "transactions", "post", "*"))
            .await;
        let err = service
            .recharge_wallet(&cid, &claims, Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));

        let tx = service
            .recharge_wallet(&cid, &claims, Money::from_cents(500))
            .await
            .unwrap();
        assert!(tx.is_credit);
        let wallet = service
            .repository()
            .wallet(AccountId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.balance, Money::from_cents(1500));
    }

    #[tokio::test]
    async fn store_outage_emits_nothing() {
        let (service, bus, _) = setup();
        open_customer(&service).await;
        service.repository().set_unavailable(true);

        let err = service
            .handle(&CorrelationId::generate(), reserved(OrderId::new(), 300))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(payment_statuses(&bus).await.is_empty());
    }

    #[tokio::test]
    async fn negative_payable_fails_payment_without_crediting() {
        let (service, bus, _) = setup();
        open_customer(&service).await;

        service
            .handle(&CorrelationId::generate(), reserved(OrderId::new(), -500))
            .await
            .unwrap();

        assert_eq!(payment_statuses(&bus).await, vec!["payment_failed"]);
        let wallet = service
            .repository()
            .wallet(AccountId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.balance, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn oversized_recharge_is_rejected() {
        let (service, _, source) = setup();
        open_customer(&service).await;
        source
            .grant(Grant::new("1", "transactions", "post", "*"))
            .await;
        let claims = Claims::new(AccountId::new(1), "c@example.com", Role::Customer);

        let err = service
            .recharge_wallet(&CorrelationId::generate(), &claims, Money::from_cents(i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));
        assert_eq!(service.repository().ledger_len().await, 0);
    }
}
