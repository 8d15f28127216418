//! Wallet and ledger storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{AccountId, Money, OrderId};
use policy::ResourceFilter;
use tokio::sync::RwLock;

use super::model::{Debit, Transaction, Wallet};
use crate::error::{Result, SagaError};
use crate::query::QueryParams;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Opens a wallet unless the account already has one. Returns the
    /// account's wallet either way.
    async fn open_wallet(&self, account_id: AccountId, balance: Money) -> Result<Wallet>;

    async fn wallet(&self, account_id: AccountId) -> Result<Option<Wallet>>;

    /// Charges `amount` for an order.
    ///
    /// Approved only if `amount` is positive and the balance is strictly
    /// greater than it. The balance update and the ledger entry happen
    /// together. The outcome is recorded per order and replayed on repeated
    /// calls.
    async fn debit_for_order(
        &self,
        account_id: AccountId,
        order_id: OrderId,
        amount: Money,
    ) -> Result<Debit>;

    /// Adds funds to an existing wallet. A credit that would overflow the
    /// balance is a validation error.
    async fn credit(&self, account_id: AccountId, amount: Money) -> Result<Transaction>;

    /// One page of the ledger entries visible through `filter`.
    async fn list_transactions(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Transaction>>;
}

#[derive(Debug, Default)]
struct PaymentState {
    wallets: BTreeMap<AccountId, Wallet>,
    ledger: Vec<Transaction>,
    debits: HashMap<OrderId, Debit>,
}

/// In-memory payment repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    state: Arc<RwLock<PaymentState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SagaError::StoreUnavailable("payment store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn open_wallet(&self, account_id: AccountId, balance: Money) -> Result<Wallet> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let wallet = state.wallets.entry(account_id).or_insert_with(|| Wallet {
            account_id,
            balance,
            updated_at: Utc::now(),
        });
        Ok(wallet.clone())
    }

    async fn wallet(&self, account_id: AccountId) -> Result<Option<Wallet>> {
        self.check_available()?;
        Ok(self.state.read().await.wallets.get(&account_id).cloned())
    }

    async fn debit_for_order(
        &self,
        account_id: AccountId,
        order_id: OrderId,
        amount: Money,
    ) -> Result<Debit> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(recorded) = state.debits.get(&order_id) {
            return Ok(recorded.clone());
        }

        let outcome = match state.wallets.get_mut(&account_id) {
            _ if !amount.is_positive() => Debit::InvalidAmount { amount },
            None => Debit::NoWallet,
            Some(wallet) => match wallet.balance.checked_sub(amount) {
                Some(rest) if rest.is_positive() => {
                    wallet.balance = rest;
                    wallet.updated_at = Utc::now();
                    Debit::Approved(Transaction::debit(account_id, amount, order_id))
                }
                _ => Debit::InsufficientFunds {
                    balance: wallet.balance,
                },
            },
        };
        if let Debit::Approved(tx) = &outcome {
            state.ledger.push(tx.clone());
        }
        state.debits.insert(order_id, outcome.clone());
        Ok(outcome)
    }

    async fn credit(&self, account_id: AccountId, amount: Money) -> Result<Transaction> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let Some(wallet) = state.wallets.get_mut(&account_id) else {
            return Err(SagaError::not_found("Wallet", account_id));
        };
        wallet.balance = wallet.balance.checked_add(amount).ok_or_else(|| {
            SagaError::Validation(format!("recharge of {amount} exceeds the wallet limit"))
        })?;
        wallet.updated_at = Utc::now();

        let tx = Transaction::credit(account_id, amount);
        state.ledger.push(tx.clone());
        Ok(tx)
    }

    async fn list_transactions(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Transaction>> {
        self.check_available()?;
        let ledger = self
            .state
            .read()
            .await
            .ledger
            .iter()
            .filter(|tx| filter.allows(&tx.id.to_string()))
            .cloned()
            .collect();
        Ok(query.apply(ledger))
    }
}
