//! debit/credit/compensate primitives and orchestrated transfer (§4.5).

pub mod accounts;
pub mod error;

pub use accounts::AccountStore;
pub use error::SagaError;

use crate::domain::{SagaState, Transaction, TransactionStatus};
use uuid::Uuid;

/// Executes debit/credit/compensate primitives and the orchestrated
/// `executeTransfer`, advancing the per-transaction saga state machine:
/// `CREATED -> DEBITED -> CREDITED` on success, `CREATED -> FAILED` on
/// pre-debit failure, `DEBITED -> COMPENSATED` on post-debit failure.
#[derive(Clone)]
pub struct SagaCoordinator {
    accounts: AccountStore,
}

impl SagaCoordinator {
    pub fn new(accounts: AccountStore) -> Self {
        Self { accounts }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// `debit(acct, amt, txnId)`. Runs under its own database
    /// transaction; locks `accounts[acct]` in a fixed order relative to
    /// `credit` (source before dest — enforced by `executeTransfer`
    /// always calling `debit` before `credit`).
    pub async fn debit(&self, account: &str, amount: i64, transaction_id: &str) -> Result<(), SagaError> {
        let mut tx = self.accounts.begin_immediate().await?;
        let result = self.accounts.debit_locked(&mut tx, account, amount).await;
        match result {
            Ok(()) => {
                self.accounts.commit_tx(tx).await?;
                self.accounts.advance_saga_state(transaction_id, SagaState::Debited, TransactionStatus::Pending, None).await?;
                Ok(())
            }
            Err(e) => {
                self.accounts.rollback_tx(tx).await;
                self.accounts.advance_saga_state(transaction_id, SagaState::Failed, TransactionStatus::Failed, Some(&e.to_string())).await?;
                Err(e)
            }
        }
    }

    /// `credit(acct, amt, txnId)`.
    pub async fn credit(&self, account: &str, amount: i64, transaction_id: &str) -> Result<(), SagaError> {
        let mut tx = self.accounts.begin_immediate().await?;
        let result = self.accounts.credit_locked(&mut tx, account, amount).await;
        match result {
            Ok(()) => {
                self.accounts.commit_tx(tx).await?;
                self.accounts.advance_saga_state(transaction_id, SagaState::Credited, TransactionStatus::Completed, None).await?;
                Ok(())
            }
            Err(e) => {
                self.accounts.rollback_tx(tx).await;
                Err(e)
            }
        }
    }

    /// `compensate(acct, amt, txnId)`. Only meaningful when the
    /// transaction is `DEBITED`; calls in other states are no-ops with
    /// a warning (§4.5). `original_error` is the error that triggered
    /// this compensation (the failed `credit`, when called from
    /// `executeTransfer`); on a failed compensation it is folded into
    /// the persisted error message alongside the compensation failure
    /// itself, so the txn row records both, per §4.5.
    pub async fn compensate(&self, account: &str, amount: i64, transaction_id: &str, original_error: Option<&str>) -> Result<(), SagaError> {
        let txn = self.accounts.get_transaction(transaction_id).await?;
        if txn.saga_state != SagaState::Debited {
            tracing::warn!(transaction_id, saga_state = ?txn.saga_state, "compensate called outside DEBITED state, ignoring");
            return Ok(());
        }

        let mut tx = self.accounts.begin_immediate().await?;
        let result = self.accounts.compensate_locked(&mut tx, account, amount).await;
        match result {
            Ok(()) => {
                self.accounts.commit_tx(tx).await?;
                self.accounts.advance_saga_state(transaction_id, SagaState::Compensated, TransactionStatus::Failed, None).await?;
                Ok(())
            }
            Err(e) => {
                self.accounts.rollback_tx(tx).await;
                let message = match original_error {
                    Some(orig) => format!("original: {orig}; compensation: {e}"),
                    None => e.to_string(),
                };
                self.accounts.advance_saga_state(transaction_id, SagaState::Failed, TransactionStatus::Failed, Some(&message)).await?;
                Err(e)
            }
        }
    }

    /// `executeTransfer(source, dest, amt, description) -> txnId`.
    /// Creates the txn row (`CREATED`), runs `debit` then `credit`; on
    /// failure after a successful debit, attempts `compensate`. If
    /// compensation itself fails, both errors are recorded and a
    /// compound error is returned.
    pub async fn execute_transfer(&self, source: &str, dest: &str, amount: i64, description: Option<String>) -> Result<String, SagaError> {
        if amount <= 0 {
            return Err(SagaError::InsufficientBalance { account: source.to_string(), requested: amount, available: 0 });
        }

        let transaction_id = Uuid::new_v4().to_string();
        let txn = Transaction::new(transaction_id.clone(), source, dest, amount, description);
        self.accounts.create_transaction(&txn).await?;

        if let Err(e) = self.debit(source, amount, &transaction_id).await {
            return Err(e);
        }

        match self.credit(dest, amount, &transaction_id).await {
            Ok(()) => Ok(transaction_id),
            Err(credit_err) => match self.compensate(source, amount, &transaction_id, Some(&credit_err.to_string())).await {
                Ok(()) => Err(credit_err),
                Err(compensation_err) => Err(SagaError::CompensationFailed {
                    original: credit_err.to_string(),
                    compensation: compensation_err.to_string(),
                }),
            },
        }
    }
}
