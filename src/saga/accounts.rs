//! Transactional account + transaction-log persistence with row-level
//! locking and optimistic versioning (§2 "AccountStore", §6 persisted
//! schema).

use crate::domain::{Account, AccountStatus, SagaState, Transaction, TransactionStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::error::SagaError;

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_number: String,
    account_name: String,
    balance: i64,
    status: String,
    version: i64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            account_number: row.account_number,
            name: row.account_name,
            balance: row.balance,
            status: parse_account_status(&row.status),
            version: row.version,
        }
    }
}

fn parse_account_status(s: &str) -> AccountStatus {
    match s {
        "FROZEN" => AccountStatus::Frozen,
        "CLOSED" => AccountStatus::Closed,
        _ => AccountStatus::Active,
    }
}

fn account_status_str(s: AccountStatus) -> &'static str {
    match s {
        AccountStatus::Active => "ACTIVE",
        AccountStatus::Frozen => "FROZEN",
        AccountStatus::Closed => "CLOSED",
    }
}

fn saga_state_str(s: SagaState) -> &'static str {
    match s {
        SagaState::Created => "CREATED",
        SagaState::Debited => "DEBITED",
        SagaState::Credited => "CREDITED",
        SagaState::Compensated => "COMPENSATED",
        SagaState::Failed => "FAILED",
    }
}

fn parse_saga_state(s: &str) -> SagaState {
    match s {
        "DEBITED" => SagaState::Debited,
        "CREDITED" => SagaState::Credited,
        "COMPENSATED" => SagaState::Compensated,
        "FAILED" => SagaState::Failed,
        _ => SagaState::Created,
    }
}

fn txn_status_str(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Pending => "PENDING",
        TransactionStatus::Completed => "COMPLETED",
        TransactionStatus::Failed => "FAILED",
    }
}

fn parse_txn_status(s: &str) -> TransactionStatus {
    match s {
        "COMPLETED" => TransactionStatus::Completed,
        "FAILED" => TransactionStatus::Failed,
        _ => TransactionStatus::Pending,
    }
}

/// Row-level account and transaction persistence, backed by SQLite.
/// Exposes primitives that run inside a caller-provided transaction so
/// [`super::SagaCoordinator`] controls transaction boundaries per saga
/// primitive.
#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

impl AccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquires a dedicated connection and opens it with `BEGIN
    /// IMMEDIATE` rather than sqlite's default deferred `BEGIN`: this
    /// takes sqlite's reserved write lock up front, at transaction
    /// start, instead of at the first write statement, so the locking
    /// intent at `debit_locked`/`credit_locked`/`compensate_locked`'s
    /// `SELECT ... version` read is made explicit rather than resting
    /// on the `version` column alone.
    pub async fn begin_immediate(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, SagaError> {
        let mut conn = self.pool.acquire().await.map_err(crate::db::DatabaseError::from)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(crate::db::DatabaseError::from)?;
        Ok(conn)
    }

    pub async fn commit_tx(&self, mut conn: sqlx::pool::PoolConnection<sqlx::Sqlite>) -> Result<(), SagaError> {
        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(crate::db::DatabaseError::from)?;
        Ok(())
    }

    pub async fn rollback_tx(&self, mut conn: sqlx::pool::PoolConnection<sqlx::Sqlite>) {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }

    pub async fn create_account(&self, account: &Account) -> Result<(), SagaError> {
        sqlx::query(
            "INSERT INTO accounts (account_number, account_name, balance, status, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.account_number)
        .bind(&account.name)
        .bind(account.balance)
        .bind(account_status_str(account.status))
        .bind(account.version)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(crate::db::DatabaseError::from)?;
        Ok(())
    }

    pub async fn get_account(&self, account_number: &str) -> Result<Account, SagaError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT account_number, account_name, balance, status, version FROM accounts WHERE account_number = ?",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::db::DatabaseError::from)?
        .ok_or_else(|| SagaError::AccountNotFound(account_number.to_string()))?;
        Ok(row.into())
    }

    /// Locks `accounts[account_number]` within `conn` (sqlite's
    /// reserved write lock, taken up front by [`Self::begin_immediate`],
    /// already serializes concurrent writers; this selects the row to
    /// establish the read-then-write invariant explicitly), validates
    /// `status == ACTIVE` and `balance >= amount`, and decrements the
    /// balance.
    pub async fn debit_locked(
        &self,
        conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
        account_number: &str,
        amount: i64,
    ) -> Result<(), SagaError> {
        let row = sqlx::query("SELECT balance, status, version FROM accounts WHERE account_number = ?")
            .bind(account_number)
            .fetch_optional(&mut **conn)
            .await
            .map_err(crate::db::DatabaseError::from)?
            .ok_or_else(|| SagaError::AccountNotFound(account_number.to_string()))?;

        let balance: i64 = row.try_get("balance").map_err(crate::db::DatabaseError::from)?;
        let status: String = row.try_get("status").map_err(crate::db::DatabaseError::from)?;
        let version: i64 = row.try_get("version").map_err(crate::db::DatabaseError::from)?;

        if parse_account_status(&status) != AccountStatus::Active {
            return Err(SagaError::AccountNotActive(account_number.to_string()));
        }
        if balance < amount {
            return Err(SagaError::InsufficientBalance { account: account_number.to_string(), requested: amount, available: balance });
        }

        let result = sqlx::query(
            "UPDATE accounts SET balance = balance - ?, version = version + 1, updated_at = ? WHERE account_number = ? AND version = ?",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(account_number)
        .bind(version)
        .execute(&mut **conn)
        .await
        .map_err(crate::db::DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(SagaError::VersionConflict(account_number.to_string()));
        }
        Ok(())
    }

    /// Locks `accounts[account_number]`, validates active, and
    /// increments the balance.
    pub async fn credit_locked(
        &self,
        conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
        account_number: &str,
        amount: i64,
    ) -> Result<(), SagaError> {
        let row = sqlx::query("SELECT status, version FROM accounts WHERE account_number = ?")
            .bind(account_number)
            .fetch_optional(&mut **conn)
            .await
            .map_err(crate::db::DatabaseError::from)?
            .ok_or_else(|| SagaError::AccountNotFound(account_number.to_string()))?;

        let status: String = row.try_get("status").map_err(crate::db::DatabaseError::from)?;
        let version: i64 = row.try_get("version").map_err(crate::db::DatabaseError::from)?;

        if parse_account_status(&status) != AccountStatus::Active {
            return Err(SagaError::AccountNotActive(account_number.to_string()));
        }

        let result = sqlx::query(
            "UPDATE accounts SET balance = balance + ?, version = version + 1, updated_at = ? WHERE account_number = ? AND version = ?",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(account_number)
        .bind(version)
        .execute(&mut **conn)
        .await
        .map_err(crate::db::DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(SagaError::VersionConflict(account_number.to_string()));
        }
        Ok(())
    }

    /// Re-credits a previously debited amount back to `account_number`,
    /// bypassing the active-status check: a frozen destination must
    /// never block returning funds to the untouched source account.
    pub async fn compensate_locked(
        &self,
        conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
        account_number: &str,
        amount: i64,
    ) -> Result<(), SagaError> {
        let row = sqlx::query("SELECT version FROM accounts WHERE account_number = ?")
            .bind(account_number)
            .fetch_optional(&mut **conn)
            .await
            .map_err(crate::db::DatabaseError::from)?
            .ok_or_else(|| SagaError::AccountNotFound(account_number.to_string()))?;
        let version: i64 = row.try_get("version").map_err(crate::db::DatabaseError::from)?;

        let result = sqlx::query(
            "UPDATE accounts SET balance = balance + ?, version = version + 1, updated_at = ? WHERE account_number = ? AND version = ?",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(account_number)
        .bind(version)
        .execute(&mut **conn)
        .await
        .map_err(crate::db::DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(SagaError::VersionConflict(account_number.to_string()));
        }
        Ok(())
    }

    pub async fn create_transaction(&self, txn: &Transaction) -> Result<(), SagaError> {
        sqlx::query(
            "INSERT INTO transactions (transaction_id, source_account, dest_account, amount, description, status, saga_state, error_message, created_at, completed_at, compensated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&txn.transaction_id)
        .bind(&txn.source)
        .bind(&txn.dest)
        .bind(txn.amount)
        .bind(&txn.description)
        .bind(txn_status_str(txn.status))
        .bind(saga_state_str(txn.saga_state))
        .bind(&txn.error_message)
        .bind(txn.created_at)
        .bind(txn.completed_at)
        .bind(txn.compensated_at)
        .execute(&self.pool)
        .await
        .map_err(crate::db::DatabaseError::from)?;
        Ok(())
    }

    pub async fn advance_saga_state(
        &self,
        transaction_id: &str,
        saga_state: SagaState,
        status: TransactionStatus,
        error_message: Option<&str>,
    ) -> Result<(), SagaError> {
        let now: Option<DateTime<Utc>> = match saga_state {
            SagaState::Compensated | SagaState::Credited | SagaState::Failed => Some(Utc::now()),
            _ => None,
        };
        let compensated_at = if saga_state == SagaState::Compensated { now } else { None };
        let completed_at = if matches!(saga_state, SagaState::Credited | SagaState::Failed) { now } else { None };

        sqlx::query(
            "UPDATE transactions SET saga_state = ?, status = ?, error_message = COALESCE(?, error_message), \
             completed_at = COALESCE(?, completed_at), compensated_at = COALESCE(?, compensated_at) WHERE transaction_id = ?",
        )
        .bind(saga_state_str(saga_state))
        .bind(txn_status_str(status))
        .bind(error_message)
        .bind(completed_at)
        .bind(compensated_at)
        .bind(transaction_id)
        .execute(&self.pool)
        .await
        .map_err(crate::db::DatabaseError::from)?;
        Ok(())
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, SagaError> {
        let row = sqlx::query(
            "SELECT transaction_id, source_account, dest_account, amount, description, status, saga_state, error_message, created_at, completed_at, compensated_at \
             FROM transactions WHERE transaction_id = ?",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::db::DatabaseError::from)?
        .ok_or_else(|| SagaError::TransactionNotFound(transaction_id.to_string()))?;

        Ok(Transaction {
            transaction_id: row.try_get("transaction_id").map_err(crate::db::DatabaseError::from)?,
            source: row.try_get("source_account").map_err(crate::db::DatabaseError::from)?,
            dest: row.try_get("dest_account").map_err(crate::db::DatabaseError::from)?,
            amount: row.try_get("amount").map_err(crate::db::DatabaseError::from)?,
            description: row.try_get("description").map_err(crate::db::DatabaseError::from)?,
            status: parse_txn_status(&row.try_get::<String, _>("status").map_err(crate::db::DatabaseError::from)?),
            saga_state: parse_saga_state(&row.try_get::<String, _>("saga_state").map_err(crate::db::DatabaseError::from)?),
            error_message: row.try_get("error_message").map_err(crate::db::DatabaseError::from)?,
            created_at: row.try_get("created_at").map_err(crate::db::DatabaseError::from)?,
            completed_at: row.try_get("completed_at").map_err(crate::db::DatabaseError::from)?,
            compensated_at: row.try_get("compensated_at").map_err(crate::db::DatabaseError::from)?,
        })
    }
}
