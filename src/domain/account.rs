//! Bank accounts and the saga transaction log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

/// `(accountNumber, name, balance>=0, status, version)`. `version` is
/// monotonic per update; mutations require `status == ACTIVE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub name: String,
    pub balance: i64,
    pub status: AccountStatus,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SagaState {
    Created,
    Debited,
    Credited,
    Compensated,
    Failed,
}

impl SagaState {
    /// Whether this state is a terminal state of the saga state machine.
    pub fn is_terminal(self) -> bool {
        matches!(self, SagaState::Compensated | SagaState::Failed)
    }
}

/// `(transactionId, source, dest, amount>0, description, status,
/// sagaState, errorMessage, createdAt, completedAt, compensatedAt)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub source: String,
    pub dest: String,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub saga_state: SagaState,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compensated_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(transaction_id: impl Into<String>, source: impl Into<String>, dest: impl Into<String>, amount: i64, description: Option<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            source: source.into(),
            dest: dest.into(),
            amount,
            description,
            status: TransactionStatus::Pending,
            saga_state: SagaState::Created,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            compensated_at: None,
        }
    }
}
