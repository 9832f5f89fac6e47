//! Event bus errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("subscription limit reached for process {0}")]
    SubscriptionLimitReached(String),
}
