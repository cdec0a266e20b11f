//! Storage port shared by the reconciliation pipeline and the HTTP layer.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Balance, Order, OrderNumber, OrderStatus, OrderUpdate, Withdrawal};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("order {0} was already uploaded by this user")]
    OrderExists(OrderNumber),

    #[error("order {0} was uploaded by another user")]
    OrderOwnedByOther(OrderNumber),

    #[error("withdrawal for order {0} already exists")]
    WithdrawalExists(OrderNumber),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Numbers of every order currently in `status`, oldest upload first.
    async fn get_orders_by_status(&self, status: OrderStatus) -> RepositoryResult<Vec<OrderNumber>>;

    /// Applies a status transition. Orders already in a terminal status and
    /// unknown numbers are left alone, so repeating an update is harmless.
    async fn update_order(&self, update: &OrderUpdate) -> RepositoryResult<()>;

    async fn add_order(&self, order: &Order) -> RepositoryResult<()>;

    async fn get_order(&self, number: &OrderNumber) -> RepositoryResult<Order>;

    /// Newest upload first.
    async fn orders_for_owner(&self, owner: &str) -> RepositoryResult<Vec<Order>>;

    /// Records a withdrawal if the owner's current balance covers it.
    async fn add_withdrawal(&self, withdrawal: &Withdrawal) -> RepositoryResult<()>;

    /// Newest first.
    async fn withdrawals_for_owner(&self, owner: &str) -> RepositoryResult<Vec<Withdrawal>>;

    async fn balance(&self, owner: &str) -> RepositoryResult<Balance>;

    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
