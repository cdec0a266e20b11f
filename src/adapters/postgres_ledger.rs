//! Postgres implementation of LedgerStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use crate::domain::{Balance, Order, OrderNumber, OrderStatus, OrderUpdate, Points, Withdrawal};
use crate::ports::{LedgerStore, RepositoryError, RepositoryResult};

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

async fn fetch_balance<'e, E>(executor: E, owner: &str) -> RepositoryResult<Balance>
where
    E: PgExecutor<'e>,
{
    let (accrued, withdrawn): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE((SELECT SUM(accrual) FROM orders
                      WHERE owner = $1 AND status = 'PROCESSED'), 0)::BIGINT,
            COALESCE((SELECT SUM(sum) FROM withdrawals WHERE owner = $1), 0)::BIGINT
        "#,
    )
    .bind(owner)
    .fetch_one(executor)
    .await?;

    Balance::from_totals(Points::from_minor(accrued), Points::from_minor(withdrawn))
        .ok_or_else(|| RepositoryError::Corrupt(format!("balance of {} overflows", owner)))
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn get_orders_by_status(&self, status: OrderStatus) -> RepositoryResult<Vec<OrderNumber>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT number FROM orders WHERE status = $1 ORDER BY uploaded_at ASC, number ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers.into_iter().map(OrderNumber::new_unchecked).collect())
    }

    async fn update_order(&self, update: &OrderUpdate) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $2, accrual = $3
            WHERE number = $1 AND status NOT IN ('INVALID', 'PROCESSED')
            "#,
        )
        .bind(update.number.as_str())
        .bind(update.status.as_str())
        .bind(update.accrual.map(Points::minor))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(order = %update.number, "order is terminal or unknown, update skipped");
        }
        Ok(())
    }

    async fn add_order(&self, order: &Order) -> RepositoryResult<()> {
        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (number, owner, status, accrual, uploaded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (number) DO NOTHING
            RETURNING number
            "#,
        )
        .bind(order.number.as_str())
        .bind(&order.owner)
        .bind(order.status.as_str())
        .bind(order.accrual.map(Points::minor))
        .bind(order.uploaded_at)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(());
        }

        let existing = self.get_order(&order.number).await?;
        if existing.owner == order.owner {
            Err(RepositoryError::OrderExists(order.number.clone()))
        } else {
            Err(RepositoryError::OrderOwnedByOther(order.number.clone()))
        }
    }

    async fn get_order(&self, number: &OrderNumber) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT number, owner, status, accrual, uploaded_at FROM orders WHERE number = $1",
        )
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("order {}", number)))?
            .into_domain()
    }

    async fn orders_for_owner(&self, owner: &str) -> RepositoryResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT number, owner, status, accrual, uploaded_at FROM orders
            WHERE owner = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_domain).collect()
    }

    async fn add_withdrawal(&self, withdrawal: &Withdrawal) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        // Serializes withdrawals per owner so two requests cannot both spend the same balance.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&withdrawal.owner)
            .execute(&mut *tx)
            .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM withdrawals WHERE order_number = $1)")
                .bind(withdrawal.order.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            tx.rollback().await?;
            return Err(RepositoryError::WithdrawalExists(withdrawal.order.clone()));
        }

        let balance = fetch_balance(&mut *tx, &withdrawal.owner).await?;
        if balance.current < withdrawal.sum {
            tx.rollback().await?;
            return Err(RepositoryError::InsufficientFunds);
        }

        let inserted = sqlx::query(
            "INSERT INTO withdrawals (order_number, owner, sum, processed_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(withdrawal.order.as_str())
        .bind(&withdrawal.owner)
        .bind(withdrawal.sum.minor())
        .bind(withdrawal.processed_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                Err(RepositoryError::WithdrawalExists(withdrawal.order.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn withdrawals_for_owner(&self, owner: &str) -> RepositoryResult<Vec<Withdrawal>> {
        let rows = sqlx::query_as::<_, WithdrawalRow>(
            r#"
            SELECT order_number, owner, sum, processed_at FROM withdrawals
            WHERE owner = $1
            ORDER BY processed_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WithdrawalRow::into_domain).collect())
    }

    async fn balance(&self, owner: &str) -> RepositoryResult<Balance> {
        fetch_balance(&self.pool, owner).await
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    number: String,
    owner: String,
    status: String,
    accrual: Option<i64>,
    uploaded_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_domain(self) -> RepositoryResult<Order> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| RepositoryError::Corrupt(format!("order {}: {}", self.number, e)))?;

        Ok(Order {
            number: OrderNumber::new_unchecked(self.number),
            owner: self.owner,
            status,
            accrual: self.accrual.map(Points::from_minor),
            uploaded_at: self.uploaded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WithdrawalRow {
    order_number: String,
    owner: String,
    sum: i64,
    processed_at: DateTime<Utc>,
}

impl WithdrawalRow {
    fn into_domain(self) -> Withdrawal {
        Withdrawal {
            order: OrderNumber::new_unchecked(self.order_number),
            owner: self.owner,
            sum: Points::from_minor(self.sum),
            processed_at: self.processed_at,
        }
    }
}
