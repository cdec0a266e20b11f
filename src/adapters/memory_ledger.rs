//! In-memory implementation of LedgerStore.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Balance, Order, OrderNumber, OrderStatus, OrderUpdate, Points, Withdrawal};
use crate::ports::{LedgerStore, RepositoryError, RepositoryResult};

#[derive(Default)]
struct Ledger {
    orders: HashMap<OrderNumber, Order>,
    withdrawals: Vec<Withdrawal>,
}

impl Ledger {
    fn balance(&self, owner: &str) -> RepositoryResult<Balance> {
        let accrued = Points::checked_sum(
            self.orders
                .values()
                .filter(|o| o.owner == owner && o.status == OrderStatus::Processed)
                .filter_map(|o| o.accrual),
        );
        let withdrawn = Points::checked_sum(
            self.withdrawals
                .iter()
                .filter(|w| w.owner == owner)
                .map(|w| w.sum),
        );

        accrued
            .zip(withdrawn)
            .and_then(|(accrued, withdrawn)| Balance::from_totals(accrued, withdrawn))
            .ok_or_else(|| RepositoryError::Corrupt(format!("balance of {} overflows", owner)))
    }
}

/// Process-local ledger. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_orders_by_status(&self, status: OrderStatus) -> RepositoryResult<Vec<OrderNumber>> {
        let ledger = self.inner.read().await;
        let mut orders: Vec<&Order> = ledger
            .orders
            .values()
            .filter(|o| o.status == status)
            .collect();
        orders.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        Ok(orders.into_iter().map(|o| o.number.clone()).collect())
    }

    async fn update_order(&self, update: &OrderUpdate) -> RepositoryResult<()> {
        let mut ledger = self.inner.write().await;
        if let Some(order) = ledger.orders.get_mut(&update.number) {
            if !order.status.is_terminal() {
                order.status = update.status;
                order.accrual = update.accrual;
            }
        }
        Ok(())
    }

    async fn add_order(&self, order: &Order) -> RepositoryResult<()> {
        let mut ledger = self.inner.write().await;
        if let Some(existing) = ledger.orders.get(&order.number) {
            return Err(if existing.owner == order.owner {
                RepositoryError::OrderExists(order.number.clone())
            } else {
                RepositoryError::OrderOwnedByOther(order.number.clone())
            });
        }
        ledger.orders.insert(order.number.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, number: &OrderNumber) -> RepositoryResult<Order> {
        self.inner
            .read()
            .await
            .orders
            .get(number)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", number)))
    }

    async fn orders_for_owner(&self, owner: &str) -> RepositoryResult<Vec<Order>> {
        let ledger = self.inner.read().await;
        let mut orders: Vec<Order> = ledger
            .orders
            .values()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn add_withdrawal(&self, withdrawal: &Withdrawal) -> RepositoryResult<()> {
        let mut ledger = self.inner.write().await;
        if ledger.withdrawals.iter().any(|w| w.order == withdrawal.order) {
            return Err(RepositoryError::WithdrawalExists(withdrawal.order.clone()));
        }
        if ledger.balance(&withdrawal.owner)?.current < withdrawal.sum {
            return Err(RepositoryError::InsufficientFunds);
        }
        ledger.withdrawals.push(withdrawal.clone());
        Ok(())
    }

    async fn withdrawals_for_owner(&self, owner: &str) -> RepositoryResult<Vec<Withdrawal>> {
        let ledger = self.inner.read().await;
        let mut withdrawals: Vec<Withdrawal> = ledger
            .withdrawals
            .iter()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals)
    }

    async fn balance(&self, owner: &str) -> RepositoryResult<Balance> {
        self.inner.read().await.balance(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::new_unchecked(raw)
    }

    async fn ledger_with(orders: &[(&str, &str)]) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        let base = Utc::now() - Duration::minutes(10);
        for (i, (num, owner)) in orders.iter().enumerate() {
            let mut order = Order::new(number(num), *owner);
            order.uploaded_at = base + Duration::seconds(i as i64);
            ledger.add_order(&order).await.unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn filters_orders_by_status_oldest_first() {
        let ledger = ledger_with(&[("18", "alice"), ("26", "bob"), ("34", "alice")]).await;
        ledger
            .update_order(&OrderUpdate::new(number("26"), OrderStatus::Processing, None))
            .await
            .unwrap();

        let new = ledger.get_orders_by_status(OrderStatus::New).await.unwrap();
        assert_eq!(new, vec![number("18"), number("34")]);
        let processing = ledger.get_orders_by_status(OrderStatus::Processing).await.unwrap();
        assert_eq!(processing, vec![number("26")]);
    }

    #[tokio::test]
    async fn repeating_a_terminal_update_changes_nothing() {
        let ledger = ledger_with(&[("18", "alice")]).await;
        let update = OrderUpdate::new(
            number("18"),
            OrderStatus::Processed,
            Some(Points::from_minor(500)),
        );

        ledger.update_order(&update).await.unwrap();
        let first = ledger.get_order(&number("18")).await.unwrap();
        ledger.update_order(&update).await.unwrap();
        let second = ledger.get_order(&number("18")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.status, OrderStatus::Processed);
        assert_eq!(second.accrual, Some(Points::from_minor(500)));
    }

    #[tokio::test]
    async fn terminal_orders_are_immutable() {
        let ledger = ledger_with(&[("18", "alice")]).await;
        ledger.update_order(&OrderUpdate::invalid(number("18"))).await.unwrap();
        ledger
            .update_order(&OrderUpdate::new(
                number("18"),
                OrderStatus::Processed,
                Some(Points::from_minor(100)),
            ))
            .await
            .unwrap();

        let order = ledger.get_order(&number("18")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Invalid);
        assert_eq!(order.accrual, None);
    }

    #[tokio::test]
    async fn updating_unknown_order_is_a_no_op() {
        let ledger = MemoryLedger::new();
        ledger.update_order(&OrderUpdate::invalid(number("18"))).await.unwrap();
        assert!(matches!(
            ledger.get_order(&number("18")).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn order_numbers_are_unique_across_owners() {
        let ledger = ledger_with(&[("18", "alice")]).await;
        assert!(matches!(
            ledger.add_order(&Order::new(number("18"), "alice")).await,
            Err(RepositoryError::OrderExists(_))
        ));
        assert!(matches!(
            ledger.add_order(&Order::new(number("18"), "bob")).await,
            Err(RepositoryError::OrderOwnedByOther(_))
        ));
    }

    #[tokio::test]
    async fn balance_counts_only_processed_accruals() {
        let ledger = ledger_with(&[("18", "alice"), ("26", "alice"), ("34", "bob")]).await;
        ledger
            .update_order(&OrderUpdate::new(
                number("18"),
                OrderStatus::Processed,
                Some(Points::from_minor(72998)),
            ))
            .await
            .unwrap();
        ledger
            .update_order(&OrderUpdate::new(
                number("26"),
                OrderStatus::Processing,
                Some(Points::from_minor(1000)),
            ))
            .await
            .unwrap();

        let balance = ledger.balance("alice").await.unwrap();
        assert_eq!(balance.current, Points::from_minor(72998));
        assert_eq!(balance.withdrawn, Points::ZERO);
        assert_eq!(ledger.balance("bob").await.unwrap(), Balance::default());
    }

    #[tokio::test]
    async fn withdrawals_respect_balance_and_uniqueness() {
        let ledger = ledger_with(&[("18", "alice")]).await;
        ledger
            .update_order(&OrderUpdate::new(
                number("18"),
                OrderStatus::Processed,
                Some(Points::from_minor(1000)),
            ))
            .await
            .unwrap();

        let too_much = Withdrawal::new(number("2377225624"), "alice", Points::from_minor(1001));
        assert!(matches!(
            ledger.add_withdrawal(&too_much).await,
            Err(RepositoryError::InsufficientFunds)
        ));

        let ok = Withdrawal::new(number("2377225624"), "alice", Points::from_minor(400));
        ledger.add_withdrawal(&ok).await.unwrap();
        assert!(matches!(
            ledger.add_withdrawal(&ok).await,
            Err(RepositoryError::WithdrawalExists(_))
        ));

        let balance = ledger.balance("alice").await.unwrap();
        assert_eq!(balance.current, Points::from_minor(600));
        assert_eq!(balance.withdrawn, Points::from_minor(400));
        assert_eq!(ledger.withdrawals_for_owner("alice").await.unwrap().len(), 1);
        assert!(ledger.withdrawals_for_owner("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_owner_orders_newest_first() {
        let ledger = ledger_with(&[("18", "alice"), ("26", "bob"), ("34", "alice")]).await;
        let orders = ledger.orders_for_owner("alice").await.unwrap();
        let numbers: Vec<&str> = orders.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["34", "18"]);
    }

    #[tokio::test]
    async fn duplicate_withdrawal_wins_over_insufficient_funds() {
        let ledger = ledger_with(&[("18", "alice")]).await;
        ledger
            .update_order(&OrderUpdate::new(
                number("18"),
                OrderStatus::Processed,
                Some(Points::from_minor(1000)),
            ))
            .await
            .unwrap();
        let first = Withdrawal::new(number("2377225624"), "alice", Points::from_minor(900));
        ledger.add_withdrawal(&first).await.unwrap();

        let again = Withdrawal::new(number("2377225624"), "alice", Points::from_minor(500));
        assert!(matches!(
            ledger.add_withdrawal(&again).await,
            Err(RepositoryError::WithdrawalExists(_))
        ));
    }

    #[tokio::test]
    async fn overflowing_balance_is_an_error_not_a_panic() {
        let ledger = ledger_with(&[("18", "alice"), ("26", "alice")]).await;
        for raw in ["18", "26"] {
            ledger
                .update_order(&OrderUpdate::new(
                    number(raw),
                    OrderStatus::Processed,
                    Some(Points::from_minor(i64::MAX)),
                ))
                .await
                .unwrap();
        }

        assert!(matches!(
            ledger.balance("alice").await,
            Err(RepositoryError::Corrupt(_))
        ));
        let withdrawal = Withdrawal::new(number("2377225624"), "alice", Points::from_minor(1));
        assert!(matches!(
            ledger.add_withdrawal(&withdrawal).await,
            Err(RepositoryError::Corrupt(_))
        ));
    }
}
