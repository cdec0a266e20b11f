//! Framework-agnostic ledger entities.

pub mod order;
pub mod points;
pub mod withdrawal;

pub use order::{Order, OrderNumber, OrderStatus, OrderUpdate, UnknownStatus};
pub use points::{AmountOutOfRange, Points};
pub use withdrawal::{Balance, Withdrawal};
