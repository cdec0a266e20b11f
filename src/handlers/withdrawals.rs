use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::Owner;
use crate::domain::{Balance, OrderNumber, Points, Withdrawal};
use crate::error::AppError;
use crate::validation::ValidationError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Points,
}

pub async fn get_balance(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<Balance>, AppError> {
    Ok(Json(state.store.balance(&owner).await?))
}

/// `POST /api/user/balance/withdraw`. 402 when the balance does not cover the sum.
pub async fn withdraw(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(request): Json<WithdrawRequest>,
) -> Result<StatusCode, AppError> {
    let order = OrderNumber::parse(&request.order)?;
    if !request.sum.is_positive() {
        return Err(ValidationError::new("sum", "must be greater than zero").into());
    }

    let withdrawal = Withdrawal::new(order, owner, request.sum);
    state.store.add_withdrawal(&withdrawal).await?;

    tracing::info!(
        order = %withdrawal.order,
        owner = %withdrawal.owner,
        sum = %withdrawal.sum,
        "withdrawal recorded"
    );
    Ok(StatusCode::OK)
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Response, AppError> {
    let withdrawals = state.store.withdrawals_for_owner(&owner).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(withdrawals).into_response())
}
