use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::Owner;
use crate::domain::{Order, OrderNumber};
use crate::error::AppError;
use crate::ports::RepositoryError;
use crate::AppState;

/// `POST /api/user/orders` with the order number as a plain-text body.
pub async fn upload_order(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: String,
) -> Result<StatusCode, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("order number is required".to_string()));
    }

    let number = OrderNumber::parse(&body)?;
    let order = Order::new(number, owner);

    match state.store.add_order(&order).await {
        Ok(()) => {
            tracing::info!(order = %order.number, owner = %order.owner, "order accepted");
            Ok(StatusCode::ACCEPTED)
        }
        Err(RepositoryError::OrderExists(_)) => Ok(StatusCode::OK),
        Err(e) => Err(e.into()),
    }
}

/// `GET /api/user/orders`, newest first. 204 when the user has none.
pub async fn list_orders(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Response, AppError> {
    let orders = state.store.orders_for_owner(&owner).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(orders).into_response())
}
