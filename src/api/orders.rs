use axum::extract::{Path, State};
use axum::Json;

use crate::api::AppState;
use crate::distribution::OrderView;
use crate::error::AppError;

pub async fn get_order(
    Path(quote_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<OrderView>, AppError> {
    let quote_id = quote_id.trim();
    if quote_id.is_empty() {
        return Err(AppError::BadRequest("quote id must not be empty".into()));
    }
    let view = state.distributor.order_status(quote_id).await?;
    Ok(Json(view))
}
