use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::TransactionRecord;
use crate::error::AppError;

pub async fn get_record(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionRecord>, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::BadRequest(format!("invalid record id: {}", id)))?;
    let record = state.distributor.record(id).await?;
    Ok(Json(record))
}
