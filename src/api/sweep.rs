use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

use crate::api::AppState;
use crate::distribution::SweepReport;
use crate::domain::TimeMs;
use crate::error::AppError;

const DEFAULT_OLDER_THAN_SECS: u64 = 60;
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    pub older_than_secs: Option<u64>,
    pub limit: Option<i64>,
}

/// Advance stale non-terminal records. Meant for an external scheduler.
pub async fn run_sweep(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<Json<SweepReport>, AppError> {
    let params = body.map(|Json(p)| p).unwrap_or_default();

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    let older_than = TimeMs::now().minus(Duration::from_secs(
        params.older_than_secs.unwrap_or(DEFAULT_OLDER_THAN_SECS),
    ));

    let report = state.distributor.sweep(older_than, limit).await?;
    Ok(Json(report))
}
