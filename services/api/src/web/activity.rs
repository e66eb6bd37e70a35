//! services/api/src/web/activity.rs

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use recall_core::{HeatmapDay, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::web::state::AppState;

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct HeatmapParams {
    /// Window size in months. Defaults to 6.
    pub months: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HeatmapEntry {
    pub date: NaiveDate,
    pub count: i64,
}

impl From<HeatmapDay> for HeatmapEntry {
    fn from(day: HeatmapDay) -> Self {
        Self {
            date: day.date,
            count: day.count,
        }
    }
}

/// GET /api/activity/heatmap - Reviews per day over the last few months
#[utoipa::path(
    get,
    path = "/api/activity/heatmap",
    params(HeatmapParams),
    responses(
        (status = 200, description = "Per-day review counts, oldest first", body = [HeatmapEntry]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn heatmap_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<HeatmapParams>,
) -> Result<Json<Vec<HeatmapEntry>>, ApiError> {
    let days = state.activity.heatmap(user.id, params.months).await?;
    Ok(Json(days.into_iter().map(Into::into).collect()))
}
