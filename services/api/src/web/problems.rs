//! services/api/src/web/problems.rs
//!
//! Problem CRUD, the due queue and the review endpoint. Every handler runs
//! behind `require_auth` and acts on the caller's own problems only.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use recall_core::{Problem, ProblemInput, ProblemPage, ProblemPatch, ReviewOutcome, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateProblemRequest {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
}

/// Fields left out keep their current value.
#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateProblemRequest {
    pub title: Option<String>,
    pub link: Option<String>,
    pub approach: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub is_easy: bool,
}

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, capped at 100.
    pub limit: Option<u32>,
    /// Case-insensitive title search.
    pub q: Option<String>,
}

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProblemResponse {
    pub id: Uuid,
    pub title: String,
    pub link: String,
    pub approach: String,
    pub code: String,
    pub language: String,
    pub current_streak: i32,
    pub next_review_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<Problem> for ProblemResponse {
    fn from(p: Problem) -> Self {
        Self {
            id: p.id,
            title: p.title,
            link: p.link,
            approach: p.approach,
            code: p.code,
            language: p.language,
            current_streak: p.current_streak,
            next_review_date: p.next_review_date,
            created_at: p.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub total_records: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProblemListResponse {
    pub problems: Vec<ProblemResponse>,
    pub meta: PageMeta,
}

impl From<ProblemPage> for ProblemListResponse {
    fn from(page: ProblemPage) -> Self {
        let meta = PageMeta {
            total_records: page.total,
            current_page: page.page,
            page_size: page.limit,
            total_pages: page.total_pages(),
        };
        Self {
            problems: page.problems.into_iter().map(Into::into).collect(),
            meta,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/problems - Add a problem to the caller's collection
#[utoipa::path(
    post,
    path = "/api/problems",
    request_body = CreateProblemRequest,
    responses(
        (status = 201, description = "Problem created, due tomorrow", body = ProblemResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_problem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateProblemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let problem = state
        .problems
        .create(
            user.id,
            ProblemInput {
                title: req.title,
                link: req.link,
                approach: req.approach,
                code: req.code,
                language: req.language,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ProblemResponse::from(problem))))
}

/// GET /api/problems - List the caller's problems, newest first
#[utoipa::path(
    get,
    path = "/api/problems",
    params(ListParams),
    responses(
        (status = 200, description = "One page of problems", body = ProblemListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_problems_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProblemListResponse>, ApiError> {
    let page = state
        .problems
        .list(
            user.id,
            params.q,
            params.page.unwrap_or(1),
            params.limit.unwrap_or(0),
        )
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/problems/due - Problems due today or earlier, most overdue first
#[utoipa::path(
    get,
    path = "/api/problems/due",
    params(PageParams),
    responses(
        (status = 200, description = "One page of due problems", body = ProblemListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn due_problems_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<PageParams>,
) -> Result<Json<ProblemListResponse>, ApiError> {
    let page = state
        .problems
        .due(user.id, params.page.unwrap_or(1), params.limit.unwrap_or(0))
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/problems/{id}
#[utoipa::path(
    get,
    path = "/api/problems/{id}",
    params(("id" = Uuid, Path, description = "Problem id")),
    responses(
        (status = 200, description = "The problem", body = ProblemResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such problem for this user")
    )
)]
pub async fn show_problem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProblemResponse>, ApiError> {
    let problem = state.problems.show(id, user.id).await?;
    Ok(Json(problem.into()))
}

/// PUT /api/problems/{id} - Edit the descriptive fields of a problem
#[utoipa::path(
    put,
    path = "/api/problems/{id}",
    params(("id" = Uuid, Path, description = "Problem id")),
    request_body = UpdateProblemRequest,
    responses(
        (status = 200, description = "Problem updated", body = ProblemResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "No such problem for this user"),
        (status = 409, description = "Concurrent update")
    )
)]
pub async fn update_problem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProblemRequest>,
) -> Result<Json<ProblemResponse>, ApiError> {
    let problem = state
        .problems
        .update(
            id,
            user.id,
            ProblemPatch {
                title: req.title,
                link: req.link,
                approach: req.approach,
                code: req.code,
                language: req.language,
            },
        )
        .await?;
    Ok(Json(problem.into()))
}

/// DELETE /api/problems/{id}
#[utoipa::path(
    delete,
    path = "/api/problems/{id}",
    params(("id" = Uuid, Path, description = "Problem id")),
    responses(
        (status = 204, description = "Problem deleted"),
        (status = 404, description = "No such problem for this user")
    )
)]
pub async fn delete_problem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.problems.delete(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/problems/{id}/review - Record a review and reschedule
#[utoipa::path(
    post,
    path = "/api/problems/{id}/review",
    params(("id" = Uuid, Path, description = "Problem id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Problem rescheduled", body = ProblemResponse),
        (status = 404, description = "No such problem for this user"),
        (status = 409, description = "Concurrent review, try again")
    )
)]
pub async fn review_problem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ProblemResponse>, ApiError> {
    let problem = state
        .reviews
        .review(id, user.id, ReviewOutcome::from_is_easy(req.is_easy))
        .await?;
    Ok(Json(problem.into()))
}
