//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the router that
//! serves it.

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::web::{activity, auth, middleware::require_auth, problems, state::AppState};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::update_me_handler,
        problems::create_problem_handler,
        problems::list_problems_handler,
        problems::due_problems_handler,
        problems::show_problem_handler,
        problems::update_problem_handler,
        problems::delete_problem_handler,
        problems::review_problem_handler,
        activity::heatmap_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::UpdateAccountRequest,
            auth::UserResponse,
            auth::AuthResponse,
            problems::CreateProblemRequest,
            problems::UpdateProblemRequest,
            problems::ReviewRequest,
            problems::ProblemResponse,
            problems::PageMeta,
            problems::ProblemListResponse,
            activity::HeatmapEntry,
        )
    ),
    tags(
        (name = "Recall API", description = "Spaced-repetition tracker for practice problems.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds every `/api` route over the given state. CORS and the Swagger UI
/// are layered on by the server binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/signup", post(auth::signup_handler))
        .route("/api/login", post(auth::login_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/logout", post(auth::logout_handler))
        .route("/api/me", get(auth::me_handler).patch(auth::update_me_handler))
        .route(
            "/api/problems",
            post(problems::create_problem_handler).get(problems::list_problems_handler),
        )
        .route("/api/problems/due", get(problems::due_problems_handler))
        .route(
            "/api/problems/{id}",
            get(problems::show_problem_handler)
                .put(problems::update_problem_handler)
                .delete(problems::delete_problem_handler),
        )
        .route(
            "/api/problems/{id}/review",
            post(problems::review_problem_handler),
        )
        .route("/api/activity/heatmap", get(activity::heatmap_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
