// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * `/api/attempts` for the worker taking an exam.
/// * `/api/admin` for event setup and overrides (administrator roles only).
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let attempt_routes = Router::new()
        .route("/", get(session::list_my_attempts))
        .route("/{id}/verify-token", post(session::verify_token))
        .route("/{id}/enter", post(session::enter_attempt))
        .route(
            "/{id}/answers",
            put(session::save_answer).get(session::get_answers),
        )
        .route("/{id}/progress", put(session::update_progress))
        .route("/{id}/submit", post(session::submit_attempt))
        .route("/{id}/abandon", post(session::abandon_attempt))
        .route("/{id}/status", get(session::check_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/events", post(admin::create_event))
        .route("/events/{id}", delete(admin::delete_event))
        .route("/events/{id}/attempts", get(admin::list_event_attempts))
        .route("/events/{id}/packages", post(admin::add_package))
        .route("/events/{id}/questions", post(admin::add_legacy_questions))
        .route("/events/{id}/close-early", post(admin::close_early))
        .route("/events/{id}/force-close", post(admin::force_close_all))
        .route("/events/{id}/reshuffle", post(admin::reshuffle_event))
        .route("/attempts/{id}/force-close", post(admin::force_close))
        .route("/attempts/{id}/reset", post(admin::reset_attempt))
        .route("/attempts/{id}/reshuffle", post(admin::reshuffle_attempt))
        .route("/competency-mappings", post(admin::create_mapping))
        .route("/workers/{id}/competencies", get(admin::worker_competencies))
        .route("/workers/{id}/history", get(admin::worker_history))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes)
        // Global middleware, outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
