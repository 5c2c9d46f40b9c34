//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI document endpoint (disable with `MELODIA_ENABLE_SWAGGER=false`)
//! - Service info and health routes
//! - `/api/music`, `/api/callback` and `/api/upload` routes
//! - Static serving of uploaded files under `/uploads`

mod callback;
pub mod doc;
mod health;
mod music;
mod tasks;
mod upload;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/api/music", music::router().merge(tasks::router()))
        .nest("/api/callback", callback::router())
        .nest("/api/upload", upload::router())
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir));

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
