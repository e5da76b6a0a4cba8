use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::context::AppContext;
use crate::handlers;

/// Build the axum router with all Satchel endpoints, mounted under the
/// configured path prefix. `info` and `public` are the only open routes.
pub fn build_router(ctx: AppContext) -> Router {
    let secured = Router::new()
        .route("/publish", post(handlers::publish))
        .route("/save", post(handlers::save))
        .route("/delete", post(handlers::delete))
        .route("/refresh", post(handlers::refresh))
        .route("/query", post(handlers::query))
        .route("/index", post(handlers::index))
        .route("/destroy", post(handlers::destroy))
        .route("/drop", post(handlers::drop_database))
        .route("/store", post(handlers::store))
        .route("/unlink", post(handlers::unlink))
        .route("/stream", get(handlers::stream))
        .route("/exists", post(handlers::exists))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_secret,
        ));

    let routes = Router::new()
        .route("/", get(handlers::info))
        .route("/public/:key", get(handlers::public))
        .merge(secured)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx.clone());

    let prefix = ctx.config.path_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    }
}
