use axum::http::{header, HeaderValue, Method, Uri};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::types::AppState;
use crate::api::error::ApiError;
use crate::config::Config;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .merge(handlers::core::routes())
        .merge(handlers::auth::routes())
        .merge(handlers::students::routes())
        .merge(handlers::attendance::routes())
        .merge(handlers::messages::routes())
        .fallback(unknown_route)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn unknown_route(uri: Uri) -> ApiError {
    ApiError::not_found(format!("unknown route: {}", uri.path()))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter(|o| {
            if o.as_str() == "*" {
                tracing::warn!("ignoring wildcard CORS origin; credentials require explicit origins");
            }
            o.as_str() != "*"
        })
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
