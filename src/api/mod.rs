//! HTTP surface: health, accounts and the prediction endpoints

pub mod auth;
pub mod errors;
pub mod handlers;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::service::PredictionService;
use auth::{TokenIssuer, UserStore};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>, config: &AppConfig) -> Self {
        Self {
            service,
            users: Arc::new(UserStore::with_cost(config.auth.bcrypt_cost)),
            tokens: Arc::new(TokenIssuer::from_config(&config.auth)),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|origin| {
            if origin.trim() == "*" {
                warn!("Wildcard CORS origin is not supported, list origins explicitly");
                return false;
            }
            true
        })
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::register))
        .route("/auth/token", post(handlers::token))
        .route("/auth/me", get(handlers::me))
        .route("/predictions/train", post(handlers::train))
        .route("/predictions/predict/:timeframe", get(handlers::predict))
        .route("/predictions/indicators/current", get(handlers::current_indicators))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
