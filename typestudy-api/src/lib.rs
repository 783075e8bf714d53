//! typestudy-api library interface
//!
//! HTTP handlers for the typing-study collection tool. All persistent state
//! lives in one Drive folder: `counter.json`, `tracking.csv`, and one
//! `U###/Person_N/Session_M/` folder chain per uploaded bundle.

pub mod api;
pub mod auth;
pub mod drive;
pub mod error;
pub mod retry;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{header, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use typestudy_common::config::ServiceConfig;

use crate::auth::AccessTokenSource;
use crate::drive::DriveStore;
use crate::store::{CounterStore, DocumentLocation, TrackingStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub drive: Arc<dyn DriveStore>,
    /// Present when Google credentials are configured
    pub tokens: Option<Arc<dyn AccessTokenSource>>,
    /// Drive folder holding every study artifact
    pub root_folder_id: String,
    pub counter: Arc<CounterStore>,
    pub tracking: Arc<TrackingStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        drive: Arc<dyn DriveStore>,
        tokens: Option<Arc<dyn AccessTokenSource>>,
        config: &ServiceConfig,
    ) -> Self {
        let location = |file_name: &str| DocumentLocation {
            folder_id: config.drive_folder_id.clone(),
            file_name: file_name.to_string(),
            read_retries: config.read_retries,
            retry_backoff: config.retry_backoff,
        };

        Self {
            counter: Arc::new(CounterStore::new(drive.clone(), location(&config.counter_file))),
            tracking: Arc::new(TrackingStore::new(drive.clone(), location(&config.tracking_file))),
            drive,
            tokens,
            root_folder_id: config.drive_folder_id.clone(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // Browsers post from the study page's own origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(api::participant_routes())
        .merge(api::tracking_routes())
        .merge(api::upload_routes())
        .merge(api::token_routes())
        .merge(api::health_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
