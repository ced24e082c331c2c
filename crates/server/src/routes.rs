//! Router construction (SPEC_FULL.md §4.7, §6).

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{api, archive, assets, progress, welcome};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_/crystal/resources/:name", get(assets::resource))
        .route("/_/crystal/pin_date.js", get(assets::pin_date))
        .route("/_/crystal/download-progress", get(progress::download_progress))
        .route("/_/crystal/download-url", post(api::download_url))
        .route("/_/crystal/create-group", post(api::create_group))
        .route("/_/crystal/create-alias", post(api::create_alias))
        .route("/_/crystal/preview-urls", post(api::preview_urls))
        .route("/_/:scheme/*rest", get(archive::serve))
        .fallback(welcome::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
