//! Image endpoint: `GET /image/{template}/{*path}`

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};
use tracing::info;

use crate::orchestrator::ImageRequest;
use crate::web::{AppState, extractors::ImageQuery, responses};

pub async fn serve_image(
    State(state): State<AppState>,
    Path((template, path)): Path<(String, String)>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Response {
    let request = ImageRequest {
        template,
        path: format!("/{}", path.trim_start_matches('/')),
        original_extension: query.original(),
        status: query.status(),
    };
    info!(
        "== REQ == {} {} (original: {:?}, status: {:?})",
        request.template, request.path, request.original_extension, request.status
    );

    match state.orchestrator.handle(&request).await {
        Ok(served) => responses::image_response(&headers, &served, &state.cache_policy),
        Err(err) => responses::error_response(&err, state.cache_policy.error_max_age),
    }
}
