//! HTTP handlers. Request parameters arrive as loose strings and are coerced
//! into canonical requests before they reach the service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::error::AppError;
use super::AppState;
use crate::query::chart::{ChartRequest, ChartResult, RawChartParams};
use crate::query::filter::{parse_date, FilterRequest, RawFilterParams};
use crate::query::listing::{
    parse_number, Listing, RawListingParams, RawSearchParams, SearchCriteria, SortBy,
};
use crate::query::stats::Stats;

fn listing_response<T: Serialize>(listing: Listing<T>) -> Response {
    match listing {
        Listing::Page(page) => Json(page).into_response(),
        Listing::LimitExceeded(body) => (StatusCode::BAD_REQUEST, Json(body)).into_response(),
    }
}

/// API: block/sandwich statistics with per-builder breakdown
pub async fn api_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RawFilterParams>,
) -> Result<Json<Stats>, AppError> {
    let request = FilterRequest::from_params(&params, Utc::now().date_naive());
    Ok(Json(state.service.get_sandwich_stats(&request).await?))
}

/// API: time-bucketed series for the top (or requested) builders
pub async fn api_chart(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RawChartParams>,
) -> Result<Json<ChartResult>, AppError> {
    let request = ChartRequest::from_params(&params, Utc::now().date_naive());
    Ok(Json(state.service.get_chart_data(&request).await?))
}

/// API: one builder's sandwiches, newest first
pub async fn api_builder_sandwiches(
    State(state): State<Arc<AppState>>,
    Path(builder): Path<String>,
    Query(params): Query<RawListingParams>,
) -> Result<Response, AppError> {
    let listing = state
        .service
        .get_builder_sandwiches(
            &builder,
            parse_number(params.page.as_deref()),
            parse_number(params.limit.as_deref()),
            params.start_date.as_deref().and_then(parse_date),
            params.end_date.as_deref().and_then(parse_date),
        )
        .await?;
    Ok(listing_response(listing))
}

pub async fn api_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RawSearchParams>,
) -> Result<Response, AppError> {
    let filter = FilterRequest::from_params(&params.filter, Utc::now().date_naive());
    let criteria = SearchCriteria::new(params.q.as_deref(), filter);
    let listing = state
        .service
        .search_sandwiches(
            &criteria,
            parse_number(params.page.as_deref()),
            parse_number(params.limit.as_deref()),
            SortBy::parse(params.sort_by.as_deref()),
        )
        .await?;
    Ok(listing_response(listing))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// API: drop every cached stats and chart result
pub async fn api_clear_cache(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    state.service.clear_cache();
    Json(ClearResponse { cleared: true })
}

pub async fn health() -> &'static str {
    "OK"
}
