use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::http::error::ApiError;
use crate::http::AppState;
use crate::types::{Frame, Row, RowFilter};

/// `GET /api/odds?sport=nba&sport=nfl&market=h2h`
pub async fn list_odds(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Vec<Row>> {
    let filter = filter_from_params(&params);
    Json(state.feed.current_odds(&filter))
}

/// `GET /api/odds/frame`
pub async fn snapshot_frame(State(state): State<AppState>) -> Result<Json<Arc<Frame>>, ApiError> {
    Ok(Json(state.feed.snapshot_or_refresh().await?))
}

/// `GET /healthz`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let now_ms = chrono::Utc::now().timestamp_millis() as u64;
    Json(json!({
        "status": "ok",
        "provider": state.feed.provider_name(),
        "ready": state.feed.latest_snapshot().is_some(),
        "stats": state.feed.stats().snapshot(now_ms),
    }))
}

fn filter_from_params(params: &[(String, String)]) -> RowFilter {
    let mut filter = RowFilter::default();
    for (k, v) in params {
        let target = match k.as_str() {
            "sport" => &mut filter.sports,
            "market" => &mut filter.markets,
            _ => continue,
        };
        target.extend(v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
    }
    filter
}
