use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::warn;

use super::models::{HealthResponse, SelectionSummary};
use super::state::AppState;

const HEALTHY: &str = "healthy";

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    let dispatcher = state.dispatcher.stats();
    let dispatcher_status = if dispatcher.closed { "closed" } else { HEALTHY };
    components.insert("dispatcher".to_string(), dispatcher_status.to_string());
    components.insert("selection_cache".to_string(), HEALTHY.to_string());

    let users = match state.users.user_count().await {
        Ok(count) => {
            components.insert("user_store".to_string(), HEALTHY.to_string());
            Some(count)
        }
        Err(e) => {
            warn!(error = %e, "User store health check failed");
            components.insert("user_store".to_string(), "unhealthy".to_string());
            None
        }
    };

    let all_healthy = components.values().all(|status| status == HEALTHY);
    let (status_code, overall_status) = if all_healthy {
        (StatusCode::OK, HEALTHY)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        components,
        dispatcher,
        selections: SelectionSummary {
            entries: state.selections.len(),
            max_entries: state.selections.max_entries(),
            ttl_secs: state.selections.ttl().as_secs(),
        },
        users,
        metrics: state.metrics.snapshot(),
        tools: (*state.tools).clone(),
    };

    (status_code, Json(response))
}
