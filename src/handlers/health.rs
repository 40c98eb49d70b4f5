use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = {
        let conn = state.conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    };

    if db_ok {
        (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
    } else {
        tracing::error!("health check: database unavailable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "database": "unavailable"})),
        )
    }
}
