use axum::response::Json;
use serde_json::{json, Value};

/// Liveness probe; does not touch the engine
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
