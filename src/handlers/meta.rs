use axum::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "NEXIUM" }))
}

pub async fn test() -> Json<Value> {
    Json(json!({ "message": "NEXIUM ON TOP!" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
