use axum::extract::State;
use axum::Extension;
use axum::Json;
use serde_json::{json, Value};

use crate::config::WebhookRoute;
use crate::error::Result;
use crate::router::AppState;

/// Relay the caller's JSON body, unmodified, to the destination configured
/// for this route. The route's [`WebhookRoute`] is attached as an extension
/// when the router is built.
pub async fn forward(
    State(state): State<AppState>,
    Extension(route): Extension<WebhookRoute>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    tracing::info!(hook = %route.name, "forwarding webhook payload");

    let status = state.relay.forward(&route.url, &body).await?;

    Ok(Json(json!({
        "message": "webhook forwarded successfully",
        "status": status.as_u16(),
    })))
}
