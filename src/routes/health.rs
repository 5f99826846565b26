use axum::Json;
use serde::Serialize;

use crate::db::models::now_millis;

pub const API_VERSION: &str = "v3";

/// Liveness reply for `GET /api/v3/ping`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub api_version: &'static str,
    pub service_name: &'static str,
    pub service_version: &'static str,
    /// Milliseconds since the Unix epoch, like every other timestamp the service returns.
    pub timestamp: i64,
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        api_version: API_VERSION,
        service_name: env!("CARGO_PKG_NAME"),
        service_version: env!("CARGO_PKG_VERSION"),
        timestamp: now_millis(),
    })
}
