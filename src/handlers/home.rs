use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

pub async fn index() -> Response {
    tracing::info!("Request for Root URL");

    let body = json!({
        "name": "Customer REST API Service",
        "version": env!("CARGO_PKG_VERSION"),
        "paths": "/customers",
    });

    (StatusCode::OK, Json(body)).into_response()
}

pub async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "OK" }))).into_response()
}
