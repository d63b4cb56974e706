use axum::response::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Error envelope returned by every failing request.
#[derive(Serialize, Debug)]
pub struct DefaultResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DefaultResponse {
    pub fn new(status: &str, message: String) -> Self {
        Self {
            status: status.to_string(),
            message,
            error: None,
        }
    }

    pub fn error(message: &str, error: String) -> Self {
        let mut response = Self::new("error", message.to_string());
        response.error = Some(error);
        response
    }

    pub fn into_json(self) -> Json<Value> {
        Json(json!(self))
    }
}
