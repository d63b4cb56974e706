use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::responses::DefaultResponse;

/// Failure talking to a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("transient backend error: {0}")]
    Transient(String),
    #[error("document update conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// Only transient failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                RepositoryError::Connection(err.to_string())
            }
            _ => RepositoryError::Backend(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            return RepositoryError::Transient(err.to_string());
        }

        match err.status() {
            Some(status) if status.is_server_error() || status.as_u16() == 429 => {
                RepositoryError::Transient(err.to_string())
            }
            _ => RepositoryError::Backend(err.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<validator::ValidationErrors> for CustomerError {
    fn from(err: validator::ValidationErrors) -> Self {
        CustomerError::Validation(validation_message(err))
    }
}

/// Flattens validator output into `field: message, field: message`.
fn validation_message(err: validator::ValidationErrors) -> String {
    let mut fields = err
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors
                .iter()
                .map(|error| match &error.message {
                    Some(message) => message.to_string(),
                    None => error.code.to_string(),
                })
                .collect::<Vec<String>>()
                .join(", ");

            format!("{}: {}", field, messages)
        })
        .collect::<Vec<String>>();

    fields.sort();
    fields.join("; ")
}

/// Errors returned by the HTTP handlers, one variant per status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<CustomerError> for ApiError {
    fn from(err: CustomerError) -> Self {
        match err {
            CustomerError::Validation(message) => ApiError::BadRequest(message),
            CustomerError::Repository(err) => ApiError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let summary = status.canonical_reason().unwrap_or("Error");

        let body = DefaultResponse::error(summary, self.to_string()).into_json();

        (status, body).into_response()
    }
}

/// Fatal conditions while bringing the service up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("missing connection parameter: {0}")]
    MissingParameter(String),
    #[error("could not connect to database: {0}")]
    DatabaseConnection(#[from] RepositoryError),
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("server error: {0}")]
    Server(#[from] hyper::Error),
}
