use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::customer::Customer;
use crate::models::requests::customer::RequestGetCustomers;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<RequestGetCustomers>,
) -> Result<Response, ApiError> {
    tracing::info!("Request for customer list");
    let repository = state.repository.as_ref();

    let customers = match (query.first_name(), query.last_name(), query.address()) {
        (Some(first_name), Some(last_name), _) => {
            Customer::find_by_name(repository, first_name, last_name).await?
        }
        (Some(first_name), None, _) => Customer::find_by_first_name(repository, first_name).await?,
        (None, Some(last_name), _) => Customer::find_by_last_name(repository, last_name).await?,
        (None, None, Some(address)) => Customer::find_by_address(repository, address).await?,
        (None, None, None) => Customer::all(repository).await?,
    };

    let results = customers
        .iter()
        .filter(|customer| customer.active)
        .map(Customer::serialize)
        .collect::<Vec<Value>>();

    tracing::info!("Returning {} customers", results.len());

    Ok((StatusCode::OK, Json(json!(results))).into_response())
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to create a customer");
    let Json(body) = payload.map_err(json_rejection)?;

    let mut customer = Customer::default();
    customer.deserialize(&body)?;
    customer.create(state.repository.as_ref()).await?;

    let id = match customer.id {
        Some(id) => id,
        None => {
            return Err(ApiError::ServiceUnavailable(
                "Customer could not be saved, please try again later".to_string(),
            ))
        }
    };

    tracing::info!("Customer with ID [{}] created.", id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location_url(&headers, &id))],
        Json(customer.serialize()),
    )
        .into_response())
}

pub async fn read(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    tracing::info!("Request for customer with id: {}", customer_id);
    let customer = find_active(&state, &customer_id).await?;

    tracing::info!(
        "Returning customer: {} {}",
        customer.first_name,
        customer.last_name
    );

    Ok((StatusCode::OK, Json(customer.serialize())).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to update customer with id: {}", customer_id);
    let existing = find_active(&state, &customer_id).await?;
    let Json(body) = payload.map_err(json_rejection)?;

    let mut customer = existing.clone();
    customer.deserialize(&body)?;

    if customer.active != existing.active {
        return Err(ApiError::MethodNotAllowed(
            "Customer status can only be changed by deactivate or restore".to_string(),
        ));
    }

    customer.id = existing.id;
    customer.update(state.repository.as_ref()).await?;

    tracing::info!("Customer with ID [{}] updated.", customer_id);

    Ok((StatusCode::OK, Json(customer.serialize())).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to delete customer with id: {}", customer_id);
    let repository = state.repository.as_ref();

    if let Ok(id) = Uuid::parse_str(&customer_id) {
        if let Some(customer) = Customer::find(repository, &id).await? {
            customer.delete(repository).await?;
        }
    }

    tracing::info!("Customer with ID [{}] delete complete.", customer_id);

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to deactivate customer with id: {}", customer_id);
    let mut customer = find_active(&state, &customer_id).await?;

    customer.deactivate(state.repository.as_ref()).await?;

    tracing::info!("Customer with ID [{}] deactivated.", customer_id);

    Ok((StatusCode::OK, Json(customer.serialize())).into_response())
}

pub async fn restore(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to restore customer with id: {}", customer_id);
    let mut customer = find_any(&state, &customer_id).await?;

    customer.restore(state.repository.as_ref()).await?;

    tracing::info!("Customer with ID [{}] restored.", customer_id);

    Ok((StatusCode::OK, Json(customer.serialize())).into_response())
}

/// Loads a record regardless of its status. Ids that are not UUIDs cannot
/// exist in any backend and are reported as not found.
async fn find_any(state: &AppState, customer_id: &str) -> Result<Customer, ApiError> {
    let id = Uuid::parse_str(customer_id).map_err(|_| not_found(customer_id))?;

    match Customer::find(state.repository.as_ref(), &id).await? {
        Some(customer) => Ok(customer),
        None => Err(not_found(customer_id)),
    }
}

async fn find_active(state: &AppState, customer_id: &str) -> Result<Customer, ApiError> {
    let customer = find_any(state, customer_id).await?;

    if !customer.active {
        return Err(not_found(customer_id));
    }

    Ok(customer)
}

fn not_found(customer_id: &str) -> ApiError {
    ApiError::NotFound(format!("Customer with id '{}' was not found.", customer_id))
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => ApiError::UnsupportedMediaType(
            "Content-Type must be application/json".to_string(),
        ),
        rejection => ApiError::BadRequest(rejection.body_text()),
    }
}

fn location_url(headers: &HeaderMap, id: &Uuid) -> String {
    match headers.get(header::HOST).and_then(|host| host.to_str().ok()) {
        Some(host) => format!("http://{}/customers/{}", host, id),
        None => format!("/customers/{}", id),
    }
}
