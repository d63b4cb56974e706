use std::fmt;

use serde_json::{json, Map, Value};
use uuid::Uuid;
use validator_derive::Validate;

use crate::errors::CustomerError;
use crate::repositories::CustomerRepository;

#[derive(Debug, Clone, PartialEq, Validate, sqlx::FromRow)]
pub struct Customer {
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 63, message = "must be between 1 and 63 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 63, message = "must be between 1 and 63 characters"))]
    pub last_name: String,
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub address: String,
    pub active: bool,
}

/// Exact, case-sensitive attribute match used by the list queries.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerFilter {
    FirstName(String),
    LastName(String),
    Address(String),
    Name {
        first_name: String,
        last_name: String,
    },
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        match self {
            CustomerFilter::FirstName(first_name) => customer.first_name == *first_name,
            CustomerFilter::LastName(last_name) => customer.last_name == *last_name,
            CustomerFilter::Address(address) => customer.address == *address,
            CustomerFilter::Name {
                first_name,
                last_name,
            } => customer.first_name == *first_name && customer.last_name == *last_name,
        }
    }
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            id: None,
            first_name: String::new(),
            last_name: String::new(),
            address: String::new(),
            active: true,
        }
    }
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match &self.id {
            Some(id) => id.to_string(),
            None => "None".to_string(),
        };

        write!(
            f,
            "<Customer {} {} id=[{}]>",
            self.first_name, self.last_name, id
        )
    }
}

impl Customer {
    pub fn new(first_name: &str, last_name: &str, address: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            address: address.to_string(),
            ..Default::default()
        }
    }

    /// Persists a new record and adopts the id assigned by the backend.
    ///
    /// Backend failures are logged and leave `id` unset; callers treat a
    /// missing id after `create` as the failure signal.
    pub async fn create(&mut self, repository: &dyn CustomerRepository) -> Result<(), CustomerError> {
        if self.first_name.is_empty() || self.last_name.is_empty() {
            return Err(CustomerError::Validation(
                "first_name and last_name are required".to_string(),
            ));
        }
        validator::Validate::validate(self)?;

        tracing::info!("Creating {}", self);
        self.id = None;

        match repository.create(self).await {
            Ok(id) => self.id = Some(id),
            Err(err) => {
                tracing::error!(error = %err, "customer {} {} was not persisted", self.first_name, self.last_name);
            }
        }

        Ok(())
    }

    pub async fn update(&self, repository: &dyn CustomerRepository) -> Result<(), CustomerError> {
        let id = match &self.id {
            Some(id) => id,
            None => {
                return Err(CustomerError::Validation(
                    "Update called with empty ID field".to_string(),
                ))
            }
        };

        tracing::info!("Saving {}", self);
        repository.update(id, self).await?;

        Ok(())
    }

    pub async fn delete(&self, repository: &dyn CustomerRepository) -> Result<(), CustomerError> {
        if let Some(id) = &self.id {
            tracing::info!("Deleting {}", self);
            repository.delete(id).await?;
        }

        Ok(())
    }

    pub async fn deactivate(&mut self, repository: &dyn CustomerRepository) -> Result<(), CustomerError> {
        self.active = false;
        self.update(repository).await
    }

    pub async fn restore(&mut self, repository: &dyn CustomerRepository) -> Result<(), CustomerError> {
        self.active = true;
        self.update(repository).await
    }

    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "address": self.address,
            "active": self.active,
        })
    }

    /// Populates the record from a JSON object.
    ///
    /// A caller-supplied `id` is ignored. A backend `_id` is adopted so that
    /// documents read back from a document store keep their identity.
    pub fn deserialize(&mut self, data: &Value) -> Result<(), CustomerError> {
        let object = data.as_object().ok_or_else(|| {
            CustomerError::Validation(
                "Invalid Customer: body of request contained bad or no data".to_string(),
            )
        })?;

        let first_name = string_field(object, "first_name")?;
        let last_name = string_field(object, "last_name")?;
        let address = string_field(object, "address")?;

        let active = match object.get("active") {
            Some(Value::Bool(active)) => *active,
            Some(_) => {
                return Err(CustomerError::Validation(
                    "Invalid type for boolean [active]".to_string(),
                ))
            }
            None => {
                return Err(CustomerError::Validation(
                    "Invalid Customer: missing active".to_string(),
                ))
            }
        };

        let id = match object.get("_id") {
            Some(Value::String(id)) => Some(Uuid::parse_str(id).map_err(|err| {
                CustomerError::Validation(format!("Invalid Customer: bad _id {}: {}", id, err))
            })?),
            Some(_) => {
                return Err(CustomerError::Validation(
                    "Invalid type for string [_id]".to_string(),
                ))
            }
            None => self.id,
        };

        let candidate = Customer {
            id,
            first_name,
            last_name,
            address,
            active,
        };
        validator::Validate::validate(&candidate)?;

        *self = candidate;

        Ok(())
    }

    pub async fn find(
        repository: &dyn CustomerRepository,
        id: &Uuid,
    ) -> Result<Option<Customer>, CustomerError> {
        tracing::info!("Processing lookup for id {} ...", id);
        Ok(repository.find(id).await?)
    }

    pub async fn all(repository: &dyn CustomerRepository) -> Result<Vec<Customer>, CustomerError> {
        tracing::info!("Processing all Customers");
        Ok(repository.all().await?)
    }

    pub async fn find_by_first_name(
        repository: &dyn CustomerRepository,
        first_name: &str,
    ) -> Result<Vec<Customer>, CustomerError> {
        tracing::info!("Processing first name query for {} ...", first_name);
        Self::find_by(repository, CustomerFilter::FirstName(first_name.to_string())).await
    }

    pub async fn find_by_last_name(
        repository: &dyn CustomerRepository,
        last_name: &str,
    ) -> Result<Vec<Customer>, CustomerError> {
        tracing::info!("Processing last name query for {} ...", last_name);
        Self::find_by(repository, CustomerFilter::LastName(last_name.to_string())).await
    }

    pub async fn find_by_address(
        repository: &dyn CustomerRepository,
        address: &str,
    ) -> Result<Vec<Customer>, CustomerError> {
        tracing::info!("Processing address query for {} ...", address);
        Self::find_by(repository, CustomerFilter::Address(address.to_string())).await
    }

    pub async fn find_by_name(
        repository: &dyn CustomerRepository,
        first_name: &str,
        last_name: &str,
    ) -> Result<Vec<Customer>, CustomerError> {
        tracing::info!("Processing name query for {} {} ...", first_name, last_name);
        let filter = CustomerFilter::Name {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };

        Self::find_by(repository, filter).await
    }

    pub async fn remove_all(repository: &dyn CustomerRepository) -> Result<(), CustomerError> {
        tracing::info!("Removing all Customers");
        Ok(repository.remove_all().await?)
    }

    async fn find_by(
        repository: &dyn CustomerRepository,
        filter: CustomerFilter,
    ) -> Result<Vec<Customer>, CustomerError> {
        Ok(repository.find_by(&filter).await?)
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Result<String, CustomerError> {
    match object.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(CustomerError::Validation(format!(
            "Invalid type for string [{}]",
            key
        ))),
        None => Err(CustomerError::Validation(format!(
            "Invalid Customer: missing {}",
            key
        ))),
    }
}
