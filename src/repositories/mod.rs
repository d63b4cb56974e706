use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::models::customer::{Customer, CustomerFilter};

pub mod couchdb;
pub mod memory;
pub mod postgres;

/// Storage backend for customer records.
///
/// Implementations only offer the primitives the backend provides natively;
/// visibility rules (active vs. deactivated) live in the handlers.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Inserts a record and returns the id the backend assigned to it.
    async fn create(&self, customer: &Customer) -> Result<Uuid, RepositoryError>;

    async fn find(&self, id: &Uuid) -> Result<Option<Customer>, RepositoryError>;

    /// Overwrites the stored record at `id`. A missing record is not an error.
    async fn update(&self, id: &Uuid, customer: &Customer) -> Result<(), RepositoryError>;

    /// Removes the stored record at `id` if there is one.
    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError>;

    async fn all(&self) -> Result<Vec<Customer>, RepositoryError>;

    async fn find_by(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError>;

    async fn remove_all(&self) -> Result<(), RepositoryError>;
}
