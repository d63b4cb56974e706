use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CustomerRepository;
use crate::errors::RepositoryError;
use crate::models::customer::{Customer, CustomerFilter};

/// Process-local store, used for development and tests.
#[derive(Default)]
pub struct MemoryCustomerRepository {
    customers: RwLock<HashMap<Uuid, Customer>>,
}

impl MemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for MemoryCustomerRepository {
    async fn create(&self, customer: &Customer) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();

        let mut stored = customer.clone();
        stored.id = Some(id);
        self.customers.write().await.insert(id, stored);

        Ok(id)
    }

    async fn find(&self, id: &Uuid) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers.read().await.get(id).cloned())
    }

    async fn update(&self, id: &Uuid, customer: &Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;

        if let Some(stored) = customers.get_mut(id) {
            *stored = customer.clone();
            stored.id = Some(*id);
        }

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        self.customers.write().await.remove(id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Customer>, RepositoryError> {
        Ok(self.customers.read().await.values().cloned().collect())
    }

    async fn find_by(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError> {
        let customers = self
            .customers
            .read()
            .await
            .values()
            .filter(|customer| filter.matches(customer))
            .cloned()
            .collect();

        Ok(customers)
    }

    async fn remove_all(&self) -> Result<(), RepositoryError> {
        self.customers.write().await.clear();
        Ok(())
    }
}
