use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::CustomerRepository;
use crate::config::PgConfig;
use crate::errors::RepositoryError;
use crate::models::customer::{Customer, CustomerFilter};

/// Relational backend. Calls are not retried; errors surface directly.
pub struct PgCustomerRepository {
    db: PgPool,
}

impl PgCustomerRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(config: &PgConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .min_connections(config.poolminsize)
            .max_connections(config.poolmaxsize)
            .connect(config.url.as_str())
            .await
            .map_err(|err| RepositoryError::Connection(err.to_string()))?;

        let repository = Self::new(pool);
        repository.init_db().await?;

        Ok(repository)
    }

    /// Creates the `customers` table when it does not exist yet.
    pub async fn init_db(&self) -> Result<(), RepositoryError> {
        tracing::info!("Initializing database");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS customers (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                first_name VARCHAR(63) NOT NULL,
                last_name VARCHAR(63) NOT NULL,
                address VARCHAR(200) NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn create(&self, customer: &Customer) -> Result<Uuid, RepositoryError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO customers (first_name, last_name, address, active)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.address)
        .bind(customer.active)
        .fetch_one(&self.db)
        .await?;

        Ok(id)
    }

    async fn find(&self, id: &Uuid) -> Result<Option<Customer>, RepositoryError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, first_name, last_name, address, active
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(customer)
    }

    async fn update(&self, id: &Uuid, customer: &Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE customers
            SET first_name = $1, last_name = $2, address = $3, active = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.address)
        .bind(customer.active)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            DELETE FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn all(&self) -> Result<Vec<Customer>, RepositoryError> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, first_name, last_name, address, active
            FROM customers
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(customers)
    }

    async fn find_by(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError> {
        let query = match filter {
            CustomerFilter::FirstName(first_name) => sqlx::query_as::<_, Customer>(
                r#"
                SELECT id, first_name, last_name, address, active
                FROM customers
                WHERE first_name = $1
                ORDER BY created_at ASC
                "#,
            )
            .bind(first_name),
            CustomerFilter::LastName(last_name) => sqlx::query_as::<_, Customer>(
                r#"
                SELECT id, first_name, last_name, address, active
                FROM customers
                WHERE last_name = $1
                ORDER BY created_at ASC
                "#,
            )
            .bind(last_name),
            CustomerFilter::Address(address) => sqlx::query_as::<_, Customer>(
                r#"
                SELECT id, first_name, last_name, address, active
                FROM customers
                WHERE address = $1
                ORDER BY created_at ASC
                "#,
            )
            .bind(address),
            CustomerFilter::Name {
                first_name,
                last_name,
            } => sqlx::query_as::<_, Customer>(
                r#"
                SELECT id, first_name, last_name, address, active
                FROM customers
                WHERE first_name = $1 AND last_name = $2
                ORDER BY created_at ASC
                "#,
            )
            .bind(first_name)
            .bind(last_name),
        };

        let customers = query.fetch_all(&self.db).await?;

        Ok(customers)
    }

    async fn remove_all(&self) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM customers").execute(&self.db).await?;

        Ok(())
    }
}
