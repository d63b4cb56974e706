use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use super::CustomerRepository;
use crate::config::CouchCredentials;
use crate::errors::RepositoryError;
use crate::models::customer::{Customer, CustomerFilter};
use crate::utils::retry::{with_retry, RetryPolicy};

const FIND_PAGE_SIZE: usize = 200;

/// Document-store backend speaking the CouchDB/Cloudant HTTP API.
///
/// Every call goes through [`with_retry`], so connection faults and 5xx
/// answers are retried with exponential backoff before surfacing.
pub struct CouchCustomerRepository {
    client: reqwest::Client,
    base_url: String,
    database: String,
    credentials: Option<(String, String)>,
    retry: RetryPolicy,
}

impl CouchCustomerRepository {
    pub fn new(
        credentials: &CouchCredentials,
        database: &str,
        admin_party: bool,
        retry: RetryPolicy,
    ) -> Self {
        let basic_auth = match (admin_party, &credentials.username, &credentials.password) {
            (false, Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        };

        Self {
            client: reqwest::Client::new(),
            base_url: credentials.base_url(),
            database: database.to_string(),
            credentials: basic_auth,
            retry,
        }
    }

    pub async fn connect(
        credentials: &CouchCredentials,
        database: &str,
        admin_party: bool,
        retry: RetryPolicy,
    ) -> Result<Self, RepositoryError> {
        let repository = Self::new(credentials, database, admin_party, retry);
        repository.init_db().await?;

        Ok(repository)
    }

    /// Checks the server is reachable and creates the database if needed.
    pub async fn init_db(&self) -> Result<(), RepositoryError> {
        tracing::info!("Initializing database {}", self.database);

        self.request(Method::GET, self.base_url.clone())
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|err| RepositoryError::Connection(err.to_string()))?;

        let response = self
            .request(Method::PUT, self.database_url())
            .send()
            .await
            .map_err(|err| RepositoryError::Connection(err.to_string()))?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                tracing::info!("Created database {}", self.database);
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => Ok(()),
            status => Err(RepositoryError::Connection(format!(
                "unable to open database {}: {}",
                self.database, status
            ))),
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);

        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, Some(password)),
            None => builder,
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn document_url(&self, id: &Uuid) -> String {
        format!("{}/{}", self.database_url(), id.simple())
    }

    async fn fetch_document(&self, id: &Uuid) -> Result<Option<Value>, RepositoryError> {
        let response = self.request(Method::GET, self.document_url(id)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: Value = check_status(response).await?.json().await?;

        // a document without a revision is a tombstone
        if document.get("_rev").is_none() {
            return Ok(None);
        }

        Ok(Some(document))
    }

    async fn post_document(&self, customer: &Customer) -> Result<Uuid, RepositoryError> {
        let response = self
            .request(Method::POST, self.database_url())
            .json(&document_body(customer))
            .send()
            .await?;

        let created: Value = check_status(response).await?.json().await?;

        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RepositoryError::Backend("document was not created".to_string()))?;

        Uuid::parse_str(id)
            .map_err(|err| RepositoryError::Backend(format!("unexpected document id {}: {}", id, err)))
    }

    async fn put_document(&self, id: &Uuid, customer: &Customer) -> Result<(), RepositoryError> {
        let current = match self.fetch_document(id).await? {
            Some(current) => current,
            None => {
                tracing::warn!("Customer {} not found, nothing to update", id);
                return Ok(());
            }
        };

        let mut body = document_body(customer);
        body["_rev"] = current["_rev"].clone();

        let response = self
            .request(Method::PUT, self.document_url(id))
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }

    async fn delete_document(&self, id: &Uuid) -> Result<(), RepositoryError> {
        let current = match self.fetch_document(id).await? {
            Some(current) => current,
            None => return Ok(()),
        };

        let rev = current["_rev"].as_str().unwrap_or_default().to_string();
        self.delete_revision(&id.simple().to_string(), &rev).await
    }

    async fn delete_revision(&self, id: &str, rev: &str) -> Result<(), RepositoryError> {
        let response = self
            .request(Method::DELETE, format!("{}/{}", self.database_url(), id))
            .query(&[("rev", rev)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;

        Ok(())
    }

    async fn all_rows(&self, include_docs: bool) -> Result<Vec<Value>, RepositoryError> {
        let response = self
            .request(Method::GET, format!("{}/_all_docs", self.database_url()))
            .query(&[("include_docs", include_docs)])
            .send()
            .await?;

        let body: Value = check_status(response).await?.json().await?;

        let rows = body
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| {
                !row.get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .starts_with("_design/")
            })
            .collect();

        Ok(rows)
    }

    async fn all_documents(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows = self.all_rows(true).await?;

        rows.iter()
            .filter_map(|row| row.get("doc"))
            .filter(|doc| doc.get("_rev").is_some())
            .map(customer_from_document)
            .collect()
    }

    async fn find_documents(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError> {
        let mut customers = Vec::new();
        let mut bookmark: Option<String> = None;

        loop {
            let mut query = json!({
                "selector": selector(filter),
                "limit": FIND_PAGE_SIZE,
            });
            if let Some(bookmark) = &bookmark {
                query["bookmark"] = json!(bookmark);
            }

            let response = self
                .request(Method::POST, format!("{}/_find", self.database_url()))
                .json(&query)
                .send()
                .await?;

            let body: Value = check_status(response).await?.json().await?;

            let docs = body
                .get("docs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let page_len = docs.len();

            for doc in docs.iter() {
                customers.push(customer_from_document(doc)?);
            }

            bookmark = body
                .get("bookmark")
                .and_then(Value::as_str)
                .map(str::to_string);

            if page_len < FIND_PAGE_SIZE || bookmark.is_none() {
                break;
            }
        }

        Ok(customers)
    }

    async fn delete_all_documents(&self) -> Result<(), RepositoryError> {
        for row in self.all_rows(false).await? {
            let id = row.get("id").and_then(Value::as_str).unwrap_or_default();
            let rev = row["value"]["rev"].as_str().unwrap_or_default();

            self.delete_revision(id, rev).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for CouchCustomerRepository {
    async fn create(&self, customer: &Customer) -> Result<Uuid, RepositoryError> {
        with_retry(&self.retry, "create", || self.post_document(customer)).await
    }

    async fn find(&self, id: &Uuid) -> Result<Option<Customer>, RepositoryError> {
        let document = with_retry(&self.retry, "find", || self.fetch_document(id)).await?;

        match document {
            Some(document) => Ok(Some(customer_from_document(&document)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &Uuid, customer: &Customer) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "update", || self.put_document(id, customer)).await
    }

    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "delete", || self.delete_document(id)).await
    }

    async fn all(&self) -> Result<Vec<Customer>, RepositoryError> {
        with_retry(&self.retry, "all", || self.all_documents()).await
    }

    async fn find_by(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError> {
        with_retry(&self.retry, "find_by", || self.find_documents(filter)).await
    }

    async fn remove_all(&self) -> Result<(), RepositoryError> {
        with_retry(&self.retry, "remove_all", || self.delete_all_documents()).await
    }
}

fn document_body(customer: &Customer) -> Value {
    json!({
        "first_name": customer.first_name,
        "last_name": customer.last_name,
        "address": customer.address,
        "active": customer.active,
    })
}

fn selector(filter: &CustomerFilter) -> Value {
    match filter {
        CustomerFilter::FirstName(first_name) => json!({ "first_name": first_name }),
        CustomerFilter::LastName(last_name) => json!({ "last_name": last_name }),
        CustomerFilter::Address(address) => json!({ "address": address }),
        CustomerFilter::Name {
            first_name,
            last_name,
        } => json!({ "first_name": first_name, "last_name": last_name }),
    }
}

fn customer_from_document(document: &Value) -> Result<Customer, RepositoryError> {
    let mut customer = Customer::default();
    customer
        .deserialize(document)
        .map_err(|err| RepositoryError::Backend(format!("malformed document: {}", err)))?;

    Ok(customer)
}

async fn check_status(response: Response) -> Result<Response, RepositoryError> {
    if response.status() == StatusCode::CONFLICT {
        let reason = response.text().await.unwrap_or_default();
        return Err(RepositoryError::Conflict(reason));
    }

    Ok(response.error_for_status()?)
}
