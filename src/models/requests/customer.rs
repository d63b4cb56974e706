use serde::Deserialize;

/// Query string of `GET /customers`. Empty values count as absent.
#[derive(Deserialize, Debug, Default)]
pub struct RequestGetCustomers {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
}

impl RequestGetCustomers {
    pub fn first_name(&self) -> Option<&str> {
        non_empty(&self.first_name)
    }

    pub fn last_name(&self) -> Option<&str> {
        non_empty(&self.last_name)
    }

    pub fn address(&self) -> Option<&str> {
        non_empty(&self.address)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}
