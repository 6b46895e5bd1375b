use chrono::NaiveDate;
use serde::Serialize;

use super::timestamp;
use crate::error::{ClientError, ClientResult};

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub email: String,
    #[serde(serialize_with = "timestamp::serialize_optional_date")]
    pub birth_date: Option<NaiveDate>,
    pub password: String,
}

impl Registration {
    /// Checks the form before anything is sent. `confirmation` is the
    /// repeated password and never leaves the client.
    pub fn validate(&self, confirmation: &str) -> ClientResult<()> {
        let required = [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("username", &self.user_name),
            ("email", &self.email),
            ("password", &self.password),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ClientError::Validation(format!("{} is required", field)));
            }
        }
        if !self.email.contains('@') {
            return Err(ClientError::Validation("email address is not valid".into()));
        }
        if self.password != confirmation {
            return Err(ClientError::Validation("passwords do not match".into()));
        }
        Ok(())
    }
}
