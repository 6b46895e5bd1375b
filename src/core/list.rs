use serde::{Deserialize, Serialize};

use super::entity::{EntityId, Record};
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: EntityId,
    pub name: String,
}

impl Record for List {
    const PATH: &'static str = "/lists";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// A list as sent on create; the server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewList {
    pub name: String,
}

impl NewList {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Validation("list name cannot be empty".into()));
        }
        Ok(())
    }
}

impl List {
    pub fn validate(&self) -> ClientResult<()> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Validation("list name cannot be empty".into()));
        }
        Ok(())
    }
}
