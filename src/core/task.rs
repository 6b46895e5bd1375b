use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use super::entity::{EntityId, Record};
use super::timestamp;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Da fare")]
    Todo,
    #[serde(rename = "In corso")]
    InProgress,
    #[serde(rename = "Completato")]
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// The label used on the wire.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Todo => "Da fare",
            Self::InProgress => "In corso",
            Self::Done => "Completato",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Da fare" => Some(Self::Todo),
            "In corso" => Some(Self::InProgress),
            "Completato" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl FromStr for TaskStatus {
    type Err = ClientError;

    /// Accepts the wire labels plus short command-line aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(status) = Self::from_label(s.trim()) {
            return Ok(status);
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" | "da-fare" => Ok(Self::Todo),
            "in-progress" | "doing" | "in-corso" => Ok(Self::InProgress),
            "done" | "completato" => Ok(Self::Done),
            other => Err(ClientError::Validation(format!(
                "unknown task status `{}`",
                other
            ))),
        }
    }
}

/// A task as the server stores it. Serializes to exactly the six wire fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, with = "timestamp::optional")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TaskStatus,
    pub list_id: EntityId,
}

impl Record for Task {
    const PATH: &'static str = "/tasks";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Task {
    pub fn with_status(&self, status: TaskStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Overdue means a due date in the past on a task that is not done.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_done() && self.due_date.is_some_and(|due| due < now)
    }

    pub fn validate(&self) -> ClientResult<()> {
        validate_fields(&self.title, &self.list_id)
    }
}

/// A task as sent on create; the server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    #[serde(with = "timestamp::optional")]
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub list_id: EntityId,
}

impl NewTask {
    pub fn new(list_id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
            status: TaskStatus::Todo,
            list_id: list_id.into(),
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        validate_fields(&self.title, &self.list_id)
    }
}

fn validate_fields(title: &str, list_id: &EntityId) -> ClientResult<()> {
    if title.trim().is_empty() || list_id.is_blank() {
        return Err(ClientError::Validation(
            "title and list are required".into(),
        ));
    }
    Ok(())
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
