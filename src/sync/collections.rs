//! Collection store: the local mirror of the server's lists and tasks.
//!
//! # Invariants
//! - Entries are unique by id within each collection after every operation.
//! - A failed operation leaves the collection exactly as it was.
//! - After a successful mutation the entry for that id is what the server
//!   acknowledged: the returned entity on create, the sent entity on update.
//! - A `SessionExpired` failure clears both collections.

use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use super::session::{ApiResponse, SessionStore};
use super::transport::ApiRequest;
use crate::core::entity::{EntityId, Record};
use crate::core::list::{List, NewList};
use crate::core::task::{NewTask, Task, TaskStatus};
use crate::error::{ClientError, ClientResult};

/// Snapshot of everything the store caches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub lists: Vec<List>,
    pub tasks: Vec<Task>,
    /// List whose tasks are currently cached.
    pub selected_list: Option<EntityId>,
}

/// Maps a record type to its slot in [`Collections`].
trait Cached: Record {
    fn slot(collections: &mut Collections) -> &mut Vec<Self>;
}

impl Cached for List {
    fn slot(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.lists
    }
}

impl Cached for Task {
    fn slot(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.tasks
    }
}

#[derive(Clone)]
pub struct CollectionStore {
    session: SessionStore,
    state: Arc<watch::Sender<Collections>>,
}

impl CollectionStore {
    pub fn new(session: SessionStore) -> Self {
        Self {
            session,
            state: Arc::new(watch::Sender::new(Collections::default())),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn snapshot(&self) -> Collections {
        self.state.borrow().clone()
    }

    pub fn lists(&self) -> Vec<List> {
        self.state.borrow().lists.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.borrow().tasks.clone()
    }

    pub fn selected_list(&self) -> Option<EntityId> {
        self.state.borrow().selected_list.clone()
    }

    /// Change notifications. Dropping every receiver is fine; updates keep
    /// being applied.
    pub fn subscribe(&self) -> watch::Receiver<Collections> {
        self.state.subscribe()
    }

    /// Drops all cached data. Call on logout.
    pub fn clear(&self) {
        self.state.send_modify(|c| *c = Collections::default());
    }

    async fn request(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        match self.session.authorized_request(request).await {
            Err(err @ ClientError::SessionExpired { .. }) => {
                log::info!("Session ended, dropping cached lists and tasks");
                self.clear();
                Err(err)
            }
            other => other,
        }
    }

    async fn load<R: Cached>(&self, request: ApiRequest) -> ClientResult<Vec<R>> {
        let records: Vec<R> = match self.request(request).await? {
            ApiResponse::Empty => Vec::new(),
            payload => payload.into_payload()?,
        };
        Ok(dedupe_by_id(records))
    }

    async fn fetch<R: Cached>(&self, request: ApiRequest) -> ClientResult<Vec<R>> {
        let records: Vec<R> = self.load(request).await?;
        self.state.send_modify(|c| *R::slot(c) = records.clone());
        Ok(records)
    }

    async fn add<R: Cached, D: Serialize>(&self, draft: &D) -> ClientResult<R> {
        let body = to_body(draft)?;
        let created: R = self
            .request(ApiRequest::new(Method::POST, R::PATH).body(body))
            .await?
            .into_payload()?;
        self.state.send_modify(|c| upsert(R::slot(c), created.clone()));
        Ok(created)
    }

    async fn update<R: Cached>(&self, record: R) -> ClientResult<R> {
        let path = format!("{}/{}", R::PATH, record.id());
        let body = to_body(&record)?;
        // The response body is ignored; several endpoints send none.
        self.request(ApiRequest::new(Method::PUT, path).body(body))
            .await?;
        self.state.send_modify(|c| {
            if let Some(existing) = R::slot(c).iter_mut().find(|r| r.id() == record.id()) {
                *existing = record.clone();
            }
        });
        Ok(record)
    }

    async fn delete<R: Cached>(&self, id: &EntityId) -> ClientResult<()> {
        let path = format!("{}/{}", R::PATH, id);
        self.request(ApiRequest::new(Method::DELETE, path)).await?;
        self.state.send_modify(|c| R::slot(c).retain(|r| r.id() != id));
        Ok(())
    }

    /// Replaces the cached lists with the server's set.
    pub async fn fetch_lists(&self) -> ClientResult<Vec<List>> {
        let lists = self.fetch(ApiRequest::new(Method::GET, List::PATH)).await?;
        log::debug!("Fetched {} lists", lists.len());
        Ok(lists)
    }

    pub async fn add_list(&self, list: &NewList) -> ClientResult<List> {
        list.validate()?;
        self.add(list).await
    }

    pub async fn update_list(&self, list: List) -> ClientResult<List> {
        list.validate()?;
        self.update(list).await
    }

    /// Cached tasks of the deleted list are kept; the server owns cascades.
    pub async fn delete_list(&self, id: &EntityId) -> ClientResult<()> {
        self.delete::<List>(id).await
    }

    /// Fetches the tasks of `list_id`.
    ///
    /// The result replaces the cached tasks only if `list_id` is still the
    /// selected list when the response lands. With nothing selected,
    /// `list_id` becomes the selection.
    pub async fn fetch_tasks(&self, list_id: &EntityId) -> ClientResult<Vec<Task>> {
        let tasks: Vec<Task> = self
            .load(ApiRequest::new(Method::GET, Task::PATH).query("listId", list_id))
            .await?;
        let cached = self.state.send_if_modified(|c| match &c.selected_list {
            Some(selected) if selected != list_id => false,
            _ => {
                c.selected_list = Some(list_id.clone());
                c.tasks = tasks.clone();
                true
            }
        });
        if cached {
            log::debug!("Fetched {} tasks for list {}", tasks.len(), list_id);
        } else {
            log::debug!("Discarding {} tasks for list {}, selection moved on", tasks.len(), list_id);
        }
        Ok(tasks)
    }

    /// Switches the task view to `list_id` and always refetches.
    ///
    /// Tasks from a previously selected list are dropped first, so a failed
    /// fetch never shows them under the new list.
    pub async fn select_list(&self, list_id: EntityId) -> ClientResult<Vec<Task>> {
        self.state.send_modify(|c| {
            if c.selected_list.as_ref() != Some(&list_id) {
                c.tasks.clear();
            }
            c.selected_list = Some(list_id.clone());
        });
        self.fetch_tasks(&list_id).await
    }

    pub async fn add_task(&self, task: &NewTask) -> ClientResult<Task> {
        task.validate()?;
        self.add(task).await
    }

    pub async fn update_task(&self, task: Task) -> ClientResult<Task> {
        task.validate()?;
        self.update(task).await
    }

    /// Updates only the status of a cached task.
    pub async fn set_task_status(&self, id: &EntityId, status: TaskStatus) -> ClientResult<Task> {
        let task = self
            .state
            .borrow()
            .tasks
            .iter()
            .find(|t| &t.id == id)
            .map(|t| t.with_status(status))
            .ok_or_else(|| ClientError::Validation(format!("task {} is not loaded", id)))?;
        self.update_task(task).await
    }

    pub async fn delete_task(&self, id: &EntityId) -> ClientResult<()> {
        self.delete::<Task>(id).await
    }
}

fn to_body<T: Serialize>(value: &T) -> ClientResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ClientError::Validation(e.to_string()))
}

/// Replaces the entry with the same id, or appends.
fn upsert<R: Record>(records: &mut Vec<R>, record: R) {
    match records.iter_mut().find(|r| r.id() == record.id()) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Keeps first-seen order; a repeated id takes the later value.
fn dedupe_by_id<R: Record>(records: Vec<R>) -> Vec<R> {
    let mut out: Vec<R> = Vec::with_capacity(records.len());
    for record in records {
        upsert(&mut out, record);
    }
    out
}
