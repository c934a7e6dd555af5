//! Client-side task cache
//!
//! [`TaskCache`] mirrors one user's tasks and the state lookup. It is only ever
//! changed by folding server responses through [`reduce`], so it never holds
//! anything the server has not confirmed. [`TaskClient`] pairs a cache with a
//! [`TaskApi`] implementation and keeps the two in step: call the endpoint,
//! then fold the authoritative response in.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{DeletedTask, NewTask, Task, TaskPatch, TaskState};

pub mod http;
pub mod view;

pub use http::HttpTaskApi;
pub use view::{StateGroup, TaskSort, TaskStats};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(_) => "Impossibile contattare il server".to_string(),
            Self::Api { message, .. } => message.clone(),
            Self::NotLoggedIn => "Sessione non attiva, effettua il login".to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::NotLoggedIn => None,
        }
    }
}

/// The task endpoints the cache depends on
#[allow(async_fn_in_trait)]
pub trait TaskApi {
    async fn list_states(&self) -> Result<Vec<TaskState>, ClientError>;

    async fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>, ClientError>;

    async fn create_task(&self, draft: &NewTask) -> Result<Task, ClientError>;

    async fn update_task(&self, task_id: i64, patch: &TaskPatch) -> Result<Task, ClientError>;

    async fn change_task_state(&self, task_id: i64, state_id: i64)
    -> Result<Task, ClientError>;

    async fn delete_task(&self, task_id: i64) -> Result<DeletedTask, ClientError>;
}

/// A confirmed change to fold into the task collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Full listing; replaces everything
    Loaded(Vec<Task>),
    /// A newly created task
    Inserted(Task),
    /// Fresh copy of an existing task
    Replaced(Task),
    Removed(i64),
    Cleared,
}

/// Fold one event into the task collection
pub fn reduce(mut tasks: Vec<Task>, event: CacheEvent) -> Vec<Task> {
    match event {
        CacheEvent::Loaded(fresh) => fresh,
        CacheEvent::Inserted(task) => {
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task,
                None => tasks.push(task),
            }
            tasks
        }
        CacheEvent::Replaced(task) => {
            // An entry that is gone locally stays gone
            if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
                *existing = task;
            }
            tasks
        }
        CacheEvent::Removed(id) => {
            tasks.retain(|t| t.id != id);
            tasks
        }
        CacheEvent::Cleared => Vec::new(),
    }
}

#[derive(Debug, Default)]
pub struct TaskCache {
    tasks: Vec<Task>,
    states: Vec<TaskState>,
    loading: bool,
    last_error: Option<String>,
}

impl TaskCache {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn states(&self) -> &[TaskState] {
        &self.states
    }

    /// Whether a request is in flight
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// User-facing message of the last failed request, reset by the next
    /// successful one
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn apply(&mut self, event: CacheEvent) {
        self.tasks = reduce(std::mem::take(&mut self.tasks), event);
    }

    pub fn stats(&self, today: NaiveDate) -> TaskStats {
        view::stats(&self.tasks, today)
    }

    pub fn display_order(&self, today: NaiveDate) -> Vec<&Task> {
        view::display_order(&self.tasks, today)
    }

    pub fn sorted(&self, sort: TaskSort) -> Vec<&Task> {
        view::sorted(&self.tasks, sort)
    }

    pub fn with_state(&self, state_id: i64) -> Vec<&Task> {
        view::with_state(&self.tasks, state_id)
    }

    pub fn grouped(&self) -> Vec<StateGroup<'_>> {
        view::group_by_state(&self.tasks, &self.states)
    }

    fn begin(&mut self) {
        self.loading = true;
    }

    fn finish<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        self.loading = false;
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                tracing::warn!(error = %e, "Task request failed");
                self.last_error = Some(e.user_message());
            }
        }
        result
    }
}

/// A task cache bound to the API that feeds it
pub struct TaskClient<A> {
    api: A,
    cache: TaskCache,
}

impl<A: TaskApi> TaskClient<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: TaskCache::default(),
        }
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// Replace the whole collection with the server's listing
    pub async fn load(&mut self, user_id: i64) -> Result<(), ClientError> {
        self.cache.begin();
        let result = self.api.list_tasks(user_id).await;
        let tasks = self.cache.finish(result)?;

        tracing::debug!(user_id, count = tasks.len(), "Tasks loaded");
        self.cache.apply(CacheEvent::Loaded(tasks));
        Ok(())
    }

    pub async fn load_states(&mut self) -> Result<(), ClientError> {
        self.cache.begin();
        let result = self.api.list_states().await;
        self.cache.states = self.cache.finish(result)?;
        Ok(())
    }

    pub async fn add(&mut self, draft: &NewTask) -> Result<Task, ClientError> {
        self.cache.begin();
        let result = self.api.create_task(draft).await;
        let task = self.cache.finish(result)?;

        self.cache.apply(CacheEvent::Inserted(task.clone()));
        Ok(task)
    }

    pub async fn edit(&mut self, task_id: i64, patch: &TaskPatch) -> Result<Task, ClientError> {
        self.cache.begin();
        let result = self.api.update_task(task_id, patch).await;
        let task = self.cache.finish(result)?;

        self.cache.apply(CacheEvent::Replaced(task.clone()));
        Ok(task)
    }

    pub async fn change_state(&mut self, task_id: i64, state_id: i64) -> Result<Task, ClientError> {
        self.cache.begin();
        let result = self.api.change_task_state(task_id, state_id).await;
        let task = self.cache.finish(result)?;

        self.cache.apply(CacheEvent::Replaced(task.clone()));
        Ok(task)
    }

    pub async fn remove(&mut self, task_id: i64) -> Result<(), ClientError> {
        self.cache.begin();
        let result = self.api.delete_task(task_id).await;
        let deleted = self.cache.finish(result)?;

        self.cache.apply(CacheEvent::Removed(deleted.id));
        Ok(())
    }

    /// Forget everything, e.g. on logout
    pub fn clear(&mut self) {
        self.cache.apply(CacheEvent::Cleared);
        self.cache.states.clear();
        self.cache.last_error = None;
    }
}
