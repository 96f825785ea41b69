use crate::database::models::{CompletedTask, NewCompletedTask};
use crate::database::repositories::TodoRepository;
use crate::database::DatabaseError;
use crate::jobs::supervisor::PollerTask;
use crate::upstream::{self, UpstreamError};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

const SERVICE: &str = "Todoist";
const BASE_URL: &str = "https://api.todoist.com/rest/v2";

#[derive(Debug, Error)]
pub enum TodoError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// An active Todoist task as the dashboard shows it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TodoTask {
    pub id: String,
    pub content: String,
    /// Todoist priority (4 = highest, 1 = lowest)
    pub priority: i32,
    #[serde(default)]
    pub due: Option<DueDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DueDate {
    /// Due date, YYYY-MM-DD
    pub date: String,
    /// Exact due time when the task has one, RFC 3339
    #[serde(default)]
    pub datetime: Option<String>,
}

/// Todoist REST v2 client with a short-poll task mirror
///
/// The dashboard reads the mirrored task list; only the poll loop and
/// the complete/reopen mutations talk to Todoist. Completions are
/// additionally logged to the local capped store so the dashboard can
/// show recent completions after Todoist hides them.
pub struct TodoistService {
    repository: Arc<dyn TodoRepository>,
    client: reqwest::Client,
    token: String,
    /// Only tasks carrying this label are mirrored; empty = all tasks
    label: String,
    base_url: String,
    poll_interval: Duration,
    mirror: RwLock<Vec<TodoTask>>,
}

impl TodoistService {
    pub fn new(
        repository: Arc<dyn TodoRepository>,
        client: reqwest::Client,
        token: String,
        label: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            repository,
            client,
            token,
            label,
            base_url: BASE_URL.to_string(),
            poll_interval,
            mirror: RwLock::new(Vec::new()),
        }
    }

    /// The most recently polled task list
    pub fn active_tasks(&self) -> Vec<TodoTask> {
        self.mirror.read().clone()
    }

    /// Fetch active tasks and replace the mirror, highest priority
    /// first
    pub async fn refresh(&self) -> Result<(), TodoError> {
        let url = if self.label.is_empty() {
            format!("{}/tasks", self.base_url)
        } else {
            format!("{}/tasks?label={}", self.base_url, self.label)
        };
        let payload = upstream::send_json(
            SERVICE,
            self.client.get(&url).bearer_auth(&self.token),
        )
        .await?;

        let mut tasks = parse_tasks(payload)?;
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!(tasks = tasks.len(), "Refreshed Todoist mirror");
        *self.mirror.write() = tasks;
        Ok(())
    }

    /// Close a task upstream and log the completion locally. Returns
    /// false when the task is not in the mirror.
    pub async fn complete_task(&self, task_id: &str) -> Result<bool, TodoError> {
        let task = {
            let mirror = self.mirror.read();
            mirror.iter().find(|t| t.id == task_id).cloned()
        };

        let Some(task) = task else {
            return Ok(false);
        };

        let url = format!("{}/tasks/{}/close", self.base_url, task_id);
        upstream::send_no_content(SERVICE, self.client.post(&url).bearer_auth(&self.token))
            .await?;

        self.repository
            .log_completed(NewCompletedTask {
                id: task.id.clone(),
                content: task.content,
                priority: task.priority,
                completed_at: Utc::now(),
            })
            .await?;

        self.mirror.write().retain(|t| t.id != task_id);
        Ok(true)
    }

    /// Reopen a previously completed task and drop it from the local
    /// completion log; the next poll brings it back into the mirror
    pub async fn reopen_task(&self, task_id: &str) -> Result<(), TodoError> {
        let url = format!("{}/tasks/{}/reopen", self.base_url, task_id);
        upstream::send_no_content(SERVICE, self.client.post(&url).bearer_auth(&self.token))
            .await?;

        self.repository.remove(task_id.to_string()).await?;
        Ok(())
    }

    /// Recently completed tasks, newest first
    pub async fn completed_log(&self) -> Result<Vec<CompletedTask>, TodoError> {
        Ok(self.repository.completed().await?)
    }
}

#[async_trait::async_trait]
impl PollerTask for TodoistService {
    fn name(&self) -> &'static str {
        "todoist_poll"
    }

    fn interval(&self) -> Duration {
        self.poll_interval
    }

    async fn tick(&self) {
        if let Err(error) = self.refresh().await {
            warn!(%error, "Todoist poll failed");
        }
    }
}

fn parse_tasks(payload: serde_json::Value) -> Result<Vec<TodoTask>, UpstreamError> {
    serde_json::from_value(payload).map_err(|e| UpstreamError::shape(SERVICE, e.to_string()))
}
