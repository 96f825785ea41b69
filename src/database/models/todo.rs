use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A recently completed Todoist task logged locally
///
/// The table is capped at the 10 most recent completions; the
/// repository evicts the oldest row past that.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::completed_tasks)]
pub struct CompletedTask {
    /// Todoist task id
    pub id: String,

    /// Task content
    pub content: String,

    /// Todoist priority (4 = highest, 1 = lowest)
    pub priority: i32,

    /// Completion timestamp
    pub completed_at: DateTime<Utc>,
}

/// New completed-task row
#[derive(Debug, Clone, Insertable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::completed_tasks)]
pub struct NewCompletedTask {
    pub id: String,
    pub content: String,
    pub priority: i32,
    pub completed_at: DateTime<Utc>,
}
