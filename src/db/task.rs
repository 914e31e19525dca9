use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, ensure_updated, to_u32};
use crate::error::Result;
use crate::model::*;
use crate::repository::{TaskRepository, TaskStatusCounts};

const COLUMNS: &str = "id, program_id, scenario_id, task_order, title, kind, required_ksa, config, status, attempt_count, created_at, started_at, completed_at";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    program_id: Uuid,
    scenario_id: Uuid,
    task_order: i32,
    title: String,
    kind: String,
    required_ksa: Vec<String>,
    config: serde_json::Value,
    status: String,
    attempt_count: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            program_id: ProgramId(self.program_id),
            scenario_id: ScenarioId(self.scenario_id),
            task_order: to_u32(self.task_order, "task_order")?,
            title: self.title,
            kind: self.kind.parse()?,
            required_ksa: self.required_ksa,
            config: serde_json::from_value(self.config)?,
            status: self.status.parse()?,
            attempt_count: to_u32(self.attempt_count, "attempt_count")?,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[async_trait]
impl TaskRepository for Db {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TaskRow::try_into_task).transpose()
    }

    async fn find_by_program(&self, program_id: ProgramId) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE program_id = $1 ORDER BY task_order"
        ))
        .bind(program_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn get_next_task(&self, program_id: ProgramId, after_order: u32) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tasks
             WHERE program_id = $1 AND task_order > $2
             ORDER BY task_order LIMIT 1"
        ))
        .bind(program_id.0)
        .bind(after_order as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TaskRow::try_into_task).transpose()
    }

    async fn count_by_status(&self, program_id: ProgramId) -> Result<TaskStatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tasks WHERE program_id = $1 GROUP BY status",
        )
        .bind(program_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = TaskStatusCounts::default();
        for (status, n) in rows {
            let n = n as usize;
            match status.parse()? {
                TaskStatus::Pending => counts.pending = n,
                TaskStatus::Active => counts.active = n,
                TaskStatus::Completed => counts.completed = n,
                TaskStatus::Skipped => counts.skipped = n,
            }
        }
        Ok(counts)
    }

    async fn create(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, program_id, scenario_id, task_order, title, kind, required_ksa, config, status, attempt_count, created_at, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(task.id.0)
        .bind(task.program_id.0)
        .bind(task.scenario_id.0)
        .bind(task.task_order as i32)
        .bind(&task.title)
        .bind(task.kind.as_str())
        .bind(&task.required_ksa)
        .bind(serde_json::to_value(&task.config)?)
        .bind(task.status.as_str())
        .bind(task.attempt_count as i32)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE tasks SET title = $1, required_ksa = $2, config = $3, status = $4, attempt_count = $5, started_at = $6, completed_at = $7
             WHERE id = $8",
        )
        .bind(&task.title)
        .bind(&task.required_ksa)
        .bind(serde_json::to_value(&task.config)?)
        .bind(task.status.as_str())
        .bind(task.attempt_count as i32)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        ensure_updated(rows_affected, "task", task.id)
    }
}
