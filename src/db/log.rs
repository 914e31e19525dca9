use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Db;
use crate::error::Result;
use crate::model::*;
use crate::repository::LogRepository;

const COLUMNS: &str = "id, scenario_id, program_id, task_id, user_id, kind, data, created_at";

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    scenario_id: Uuid,
    program_id: Option<Uuid>,
    task_id: Option<Uuid>,
    user_id: String,
    kind: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl LogRow {
    fn try_into_entry(self) -> Result<LogEntry> {
        Ok(LogEntry {
            id: LogId(self.id),
            scenario_id: ScenarioId(self.scenario_id),
            program_id: self.program_id.map(ProgramId),
            task_id: self.task_id.map(TaskId),
            user_id: self.user_id,
            kind: self.kind.parse()?,
            data: self.data,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl LogRepository for Db {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let entry = entry.into_entry();
        sqlx::query(
            "INSERT INTO logs (id, scenario_id, program_id, task_id, user_id, kind, data, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.0)
        .bind(entry.scenario_id.0)
        .bind(entry.program_id.map(|p| p.0))
        .bind(entry.task_id.map(|t| t.0))
        .bind(&entry.user_id)
        .bind(entry.kind.as_str())
        .bind(&entry.data)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM logs WHERE scenario_id = $1 ORDER BY seq"
        ))
        .bind(scenario_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRow::try_into_entry).collect()
    }

    async fn find_by_task(&self, task_id: TaskId) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM logs WHERE task_id = $1 ORDER BY seq"
        ))
        .bind(task_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRow::try_into_entry).collect()
    }
}
