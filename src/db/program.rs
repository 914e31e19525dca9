use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, ensure_updated, to_u32};
use crate::error::Result;
use crate::model::*;
use crate::repository::ProgramRepository;

const COLUMNS: &str =
    "id, scenario_id, title, program_order, status, config, metadata, created_at, started_at, completed_at";

#[derive(sqlx::FromRow)]
struct ProgramRow {
    id: Uuid,
    scenario_id: Uuid,
    title: String,
    program_order: i32,
    status: String,
    config: serde_json::Value,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl ProgramRow {
    fn try_into_program(self) -> Result<Program> {
        Ok(Program {
            id: ProgramId(self.id),
            scenario_id: ScenarioId(self.scenario_id),
            title: self.title,
            program_order: to_u32(self.program_order, "program_order")?,
            status: self.status.parse()?,
            config: serde_json::from_value(self.config)?,
            metadata: self.metadata,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[async_trait]
impl ProgramRepository for Db {
    async fn find_by_id(&self, id: ProgramId) -> Result<Option<Program>> {
        let row: Option<ProgramRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM programs WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ProgramRow::try_into_program).transpose()
    }

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Program>> {
        let rows: Vec<ProgramRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM programs WHERE scenario_id = $1 ORDER BY program_order"
        ))
        .bind(scenario_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProgramRow::try_into_program).collect()
    }

    async fn create(&self, program: &Program) -> Result<()> {
        sqlx::query(
            "INSERT INTO programs (id, scenario_id, title, program_order, status, config, metadata, created_at, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(program.id.0)
        .bind(program.scenario_id.0)
        .bind(&program.title)
        .bind(program.program_order as i32)
        .bind(program.status.as_str())
        .bind(serde_json::to_value(&program.config)?)
        .bind(&program.metadata)
        .bind(program.created_at)
        .bind(program.started_at)
        .bind(program.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, program: &Program) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE programs SET title = $1, status = $2, config = $3, metadata = $4, started_at = $5, completed_at = $6
             WHERE id = $7",
        )
        .bind(&program.title)
        .bind(program.status.as_str())
        .bind(serde_json::to_value(&program.config)?)
        .bind(&program.metadata)
        .bind(program.started_at)
        .bind(program.completed_at)
        .bind(program.id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        ensure_updated(rows_affected, "program", program.id)
    }
}
