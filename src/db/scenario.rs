use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, ensure_updated};
use crate::error::Result;
use crate::model::*;
use crate::repository::ScenarioRepository;

const COLUMNS: &str = "id, user_id, source_id, mode, title, status, metadata, created_at, updated_at, last_active_at, completed_at";

#[derive(sqlx::FromRow)]
struct ScenarioRow {
    id: Uuid,
    user_id: String,
    source_id: String,
    mode: String,
    title: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ScenarioRow {
    fn try_into_scenario(self) -> Result<Scenario> {
        Ok(Scenario {
            id: ScenarioId(self.id),
            user_id: self.user_id,
            source_id: self.source_id,
            mode: self.mode.parse()?,
            title: self.title,
            status: self.status.parse()?,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_active_at: self.last_active_at,
            completed_at: self.completed_at,
        })
    }
}

#[async_trait]
impl ScenarioRepository for Db {
    async fn find_by_id(&self, id: ScenarioId) -> Result<Option<Scenario>> {
        let row: Option<ScenarioRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM scenarios WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ScenarioRow::try_into_scenario).transpose()
    }

    async fn find_active_by_user_and_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Option<Scenario>> {
        let row: Option<ScenarioRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM scenarios
             WHERE user_id = $1 AND source_id = $2 AND status = 'active'
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ScenarioRow::try_into_scenario).transpose()
    }

    async fn find_by_user_and_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Vec<Scenario>> {
        let rows: Vec<ScenarioRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM scenarios
             WHERE user_id = $1 AND source_id = $2
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScenarioRow::try_into_scenario).collect()
    }

    async fn create(&self, scenario: &Scenario) -> Result<()> {
        sqlx::query(
            "INSERT INTO scenarios (id, user_id, source_id, mode, title, status, metadata, created_at, updated_at, last_active_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(scenario.id.0)
        .bind(&scenario.user_id)
        .bind(&scenario.source_id)
        .bind(scenario.mode.as_str())
        .bind(&scenario.title)
        .bind(scenario.status.as_str())
        .bind(&scenario.metadata)
        .bind(scenario.created_at)
        .bind(scenario.updated_at)
        .bind(scenario.last_active_at)
        .bind(scenario.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, scenario: &Scenario) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE scenarios SET title = $1, status = $2, metadata = $3, updated_at = $4, last_active_at = $5, completed_at = $6
             WHERE id = $7",
        )
        .bind(&scenario.title)
        .bind(scenario.status.as_str())
        .bind(&scenario.metadata)
        .bind(scenario.updated_at)
        .bind(scenario.last_active_at)
        .bind(scenario.completed_at)
        .bind(scenario.id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        ensure_updated(rows_affected, "scenario", scenario.id)
    }
}
