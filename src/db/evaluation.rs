use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Db;
use crate::error::Result;
use crate::model::*;
use crate::repository::EvaluationRepository;

const COLUMNS: &str = "id, task_id, program_id, scenario_id, user_id, mode, scores, result, feedback, ksa_mapping, evaluated_by, details, created_at";

#[derive(sqlx::FromRow)]
struct EvaluationRow {
    id: Uuid,
    task_id: Uuid,
    program_id: Uuid,
    scenario_id: Uuid,
    user_id: String,
    mode: String,
    scores: serde_json::Value,
    result: serde_json::Value,
    feedback: String,
    ksa_mapping: serde_json::Value,
    evaluated_by: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl EvaluationRow {
    fn try_into_evaluation(self) -> Result<Evaluation> {
        Ok(Evaluation {
            id: EvaluationId(self.id),
            task_id: TaskId(self.task_id),
            program_id: ProgramId(self.program_id),
            scenario_id: ScenarioId(self.scenario_id),
            user_id: self.user_id,
            mode: self.mode.parse()?,
            scores: serde_json::from_value(self.scores)?,
            result: serde_json::from_value(self.result)?,
            feedback: self.feedback,
            ksa_mapping: serde_json::from_value(self.ksa_mapping)?,
            evaluated_by: self.evaluated_by.parse()?,
            details: self.details,
            created_at: self.created_at,
        })
    }
}

impl Db {
    async fn evaluations_where(&self, column: &str, id: Uuid) -> Result<Vec<Evaluation>> {
        let rows: Vec<EvaluationRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM evaluations WHERE {column} = $1 ORDER BY created_at"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(EvaluationRow::try_into_evaluation)
            .collect()
    }
}

#[async_trait]
impl EvaluationRepository for Db {
    async fn create(&self, evaluation: &Evaluation) -> Result<()> {
        sqlx::query(
            "INSERT INTO evaluations (id, task_id, program_id, scenario_id, user_id, mode, scores, result, feedback, ksa_mapping, evaluated_by, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(evaluation.id.0)
        .bind(evaluation.task_id.0)
        .bind(evaluation.program_id.0)
        .bind(evaluation.scenario_id.0)
        .bind(&evaluation.user_id)
        .bind(evaluation.mode.as_str())
        .bind(serde_json::to_value(&evaluation.scores)?)
        .bind(serde_json::to_value(evaluation.result)?)
        .bind(&evaluation.feedback)
        .bind(serde_json::to_value(&evaluation.ksa_mapping)?)
        .bind(evaluation.evaluated_by.to_string())
        .bind(&evaluation.details)
        .bind(evaluation.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        let row: Option<EvaluationRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM evaluations WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(EvaluationRow::try_into_evaluation).transpose()
    }

    async fn find_by_task(&self, task_id: TaskId) -> Result<Vec<Evaluation>> {
        self.evaluations_where("task_id", task_id.0).await
    }

    async fn find_by_program(&self, program_id: ProgramId) -> Result<Vec<Evaluation>> {
        self.evaluations_where("program_id", program_id.0).await
    }

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Evaluation>> {
        self.evaluations_where("scenario_id", scenario_id.0).await
    }
}
