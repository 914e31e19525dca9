//! Evaluations: the scored outcome of one task submission.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EvaluationId, LearningMode, ProgramId, ScenarioId, Task, TaskId};
use crate::error::{Error, Result};

/// Who produced an evaluation. Serialized as `system` or `ai:<model>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EvaluatedBy {
    System,
    Ai(String),
}

impl std::fmt::Display for EvaluatedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluatedBy::System => f.write_str("system"),
            EvaluatedBy::Ai(model) => write!(f, "ai:{model}"),
        }
    }
}

impl std::str::FromStr for EvaluatedBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(EvaluatedBy::System),
            other => other
                .strip_prefix("ai:")
                .filter(|model| !model.is_empty())
                .map(|model| EvaluatedBy::Ai(model.to_string()))
                .ok_or_else(|| Error::Other(format!("unknown evaluator {other:?}"))),
        }
    }
}

impl From<EvaluatedBy> for String {
    fn from(value: EvaluatedBy) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for EvaluatedBy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Points earned against points available. Percentages are always derived
/// from this pair, never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreResult {
    pub points: f64,
    pub max_points: f64,
    /// Set for exact-match questions.
    #[serde(default)]
    pub correct: Option<bool>,
    /// Set for discovery tasks.
    #[serde(default)]
    pub xp_earned: Option<u32>,
}

impl ScoreResult {
    pub fn new(points: f64, max_points: f64) -> Self {
        Self {
            points,
            max_points,
            correct: None,
            xp_earned: None,
        }
    }

    /// A 0-100 score expressed as points out of 100.
    pub fn from_percentage(score: f64) -> Self {
        Self::new(score.clamp(0.0, 100.0), 100.0)
    }

    pub fn percentage(&self) -> f64 {
        if self.max_points <= 0.0 {
            0.0
        } else {
            self.points * 100.0 / self.max_points
        }
    }
}

/// What a mode's evaluation hook produces. The lifecycle stamps ids onto it.
#[derive(Debug, Clone)]
pub struct ScoredResponse {
    /// Per-dimension scores, 0-100.
    pub scores: BTreeMap<String, f64>,
    pub result: ScoreResult,
    pub feedback: String,
    /// KSA tag -> achievement score, 0-100.
    pub ksa_mapping: BTreeMap<String, f64>,
    pub evaluated_by: EvaluatedBy,
    pub details: serde_json::Value,
}

/// The immutable scoring record for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub task_id: TaskId,
    pub program_id: ProgramId,
    pub scenario_id: ScenarioId,
    pub user_id: String,
    pub mode: LearningMode,
    pub scores: BTreeMap<String, f64>,
    pub result: ScoreResult,
    pub feedback: String,
    pub ksa_mapping: BTreeMap<String, f64>,
    pub evaluated_by: EvaluatedBy,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn new(
        task: &Task,
        user_id: impl Into<String>,
        mode: LearningMode,
        scored: ScoredResponse,
    ) -> Self {
        Self {
            id: EvaluationId::new(),
            task_id: task.id,
            program_id: task.program_id,
            scenario_id: task.scenario_id,
            user_id: user_id.into(),
            mode,
            scores: scored.scores,
            result: scored.result,
            feedback: scored.feedback,
            ksa_mapping: scored.ksa_mapping,
            evaluated_by: scored.evaluated_by,
            details: scored.details,
            created_at: Utc::now(),
        }
    }

    /// Overall score as a percentage of available points.
    pub fn overall_score(&self) -> f64 {
        self.result.percentage()
    }
}
