//! AI scoring service boundary.
//!
//! Services treat the AI as a best-effort collaborator: every call site has a
//! fixed fallback so an outage degrades scoring quality, never availability.
//! [`crate::llm::RigAiService`] is the production implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Rubric, Task, TaskKind, TaskResponse};

/// Scores returned by [`AiService::evaluate_task_response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiEvaluation {
    /// Per-criterion scores, 0-100.
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    /// Overall score, 0-100.
    pub overall_score: f64,
    #[serde(default)]
    pub feedback: String,
    /// KSA tag -> achievement, 0-100.
    #[serde(default)]
    pub ksa_achievement: BTreeMap<String, f64>,
}

/// Context handed to [`AiService::generate_task`].
#[derive(Debug, Clone, Serialize)]
pub struct TaskGenerationRequest {
    pub career: String,
    /// Free-text interest or direction from the learner.
    pub interest: String,
    /// Titles of tasks already in the program, to avoid repeats.
    pub existing_titles: Vec<String>,
}

/// A task proposed by the AI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub required_ksa: Vec<String>,
    #[serde(default)]
    pub xp_reward: Option<u32>,
}

#[async_trait]
pub trait AiService: Send + Sync {
    /// Model identifier recorded on evaluations as `ai:<model>`.
    fn model_name(&self) -> &str;

    async fn evaluate_task_response(
        &self,
        task: &Task,
        response: &TaskResponse,
        rubric: &Rubric,
        required_ksa: &[String],
    ) -> Result<AiEvaluation>;

    async fn generate_task(&self, request: &TaskGenerationRequest) -> Result<GeneratedTask>;
}

/// Score used when no AI evaluation is available.
pub const NEUTRAL_SCORE: f64 = 70.0;

/// The neutral evaluation substituted when the AI is absent or fails.
pub fn neutral_evaluation(rubric: &Rubric, required_ksa: &[String]) -> AiEvaluation {
    AiEvaluation {
        scores: rubric
            .criterion_names()
            .map(|name| (name.to_string(), NEUTRAL_SCORE))
            .collect(),
        overall_score: NEUTRAL_SCORE,
        feedback: "Your response has been recorded. Detailed feedback is not available right now."
            .to_string(),
        ksa_achievement: required_ksa
            .iter()
            .map(|ksa| (ksa.clone(), NEUTRAL_SCORE))
            .collect(),
    }
}

/// Weighted mean of rubric scores, falling back to a plain mean when the
/// rubric names none of the scored criteria.
pub fn weighted_overall(rubric: &Rubric, scores: &BTreeMap<String, f64>) -> Option<f64> {
    let (sum, weight) = rubric
        .criteria
        .iter()
        .filter_map(|c| scores.get(&c.name).map(|score| (score * c.weight, c.weight)))
        .fold((0.0, 0.0), |(s, w), (score, weight)| (s + score, w + weight));
    if weight > 0.0 {
        return Some(sum / weight);
    }
    if scores.is_empty() {
        None
    } else {
        Some(scores.values().sum::<f64>() / scores.len() as f64)
    }
}
