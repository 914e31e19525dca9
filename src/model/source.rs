//! Source content: immutable definitions of learning material.
//!
//! Loaded from content files (see [`crate::content`]) and handed to the
//! services as-is. Only the fields the services read are modelled.

use serde::{Deserialize, Serialize};

use super::{LearningMode, TaskKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceContent {
    pub id: String,
    #[serde(rename = "type")]
    pub mode: LearningMode,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: SourceMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMetadata {
    /// PBL stages, in order.
    pub stages: Vec<StageDefinition>,
    /// Tasks used by stages that define none of their own.
    pub default_tasks: Vec<TaskTemplate>,
    /// Assessment question bank.
    pub questions: Vec<QuestionDefinition>,
    /// Career explored by a discovery path.
    pub career: Option<String>,
    /// Scenario-wide rubric, overridden per stage.
    pub rubric: Option<Rubric>,
    /// Advisory time limit for assessment attempts.
    pub time_limit_minutes: Option<u32>,
}

/// A PBL learning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-form label such as "foundation" or "advanced".
    #[serde(default)]
    pub stage_type: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
    #[serde(default)]
    pub rubric: Option<Rubric>,
}

/// Blueprint for a task created at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub required_ksa: Vec<String>,
    #[serde(default)]
    pub xp_reward: Option<u32>,
}

impl TaskTemplate {
    pub fn new(title: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            kind,
            instructions: String::new(),
            required_ksa: Vec::new(),
            xp_reward: None,
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn required_ksa(mut self, ksa: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_ksa = ksa.into_iter().map(Into::into).collect();
        self
    }

    pub fn xp_reward(mut self, xp: u32) -> Self {
        self.xp_reward = Some(xp);
        self
    }
}

/// A quiz question in an assessment bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDefinition {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    /// Competency domain used for the per-domain breakdown.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub ksa: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default = "default_points")]
    pub points: f64,
}

fn default_points() -> f64 {
    1.0
}

/// Scoring rubric handed to the AI service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rubric {
    pub criteria: Vec<RubricCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Rubric {
    pub fn from_criteria<'a>(criteria: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            criteria: criteria
                .into_iter()
                .map(|(name, description)| RubricCriterion {
                    name: name.to_string(),
                    description: description.to_string(),
                    weight: 1.0,
                })
                .collect(),
        }
    }

    pub fn criterion_names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }
}
