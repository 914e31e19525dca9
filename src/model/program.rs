//! Programs: ordered phases within a scenario.
//!
//! A PBL stage, a discovery career branch, or an assessment attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProgramId, Rubric, Scenario, ScenarioId, object_mut};
use crate::error::{Error, Result};

string_enum!(
    ProgramStatus {
        Pending => "pending",
        Active => "active",
        Completed => "completed",
    }
);

impl ProgramStatus {
    pub fn can_transition_to(self, to: ProgramStatus) -> bool {
        use ProgramStatus::*;
        matches!((self, to), (Pending, Active) | (Active, Completed))
    }
}

string_enum!(
    AttemptType {
        Practice => "practice",
        Formal => "formal",
    }
);

string_enum!(
    /// Kind of career-exploration program.
    ExplorationKind {
        DailyRoutine => "daily_routine",
        Challenge => "challenge",
        Growth => "growth",
        /// User-directed pivot added after scenario start.
        Branch => "branch",
    }
);

/// PBL stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub stage_id: String,
    #[serde(default)]
    pub stage_type: Option<String>,
    #[serde(default)]
    pub rubric: Option<Rubric>,
}

/// Discovery program settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationConfig {
    pub kind: ExplorationKind,
    pub career: String,
    /// User-supplied direction for branches.
    #[serde(default)]
    pub focus: Option<String>,
}

/// Assessment attempt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptConfig {
    pub attempt_type: AttemptType,
    /// 1-based, counted per attempt type.
    pub attempt_number: u32,
    #[serde(default)]
    pub instant_feedback: bool,
    #[serde(default)]
    pub shuffle: bool,
    /// Advisory only; not enforced.
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub question_limit: Option<usize>,
}

/// Mode-specific program configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProgramConfig {
    Pbl(StageConfig),
    Discovery(ExplorationConfig),
    Assessment(AttemptConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub scenario_id: ScenarioId,
    pub title: String,
    /// Position within the scenario. Unique and contiguous from 0.
    pub program_order: u32,
    pub status: ProgramStatus,
    pub config: ProgramConfig,
    /// Accumulated mode-specific data (XP earned, lineage, results).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Program {
    pub fn new(
        scenario: &Scenario,
        program_order: u32,
        title: impl Into<String>,
        config: ProgramConfig,
    ) -> Self {
        Self {
            id: ProgramId::new(),
            scenario_id: scenario.id,
            title: title.into(),
            program_order,
            status: ProgramStatus::Pending,
            config,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, to: ProgramStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(ProgramStatus::Active)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(ProgramStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn attempt_config(&self) -> Option<&AttemptConfig> {
        match &self.config {
            ProgramConfig::Assessment(config) => Some(config),
            _ => None,
        }
    }

    pub fn exploration_config(&self) -> Option<&ExplorationConfig> {
        match &self.config {
            ProgramConfig::Discovery(config) => Some(config),
            _ => None,
        }
    }

    pub fn stage_config(&self) -> Option<&StageConfig> {
        match &self.config {
            ProgramConfig::Pbl(config) => Some(config),
            _ => None,
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: &str, value: serde_json::Value) {
        object_mut(&mut self.metadata).insert(key.to_string(), value);
    }
}
