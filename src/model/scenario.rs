//! Scenarios: one user's engagement with a piece of source content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScenarioId, SourceContent};
use crate::error::{Error, Result};

string_enum!(
    /// The three learning modes. Doubles as the service kind used for dispatch.
    LearningMode {
        /// Problem-based learning: staged programs, AI-scored chat tasks.
        Pbl => "pbl",
        /// Career exploration with XP and user-directed branching.
        Discovery => "discovery",
        /// Quizzes taken as practice or formal attempts.
        Assessment => "assessment",
    }
);

string_enum!(
    ScenarioStatus {
        Active => "active",
        Completed => "completed",
    }
);

/// A user's engagement with one [`SourceContent`].
///
/// At most one active scenario exists per (user, source) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub user_id: String,
    pub source_id: String,
    pub mode: LearningMode,
    pub title: String,
    pub status: ScenarioStatus,
    /// Mode-specific data. Opaque to the lifecycle.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Scenario {
    pub fn new(user_id: impl Into<String>, source: &SourceContent) -> Self {
        let now = Utc::now();
        Self {
            id: ScenarioId::new(),
            user_id: user_id.into(),
            source_id: source.id.clone(),
            mode: source.mode,
            title: source.title.clone(),
            status: ScenarioStatus::Active,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            last_active_at: now,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ScenarioStatus::Active
    }

    /// Record user activity.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
        self.updated_at = now;
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == ScenarioStatus::Completed {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: ScenarioStatus::Completed.to_string(),
            });
        }
        self.status = ScenarioStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Reopen a completed scenario, e.g. when a discovery path branches again.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        self.status = ScenarioStatus::Active;
        self.completed_at = None;
        self.touch(now);
    }
}
