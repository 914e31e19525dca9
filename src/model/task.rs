//! Tasks: atomic units of work within a program.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Program, ProgramId, Rubric, ScenarioId, TaskId};
use crate::error::{Error, Result};

string_enum!(
    #[derive(Default)]
    TaskKind {
        #[default]
        Chat => "chat",
        Quiz => "quiz",
        Discussion => "discussion",
        Submission => "submission",
    }
);

string_enum!(
    /// Lifecycle status of a task.
    TaskStatus {
        /// Waiting for the previous task to finish.
        Pending => "pending",
        /// Open for submissions.
        Active => "active",
        Completed => "completed",
        Skipped => "skipped",
    }
);

impl TaskStatus {
    /// Can a task move from self to `to` in forward flow?
    ///
    /// Retry (completed -> active) is deliberately absent; it goes through
    /// [`Task::reopen`].
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Active) | (Pending, Skipped) | (Active, Completed) | (Active, Skipped)
        )
    }

    /// Completed or skipped.
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

/// Mode-specific task settings. Fields a mode does not use stay empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub description: String,
    pub instructions: String,
    pub rubric: Option<Rubric>,

    // Quiz
    pub question_id: Option<String>,
    pub question: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub domain: Option<String>,
    pub points: Option<f64>,

    // Discovery
    pub xp_reward: Option<u32>,
    /// Created after scenario start from user interest.
    pub generated: bool,
}

/// An atomic question or activity within a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub program_id: ProgramId,
    pub scenario_id: ScenarioId,
    /// Position within the program, zero-based.
    pub task_order: u32,
    pub title: String,
    pub kind: TaskKind,
    /// Knowledge/skill/attitude tags the task exercises.
    pub required_ksa: Vec<String>,
    pub config: TaskConfig,
    pub status: TaskStatus,
    /// Number of times the task has been retried.
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(program: &Program, task_order: u32, title: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: TaskId::new(),
            program_id: program.id,
            scenario_id: program.scenario_id,
            task_order,
            title: title.into(),
            kind,
            required_ksa: Vec::new(),
            config: TaskConfig::default(),
            status: TaskStatus::Pending,
            attempt_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, to: TaskStatus) -> Result<()> {
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
        self.transition(TaskStatus::Active)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Skipped)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Completed -> active. The only backward move a task can make.
    pub fn reopen(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TaskStatus::Completed {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: TaskStatus::Active.to_string(),
            });
        }
        self.status = TaskStatus::Active;
        self.completed_at = None;
        self.started_at = Some(now);
        self.attempt_count += 1;
        Ok(())
    }
}

/// A learner's answer to a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResponse {
    pub content: String,
    #[serde(default)]
    pub time_spent_seconds: Option<u32>,
}

impl TaskResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            time_spent_seconds: None,
        }
    }

    pub fn time_spent(mut self, seconds: u32) -> Self {
        self.time_spent_seconds = Some(seconds);
        self
    }
}
