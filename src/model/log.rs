//! Append-only activity log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LogId, ProgramId, ScenarioId, TaskId};

string_enum!(
    LogKind {
        ScenarioStarted => "scenario_started",
        ScenarioCompleted => "scenario_completed",
        Submission => "submission",
        Completion => "completion",
        Achievement => "achievement",
        TaskRetry => "task_retry",
        TaskSkipped => "task_skipped",
        TaskGenerated => "task_generated",
        ProgramActivated => "program_activated",
        ProgramCompleted => "program_completed",
        ExplorationBranched => "exploration_branched",
        AttemptStarted => "attempt_started",
        AssessmentCompleted => "assessment_completed",
    }
);

/// A write-once activity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogId,
    pub scenario_id: ScenarioId,
    pub program_id: Option<ProgramId>,
    pub task_id: Option<TaskId>,
    pub user_id: String,
    pub kind: LogKind,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Builder for log entries. Repositories assign id and timestamp.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub(crate) scenario_id: ScenarioId,
    pub(crate) program_id: Option<ProgramId>,
    pub(crate) task_id: Option<TaskId>,
    pub(crate) user_id: String,
    pub(crate) kind: LogKind,
    pub(crate) data: serde_json::Value,
}

impl NewLogEntry {
    pub fn new(scenario_id: ScenarioId, user_id: impl Into<String>, kind: LogKind) -> Self {
        Self {
            scenario_id,
            program_id: None,
            task_id: None,
            user_id: user_id.into(),
            kind,
            data: serde_json::json!({}),
        }
    }

    pub fn program(mut self, program_id: ProgramId) -> Self {
        self.program_id = Some(program_id);
        self
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn into_entry(self) -> LogEntry {
        LogEntry {
            id: LogId::new(),
            scenario_id: self.scenario_id,
            program_id: self.program_id,
            task_id: self.task_id,
            user_id: self.user_id,
            kind: self.kind,
            data: self.data,
            created_at: Utc::now(),
        }
    }
}
