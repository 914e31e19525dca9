//! Persistence boundary.
//!
//! One repository trait per entity. The services only ever talk to a
//! [`Repositories`] bundle, so any store satisfying these traits can back
//! them: [`MemoryStore`] in-process, [`crate::db::Db`] on Postgres.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::*;

pub use memory::MemoryStore;

#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn find_by_id(&self, id: ScenarioId) -> Result<Option<Scenario>>;

    /// The active scenario for a (user, source) pair, if any.
    async fn find_active_by_user_and_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Option<Scenario>>;

    /// Every scenario for a (user, source) pair, newest first.
    async fn find_by_user_and_source(&self, user_id: &str, source_id: &str)
    -> Result<Vec<Scenario>>;

    async fn create(&self, scenario: &Scenario) -> Result<()>;

    async fn update(&self, scenario: &Scenario) -> Result<()>;
}

#[async_trait]
pub trait ProgramRepository: Send + Sync {
    async fn find_by_id(&self, id: ProgramId) -> Result<Option<Program>>;

    /// Programs of a scenario ordered by `program_order`.
    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Program>>;

    async fn create(&self, program: &Program) -> Result<()>;

    async fn update(&self, program: &Program) -> Result<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>>;

    /// Tasks of a program ordered by `task_order`.
    async fn find_by_program(&self, program_id: ProgramId) -> Result<Vec<Task>>;

    /// The task with the lowest `task_order` greater than `after_order`.
    async fn get_next_task(&self, program_id: ProgramId, after_order: u32) -> Result<Option<Task>>;

    async fn count_by_status(&self, program_id: ProgramId) -> Result<TaskStatusCounts>;

    async fn create(&self, task: &Task) -> Result<()>;

    async fn update(&self, task: &Task) -> Result<()>;
}

#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry>;

    /// Entries of a scenario in insertion order.
    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<LogEntry>>;

    async fn find_by_task(&self, task_id: TaskId) -> Result<Vec<LogEntry>>;
}

#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    async fn create(&self, evaluation: &Evaluation) -> Result<()>;

    async fn find_by_id(&self, id: EvaluationId) -> Result<Option<Evaluation>>;

    /// Evaluations of a task, oldest first.
    async fn find_by_task(&self, task_id: TaskId) -> Result<Vec<Evaluation>>;

    async fn find_by_program(&self, program_id: ProgramId) -> Result<Vec<Evaluation>>;

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Evaluation>>;
}

/// Task counts per status within one program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatusCounts {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub skipped: usize,
}

impl TaskStatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Active => self.active += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.active + self.completed + self.skipped
    }

    /// Completed plus skipped.
    pub fn done(&self) -> usize {
        self.completed + self.skipped
    }
}

impl FromIterator<TaskStatus> for TaskStatusCounts {
    fn from_iter<I: IntoIterator<Item = TaskStatus>>(iter: I) -> Self {
        let mut counts = Self::default();
        for status in iter {
            counts.record(status);
        }
        counts
    }
}

/// Handles to every repository, shared by all services.
#[derive(Clone)]
pub struct Repositories {
    pub scenarios: Arc<dyn ScenarioRepository>,
    pub programs: Arc<dyn ProgramRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub logs: Arc<dyn LogRepository>,
    pub evaluations: Arc<dyn EvaluationRepository>,
}

impl Repositories {
    /// Build a bundle over a single store implementing every repository.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ScenarioRepository
            + ProgramRepository
            + TaskRepository
            + LogRepository
            + EvaluationRepository
            + 'static,
    {
        Self {
            scenarios: store.clone(),
            programs: store.clone(),
            tasks: store.clone(),
            logs: store.clone(),
            evaluations: store,
        }
    }

    /// A bundle over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }
}
