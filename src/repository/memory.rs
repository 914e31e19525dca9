//! In-process store backing every repository trait.
//!
//! Rows live in a single mutex-guarded map set. Last write wins, the same
//! discipline the Postgres backend gives.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    EvaluationRepository, LogRepository, ProgramRepository, ScenarioRepository, TaskRepository,
    TaskStatusCounts,
};
use crate::error::{Error, Result};
use crate::model::*;

#[derive(Default)]
struct MemoryState {
    scenarios: HashMap<ScenarioId, Scenario>,
    programs: HashMap<ProgramId, Program>,
    tasks: HashMap<TaskId, Task>,
    logs: Vec<LogEntry>,
    evaluations: Vec<Evaluation>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ScenarioRepository for MemoryStore {
    async fn find_by_id(&self, id: ScenarioId) -> Result<Option<Scenario>> {
        Ok(self.state()?.scenarios.get(&id).cloned())
    }

    async fn find_active_by_user_and_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Option<Scenario>> {
        let state = self.state()?;
        Ok(state
            .scenarios
            .values()
            .filter(|s| s.user_id == user_id && s.source_id == source_id && s.is_active())
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_by_user_and_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Vec<Scenario>> {
        let state = self.state()?;
        let mut found: Vec<Scenario> = state
            .scenarios
            .values()
            .filter(|s| s.user_id == user_id && s.source_id == source_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn create(&self, scenario: &Scenario) -> Result<()> {
        self.state()?.scenarios.insert(scenario.id, scenario.clone());
        Ok(())
    }

    async fn update(&self, scenario: &Scenario) -> Result<()> {
        let mut state = self.state()?;
        let slot = state
            .scenarios
            .get_mut(&scenario.id)
            .ok_or_else(|| Error::not_found("scenario", scenario.id))?;
        *slot = scenario.clone();
        Ok(())
    }
}

#[async_trait]
impl ProgramRepository for MemoryStore {
    async fn find_by_id(&self, id: ProgramId) -> Result<Option<Program>> {
        Ok(self.state()?.programs.get(&id).cloned())
    }

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Program>> {
        let state = self.state()?;
        let mut programs: Vec<Program> = state
            .programs
            .values()
            .filter(|p| p.scenario_id == scenario_id)
            .cloned()
            .collect();
        programs.sort_by_key(|p| p.program_order);
        Ok(programs)
    }

    async fn create(&self, program: &Program) -> Result<()> {
        self.state()?.programs.insert(program.id, program.clone());
        Ok(())
    }

    async fn update(&self, program: &Program) -> Result<()> {
        let mut state = self.state()?;
        let slot = state
            .programs
            .get_mut(&program.id)
            .ok_or_else(|| Error::not_found("program", program.id))?;
        *slot = program.clone();
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.state()?.tasks.get(&id).cloned())
    }

    async fn find_by_program(&self, program_id: ProgramId) -> Result<Vec<Task>> {
        let state = self.state()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.program_id == program_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.task_order);
        Ok(tasks)
    }

    async fn get_next_task(&self, program_id: ProgramId, after_order: u32) -> Result<Option<Task>> {
        let state = self.state()?;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.program_id == program_id && t.task_order > after_order)
            .min_by_key(|t| t.task_order)
            .cloned())
    }

    async fn count_by_status(&self, program_id: ProgramId) -> Result<TaskStatusCounts> {
        let state = self.state()?;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.program_id == program_id)
            .map(|t| t.status)
            .collect())
    }

    async fn create(&self, task: &Task) -> Result<()> {
        self.state()?.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let mut state = self.state()?;
        let slot = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| Error::not_found("task", task.id))?;
        *slot = task.clone();
        Ok(())
    }
}

#[async_trait]
impl LogRepository for MemoryStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let entry = entry.into_entry();
        self.state()?.logs.push(entry.clone());
        Ok(entry)
    }

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<LogEntry>> {
        let state = self.state()?;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.scenario_id == scenario_id)
            .cloned()
            .collect())
    }

    async fn find_by_task(&self, task_id: TaskId) -> Result<Vec<LogEntry>> {
        let state = self.state()?;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.task_id == Some(task_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EvaluationRepository for MemoryStore {
    async fn create(&self, evaluation: &Evaluation) -> Result<()> {
        self.state()?.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        let state = self.state()?;
        Ok(state.evaluations.iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_task(&self, task_id: TaskId) -> Result<Vec<Evaluation>> {
        let state = self.state()?;
        Ok(state
            .evaluations
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn find_by_program(&self, program_id: ProgramId) -> Result<Vec<Evaluation>> {
        let state = self.state()?;
        Ok(state
            .evaluations
            .iter()
            .filter(|e| e.program_id == program_id)
            .cloned()
            .collect())
    }

    async fn find_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Evaluation>> {
        let state = self.state()?;
        Ok(state
            .evaluations
            .iter()
            .filter(|e| e.scenario_id == scenario_id)
            .cloned()
            .collect())
    }
}
