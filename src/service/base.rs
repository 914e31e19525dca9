//! Mode-independent scenario lifecycle.
//!
//! [`Lifecycle`] owns the flow every learning mode shares: starting or
//! resuming a scenario, recording a submission, and cascading completion
//! from tasks to programs to the scenario. Mode-specific behaviour plugs in
//! through [`ModeHooks`].
//!
//! Multi-step writes (log, evaluation, task, program) are independent
//! storage calls. A failure part-way leaves the earlier writes in place.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{Instrument, debug, info, warn};

use crate::ai::{AiEvaluation, AiService, neutral_evaluation};
use crate::error::{Error, Result};
use crate::model::*;
use crate::repository::Repositories;
use crate::telemetry::learning::{record_status_transition, start_submission_span};
use crate::telemetry::metrics;

/// Who is acting, passed into scenario start.
#[derive(Debug, Clone)]
pub struct LearningContext {
    pub user_id: String,
    pub language: Option<String>,
}

impl LearningContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            language: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A program to be created, before ids and ordering are assigned.
#[derive(Debug, Clone)]
pub struct ProgramPlan {
    pub title: String,
    pub config: ProgramConfig,
    pub metadata: serde_json::Value,
    pub tasks: Vec<TaskPlan>,
}

impl ProgramPlan {
    pub fn new(title: impl Into<String>, config: ProgramConfig) -> Self {
        Self {
            title: title.into(),
            config,
            metadata: json!({}),
            tasks: Vec::new(),
        }
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = TaskPlan>) -> Self {
        self.tasks = tasks.into_iter().collect();
        self
    }
}

/// A task to be created inside a planned program.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub title: String,
    pub kind: TaskKind,
    pub required_ksa: Vec<String>,
    pub config: TaskConfig,
}

impl TaskPlan {
    pub fn new(title: impl Into<String>, kind: TaskKind, config: TaskConfig) -> Self {
        Self {
            title: title.into(),
            kind,
            required_ksa: Vec::new(),
            config,
        }
    }

    pub fn required_ksa(mut self, ksa: Vec<String>) -> Self {
        self.required_ksa = ksa;
        self
    }

    fn into_task(self, program: &Program, task_order: u32) -> Task {
        let mut task = Task::new(program, task_order, self.title, self.kind);
        task.required_ksa = self.required_ksa;
        task.config = self.config;
        task
    }
}

impl From<&TaskTemplate> for TaskPlan {
    fn from(template: &TaskTemplate) -> Self {
        Self {
            title: template.title.clone(),
            kind: template.kind,
            required_ksa: template.required_ksa.clone(),
            config: TaskConfig {
                description: template.description.clone(),
                instructions: template.instructions.clone(),
                xp_reward: template.xp_reward,
                ..TaskConfig::default()
            },
        }
    }
}

/// Extension points each learning mode implements.
#[async_trait]
pub trait ModeHooks: Send + Sync {
    fn mode(&self) -> LearningMode;

    /// Programs created when a scenario starts. May be empty.
    async fn create_initial_programs(
        &self,
        scenario: &Scenario,
        source: &SourceContent,
    ) -> Result<Vec<ProgramPlan>>;

    /// Score one response.
    async fn evaluate_response(
        &self,
        task: &Task,
        program: &Program,
        response: &TaskResponse,
        user_id: &str,
    ) -> Result<ScoredResponse>;

    /// Called after a program transitions to completed. By default the
    /// scenario completes once every program has.
    async fn on_program_completed(
        &self,
        lifecycle: &Lifecycle,
        scenario: &Scenario,
        _program: &Program,
    ) -> Result<()> {
        lifecycle.complete_scenario_if_all_programs_done(scenario).await
    }
}

/// Shared scenario lifecycle over a repository bundle.
#[derive(Clone)]
pub struct Lifecycle {
    repos: Repositories,
}

impl Lifecycle {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub async fn require_scenario(&self, id: ScenarioId) -> Result<Scenario> {
        self.repos
            .scenarios
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("scenario", id))
    }

    pub async fn require_program(&self, id: ProgramId) -> Result<Program> {
        self.repos
            .programs
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("program", id))
    }

    pub async fn require_task(&self, id: TaskId) -> Result<Task> {
        self.repos
            .tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }

    pub async fn log(&self, entry: NewLogEntry) -> Result<LogEntry> {
        self.repos.logs.append(entry).await
    }

    // -----------------------------------------------------------------------
    // Scenario start / resume
    // -----------------------------------------------------------------------

    /// Resume the active scenario for (user, source) or create a new one.
    ///
    /// A new scenario gets all of its initial programs before this returns.
    pub async fn start_scenario(
        &self,
        hooks: &dyn ModeHooks,
        context: &LearningContext,
        source: &SourceContent,
    ) -> Result<Scenario> {
        if source.mode != hooks.mode() {
            return Err(Error::InvalidState(format!(
                "source {} is a {} source, not {}",
                source.id,
                source.mode,
                hooks.mode()
            )));
        }

        if let Some(scenario) = self
            .get_or_resume_scenario(&context.user_id, &source.id)
            .await?
        {
            debug!(scenario_id = %scenario.id, "resuming active scenario");
            return Ok(scenario);
        }

        let mut scenario = Scenario::new(context.user_id.clone(), source);
        if let Some(language) = &context.language {
            object_mut(&mut scenario.metadata).insert("language".to_string(), json!(language));
        }
        let plans = hooks.create_initial_programs(&scenario, source).await?;
        self.repos.scenarios.create(&scenario).await?;

        let program_count = plans.len();
        for (index, plan) in plans.into_iter().enumerate() {
            self.append_program(&scenario, plan, index == 0).await?;
        }

        self.log(
            NewLogEntry::new(scenario.id, &context.user_id, LogKind::ScenarioStarted).data(json!({
                "source_id": source.id,
                "mode": source.mode,
                "programs": program_count,
            })),
        )
        .await?;

        metrics::scenarios_started().add(1, &[KeyValue::new("mode", source.mode.as_str())]);
        info!(
            scenario_id = %scenario.id,
            user_id = %context.user_id,
            source_id = %source.id,
            programs = program_count,
            "scenario started"
        );
        Ok(scenario)
    }

    /// Active scenario for (user, source) with its last-active time bumped.
    /// Program state is left untouched.
    pub async fn get_or_resume_scenario(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Option<Scenario>> {
        let Some(mut scenario) = self
            .repos
            .scenarios
            .find_active_by_user_and_source(user_id, source_id)
            .await?
        else {
            return Ok(None);
        };
        scenario.touch(Utc::now());
        self.repos.scenarios.update(&scenario).await?;
        Ok(Some(scenario))
    }

    /// Create a program at the end of the scenario's order.
    ///
    /// With `activate`, the program and its first task start active.
    pub async fn append_program(
        &self,
        scenario: &Scenario,
        plan: ProgramPlan,
        activate: bool,
    ) -> Result<(Program, Vec<Task>)> {
        let existing = self.repos.programs.find_by_scenario(scenario.id).await?;
        let order = existing.len() as u32;

        let now = Utc::now();
        let mut program = Program::new(scenario, order, plan.title, plan.config);
        program.metadata = plan.metadata;
        if activate {
            program.activate(now)?;
        }
        self.repos.programs.create(&program).await?;

        let mut tasks = Vec::with_capacity(plan.tasks.len());
        for (index, task_plan) in plan.tasks.into_iter().enumerate() {
            let mut task = task_plan.into_task(&program, index as u32);
            if activate && index == 0 {
                task.activate(now)?;
            }
            self.repos.tasks.create(&task).await?;
            tasks.push(task);
        }

        debug!(
            program_id = %program.id,
            program_order = order,
            tasks = tasks.len(),
            "program created"
        );
        Ok((program, tasks))
    }

    /// Add a task at the end of a program. It starts active when the program
    /// is active and has no other task open.
    pub async fn append_task(&self, program: &Program, plan: TaskPlan) -> Result<Task> {
        if program.status == ProgramStatus::Completed {
            return Err(Error::InvalidState(format!(
                "program {} is already completed",
                program.id
            )));
        }
        let existing = self.repos.tasks.find_by_program(program.id).await?;
        let order = existing.last().map_or(0, |t| t.task_order + 1);
        let mut task = plan.into_task(program, order);
        let has_open_task = existing.iter().any(|t| t.status == TaskStatus::Active);
        if program.status == ProgramStatus::Active && !has_open_task {
            task.activate(Utc::now())?;
        }
        self.repos.tasks.create(&task).await?;
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Record, score, and complete one task response, then cascade.
    pub async fn submit_task_response(
        &self,
        hooks: &dyn ModeHooks,
        task_id: TaskId,
        user_id: &str,
        response: &TaskResponse,
    ) -> Result<Evaluation> {
        let span = start_submission_span(hooks.mode().as_str(), &task_id.0);
        self.submit_inner(hooks, task_id, user_id, response)
            .instrument(span)
            .await
    }

    async fn submit_inner(
        &self,
        hooks: &dyn ModeHooks,
        task_id: TaskId,
        user_id: &str,
        response: &TaskResponse,
    ) -> Result<Evaluation> {
        let started = Instant::now();
        let mut task = self.require_task(task_id).await?;
        let program = self.require_program(task.program_id).await?;

        if task.status.is_done() {
            return Err(Error::InvalidTransition {
                from: task.status.to_string(),
                to: TaskStatus::Completed.to_string(),
            });
        }
        ensure_open_program(&program, &task)?;

        let now = Utc::now();
        if task.status == TaskStatus::Pending {
            task.activate(now)?;
        }

        self.log(
            NewLogEntry::new(task.scenario_id, user_id, LogKind::Submission)
                .program(program.id)
                .task(task.id)
                .data(json!({
                    "response": response.content,
                    "time_spent_seconds": response.time_spent_seconds,
                })),
        )
        .await?;

        let scored = hooks
            .evaluate_response(&task, &program, response, user_id)
            .await?;
        let evaluation = Evaluation::new(&task, user_id, hooks.mode(), scored);
        self.repos.evaluations.create(&evaluation).await?;

        task.complete(Utc::now())?;
        self.repos.tasks.update(&task).await?;
        record_status_transition(
            &tracing::Span::current(),
            TaskStatus::Active.as_str(),
            TaskStatus::Completed.as_str(),
        );

        self.log(
            NewLogEntry::new(task.scenario_id, user_id, LogKind::Completion)
                .program(program.id)
                .task(task.id)
                .data(json!({
                    "evaluation_id": evaluation.id,
                    "score": evaluation.overall_score(),
                })),
        )
        .await?;

        metrics::task_submissions().add(1, &[KeyValue::new("mode", hooks.mode().as_str())]);
        metrics::evaluations_recorded().add(
            1,
            &[
                KeyValue::new("mode", hooks.mode().as_str()),
                KeyValue::new("evaluated_by", evaluation.evaluated_by.to_string()),
            ],
        );

        self.activate_next_task(&task).await?;
        self.check_program_completion(hooks, program.id).await?;

        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "task.submit")],
        );
        Ok(evaluation)
    }

    /// Mark a task skipped and cascade as if it had been completed.
    pub async fn skip_task(
        &self,
        hooks: &dyn ModeHooks,
        task_id: TaskId,
        user_id: &str,
    ) -> Result<Task> {
        let mut task = self.require_task(task_id).await?;
        let program = self.require_program(task.program_id).await?;
        let from = task.status;
        if from.is_done() {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: TaskStatus::Skipped.to_string(),
            });
        }
        ensure_open_program(&program, &task)?;
        task.skip(Utc::now())?;
        self.repos.tasks.update(&task).await?;
        self.log(
            NewLogEntry::new(task.scenario_id, user_id, LogKind::TaskSkipped)
                .program(program.id)
                .task(task.id),
        )
        .await?;
        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("entity", "task"),
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", task.status.as_str()),
            ],
        );

        self.activate_next_task(&task).await?;
        self.check_program_completion(hooks, program.id).await?;
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Completion cascade
    // -----------------------------------------------------------------------

    /// Open the next pending task after `task` if its program is active.
    async fn activate_next_task(&self, task: &Task) -> Result<Option<Task>> {
        let program = self.require_program(task.program_id).await?;
        if program.status != ProgramStatus::Active {
            return Ok(None);
        }
        let open = self.repos.tasks.find_by_program(program.id).await?;
        if open.iter().any(|t| t.status == TaskStatus::Active) {
            return Ok(None);
        }
        let next = open
            .into_iter()
            .find(|t| t.task_order > task.task_order && t.status == TaskStatus::Pending);
        match next {
            Some(mut next) => {
                next.activate(Utc::now())?;
                self.repos.tasks.update(&next).await?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Recompute program completion from its tasks.
    ///
    /// When every task is completed or skipped the program completes, the
    /// next pending program by order is activated, and the mode hook runs.
    /// Returns whether the program is completed.
    pub async fn check_program_completion(
        &self,
        hooks: &dyn ModeHooks,
        program_id: ProgramId,
    ) -> Result<bool> {
        let mut program = self.require_program(program_id).await?;
        if program.status == ProgramStatus::Completed {
            return Ok(true);
        }

        let counts = self.repos.tasks.count_by_status(program_id).await?;
        if counts.total() == 0 || counts.done() < counts.total() {
            return Ok(false);
        }

        let scenario = self.require_scenario(program.scenario_id).await?;
        let now = Utc::now();
        if program.status == ProgramStatus::Pending {
            program.activate(now)?;
        }
        program.complete(now)?;
        self.repos.programs.update(&program).await?;
        self.log(
            NewLogEntry::new(scenario.id, &scenario.user_id, LogKind::ProgramCompleted)
                .program(program.id)
                .data(json!({ "program_order": program.program_order, "tasks": counts })),
        )
        .await?;
        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("entity", "program"),
                KeyValue::new("from", "active"),
                KeyValue::new("to", "completed"),
            ],
        );
        info!(program_id = %program.id, order = program.program_order, "program completed");

        self.activate_program_after(&scenario, &program).await?;
        hooks
            .on_program_completed(self, &scenario, &program)
            .await?;
        Ok(true)
    }

    /// Activate the program at `program_order + 1` if it is still pending.
    async fn activate_program_after(
        &self,
        scenario: &Scenario,
        program: &Program,
    ) -> Result<Option<Program>> {
        let programs = self.repos.programs.find_by_scenario(scenario.id).await?;
        let Some(mut next) = programs
            .into_iter()
            .find(|p| p.program_order == program.program_order + 1)
        else {
            return Ok(None);
        };
        if next.status != ProgramStatus::Pending {
            return Ok(None);
        }

        let now = Utc::now();
        next.activate(now)?;
        self.repos.programs.update(&next).await?;
        if let Some(mut first) = self
            .repos
            .tasks
            .find_by_program(next.id)
            .await?
            .into_iter()
            .find(|t| t.status == TaskStatus::Pending)
        {
            first.activate(now)?;
            self.repos.tasks.update(&first).await?;
        }

        self.log(
            NewLogEntry::new(scenario.id, &scenario.user_id, LogKind::ProgramActivated)
                .program(next.id)
                .data(json!({ "program_order": next.program_order })),
        )
        .await?;
        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("entity", "program"),
                KeyValue::new("from", "pending"),
                KeyValue::new("to", "active"),
            ],
        );
        Ok(Some(next))
    }

    /// Complete the scenario once every one of its programs has completed.
    pub async fn complete_scenario_if_all_programs_done(&self, scenario: &Scenario) -> Result<()> {
        let programs = self.repos.programs.find_by_scenario(scenario.id).await?;
        if programs.is_empty()
            || programs
                .iter()
                .any(|p| p.status != ProgramStatus::Completed)
        {
            return Ok(());
        }
        self.complete_scenario(scenario.id, json!({ "programs": programs.len() }))
            .await
            .map(|_| ())
    }

    /// Mark a scenario completed. Already-completed scenarios are left alone.
    pub async fn complete_scenario(
        &self,
        scenario_id: ScenarioId,
        data: serde_json::Value,
    ) -> Result<Scenario> {
        let mut scenario = self.require_scenario(scenario_id).await?;
        if !scenario.is_active() {
            return Ok(scenario);
        }
        scenario.complete(Utc::now())?;
        self.repos.scenarios.update(&scenario).await?;
        self.log(
            NewLogEntry::new(scenario.id, &scenario.user_id, LogKind::ScenarioCompleted).data(data),
        )
        .await?;
        info!(scenario_id = %scenario.id, "scenario completed");
        Ok(scenario)
    }
}

/// Score a response with the AI service, substituting the neutral
/// evaluation when the service is absent or fails.
pub(crate) async fn score_with_ai(
    ai: Option<&Arc<dyn AiService>>,
    mode: LearningMode,
    task: &Task,
    response: &TaskResponse,
    rubric: &Rubric,
) -> (AiEvaluation, EvaluatedBy) {
    let Some(ai) = ai else {
        return (
            neutral_evaluation(rubric, &task.required_ksa),
            EvaluatedBy::System,
        );
    };

    match ai
        .evaluate_task_response(task, response, rubric, &task.required_ksa)
        .await
    {
        Ok(evaluation) => (evaluation, EvaluatedBy::Ai(ai.model_name().to_string())),
        Err(e) => {
            warn!(task_id = %task.id, mode = %mode, "ai evaluation failed, using neutral score: {e}");
            metrics::ai_fallbacks().add(
                1,
                &[
                    KeyValue::new("mode", mode.as_str()),
                    KeyValue::new("operation", "evaluate"),
                ],
            );
            (
                neutral_evaluation(rubric, &task.required_ksa),
                EvaluatedBy::System,
            )
        }
    }
}

/// Submissions and skips only land in the active program. A task reopened
/// for retry stays open after its program has completed.
fn ensure_open_program(program: &Program, task: &Task) -> Result<()> {
    match program.status {
        ProgramStatus::Active => Ok(()),
        ProgramStatus::Completed if task.status == TaskStatus::Active && task.attempt_count > 0 => {
            Ok(())
        }
        status => Err(Error::InvalidState(format!(
            "task {} belongs to program {} which is {status}",
            task.id, program.id
        ))),
    }
}
