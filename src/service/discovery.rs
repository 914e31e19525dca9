//! Career discovery.
//!
//! Three fixed exploration programs per scenario, softer AI scoring, XP
//! rewards, and two open-ended extensions: AI-generated tasks from learner
//! interest and user-directed branches outside the fixed programs.

use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::base::{
    LearningContext, Lifecycle, ModeHooks, ProgramPlan, TaskPlan, score_with_ai,
};
use crate::ai::{AiService, GeneratedTask, TaskGenerationRequest};
use crate::error::{Error, Result};
use crate::model::*;
use crate::repository::Repositories;
use crate::telemetry::metrics;

/// XP reward for tasks that do not declare one.
pub const DEFAULT_XP_REWARD: u32 = 10;

/// Program metadata key holding accumulated XP.
const XP_KEY: &str = "xp_earned";

pub struct DiscoveryService {
    lifecycle: Lifecycle,
    ai: Option<Arc<dyn AiService>>,
}

/// XP for one task: the score's share of the reward, rounded down.
pub fn xp_earned(overall_score: f64, xp_reward: u32) -> u32 {
    (overall_score.clamp(0.0, 100.0) * f64::from(xp_reward) / 100.0).floor() as u32
}

fn discovery_rubric() -> Rubric {
    Rubric::from_criteria([
        ("engagement", "Curiosity and effort shown in the response"),
        ("relevance", "Connection to the career and the task at hand"),
        ("creativity", "Original ideas or perspectives"),
    ])
}

fn exploration_templates(kind: ExplorationKind, career: &str) -> Vec<TaskTemplate> {
    match kind {
        ExplorationKind::DailyRoutine => vec![
            TaskTemplate::new(format!("Morning as a {career}"), TaskKind::Chat)
                .instructions(format!(
                    "Describe how you would plan the first hours of a typical day as a {career}."
                ))
                .required_ksa(["K1.1", "A1.1"])
                .xp_reward(10),
            TaskTemplate::new("Tools of the trade", TaskKind::Discussion)
                .instructions(format!(
                    "Pick two tools a {career} relies on and explain what each is for."
                ))
                .required_ksa(["K1.2", "S1.1"])
                .xp_reward(10),
        ],
        ExplorationKind::Challenge => vec![
            TaskTemplate::new("First real problem", TaskKind::Chat)
                .instructions(format!(
                    "A {career} faces an unexpected setback. Walk through how you would respond."
                ))
                .required_ksa(["S2.1", "A2.1"])
                .xp_reward(20),
            TaskTemplate::new("Make the call", TaskKind::Submission)
                .instructions(
                    "Choose between two competing priorities and justify your decision.",
                )
                .required_ksa(["S2.2", "K2.1"])
                .xp_reward(20),
        ],
        ExplorationKind::Growth => vec![
            TaskTemplate::new("Where next", TaskKind::Discussion)
                .instructions(format!(
                    "Sketch how a {career} might grow over the next five years."
                ))
                .required_ksa(["A3.1", "K3.1"])
                .xp_reward(15),
            TaskTemplate::new("Learning plan", TaskKind::Submission)
                .instructions("Write a short plan for the skills you would build first.")
                .required_ksa(["S3.1", "A3.2"])
                .xp_reward(15),
        ],
        ExplorationKind::Branch => vec![
            TaskTemplate::new(format!("Explore {career}"), TaskKind::Chat)
                .instructions(format!(
                    "Explain what draws you to {career} and what you expect to find."
                ))
                .xp_reward(DEFAULT_XP_REWARD),
            TaskTemplate::new("Test the idea", TaskKind::Submission)
                .instructions(format!(
                    "Describe one small experiment that would tell you whether {career} suits you."
                ))
                .xp_reward(DEFAULT_XP_REWARD),
        ],
    }
}

fn program_title(kind: ExplorationKind, career: &str) -> String {
    match kind {
        ExplorationKind::DailyRoutine => format!("A Day as a {career}"),
        ExplorationKind::Challenge => format!("{career} Challenges"),
        ExplorationKind::Growth => format!("Growing as a {career}"),
        ExplorationKind::Branch => career.to_string(),
    }
}

fn generated_plan(generated: GeneratedTask) -> TaskPlan {
    TaskPlan::new(
        generated.title,
        generated.kind,
        TaskConfig {
            description: generated.description,
            instructions: generated.instructions,
            xp_reward: Some(generated.xp_reward.unwrap_or(DEFAULT_XP_REWARD)),
            generated: true,
            ..TaskConfig::default()
        },
    )
    .required_ksa(generated.required_ksa)
}

fn interest_fallback(interest: &str) -> GeneratedTask {
    GeneratedTask {
        title: format!("Explore: {interest}"),
        description: String::new(),
        instructions: format!(
            "Research \"{interest}\" and describe what you found most surprising."
        ),
        kind: TaskKind::Chat,
        required_ksa: Vec::new(),
        xp_reward: Some(DEFAULT_XP_REWARD),
    }
}

/// XP and completion for one exploration program.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramXp {
    pub program_id: ProgramId,
    pub title: String,
    pub kind: ExplorationKind,
    pub status: ProgramStatus,
    pub xp_earned: u64,
    pub completed_tasks: usize,
    pub total_tasks: usize,
}

/// Aggregate view of a discovery scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ExplorationSummary {
    pub scenario_id: ScenarioId,
    pub career: String,
    pub total_xp: u64,
    pub programs_total: usize,
    pub programs_completed: usize,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub branch_count: usize,
    pub generated_task_count: usize,
    pub average_score: Option<f64>,
    pub programs: Vec<ProgramXp>,
}

fn program_xp(program: &Program) -> u64 {
    program
        .metadata_value(XP_KEY)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}

impl DiscoveryService {
    pub fn new(repos: Repositories, ai: Option<Arc<dyn AiService>>) -> Self {
        Self {
            lifecycle: Lifecycle::new(repos),
            ai,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    pub async fn start_scenario(
        &self,
        context: &LearningContext,
        source: &SourceContent,
    ) -> Result<Scenario> {
        self.lifecycle.start_scenario(self, context, source).await
    }

    pub async fn submit_task_response(
        &self,
        task_id: TaskId,
        user_id: &str,
        response: &TaskResponse,
    ) -> Result<Evaluation> {
        self.lifecycle
            .submit_task_response(self, task_id, user_id, response)
            .await
    }

    /// Ask the AI for a task, falling back to `fallback` when it is absent
    /// or fails.
    async fn generate(
        &self,
        request: &TaskGenerationRequest,
        fallback: GeneratedTask,
    ) -> (GeneratedTask, &'static str) {
        let Some(ai) = &self.ai else {
            return (fallback, "template");
        };
        match ai.generate_task(request).await {
            Ok(task) => (task, "ai"),
            Err(e) => {
                warn!(interest = %request.interest, "task generation failed, using template: {e}");
                metrics::ai_fallbacks().add(
                    1,
                    &[
                        KeyValue::new("mode", LearningMode::Discovery.as_str()),
                        KeyValue::new("operation", "generate"),
                    ],
                );
                (fallback, "template")
            }
        }
    }

    /// Append a task generated from the learner's free-text interest.
    pub async fn add_dynamic_task(
        &self,
        program_id: ProgramId,
        user_id: &str,
        interest: &str,
    ) -> Result<Task> {
        let program = self.lifecycle.require_program(program_id).await?;
        let config = program.exploration_config().ok_or_else(|| {
            Error::InvalidState(format!("program {program_id} is not a discovery program"))
        })?;
        if program.status == ProgramStatus::Completed {
            return Err(Error::InvalidState(format!(
                "program {program_id} is already completed"
            )));
        }

        let existing = self.lifecycle.repos().tasks.find_by_program(program_id).await?;
        let request = TaskGenerationRequest {
            career: config.career.clone(),
            interest: interest.to_string(),
            existing_titles: existing.into_iter().map(|t| t.title).collect(),
        };
        let (generated, origin) = self.generate(&request, interest_fallback(interest)).await;
        let task = self
            .lifecycle
            .append_task(&program, generated_plan(generated))
            .await?;

        self.lifecycle
            .log(
                NewLogEntry::new(program.scenario_id, user_id, LogKind::TaskGenerated)
                    .program(program.id)
                    .task(task.id)
                    .data(json!({ "interest": interest, "origin": origin })),
            )
            .await?;
        info!(task_id = %task.id, program_id = %program.id, origin, "dynamic task added");
        Ok(task)
    }

    /// Start a new exploration program in a user-chosen direction.
    ///
    /// The branch records every earlier program as lineage. It starts active
    /// when nothing else is open; otherwise it waits its turn in order.
    pub async fn branch_exploration(
        &self,
        scenario_id: ScenarioId,
        user_id: &str,
        direction: &str,
    ) -> Result<(Program, Vec<Task>)> {
        let mut scenario = self.lifecycle.require_scenario(scenario_id).await?;
        if scenario.mode != LearningMode::Discovery {
            return Err(Error::InvalidState(format!(
                "scenario {scenario_id} is not a discovery scenario"
            )));
        }
        let repos = self.lifecycle.repos();
        let programs = repos.programs.find_by_scenario(scenario_id).await?;
        let career = programs
            .iter()
            .find_map(|p| p.exploration_config().map(|c| c.career.clone()))
            .unwrap_or_else(|| scenario.title.clone());

        let mut tasks = Vec::new();
        let mut titles = Vec::new();
        for fallback in exploration_templates(ExplorationKind::Branch, direction) {
            let request = TaskGenerationRequest {
                career: career.clone(),
                interest: direction.to_string(),
                existing_titles: titles.clone(),
            };
            let fallback = GeneratedTask {
                title: fallback.title,
                description: fallback.description,
                instructions: fallback.instructions,
                kind: fallback.kind,
                required_ksa: fallback.required_ksa,
                xp_reward: fallback.xp_reward,
            };
            let (generated, _) = self.generate(&request, fallback).await;
            titles.push(generated.title.clone());
            tasks.push(generated_plan(generated));
        }

        let lineage: Vec<ProgramId> = programs.iter().map(|p| p.id).collect();
        let activate = programs
            .iter()
            .all(|p| p.status == ProgramStatus::Completed);
        let plan = ProgramPlan::new(
            program_title(ExplorationKind::Branch, direction),
            ProgramConfig::Discovery(ExplorationConfig {
                kind: ExplorationKind::Branch,
                career: career.clone(),
                focus: Some(direction.to_string()),
            }),
        )
        .metadata(json!({
            "lineage": lineage,
            "branched_from": lineage.last(),
            XP_KEY: 0,
        }))
        .tasks(tasks);

        if !scenario.is_active() {
            if let Some(active) = repos
                .scenarios
                .find_active_by_user_and_source(&scenario.user_id, &scenario.source_id)
                .await?
            {
                return Err(Error::InvalidState(format!(
                    "scenario {scenario_id} cannot reopen while {} is active",
                    active.id
                )));
            }
            scenario.reopen(chrono::Utc::now());
            repos.scenarios.update(&scenario).await?;
        }
        let (program, tasks) = self.lifecycle.append_program(&scenario, plan, activate).await?;

        self.lifecycle
            .log(
                NewLogEntry::new(scenario_id, user_id, LogKind::ExplorationBranched)
                    .program(program.id)
                    .data(json!({ "direction": direction, "lineage": lineage })),
            )
            .await?;
        info!(program_id = %program.id, direction, "exploration branched");
        Ok((program, tasks))
    }

    pub async fn get_exploration_summary(
        &self,
        scenario_id: ScenarioId,
    ) -> Result<ExplorationSummary> {
        let repos = self.lifecycle.repos();
        let scenario = self.lifecycle.require_scenario(scenario_id).await?;
        let programs = repos.programs.find_by_scenario(scenario_id).await?;

        let mut summary = ExplorationSummary {
            scenario_id,
            career: scenario.title.clone(),
            total_xp: 0,
            programs_total: programs.len(),
            programs_completed: 0,
            tasks_total: 0,
            tasks_completed: 0,
            branch_count: 0,
            generated_task_count: 0,
            average_score: None,
            programs: Vec::with_capacity(programs.len()),
        };

        for program in programs {
            let Some(config) = program.exploration_config() else {
                continue;
            };
            summary.career = config.career.clone();
            let tasks = repos.tasks.find_by_program(program.id).await?;
            let completed = tasks.iter().filter(|t| t.status.is_done()).count();
            let xp = program_xp(&program);

            summary.total_xp += xp;
            summary.tasks_total += tasks.len();
            summary.tasks_completed += completed;
            summary.generated_task_count += tasks.iter().filter(|t| t.config.generated).count();
            if program.status == ProgramStatus::Completed {
                summary.programs_completed += 1;
            }
            if config.kind == ExplorationKind::Branch {
                summary.branch_count += 1;
            }
            summary.programs.push(ProgramXp {
                program_id: program.id,
                title: program.title.clone(),
                kind: config.kind,
                status: program.status,
                xp_earned: xp,
                completed_tasks: completed,
                total_tasks: tasks.len(),
            });
        }

        let evaluations = repos.evaluations.find_by_scenario(scenario_id).await?;
        if !evaluations.is_empty() {
            summary.average_score = Some(
                evaluations.iter().map(Evaluation::overall_score).sum::<f64>()
                    / evaluations.len() as f64,
            );
        }
        Ok(summary)
    }
}

#[async_trait]
impl ModeHooks for DiscoveryService {
    fn mode(&self) -> LearningMode {
        LearningMode::Discovery
    }

    async fn create_initial_programs(
        &self,
        _scenario: &Scenario,
        source: &SourceContent,
    ) -> Result<Vec<ProgramPlan>> {
        let career = source
            .metadata
            .career
            .clone()
            .unwrap_or_else(|| source.title.clone());

        Ok([
            ExplorationKind::DailyRoutine,
            ExplorationKind::Challenge,
            ExplorationKind::Growth,
        ]
        .into_iter()
        .map(|kind| {
            ProgramPlan::new(
                program_title(kind, &career),
                ProgramConfig::Discovery(ExplorationConfig {
                    kind,
                    career: career.clone(),
                    focus: None,
                }),
            )
            .metadata(json!({ XP_KEY: 0 }))
            .tasks(exploration_templates(kind, &career).iter().map(TaskPlan::from))
        })
        .collect())
    }

    async fn evaluate_response(
        &self,
        task: &Task,
        program: &Program,
        response: &TaskResponse,
        _user_id: &str,
    ) -> Result<ScoredResponse> {
        let rubric = discovery_rubric();
        let (assessment, evaluated_by) =
            score_with_ai(self.ai.as_ref(), self.mode(), task, response, &rubric).await;

        let mut result = ScoreResult::from_percentage(assessment.overall_score);
        let reward = task.config.xp_reward.unwrap_or(DEFAULT_XP_REWARD);
        let xp = xp_earned(result.percentage(), reward);
        result.xp_earned = Some(xp);

        let mut program = self.lifecycle.require_program(program.id).await?;
        let total = program_xp(&program) + u64::from(xp);
        program.set_metadata(XP_KEY, json!(total));
        self.lifecycle.repos().programs.update(&program).await?;

        Ok(ScoredResponse {
            scores: assessment.scores,
            result,
            feedback: assessment.feedback,
            ksa_mapping: assessment.ksa_achievement,
            evaluated_by,
            details: json!({ "xp_reward": reward, "xp_earned": xp }),
        })
    }
}
