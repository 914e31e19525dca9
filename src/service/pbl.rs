//! Problem-based learning.
//!
//! One program per stage of the source content, AI-scored chat tasks, and
//! the one backward transition in the system: retrying a completed task.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::base::{
    LearningContext, Lifecycle, ModeHooks, ProgramPlan, TaskPlan, score_with_ai,
};
use crate::ai::AiService;
use crate::error::{Error, Result};
use crate::model::*;
use crate::repository::Repositories;

/// Scores at or above this earn an achievement log entry.
pub const ACHIEVEMENT_THRESHOLD: f64 = 80.0;

pub struct PblService {
    lifecycle: Lifecycle,
    ai: Option<Arc<dyn AiService>>,
}

/// Completion of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageProgress {
    pub program_id: ProgramId,
    pub title: String,
    pub program_order: u32,
    pub status: ProgramStatus,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// Completed or skipped tasks over total, 0.0-1.0.
    pub completion_ratio: f64,
}

/// Aggregate progress through a PBL scenario.
#[derive(Debug, Clone, Serialize)]
pub struct LearningProgress {
    pub scenario_id: ScenarioId,
    pub status: ScenarioStatus,
    pub stages: Vec<StageProgress>,
    /// Over all tasks of all stages, 0.0-1.0.
    pub overall_completion: f64,
    /// Highest score seen per KSA tag across the scenario's evaluations.
    pub ksa_coverage: BTreeMap<String, f64>,
    pub average_score: Option<f64>,
    pub evaluation_count: usize,
}

fn default_rubric() -> Rubric {
    Rubric::from_criteria([
        ("understanding", "Grasp of the problem and the concepts involved"),
        ("application", "Use of knowledge to reason toward a solution"),
        ("communication", "Clarity and structure of the response"),
    ])
}

impl PblService {
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

    /// Reopen a completed task for another attempt.
    ///
    /// The owning program keeps its status; resubmitting closes the task again.
    pub async fn retry_task(&self, task_id: TaskId, user_id: &str) -> Result<Task> {
        let mut task = self.lifecycle.require_task(task_id).await?;
        task.reopen(Utc::now())?;
        self.lifecycle.repos().tasks.update(&task).await?;
        self.lifecycle
            .log(
                NewLogEntry::new(task.scenario_id, user_id, LogKind::TaskRetry)
                    .program(task.program_id)
                    .task(task.id)
                    .data(json!({ "attempt": task.attempt_count + 1 })),
            )
            .await?;
        info!(task_id = %task.id, attempt = task.attempt_count + 1, "task reopened for retry");
        Ok(task)
    }

    pub async fn get_learning_progress(&self, scenario_id: ScenarioId) -> Result<LearningProgress> {
        let repos = self.lifecycle.repos();
        let scenario = self.lifecycle.require_scenario(scenario_id).await?;
        let programs = repos.programs.find_by_scenario(scenario_id).await?;

        let mut stages = Vec::with_capacity(programs.len());
        let (mut done_total, mut task_total) = (0, 0);
        for program in programs {
            let counts = repos.tasks.count_by_status(program.id).await?;
            done_total += counts.done();
            task_total += counts.total();
            stages.push(StageProgress {
                program_id: program.id,
                title: program.title,
                program_order: program.program_order,
                status: program.status,
                completed_tasks: counts.done(),
                total_tasks: counts.total(),
                completion_ratio: ratio(counts.done(), counts.total()),
            });
        }

        let evaluations = repos.evaluations.find_by_scenario(scenario_id).await?;
        let mut ksa_coverage: BTreeMap<String, f64> = BTreeMap::new();
        for evaluation in &evaluations {
            for (ksa, score) in &evaluation.ksa_mapping {
                let best = ksa_coverage.entry(ksa.clone()).or_insert(*score);
                if *score > *best {
                    *best = *score;
                }
            }
        }
        let average_score = (!evaluations.is_empty()).then(|| {
            evaluations.iter().map(Evaluation::overall_score).sum::<f64>()
                / evaluations.len() as f64
        });

        Ok(LearningProgress {
            scenario_id,
            status: scenario.status,
            stages,
            overall_completion: ratio(done_total, task_total),
            ksa_coverage,
            average_score,
            evaluation_count: evaluations.len(),
        })
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[async_trait]
impl ModeHooks for PblService {
    fn mode(&self) -> LearningMode {
        LearningMode::Pbl
    }

    async fn create_initial_programs(
        &self,
        _scenario: &Scenario,
        source: &SourceContent,
    ) -> Result<Vec<ProgramPlan>> {
        let metadata = &source.metadata;
        let stages = if metadata.stages.is_empty() {
            // A source without stages is a single stage of its default tasks.
            vec![StageDefinition {
                id: "main".to_string(),
                title: source.title.clone(),
                description: source.description.clone(),
                stage_type: None,
                tasks: Vec::new(),
                rubric: None,
            }]
        } else {
            metadata.stages.clone()
        };

        let mut plans = Vec::with_capacity(stages.len());
        for stage in stages {
            let templates = if stage.tasks.is_empty() {
                &metadata.default_tasks
            } else {
                &stage.tasks
            };
            if templates.is_empty() {
                return Err(Error::InvalidState(format!(
                    "stage {} of source {} has no tasks",
                    stage.id, source.id
                )));
            }
            let rubric = stage.rubric.clone().or_else(|| metadata.rubric.clone());
            plans.push(
                ProgramPlan::new(
                    stage.title.clone(),
                    ProgramConfig::Pbl(StageConfig {
                        stage_id: stage.id.clone(),
                        stage_type: stage.stage_type.clone(),
                        rubric,
                    }),
                )
                .metadata(json!({ "description": stage.description }))
                .tasks(templates.iter().map(TaskPlan::from)),
            );
        }
        Ok(plans)
    }

    async fn evaluate_response(
        &self,
        task: &Task,
        program: &Program,
        response: &TaskResponse,
        user_id: &str,
    ) -> Result<ScoredResponse> {
        let rubric = task
            .config
            .rubric
            .clone()
            .or_else(|| program.stage_config().and_then(|c| c.rubric.clone()))
            .unwrap_or_else(default_rubric);

        let (assessment, evaluated_by) =
            score_with_ai(self.ai.as_ref(), self.mode(), task, response, &rubric).await;
        let result = ScoreResult::from_percentage(assessment.overall_score);

        if result.percentage() >= ACHIEVEMENT_THRESHOLD {
            self.lifecycle
                .log(
                    NewLogEntry::new(task.scenario_id, user_id, LogKind::Achievement)
                        .program(program.id)
                        .task(task.id)
                        .data(json!({
                            "score": result.percentage(),
                            "task": task.title,
                            "ksa": task.required_ksa,
                        })),
                )
                .await?;
        }

        Ok(ScoredResponse {
            scores: assessment.scores,
            result,
            feedback: assessment.feedback,
            ksa_mapping: assessment.ksa_achievement,
            evaluated_by,
            details: json!({
                "stage_id": program.stage_config().map(|c| c.stage_id.as_str()),
                "attempt": task.attempt_count + 1,
            }),
        })
    }
}
