//! Assessments.
//!
//! Unlike the other modes, no programs exist at scenario start. Each
//! practice or formal attempt becomes its own program, built from the
//! question bank on demand. Answers are scored by exact match.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::base::{LearningContext, Lifecycle, ModeHooks, ProgramPlan, TaskPlan};
use crate::error::{Error, Result};
use crate::model::*;
use crate::repository::Repositories;

/// Formal attempts at or above this percentage complete the scenario.
pub const PASSING_PERCENTAGE: f64 = 70.0;

/// Program metadata key holding the [`AssessmentResult`].
const RESULT_KEY: &str = "result";

/// Qualitative band for an assessment percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Proficient,
    Expert,
}

impl ProficiencyLevel {
    /// Expert >= 90, Proficient >= 75, Intermediate >= 60, else Beginner.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            ProficiencyLevel::Expert
        } else if percentage >= 75.0 {
            ProficiencyLevel::Proficient
        } else if percentage >= 60.0 {
            ProficiencyLevel::Intermediate
        } else {
            ProficiencyLevel::Beginner
        }
    }
}

impl std::fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProficiencyLevel::Beginner => "Beginner",
            ProficiencyLevel::Intermediate => "Intermediate",
            ProficiencyLevel::Proficient => "Proficient",
            ProficiencyLevel::Expert => "Expert",
        };
        write!(f, "{s}")
    }
}

/// Whether an attempt of `attempt_type` scoring `percentage` completes its
/// scenario. Practice attempts never do.
pub fn completes_scenario(attempt_type: AttemptType, percentage: f64) -> bool {
    attempt_type == AttemptType::Formal && percentage >= PASSING_PERCENTAGE
}

/// Caller-chosen settings for a new attempt.
#[derive(Debug, Clone, Default)]
pub struct AttemptOptions {
    pub shuffle: bool,
    pub instant_feedback: bool,
    pub time_limit_minutes: Option<u32>,
    /// Use only the first N questions (after shuffling).
    pub question_limit: Option<usize>,
}

/// A newly created attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentAttempt {
    pub scenario: Scenario,
    pub program: Program,
    pub tasks: Vec<Task>,
}

/// What the learner sees after answering.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub evaluation_id: EvaluationId,
    /// Only revealed with instant feedback.
    pub correct: Option<bool>,
    /// Only revealed with instant feedback.
    pub feedback: Option<String>,
    pub next_task: Option<Task>,
    /// Set when this answer finished the attempt.
    pub result: Option<AssessmentResult>,
}

/// Final score of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub program_id: ProgramId,
    pub scenario_id: ScenarioId,
    pub attempt_type: AttemptType,
    pub attempt_number: u32,
    pub total_points: f64,
    pub max_points: f64,
    pub percentage: f64,
    pub level: ProficiencyLevel,
    pub answered: usize,
    pub total_questions: usize,
    /// The attempt completed its scenario.
    pub scenario_completed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Accuracy within one question domain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DomainScore {
    pub correct: usize,
    pub answered: usize,
    pub total: usize,
    /// Correct over total questions in the domain, 0-100.
    pub accuracy: f64,
}

/// Review of one question after the attempt.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionReview {
    pub task_id: TaskId,
    pub question: Option<String>,
    pub domain: String,
    pub selected: Option<String>,
    pub correct_answer: Option<String>,
    pub correct: Option<bool>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    /// Absent while the attempt is still open.
    pub result: Option<AssessmentResult>,
    pub domains: BTreeMap<String, DomainScore>,
    pub questions: Vec<QuestionReview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub program_id: ProgramId,
    pub attempt_type: AttemptType,
    pub attempt_number: u32,
    pub percentage: f64,
    pub level: ProficiencyLevel,
    pub completed_at: DateTime<Utc>,
}

/// Completed attempts of one user on one source, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentHistory {
    pub attempts: Vec<AttemptSummary>,
    pub best_score: Option<f64>,
    pub average_score: Option<f64>,
    /// Last score minus first score; needs two or more attempts.
    pub improvement: Option<f64>,
    pub formal_passed: bool,
}

pub struct AssessmentService {
    lifecycle: Lifecycle,
}

fn question_plan(number: usize, question: QuestionDefinition) -> TaskPlan {
    TaskPlan::new(
        format!("Question {number}"),
        TaskKind::Quiz,
        TaskConfig {
            question_id: Some(question.id),
            question: Some(question.question),
            options: question.options,
            correct_answer: Some(question.correct_answer),
            explanation: question.explanation,
            domain: Some(question.domain),
            points: Some(question.points),
            ..TaskConfig::default()
        },
    )
    .required_ksa(question.ksa)
}

fn domain_of(task: &Task) -> String {
    match task.config.domain.as_deref() {
        Some(domain) if !domain.is_empty() => domain.to_string(),
        _ => "general".to_string(),
    }
}

/// The most recent evaluation per task.
fn latest_by_task(evaluations: Vec<Evaluation>) -> HashMap<TaskId, Evaluation> {
    let mut latest: HashMap<TaskId, Evaluation> = HashMap::new();
    for evaluation in evaluations {
        match latest.get(&evaluation.task_id) {
            Some(seen) if seen.created_at > evaluation.created_at => {}
            _ => {
                latest.insert(evaluation.task_id, evaluation);
            }
        }
    }
    latest
}

fn stored_result(program: &Program) -> Option<AssessmentResult> {
    program
        .metadata_value(RESULT_KEY)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

impl AssessmentService {
    pub fn new(repos: Repositories) -> Self {
        Self {
            lifecycle: Lifecycle::new(repos),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Resume or create the scenario. Creates no programs.
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

    /// Create a new attempt program from the source's question bank.
    ///
    /// Attempt numbers count up per attempt type across every scenario the
    /// user has had on this source.
    pub async fn create_assessment_attempt(
        &self,
        context: &LearningContext,
        source: &SourceContent,
        attempt_type: AttemptType,
        options: AttemptOptions,
    ) -> Result<AssessmentAttempt> {
        if source.metadata.questions.is_empty() {
            return Err(Error::InvalidState(format!(
                "source {} has no questions",
                source.id
            )));
        }
        let scenario = self.start_scenario(context, source).await?;
        let repos = self.lifecycle.repos();

        let mut previous = 0;
        for past in repos
            .scenarios
            .find_by_user_and_source(&context.user_id, &source.id)
            .await?
        {
            previous += repos
                .programs
                .find_by_scenario(past.id)
                .await?
                .iter()
                .filter_map(Program::attempt_config)
                .filter(|config| config.attempt_type == attempt_type)
                .count();
        }
        let attempt_number = previous as u32 + 1;

        let mut questions = source.metadata.questions.clone();
        if options.shuffle {
            questions.shuffle(&mut rand::thread_rng());
        }
        if let Some(limit) = options.question_limit {
            questions.truncate(limit.max(1));
        }

        let plan = ProgramPlan::new(
            format!("{} attempt {attempt_number}", capitalize(attempt_type.as_str())),
            ProgramConfig::Assessment(AttemptConfig {
                attempt_type,
                attempt_number,
                instant_feedback: options.instant_feedback,
                shuffle: options.shuffle,
                time_limit_minutes: options
                    .time_limit_minutes
                    .or(source.metadata.time_limit_minutes),
                question_limit: options.question_limit,
            }),
        )
        .tasks(
            questions
                .into_iter()
                .enumerate()
                .map(|(index, question)| question_plan(index + 1, question)),
        );

        let (program, tasks) = self.lifecycle.append_program(&scenario, plan, true).await?;
        self.lifecycle
            .log(
                NewLogEntry::new(scenario.id, &context.user_id, LogKind::AttemptStarted)
                    .program(program.id)
                    .data(json!({
                        "attempt_type": attempt_type,
                        "attempt_number": attempt_number,
                        "questions": tasks.len(),
                    })),
            )
            .await?;
        info!(
            program_id = %program.id,
            attempt_type = %attempt_type,
            attempt_number,
            "assessment attempt started"
        );

        Ok(AssessmentAttempt {
            scenario,
            program,
            tasks,
        })
    }

    /// Answer one question and move on.
    ///
    /// When no unanswered question remains the attempt is completed and its
    /// result returned with the outcome.
    pub async fn submit_answer(
        &self,
        task_id: TaskId,
        user_id: &str,
        answer: &str,
    ) -> Result<AnswerOutcome> {
        let evaluation = self
            .submit_task_response(task_id, user_id, &TaskResponse::new(answer))
            .await?;
        let program = self.lifecycle.require_program(evaluation.program_id).await?;
        let instant = program
            .attempt_config()
            .is_some_and(|config| config.instant_feedback);

        let task = self.lifecycle.require_task(task_id).await?;
        let tasks = self.lifecycle.repos().tasks.find_by_program(program.id).await?;
        let next_task = tasks
            .iter()
            .find(|t| t.task_order > task.task_order && !t.status.is_done())
            .or_else(|| tasks.iter().find(|t| !t.status.is_done()))
            .cloned();

        let result = match next_task {
            Some(_) => None,
            None => Some(self.complete_assessment(program.id).await?),
        };

        Ok(AnswerOutcome {
            evaluation_id: evaluation.id,
            correct: if instant { evaluation.result.correct } else { None },
            feedback: instant.then(|| evaluation.feedback.clone()),
            next_task,
            result,
        })
    }

    /// Score the attempt, close it, and complete the scenario if a formal
    /// attempt passed. Calling it again returns the stored result.
    pub async fn complete_assessment(&self, program_id: ProgramId) -> Result<AssessmentResult> {
        let repos = self.lifecycle.repos();
        let mut program = self.lifecycle.require_program(program_id).await?;
        let config = program.attempt_config().cloned().ok_or_else(|| {
            Error::InvalidState(format!("program {program_id} is not an assessment attempt"))
        })?;
        if let Some(result) = stored_result(&program) {
            return Ok(result);
        }

        let tasks = repos.tasks.find_by_program(program_id).await?;
        let latest = latest_by_task(repos.evaluations.find_by_program(program_id).await?);
        let max_points: f64 = tasks
            .iter()
            .map(|t| t.config.points.unwrap_or(1.0))
            .sum();
        let total_points: f64 = latest.values().map(|e| e.result.points).sum();
        let percentage = ScoreResult::new(total_points, max_points).percentage();
        let scenario_completed = completes_scenario(config.attempt_type, percentage);

        let now = Utc::now();
        let result = AssessmentResult {
            program_id,
            scenario_id: program.scenario_id,
            attempt_type: config.attempt_type,
            attempt_number: config.attempt_number,
            total_points,
            max_points,
            percentage,
            level: ProficiencyLevel::from_percentage(percentage),
            answered: latest.len(),
            total_questions: tasks.len(),
            scenario_completed,
            completed_at: now,
        };

        // Questions left open when the attempt closes count as unanswered.
        let mut unanswered = 0;
        for mut task in tasks.into_iter().filter(|t| !t.status.is_done()) {
            task.skip(now)?;
            repos.tasks.update(&task).await?;
            unanswered += 1;
        }

        if program.status == ProgramStatus::Pending {
            program.activate(now)?;
        }
        if program.status == ProgramStatus::Active {
            program.complete(now)?;
        }
        program.set_metadata(RESULT_KEY, serde_json::to_value(&result)?);
        repos.programs.update(&program).await?;

        let scenario = self.lifecycle.require_scenario(program.scenario_id).await?;
        self.lifecycle
            .log(
                NewLogEntry::new(scenario.id, &scenario.user_id, LogKind::AssessmentCompleted)
                    .program(program_id)
                    .data(json!({
                        "percentage": percentage,
                        "level": result.level,
                        "attempt_type": config.attempt_type,
                        "unanswered": unanswered,
                    })),
            )
            .await?;
        info!(
            program_id = %program_id,
            percentage,
            level = %result.level,
            "assessment completed"
        );

        if scenario_completed {
            self.lifecycle
                .complete_scenario(
                    scenario.id,
                    json!({ "program_id": program_id, "percentage": percentage }),
                )
                .await?;
        }
        Ok(result)
    }

    /// Per-domain accuracy and per-question review for one attempt.
    pub async fn get_assessment_results(&self, program_id: ProgramId) -> Result<AssessmentReport> {
        let repos = self.lifecycle.repos();
        let program = self.lifecycle.require_program(program_id).await?;
        if program.attempt_config().is_none() {
            return Err(Error::InvalidState(format!(
                "program {program_id} is not an assessment attempt"
            )));
        }
        let tasks = repos.tasks.find_by_program(program_id).await?;
        let latest = latest_by_task(repos.evaluations.find_by_program(program_id).await?);

        let mut domains: BTreeMap<String, DomainScore> = BTreeMap::new();
        let mut questions = Vec::with_capacity(tasks.len());
        for task in tasks {
            let domain = domain_of(&task);
            let evaluation = latest.get(&task.id);
            let correct = evaluation.and_then(|e| e.result.correct);

            let score = domains.entry(domain.clone()).or_default();
            score.total += 1;
            if evaluation.is_some() {
                score.answered += 1;
            }
            if correct == Some(true) {
                score.correct += 1;
            }

            questions.push(QuestionReview {
                task_id: task.id,
                question: task.config.question,
                domain,
                selected: evaluation
                    .and_then(|e| e.details.get("selected"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                correct_answer: task.config.correct_answer,
                correct,
                explanation: task.config.explanation,
            });
        }
        for score in domains.values_mut() {
            score.accuracy = score.correct as f64 * 100.0 / score.total as f64;
        }

        Ok(AssessmentReport {
            result: stored_result(&program),
            domains,
            questions,
        })
    }

    /// Completed attempts across every scenario of (user, source).
    pub async fn get_assessment_history(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<AssessmentHistory> {
        let repos = self.lifecycle.repos();
        let mut attempts = Vec::new();
        for scenario in repos
            .scenarios
            .find_by_user_and_source(user_id, source_id)
            .await?
        {
            for program in repos.programs.find_by_scenario(scenario.id).await? {
                if let Some(result) = stored_result(&program) {
                    attempts.push(AttemptSummary {
                        program_id: program.id,
                        attempt_type: result.attempt_type,
                        attempt_number: result.attempt_number,
                        percentage: result.percentage,
                        level: result.level,
                        completed_at: result.completed_at,
                    });
                }
            }
        }
        attempts.sort_by_key(|a| a.completed_at);

        let scores: Vec<f64> = attempts.iter().map(|a| a.percentage).collect();
        let best_score = scores.iter().copied().reduce(f64::max);
        let average_score =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);
        let improvement = match scores.as_slice() {
            [first, .., last] => Some(last - first),
            _ => None,
        };
        let formal_passed = attempts
            .iter()
            .any(|a| completes_scenario(a.attempt_type, a.percentage));

        Ok(AssessmentHistory {
            attempts,
            best_score,
            average_score,
            improvement,
            formal_passed,
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl ModeHooks for AssessmentService {
    fn mode(&self) -> LearningMode {
        LearningMode::Assessment
    }

    async fn create_initial_programs(
        &self,
        _scenario: &Scenario,
        _source: &SourceContent,
    ) -> Result<Vec<ProgramPlan>> {
        Ok(Vec::new())
    }

    async fn evaluate_response(
        &self,
        task: &Task,
        _program: &Program,
        response: &TaskResponse,
        _user_id: &str,
    ) -> Result<ScoredResponse> {
        let expected = task.config.correct_answer.as_deref().ok_or_else(|| {
            Error::InvalidState(format!("task {} has no correct answer", task.id))
        })?;
        let selected = response.content.trim();
        let correct = selected == expected.trim();
        let points = task.config.points.unwrap_or(1.0);

        let mut result = ScoreResult::new(if correct { points } else { 0.0 }, points);
        result.correct = Some(correct);
        let achievement = if correct { 100.0 } else { 0.0 };

        let mut feedback = if correct {
            "Correct.".to_string()
        } else {
            format!("Incorrect. The correct answer is {expected}.")
        };
        if let Some(explanation) = &task.config.explanation {
            feedback.push(' ');
            feedback.push_str(explanation);
        }

        Ok(ScoredResponse {
            scores: BTreeMap::from([("accuracy".to_string(), achievement)]),
            result,
            feedback,
            ksa_mapping: task
                .required_ksa
                .iter()
                .map(|ksa| (ksa.clone(), achievement))
                .collect(),
            evaluated_by: EvaluatedBy::System,
            details: json!({
                "selected": selected,
                "question_id": task.config.question_id,
                "domain": domain_of(task),
                "time_spent_seconds": response.time_spent_seconds,
            }),
        })
    }

    /// Scenario completion is decided by [`AssessmentService::complete_assessment`].
    async fn on_program_completed(
        &self,
        _lifecycle: &Lifecycle,
        _scenario: &Scenario,
        _program: &Program,
    ) -> Result<()> {
        Ok(())
    }
}
