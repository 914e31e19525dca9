mod common;

use aisquare_learning::error::Error;
use aisquare_learning::model::*;
use aisquare_learning::repository::Repositories;
use aisquare_learning::service::assessment::{PASSING_PERCENTAGE, completes_scenario};
use aisquare_learning::service::{
    AssessmentAttempt, AssessmentResult, AssessmentService, AttemptOptions, LearningContext,
    ProficiencyLevel,
};
use common::{assessment_source, question};

fn service() -> (AssessmentService, Repositories) {
    let repos = Repositories::in_memory();
    (AssessmentService::new(repos.clone()), repos)
}

async fn attempt(
    assessment: &AssessmentService,
    source: &SourceContent,
    attempt_type: AttemptType,
    options: AttemptOptions,
) -> AssessmentAttempt {
    assessment
        .create_assessment_attempt(&LearningContext::new("u1"), source, attempt_type, options)
        .await
        .unwrap()
}

/// Answer every question in order, correctly for the first `correct` of
/// them, and return the result reported with the last answer.
async fn answer_all(
    assessment: &AssessmentService,
    attempt: &AssessmentAttempt,
    correct: usize,
) -> AssessmentResult {
    let mut result = None;
    for (i, task) in attempt.tasks.iter().enumerate() {
        let answer = if i < correct { "a" } else { "b" };
        let outcome = assessment.submit_answer(task.id, "u1", answer).await.unwrap();
        result = outcome.result;
    }
    result.expect("last answer completes the attempt")
}

#[test]
fn proficiency_bands() {
    assert_eq!(ProficiencyLevel::from_percentage(90.0), ProficiencyLevel::Expert);
    assert_eq!(ProficiencyLevel::from_percentage(89.99), ProficiencyLevel::Proficient);
    assert_eq!(ProficiencyLevel::from_percentage(75.0), ProficiencyLevel::Proficient);
    assert_eq!(ProficiencyLevel::from_percentage(60.0), ProficiencyLevel::Intermediate);
    assert_eq!(ProficiencyLevel::from_percentage(59.9), ProficiencyLevel::Beginner);
    assert_eq!(ProficiencyLevel::Expert.to_string(), "Expert");
}

#[test]
fn only_passing_formal_attempts_complete_the_scenario() {
    assert!(completes_scenario(AttemptType::Formal, PASSING_PERCENTAGE));
    assert!(!completes_scenario(AttemptType::Formal, 69.9));
    assert!(!completes_scenario(AttemptType::Practice, 100.0));
}

#[tokio::test]
async fn eighteen_of_twenty_is_expert() {
    let (assessment, _repos) = service();
    let source = assessment_source("expert", 20);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    let result = answer_all(&assessment, &attempt, 18).await;

    assert_eq!(result.total_points, 18.0);
    assert_eq!(result.max_points, 20.0);
    assert_eq!(result.percentage, 90.0);
    assert_eq!(result.level, ProficiencyLevel::Expert);
    assert_eq!(result.answered, 20);
}

#[tokio::test]
async fn fourteen_of_twenty_is_not_expert() {
    let (assessment, _repos) = service();
    let source = assessment_source("not-expert", 20);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    let result = answer_all(&assessment, &attempt, 14).await;

    assert_eq!(result.percentage, 70.0);
    assert_ne!(result.level, ProficiencyLevel::Expert);
    assert_eq!(result.level, ProficiencyLevel::Intermediate);
}

#[tokio::test]
async fn formal_attempt_at_exactly_seventy_completes_the_scenario() {
    let (assessment, repos) = service();
    let source = assessment_source("pass", 10);
    let attempt = attempt(&assessment, &source, AttemptType::Formal, AttemptOptions::default()).await;

    let result = answer_all(&assessment, &attempt, 7).await;

    assert_eq!(result.percentage, 70.0);
    assert!(result.scenario_completed);
    let scenario = repos.scenarios.find_by_id(attempt.scenario.id).await.unwrap().unwrap();
    assert_eq!(scenario.status, ScenarioStatus::Completed);
}

#[tokio::test]
async fn formal_attempt_below_seventy_leaves_the_scenario_active() {
    let (assessment, repos) = service();
    let mut source = assessment_source("fail", 0);
    let mut heavy = question("heavy", "engaging", "a");
    heavy.points = 69.9;
    let mut light = question("light", "engaging", "a");
    light.points = 30.1;
    source.metadata.questions = vec![heavy, light];

    let attempt = attempt(&assessment, &source, AttemptType::Formal, AttemptOptions::default()).await;
    let result = answer_all(&assessment, &attempt, 1).await;

    assert!(result.percentage < 70.0);
    assert!((result.percentage - 69.9).abs() < 1e-9);
    assert!(!result.scenario_completed);
    let scenario = repos.scenarios.find_by_id(attempt.scenario.id).await.unwrap().unwrap();
    assert_eq!(scenario.status, ScenarioStatus::Active);
}

#[tokio::test]
async fn passing_practice_attempt_does_not_complete_the_scenario() {
    let (assessment, repos) = service();
    let source = assessment_source("practice", 4);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    let result = answer_all(&assessment, &attempt, 4).await;

    assert_eq!(result.percentage, 100.0);
    assert!(!result.scenario_completed);
    let scenario = repos.scenarios.find_by_id(attempt.scenario.id).await.unwrap().unwrap();
    assert_eq!(scenario.status, ScenarioStatus::Active);
    let program = repos.programs.find_by_id(attempt.program.id).await.unwrap().unwrap();
    assert_eq!(program.status, ProgramStatus::Completed);
}

#[tokio::test]
async fn attempt_numbers_count_per_type() {
    let (assessment, repos) = service();
    let source = assessment_source("numbers", 3);

    let p1 = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;
    let p2 = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;
    let f1 = attempt(&assessment, &source, AttemptType::Formal, AttemptOptions::default()).await;

    assert_eq!(p1.program.attempt_config().unwrap().attempt_number, 1);
    assert_eq!(p2.program.attempt_config().unwrap().attempt_number, 2);
    assert_eq!(f1.program.attempt_config().unwrap().attempt_number, 1);
    assert_eq!(p1.scenario.id, f1.scenario.id);
    assert_eq!(
        vec![p1.program.program_order, p2.program.program_order, f1.program.program_order],
        vec![0, 1, 2]
    );

    // Passing the formal attempt closes the scenario; numbering carries on
    // into the next one.
    answer_all(&assessment, &f1, 3).await;
    let f2 = attempt(&assessment, &source, AttemptType::Formal, AttemptOptions::default()).await;
    assert_ne!(f2.scenario.id, f1.scenario.id);
    assert_eq!(f2.program.attempt_config().unwrap().attempt_number, 2);
    assert_eq!(f2.program.program_order, 0);

    let scenarios = repos
        .scenarios
        .find_by_user_and_source("u1", "numbers")
        .await
        .unwrap();
    assert_eq!(scenarios.len(), 2);
}

#[tokio::test]
async fn starting_the_scenario_creates_no_programs() {
    let (assessment, repos) = service();
    let source = assessment_source("lazy", 3);

    let scenario = assessment
        .start_scenario(&LearningContext::new("u1"), &source)
        .await
        .unwrap();
    assert!(
        repos
            .programs
            .find_by_scenario(scenario.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn empty_question_bank_is_rejected() {
    let (assessment, _repos) = service();
    let source = assessment_source("empty", 0);

    let err = assessment
        .create_assessment_attempt(
            &LearningContext::new("u1"),
            &source,
            AttemptType::Practice,
            AttemptOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn question_limit_and_shuffle_take_a_subset() {
    let (assessment, _repos) = service();
    let source = assessment_source("subset", 10);
    let options = AttemptOptions {
        shuffle: true,
        question_limit: Some(3),
        time_limit_minutes: Some(15),
        ..AttemptOptions::default()
    };

    let attempt = attempt(&assessment, &source, AttemptType::Practice, options).await;

    assert_eq!(attempt.tasks.len(), 3);
    let bank: Vec<&str> = source.metadata.questions.iter().map(|q| q.id.as_str()).collect();
    assert!(
        attempt
            .tasks
            .iter()
            .all(|t| bank.contains(&t.config.question_id.as_deref().unwrap()))
    );
    let orders: Vec<u32> = attempt.tasks.iter().map(|t| t.task_order).collect();
    assert_eq!(orders, vec![0, 1, 2]);
    let config = attempt.program.attempt_config().unwrap();
    assert!(config.shuffle);
    assert_eq!(config.time_limit_minutes, Some(15));
    assert_eq!(attempt.tasks[0].status, TaskStatus::Active);
}

#[tokio::test]
async fn instant_feedback_reveals_correctness() {
    let (assessment, _repos) = service();
    let source = assessment_source("instant", 2);
    let options = AttemptOptions {
        instant_feedback: true,
        ..AttemptOptions::default()
    };
    let attempt = attempt(&assessment, &source, AttemptType::Practice, options).await;

    let outcome = assessment
        .submit_answer(attempt.tasks[0].id, "u1", "b")
        .await
        .unwrap();

    assert_eq!(outcome.correct, Some(false));
    let feedback = outcome.feedback.unwrap();
    assert!(feedback.contains("correct answer is a"), "{feedback}");
    assert_eq!(outcome.next_task.map(|t| t.id), Some(attempt.tasks[1].id));
    assert!(outcome.result.is_none());
}

#[tokio::test]
async fn feedback_is_withheld_without_instant_feedback() {
    let (assessment, _repos) = service();
    let source = assessment_source("withheld", 2);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    let outcome = assessment
        .submit_answer(attempt.tasks[0].id, "u1", " a ")
        .await
        .unwrap();

    assert!(outcome.correct.is_none());
    assert!(outcome.feedback.is_none());
}

#[tokio::test]
async fn answers_are_matched_exactly_after_trimming() {
    let (assessment, repos) = service();
    let source = assessment_source("exact", 2);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    let trimmed = assessment
        .submit_answer(attempt.tasks[0].id, "u1", "  a\n")
        .await
        .unwrap();
    let cased = assessment
        .submit_answer(attempt.tasks[1].id, "u1", "A")
        .await
        .unwrap();

    let trimmed = repos
        .evaluations
        .find_by_id(trimmed.evaluation_id)
        .await
        .unwrap()
        .unwrap();
    let cased = repos
        .evaluations
        .find_by_id(cased.evaluation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trimmed.result.correct, Some(true));
    assert_eq!(trimmed.evaluated_by, EvaluatedBy::System);
    assert_eq!(trimmed.scores.get("accuracy"), Some(&100.0));
    assert_eq!(cased.result.correct, Some(false));
    assert_eq!(cased.ksa_mapping.get("K-creating"), Some(&0.0));
}

#[tokio::test]
async fn completing_twice_returns_the_stored_result() {
    let (assessment, repos) = service();
    let source = assessment_source("idempotent", 4);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    assessment
        .submit_answer(attempt.tasks[0].id, "u1", "a")
        .await
        .unwrap();
    let first = assessment.complete_assessment(attempt.program.id).await.unwrap();
    let second = assessment.complete_assessment(attempt.program.id).await.unwrap();

    assert_eq!(first.answered, 1);
    assert_eq!(first.total_questions, 4);
    assert_eq!(first.percentage, 25.0);
    assert_eq!(first.completed_at, second.completed_at);

    let completions = repos
        .logs
        .find_by_scenario(attempt.scenario.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.kind == LogKind::AssessmentCompleted)
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn closing_an_attempt_early_skips_open_questions() {
    let (assessment, repos) = service();
    let source = assessment_source("early", 2);
    let attempt = attempt(&assessment, &source, AttemptType::Formal, AttemptOptions::default()).await;

    assessment
        .submit_answer(attempt.tasks[0].id, "u1", "a")
        .await
        .unwrap();
    let result = assessment.complete_assessment(attempt.program.id).await.unwrap();
    assert_eq!(result.percentage, 50.0);
    assert!(!result.scenario_completed);

    let tasks = repos.tasks.find_by_program(attempt.program.id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert_eq!(tasks[1].status, TaskStatus::Skipped);
    let program = repos
        .programs
        .find_by_id(attempt.program.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(program.status, ProgramStatus::Completed);

    let err = assessment
        .submit_answer(attempt.tasks[1].id, "u1", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "got {err:?}");
    assert!(
        repos
            .evaluations
            .find_by_task(attempt.tasks[1].id)
            .await
            .unwrap()
            .is_empty()
    );

    let scenario = repos
        .scenarios
        .find_by_id(attempt.scenario.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scenario.status, ScenarioStatus::Active);
}

#[tokio::test]
async fn results_break_down_by_domain() {
    let (assessment, _repos) = service();
    let source = assessment_source("domains", 4);
    let attempt = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    // q0 engaging ok, q1 creating ok, q2 engaging wrong, q3 creating wrong
    answer_all(&assessment, &attempt, 2).await;
    let report = assessment
        .get_assessment_results(attempt.program.id)
        .await
        .unwrap();

    assert_eq!(report.result.unwrap().percentage, 50.0);
    let engaging = &report.domains["engaging"];
    assert_eq!(engaging.total, 2);
    assert_eq!(engaging.correct, 1);
    assert_eq!(engaging.accuracy, 50.0);
    assert_eq!(report.questions.len(), 4);
    assert_eq!(report.questions[2].selected.as_deref(), Some("b"));
    assert_eq!(report.questions[2].correct, Some(false));
    assert_eq!(report.questions[2].correct_answer.as_deref(), Some("a"));
}

#[tokio::test]
async fn history_tracks_best_average_and_improvement() {
    let (assessment, _repos) = service();
    let source = assessment_source("history", 4);

    let first = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;
    answer_all(&assessment, &first, 2).await;
    let second = attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;
    answer_all(&assessment, &second, 3).await;
    // Open attempts are not part of the history.
    attempt(&assessment, &source, AttemptType::Practice, AttemptOptions::default()).await;

    let history = assessment.get_assessment_history("u1", "history").await.unwrap();

    assert_eq!(history.attempts.len(), 2);
    assert_eq!(history.best_score, Some(75.0));
    assert_eq!(history.average_score, Some(62.5));
    assert_eq!(history.improvement, Some(25.0));
    assert!(!history.formal_passed);

    let empty = assessment.get_assessment_history("nobody", "history").await.unwrap();
    assert!(empty.attempts.is_empty());
    assert!(empty.best_score.is_none());
    assert!(empty.improvement.is_none());
}
