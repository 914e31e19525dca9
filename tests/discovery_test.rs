mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use aisquare_learning::ai::AiService;
use aisquare_learning::error::Error;
use aisquare_learning::model::*;
use aisquare_learning::repository::Repositories;
use aisquare_learning::service::discovery::xp_earned;
use aisquare_learning::service::{DiscoveryService, LearningContext};
use common::{ScriptedAi, discovery_source};

fn with_ai(repos: &Repositories, ai: &Arc<ScriptedAi>) -> DiscoveryService {
    DiscoveryService::new(repos.clone(), Some(ai.clone() as Arc<dyn AiService>))
}

async fn start(discovery: &DiscoveryService, repos: &Repositories) -> (Scenario, Vec<Program>) {
    let scenario = discovery
        .start_scenario(&LearningContext::new("u1"), &discovery_source("career", "Chef"))
        .await
        .unwrap();
    let programs = repos.programs.find_by_scenario(scenario.id).await.unwrap();
    (scenario, programs)
}

#[test]
fn xp_is_the_floored_share_of_the_reward() {
    assert_eq!(xp_earned(75.0, 10), 7);
    assert_eq!(xp_earned(100.0, 10), 10);
    assert_eq!(xp_earned(0.0, 10), 0);
    assert_eq!(xp_earned(99.9, 20), 19);
    assert_eq!(xp_earned(150.0, 10), 10);
}

#[tokio::test]
async fn creates_three_exploration_programs() {
    let repos = Repositories::in_memory();
    let discovery = DiscoveryService::new(repos.clone(), None);
    let (_scenario, programs) = start(&discovery, &repos).await;

    let kinds: Vec<ExplorationKind> = programs
        .iter()
        .map(|p| p.exploration_config().unwrap().kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ExplorationKind::DailyRoutine,
            ExplorationKind::Challenge,
            ExplorationKind::Growth
        ]
    );
    assert!(
        programs
            .iter()
            .all(|p| p.exploration_config().unwrap().career == "Chef")
    );
    assert_eq!(programs[0].status, ProgramStatus::Active);
    assert_eq!(programs[0].title, "A Day as a Chef");
}

#[tokio::test]
async fn score_of_75_on_a_10_xp_task_earns_7() {
    let repos = Repositories::in_memory();
    let ai = Arc::new(ScriptedAi::scoring(75.0));
    let discovery = with_ai(&repos, &ai);
    let (_scenario, programs) = start(&discovery, &repos).await;
    let task = repos.tasks.find_by_program(programs[0].id).await.unwrap()[0].clone();
    assert_eq!(task.config.xp_reward, Some(10));

    let evaluation = discovery
        .submit_task_response(task.id, "u1", &TaskResponse::new("I would prep the kitchen"))
        .await
        .unwrap();

    assert_eq!(evaluation.result.xp_earned, Some(7));
    let program = repos.programs.find_by_id(programs[0].id).await.unwrap().unwrap();
    assert_eq!(program.metadata["xp_earned"], 7);
}

#[tokio::test]
async fn xp_accumulates_across_tasks_of_a_program() {
    let repos = Repositories::in_memory();
    let ai = Arc::new(ScriptedAi::with_scores(0.0, &[75.0, 100.0]));
    let discovery = with_ai(&repos, &ai);
    let (scenario, programs) = start(&discovery, &repos).await;

    for task in repos.tasks.find_by_program(programs[0].id).await.unwrap() {
        discovery
            .submit_task_response(task.id, "u1", &TaskResponse::new("answer"))
            .await
            .unwrap();
    }

    let summary = discovery.get_exploration_summary(scenario.id).await.unwrap();
    assert_eq!(summary.programs[0].xp_earned, 17);
    assert_eq!(summary.total_xp, 17);
    assert_eq!(summary.programs_completed, 1);
    assert_eq!(summary.programs[1].status, ProgramStatus::Active);
    assert_eq!(summary.average_score, Some(87.5));
    assert_eq!(summary.career, "Chef");
}

#[tokio::test]
async fn dynamic_task_uses_the_ai_when_available() {
    let repos = Repositories::in_memory();
    let ai = Arc::new(ScriptedAi::scoring(70.0));
    let discovery = with_ai(&repos, &ai);
    let (_scenario, programs) = start(&discovery, &repos).await;

    let task = discovery
        .add_dynamic_task(programs[0].id, "u1", "plating")
        .await
        .unwrap();

    assert_eq!(ai.generations.load(Ordering::SeqCst), 1);
    assert_eq!(task.title, "Explore plating");
    assert!(task.config.generated);
    assert_eq!(task.config.xp_reward, Some(20));
    assert_eq!(task.task_order, 2);
    // The program already has an open task.
    assert_eq!(task.status, TaskStatus::Pending);

    let logged = repos
        .logs
        .find_by_task(task.id)
        .await
        .unwrap()
        .into_iter()
        .any(|l| l.kind == LogKind::TaskGenerated && l.data["origin"] == "ai");
    assert!(logged);
}

#[tokio::test]
async fn dynamic_task_falls_back_to_a_template() {
    let repos = Repositories::in_memory();
    let ai = Arc::new(ScriptedAi::failing());
    let discovery = with_ai(&repos, &ai);
    let (_scenario, programs) = start(&discovery, &repos).await;

    let task = discovery
        .add_dynamic_task(programs[1].id, "u1", "food trucks")
        .await
        .unwrap();

    assert_eq!(task.title, "Explore: food trucks");
    assert!(task.config.generated);
    assert_eq!(task.config.xp_reward, Some(10));
}

#[tokio::test]
async fn dynamic_task_rejects_completed_programs() {
    let repos = Repositories::in_memory();
    let discovery = DiscoveryService::new(repos.clone(), None);
    let (_scenario, programs) = start(&discovery, &repos).await;

    for task in repos.tasks.find_by_program(programs[0].id).await.unwrap() {
        discovery
            .submit_task_response(task.id, "u1", &TaskResponse::new("done"))
            .await
            .unwrap();
    }

    let err = discovery
        .add_dynamic_task(programs[0].id, "u1", "more")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn branch_waits_behind_open_programs() {
    let repos = Repositories::in_memory();
    let discovery = DiscoveryService::new(repos.clone(), None);
    let (scenario, programs) = start(&discovery, &repos).await;

    let (branch, tasks) = discovery
        .branch_exploration(scenario.id, "u1", "Pastry")
        .await
        .unwrap();

    assert_eq!(branch.program_order, 3);
    assert_eq!(branch.status, ProgramStatus::Pending);
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.config.generated));
    let config = branch.exploration_config().unwrap();
    assert_eq!(config.kind, ExplorationKind::Branch);
    assert_eq!(config.focus.as_deref(), Some("Pastry"));
    assert_eq!(config.career, "Chef");

    let lineage: Vec<ProgramId> =
        serde_json::from_value(branch.metadata["lineage"].clone()).unwrap();
    assert_eq!(lineage, programs.iter().map(|p| p.id).collect::<Vec<_>>());

    let summary = discovery.get_exploration_summary(scenario.id).await.unwrap();
    assert_eq!(summary.branch_count, 1);
    assert_eq!(summary.programs_total, 4);
    assert_eq!(summary.generated_task_count, 2);
}

#[tokio::test]
async fn branch_after_completion_reopens_the_scenario() {
    let repos = Repositories::in_memory();
    let discovery = DiscoveryService::new(repos.clone(), None);
    let (scenario, programs) = start(&discovery, &repos).await;

    for program in &programs {
        for task in repos.tasks.find_by_program(program.id).await.unwrap() {
            discovery
                .submit_task_response(task.id, "u1", &TaskResponse::new("done"))
                .await
                .unwrap();
        }
    }
    let done = repos.scenarios.find_by_id(scenario.id).await.unwrap().unwrap();
    assert_eq!(done.status, ScenarioStatus::Completed);

    let (branch, tasks) = discovery
        .branch_exploration(scenario.id, "u1", "Catering")
        .await
        .unwrap();

    assert_eq!(branch.status, ProgramStatus::Active);
    assert_eq!(tasks[0].status, TaskStatus::Active);
    let reopened = repos.scenarios.find_by_id(scenario.id).await.unwrap().unwrap();
    assert_eq!(reopened.status, ScenarioStatus::Active);
    assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn branch_requires_a_discovery_scenario() {
    let repos = Repositories::in_memory();
    let discovery = DiscoveryService::new(repos.clone(), None);
    let pbl = aisquare_learning::service::PblService::new(repos.clone(), None);
    let scenario = pbl
        .start_scenario(
            &LearningContext::new("u1"),
            &common::pbl_source("pbl", &[&["a"]]),
        )
        .await
        .unwrap();

    let err = discovery
        .branch_exploration(scenario.id, "u1", "anything")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}
