//! aisquare CLI: operator interface to the learning services.

use aisquare_learning::config::Config;
use aisquare_learning::content::ContentLibrary;
use aisquare_learning::db::Db;
use aisquare_learning::llm::ai_service_from_config;
use aisquare_learning::model::{
    AttemptType, LearningMode, ProgramId, ScenarioId, TaskId, TaskResponse,
};
use aisquare_learning::service::{
    AttemptOptions, LearningContext, LearningService, ServiceRegistry,
};
use aisquare_learning::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "aisquare", about = "Scenario lifecycle for PBL, discovery and assessment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database migrations
    Migrate,
    /// Source content operations
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },
    /// Scenario operations
    Scenario {
        #[command(subcommand)]
        action: ScenarioAction,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Assessment attempts
    Assessment {
        #[command(subcommand)]
        action: AssessmentAction,
    },
    /// Discovery extras
    Discovery {
        #[command(subcommand)]
        action: DiscoveryAction,
    },
}

#[derive(Subcommand)]
enum ContentAction {
    /// List loaded source content
    List {
        /// Only show one mode (pbl, discovery, assessment)
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScenarioAction {
    /// Start or resume a scenario
    Start {
        source_id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        language: Option<String>,
    },
    /// Show a scenario with its programs and tasks
    Show { scenario_id: String },
    /// Mode-specific progress report
    Progress { scenario_id: String },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Submit a response
    Submit {
        task_id: String,
        response: String,
        #[arg(long)]
        user: String,
        /// Seconds spent on the task
        #[arg(long)]
        time: Option<u32>,
    },
    /// Reopen a completed PBL task
    Retry {
        task_id: String,
        #[arg(long)]
        user: String,
    },
    /// Skip a task
    Skip {
        task_id: String,
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum AssessmentAction {
    /// Start a new attempt
    Start {
        source_id: String,
        #[arg(long)]
        user: String,
        /// Formal attempt (practice by default)
        #[arg(long)]
        formal: bool,
        #[arg(long)]
        shuffle: bool,
        #[arg(long)]
        instant_feedback: bool,
        #[arg(long)]
        time_limit: Option<u32>,
        /// Use only the first N questions
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Answer a question
    Answer {
        task_id: String,
        answer: String,
        #[arg(long)]
        user: String,
    },
    /// Results of one attempt
    Results { program_id: String },
    /// Attempt history for a user and source
    History {
        source_id: String,
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum DiscoveryAction {
    /// Add a generated task to a program
    AddTask {
        program_id: String,
        interest: String,
        #[arg(long)]
        user: String,
    },
    /// Branch the exploration in a new direction
    Branch {
        scenario_id: String,
        direction: String,
        #[arg(long)]
        user: String,
    },
    /// XP and completion summary
    Summary { scenario_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "aisquare".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    let result = match cli.command {
        Command::Migrate => {
            db.health_check().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Content { action } => {
            let library = ContentLibrary::load_from_dir(&config.content_dir)?;
            match action {
                ContentAction::List { mode } => cmd_content_list(&library, mode),
            }
        }
        command => {
            let library = ContentLibrary::load_from_dir(&config.content_dir)?;
            let ai = ai_service_from_config(&config)?;
            let registry = ServiceRegistry::new(db.into_repositories(), ai);
            run(&registry, &library, command).await
        }
    };

    guard.force_flush();
    result
}

async fn run(
    registry: &ServiceRegistry,
    library: &ContentLibrary,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Migrate | Command::Content { .. } => Ok(()),
        Command::Scenario { action } => match action {
            ScenarioAction::Start {
                source_id,
                user,
                language,
            } => {
                let source = library.require(&source_id)?;
                let mut context = LearningContext::new(user);
                if let Some(language) = language {
                    context = context.language(language);
                }
                let service = registry.service(source.mode)?;
                print_json(&service.start_scenario(&context, source).await?)
            }
            ScenarioAction::Show { scenario_id } => {
                cmd_scenario_show(registry, scenario_id.parse()?).await
            }
            ScenarioAction::Progress { scenario_id } => {
                cmd_scenario_progress(registry, scenario_id.parse()?).await
            }
        },
        Command::Task { action } => match action {
            TaskAction::Submit {
                task_id,
                response,
                user,
                time,
            } => {
                let task_id: TaskId = task_id.parse()?;
                let service = service_for_task(registry, task_id).await?;
                let mut response = TaskResponse::new(response);
                if let Some(seconds) = time {
                    response = response.time_spent(seconds);
                }
                print_json(
                    &service
                        .submit_task_response(task_id, &user, &response)
                        .await?,
                )
            }
            TaskAction::Retry { task_id, user } => {
                let task_id: TaskId = task_id.parse()?;
                let service = service_for_task(registry, task_id).await?;
                let pbl = service
                    .as_pbl()
                    .ok_or_else(|| anyhow::anyhow!("only PBL tasks can be retried"))?;
                print_json(&pbl.retry_task(task_id, &user).await?)
            }
            TaskAction::Skip { task_id, user } => {
                let task_id: TaskId = task_id.parse()?;
                let service = service_for_task(registry, task_id).await?;
                print_json(&service.skip_task(task_id, &user).await?)
            }
        },
        Command::Assessment { action } => {
            let service = registry.service(LearningMode::Assessment)?;
            let assessment = service
                .as_assessment()
                .ok_or_else(|| anyhow::anyhow!("assessment service unavailable"))?;
            match action {
                AssessmentAction::Start {
                    source_id,
                    user,
                    formal,
                    shuffle,
                    instant_feedback,
                    time_limit,
                    limit,
                } => {
                    let source = library.require(&source_id)?;
                    let attempt_type = if formal {
                        AttemptType::Formal
                    } else {
                        AttemptType::Practice
                    };
                    let options = AttemptOptions {
                        shuffle,
                        instant_feedback,
                        time_limit_minutes: time_limit,
                        question_limit: limit,
                    };
                    print_json(
                        &assessment
                            .create_assessment_attempt(
                                &LearningContext::new(user),
                                source,
                                attempt_type,
                                options,
                            )
                            .await?,
                    )
                }
                AssessmentAction::Answer {
                    task_id,
                    answer,
                    user,
                } => print_json(
                    &assessment
                        .submit_answer(task_id.parse()?, &user, &answer)
                        .await?,
                ),
                AssessmentAction::Results { program_id } => {
                    let program_id: ProgramId = program_id.parse()?;
                    print_json(&assessment.get_assessment_results(program_id).await?)
                }
                AssessmentAction::History { source_id, user } => {
                    print_json(&assessment.get_assessment_history(&user, &source_id).await?)
                }
            }
        }
        Command::Discovery { action } => {
            let service = registry.service(LearningMode::Discovery)?;
            let discovery = service
                .as_discovery()
                .ok_or_else(|| anyhow::anyhow!("discovery service unavailable"))?;
            match action {
                DiscoveryAction::AddTask {
                    program_id,
                    interest,
                    user,
                } => print_json(
                    &discovery
                        .add_dynamic_task(program_id.parse()?, &user, &interest)
                        .await?,
                ),
                DiscoveryAction::Branch {
                    scenario_id,
                    direction,
                    user,
                } => {
                    let (program, tasks) = discovery
                        .branch_exploration(scenario_id.parse()?, &user, &direction)
                        .await?;
                    print_json(&json!({ "program": program, "tasks": tasks }))
                }
                DiscoveryAction::Summary { scenario_id } => {
                    print_json(&discovery.get_exploration_summary(scenario_id.parse()?).await?)
                }
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_content_list(library: &ContentLibrary, mode: Option<String>) -> anyhow::Result<()> {
    let mode: Option<LearningMode> = mode.map(|m| m.parse()).transpose()?;
    let sources: Vec<_> = library
        .iter()
        .filter(|s| mode.is_none_or(|m| s.mode == m))
        .map(|s| {
            json!({
                "id": s.id,
                "mode": s.mode,
                "title": s.title,
                "stages": s.metadata.stages.len(),
                "questions": s.metadata.questions.len(),
            })
        })
        .collect();
    print_json(&sources)
}

/// The service for the mode of the scenario that owns `task_id`.
async fn service_for_task(
    registry: &ServiceRegistry,
    task_id: TaskId,
) -> anyhow::Result<LearningService> {
    let repos = registry.repos();
    let task = repos
        .tasks
        .find_by_id(task_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("task {task_id} not found"))?;
    let scenario = repos
        .scenarios
        .find_by_id(task.scenario_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("scenario {} not found", task.scenario_id))?;
    Ok(registry.service(scenario.mode)?)
}

async fn cmd_scenario_show(
    registry: &ServiceRegistry,
    scenario_id: ScenarioId,
) -> anyhow::Result<()> {
    let repos = registry.repos();
    let scenario = repos
        .scenarios
        .find_by_id(scenario_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("scenario {scenario_id} not found"))?;

    let mut programs = Vec::new();
    for program in repos.programs.find_by_scenario(scenario_id).await? {
        let tasks = repos.tasks.find_by_program(program.id).await?;
        programs.push(json!({ "program": program, "tasks": tasks }));
    }
    print_json(&json!({ "scenario": scenario, "programs": programs }))
}

async fn cmd_scenario_progress(
    registry: &ServiceRegistry,
    scenario_id: ScenarioId,
) -> anyhow::Result<()> {
    let scenario = registry
        .repos()
        .scenarios
        .find_by_id(scenario_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("scenario {scenario_id} not found"))?;
    let service = registry.service(scenario.mode)?;

    match &service {
        LearningService::Pbl(pbl) => print_json(&pbl.get_learning_progress(scenario_id).await?),
        LearningService::Discovery(discovery) => {
            print_json(&discovery.get_exploration_summary(scenario_id).await?)
        }
        LearningService::Assessment(assessment) => print_json(
            &assessment
                .get_assessment_history(&scenario.user_id, &scenario.source_id)
                .await?,
        ),
    }
}
