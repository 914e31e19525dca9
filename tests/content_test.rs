use aisquare_learning::content::ContentLibrary;
use aisquare_learning::error::Error;
use aisquare_learning::model::{LearningMode, TaskKind};

const PBL_TOML: &str = r#"
id = "ai-ethics"
type = "pbl"
title = "AI Ethics in Hiring"

[metadata]
career = "HR analyst"

[[metadata.stages]]
id = "research"
title = "Research"

[[metadata.stages.tasks]]
title = "Spot the bias"
kind = "chat"
required_ksa = ["K1.1"]

[[metadata.stages]]
id = "report"
title = "Report"

[[metadata.default_tasks]]
title = "Summarise"
"#;

const ASSESSMENT_JSON: &str = r#"{
  "id": "ai-literacy",
  "type": "assessment",
  "title": "AI Literacy",
  "metadata": {
    "time_limit_minutes": 20,
    "questions": [
      { "id": "q1", "question": "What is a model?", "options": ["a", "b"],
        "correct_answer": "a", "domain": "engaging", "points": 2 },
      { "id": "q2", "question": "What is a prompt?", "correct_answer": "b" }
    ]
  }
}"#;

fn content_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir()
        .join("aisquare-content-test")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn loads_toml_and_json_sources() {
    let dir = content_dir();
    std::fs::write(dir.join("ethics.toml"), PBL_TOML).unwrap();
    std::fs::write(dir.join("literacy.json"), ASSESSMENT_JSON).unwrap();
    std::fs::write(dir.join("README.md"), "ignored").unwrap();

    let library = ContentLibrary::load_from_dir(&dir).unwrap();
    assert_eq!(library.len(), 2);

    let pbl = library.get("ai-ethics").unwrap();
    assert_eq!(pbl.mode, LearningMode::Pbl);
    assert_eq!(pbl.metadata.stages.len(), 2);
    assert_eq!(pbl.metadata.stages[0].tasks[0].kind, TaskKind::Chat);
    assert!(pbl.metadata.stages[1].tasks.is_empty());
    assert_eq!(pbl.metadata.default_tasks[0].title, "Summarise");
    assert_eq!(pbl.metadata.default_tasks[0].kind, TaskKind::Chat);

    let quiz = library.require("ai-literacy").unwrap();
    assert_eq!(quiz.metadata.questions.len(), 2);
    assert_eq!(quiz.metadata.questions[0].points, 2.0);
    assert_eq!(quiz.metadata.questions[1].points, 1.0);
    assert_eq!(quiz.metadata.time_limit_minutes, Some(20));

    let ids: Vec<&str> = library.by_mode(LearningMode::Assessment).map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["ai-literacy"]);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn duplicate_ids_are_rejected() {
    let dir = content_dir();
    std::fs::write(dir.join("a.toml"), PBL_TOML).unwrap();
    std::fs::write(dir.join("b.toml"), PBL_TOML).unwrap();

    let err = ContentLibrary::load_from_dir(&dir).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn malformed_files_name_the_path() {
    let dir = content_dir();
    std::fs::write(dir.join("broken.toml"), "id = ").unwrap();

    let err = ContentLibrary::load_from_dir(&dir).unwrap_err();
    assert!(err.to_string().contains("broken.toml"), "{err}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_dir_and_unknown_ids_are_errors() {
    let missing = std::env::temp_dir().join("aisquare-no-such-dir");
    assert!(matches!(
        ContentLibrary::load_from_dir(&missing),
        Err(Error::Config(_))
    ));

    let library = ContentLibrary::empty();
    assert!(library.is_empty());
    assert!(matches!(library.require("nope"), Err(Error::NotFound(_))));
}

#[test]
fn bundled_content_loads() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("content");
    let library = ContentLibrary::load_from_dir(&dir).unwrap();

    assert_eq!(library.by_mode(LearningMode::Pbl).count(), 1);
    assert_eq!(library.by_mode(LearningMode::Discovery).count(), 1);
    let quiz = library.require("ai-literacy").unwrap();
    assert!(quiz.metadata.questions.iter().all(|q| !q.correct_answer.is_empty()));
    let pbl = library.require("ai-job-search").unwrap();
    assert_eq!(pbl.metadata.rubric.as_ref().unwrap().criteria.len(), 3);
}
