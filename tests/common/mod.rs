//! Shared fixtures: source content builders and a scripted AI double.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use aisquare_learning::ai::{AiEvaluation, AiService, GeneratedTask, TaskGenerationRequest};
use aisquare_learning::error::{Error, Result};
use aisquare_learning::model::*;
use async_trait::async_trait;

/// AI double that returns queued overall scores (or a fixed default) and
/// can be switched into failure.
pub struct ScriptedAi {
    scores: Mutex<Vec<f64>>,
    default_score: f64,
    fail: bool,
    pub evaluations: AtomicUsize,
    pub generations: AtomicUsize,
}

impl ScriptedAi {
    pub fn scoring(default_score: f64) -> Self {
        Self {
            scores: Mutex::new(Vec::new()),
            default_score,
            fail: false,
            evaluations: AtomicUsize::new(0),
            generations: AtomicUsize::new(0),
        }
    }

    /// Scores handed out in order before falling back to the default.
    pub fn with_scores(default_score: f64, scores: &[f64]) -> Self {
        let ai = Self::scoring(default_score);
        *ai.scores.lock().unwrap() = scores.iter().rev().copied().collect();
        ai
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::scoring(0.0)
        }
    }
}

#[async_trait]
impl AiService for ScriptedAi {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn evaluate_task_response(
        &self,
        _task: &Task,
        _response: &TaskResponse,
        rubric: &Rubric,
        required_ksa: &[String],
    ) -> Result<AiEvaluation> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Ai("scripted outage".to_string()));
        }
        let score = self.scores.lock().unwrap().pop().unwrap_or(self.default_score);
        Ok(AiEvaluation {
            scores: rubric
                .criterion_names()
                .map(|name| (name.to_string(), score))
                .collect(),
            overall_score: score,
            feedback: format!("scored {score}"),
            ksa_achievement: required_ksa
                .iter()
                .map(|ksa| (ksa.clone(), score))
                .collect::<BTreeMap<_, _>>(),
        })
    }

    async fn generate_task(&self, request: &TaskGenerationRequest) -> Result<GeneratedTask> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Ai("scripted outage".to_string()));
        }
        Ok(GeneratedTask {
            title: format!("Explore {}", request.interest),
            description: format!("A {} task about {}", request.career, request.interest),
            instructions: "Investigate and report back.".to_string(),
            kind: TaskKind::Discussion,
            required_ksa: vec!["K2.1".to_string()],
            xp_reward: Some(20),
        })
    }
}

pub fn chat_task(title: &str) -> TaskTemplate {
    TaskTemplate::new(title, TaskKind::Chat)
        .instructions(format!("Work on {title}"))
        .required_ksa(["K1.1", "S1.2"])
}

fn stage(id: &str, tasks: &[&str]) -> StageDefinition {
    StageDefinition {
        id: id.to_string(),
        title: format!("Stage {id}"),
        description: String::new(),
        stage_type: None,
        tasks: tasks.iter().map(|t| chat_task(t)).collect(),
        rubric: None,
    }
}

/// A PBL source with one stage per entry of `stages`, each holding the
/// given task titles.
pub fn pbl_source(id: &str, stages: &[&[&str]]) -> SourceContent {
    SourceContent {
        id: id.to_string(),
        mode: LearningMode::Pbl,
        title: format!("PBL {id}"),
        description: String::new(),
        metadata: SourceMetadata {
            stages: stages
                .iter()
                .enumerate()
                .map(|(i, tasks)| stage(&format!("s{i}"), tasks))
                .collect(),
            ..SourceMetadata::default()
        },
    }
}

pub fn discovery_source(id: &str, career: &str) -> SourceContent {
    SourceContent {
        id: id.to_string(),
        mode: LearningMode::Discovery,
        title: format!("Discover {career}"),
        description: String::new(),
        metadata: SourceMetadata {
            career: Some(career.to_string()),
            ..SourceMetadata::default()
        },
    }
}

pub fn question(id: &str, domain: &str, correct: &str) -> QuestionDefinition {
    QuestionDefinition {
        id: id.to_string(),
        question: format!("Question {id}?"),
        options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        correct_answer: correct.to_string(),
        domain: domain.to_string(),
        difficulty: None,
        ksa: vec![format!("K-{domain}")],
        explanation: Some(format!("Because {correct}.")),
        points: 1.0,
    }
}

/// An assessment source with `count` questions, all answered by "a",
/// alternating between two domains.
pub fn assessment_source(id: &str, count: usize) -> SourceContent {
    SourceContent {
        id: id.to_string(),
        mode: LearningMode::Assessment,
        title: format!("Assessment {id}"),
        description: String::new(),
        metadata: SourceMetadata {
            questions: (0..count)
                .map(|i| {
                    let domain = if i % 2 == 0 { "engaging" } else { "creating" };
                    question(&format!("q{i}"), domain, "a")
                })
                .collect(),
            ..SourceMetadata::default()
        },
    }
}
