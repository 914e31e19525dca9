//! Anthropic-backed [`AiService`] via rig-core.
//!
//! The model is asked for a bare JSON object. Replies are tolerated with
//! surrounding prose: the outermost `{...}` is parsed and anything that
//! does not fit the expected shape is an [`Error::Ai`], which the services
//! turn into their fallback.
//!
//! # Example
//! ```no_run
//! use aisquare_learning::llm::{RigAiService, anthropic_client};
//! use secrecy::SecretString;
//!
//! let key = SecretString::from("sk-ant-...");
//! let client = anthropic_client(&key).expect("failed to create Anthropic client");
//! let ai = RigAiService::new(client, "claude-sonnet-4-20250514");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{Instrument, debug};

use crate::ai::{AiEvaluation, AiService, GeneratedTask, TaskGenerationRequest, weighted_overall};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Rubric, Task, TaskResponse};
use crate::telemetry::genai::{record_response_size, start_chat_span};

const PROVIDER: &str = "anthropic";
const MAX_TOKENS: u64 = 1024;

const EVALUATION_PREAMBLE: &str = "You are an educational evaluator. Score the learner's \
response against each rubric criterion from 0 to 100 and give short, encouraging feedback. \
Reply with a single JSON object: {\"scores\": {<criterion>: <0-100>}, \"overall_score\": \
<0-100>, \"feedback\": <string>, \"ksa_achievement\": {<ksa code>: <0-100>}}. No other text.";

const GENERATION_PREAMBLE: &str = "You design short career-exploration tasks for learners. \
Reply with a single JSON object: {\"title\": <string>, \"description\": <string>, \
\"instructions\": <string>, \"kind\": \"chat\" | \"discussion\" | \"submission\", \
\"required_ksa\": [<ksa code>], \"xp_reward\": <integer 5-30>}. No other text.";

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> std::result::Result<rig::providers::anthropic::Client, rig::http_client::Error> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
}

/// The AI service for `config`, or `None` when no API key is set.
pub fn ai_service_from_config(config: &Config) -> Result<Option<Arc<dyn AiService>>> {
    let Some(key) = &config.anthropic_api_key else {
        return Ok(None);
    };
    let client = anthropic_client(key)
        .map_err(|e| Error::Config(format!("cannot create Anthropic client: {e}")))?;
    Ok(Some(Arc::new(RigAiService::new(client, &config.ai_model))))
}

pub struct RigAiService {
    client: rig::providers::anthropic::Client,
    model: String,
}

impl RigAiService {
    pub fn new(client: rig::providers::anthropic::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn chat(&self, preamble: &str, prompt: String, task: &str) -> Result<String> {
        let span = start_chat_span(&self.model, PROVIDER, task);
        async {
            let agent = self
                .client
                .agent(self.model.as_str())
                .preamble(preamble)
                .max_tokens(MAX_TOKENS)
                .build();
            let reply = agent
                .prompt(prompt)
                .await
                .map_err(|e| Error::Ai(e.to_string()))?;
            record_response_size(&tracing::Span::current(), reply.chars().count());
            debug!(chars = reply.len(), "model replied");
            Ok::<_, Error>(reply)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl AiService for RigAiService {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn evaluate_task_response(
        &self,
        task: &Task,
        response: &TaskResponse,
        rubric: &Rubric,
        required_ksa: &[String],
    ) -> Result<AiEvaluation> {
        let reply = self
            .chat(
                EVALUATION_PREAMBLE,
                evaluation_prompt(task, response, rubric, required_ksa),
                "evaluate",
            )
            .await?;
        parse_evaluation(&reply, rubric)
    }

    async fn generate_task(&self, request: &TaskGenerationRequest) -> Result<GeneratedTask> {
        let reply = self
            .chat(GENERATION_PREAMBLE, generation_prompt(request), "generate")
            .await?;
        let generated: GeneratedTask = parse_json(&reply)?;
        if generated.title.trim().is_empty() {
            return Err(Error::Ai("generated task has no title".to_string()));
        }
        Ok(generated)
    }
}

fn evaluation_prompt(
    task: &Task,
    response: &TaskResponse,
    rubric: &Rubric,
    required_ksa: &[String],
) -> String {
    let mut prompt = format!("Task: {}\n", task.title);
    if !task.config.description.is_empty() {
        prompt.push_str(&format!("Description: {}\n", task.config.description));
    }
    if !task.config.instructions.is_empty() {
        prompt.push_str(&format!("Instructions: {}\n", task.config.instructions));
    }
    prompt.push_str("\nRubric:\n");
    for criterion in &rubric.criteria {
        prompt.push_str(&format!(
            "- {} (weight {}): {}\n",
            criterion.name, criterion.weight, criterion.description
        ));
    }
    if !required_ksa.is_empty() {
        prompt.push_str(&format!("\nKSA codes: {}\n", required_ksa.join(", ")));
    }
    prompt.push_str(&format!("\nLearner response:\n{}\n", response.content));
    prompt
}

fn generation_prompt(request: &TaskGenerationRequest) -> String {
    let mut prompt = format!(
        "Career: {}\nLearner interest: {}\n",
        request.career, request.interest
    );
    if !request.existing_titles.is_empty() {
        prompt.push_str(&format!(
            "Avoid repeating these tasks: {}\n",
            request.existing_titles.join("; ")
        ));
    }
    prompt
}

/// The outermost JSON object in `reply`.
fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

fn parse_json<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let json = extract_json(reply)
        .ok_or_else(|| Error::Ai("model reply contains no JSON object".to_string()))?;
    serde_json::from_str(json).map_err(|e| Error::Ai(format!("malformed model reply: {e}")))
}

#[derive(Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    overall_score: Option<f64>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    ksa_achievement: BTreeMap<String, f64>,
}

fn clamp_all(map: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    map.into_iter()
        .map(|(k, v)| (k, v.clamp(0.0, 100.0)))
        .collect()
}

/// Parse an evaluation reply. A missing overall score is derived from the
/// rubric-weighted criterion scores.
fn parse_evaluation(reply: &str, rubric: &Rubric) -> Result<AiEvaluation> {
    let raw: RawEvaluation = parse_json(reply)?;
    let scores = clamp_all(raw.scores);
    let overall_score = raw
        .overall_score
        .or_else(|| weighted_overall(rubric, &scores))
        .ok_or_else(|| Error::Ai("model reply has no scores".to_string()))?
        .clamp(0.0, 100.0);
    Ok(AiEvaluation {
        scores,
        overall_score,
        feedback: raw.feedback,
        ksa_achievement: clamp_all(raw.ksa_achievement),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric() -> Rubric {
        let mut rubric = Rubric::from_criteria([("clarity", "c"), ("depth", "d")]);
        rubric.criteria[1].weight = 3.0;
        rubric
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let reply = "Here you go:\n```json\n{\"scores\": {\"clarity\": 80}, \"overall_score\": 85, \"feedback\": \"Nice\"}\n```";
        let evaluation = parse_evaluation(reply, &rubric()).unwrap();
        assert_eq!(evaluation.overall_score, 85.0);
        assert_eq!(evaluation.feedback, "Nice");
        assert_eq!(evaluation.scores["clarity"], 80.0);
    }

    #[test]
    fn missing_overall_uses_weighted_rubric_scores() {
        let reply = r#"{"scores": {"clarity": 40, "depth": 80}}"#;
        let evaluation = parse_evaluation(reply, &rubric()).unwrap();
        assert_eq!(evaluation.overall_score, 70.0);
    }

    #[test]
    fn scores_are_clamped() {
        let reply = r#"{"scores": {"clarity": 140}, "overall_score": -5, "ksa_achievement": {"K1": 250}}"#;
        let evaluation = parse_evaluation(reply, &rubric()).unwrap();
        assert_eq!(evaluation.scores["clarity"], 100.0);
        assert_eq!(evaluation.overall_score, 0.0);
        assert_eq!(evaluation.ksa_achievement["K1"], 100.0);
    }

    #[test]
    fn reply_without_json_is_an_ai_error() {
        let err = parse_evaluation("I cannot score this.", &rubric()).unwrap_err();
        assert!(matches!(err, Error::Ai(_)));
    }

    #[test]
    fn reply_without_any_score_is_an_ai_error() {
        let err = parse_evaluation(r#"{"feedback": "ok"}"#, &rubric()).unwrap_err();
        assert!(matches!(err, Error::Ai(_)));
    }
}
