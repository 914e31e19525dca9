//! Service construction and lookup by learning mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::assessment::AssessmentService;
use super::base::{LearningContext, Lifecycle, ModeHooks};
use super::discovery::DiscoveryService;
use super::pbl::PblService;
use crate::ai::AiService;
use crate::error::{Error, Result};
use crate::model::*;
use crate::repository::Repositories;

/// A service for one learning mode.
#[derive(Clone)]
pub enum LearningService {
    Pbl(Arc<PblService>),
    Discovery(Arc<DiscoveryService>),
    Assessment(Arc<AssessmentService>),
}

impl LearningService {
    pub fn mode(&self) -> LearningMode {
        self.hooks().mode()
    }

    fn hooks(&self) -> &dyn ModeHooks {
        match self {
            LearningService::Pbl(s) => s.as_ref(),
            LearningService::Discovery(s) => s.as_ref(),
            LearningService::Assessment(s) => s.as_ref(),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        match self {
            LearningService::Pbl(s) => s.lifecycle(),
            LearningService::Discovery(s) => s.lifecycle(),
            LearningService::Assessment(s) => s.lifecycle(),
        }
    }

    pub async fn start_scenario(
        &self,
        context: &LearningContext,
        source: &SourceContent,
    ) -> Result<Scenario> {
        self.lifecycle()
            .start_scenario(self.hooks(), context, source)
            .await
    }

    pub async fn get_or_resume_scenario(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Option<Scenario>> {
        self.lifecycle()
            .get_or_resume_scenario(user_id, source_id)
            .await
    }

    pub async fn submit_task_response(
        &self,
        task_id: TaskId,
        user_id: &str,
        response: &TaskResponse,
    ) -> Result<Evaluation> {
        self.lifecycle()
            .submit_task_response(self.hooks(), task_id, user_id, response)
            .await
    }

    pub async fn skip_task(&self, task_id: TaskId, user_id: &str) -> Result<Task> {
        self.lifecycle()
            .skip_task(self.hooks(), task_id, user_id)
            .await
    }

    pub async fn check_program_completion(&self, program_id: ProgramId) -> Result<bool> {
        self.lifecycle()
            .check_program_completion(self.hooks(), program_id)
            .await
    }

    pub fn as_pbl(&self) -> Option<&PblService> {
        match self {
            LearningService::Pbl(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_discovery(&self) -> Option<&DiscoveryService> {
        match self {
            LearningService::Discovery(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_assessment(&self) -> Option<&AssessmentService> {
        match self {
            LearningService::Assessment(s) => Some(s),
            _ => None,
        }
    }
}

/// Cache key: one instance per mode and AI wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub mode: LearningMode,
    pub with_ai: bool,
}

/// Builds services over one repository bundle and caches them by key.
pub struct ServiceRegistry {
    repos: Repositories,
    ai: Option<Arc<dyn AiService>>,
    instances: Mutex<HashMap<ServiceKey, LearningService>>,
}

impl ServiceRegistry {
    pub fn new(repos: Repositories, ai: Option<Arc<dyn AiService>>) -> Self {
        Self {
            repos,
            ai,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    /// The service for `mode`, with AI scoring when an AI service is
    /// configured.
    pub fn service(&self, mode: LearningMode) -> Result<LearningService> {
        self.service_with(mode, self.ai.is_some())
    }

    /// The service for `mode` with explicit AI wiring. Asking for AI when
    /// none is configured is a configuration error. Assessment never uses AI.
    pub fn service_with(&self, mode: LearningMode, with_ai: bool) -> Result<LearningService> {
        let with_ai = with_ai && mode != LearningMode::Assessment;
        if with_ai && self.ai.is_none() {
            return Err(Error::Config(format!(
                "{mode} service requested with AI but no AI service is configured"
            )));
        }

        let key = ServiceKey { mode, with_ai };
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| Error::Other("service registry lock poisoned".to_string()))?;
        if let Some(service) = instances.get(&key) {
            return Ok(service.clone());
        }

        let ai = if with_ai { self.ai.clone() } else { None };
        let service = match mode {
            LearningMode::Pbl => {
                LearningService::Pbl(Arc::new(PblService::new(self.repos.clone(), ai)))
            }
            LearningMode::Discovery => {
                LearningService::Discovery(Arc::new(DiscoveryService::new(self.repos.clone(), ai)))
            }
            LearningMode::Assessment => {
                LearningService::Assessment(Arc::new(AssessmentService::new(self.repos.clone())))
            }
        };
        debug!(mode = %mode, with_ai, "service created");
        instances.insert(key, service.clone());
        Ok(service)
    }

    /// Number of cached instances.
    pub fn cached(&self) -> usize {
        self.instances.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Drop every cached instance.
    pub fn clear(&self) {
        if let Ok(mut instances) = self.instances.lock() {
            instances.clear();
        }
    }
}
