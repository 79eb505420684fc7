//! Manual debug mode API endpoints
//!
//! Steps are addressed by their long catalog name (`B3_ksa_matrix`).

use crate::TrackLabClient;
use crate::error::Result;
use tracklab_core::domain::manual::{
    ManualSession, ProcessorConfig, ProcessorConfigItem, ProcessorInfo, PromptStepSummary,
    PromptVersion, SessionStatus, SessionStepsStatus, StepRun, StepRunSummary,
};
use tracklab_core::domain::step::StepId;
use tracklab_core::dto::manual::{
    CreatePromptVersion, CreateSession, PromptList, RateRun, RunStep, SessionList, SetProcessors,
    UpdateSession,
};
use uuid::Uuid;

impl TrackLabClient {
    // =============================================================================
    // Sessions
    // =============================================================================

    /// Create a debug session over a snapshot of a profile
    pub async fn create_session(&self, req: CreateSession) -> Result<ManualSession> {
        let url = format!("{}/api/manual/sessions", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List sessions, optionally only those with the given status
    pub async fn list_sessions(&self, status: Option<SessionStatus>) -> Result<SessionList> {
        let url = format!("{}/api/manual/sessions", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(status) = status {
            request = request.query(&[("status", status.to_string())]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<ManualSession> {
        let url = format!("{}/api/manual/sessions/{}", self.base_url, session_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Partially update a session
    pub async fn update_session(&self, session_id: Uuid, req: &UpdateSession) -> Result<ManualSession> {
        let url = format!("{}/api/manual/sessions/{}", self.base_url, session_id);
        let response = self.client.patch(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        let url = format!("{}/api/manual/sessions/{}", self.base_url, session_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Step Runs
    // =============================================================================

    /// Run one step in isolation inside a session
    pub async fn run_step(&self, session_id: Uuid, step: StepId, req: &RunStep) -> Result<StepRun> {
        let url = format!(
            "{}/api/manual/sessions/{}/steps/{}/run",
            self.base_url,
            session_id,
            step.step_name()
        );
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Run counts and last status of every step in a session
    pub async fn steps_status(&self, session_id: Uuid) -> Result<SessionStepsStatus> {
        let url = format!("{}/api/manual/sessions/{}/steps", self.base_url, session_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Run history of one step
    pub async fn step_runs(&self, session_id: Uuid, step: StepId) -> Result<Vec<StepRunSummary>> {
        let url = format!(
            "{}/api/manual/sessions/{}/steps/{}/runs",
            self.base_url,
            session_id,
            step.step_name()
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn run_detail(&self, session_id: Uuid, run_id: Uuid) -> Result<StepRun> {
        let url = format!(
            "{}/api/manual/sessions/{}/runs/{}",
            self.base_url, session_id, run_id
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Set or clear the operator's rating of a run
    pub async fn rate_run(&self, session_id: Uuid, run_id: Uuid, req: &RateRun) -> Result<StepRun> {
        let url = format!(
            "{}/api/manual/sessions/{}/runs/{}/rating",
            self.base_url, session_id, run_id
        );
        let response = self.client.patch(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Ask the LLM judge to evaluate a run's parsed result
    pub async fn judge_run(&self, session_id: Uuid, run_id: Uuid, use_mock: bool) -> Result<StepRun> {
        let url = format!(
            "{}/api/manual/sessions/{}/runs/{}/judge",
            self.base_url, session_id, run_id
        );
        let response = self
            .client
            .post(&url)
            .query(&[("use_mock", use_mock)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Prompts
    // =============================================================================

    /// Latest prompt version of every step
    pub async fn list_prompts(&self) -> Result<Vec<PromptStepSummary>> {
        let url = format!("{}/api/manual/prompts", self.base_url);
        let response = self.client.get(&url).send().await?;

        let list: PromptList = self.handle_response(response).await?;
        Ok(list.steps)
    }

    pub async fn prompt_versions(&self, step: StepId) -> Result<Vec<PromptVersion>> {
        let url = format!(
            "{}/api/manual/prompts/{}/versions",
            self.base_url,
            step.step_name()
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Store a new prompt version for a step
    pub async fn create_prompt_version(
        &self,
        step: StepId,
        req: &CreatePromptVersion,
    ) -> Result<PromptVersion> {
        let url = format!("{}/api/manual/prompts/{}", self.base_url, step.step_name());
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Make an earlier version current again
    pub async fn rollback_prompt(&self, step: StepId, version: u32) -> Result<PromptVersion> {
        let url = format!(
            "{}/api/manual/prompts/{}/rollback/{}",
            self.base_url,
            step.step_name(),
            version
        );
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Import the pipeline's built-in prompts as baseline versions
    pub async fn load_baseline_prompts(&self) -> Result<Vec<PromptVersion>> {
        let url = format!("{}/api/manual/prompts/load-baseline", self.base_url);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Processors
    // =============================================================================

    /// Every registered pre/post processor
    pub async fn list_processors(&self) -> Result<Vec<ProcessorInfo>> {
        let url = format!("{}/api/manual/processors", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn processor_config(&self, session_id: Uuid, step: StepId) -> Result<ProcessorConfig> {
        let url = format!(
            "{}/api/manual/sessions/{}/processors/{}",
            self.base_url,
            session_id,
            step.step_name()
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Replace the processor chain of a step within a session
    pub async fn set_processor_config(
        &self,
        session_id: Uuid,
        step: StepId,
        processors: Vec<ProcessorConfigItem>,
    ) -> Result<ProcessorConfig> {
        let url = format!(
            "{}/api/manual/sessions/{}/processors/{}",
            self.base_url,
            session_id,
            step.step_name()
        );
        let response = self
            .client
            .put(&url)
            .json(&SetProcessors { processors })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
