//! CLI Commands

pub mod config;
pub mod render;
pub mod split;
pub mod submit;

use anyhow::{Context, Result};
use async_trait::async_trait;
use grants_forms::action::{FetchError, FormDetails, FormDetailsFetcher, ResponseStore, SaveOutcome, Session, SessionResolver};
use grants_forms::EngineConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Engine configuration from `path`, or defaults
pub fn engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading engine config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Read and parse a JSON file
pub fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    warnings: Vec<grants_forms::validate::FormValidationWarning>,
}

/// API client
pub struct ApiClient {
    pub base_url: String,
    pub token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            client: reqwest::Client::new(),
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder, token: &str) -> Result<Envelope<T>, FetchError> {
        let resp = req
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(status.to_string()));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(resp.url().path().to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Transport(status.to_string()));
        }
        resp.json().await.map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionResolver for ApiClient {
    async fn get_session(&self) -> Option<Session> {
        self.token.as_ref().map(|token| Session {
            token: token.clone(),
            user_id: String::new(),
        })
    }
}

#[async_trait]
impl FormDetailsFetcher for ApiClient {
    async fn get_form_details(&self, session: &Session, form_id: &str) -> Result<FormDetails, FetchError> {
        let url = format!("{}/alpha/forms/{}", self.base_url, form_id);
        let envelope: Envelope<FormDetails> = self.send(self.client.get(&url), &session.token).await?;
        envelope
            .data
            .ok_or_else(|| FetchError::Decode("no data in response".into()))
    }
}

#[async_trait]
impl ResponseStore for ApiClient {
    async fn save_response(
        &self,
        session: &Session,
        application_id: &str,
        form_id: &str,
        data: &Value,
    ) -> Result<SaveOutcome, FetchError> {
        let url = format!("{}/alpha/applications/{}/forms/{}", self.base_url, application_id, form_id);
        let body = serde_json::json!({ "application_response": data });
        let envelope: Envelope<Value> = self.send(self.client.put(&url).json(&body), &session.token).await?;
        Ok(SaveOutcome {
            warnings: envelope.warnings,
        })
    }
}
