//! Form Action Pipeline
//!
//! Server-side handling of one form submission:
//! 1. resolve the session; without one nothing else is called
//! 2. re-fetch and re-process the authoritative schema for the form
//! 3. shape the flat submission, recompute derived budget totals, validate
//! 4. persist the shaped value and merge backend warnings into the errors
//!
//! Validation errors never block the save: responses are drafts until the
//! application is submitted as a whole.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::attachments::AttachmentStore;
use crate::config::EngineConfig;
use crate::path::FieldPath;
use crate::processor::process_form_schema_with_limits;
use crate::schema::{FormSchema, SchemaKind};
use crate::shape::{shape_form_data, SubmittedFormData};
use crate::validate::{merge_warnings, validate_form_value, FormValidationWarning, ValidationErrors};
use crate::widgets::{apply_budget_totals, is_attachment_schema};
use crate::{FormsError, Result};

/// Message for an attachment id the application does not own
pub const UNKNOWN_ATTACHMENT_MESSAGE: &str = "Attachment not found for this application";

/// Authenticated user session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

/// Collaborator failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("form not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Authoritative schema pair for a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDetails {
    pub form_id: String,
    #[serde(default)]
    pub form_name: Option<String>,
    pub form_json_schema: Value,
    #[serde(default)]
    pub form_ui_schema: Value,
}

/// Result of persisting a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveOutcome {
    #[serde(default)]
    pub warnings: Vec<FormValidationWarning>,
}

#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn get_session(&self) -> Option<Session>;
}

#[async_trait]
pub trait FormDetailsFetcher: Send + Sync {
    async fn get_form_details(&self, session: &Session, form_id: &str) -> std::result::Result<FormDetails, FetchError>;
}

#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn save_response(
        &self,
        session: &Session,
        application_id: &str,
        form_id: &str,
        data: &Value,
    ) -> std::result::Result<SaveOutcome, FetchError>;
}

/// Action state, returned to the page after every submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormActionResult {
    pub application_id: String,
    pub form_id: String,
    pub error: bool,
    pub saved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<ValidationErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl FormActionResult {
    pub fn new(application_id: impl Into<String>, form_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            form_id: form_id.into(),
            ..Self::default()
        }
    }

    fn failed(prior: &FormActionResult) -> Self {
        Self {
            error: true,
            ..prior.clone()
        }
    }
}

/// Every attachment reference in `value`, with its field path
fn attachment_references(schema: &FormSchema, value: &Value, path: &FieldPath, out: &mut Vec<(FieldPath, String)>) {
    match (&schema.kind, value) {
        (SchemaKind::Object(object), Value::Object(map)) => {
            for (key, child) in object.properties.iter() {
                if let Some(child_value) = map.get(key) {
                    attachment_references(child, child_value, &path.key(key), out);
                }
            }
        }
        (SchemaKind::Array(array), Value::Array(items)) => {
            if let Some(item_schema) = array.items.as_deref() {
                let flat = is_attachment_schema(item_schema);
                for (i, item) in items.iter().enumerate() {
                    // attachment lists report against the list field
                    let item_path = if flat { path.clone() } else { path.index(i) };
                    attachment_references(item_schema, item, &item_path, out);
                }
            }
        }
        (SchemaKind::Scalar(_), Value::String(id)) if is_attachment_schema(schema) => {
            out.push((path.clone(), id.clone()));
        }
        _ => {}
    }
}

/// Submission handler wired to its collaborators
pub struct FormActionPipeline {
    sessions: Arc<dyn SessionResolver>,
    forms: Arc<dyn FormDetailsFetcher>,
    responses: Arc<dyn ResponseStore>,
    attachments: Option<Arc<dyn AttachmentStore>>,
    config: EngineConfig,
}

impl FormActionPipeline {
    pub fn new(
        sessions: Arc<dyn SessionResolver>,
        forms: Arc<dyn FormDetailsFetcher>,
        responses: Arc<dyn ResponseStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions,
            forms,
            responses,
            attachments: None,
            config,
        }
    }

    /// Check submitted attachment ids against this store.
    pub fn with_attachments(mut self, store: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = Some(store);
        self
    }

    /// Handle one submission. Failures come back as `error: true` on top of
    /// `prior`; they are logged, never raised.
    pub async fn handle_form_action(&self, prior: FormActionResult, submitted: &SubmittedFormData) -> FormActionResult {
        match self.run(&prior, submitted).await {
            Ok(result) => result,
            Err(FormsError::Unauthorized(reason)) => {
                warn!(form_id = %prior.form_id, reason = %reason, "form action without a session");
                FormActionResult::failed(&prior)
            }
            Err(e) => {
                error!(form_id = %prior.form_id, application_id = %prior.application_id, error = %e, "form action failed");
                FormActionResult::failed(&prior)
            }
        }
    }

    async fn run(&self, prior: &FormActionResult, submitted: &SubmittedFormData) -> Result<FormActionResult> {
        let session = self
            .sessions
            .get_session()
            .await
            .filter(|s| !s.token.is_empty())
            .ok_or_else(|| FormsError::Unauthorized("no active session".into()))?;

        let limits = &self.config.limits;
        let details = self.forms.get_form_details(&session, &prior.form_id).await?;
        let form = process_form_schema_with_limits(&details.form_json_schema, &details.form_ui_schema, limits)?;

        let mut data = shape_form_data(submitted, &form.form_schema, limits)?;
        for layout in form.budget_layouts() {
            apply_budget_totals(layout, &mut data);
        }
        let mut errors = validate_form_value(&form.form_schema, &data, limits);
        self.check_attachments(&prior.application_id, &form.form_schema, &data, &mut errors)
            .await?;

        let outcome = self
            .responses
            .save_response(&session, &prior.application_id, &prior.form_id, &data)
            .await?;
        merge_warnings(&mut errors, &outcome.warnings, &form.form_schema, limits);

        info!(
            form_id = %prior.form_id,
            application_id = %prior.application_id,
            user_id = %session.user_id,
            error_fields = errors.len(),
            "form response saved"
        );
        Ok(FormActionResult {
            application_id: prior.application_id.clone(),
            form_id: prior.form_id.clone(),
            error: false,
            saved: true,
            validation_errors: (!errors.is_empty()).then_some(errors),
            data: Some(data),
        })
    }

    async fn check_attachments(
        &self,
        application_id: &str,
        schema: &FormSchema,
        data: &Value,
        errors: &mut ValidationErrors,
    ) -> Result<()> {
        let Some(store) = &self.attachments else {
            return Ok(());
        };
        let mut references = Vec::new();
        attachment_references(schema, data, &FieldPath::root(), &mut references);
        if references.is_empty() {
            return Ok(());
        }
        let known = store.list(application_id).await?;
        for (path, id) in references {
            let owned = Uuid::parse_str(&id).map_or(false, |uuid| known.iter().any(|a| a.id == uuid));
            if !owned {
                debug!(application_id, attachment_id = %id, "unknown attachment reference");
                let entry = errors.entry(path.to_html()).or_default();
                if !entry.iter().any(|m| m == UNKNOWN_ATTACHMENT_MESSAGE) {
                    entry.push(UNKNOWN_ATTACHMENT_MESSAGE.to_string());
                }
            }
        }
        Ok(())
    }
}

/// Fixed session, for tests and local tooling
pub struct StaticSessionResolver {
    session: Option<Session>,
}

impl StaticSessionResolver {
    pub fn new(session: Option<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn get_session(&self) -> Option<Session> {
        self.session.clone()
    }
}

/// In-memory form catalogue
pub struct InMemoryFormStore {
    forms: RwLock<HashMap<String, FormDetails>>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self {
            forms: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, details: FormDetails) {
        self.forms.write().insert(details.form_id.clone(), details);
    }
}

impl Default for InMemoryFormStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormDetailsFetcher for InMemoryFormStore {
    async fn get_form_details(&self, _session: &Session, form_id: &str) -> std::result::Result<FormDetails, FetchError> {
        self.forms
            .read()
            .get(form_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(form_id.to_string()))
    }
}

/// In-memory response store keyed by `(application, form)`
pub struct InMemoryResponseStore {
    responses: RwLock<HashMap<(String, String), Value>>,
    warnings: RwLock<Vec<FormValidationWarning>>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            warnings: RwLock::new(Vec::new()),
        }
    }

    /// Warnings returned with every save
    pub fn set_warnings(&self, warnings: Vec<FormValidationWarning>) {
        *self.warnings.write() = warnings;
    }

    pub fn get(&self, application_id: &str, form_id: &str) -> Option<Value> {
        self.responses
            .read()
            .get(&(application_id.to_string(), form_id.to_string()))
            .cloned()
    }
}

impl Default for InMemoryResponseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn save_response(
        &self,
        _session: &Session,
        application_id: &str,
        form_id: &str,
        data: &Value,
    ) -> std::result::Result<SaveOutcome, FetchError> {
        self.responses
            .write()
            .insert((application_id.to_string(), form_id.to_string()), data.clone());
        Ok(SaveOutcome {
            warnings: self.warnings.read().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{InMemoryAttachmentStore, NewAttachment};
    use crate::validate::REQUIRED_MESSAGE;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const APP: &str = "app-1";
    const FORM: &str = "sf424a";

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        inner: InMemoryFormStore,
    }

    #[async_trait]
    impl FormDetailsFetcher for CountingFetcher {
        async fn get_form_details(&self, session: &Session, form_id: &str) -> std::result::Result<FormDetails, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_form_details(session, form_id).await
        }
    }

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
        inner: InMemoryResponseStore,
    }

    #[async_trait]
    impl ResponseStore for CountingStore {
        async fn save_response(
            &self,
            session: &Session,
            application_id: &str,
            form_id: &str,
            data: &Value,
        ) -> std::result::Result<SaveOutcome, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.save_response(session, application_id, form_id, data).await
        }
    }

    fn details() -> FormDetails {
        FormDetails {
            form_id: FORM.into(),
            form_name: Some("Budget".into()),
            form_json_schema: json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string", "title": "Name" },
                    "agree": { "type": "boolean" },
                    "letter": { "type": "string", "format": "uuid" },
                    "activity_line_items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "activity_title": { "type": "string" },
                                "non_federal_resources": {
                                    "type": "object",
                                    "properties": {
                                        "applicant_amount": { "type": "string" },
                                        "state_amount": { "type": "string" },
                                        "other_amount": { "type": "string" },
                                        "total_amount": { "type": "string" }
                                    }
                                }
                            }
                        }
                    },
                    "total_non_federal_resources": { "type": "object" }
                }
            }),
            form_ui_schema: json!({ "activity_line_items": { "ui:widget": "Budget424aSectionC" } }),
        }
    }

    fn session() -> Option<Session> {
        Some(Session {
            token: "token".into(),
            user_id: "user-1".into(),
        })
    }

    fn pipeline(session: Option<Session>) -> (FormActionPipeline, Arc<CountingFetcher>, Arc<CountingStore>) {
        let fetcher = Arc::new(CountingFetcher::default());
        fetcher.inner.insert(details());
        let store = Arc::new(CountingStore::default());
        let pipeline = FormActionPipeline::new(
            Arc::new(StaticSessionResolver::new(session)),
            fetcher.clone(),
            store.clone(),
            EngineConfig::default(),
        );
        (pipeline, fetcher, store)
    }

    #[tokio::test]
    async fn test_no_session_makes_no_calls() {
        for session in [
            None,
            Some(Session {
                token: String::new(),
                user_id: "user-1".into(),
            }),
        ] {
            let (pipeline, fetcher, store) = pipeline(session);
            let prior = FormActionResult::new(APP, FORM);
            let result = pipeline
                .handle_form_action(prior.clone(), &SubmittedFormData::from_pairs([("name", "Ada")]))
                .await;
            assert_eq!(result, FormActionResult { error: true, ..prior });
            assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
            assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_successful_save_recomputes_totals() {
        let (pipeline, _, store) = pipeline(session());
        let submitted = SubmittedFormData::from_pairs([
            ("$ACTION_ID_abc", ""),
            ("name", "Ada"),
            ("agree", "true"),
            ("activity_line_items[0]--activity_title", "Outreach"),
            ("activity_line_items[0]--non_federal_resources--applicant_amount", "100.00"),
            ("activity_line_items[0]--non_federal_resources--state_amount", "25.50"),
            ("activity_line_items[0]--non_federal_resources--total_amount", "999.99"),
        ]);
        let result = pipeline
            .handle_form_action(FormActionResult::new(APP, FORM), &submitted)
            .await;
        assert!(!result.error);
        assert!(result.saved);
        assert_eq!(result.validation_errors, None);

        let data = result.data.unwrap();
        assert_eq!(data["agree"], json!(true));
        assert_eq!(
            data["activity_line_items"][0]["non_federal_resources"]["total_amount"],
            json!("125.50")
        );
        assert_eq!(data["total_non_federal_resources"]["total_amount"], json!("125.50"));
        assert_eq!(store.inner.get(APP, FORM), Some(data));
    }

    #[tokio::test]
    async fn test_validation_errors_still_save() {
        let (pipeline, _, store) = pipeline(session());
        store.inner.set_warnings(vec![FormValidationWarning {
            field: "$.agree".into(),
            message: "'agree' is not checked".into(),
            kind: "custom".into(),
        }]);
        let result = pipeline
            .handle_form_action(FormActionResult::new(APP, FORM), &SubmittedFormData::from_pairs([("agree", "false")]))
            .await;
        assert!(!result.error);
        assert!(result.saved);
        let errors = result.validation_errors.unwrap();
        assert_eq!(errors["name"], vec![REQUIRED_MESSAGE.to_string()]);
        assert_eq!(errors["agree"], vec!["Field is not checked".to_string()]);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_submission_gives_same_result() {
        let (pipeline, _, store) = pipeline(session());
        let submitted = SubmittedFormData::from_pairs([
            ("agree", "true"),
            ("activity_line_items[0]--activity_title", "Outreach"),
            ("activity_line_items[0]--non_federal_resources--other_amount", "12.5"),
            ("activity_line_items[1]--non_federal_resources--state_amount", "4.25"),
        ]);
        let first = pipeline
            .handle_form_action(FormActionResult::new(APP, FORM), &submitted)
            .await;
        let second = pipeline
            .handle_form_action(FormActionResult::new(APP, FORM), &submitted)
            .await;

        assert!(first.saved && second.saved);
        assert!(first.validation_errors.is_some());
        assert_eq!(first.validation_errors, second.validation_errors);
        assert_eq!(first.data, second.data);
        assert_eq!(first, second);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.get(APP, FORM), second.data);
    }

    #[tokio::test]
    async fn test_unknown_form_is_an_error() {
        let (pipeline, fetcher, store) = pipeline(session());
        let prior = FormActionResult::new(APP, "missing");
        let result = pipeline.handle_form_action(prior.clone(), &SubmittedFormData::new()).await;
        assert_eq!(result, FormActionResult { error: true, ..prior });
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_attachment_ids_checked() {
        let attachments = Arc::new(InMemoryAttachmentStore::new());
        let uploaded = attachments
            .upload(APP, NewAttachment::new("letter.pdf", 10))
            .await
            .unwrap();
        let (pipeline, _, _) = pipeline(session());
        let pipeline = pipeline.with_attachments(attachments);

        let ok = pipeline
            .handle_form_action(
                FormActionResult::new(APP, FORM),
                &SubmittedFormData::from_pairs([("name", "Ada"), ("letter", uploaded.id.to_string().as_str())]),
            )
            .await;
        assert_eq!(ok.validation_errors, None);

        let stranger = Uuid::new_v4().to_string();
        let bad = pipeline
            .handle_form_action(
                FormActionResult::new(APP, FORM),
                &SubmittedFormData::from_pairs([("name", "Ada"), ("letter", stranger.as_str())]),
            )
            .await;
        assert_eq!(
            bad.validation_errors.unwrap()["letter"],
            vec![UNKNOWN_ATTACHMENT_MESSAGE.to_string()]
        );
        assert!(bad.saved);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = FormActionResult {
            saved: true,
            ..FormActionResult::new(APP, FORM)
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "applicationId": APP, "formId": FORM, "error": false, "saved": true })
        );
    }
}
