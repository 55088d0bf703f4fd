//! Grants Forms Engine
//!
//! Schema-driven grant application forms.
//!
//! ## Features
//! - JSON Schema + UI schema processing with conditional requirements
//! - Widget resolution and rendering into a serializable node tree
//! - SF-424A budget sub-tables with derived totals
//! - Shaping of flat submitted form data into nested values
//! - Validation with per-field messages
//! - Server-side form action pipeline over pluggable collaborators

pub mod action;
pub mod attachments;
pub mod config;
pub mod controller;
pub mod normalize;
pub mod path;
pub mod processor;
pub mod renderer;
pub mod schema;
pub mod shape;
pub mod ui_schema;
pub mod validate;
pub mod widgets;

use thiserror::Error;

pub use action::{
    FetchError, FormActionPipeline, FormActionResult, FormDetails, FormDetailsFetcher, ResponseStore, SaveOutcome,
    Session, SessionResolver,
};
pub use attachments::{Attachment, AttachmentStore, InMemoryAttachmentStore, StoreError};
pub use config::{EngineConfig, FormLimits};
pub use controller::FormController;
pub use path::{FieldPath, PathError};
pub use processor::{process_form_schema, NavItem, ProcessedForm};
pub use renderer::FormRenderer;
pub use schema::{FormSchema, SchemaError};
pub use shape::{shape_form_data, ShapeError, SubmittedFormData};
pub use ui_schema::UiSchema;
pub use validate::{validate_form_value, ValidationErrors};
pub use widgets::{render_widget, wrap_section, RenderNode, UnknownWidgetType, WidgetKind};

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug)]
pub enum FormsError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    UnknownWidget(#[from] UnknownWidgetType),

    #[error("Shaping failed: {0}")]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FormsError>;
