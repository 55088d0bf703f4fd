//! Per-widget interaction state
//!
//! `Pristine -> Touched -> (Valid | Invalid)`. Text-like widgets are touched
//! on blur so applicants are not shown errors mid-word; discrete widgets are
//! touched on change. Values leave the widget only as a [`FieldChange`].

use serde::Serialize;
use serde_json::Value;

use super::WidgetKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "errors", rename_all = "snake_case")]
pub enum WidgetState {
    Pristine,
    Touched,
    Valid,
    Invalid(Vec<String>),
}

impl WidgetState {
    pub fn is_touched(&self) -> bool {
        !matches!(self, WidgetState::Pristine)
    }

    /// Errors to display; pristine and touched widgets show none
    pub fn errors(&self) -> &[String] {
        match self {
            WidgetState::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

/// Value emitted upward when a widget commits input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    /// HTML field path
    pub id: String,
    /// `None` clears the field
    pub value: Option<Value>,
}

/// One live widget
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetInstance {
    pub id: String,
    pub kind: WidgetKind,
    pub state: WidgetState,
    pub disabled: bool,
    value: Option<Value>,
}

impl WidgetInstance {
    pub fn new(id: impl Into<String>, kind: WidgetKind, value: Option<Value>) -> Self {
        Self {
            id: id.into(),
            kind,
            state: WidgetState::Pristine,
            disabled: false,
            value,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Record new input. Discrete widgets commit immediately; text widgets
    /// commit on [`blur`](Self::blur). Disabled widgets ignore input.
    pub fn change(&mut self, value: Option<Value>) -> Option<FieldChange> {
        if self.disabled || self.kind.is_print() {
            return None;
        }
        self.value = value;
        if self.kind.is_discrete() {
            self.touch();
            return Some(self.emit());
        }
        None
    }

    /// Focus left the widget
    pub fn blur(&mut self) -> Option<FieldChange> {
        if self.disabled || self.kind.is_discrete() || self.kind.is_print() {
            return None;
        }
        self.touch();
        Some(self.emit())
    }

    /// Apply a validation outcome; pristine widgets stay pristine.
    pub fn settle(&mut self, errors: Vec<String>) {
        if !self.state.is_touched() {
            return;
        }
        self.state = if errors.is_empty() {
            WidgetState::Valid
        } else {
            WidgetState::Invalid(errors)
        };
    }

    fn touch(&mut self) {
        if self.state == WidgetState::Pristine {
            self.state = WidgetState::Touched;
        }
    }

    fn emit(&self) -> FieldChange {
        FieldChange {
            id: self.id.clone(),
            value: self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_commits_on_blur() {
        let mut widget = WidgetInstance::new("name", WidgetKind::Text, None);
        assert_eq!(widget.change(Some(json!("Ad"))), None);
        assert_eq!(widget.state, WidgetState::Pristine);

        let change = widget.blur().unwrap();
        assert_eq!(change, FieldChange { id: "name".into(), value: Some(json!("Ad")) });
        assert_eq!(widget.state, WidgetState::Touched);

        widget.settle(vec!["Too short".into()]);
        assert_eq!(widget.state.errors(), &["Too short".to_string()]);
        widget.settle(vec![]);
        assert_eq!(widget.state, WidgetState::Valid);
    }

    #[test]
    fn test_discrete_commits_on_change() {
        let mut widget = WidgetInstance::new("kind", WidgetKind::Radio, None);
        let change = widget.change(Some(json!("A"))).unwrap();
        assert_eq!(change.value, Some(json!("A")));
        assert!(widget.state.is_touched());
        assert_eq!(widget.blur(), None);
    }

    #[test]
    fn test_pristine_ignores_validation() {
        let mut widget = WidgetInstance::new("name", WidgetKind::Text, None);
        widget.settle(vec!["required".into()]);
        assert_eq!(widget.state, WidgetState::Pristine);
        assert!(widget.state.errors().is_empty());
    }

    #[test]
    fn test_disabled_ignores_input() {
        let mut widget = WidgetInstance::new("signature", WidgetKind::Text, Some(json!("x")));
        widget.disabled = true;
        assert_eq!(widget.change(Some(json!("y"))), None);
        assert_eq!(widget.blur(), None);
        assert_eq!(widget.value(), Some(&json!("x")));
    }
}
