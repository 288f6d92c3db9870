//! Stateful form engine.
//!
//! [`FormEngine`] owns a form's values and tracks the derived state a form
//! needs to render itself: per-field error messages, which fields have been
//! touched (blurred at least once), and whether a submit is in flight.
//!
//! Errors are only recomputed when asked: on change / blur (per
//! [`FormOptions`]), on submit, or through [`FormEngine::form_validation`].

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::watch;

use super::evaluator::{evaluate_form, validate_field, FormErrors, FormValues};
use super::rules::FormSchema;

/// Field name -> has the field lost focus at least once.
pub type TouchedState = IndexMap<String, bool>;

/// Per-engine behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormOptions {
    /// Re-validate a field whenever its value changes.
    pub validate_on_change: bool,
    /// Re-validate a field when it loses focus.
    pub validate_on_blur: bool,
    /// Re-seed the form when [`FormEngine::reinitialize`] is handed initial
    /// values that differ from the last ones seen.
    pub enable_reinitialize: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_on_change: true,
            validate_on_blur: true,
            enable_reinitialize: false,
        }
    }
}

/// A change coming from a form control.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEvent {
    pub name: String,
    pub value: Value,
}

impl FieldEvent {
    /// A text input, select or textarea.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::String(value.into()),
        }
    }

    /// A checkbox; its checked state is what gets stored.
    pub fn checkbox(name: impl Into<String>, checked: bool) -> Self {
        Self {
            name: name.into(),
            value: Value::Bool(checked),
        }
    }

    /// A numeric input. Non-finite numbers are stored as null.
    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Value::from(value),
        }
    }
}

/// How a call to [`FormEngine::handle_submit`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The form was valid and the callback completed.
    Submitted,
    /// Validation failed; the callback was not invoked.
    Invalid,
    /// The callback returned an error or panicked. It has been logged.
    Failed,
}

pub struct FormEngine {
    schema: FormSchema,
    options: FormOptions,
    initial_values: FormValues,
    values: FormValues,
    errors: FormErrors,
    touched: TouchedState,
    submitting: Arc<watch::Sender<bool>>,
}

impl FormEngine {
    pub fn new(initial_values: FormValues, schema: FormSchema, options: FormOptions) -> Self {
        let (submitting, _) = watch::channel(false);
        Self {
            schema,
            options,
            values: initial_values.clone(),
            initial_values,
            errors: FormErrors::new(),
            touched: TouchedState::new(),
            submitting: Arc::new(submitting),
        }
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    pub fn touched(&self) -> &TouchedState {
        &self.touched
    }

    pub fn is_submitting(&self) -> bool {
        *self.submitting.borrow()
    }

    /// Observe the in-flight flag, e.g. to disable a submit button while the
    /// submit callback runs.
    pub fn watch_submitting(&self) -> watch::Receiver<bool> {
        self.submitting.subscribe()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.get(name).copied().unwrap_or(false)
    }

    /// Whether a form should render `name`'s error: it has one and the user
    /// has already left the field (submitting touches every field).
    pub fn should_show_error(&self, name: &str) -> bool {
        self.is_touched(name) && self.errors.contains_key(name)
    }

    /// Store the control's new value and, if enabled, re-validate that field
    /// only.
    pub fn handle_change(&mut self, event: FieldEvent) {
        let FieldEvent { name, value } = event;
        self.values.insert(name.clone(), value);
        if self.options.validate_on_change {
            self.revalidate_field(&name);
        }
    }

    /// Mark `name` as touched and, if enabled, re-validate that field only.
    pub fn handle_blur(&mut self, name: &str) {
        self.touched.insert(name.to_string(), true);
        if self.options.validate_on_blur {
            self.revalidate_field(name);
        }
    }

    /// Programmatic counterpart of [`handle_change`](Self::handle_change).
    pub fn set_field_value(&mut self, name: &str, value: impl Into<Value>) {
        self.handle_change(FieldEvent {
            name: name.to_string(),
            value: value.into(),
        });
    }

    /// Validate against the engine's own values. See
    /// [`form_validation`](Self::form_validation).
    pub fn validate_form(&mut self, fields: Option<&[&str]>) -> bool {
        self.form_validation(fields, None)
    }

    /// Validate `fields` (every schema field when `None`) against
    /// `values_override` or, when absent, the engine's own values.
    ///
    /// The error map is **replaced**, not merged: after this call it holds
    /// exactly the failures found by this run. Errors previously recorded for
    /// fields outside `fields` are dropped. Returns `true` iff no evaluated
    /// field failed.
    pub fn form_validation(
        &mut self,
        fields: Option<&[&str]>,
        values_override: Option<&FormValues>,
    ) -> bool {
        let values = values_override.unwrap_or(&self.values);
        self.errors = evaluate_form(&self.schema, fields, values);
        self.errors.is_empty()
    }

    /// Run the submit lifecycle: touch every schema field, validate the whole
    /// form, and when valid hand a copy of the values to `on_submit`.
    ///
    /// Errors and panics from `on_submit` are logged and never propagate.
    /// The submitting flag is set for the duration of the call and is cleared
    /// on every exit path, including when this future is dropped early.
    pub async fn handle_submit<F, Fut, E>(&mut self, on_submit: F) -> SubmitOutcome
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let _guard = SubmittingGuard::start(Arc::clone(&self.submitting));

        for name in self.schema.field_names() {
            self.touched.insert(name.to_string(), true);
        }

        if !self.form_validation(None, None) {
            tracing::debug!(
                error_count = self.errors.len(),
                "Submit blocked by validation errors",
            );
            return SubmitOutcome::Invalid;
        }

        let values = self.values.clone();
        match AssertUnwindSafe(on_submit(values)).catch_unwind().await {
            Ok(Ok(())) => SubmitOutcome::Submitted,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Form submission failed");
                SubmitOutcome::Failed
            }
            Err(_) => {
                tracing::error!("Form submission handler panicked");
                SubmitOutcome::Failed
            }
        }
    }

    /// Replace the values with `next` (or the initial values) and clear
    /// errors, touched flags and the submitting flag.
    pub fn reset_form(&mut self, next: Option<FormValues>) {
        self.values = next.unwrap_or_else(|| self.initial_values.clone());
        self.errors.clear();
        self.touched.clear();
        self.submitting.send_replace(false);
    }

    /// Re-seed from `initial_values` when reinitialisation is enabled and they
    /// are not shallow-equal to the last initial values seen.
    ///
    /// Call this whenever the caller's initial values may have changed, e.g.
    /// once data loaded after mount arrives. Returns whether the form was
    /// re-seeded; values, errors and touched flags are untouched otherwise.
    pub fn reinitialize(&mut self, initial_values: &FormValues) -> bool {
        if !self.options.enable_reinitialize
            || shallow_equal(initial_values, &self.initial_values)
        {
            return false;
        }

        tracing::debug!(
            field_count = initial_values.len(),
            "Reinitializing form from new initial values",
        );
        self.initial_values = initial_values.clone();
        self.values = initial_values.clone();
        self.errors.clear();
        self.touched.clear();
        true
    }

    fn revalidate_field(&mut self, name: &str) {
        match validate_field(&self.schema, name, self.values.get(name), &self.values) {
            Some(message) => {
                self.errors.insert(name.to_string(), message);
            }
            None => {
                self.errors.shift_remove(name);
            }
        }
    }
}

/// Same keys holding equal values.
fn shallow_equal(a: &FormValues, b: &FormValues) -> bool {
    a.len() == b.len() && a.iter().all(|(key, value)| b.get(key) == Some(value))
}

/// Holds the submitting flag up until dropped.
struct SubmittingGuard {
    flag: Arc<watch::Sender<bool>>,
}

impl SubmittingGuard {
    fn start(flag: Arc<watch::Sender<bool>>) -> Self {
        flag.send_replace(true);
        Self { flag }
    }
}

impl Drop for SubmittingGuard {
    fn drop(&mut self) {
        self.flag.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::rules::RuleDescriptor;
    use serde_json::json;

    fn schema() -> FormSchema {
        FormSchema::new()
            .field("name", vec![RuleDescriptor::required()])
            .field("email", vec![RuleDescriptor::required(), RuleDescriptor::email()])
    }

    fn engine(options: FormOptions) -> FormEngine {
        let mut initial = FormValues::new();
        initial.insert("name".into(), json!(""));
        initial.insert("email".into(), json!(""));
        FormEngine::new(initial, schema(), options)
    }

    #[test]
    fn change_updates_value_and_merges_one_error() {
        let mut form = engine(FormOptions::default());
        form.handle_change(FieldEvent::text("email", "nope"));

        assert_eq!(form.value("email"), Some(&json!("nope")));
        assert_eq!(form.error("email"), Some("Invalid email address"));
        // the untouched name field is not validated by a change to email
        assert_eq!(form.error("name"), None);

        form.handle_change(FieldEvent::text("email", "a@b.io"));
        assert!(form.errors().is_empty());
    }

    #[test]
    fn change_without_validation_only_stores_value() {
        let mut form = engine(FormOptions {
            validate_on_change: false,
            ..Default::default()
        });
        form.handle_change(FieldEvent::text("email", "nope"));
        assert_eq!(form.value("email"), Some(&json!("nope")));
        assert!(form.errors().is_empty());
    }

    #[test]
    fn blur_marks_touched_and_validates() {
        let mut form = engine(FormOptions::default());
        assert!(!form.is_touched("name"));

        form.handle_blur("name");
        assert!(form.is_touched("name"));
        assert_eq!(form.error("name"), Some("name is required"));
        assert!(form.should_show_error("name"));
        assert!(!form.should_show_error("email"));
    }

    #[test]
    fn blur_without_validation_only_touches() {
        let mut form = engine(FormOptions {
            validate_on_blur: false,
            ..Default::default()
        });
        form.handle_blur("name");
        assert!(form.is_touched("name"));
        assert!(form.errors().is_empty());
    }

    #[test]
    fn checkbox_stores_checked_state() {
        let mut form = engine(FormOptions::default());
        form.handle_change(FieldEvent::checkbox("remember", true));
        assert_eq!(form.value("remember"), Some(&json!(true)));
        // not in the schema, so no error entry may appear
        assert!(!form.errors().contains_key("remember"));
    }

    #[test]
    fn set_field_value_accepts_plain_values() {
        let mut form = engine(FormOptions::default());
        form.set_field_value("name", "Jane");
        form.set_field_value("age", 31);
        assert_eq!(form.value("name"), Some(&json!("Jane")));
        assert_eq!(form.value("age"), Some(&json!(31)));
    }

    #[test]
    fn shallow_equality() {
        let a: FormValues = serde_json::from_value(json!({"a": 1, "b": "x"})).unwrap();
        let b: FormValues = serde_json::from_value(json!({"b": "x", "a": 1})).unwrap();
        let c: FormValues = serde_json::from_value(json!({"a": 1})).unwrap();
        let d: FormValues = serde_json::from_value(json!({"a": 2, "b": "x"})).unwrap();
        assert!(shallow_equal(&a, &b));
        assert!(!shallow_equal(&a, &c));
        assert!(!shallow_equal(&a, &d));
    }
}
