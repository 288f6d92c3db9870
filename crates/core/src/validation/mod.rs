//! Declarative form validation engine.
//!
//! Provides rule and schema types, a pure-logic field evaluator, the stateful
//! [`FormEngine`](form::FormEngine) that forms drive through change / blur /
//! submit events, and the shared schemas of the HRMS forms.

pub mod evaluator;
pub mod form;
pub mod rules;
pub mod schemas;

pub use evaluator::{validate_field, FormErrors, FormValues};
pub use form::{FieldEvent, FormEngine, FormOptions, SubmitOutcome, TouchedState};
pub use rules::{FieldSchema, FormSchema, RuleDescriptor, RuleKind};
