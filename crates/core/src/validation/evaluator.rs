//! Rule evaluator -- pure logic, no form state.

use std::borrow::Cow;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use super::rules::{FormSchema, RuleDescriptor, RuleKind};

/// Current value of every field, keyed by field name.
pub type FormValues = serde_json::Map<String, Value>;

/// Current error message per failing field. Passing fields have no entry.
pub type FormErrors = IndexMap<String, String>;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{0,15}$").expect("valid regex"));

/// Validate one field against its rules.
///
/// Returns the message of the first failing rule, or `None` when the field
/// passes or has no rules. A failing `required` rule wins regardless of its
/// position; an optional field that is blank skips every other rule.
pub fn validate_field(
    schema: &FormSchema,
    name: &str,
    value: Option<&Value>,
    all_values: &FormValues,
) -> Option<String> {
    let field = schema.get(name)?;

    if let Some(required) = field.required_rule() {
        if is_blank(value) {
            return Some(required.message_for(name));
        }
    }

    let text = match value_text(value) {
        Some(text) if !text.trim().is_empty() => text,
        _ => return None,
    };

    field
        .rules()
        .iter()
        .filter(|rule| !rule.is_required())
        .find(|rule| !rule_passes(rule, &text, value, all_values))
        .map(|rule| rule.message_for(name))
}

/// Validate the listed fields (or every schema field, in declaration order)
/// and return the errors of those that fail.
pub fn evaluate_form(
    schema: &FormSchema,
    fields: Option<&[&str]>,
    values: &FormValues,
) -> FormErrors {
    let mut errors = FormErrors::new();
    let mut check = |name: &str| {
        if let Some(message) = validate_field(schema, name, values.get(name), values) {
            errors.insert(name.to_string(), message);
        }
    };

    match fields {
        Some(names) => names.iter().copied().for_each(&mut check),
        None => schema.field_names().for_each(&mut check),
    }
    errors
}

/// Textual view of a field value, as a form control would hold it.
///
/// Null, absent and empty-array values have no text.
pub fn value_text(value: Option<&Value>) -> Option<Cow<'_, str>> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Bool(true) => Some(Cow::Borrowed("true")),
        Value::Bool(false) => Some(Cow::Borrowed("false")),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Array(items) if items.is_empty() => None,
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// Absent, null, or whitespace-only.
pub fn is_blank(value: Option<&Value>) -> bool {
    value_text(value).map_or(true, |text| text.trim().is_empty())
}

fn rule_passes(
    rule: &RuleDescriptor,
    text: &str,
    value: Option<&Value>,
    all_values: &FormValues,
) -> bool {
    match &rule.kind {
        RuleKind::Required => true,
        RuleKind::Email => EMAIL_RE.is_match(text),
        RuleKind::MinLength(min) => text.trim().chars().count() >= *min,
        RuleKind::MaxLength(max) => text.trim().chars().count() <= *max,
        RuleKind::Pattern(regex) => regex.is_match(text),
        RuleKind::Number => parse_number(text).is_some(),
        RuleKind::Phone => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            PHONE_RE.is_match(&compact)
        }
        RuleKind::Match(other) => {
            value.unwrap_or(&Value::Null) == all_values.get(other).unwrap_or(&Value::Null)
        }
        RuleKind::Min(bound) => parse_number(text).is_some_and(|n| n >= *bound),
        RuleKind::Max(bound) => parse_number(text).is_some_and(|n| n <= *bound),
        RuleKind::Unknown(tag) => {
            tracing::debug!(kind = %tag, "Skipping unknown validation rule");
            true
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> FormValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn single(rules: Vec<RuleDescriptor>) -> FormSchema {
        FormSchema::new().field("field", rules)
    }

    fn check(schema: &FormSchema, value: Value) -> Option<String> {
        let all = values(&[("field", value.clone())]);
        validate_field(schema, "field", Some(&value), &all)
    }

    #[test]
    fn required_short_circuits_other_rules() {
        let schema = single(vec![
            RuleDescriptor::required().with_message("required!"),
            RuleDescriptor::min_length(5).with_message("too short"),
        ]);
        assert_eq!(check(&schema, json!("")).as_deref(), Some("required!"));
    }

    #[test]
    fn required_checked_first_even_when_declared_last() {
        let schema = single(vec![
            RuleDescriptor::min_length(5).with_message("too short"),
            RuleDescriptor::required().with_message("required!"),
        ]);
        assert_eq!(check(&schema, json!("   ")).as_deref(), Some("required!"));
        assert_eq!(check(&schema, json!("abc")).as_deref(), Some("too short"));
    }

    #[test]
    fn required_uses_default_message() {
        let schema = FormSchema::new().field("lastName", vec![RuleDescriptor::required()]);
        let result = validate_field(&schema, "lastName", None, &FormValues::new());
        assert_eq!(result.as_deref(), Some("lastName is required"));
    }

    #[test]
    fn required_fails_null_and_passes_false() {
        let schema = single(vec![RuleDescriptor::required()]);
        assert!(check(&schema, Value::Null).is_some());
        assert!(check(&schema, json!(false)).is_none());
        assert!(check(&schema, json!(0)).is_none());
    }

    #[test]
    fn optional_blank_skips_rules() {
        let schema = single(vec![RuleDescriptor::min_length(5)]);
        assert_eq!(check(&schema, json!("")), None);
        assert_eq!(check(&schema, Value::Null), None);
    }

    #[test]
    fn first_failure_in_declared_order() {
        let schema = single(vec![
            RuleDescriptor::pattern(Regex::new(r"^\d+$").unwrap()).with_message("digits only"),
            RuleDescriptor::min(10.0).with_message("at least 10"),
        ]);
        assert_eq!(check(&schema, json!("abc")).as_deref(), Some("digits only"));
        assert_eq!(check(&schema, json!("7")).as_deref(), Some("at least 10"));
        assert_eq!(check(&schema, json!("12")), None);
    }

    #[test]
    fn match_compares_against_sibling() {
        let schema = FormSchema::new().field(
            "confirmPassword",
            vec![RuleDescriptor::matches("password").with_message("Passwords do not match")],
        );
        let mismatched = values(&[
            ("password", json!("abc123")),
            ("confirmPassword", json!("abc124")),
        ]);
        assert_eq!(
            validate_field(
                &schema,
                "confirmPassword",
                mismatched.get("confirmPassword"),
                &mismatched
            )
            .as_deref(),
            Some("Passwords do not match")
        );

        let matched = values(&[
            ("password", json!("abc123")),
            ("confirmPassword", json!("abc123")),
        ]);
        assert_eq!(
            validate_field(&schema, "confirmPassword", matched.get("confirmPassword"), &matched),
            None
        );
    }

    #[test]
    fn match_fails_when_sibling_absent() {
        let schema = single(vec![RuleDescriptor::matches("password")]);
        assert_eq!(check(&schema, json!("abc")).as_deref(), Some("Must match password"));
    }

    #[test]
    fn phone_boundaries() {
        let schema = single(vec![RuleDescriptor::phone()]);
        assert_eq!(check(&schema, json!("+14155551234")), None);
        assert_eq!(check(&schema, json!("14155551234")), None);
        assert_eq!(check(&schema, json!("+1 415 555 1234")), None);
        assert!(check(&schema, json!("notaphone")).is_some());
        assert!(check(&schema, json!("+04155551234")).is_some());
        // first digit plus sixteen more is one too many
        assert!(check(&schema, json!("12345678901234567")).is_some());
        assert_eq!(check(&schema, json!("1234567890123456")), None);
    }

    #[test]
    fn email_shape() {
        let schema = single(vec![RuleDescriptor::email()]);
        assert_eq!(check(&schema, json!("jane.doe@example.com")), None);
        assert!(check(&schema, json!("jane.doe@example")).is_some());
        assert!(check(&schema, json!("jane doe@example.com")).is_some());
        assert!(check(&schema, json!("@example.com")).is_some());
    }

    #[test]
    fn lengths_use_trimmed_characters() {
        let schema = single(vec![RuleDescriptor::min_length(3), RuleDescriptor::max_length(5)]);
        assert!(check(&schema, json!("  ab  ")).is_some());
        assert_eq!(check(&schema, json!("  abc  ")), None);
        assert_eq!(check(&schema, json!("ÄÖÜßé")), None);
        assert!(check(&schema, json!("abcdef")).is_some());
    }

    #[test]
    fn number_requires_finite_value() {
        let schema = single(vec![RuleDescriptor::number()]);
        assert_eq!(check(&schema, json!("42.5")), None);
        assert_eq!(check(&schema, json!(" -3 ")), None);
        assert_eq!(check(&schema, json!(17)), None);
        assert!(check(&schema, json!("12abc")).is_some());
        assert!(check(&schema, json!("inf")).is_some());
        assert!(check(&schema, json!("NaN")).is_some());
    }

    #[test]
    fn min_and_max_bounds() {
        let schema = single(vec![RuleDescriptor::min(1.0), RuleDescriptor::max(30.0)]);
        assert_eq!(check(&schema, json!("1")), None);
        assert_eq!(check(&schema, json!(30)), None);
        assert_eq!(check(&schema, json!("0.5")).as_deref(), Some("Must be at least 1"));
        assert_eq!(check(&schema, json!("31")).as_deref(), Some("Must be at most 30"));
        assert!(check(&schema, json!("many")).is_some());
    }

    #[test]
    fn unknown_kind_always_passes() {
        let schema = single(vec![RuleDescriptor::new(RuleKind::Unknown("uuid".into()))]);
        assert_eq!(check(&schema, json!("definitely not a uuid")), None);
    }

    #[test]
    fn field_without_rules_passes() {
        let schema = FormSchema::new();
        assert_eq!(validate_field(&schema, "ghost", None, &FormValues::new()), None);
    }

    #[test]
    fn evaluate_form_only_reports_failures_in_schema_order() {
        let schema = FormSchema::new()
            .field("name", vec![RuleDescriptor::required()])
            .field("email", vec![RuleDescriptor::required(), RuleDescriptor::email()])
            .field("phone", vec![RuleDescriptor::phone()]);
        let vals = values(&[("email", json!("bad")), ("phone", json!(""))]);

        let errors = evaluate_form(&schema, None, &vals);
        let keys: Vec<&str> = errors.keys().map(String::as_str).collect();
        assert_eq!(keys, ["name", "email"]);

        let subset = evaluate_form(&schema, Some(&["phone", "email"]), &vals);
        let keys: Vec<&str> = subset.keys().map(String::as_str).collect();
        assert_eq!(keys, ["email"]);
    }

    #[test]
    fn evaluate_form_ignores_fields_outside_schema() {
        let schema = FormSchema::new().field("name", vec![RuleDescriptor::required()]);
        let errors = evaluate_form(&schema, Some(&["unknown"]), &FormValues::new());
        assert!(errors.is_empty());
    }
}
