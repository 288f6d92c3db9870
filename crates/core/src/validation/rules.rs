//! Validation rule and schema types.

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;

/// The predicate family a rule belongs to, carrying its typed parameter.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Value is present and non-blank after trimming.
    Required,
    /// Value has a `local@domain.tld` shape.
    Email,
    /// Trimmed length is at least the given number of characters.
    MinLength(usize),
    /// Trimmed length is at most the given number of characters.
    MaxLength(usize),
    /// Value matches the regular expression.
    Pattern(Regex),
    /// Value parses as a finite number.
    Number,
    /// Value (whitespace removed) looks like an international phone number:
    /// optional `+`, a first digit 1-9, then up to 15 more digits.
    ///
    /// That allows 16 digits in total, one more than E.164 permits. Use a
    /// [`RuleKind::Pattern`] when strict E.164 length is required.
    Phone,
    /// Value equals the value currently held by the named sibling field.
    Match(String),
    /// Numeric value is at least the bound.
    Min(f64),
    /// Numeric value is at most the bound.
    Max(f64),
    /// A tag read from a schema document that this engine does not know.
    /// Always passes.
    Unknown(String),
}

impl RuleKind {
    /// The tag used for this kind in JSON schema documents.
    pub fn tag(&self) -> &str {
        match self {
            RuleKind::Required => "required",
            RuleKind::Email => "email",
            RuleKind::MinLength(_) => "minLength",
            RuleKind::MaxLength(_) => "maxLength",
            RuleKind::Pattern(_) => "pattern",
            RuleKind::Number => "number",
            RuleKind::Phone => "phone",
            RuleKind::Match(_) => "match",
            RuleKind::Min(_) => "min",
            RuleKind::Max(_) => "max",
            RuleKind::Unknown(tag) => tag,
        }
    }
}

/// One rule attached to a field: a predicate plus the message shown when it
/// fails.
#[derive(Debug, Clone)]
pub struct RuleDescriptor {
    pub kind: RuleKind,
    pub message: Option<String>,
}

impl RuleDescriptor {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn required() -> Self {
        Self::new(RuleKind::Required)
    }

    pub fn email() -> Self {
        Self::new(RuleKind::Email)
    }

    pub fn min_length(min: usize) -> Self {
        Self::new(RuleKind::MinLength(min))
    }

    pub fn max_length(max: usize) -> Self {
        Self::new(RuleKind::MaxLength(max))
    }

    pub fn pattern(regex: Regex) -> Self {
        Self::new(RuleKind::Pattern(regex))
    }

    pub fn number() -> Self {
        Self::new(RuleKind::Number)
    }

    pub fn phone() -> Self {
        Self::new(RuleKind::Phone)
    }

    pub fn matches(other_field: impl Into<String>) -> Self {
        Self::new(RuleKind::Match(other_field.into()))
    }

    pub fn min(bound: f64) -> Self {
        Self::new(RuleKind::Min(bound))
    }

    pub fn max(bound: f64) -> Self {
        Self::new(RuleKind::Max(bound))
    }

    /// Replace the default failure message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_required(&self) -> bool {
        matches!(self.kind, RuleKind::Required)
    }

    /// The message reported for `field` when this rule fails.
    pub fn message_for(&self, field: &str) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match &self.kind {
            RuleKind::Required => format!("{field} is required"),
            RuleKind::Email => "Invalid email address".to_string(),
            RuleKind::MinLength(n) => format!("Must be at least {n} characters"),
            RuleKind::MaxLength(n) => format!("Must be at most {n} characters"),
            RuleKind::Pattern(_) => "Invalid format".to_string(),
            RuleKind::Number => "Must be a valid number".to_string(),
            RuleKind::Phone => "Invalid phone number".to_string(),
            RuleKind::Match(other) => format!("Must match {other}"),
            RuleKind::Min(n) => format!("Must be at least {n}"),
            RuleKind::Max(n) => format!("Must be at most {n}"),
            RuleKind::Unknown(_) => format!("{field} is invalid"),
        }
    }
}

/// Ordered rules for a single field.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    rules: Vec<RuleDescriptor>,
}

impl FieldSchema {
    pub fn new(rules: Vec<RuleDescriptor>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RuleDescriptor] {
        &self.rules
    }

    /// The first `required` rule, wherever it sits in the list.
    pub fn required_rule(&self) -> Option<&RuleDescriptor> {
        self.rules.iter().find(|r| r.is_required())
    }
}

impl From<Vec<RuleDescriptor>> for FieldSchema {
    fn from(rules: Vec<RuleDescriptor>) -> Self {
        Self::new(rules)
    }
}

/// Field name -> rules, in declaration order.
///
/// Whole-form validation walks fields in this order, so error maps come out
/// in a stable order too.
#[derive(Debug, Clone, Default)]
pub struct FormSchema {
    fields: IndexMap<String, FieldSchema>,
}

impl FormSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: declare `name` with the given rules.
    pub fn field(mut self, name: impl Into<String>, rules: Vec<RuleDescriptor>) -> Self {
        self.fields.insert(name.into(), FieldSchema::new(rules));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `(field, tag)` for every rule whose kind was not recognised.
    pub fn unknown_rules(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(name, schema)| {
                schema.rules().iter().filter_map(move |rule| match &rule.kind {
                    RuleKind::Unknown(tag) => Some((name.as_str(), tag.as_str())),
                    _ => None,
                })
            })
            .collect()
    }

    /// Parse a schema document of the form
    /// `{"field": [{"kind": "minLength", "message": "...", "param": 5}]}`.
    ///
    /// Unknown kinds are kept (and always pass) but logged at `warn`.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let raw: IndexMap<String, Vec<RawRule>> = serde_json::from_str(json)?;

        let mut fields = IndexMap::with_capacity(raw.len());
        for (name, raw_rules) in raw {
            let rules = raw_rules
                .into_iter()
                .map(|raw_rule| raw_rule.into_descriptor(&name))
                .collect::<Result<Vec<_>, _>>()?;
            fields.insert(name, FieldSchema::new(rules));
        }

        let schema = Self { fields };
        for (field, kind) in schema.unknown_rules() {
            tracing::warn!(field, kind, "Unknown validation rule kind, it will always pass");
        }
        Ok(schema)
    }
}

impl FromIterator<(String, FieldSchema)> for FormSchema {
    fn from_iter<I: IntoIterator<Item = (String, FieldSchema)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A rule as it appears in a schema document, before its param is typed.
#[derive(Debug, Deserialize)]
struct RawRule {
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    param: Option<Value>,
}

impl RawRule {
    fn into_descriptor(self, field: &str) -> Result<RuleDescriptor, CoreError> {
        let schema_error = |reason: String| CoreError::Schema {
            field: field.to_string(),
            reason,
        };
        let param = self.param;

        let integer_param = || {
            param
                .as_ref()
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .ok_or_else(|| schema_error(format!("'{}' needs a non-negative integer param", self.kind)))
        };
        let number_param = || {
            param
                .as_ref()
                .and_then(Value::as_f64)
                .ok_or_else(|| schema_error(format!("'{}' needs a numeric param", self.kind)))
        };
        let string_param = || {
            param
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| schema_error(format!("'{}' needs a string param", self.kind)))
        };

        let kind = match self.kind.as_str() {
            "required" => RuleKind::Required,
            "email" => RuleKind::Email,
            "minLength" => RuleKind::MinLength(integer_param()?),
            "maxLength" => RuleKind::MaxLength(integer_param()?),
            "pattern" => {
                let source = string_param()?;
                let regex = Regex::new(source)
                    .map_err(|e| schema_error(format!("invalid pattern '{source}': {e}")))?;
                RuleKind::Pattern(regex)
            }
            "number" => RuleKind::Number,
            "phone" => RuleKind::Phone,
            "match" => RuleKind::Match(string_param()?.to_string()),
            "min" => RuleKind::Min(number_param()?),
            "max" => RuleKind::Max(number_param()?),
            other => RuleKind::Unknown(other.to_string()),
        };

        Ok(RuleDescriptor {
            kind,
            message: self.message,
        })
    }
}
