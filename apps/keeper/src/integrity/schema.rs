//! Declarative field rules for the built-in résumé sections.
//!
//! The validator and recovery engine only rely on [`SectionValidator`]'s
//! accept/reject contract, so a host can swap any section's rules for its own.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::document::ListSection;

/// A single structural violation, addressed by a dotted/indexed path such as
/// `experience.2.startDate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub offending_value: Option<Value>,
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            message: message.into(),
            offending_value: None,
        }
    }

    pub fn with_value(mut self, value: &Value) -> Self {
        self.offending_value = Some(value.clone());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field_path, self.message)
        }
    }
}

/// Joins a parent path and a child segment using dotted notation.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

/// Accept/reject contract for one section or one list item.
///
/// Implementations must not panic; every violation is returned as data with
/// its path prefixed by `path`.
pub trait SectionValidator: Send + Sync {
    fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Field rules
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum FieldKind {
    Text { max_len: usize, non_empty: bool },
    /// Empty, or `local@domain.tld`.
    Email,
    /// Empty, or an `http(s)://` URL.
    Url,
    /// Empty, or `YYYY-MM` / `YYYY-MM-DD`.
    Date,
    Flag,
    /// Empty, or one of the listed values.
    OneOf(&'static [&'static str]),
    TextList { max_items: usize, max_len: usize },
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Cross-field check run after every individual field passed.
pub type CrossFieldCheck = fn(&Map<String, Value>, &str) -> Option<ValidationError>;

/// A [`SectionValidator`] built from a list of [`FieldRule`]s.
#[derive(Clone, Default)]
pub struct FieldRules {
    rules: Vec<FieldRule>,
    checks: Vec<CrossFieldCheck>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &'static str, kind: FieldKind, required: bool) -> Self {
        self.rules.push(FieldRule {
            name,
            kind,
            required,
        });
        self
    }

    /// Required text that may be empty.
    pub fn text(self, name: &'static str, max_len: usize) -> Self {
        self.push(
            name,
            FieldKind::Text {
                max_len,
                non_empty: false,
            },
            true,
        )
    }

    /// Required text that must contain at least one non-whitespace character.
    pub fn non_empty(self, name: &'static str, max_len: usize) -> Self {
        self.push(
            name,
            FieldKind::Text {
                max_len,
                non_empty: true,
            },
            true,
        )
    }

    pub fn optional_text(self, name: &'static str, max_len: usize) -> Self {
        self.push(
            name,
            FieldKind::Text {
                max_len,
                non_empty: false,
            },
            false,
        )
    }

    pub fn email(self, name: &'static str, required: bool) -> Self {
        self.push(name, FieldKind::Email, required)
    }

    pub fn url(self, name: &'static str) -> Self {
        self.push(name, FieldKind::Url, false)
    }

    pub fn date(self, name: &'static str) -> Self {
        self.push(name, FieldKind::Date, false)
    }

    pub fn flag(self, name: &'static str) -> Self {
        self.push(name, FieldKind::Flag, false)
    }

    pub fn one_of(self, name: &'static str, allowed: &'static [&'static str]) -> Self {
        self.push(name, FieldKind::OneOf(allowed), false)
    }

    pub fn text_list(self, name: &'static str, max_items: usize, max_len: usize) -> Self {
        self.push(
            name,
            FieldKind::TextList {
                max_items,
                max_len,
            },
            false,
        )
    }

    pub fn check(mut self, check: CrossFieldCheck) -> Self {
        self.checks.push(check);
        self
    }
}

impl SectionValidator for FieldRules {
    fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let Some(obj) = value.as_object() else {
            return vec![ValidationError::new(path, "expected an object").with_value(value)];
        };

        let mut errors = Vec::new();
        for rule in &self.rules {
            let field_path = join_path(path, rule.name);
            match obj.get(rule.name) {
                None if rule.required => {
                    errors.push(ValidationError::new(field_path, "required field is missing"));
                }
                None => {}
                Some(v) => {
                    if let Some(message) = check_field(&rule.kind, v) {
                        errors.push(ValidationError::new(field_path, message).with_value(v));
                    }
                }
            }
        }

        // Cross-field checks assume well-typed fields.
        if errors.is_empty() {
            errors.extend(self.checks.iter().filter_map(|check| check(obj, path)));
        }
        errors
    }
}

fn check_field(kind: &FieldKind, value: &Value) -> Option<String> {
    match kind {
        FieldKind::Flag => (!value.is_boolean()).then(|| "expected true or false".to_string()),
        FieldKind::TextList {
            max_items,
            max_len,
        } => {
            let Some(items) = value.as_array() else {
                return Some("expected a list of strings".to_string());
            };
            if items.len() > *max_items {
                return Some(format!("at most {max_items} entries allowed"));
            }
            items.iter().enumerate().find_map(|(i, item)| match item.as_str() {
                None => Some(format!("entry {i} must be a string")),
                Some(s) if s.chars().count() > *max_len => {
                    Some(format!("entry {i} exceeds {max_len} characters"))
                }
                Some(_) => None,
            })
        }
        _ => {
            let Some(text) = value.as_str() else {
                return Some("expected a string".to_string());
            };
            check_text(kind, text)
        }
    }
}

fn check_text(kind: &FieldKind, text: &str) -> Option<String> {
    match kind {
        FieldKind::Text { max_len, non_empty } => {
            if *non_empty && text.trim().is_empty() {
                Some("must not be empty".to_string())
            } else if text.chars().count() > *max_len {
                Some(format!("exceeds {max_len} characters"))
            } else {
                None
            }
        }
        FieldKind::Email => {
            (!text.is_empty() && !is_email(text)).then(|| "not a valid email address".to_string())
        }
        FieldKind::Url => (!text.is_empty()
            && !(text.starts_with("http://") || text.starts_with("https://")))
        .then(|| "must start with http:// or https://".to_string()),
        FieldKind::Date => (!text.is_empty() && parse_date(text).is_none())
            .then(|| "expected a date formatted YYYY-MM or YYYY-MM-DD".to_string()),
        FieldKind::OneOf(allowed) => (!text.is_empty() && !allowed.contains(&text))
            .then(|| format!("must be one of: {}", allowed.join(", "))),
        FieldKind::Flag | FieldKind::TextList { .. } => None,
    }
}

fn is_email(text: &str) -> bool {
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Parses `YYYY-MM` (first of month) or `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    match text.len() {
        7 => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok(),
        10 => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// Rejects items whose `endDate` falls before their `startDate`.
fn end_not_before_start(obj: &Map<String, Value>, path: &str) -> Option<ValidationError> {
    let start = obj.get("startDate").and_then(Value::as_str).and_then(parse_date)?;
    let end_value = obj.get("endDate")?;
    let end = end_value.as_str().and_then(parse_date)?;
    (end < start).then(|| {
        ValidationError::new(join_path(path, "endDate"), "must not be before startDate")
            .with_value(end_value)
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Document schema
// ────────────────────────────────────────────────────────────────────────────

const SKILL_LEVELS: &[&str] = &["beginner", "intermediate", "advanced", "expert"];
const LANGUAGE_LEVELS: &[&str] = &["basic", "conversational", "fluent", "native"];

/// Validators for every section of the document.
#[derive(Clone)]
pub struct DocumentSchema {
    personal_info: Arc<dyn SectionValidator>,
    objective: Arc<dyn SectionValidator>,
    items: HashMap<ListSection, Arc<dyn SectionValidator>>,
}

impl DocumentSchema {
    /// Builds a schema from host-supplied validators. List sections without a
    /// registered item validator only require each item to be an object.
    pub fn new(
        personal_info: Arc<dyn SectionValidator>,
        objective: Arc<dyn SectionValidator>,
    ) -> Self {
        Self {
            personal_info,
            objective,
            items: HashMap::new(),
        }
    }

    pub fn with_item_validator(
        mut self,
        section: ListSection,
        validator: Arc<dyn SectionValidator>,
    ) -> Self {
        self.items.insert(section, validator);
        self
    }

    /// The built-in résumé field catalogue.
    pub fn resume() -> Self {
        let personal_info = FieldRules::new()
            .text("fullName", 120)
            .email("email", true)
            .optional_text("jobTitle", 120)
            .optional_text("phone", 40)
            .optional_text("location", 120)
            .optional_text("summary", 2000)
            .url("linkedin")
            .url("website");
        let objective = FieldRules::new().text("text", 2000);

        Self::new(Arc::new(personal_info), Arc::new(objective))
            .with_item_validator(
                ListSection::Education,
                Arc::new(
                    FieldRules::new()
                        .non_empty("institution", 200)
                        .optional_text("degree", 200)
                        .optional_text("fieldOfStudy", 200)
                        .date("startDate")
                        .date("endDate")
                        .optional_text("description", 2000)
                        .check(end_not_before_start),
                ),
            )
            .with_item_validator(
                ListSection::Experience,
                Arc::new(
                    FieldRules::new()
                        .non_empty("company", 200)
                        .optional_text("position", 200)
                        .optional_text("location", 120)
                        .date("startDate")
                        .date("endDate")
                        .flag("current")
                        .optional_text("description", 4000)
                        .check(end_not_before_start),
                ),
            )
            .with_item_validator(
                ListSection::Skills,
                Arc::new(
                    FieldRules::new()
                        .non_empty("name", 100)
                        .one_of("level", SKILL_LEVELS),
                ),
            )
            .with_item_validator(
                ListSection::Languages,
                Arc::new(
                    FieldRules::new()
                        .non_empty("name", 100)
                        .one_of("proficiency", LANGUAGE_LEVELS),
                ),
            )
            .with_item_validator(
                ListSection::Courses,
                Arc::new(
                    FieldRules::new()
                        .non_empty("name", 200)
                        .optional_text("institution", 200)
                        .date("date"),
                ),
            )
            .with_item_validator(
                ListSection::Projects,
                Arc::new(
                    FieldRules::new()
                        .non_empty("name", 200)
                        .optional_text("description", 4000)
                        .url("url")
                        .text_list("technologies", 50, 60),
                ),
            )
            .with_item_validator(
                ListSection::Achievements,
                Arc::new(
                    FieldRules::new()
                        .non_empty("title", 200)
                        .date("date")
                        .optional_text("description", 2000),
                ),
            )
    }

    pub fn personal_info(&self) -> &dyn SectionValidator {
        self.personal_info.as_ref()
    }

    pub fn objective(&self) -> &dyn SectionValidator {
        self.objective.as_ref()
    }

    pub fn item(&self, section: ListSection) -> Option<&dyn SectionValidator> {
        self.items.get(&section).map(|v| v.as_ref())
    }
}

impl Default for DocumentSchema {
    fn default() -> Self {
        Self::resume()
    }
}
