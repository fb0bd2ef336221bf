use std::sync::Arc;

use serde_json::Value;

use crate::integrity::schema::{join_path, DocumentSchema, ValidationError};
use crate::models::document::{ListSection, ResumeDocument, ScalarSection};

/// Outcome of whole-document validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(ResumeDocument),
    Invalid(Vec<ValidationError>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            Validation::Valid(_) => &[],
            Validation::Invalid(errors) => errors,
        }
    }

    pub fn into_document(self) -> Option<ResumeDocument> {
        match self {
            Validation::Valid(doc) => Some(doc),
            Validation::Invalid(_) => None,
        }
    }
}

/// Structural validation of candidate documents. Never panics: every failure
/// is reported as a [`ValidationError`].
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Arc<DocumentSchema>,
}

impl SchemaValidator {
    pub fn new(schema: Arc<DocumentSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    /// Validates a whole candidate. Unknown top-level keys are ignored; list
    /// items are checked independently so every bad item is reported.
    pub fn validate(&self, candidate: &Value) -> Validation {
        let Some(root) = candidate.as_object() else {
            return Validation::Invalid(vec![ValidationError::new(
                "",
                "document must be an object",
            )
            .with_value(candidate)]);
        };

        let mut errors = Vec::new();

        match root.get("version") {
            None => errors.push(ValidationError::new("version", "required field is missing")),
            Some(v) if v.as_u64().and_then(|n| u32::try_from(n).ok()).is_none() => errors.push(
                ValidationError::new("version", "expected a non-negative integer").with_value(v),
            ),
            Some(_) => {}
        }

        for section in ScalarSection::ALL {
            match root.get(section.key()) {
                None => errors.push(ValidationError::new(
                    section.key(),
                    "required section is missing",
                )),
                Some(value) => errors.extend(self.validate_section(section, value)),
            }
        }

        for section in ListSection::ALL {
            match root.get(section.key()) {
                None => errors.push(ValidationError::new(
                    section.key(),
                    "required section is missing",
                )),
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter().enumerate() {
                        errors.extend(self.validate_item(section, item, index));
                    }
                }
                Some(other) => errors.push(
                    ValidationError::new(section.key(), "expected a list").with_value(other),
                ),
            }
        }

        if !errors.is_empty() {
            return Validation::Invalid(errors);
        }

        // Rules passed, so the typed conversion only fails on a schema/struct
        // mismatch; report it rather than panic.
        match serde_json::from_value::<ResumeDocument>(candidate.clone()) {
            Ok(doc) => Validation::Valid(doc),
            Err(e) => Validation::Invalid(vec![ValidationError::new(
                "",
                format!("document does not match the typed model: {e}"),
            )]),
        }
    }

    /// Validates one scalar section in isolation.
    pub fn validate_section(&self, section: ScalarSection, value: &Value) -> Vec<ValidationError> {
        let validator = match section {
            ScalarSection::PersonalInfo => self.schema.personal_info(),
            ScalarSection::Objective => self.schema.objective(),
        };
        let errors = validator.validate(value, section.key());
        if !errors.is_empty() {
            return errors;
        }
        match section.check_typed(value) {
            Ok(()) => Vec::new(),
            Err(e) => vec![ValidationError::new(
                section.key(),
                format!("does not match the typed model: {e}"),
            )
            .with_value(value)],
        }
    }

    /// Validates one list item in isolation; `index` is used for the path.
    pub fn validate_item(
        &self,
        section: ListSection,
        item: &Value,
        index: usize,
    ) -> Vec<ValidationError> {
        let path = join_path(section.key(), &index.to_string());
        let errors = match self.schema.item(section) {
            Some(validator) => validator.validate(item, &path),
            None if item.is_object() => Vec::new(),
            None => vec![ValidationError::new(path.clone(), "expected an object").with_value(item)],
        };
        if !errors.is_empty() {
            return errors;
        }
        // Host validators may accept shapes the typed entry rejects.
        match section.check_entry(item) {
            Ok(()) => Vec::new(),
            Err(e) => vec![
                ValidationError::new(path, format!("does not match the typed model: {e}"))
                    .with_value(item),
            ],
        }
    }

    /// Validates an already typed document against the field rules.
    pub fn validate_document(&self, document: &ResumeDocument) -> Validation {
        match serde_json::to_value(document) {
            Ok(value) => self.validate(&value),
            Err(e) => Validation::Invalid(vec![ValidationError::new(
                "",
                format!("document could not be serialized: {e}"),
            )]),
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(Arc::new(DocumentSchema::resume()))
    }
}
