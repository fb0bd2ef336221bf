//! Partial recovery: salvages what validates from an invalid candidate and
//! defaults the rest, section by section.
//!
//! Scalar sections are all-or-nothing: a section with any invalid field is
//! replaced by its defaults as a whole, since fields inside a section may
//! depend on each other. List sections keep every valid item in order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::integrity::schema::ValidationError;
use crate::integrity::validator::{SchemaValidator, Validation};
use crate::models::document::{ListSection, ResumeDocument, ScalarSection, CURRENT_VERSION};

/// What recovery did with one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    Kept,
    Filtered { kept: usize, total: usize },
    Defaulted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredField {
    pub field: String,
    #[serde(flatten)]
    pub action: RecoveryAction,
}

impl RecoveredField {
    fn new(field: &str, action: RecoveryAction) -> Self {
        Self {
            field: field.to_string(),
            action,
        }
    }

    /// `"kept/total"` for filtered lists.
    pub fn ratio(&self) -> Option<String> {
        match self.action {
            RecoveryAction::Filtered { kept, total } => Some(format!("{kept}/{total}")),
            _ => None,
        }
    }
}

/// Recovery result: a fully valid document plus the manifest shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub document: ResumeDocument,
    /// Errors found in the candidate before recovery.
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub recovered_fields: Vec<RecoveredField>,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The salvaged document (or the defaults themselves) failed validation,
    /// which only happens when a host-supplied schema rejects its own defaults.
    #[error("recovered document is still invalid: {}", first_error(.0))]
    Unrecoverable(Vec<ValidationError>),
}

fn first_error(errors: &[ValidationError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[derive(Clone)]
pub struct PartialRecoveryEngine {
    validator: SchemaValidator,
}

impl PartialRecoveryEngine {
    pub fn new(validator: SchemaValidator) -> Self {
        Self { validator }
    }

    /// Salvages `candidate`. `errors` are the whole-document errors that
    /// triggered recovery and are carried through to the report.
    pub fn recover(
        &self,
        candidate: &Value,
        errors: Vec<ValidationError>,
    ) -> Result<RecoveryReport, RecoveryError> {
        let mut warnings = Vec::new();
        let mut recovered_fields = Vec::new();

        let Some(root) = candidate.as_object() else {
            warn!("Recovery candidate is not an object; defaulting every section");
            warnings.push("Stored document was unreadable; every section was reset".to_string());
            for section in ScalarSection::ALL {
                recovered_fields.push(RecoveredField::new(section.key(), RecoveryAction::Defaulted));
            }
            for section in ListSection::ALL {
                recovered_fields.push(RecoveredField::new(section.key(), RecoveryAction::Defaulted));
            }
            return self.finish(Value::Object(default_root()), errors, warnings, recovered_fields);
        };

        let mut out = Map::new();
        out.insert("version".to_string(), Value::from(CURRENT_VERSION));

        for section in ScalarSection::ALL {
            let key = section.key();
            let salvaged = root
                .get(key)
                .filter(|value| self.validator.validate_section(section, value).is_empty());
            match salvaged {
                Some(value) => {
                    out.insert(key.to_string(), value.clone());
                    recovered_fields.push(RecoveredField::new(key, RecoveryAction::Kept));
                }
                None => {
                    out.insert(key.to_string(), section.default_value());
                    recovered_fields.push(RecoveredField::new(key, RecoveryAction::Defaulted));
                    warnings.push(format!("Section '{key}' was invalid and has been reset"));
                }
            }
        }

        for section in ListSection::ALL {
            let key = section.key();
            match root.get(key).and_then(Value::as_array) {
                Some(items) => {
                    let total = items.len();
                    let kept: Vec<Value> = items
                        .iter()
                        .enumerate()
                        .filter(|(index, item)| {
                            self.validator.validate_item(section, item, *index).is_empty()
                        })
                        .map(|(_, item)| item.clone())
                        .collect();
                    let action = if kept.len() == total {
                        RecoveryAction::Kept
                    } else {
                        warnings.push(format!(
                            "Removed {} invalid entr{} from '{key}' ({}/{total} kept)",
                            total - kept.len(),
                            if total - kept.len() == 1 { "y" } else { "ies" },
                            kept.len()
                        ));
                        RecoveryAction::Filtered {
                            kept: kept.len(),
                            total,
                        }
                    };
                    out.insert(key.to_string(), Value::Array(kept));
                    recovered_fields.push(RecoveredField::new(key, action));
                }
                None => {
                    out.insert(key.to_string(), Value::Array(Vec::new()));
                    recovered_fields.push(RecoveredField::new(key, RecoveryAction::Defaulted));
                    if root.contains_key(key) {
                        warnings.push(format!("Section '{key}' was not a list and has been reset"));
                    }
                }
            }
        }

        self.finish(Value::Object(out), errors, warnings, recovered_fields)
    }

    fn finish(
        &self,
        salvaged: Value,
        errors: Vec<ValidationError>,
        warnings: Vec<String>,
        recovered_fields: Vec<RecoveredField>,
    ) -> Result<RecoveryReport, RecoveryError> {
        match self.validator.validate(&salvaged) {
            Validation::Valid(document) => {
                info!(
                    errors = errors.len(),
                    warnings = warnings.len(),
                    "Partial recovery produced a valid document"
                );
                Ok(RecoveryReport {
                    document,
                    errors,
                    warnings,
                    recovered_fields,
                })
            }
            Validation::Invalid(remaining) => {
                warn!(
                    remaining = remaining.len(),
                    "Partial recovery could not produce a valid document"
                );
                Err(RecoveryError::Unrecoverable(remaining))
            }
        }
    }
}

fn default_root() -> Map<String, Value> {
    match serde_json::to_value(ResumeDocument::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
