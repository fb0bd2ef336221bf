use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::integrity::validator::{SchemaValidator, Validation};
use crate::models::document::{ResumeDocument, CURRENT_VERSION};

#[derive(Debug, Error, PartialEq)]
pub enum MigrationError {
    #[error("cannot migrate a document whose root is not an object")]
    NotAnObject,
}

/// A candidate after the version transforms ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Upgrade {
    pub value: Value,
    pub from_version: u32,
    pub to_version: u32,
}

impl Upgrade {
    pub fn applied(&self) -> bool {
        self.from_version != self.to_version
    }
}

type Transform = fn(&mut Map<String, Value>);

/// `TRANSFORMS[n]` upgrades a version-`n` document to version `n + 1`.
/// Transforms only add missing keys and never overwrite existing data.
const TRANSFORMS: [Transform; CURRENT_VERSION as usize] = [add_v1_sections, add_v2_sections];

fn add_v1_sections(root: &mut Map<String, Value>) {
    insert_missing(root, "objective", serde_json::json!({ "text": "" }));
    insert_missing(root, "projects", Value::Array(Vec::new()));
    insert_missing(root, "achievements", Value::Array(Vec::new()));
}

fn add_v2_sections(root: &mut Map<String, Value>) {
    insert_missing(root, "languages", Value::Array(Vec::new()));
    insert_missing(root, "courses", Value::Array(Vec::new()));
    // A non-object identity is left for validation/recovery to deal with.
    if let Some(Value::Object(identity)) = root.get_mut("personalInfo") {
        insert_missing(identity, "linkedin", Value::String(String::new()));
        insert_missing(identity, "website", Value::String(String::new()));
    }
}

fn insert_missing(map: &mut Map<String, Value>, key: &str, value: Value) {
    if !map.contains_key(key) {
        map.insert(key.to_string(), value);
    }
}

/// Reads the version tag; absent or non-numeric tags count as version 0.
pub fn version_of(candidate: &Value) -> u32 {
    candidate
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// Upgrades older documents through ordered, additive transforms.
#[derive(Clone)]
pub struct VersionMigrator {
    validator: SchemaValidator,
}

impl VersionMigrator {
    pub fn new(validator: SchemaValidator) -> Self {
        Self { validator }
    }

    /// Runs every transform from the candidate's version up to
    /// [`CURRENT_VERSION`]. Versions newer than current are returned as-is.
    pub fn upgrade(&self, candidate: &Value) -> Result<Upgrade, MigrationError> {
        let Some(root) = candidate.as_object() else {
            return Err(MigrationError::NotAnObject);
        };

        let from_version = version_of(candidate);
        if from_version >= CURRENT_VERSION {
            return Ok(Upgrade {
                value: candidate.clone(),
                from_version,
                to_version: from_version,
            });
        }

        let mut upgraded = root.clone();
        for (step, transform) in TRANSFORMS.iter().enumerate().skip(from_version as usize) {
            transform(&mut upgraded);
            debug!("Applied document transform v{} -> v{}", step, step + 1);
        }
        upgraded.insert("version".to_string(), Value::from(CURRENT_VERSION));

        Ok(Upgrade {
            value: Value::Object(upgraded),
            from_version,
            to_version: CURRENT_VERSION,
        })
    }

    /// Upgrades and re-validates. A result that still fails validation is
    /// discarded in favour of an empty document.
    pub fn migrate(&self, candidate: &Value) -> ResumeDocument {
        let upgrade = match self.upgrade(candidate) {
            Ok(upgrade) => upgrade,
            Err(e) => {
                warn!("Migration failed ({e}); using an empty document");
                return ResumeDocument::default();
            }
        };

        match self.validator.validate(&upgrade.value) {
            Validation::Valid(doc) => doc,
            Validation::Invalid(errors) => {
                warn!(
                    from = upgrade.from_version,
                    errors = errors.len(),
                    "Migrated document failed validation; using an empty document"
                );
                ResumeDocument::default()
            }
        }
    }
}
