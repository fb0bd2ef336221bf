// Document integrity: structural validation, partial recovery and version
// migration. Nothing here touches storage or the network.

pub mod migration;
pub mod recovery;
pub mod schema;
pub mod validator;

pub use migration::{MigrationError, Upgrade, VersionMigrator};
pub use recovery::{PartialRecoveryEngine, RecoveredField, RecoveryAction, RecoveryReport};
pub use schema::{DocumentSchema, FieldRules, SectionValidator, ValidationError};
pub use validator::{SchemaValidator, Validation};
