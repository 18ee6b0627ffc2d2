use crate::context::Interrupted;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Failure of a single repository write or read.
///
/// Every variant names the entity kind ("service", "sku", ...) and the key of
/// the row involved so the failure can be traced back to catalog data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {key} violates a store constraint: {source}")]
    Constraint {
        entity: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to encode {entity} {key}: {source}")]
    Serialization {
        entity: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable while writing {entity} {key}: {source}")]
    Connectivity {
        entity: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store error on {entity} {key}: {source}")]
    Sqlite {
        entity: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("write of {entity} {key} interrupted: {source}")]
    Interrupted {
        entity: &'static str,
        key: String,
        #[source]
        source: Interrupted,
    },
}

impl StoreError {
    /// Classify a rusqlite error raised while handling `entity` `key`.
    pub fn from_sqlite(entity: &'static str, key: impl Into<String>, source: rusqlite::Error) -> Self {
        let key = key.into();
        match source.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Constraint { entity, key, source },
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt,
            ) => StoreError::Connectivity { entity, key, source },
            _ => StoreError::Sqlite { entity, key, source },
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::Constraint { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, StoreError::Interrupted { .. })
    }

    pub fn entity(&self) -> &'static str {
        match self {
            StoreError::Constraint { entity, .. }
            | StoreError::Serialization { entity, .. }
            | StoreError::Connectivity { entity, .. }
            | StoreError::Sqlite { entity, .. }
            | StoreError::Interrupted { entity, .. } => *entity,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            StoreError::Constraint { key, .. }
            | StoreError::Serialization { key, .. }
            | StoreError::Connectivity { key, .. }
            | StoreError::Sqlite { key, .. }
            | StoreError::Interrupted { key, .. } => key,
        }
    }
}
