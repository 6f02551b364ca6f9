//! Error types for relation resolution and mutation.
//!
//! Three layers, innermost first:
//! - [`ValidationError`]: a record failed its entity's validations on save
//! - [`StoreError`]: anything the fetch/store collaborators report
//! - [`RelationError`]: what the resolver and mutation coordinator return
//!
//! `RelationError::AbortUnitOfWork` is the only variant meant to cross a save
//! boundary: the caller maps it to a rollback of its unit of work.

use crate::session::RecordId;
use may_postgres::Error as PostgresError;
use std::fmt;

/// A record failed validation while being saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Entity (table) of the invalid record
    pub entity: String,
    /// Human readable messages, one per failed rule
    pub messages: Vec<String>,
}

impl ValidationError {
    pub fn new(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            messages: vec![message.into()],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed for {}: {}", self.entity, self.messages.join(", "))
    }
}

impl std::error::Error for ValidationError {}

/// Error reported by a `Fetcher`, `StoreWriter` or `UnitOfWork`
#[derive(Debug)]
pub enum StoreError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// The record failed validation on save
    Validation(ValidationError),
    /// Other store errors
    Other(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            StoreError::QueryError(s) => write!(f, "Query error: {s}"),
            StoreError::ParseError(s) => write!(f, "Parse error: {s}"),
            StoreError::Validation(e) => write!(f, "{e}"),
            StoreError::Other(s) => write!(f, "Store error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::PostgresError(e) => Some(e),
            StoreError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        StoreError::PostgresError(err)
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Validation(err)
    }
}

/// Error returned by relation resolution and mutation
#[derive(Debug)]
pub enum RelationError {
    /// Invalid relation definition; only raised while building or registering
    Configuration(String),
    /// A to-one relation matched more than one candidate for an owner
    MultipleResults {
        relation: String,
        owner: RecordId,
        count: usize,
    },
    /// A record failed validation during `persist`
    Validation(ValidationError),
    /// A dependent save failed; the enclosing unit of work must roll back
    AbortUnitOfWork {
        relation: String,
        source: Box<RelationError>,
    },
    /// Fetch/store failure, passed through unchanged
    Store(StoreError),
    /// The record id is not (or no longer) part of the session
    RecordNotFound(RecordId),
    /// No relation with this name is registered for the entity
    UnknownRelation { entity: String, name: String },
    /// A record of the wrong entity was assigned to a relation
    TypeMismatch {
        relation: String,
        expected: String,
        found: String,
    },
    /// Some of the requested ids do not exist in the store
    MissingRecords { entity: String, ids: Vec<String> },
}

impl RelationError {
    /// Wrap `self` as the cause of an aborted unit of work
    pub fn abort(relation: &str, source: RelationError) -> Self {
        match source {
            // already an abort signal: keep the innermost relation name
            abort @ RelationError::AbortUnitOfWork { .. } => abort,
            other => RelationError::AbortUnitOfWork {
                relation: relation.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Whether the caller must roll back its unit of work
    pub fn is_abort(&self) -> bool {
        matches!(self, RelationError::AbortUnitOfWork { .. })
    }
}

impl fmt::Display for RelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationError::Configuration(s) => write!(f, "Configuration error: {s}"),
            RelationError::MultipleResults {
                relation,
                owner,
                count,
            } => write!(
                f,
                "Relation {relation} expected at most one record for owner {owner}, found {count}"
            ),
            RelationError::Validation(e) => write!(f, "{e}"),
            RelationError::AbortUnitOfWork { relation, source } => {
                write!(f, "Unit of work aborted while saving {relation}: {source}")
            }
            RelationError::Store(e) => write!(f, "{e}"),
            RelationError::RecordNotFound(id) => write!(f, "Record {id} is not part of the session"),
            RelationError::UnknownRelation { entity, name } => {
                write!(f, "Unknown relation {name} on {entity}")
            }
            RelationError::TypeMismatch {
                relation,
                expected,
                found,
            } => write!(f, "Relation {relation} expected a {expected} record, got {found}"),
            RelationError::MissingRecords { entity, ids } => {
                write!(f, "Couldn't find all {entity} with ids ({})", ids.join(", "))
            }
        }
    }
}

impl std::error::Error for RelationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelationError::Validation(e) => Some(e),
            RelationError::AbortUnitOfWork { source, .. } => Some(source.as_ref()),
            RelationError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for RelationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => RelationError::Validation(e),
            other => RelationError::Store(other),
        }
    }
}

impl From<ValidationError> for RelationError {
    fn from(err: ValidationError) -> Self {
        RelationError::Validation(err)
    }
}
