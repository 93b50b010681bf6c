use chrono::NaiveDate;
use thiserror::Error;

use crate::reference::ConnectorError;

#[derive(Error, Debug)]
pub enum AppraisalError {
    // ── Validation (construction time) ────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ── Domain lookups ────────────────────────────────────────────
    #[error("No current punishment policy")]
    NoCurrentPolicy,

    #[error("No punishment policy effective on {date}")]
    NoPolicyForDate { date: NaiveDate },

    #[error("Condition modifier '{code}' not found")]
    ConditionModifierNotFound { code: String },

    #[error("No current condition modifier list")]
    NoCurrentConditionList,

    #[error("No condition modifier list updated on {date}")]
    NoConditionListForDate { date: NaiveDate },

    #[error("Requested date {requested} is after today ({today})")]
    FutureDate { requested: NaiveDate, today: NaiveDate },

    // ── Data corruption ───────────────────────────────────────────
    #[error("Found {count} current condition modifier lists, expected exactly one")]
    MultipleCurrentConditionLists { count: usize },

    #[error("Corrupt stored record: {0}")]
    CorruptRecord(String),

    // ── Collaborators ─────────────────────────────────────────────
    #[error("Reference service failure: {0}")]
    ReferenceService(#[source] ConnectorError),

    #[error("Parameter service unavailable: {0}")]
    ParameterServiceUnavailable(String),

    #[error("Parameter {scope}/{key} not found (filters: '{filters}')")]
    ParameterNotFound {
        scope:   String,
        key:     String,
        filters: String,
    },

    // ── Infrastructure ────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConnectorError> for AppraisalError {
    fn from(e: ConnectorError) -> Self {
        AppraisalError::ReferenceService(e)
    }
}

impl AppraisalError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppraisalError::InvalidArgument(msg.into())
    }
}

pub type AppraisalResult<T> = Result<T, AppraisalError>;
