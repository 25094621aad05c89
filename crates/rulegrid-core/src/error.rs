use thiserror::Error;

use crate::{Axis, CellId, ConstraintType, InterfaceId, JobId, NetclassId, RelationBrandId, Scope};

/// Broad classification used by callers to surface a structured reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    JobInProgress,
    Remote,
    Collaborator,
    Permission,
    Config,
}

#[derive(Error, Debug)]
pub enum RuleGridError {
    #[error("Malformed channel range token: '{token}'")]
    MalformedRange { token: String },

    #[error("Inverted channel range: {start}-{end}")]
    InvertedRange { start: u32, end: u32 },

    #[error("Channel {value} is outside the allowed range 1..={max}")]
    OutOfBounds { value: u64, max: u32 },

    #[error("Netclass name '{name}' collides with reserved channel prefix '{prefix}'")]
    NameCollision { name: String, prefix: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Every {0} would be hidden; at least one must remain visible")]
    EmptyAxis(Axis),

    #[error("Relation brand name already exists: {0}")]
    DuplicateRelationBrand(String),

    #[error("Netclass name already exists in interface: {0}")]
    DuplicateNetclassName(String),

    #[error("Interface name already exists: {0}")]
    DuplicateInterfaceName(String),

    #[error("Cell {cell} is {actual:?} but the link requested {requested:?}")]
    CrossTypeLink {
        cell: CellId,
        requested: ConstraintType,
        actual: ConstraintType,
    },

    #[error("Expansion job {job_id} is still outstanding for scope {scope}")]
    JobInProgress { scope: Scope, job_id: JobId },

    #[error("Scope {0} has unsaved changes; save before submitting a remote expansion")]
    UnsavedChanges(Scope),

    #[error("Expansion job {job_id} failed: {message}")]
    RemoteFailure { job_id: JobId, message: String },

    #[error("Netclass not found: {0}")]
    NetclassNotFound(NetclassId),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(InterfaceId),

    #[error("Relation brand not found: {0}")]
    RelationBrandNotFound(RelationBrandId),

    #[error("Cell not found: {0}")]
    CellNotFound(CellId),

    #[error("Value rejected by rule '{rule}': {reason}")]
    PolicyViolation { rule: String, reason: String },

    #[error("Action {action} is not permitted for user '{user}'")]
    PermissionDenied { user: String, action: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl RuleGridError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuleGridError::MalformedRange { .. }
            | RuleGridError::InvertedRange { .. }
            | RuleGridError::OutOfBounds { .. }
            | RuleGridError::NameCollision { .. }
            | RuleGridError::InvalidName { .. }
            | RuleGridError::EmptyAxis(_)
            | RuleGridError::UnsavedChanges(_)
            | RuleGridError::PolicyViolation { .. } => ErrorKind::Validation,
            RuleGridError::DuplicateRelationBrand(_)
            | RuleGridError::DuplicateNetclassName(_)
            | RuleGridError::DuplicateInterfaceName(_)
            | RuleGridError::CrossTypeLink { .. } => ErrorKind::Conflict,
            RuleGridError::NetclassNotFound(_)
            | RuleGridError::InterfaceNotFound(_)
            | RuleGridError::RelationBrandNotFound(_)
            | RuleGridError::CellNotFound(_) => ErrorKind::NotFound,
            RuleGridError::JobInProgress { .. } => ErrorKind::JobInProgress,
            RuleGridError::RemoteFailure { .. } => ErrorKind::Remote,
            RuleGridError::PermissionDenied { .. } => ErrorKind::Permission,
            RuleGridError::Config(_) => ErrorKind::Config,
            RuleGridError::Collaborator(_) => ErrorKind::Collaborator,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleGridError>;
