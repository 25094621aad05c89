use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    ActionKind, CellRecord, CellWrite, GroupContext, Interface, JobId, Netclass, RelationBrand,
    RelationBrandId, Scope,
};

/// Opaque persistence transport. Every call is atomic and returns the canonical
/// post-write record set.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn load_interfaces(&self, scope: &Scope) -> anyhow::Result<Vec<Interface>>;
    async fn load_netclasses(&self, scope: &Scope) -> anyhow::Result<Vec<Netclass>>;
    async fn load_relation_brands(&self, scope: &Scope) -> anyhow::Result<Vec<RelationBrand>>;
    async fn load_cells(&self, scope: &Scope) -> anyhow::Result<Vec<CellRecord>>;
    async fn load_group_contexts(&self, scope: &Scope) -> anyhow::Result<Vec<GroupContext>>;

    async fn save_netclasses(
        &self,
        scope: &Scope,
        records: Vec<Netclass>,
    ) -> anyhow::Result<Vec<Netclass>>;
    async fn save_relation_brands(
        &self,
        scope: &Scope,
        records: Vec<RelationBrand>,
    ) -> anyhow::Result<Vec<RelationBrand>>;
    async fn save_cells(
        &self,
        scope: &Scope,
        records: Vec<CellRecord>,
    ) -> anyhow::Result<Vec<CellRecord>>;
}

/// Permission oracle consulted by callers before mutating operations.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_allowed(&self, user: &str, project_id: &str, action: ActionKind) -> bool;
}

/// Payload returned by the remote job-status resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub is_processing: bool,
    pub is_ok: bool,
    #[serde(default)]
    pub message: String,
}

impl JobStatusReport {
    pub fn processing() -> Self {
        Self {
            is_processing: true,
            is_ok: true,
            message: String::new(),
        }
    }

    pub fn done() -> Self {
        Self {
            is_processing: false,
            is_ok: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_processing: false,
            is_ok: false,
            message: message.into(),
        }
    }
}

/// Remote job-status resource. `Ok(None)` means the resource had no status for the job.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn get_status(&self, job_id: JobId) -> anyhow::Result<Option<JobStatusReport>>;
}

/// Hands a resolved expansion plan to the remote expansion service.
#[async_trait]
pub trait ExpansionSubmitter: Send + Sync {
    async fn submit(
        &self,
        scope: &Scope,
        writes: &[CellWrite],
        prune: &[RelationBrandId],
    ) -> anyhow::Result<JobId>;
}
