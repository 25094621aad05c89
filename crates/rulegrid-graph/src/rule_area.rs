use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use rulegrid_core::{
    ActionKind, Authorizer, Axis, CellAddress, CellId, CellValue, ConstraintType,
    ExpansionSubmitter, GroupContext, InterfaceId, JobId, JobStatusSource, LayerGroupSetId,
    Netclass, NetclassId, PersistenceStore, RelationBrandId, Result, RuleGridConfig,
    RuleGridError, Scope,
};
use rulegrid_queue::{Clock, ExpansionJob, JobSlot, JobState, PollOutcome};

use crate::defaults::DefaultConstraintSet;
use crate::expansion::{ExpansionReport, ExpansionRoute, GroupExpansionEngine};
use crate::linkage::LinkageGraph;
use crate::matrix::RelationMatrixStore;

/// A mutation of one rule area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MatrixCommand {
    AddInterface {
        name: String,
        channel_range: String,
    },
    AddNetclasses {
        netclasses: Vec<Netclass>,
    },
    AddChannelledNetclasses {
        interface_id: InterfaceId,
        base_names: Vec<String>,
    },
    RenameNetclass {
        id: NetclassId,
        name: String,
    },
    RemoveNetclass {
        id: NetclassId,
    },
    AddRelationBrand {
        name: String,
        layer_group_set_id: Option<LayerGroupSetId>,
    },
    RenameRelationBrand {
        id: RelationBrandId,
        name: String,
    },
    RemoveRelationBrand {
        id: RelationBrandId,
    },
    ToggleVisibility {
        id: NetclassId,
        axis: Axis,
        visible: bool,
    },
    SyncAxes {
        source: Axis,
    },
    ClearAxis {
        axis: Axis,
    },
    Commit,
    Rollback,
    /// Writes the cell and, if it is linked, its whole group.
    SetCell {
        address: CellAddress,
        value: CellValue,
    },
    ClearCells {
        constraint_type: ConstraintType,
        rows: Option<Vec<NetclassId>>,
    },
    Link {
        cells: Vec<CellId>,
        constraint_type: ConstraintType,
    },
    Unlink {
        cell: CellId,
    },
    Propagate {
        cell: CellId,
        value: CellValue,
    },
    Expand {
        contexts: Vec<GroupContext>,
    },
}

impl MatrixCommand {
    pub fn action_kind(&self) -> ActionKind {
        match self {
            MatrixCommand::AddInterface { .. }
            | MatrixCommand::AddNetclasses { .. }
            | MatrixCommand::AddChannelledNetclasses { .. }
            | MatrixCommand::RenameNetclass { .. }
            | MatrixCommand::RemoveNetclass { .. } => ActionKind::EditNetclasses,
            MatrixCommand::ToggleVisibility { .. }
            | MatrixCommand::SyncAxes { .. }
            | MatrixCommand::ClearAxis { .. }
            | MatrixCommand::Commit
            | MatrixCommand::Rollback => ActionKind::EditVisibility,
            MatrixCommand::AddRelationBrand { .. }
            | MatrixCommand::RenameRelationBrand { .. }
            | MatrixCommand::RemoveRelationBrand { .. }
            | MatrixCommand::SetCell { .. }
            | MatrixCommand::ClearCells { .. }
            | MatrixCommand::Propagate { .. } => ActionKind::EditRules,
            MatrixCommand::Link { .. } | MatrixCommand::Unlink { .. } => ActionKind::EditLinkage,
            MatrixCommand::Expand { .. } => ActionKind::RunExpansion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CommandOutcome {
    Applied,
    /// Ids of created interfaces, netclasses or brands
    Created(Vec<Uuid>),
    Committed(usize),
    CellsWritten(Vec<CellId>),
    Cleared(usize),
    Linked(BTreeSet<CellId>),
    Expanded(ExpansionReport),
    Submitted(JobId),
}

/// Everything one rule area owns: matrix, linkage, defaults and its job slot.
pub struct RuleArea {
    scope: Scope,
    store: RelationMatrixStore,
    linkage: LinkageGraph,
    engine: GroupExpansionEngine,
    physical_defaults: DefaultConstraintSet,
    clearance_defaults: DefaultConstraintSet,
    jobs: JobSlot,
    /// Set by any edit since the last load or save
    unsaved: bool,
}

impl RuleArea {
    pub fn new(scope: Scope, config: &RuleGridConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RelationMatrixStore::from_config(config),
            linkage: LinkageGraph::new(),
            engine: GroupExpansionEngine::new(config.expansion.clone()),
            physical_defaults: DefaultConstraintSet::new(ConstraintType::Physical),
            clearance_defaults: DefaultConstraintSet::new(ConstraintType::Clearance),
            jobs: JobSlot::new(scope.clone(), clock, config.jobs.poll_interval()),
            unsaved: false,
            scope,
        }
    }

    pub async fn load(
        scope: Scope,
        config: &RuleGridConfig,
        clock: Arc<dyn Clock>,
        persistence: &dyn PersistenceStore,
    ) -> Result<Self> {
        let mut area = Self::new(scope, config, clock);
        area.reload(persistence).await?;
        Ok(area)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn store(&self) -> &RelationMatrixStore {
        &self.store
    }

    pub fn linkage(&self) -> &LinkageGraph {
        &self.linkage
    }

    pub fn jobs(&self) -> &JobSlot {
        &self.jobs
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    pub fn defaults(&self, constraint_type: ConstraintType) -> &DefaultConstraintSet {
        match constraint_type {
            ConstraintType::Physical => &self.physical_defaults,
            ConstraintType::Clearance => &self.clearance_defaults,
        }
    }

    pub fn defaults_mut(&mut self, constraint_type: ConstraintType) -> &mut DefaultConstraintSet {
        match constraint_type {
            ConstraintType::Physical => &mut self.physical_defaults,
            ConstraintType::Clearance => &mut self.clearance_defaults,
        }
    }

    /// The cell value at `address`, falling back to the default for `key`.
    pub fn effective_value(&self, address: &CellAddress, key: &str) -> Option<CellValue> {
        self.store
            .get_cell(address)
            .map(|c| c.value.clone())
            .or_else(|| self.defaults(address.constraint_type).resolve(key).cloned())
    }

    /// Replace the in-memory matrix with the persisted one.
    pub async fn reload(&mut self, persistence: &dyn PersistenceStore) -> Result<()> {
        if self.store.has_pending_edits() {
            warn!("Reloading {} discards staged visibility edits", self.scope);
        }
        let interfaces = persistence.load_interfaces(&self.scope).await?;
        let netclasses = persistence.load_netclasses(&self.scope).await?;
        let brands = persistence.load_relation_brands(&self.scope).await?;
        let cells = persistence.load_cells(&self.scope).await?;

        self.store.load_records(interfaces, netclasses, brands, cells);
        self.linkage.prune_dangling(&self.store);
        self.unsaved = false;
        Ok(())
    }

    /// Persist the committed matrix and adopt the canonical records returned.
    ///
    /// Refused while a remote job may still write the same scope.
    pub async fn save(&mut self, persistence: &dyn PersistenceStore) -> Result<()> {
        self.jobs.ensure_idle()?;
        if self.store.has_pending_edits() {
            warn!("Saving {} without its uncommitted visibility edits", self.scope);
        }
        let netclasses = persistence
            .save_netclasses(&self.scope, self.store.netclass_records())
            .await?;
        let brands = persistence
            .save_relation_brands(&self.scope, self.store.relation_brand_records())
            .await?;
        let cells = persistence
            .save_cells(&self.scope, self.store.cell_records())
            .await?;
        info!(
            "Saved {}: {} netclasses, {} relation brands, {} cells",
            self.scope,
            netclasses.len(),
            brands.len(),
            cells.len()
        );
        self.store.adopt_records(netclasses, brands, cells);
        self.linkage.prune_dangling(&self.store);
        self.unsaved = false;
        Ok(())
    }

    /// Check `user` may perform `command`, then run it.
    pub async fn execute_authorized(
        &mut self,
        authorizer: &dyn Authorizer,
        user: &str,
        command: MatrixCommand,
        submitter: &dyn ExpansionSubmitter,
    ) -> Result<CommandOutcome> {
        let action = command.action_kind();
        if !authorizer
            .is_allowed(user, &self.scope.project_id, action)
            .await
        {
            warn!("User '{}' may not {} in {}", user, action, self.scope);
            return Err(RuleGridError::PermissionDenied {
                user: user.to_string(),
                action: action.to_string(),
            });
        }
        self.execute(command, submitter).await
    }

    pub async fn execute(
        &mut self,
        command: MatrixCommand,
        submitter: &dyn ExpansionSubmitter,
    ) -> Result<CommandOutcome> {
        let store = &mut self.store;
        let linkage = &mut self.linkage;
        let outcome = match command {
            MatrixCommand::AddInterface {
                name,
                channel_range,
            } => CommandOutcome::Created(vec![store.add_interface(&name, &channel_range)?]),
            MatrixCommand::AddNetclasses { netclasses } => {
                CommandOutcome::Created(store.add_netclasses(netclasses)?)
            }
            MatrixCommand::AddChannelledNetclasses {
                interface_id,
                base_names,
            } => CommandOutcome::Created(
                store.add_channelled_netclasses(interface_id, &base_names)?,
            ),
            MatrixCommand::RenameNetclass { id, name } => {
                store.rename_netclass(id, &name)?;
                CommandOutcome::Applied
            }
            MatrixCommand::RemoveNetclass { id } => {
                store.remove_netclass(id, linkage)?;
                CommandOutcome::Applied
            }
            MatrixCommand::AddRelationBrand {
                name,
                layer_group_set_id,
            } => CommandOutcome::Created(vec![store.add_relation_brand(&name, layer_group_set_id)?]),
            MatrixCommand::RenameRelationBrand { id, name } => {
                store.rename_relation_brand(id, &name)?;
                CommandOutcome::Applied
            }
            MatrixCommand::RemoveRelationBrand { id } => {
                store.remove_relation_brand(id, linkage)?;
                CommandOutcome::Applied
            }
            MatrixCommand::ToggleVisibility { id, axis, visible } => {
                store.toggle_visibility(id, axis, visible)?;
                CommandOutcome::Applied
            }
            MatrixCommand::SyncAxes { source } => {
                store.sync_axes(source);
                CommandOutcome::Applied
            }
            MatrixCommand::ClearAxis { axis } => {
                store.clear_axis(axis);
                CommandOutcome::Applied
            }
            MatrixCommand::Commit => CommandOutcome::Committed(store.commit()?),
            MatrixCommand::Rollback => {
                store.rollback();
                CommandOutcome::Applied
            }
            MatrixCommand::SetCell { address, value } => {
                let written = match store.get_cell(&address).map(|c| c.id) {
                    Some(id) => linkage.propagate(id, value, store)?,
                    None => vec![store.set_cell(address, value)?],
                };
                CommandOutcome::CellsWritten(written)
            }
            MatrixCommand::ClearCells {
                constraint_type,
                rows,
            } => CommandOutcome::Cleared(store.clear_cells(
                constraint_type,
                rows.as_deref(),
                linkage,
            )),
            MatrixCommand::Link {
                cells,
                constraint_type,
            } => CommandOutcome::Linked(linkage.link(&cells, constraint_type, &*store)?),
            MatrixCommand::Unlink { cell } => {
                linkage.unlink(cell);
                CommandOutcome::Applied
            }
            MatrixCommand::Propagate { cell, value } => {
                CommandOutcome::CellsWritten(linkage.propagate(cell, value, store)?)
            }
            MatrixCommand::Expand { contexts } => return self.expand(&contexts, submitter).await,
        };
        self.unsaved = true;
        Ok(outcome)
    }

    async fn expand(
        &mut self,
        contexts: &[GroupContext],
        submitter: &dyn ExpansionSubmitter,
    ) -> Result<CommandOutcome> {
        self.jobs.ensure_idle()?;
        let plan = self.engine.expand(&self.store, &self.linkage, contexts)?;

        match self.engine.route(&plan) {
            ExpansionRoute::Local => {
                let report = self.engine.apply(&plan, &mut self.store, &mut self.linkage)?;
                if report.changed > 0 {
                    self.unsaved = true;
                }
                Ok(CommandOutcome::Expanded(report))
            }
            ExpansionRoute::Remote => {
                // Completion reloads from persistence, which would drop local edits.
                if self.unsaved {
                    warn!(
                        "Refusing remote expansion for {} with unsaved changes",
                        self.scope
                    );
                    return Err(RuleGridError::UnsavedChanges(self.scope.clone()));
                }
                let job_id = submitter
                    .submit(&self.scope, &plan.writes, &plan.prune)
                    .await?;
                self.jobs.begin(job_id)?;
                info!(
                    "Submitted expansion of {} pairs for {} as job {}",
                    plan.pair_count, self.scope, job_id
                );
                Ok(CommandOutcome::Submitted(job_id))
            }
        }
    }

    /// Expand the group contexts stored for this rule area.
    pub async fn expand_saved_contexts(
        &mut self,
        persistence: &dyn PersistenceStore,
        submitter: &dyn ExpansionSubmitter,
    ) -> Result<CommandOutcome> {
        let contexts = persistence.load_group_contexts(&self.scope).await?;
        info!("Expanding {} saved contexts for {}", contexts.len(), self.scope);
        self.expand(&contexts, submitter).await
    }

    pub async fn poll_remote_job(&mut self, source: &dyn JobStatusSource) -> Option<JobState> {
        self.jobs.poll_once(source).await
    }

    pub async fn drive_remote_job(&mut self, source: &dyn JobStatusSource) -> Option<PollOutcome> {
        self.jobs.drive(source).await
    }

    /// Deliver a finished remote job.
    ///
    /// Remote expansion is only submitted from a saved matrix, so the reload
    /// lands on the same cells a local run would.
    ///
    /// `Done` reloads the matrix from persistence before the job is released;
    /// `Error` releases the job and surfaces its message as `RemoteFailure`.
    /// Returns `None` while nothing has finished.
    pub async fn finish_remote_job(
        &mut self,
        persistence: &dyn PersistenceStore,
    ) -> Result<Option<ExpansionJob>> {
        let state = match self.jobs.current() {
            Some(job) if job.state.is_terminal() => job.state.clone(),
            _ => return Ok(None),
        };
        if state == JobState::Done {
            self.reload(persistence).await?;
        }

        let Some(job) = self.jobs.take_outcome() else {
            return Ok(None);
        };
        match job.state {
            JobState::Error { message } => Err(RuleGridError::RemoteFailure {
                job_id: job.id,
                message,
            }),
            _ => Ok(Some(job)),
        }
    }

    /// Give up on an outstanding remote job so a new expansion may be submitted.
    pub fn abandon_remote_job(&mut self) -> Option<ExpansionJob> {
        self.jobs.abandon()
    }
}
