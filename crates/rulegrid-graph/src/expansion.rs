//! Group-to-group (G2G) expansion into class-to-class (C2C) cell writes.
//!
//! Planning is pure: contexts are resolved against the store and the linkage
//! graph into one write per cell, ordered by address. The same plan is either
//! applied locally or handed to the remote expansion service, so both routes
//! converge on the same cells.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rulegrid_core::{
    CellAddress, CellId, CellValue, CellWrite, ColumnId, ExpansionConfig, GroupContext,
    RelationBrandId, Result, RuleGridError,
};

use crate::linkage::LinkageGraph;
use crate::matrix::RelationMatrixStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionRoute {
    Local,
    Remote,
}

/// Fully resolved outcome of a set of group contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionPlan {
    /// One write per cell, in address order
    pub writes: Vec<CellWrite>,
    /// Relation brands no cell addresses once the writes land
    pub prune: Vec<RelationBrandId>,
    /// Raw (row, column) pairs produced by the contexts, mirrors included
    pub pair_count: usize,
    /// Writes that reach a cell only through its linkage group
    pub propagated: usize,
}

impl ExpansionPlan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.prune.is_empty()
    }

    fn changed_writes(&self, store: &RelationMatrixStore) -> usize {
        self.writes
            .iter()
            .filter(|w| store.get_cell(&w.address).map(|c| &c.value) != Some(&w.value))
            .count()
    }

    /// How many cells and brands applying this plan to `store` would actually change.
    pub fn changes(&self, store: &RelationMatrixStore) -> usize {
        self.changed_writes(store)
            + self
                .prune
                .iter()
                .filter(|id| store.relation_brand(**id).is_some())
                .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub written: usize,
    pub changed: usize,
    pub pruned: Vec<RelationBrandId>,
}

pub struct GroupExpansionEngine {
    config: ExpansionConfig,
}

impl GroupExpansionEngine {
    pub fn new(config: ExpansionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Resolve `contexts` against the current matrix.
    ///
    /// Later contexts win over earlier ones for the same cell. Every member of
    /// a linkage group receives the value of the latest context that writes
    /// any of its members, so linked cells stay equal.
    pub fn expand(
        &self,
        store: &RelationMatrixStore,
        linkage: &LinkageGraph,
        contexts: &[GroupContext],
    ) -> Result<ExpansionPlan> {
        let started = Instant::now();

        let mut direct: BTreeMap<CellAddress, (usize, CellValue)> = BTreeMap::new();
        let mut pair_count = 0usize;
        for (seq, context) in contexts.iter().enumerate() {
            if let Some(brand) = context.value.relation() {
                if store.relation_brand(brand).is_none() {
                    return Err(RuleGridError::RelationBrandNotFound(brand));
                }
            }
            let rows = store.resolve_group(&context.from)?;
            let columns = store.resolve_group(&context.to)?;

            for &row in &rows {
                for &column in &columns {
                    let address =
                        CellAddress::new(context.constraint_type, row, ColumnId::Netclass(column));
                    direct.insert(address, (seq, context.value.clone()));
                    pair_count += 1;

                    if self.config.mirror_pairs && row != column {
                        if let Some(mirror) = address.mirrored() {
                            direct.insert(mirror, (seq, context.value.clone()));
                            pair_count += 1;
                        }
                    }
                }
            }
            debug!(
                "Context {} covers {} x {} netclasses",
                seq,
                rows.len(),
                columns.len()
            );
        }

        // A linkage group takes the value of the latest context touching any member.
        let mut groups: BTreeMap<CellId, (usize, CellValue, BTreeSet<CellId>)> = BTreeMap::new();
        for (address, (seq, value)) in &direct {
            let Some(cell) = store.get_cell(address) else {
                continue;
            };
            let members = linkage.group_of_type(cell.id, address.constraint_type);
            let Some(&key) = members.iter().next() else {
                continue;
            };
            match groups.get_mut(&key) {
                Some(entry) if entry.0 >= *seq => {}
                Some(entry) => {
                    entry.0 = *seq;
                    entry.1 = value.clone();
                }
                None => {
                    groups.insert(key, (*seq, value.clone(), members));
                }
            }
        }

        let mut propagated = 0usize;
        for (seq, value, members) in groups.into_values() {
            for member in members {
                let Some(member_cell) = store.cell_by_id(member) else {
                    continue;
                };
                if !direct.contains_key(&member_cell.address) {
                    propagated += 1;
                }
                direct.insert(member_cell.address, (seq, value.clone()));
            }
        }

        let resolved: BTreeMap<CellAddress, CellValue> = direct
            .into_iter()
            .map(|(address, (_, value))| (address, value))
            .collect();

        let prune = Self::unaddressed_brands(store, &resolved);
        let writes: Vec<CellWrite> = resolved
            .into_iter()
            .map(|(address, value)| CellWrite::new(address, value))
            .collect();

        debug!(
            "Planned {} writes ({} through linkage), {} brands to prune in {:?}",
            writes.len(),
            propagated,
            prune.len(),
            started.elapsed()
        );
        Ok(ExpansionPlan {
            writes,
            prune,
            pair_count,
            propagated,
        })
    }

    /// Brands that no cell would address once `resolved` is written.
    fn unaddressed_brands(
        store: &RelationMatrixStore,
        resolved: &BTreeMap<CellAddress, CellValue>,
    ) -> Vec<RelationBrandId> {
        let mut addressed: HashSet<RelationBrandId> = HashSet::new();
        for cell in store.cells() {
            if let ColumnId::Relation(id) = cell.address.column {
                addressed.insert(id);
            }
            let value = resolved.get(&cell.address).unwrap_or(&cell.value);
            if let Some(id) = value.relation() {
                addressed.insert(id);
            }
        }
        addressed.extend(resolved.values().filter_map(CellValue::relation));

        store
            .relation_brands()
            .into_iter()
            .map(|b| b.id)
            .filter(|id| !addressed.contains(id))
            .collect()
    }

    pub fn route(&self, plan: &ExpansionPlan) -> ExpansionRoute {
        if plan.pair_count > self.config.remote_threshold_pairs {
            ExpansionRoute::Remote
        } else {
            ExpansionRoute::Local
        }
    }

    /// Apply a plan in-process. Writes are all-or-nothing; pruning follows.
    pub fn apply(
        &self,
        plan: &ExpansionPlan,
        store: &mut RelationMatrixStore,
        linkage: &mut LinkageGraph,
    ) -> Result<ExpansionReport> {
        let changed_writes = plan.changed_writes(store);
        store.apply_writes(&plan.writes)?;

        let mut pruned = Vec::new();
        for &id in &plan.prune {
            // Kept if something addresses it again.
            if store
                .cells()
                .any(|c| RelationMatrixStore::addresses_brand(c, id))
            {
                continue;
            }
            match store.remove_relation_brand(id, linkage) {
                Ok(_) => pruned.push(id),
                Err(RuleGridError::RelationBrandNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!(
            "Expansion applied locally: {} writes, {} changed, {} brands pruned",
            plan.writes.len(),
            changed_writes,
            pruned.len()
        );
        Ok(ExpansionReport {
            written: plan.writes.len(),
            changed: changed_writes + pruned.len(),
            pruned,
        })
    }

    /// Plan and apply in one step, regardless of route.
    pub fn run(
        &self,
        store: &mut RelationMatrixStore,
        linkage: &mut LinkageGraph,
        contexts: &[GroupContext],
    ) -> Result<ExpansionReport> {
        let plan = self.expand(store, linkage, contexts)?;
        self.apply(&plan, store, linkage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulegrid_core::{ConstraintType, GroupSelector, InterfaceId, Netclass, NetclassId};

    struct Board {
        store: RelationMatrixStore,
        linkage: LinkageGraph,
        ddr: InterfaceId,
        ids: Vec<NetclassId>,
    }

    fn board() -> Board {
        let mut store = RelationMatrixStore::default();
        let ddr = store.add_interface("DDR", "").unwrap();
        let ids = store
            .add_netclasses(vec![
                Netclass::new("CLK", ddr).with_segment("clock"),
                Netclass::new("DQ0", ddr).with_segment("data"),
                Netclass::new("DQ1", ddr).with_segment("data"),
            ])
            .unwrap();
        Board {
            store,
            linkage: LinkageGraph::new(),
            ddr,
            ids,
        }
    }

    fn engine() -> GroupExpansionEngine {
        GroupExpansionEngine::new(ExpansionConfig::default())
    }

    fn segment(ddr: InterfaceId, name: &str) -> GroupSelector {
        GroupSelector::Segment {
            interface_id: ddr,
            segment: name.into(),
        }
    }

    #[test]
    fn expands_full_cross_product_with_mirrors() {
        let b = board();
        let plan = engine()
            .expand(
                &b.store,
                &b.linkage,
                &[GroupContext::clearance(
                    segment(b.ddr, "clock"),
                    segment(b.ddr, "data"),
                    CellValue::Number(5.0),
                )],
            )
            .unwrap();
        assert_eq!(plan.pair_count, 4);
        assert_eq!(plan.writes.len(), 4);
        assert!(plan
            .writes
            .windows(2)
            .all(|w| w[0].address < w[1].address));
    }

    #[test]
    fn later_context_wins_on_overlap() {
        let mut b = board();
        let contexts = [
            GroupContext::clearance(
                GroupSelector::Interface { interface_id: b.ddr },
                GroupSelector::Interface { interface_id: b.ddr },
                CellValue::Number(4.0),
            ),
            GroupContext::clearance(
                segment(b.ddr, "data"),
                segment(b.ddr, "data"),
                CellValue::Number(8.0),
            ),
        ];
        engine().run(&mut b.store, &mut b.linkage, &contexts).unwrap();

        let value = |row, col| {
            b.store
                .get_cell(&CellAddress::clearance(row, ColumnId::Netclass(col)))
                .map(|c| c.value.clone())
        };
        assert_eq!(value(b.ids[1], b.ids[2]), Some(CellValue::Number(8.0)));
        assert_eq!(value(b.ids[0], b.ids[1]), Some(CellValue::Number(4.0)));
        assert_eq!(value(b.ids[1], b.ids[0]), Some(CellValue::Number(4.0)));
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut b = board();
        b.store.add_relation_brand("Unused", None).unwrap();
        let contexts = [GroupContext::clearance(
            GroupSelector::All,
            GroupSelector::All,
            CellValue::Number(3.0),
        )];
        let e = engine();
        let first = e.run(&mut b.store, &mut b.linkage, &contexts).unwrap();
        assert_eq!(first.pruned.len(), 1);
        let snapshot = b.store.snapshot();

        let plan = e.expand(&b.store, &b.linkage, &contexts).unwrap();
        assert_eq!(plan.changes(&b.store), 0);
        let second = e.apply(&plan, &mut b.store, &mut b.linkage).unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(b.store.snapshot(), snapshot);
    }

    #[test]
    fn referenced_brands_survive_pruning() {
        let mut b = board();
        let keep = b.store.add_relation_brand("Keep", None).unwrap();
        let drop = b.store.add_relation_brand("Drop", None).unwrap();
        b.store
            .set_cell(
                CellAddress::clearance(b.ids[0], ColumnId::Netclass(b.ids[1])),
                CellValue::Relation(drop),
            )
            .unwrap();

        // Overwrites the only cell that referenced `drop`.
        let plan = engine()
            .expand(
                &b.store,
                &b.linkage,
                &[GroupContext::clearance(
                    GroupSelector::Netclasses { ids: vec![b.ids[0]] },
                    GroupSelector::Netclasses { ids: vec![b.ids[1]] },
                    CellValue::Relation(keep),
                )],
            )
            .unwrap();
        assert_eq!(plan.prune, vec![drop]);
    }

    #[test]
    fn linked_members_follow_direct_writes() {
        let mut b = board();
        let target = CellAddress::clearance(b.ids[0], ColumnId::Netclass(b.ids[1]));
        let outside = CellAddress::physical(b.ids[2], ColumnId::Netclass(b.ids[2]));
        let outside_clearance = CellAddress::clearance(b.ids[2], ColumnId::Netclass(b.ids[2]));
        let t = b.store.set_cell(target, CellValue::Number(1.0)).unwrap();
        b.store.set_cell(outside, CellValue::Number(1.0)).unwrap();
        let o = b
            .store
            .set_cell(outside_clearance, CellValue::Number(1.0))
            .unwrap();
        b.linkage
            .link(&[t, o], ConstraintType::Clearance, &b.store)
            .unwrap();

        let mut config = ExpansionConfig::default();
        config.mirror_pairs = false;
        let plan = GroupExpansionEngine::new(config)
            .expand(
                &b.store,
                &b.linkage,
                &[GroupContext::clearance(
                    GroupSelector::Netclasses { ids: vec![b.ids[0]] },
                    GroupSelector::Netclasses { ids: vec![b.ids[1]] },
                    CellValue::Number(6.0),
                )],
            )
            .unwrap();
        assert_eq!(plan.propagated, 1);
        assert!(plan
            .writes
            .contains(&CellWrite::new(outside_clearance, CellValue::Number(6.0))));
        assert!(!plan.writes.iter().any(|w| w.address == outside));
    }

    #[test]
    fn linked_cells_written_by_different_contexts_stay_equal() {
        let mut b = board();
        let first = CellAddress::clearance(b.ids[0], ColumnId::Netclass(b.ids[1]));
        let second = CellAddress::clearance(b.ids[2], ColumnId::Netclass(b.ids[2]));
        let t = b.store.set_cell(first, CellValue::Number(1.0)).unwrap();
        let o = b.store.set_cell(second, CellValue::Number(1.0)).unwrap();
        b.linkage
            .link(&[t, o], ConstraintType::Clearance, &b.store)
            .unwrap();

        let mut config = ExpansionConfig::default();
        config.mirror_pairs = false;
        let contexts = [
            GroupContext::clearance(
                GroupSelector::Netclasses { ids: vec![b.ids[0]] },
                GroupSelector::Netclasses { ids: vec![b.ids[1]] },
                CellValue::Number(4.0),
            ),
            GroupContext::clearance(
                GroupSelector::Netclasses { ids: vec![b.ids[2]] },
                GroupSelector::Netclasses { ids: vec![b.ids[2]] },
                CellValue::Number(8.0),
            ),
        ];
        GroupExpansionEngine::new(config)
            .run(&mut b.store, &mut b.linkage, &contexts)
            .unwrap();

        assert!(b.linkage.is_linked(t));
        assert_eq!(
            b.store.get_cell(&first).map(|c| c.value.clone()),
            Some(CellValue::Number(8.0))
        );
        assert_eq!(
            b.store.get_cell(&second).map(|c| c.value.clone()),
            Some(CellValue::Number(8.0))
        );
    }

    #[test]
    fn large_plans_route_remote() {
        let b = board();
        let mut config = ExpansionConfig::default();
        config.remote_threshold_pairs = 3;
        let e = GroupExpansionEngine::new(config);
        let plan = e
            .expand(
                &b.store,
                &b.linkage,
                &[GroupContext::clearance(
                    GroupSelector::All,
                    GroupSelector::All,
                    CellValue::Number(1.0),
                )],
            )
            .unwrap();
        assert_eq!(e.route(&plan), ExpansionRoute::Remote);
    }

    #[test]
    fn unknown_brand_value_is_rejected() {
        let b = board();
        let ghost = uuid::Uuid::new_v4();
        let err = engine()
            .expand(
                &b.store,
                &b.linkage,
                &[GroupContext::clearance(
                    GroupSelector::All,
                    GroupSelector::All,
                    CellValue::Relation(ghost),
                )],
            )
            .unwrap_err();
        assert!(matches!(err, RuleGridError::RelationBrandNotFound(id) if id == ghost));
    }
}
