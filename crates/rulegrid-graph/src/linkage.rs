//! Linkage groups: equivalence classes of rule cells that always hold the same value.
//!
//! Each constraint type has its own disjoint partition, kept as a union-find
//! arena (parent indices, union by rank, path compression on link). Removal
//! rebuilds only the affected class, using the member list kept per root.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use rulegrid_core::{CellId, CellValue, ConstraintType, Result, RuleGridError};

/// What linkage needs from the cell owner. Linkage never creates or deletes cells.
pub trait CellAccess {
    fn constraint_type_of(&self, id: CellId) -> Option<ConstraintType>;

    fn cell_value(&self, id: CellId) -> Option<&CellValue>;

    /// Write `value` to every id, or to none of them.
    fn write_cells(&mut self, ids: &[CellId], value: &CellValue) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Slot {
    cell: CellId,
    parent: usize,
    rank: u8,
}

#[derive(Debug, Clone, Default)]
struct Partition {
    index: HashMap<CellId, usize>,
    slots: Vec<Slot>,
    /// root slot -> every slot in its class
    members: HashMap<usize, Vec<usize>>,
    free: Vec<usize>,
}

impl Partition {
    fn alloc(&mut self, cell: CellId) -> usize {
        let slot = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Slot {
                    cell,
                    parent: i,
                    rank: 0,
                };
                i
            }
            None => {
                let i = self.slots.len();
                self.slots.push(Slot {
                    cell,
                    parent: i,
                    rank: 0,
                });
                i
            }
        };
        self.index.insert(cell, slot);
        self.members.insert(slot, vec![slot]);
        slot
    }

    fn release(&mut self, slot: usize) {
        let cell = self.slots[slot].cell;
        self.index.remove(&cell);
        self.slots[slot].parent = slot;
        self.slots[slot].rank = 0;
        self.free.push(slot);
    }

    fn root(&self, mut i: usize) -> usize {
        while self.slots[i].parent != i {
            i = self.slots[i].parent;
        }
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.slots[i].parent != i {
            let grandparent = self.slots[self.slots[i].parent].parent;
            self.slots[i].parent = grandparent;
            i = grandparent;
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        let (keep, absorb) = match self.slots[ra].rank.cmp(&self.slots[rb].rank) {
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Equal => {
                self.slots[ra].rank += 1;
                (ra, rb)
            }
        };
        self.slots[absorb].parent = keep;
        let moved = self.members.remove(&absorb).unwrap_or_default();
        self.members.entry(keep).or_default().extend(moved);
        keep
    }

    fn group_of(&self, cell: CellId) -> BTreeSet<CellId> {
        let Some(&slot) = self.index.get(&cell) else {
            return BTreeSet::new();
        };
        self.members
            .get(&self.root(slot))
            .map(|m| m.iter().map(|&i| self.slots[i].cell).collect())
            .unwrap_or_default()
    }

    fn link(&mut self, cells: &[CellId]) {
        let slots: Vec<usize> = cells
            .iter()
            .map(|c| match self.index.get(c) {
                Some(&i) => i,
                None => self.alloc(*c),
            })
            .collect();
        if let Some((&first, rest)) = slots.split_first() {
            for &s in rest {
                self.union(first, s);
            }
        }
    }

    /// Remove `cell` from its class; dissolves the class if one member would remain.
    fn remove(&mut self, cell: CellId) -> bool {
        let Some(&slot) = self.index.get(&cell) else {
            return false;
        };
        let root = self.root(slot);
        let remaining: Vec<usize> = self
            .members
            .remove(&root)
            .unwrap_or_default()
            .into_iter()
            .filter(|&i| i != slot)
            .collect();
        self.release(slot);

        if remaining.len() <= 1 {
            for i in remaining {
                self.release(i);
            }
            return true;
        }

        let new_root = remaining[0];
        for &i in &remaining {
            self.slots[i].parent = new_root;
            self.slots[i].rank = 0;
        }
        self.slots[new_root].rank = 1;
        self.members.insert(new_root, remaining);
        true
    }

    fn groups(&self) -> Vec<BTreeSet<CellId>> {
        let mut groups: Vec<BTreeSet<CellId>> = self
            .members
            .values()
            .map(|m| m.iter().map(|&i| self.slots[i].cell).collect())
            .collect();
        groups.sort();
        groups
    }
}

/// Equivalence classes of linked rule cells, one partition per constraint type.
#[derive(Debug, Clone, Default)]
pub struct LinkageGraph {
    physical: Partition,
    clearance: Partition,
}

impl LinkageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, constraint_type: ConstraintType) -> &Partition {
        match constraint_type {
            ConstraintType::Physical => &self.physical,
            ConstraintType::Clearance => &self.clearance,
        }
    }

    fn partition_mut(&mut self, constraint_type: ConstraintType) -> &mut Partition {
        match constraint_type {
            ConstraintType::Physical => &mut self.physical,
            ConstraintType::Clearance => &mut self.clearance,
        }
    }

    /// Merge the groups of every listed cell into one group of `constraint_type`.
    ///
    /// Returns the resulting group. Fewer than two distinct ungrouped ids is a no-op.
    pub fn link(
        &mut self,
        cells: &[CellId],
        constraint_type: ConstraintType,
        access: &impl CellAccess,
    ) -> Result<BTreeSet<CellId>> {
        let mut distinct = Vec::with_capacity(cells.len());
        for &cell in cells {
            let actual = access
                .constraint_type_of(cell)
                .ok_or(RuleGridError::CellNotFound(cell))?;
            if actual != constraint_type {
                warn!("Refusing to link {} cell {} as {}", actual, cell, constraint_type);
                return Err(RuleGridError::CrossTypeLink {
                    cell,
                    requested: constraint_type,
                    actual,
                });
            }
            if !distinct.contains(&cell) {
                distinct.push(cell);
            }
        }

        let partition = self.partition_mut(constraint_type);
        if distinct.len() < 2 {
            return Ok(distinct
                .first()
                .map(|&c| partition.group_of(c))
                .unwrap_or_default());
        }

        partition.link(&distinct);
        let group = partition.group_of(distinct[0]);
        info!("Linked {} {} cells into a group of {}", distinct.len(), constraint_type, group.len());
        Ok(group)
    }

    /// Remove `cell` from every group it belongs to. Returns whether it was grouped.
    pub fn unlink(&mut self, cell: CellId) -> bool {
        let physical = self.physical.remove(cell);
        let clearance = self.clearance.remove(cell);
        if physical || clearance {
            debug!("Unlinked cell {}", cell);
        }
        physical || clearance
    }

    /// Every cell linked with `cell` across both families, itself included.
    pub fn group_of(&self, cell: CellId) -> BTreeSet<CellId> {
        let mut group = self.physical.group_of(cell);
        group.extend(self.clearance.group_of(cell));
        group
    }

    pub fn group_of_type(&self, cell: CellId, constraint_type: ConstraintType) -> BTreeSet<CellId> {
        self.partition(constraint_type).group_of(cell)
    }

    pub fn is_linked(&self, cell: CellId) -> bool {
        self.physical.index.contains_key(&cell) || self.clearance.index.contains_key(&cell)
    }

    pub fn groups(&self, constraint_type: ConstraintType) -> Vec<BTreeSet<CellId>> {
        self.partition(constraint_type).groups()
    }

    /// Write `value` to `cell` and to every member of its group, atomically.
    ///
    /// Members no longer present in `access` are skipped.
    pub fn propagate(
        &self,
        cell: CellId,
        value: CellValue,
        access: &mut impl CellAccess,
    ) -> Result<Vec<CellId>> {
        let constraint_type = access
            .constraint_type_of(cell)
            .ok_or(RuleGridError::CellNotFound(cell))?;

        let group = self.group_of_type(cell, constraint_type);
        let targets: Vec<CellId> = if group.is_empty() {
            vec![cell]
        } else {
            group
                .into_iter()
                .filter(|&member| {
                    let present = access.constraint_type_of(member).is_some();
                    if !present {
                        warn!("Skipping dangling linked cell {}", member);
                    }
                    present
                })
                .collect()
        };

        access.write_cells(&targets, &value)?;
        debug!("Propagated {} to {} cells", value, targets.len());
        Ok(targets)
    }

    /// Drop membership of cells the owner no longer has.
    pub fn prune_dangling(&mut self, access: &impl CellAccess) -> usize {
        let dangling: Vec<CellId> = self
            .physical
            .index
            .keys()
            .chain(self.clearance.index.keys())
            .copied()
            .filter(|&c| access.constraint_type_of(c).is_none())
            .collect();
        for &cell in &dangling {
            self.unlink(cell);
        }
        if !dangling.is_empty() {
            info!("Pruned {} dangling linkage members", dangling.len());
        }
        dangling.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Minimal cell owner for exercising the partitions in isolation.
    #[derive(Default)]
    struct Cells(HashMap<CellId, (ConstraintType, CellValue)>);

    impl Cells {
        fn add(&mut self, ty: ConstraintType, v: f64) -> CellId {
            let id = Uuid::new_v4();
            self.0.insert(id, (ty, CellValue::Number(v)));
            id
        }

        fn value(&self, id: CellId) -> &CellValue {
            &self.0[&id].1
        }
    }

    impl CellAccess for Cells {
        fn constraint_type_of(&self, id: CellId) -> Option<ConstraintType> {
            self.0.get(&id).map(|(t, _)| *t)
        }

        fn cell_value(&self, id: CellId) -> Option<&CellValue> {
            self.0.get(&id).map(|(_, v)| v)
        }

        fn write_cells(&mut self, ids: &[CellId], value: &CellValue) -> Result<()> {
            if let Some(missing) = ids.iter().find(|id| !self.0.contains_key(id)) {
                return Err(RuleGridError::CellNotFound(*missing));
            }
            for id in ids {
                if let Some(entry) = self.0.get_mut(id) {
                    entry.1 = value.clone();
                }
            }
            Ok(())
        }
    }

    #[test]
    fn link_and_propagate() {
        let mut cells = Cells::default();
        let a = cells.add(ConstraintType::Clearance, 1.0);
        let b = cells.add(ConstraintType::Clearance, 2.0);
        let mut graph = LinkageGraph::new();

        let group = graph.link(&[a, b], ConstraintType::Clearance, &cells).unwrap();
        assert_eq!(group, BTreeSet::from([a, b]));

        graph.propagate(a, CellValue::Number(7.5), &mut cells).unwrap();
        assert_eq!(cells.value(b), &CellValue::Number(7.5));
    }

    #[test]
    fn unlink_stops_propagation_and_dissolves_pairs() {
        let mut cells = Cells::default();
        let a = cells.add(ConstraintType::Clearance, 1.0);
        let b = cells.add(ConstraintType::Clearance, 1.0);
        let mut graph = LinkageGraph::new();
        graph.link(&[a, b], ConstraintType::Clearance, &cells).unwrap();

        assert!(graph.unlink(a));
        assert!(graph.group_of(b).is_empty(), "one-member group must dissolve");

        graph.propagate(a, CellValue::Number(9.0), &mut cells).unwrap();
        assert_eq!(cells.value(a), &CellValue::Number(9.0));
        assert_eq!(cells.value(b), &CellValue::Number(1.0));
    }

    #[test]
    fn linking_merges_existing_groups() {
        let mut cells = Cells::default();
        let ids: Vec<CellId> = (0..5)
            .map(|i| cells.add(ConstraintType::Physical, i as f64))
            .collect();
        let mut graph = LinkageGraph::new();
        graph.link(&ids[0..2], ConstraintType::Physical, &cells).unwrap();
        graph.link(&ids[2..4], ConstraintType::Physical, &cells).unwrap();
        assert_eq!(graph.groups(ConstraintType::Physical).len(), 2);

        let merged = graph
            .link(&[ids[1], ids[3], ids[4]], ConstraintType::Physical, &cells)
            .unwrap();
        assert_eq!(merged.len(), 5);
        assert_eq!(graph.groups(ConstraintType::Physical).len(), 1);
    }

    #[test]
    fn removal_keeps_rest_of_group_intact() {
        let mut cells = Cells::default();
        let ids: Vec<CellId> = (0..4)
            .map(|i| cells.add(ConstraintType::Clearance, i as f64))
            .collect();
        let mut graph = LinkageGraph::new();
        graph.link(&ids, ConstraintType::Clearance, &cells).unwrap();

        // Remove whatever ended up as the root, then a leaf.
        graph.unlink(ids[0]);
        assert_eq!(graph.group_of(ids[3]), BTreeSet::from([ids[1], ids[2], ids[3]]));
        graph.unlink(ids[2]);
        assert_eq!(graph.group_of(ids[1]), BTreeSet::from([ids[1], ids[3]]));

        // Freed slots are reused without corrupting live groups.
        let e = cells.add(ConstraintType::Clearance, 0.0);
        let f = cells.add(ConstraintType::Clearance, 0.0);
        graph.link(&[e, f], ConstraintType::Clearance, &cells).unwrap();
        assert_eq!(graph.group_of(ids[1]).len(), 2);
        assert_eq!(graph.group_of(e), BTreeSet::from([e, f]));
    }

    #[test]
    fn cross_type_link_is_rejected_without_change() {
        let mut cells = Cells::default();
        let a = cells.add(ConstraintType::Clearance, 1.0);
        let p = cells.add(ConstraintType::Physical, 1.0);
        let mut graph = LinkageGraph::new();

        let err = graph
            .link(&[a, p], ConstraintType::Clearance, &cells)
            .unwrap_err();
        assert!(matches!(
            err,
            RuleGridError::CrossTypeLink {
                actual: ConstraintType::Physical,
                ..
            }
        ));
        assert!(!graph.is_linked(a));
    }

    #[test]
    fn single_id_link_is_noop() {
        let mut cells = Cells::default();
        let a = cells.add(ConstraintType::Clearance, 1.0);
        let mut graph = LinkageGraph::new();
        assert!(graph
            .link(&[a, a], ConstraintType::Clearance, &cells)
            .unwrap()
            .is_empty());
        assert!(!graph.is_linked(a));
    }

    #[test]
    fn dangling_members_are_pruned() {
        let mut cells = Cells::default();
        let a = cells.add(ConstraintType::Clearance, 1.0);
        let b = cells.add(ConstraintType::Clearance, 1.0);
        let c = cells.add(ConstraintType::Clearance, 1.0);
        let mut graph = LinkageGraph::new();
        graph.link(&[a, b, c], ConstraintType::Clearance, &cells).unwrap();

        cells.0.remove(&c);
        graph.propagate(a, CellValue::Number(3.0), &mut cells).unwrap();
        assert_eq!(cells.value(b), &CellValue::Number(3.0));

        assert_eq!(graph.prune_dangling(&cells), 1);
        assert_eq!(graph.group_of(a), BTreeSet::from([a, b]));
    }
}
