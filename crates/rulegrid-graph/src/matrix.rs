use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rulegrid_core::{
    Axis, CellAddress, CellId, CellRecord, CellValue, CellWrite, ChannelRangeParser, ColumnId,
    ConstraintType, GroupSelector, Interface, InterfaceId, LayerGroupSetId, NameValidator,
    Netclass, NetclassId, RelationBrand, RelationBrandId, Result, RuleGridConfig, RuleGridError,
};

use crate::linkage::{CellAccess, LinkageGraph};

/// A C2C cell. The id is stable for the lifetime of the cell and is what linkage refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub address: CellAddress,
    pub value: CellValue,
}

impl From<&Cell> for CellRecord {
    fn from(cell: &Cell) -> Self {
        CellRecord {
            id: cell.id,
            address: cell.address,
            value: cell.value.clone(),
        }
    }
}

impl From<CellRecord> for Cell {
    fn from(record: CellRecord) -> Self {
        Cell {
            id: record.id,
            address: record.address,
            value: record.value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StagedVisibility {
    row: Option<bool>,
    column: Option<bool>,
}

/// Which rows [`RelationMatrixStore::get_rows`] returns and which cells they carry.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub interface_id: Option<InterfaceId>,
    pub segment: Option<String>,
    /// Case-insensitive substring of the netclass name
    pub name_contains: Option<String>,
    pub constraint_type: Option<ConstraintType>,
    /// Drop hidden rows, and cells whose column netclass is hidden
    pub visible_only: bool,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn visible() -> Self {
        Self {
            visible_only: true,
            ..Self::default()
        }
    }

    pub fn with_interface(mut self, interface_id: InterfaceId) -> Self {
        self.interface_id = Some(interface_id);
        self
    }

    pub fn with_constraint_type(mut self, constraint_type: ConstraintType) -> Self {
        self.constraint_type = Some(constraint_type);
        self
    }

    fn admits(&self, netclass: &Netclass) -> bool {
        if self.interface_id.is_some_and(|id| id != netclass.interface_id) {
            return false;
        }
        if let Some(segment) = &self.segment {
            if !netclass.segment.eq_ignore_ascii_case(segment) {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !netclass.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub netclass: Netclass,
    pub cells: Vec<Cell>,
}

/// In-memory C2C matrix of one rule area.
///
/// Rows and columns are both projections of the netclass list. Visibility
/// edits are staged and only become visible through [`RelationMatrixStore::commit`].
#[derive(Debug, Clone)]
pub struct RelationMatrixStore {
    parser: ChannelRangeParser,
    name_separator: String,
    interfaces: HashMap<InterfaceId, Interface>,
    netclasses: HashMap<NetclassId, Netclass>,
    relation_brands: HashMap<RelationBrandId, RelationBrand>,
    cells: BTreeMap<CellAddress, Cell>,
    cell_index: HashMap<CellId, CellAddress>,
    staged: HashMap<NetclassId, StagedVisibility>,
}

impl Default for RelationMatrixStore {
    fn default() -> Self {
        Self::from_config(&RuleGridConfig::default())
    }
}

impl RelationMatrixStore {
    pub fn new(parser: ChannelRangeParser, name_separator: impl Into<String>) -> Self {
        Self {
            parser,
            name_separator: name_separator.into(),
            interfaces: HashMap::new(),
            netclasses: HashMap::new(),
            relation_brands: HashMap::new(),
            cells: BTreeMap::new(),
            cell_index: HashMap::new(),
            staged: HashMap::new(),
        }
    }

    pub fn from_config(config: &RuleGridConfig) -> Self {
        Self::new(
            ChannelRangeParser::from_config(&config.channels),
            config.channels.name_separator.clone(),
        )
    }

    pub fn parser(&self) -> &ChannelRangeParser {
        &self.parser
    }

    /// Replace the whole contents with persisted records. Staged edits are dropped.
    ///
    /// Cells addressing a missing netclass or brand are skipped.
    pub fn load_records(
        &mut self,
        interfaces: Vec<Interface>,
        netclasses: Vec<Netclass>,
        relation_brands: Vec<RelationBrand>,
        cells: Vec<CellRecord>,
    ) {
        self.interfaces = interfaces.into_iter().map(|i| (i.id, i)).collect();
        self.netclasses = netclasses.into_iter().map(|n| (n.id, n)).collect();
        self.relation_brands = relation_brands.into_iter().map(|b| (b.id, b)).collect();
        self.cells.clear();
        self.cell_index.clear();
        self.staged.clear();

        let mut skipped = 0usize;
        for record in cells {
            if self.validate_address(&record.address).is_err()
                || self.validate_value(&record.value).is_err()
            {
                skipped += 1;
                continue;
            }
            self.cell_index.insert(record.id, record.address);
            self.cells.insert(record.address, record.into());
        }
        if skipped > 0 {
            warn!("Skipped {} persisted cells with missing references", skipped);
        }
        info!(
            "Loaded {} interfaces, {} netclasses, {} relation brands, {} cells",
            self.interfaces.len(),
            self.netclasses.len(),
            self.relation_brands.len(),
            self.cells.len()
        );
    }

    /// Take over the canonical records persistence returned after a save.
    ///
    /// Interfaces are kept, as are staged edits of netclasses that still exist.
    pub fn adopt_records(
        &mut self,
        netclasses: Vec<Netclass>,
        relation_brands: Vec<RelationBrand>,
        cells: Vec<CellRecord>,
    ) {
        let interfaces = self.interfaces.values().cloned().collect();
        let staged = std::mem::take(&mut self.staged);
        self.load_records(interfaces, netclasses, relation_brands, cells);
        let kept: HashMap<NetclassId, StagedVisibility> = staged
            .into_iter()
            .filter(|(id, _)| self.netclasses.contains_key(id))
            .collect();
        self.staged = kept;
    }

    // ---- interfaces -------------------------------------------------------

    /// Register an interface with a textual channel range ("" for none).
    ///
    /// Rejected when the name is taken, or when an existing netclass already
    /// starts with one of the prefixes the new channels would reserve.
    pub fn add_interface(&mut self, name: &str, channel_range: &str) -> Result<InterfaceId> {
        NameValidator::validate(name)?;
        let lower = name.to_lowercase();
        if self
            .interfaces
            .values()
            .any(|i| i.name.to_lowercase() == lower)
        {
            return Err(RuleGridError::DuplicateInterfaceName(name.to_string()));
        }
        let channels = self.parser.parse(channel_range)?;
        if let Some((netclass, prefix)) = self.netclasses.values().find_map(|nc| {
            ChannelRangeParser::colliding_prefix(&nc.name, name, &channels)
                .map(|prefix| (nc.name.clone(), prefix))
        }) {
            warn!(
                "Rejected interface '{}': netclass '{}' holds reserved prefix '{}'",
                name, netclass, prefix
            );
            return Err(RuleGridError::NameCollision {
                name: netclass,
                prefix,
            });
        }
        let interface = Interface::new(name).with_channels(channels);
        let id = interface.id;
        info!(
            "Added interface '{}' with channels [{}]",
            name,
            ChannelRangeParser::serialize(&interface.channel_range)
        );
        self.interfaces.insert(id, interface);
        Ok(id)
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.get(&id)
    }

    pub fn interfaces(&self) -> Vec<&Interface> {
        let mut all: Vec<&Interface> = self.interfaces.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Remove an interface together with every netclass it owns.
    pub fn remove_interface(
        &mut self,
        id: InterfaceId,
        linkage: &mut LinkageGraph,
    ) -> Result<Interface> {
        if !self.interfaces.contains_key(&id) {
            return Err(RuleGridError::InterfaceNotFound(id));
        }
        let owned: Vec<NetclassId> = self
            .netclasses
            .values()
            .filter(|nc| nc.interface_id == id)
            .map(|nc| nc.id)
            .collect();
        for netclass_id in owned {
            self.remove_netclass(netclass_id, linkage)?;
        }
        self.interfaces
            .remove(&id)
            .ok_or(RuleGridError::InterfaceNotFound(id))
    }

    // ---- netclasses -------------------------------------------------------

    /// Reserved prefix `name` collides with, ignoring the prefix of `exempt` (interface, channel).
    fn reserved_collision(&self, name: &str, exempt: Option<(InterfaceId, &str)>) -> Option<String> {
        self.interfaces
            .values()
            .filter(|i| i.is_channelled())
            .find_map(|interface| {
                let channels: Vec<u32> = interface
                    .channel_range
                    .iter()
                    .copied()
                    .filter(|ch| match exempt {
                        Some((iid, own)) if iid == interface.id => ch.to_string() != own,
                        _ => true,
                    })
                    .collect();
                ChannelRangeParser::colliding_prefix(name, &interface.name, &channels)
            })
    }

    fn check_user_name(&self, name: &str, exempt: Option<(InterfaceId, &str)>) -> Result<()> {
        NameValidator::validate(name)?;
        if let Some(prefix) = self.reserved_collision(name, exempt) {
            warn!("Rejected netclass name '{}' (reserved prefix '{}')", name, prefix);
            return Err(RuleGridError::NameCollision {
                name: name.to_string(),
                prefix,
            });
        }
        Ok(())
    }

    fn check_duplicate_name(
        &self,
        interface_id: InterfaceId,
        name: &str,
        exclude: Option<NetclassId>,
    ) -> Result<()> {
        let lower = name.to_lowercase();
        let taken = self.netclasses.values().any(|nc| {
            nc.interface_id == interface_id
                && Some(nc.id) != exclude
                && nc.name.to_lowercase() == lower
        });
        if taken {
            return Err(RuleGridError::DuplicateNetclassName(name.to_string()));
        }
        Ok(())
    }

    fn next_order(&self) -> u32 {
        self.netclasses
            .values()
            .map(|nc| nc.order)
            .max()
            .map_or(0, |max| max + 1)
    }

    fn insert_netclasses(&mut self, netclasses: Vec<Netclass>) -> Vec<NetclassId> {
        let mut order = self.next_order();
        let mut ids = Vec::with_capacity(netclasses.len());
        for mut netclass in netclasses {
            if netclass.order == 0 {
                netclass.order = order;
                order += 1;
            }
            ids.push(netclass.id);
            self.netclasses.insert(netclass.id, netclass);
        }
        info!("Added {} netclasses", ids.len());
        ids
    }

    /// Add user-named netclasses. The whole batch is rejected if any name is invalid.
    pub fn add_netclasses(&mut self, netclasses: Vec<Netclass>) -> Result<Vec<NetclassId>> {
        let mut batch: HashSet<(InterfaceId, String)> = HashSet::new();
        for netclass in &netclasses {
            if !self.interfaces.contains_key(&netclass.interface_id) {
                return Err(RuleGridError::InterfaceNotFound(netclass.interface_id));
            }
            self.check_user_name(&netclass.name, None)?;
            self.check_duplicate_name(netclass.interface_id, &netclass.name, None)?;
            if !batch.insert((netclass.interface_id, netclass.name.to_lowercase())) {
                return Err(RuleGridError::DuplicateNetclassName(netclass.name.clone()));
            }
        }
        Ok(self.insert_netclasses(netclasses))
    }

    /// Generate one netclass per channel of the interface for each base name.
    ///
    /// Generated names are `<interface><channel><separator><base>`. On an
    /// interface without channels this is a plain [`Self::add_netclasses`].
    pub fn add_channelled_netclasses(
        &mut self,
        interface_id: InterfaceId,
        base_names: &[String],
    ) -> Result<Vec<NetclassId>> {
        let interface = self
            .interfaces
            .get(&interface_id)
            .ok_or(RuleGridError::InterfaceNotFound(interface_id))?
            .clone();

        if !interface.is_channelled() {
            let plain = base_names
                .iter()
                .map(|base| Netclass::new(base.clone(), interface_id))
                .collect();
            return self.add_netclasses(plain);
        }

        let mut generated = Vec::with_capacity(interface.channel_range.len() * base_names.len());
        let mut seen = HashSet::new();
        for &channel in &interface.channel_range {
            let prefix = ChannelRangeParser::reserved_prefix(&interface.name, channel);
            for base in base_names {
                NameValidator::validate(base)?;
                let name = format!("{}{}{}", prefix, self.name_separator, base);
                NameValidator::validate(&name)?;
                self.check_duplicate_name(interface_id, &name, None)?;
                if !seen.insert(name.to_lowercase()) {
                    return Err(RuleGridError::DuplicateNetclassName(name));
                }
                generated.push(
                    Netclass::new(name, interface_id)
                        .with_channel(channel)
                        .with_segment(base.clone()),
                );
            }
        }
        debug!(
            "Generated {} channelled netclasses for interface '{}'",
            generated.len(),
            interface.name
        );
        Ok(self.insert_netclasses(generated))
    }

    pub fn rename_netclass(&mut self, id: NetclassId, new_name: &str) -> Result<()> {
        let netclass = self
            .netclasses
            .get(&id)
            .ok_or(RuleGridError::NetclassNotFound(id))?;
        let interface_id = netclass.interface_id;
        let own_channel = netclass.channel.clone();

        let exempt = (!own_channel.is_empty()).then_some((interface_id, own_channel.as_str()));
        self.check_user_name(new_name, exempt)?;
        self.check_duplicate_name(interface_id, new_name, Some(id))?;

        if let Some(netclass) = self.netclasses.get_mut(&id) {
            info!("Renamed netclass '{}' to '{}'", netclass.name, new_name);
            netclass.name = new_name.to_string();
        }
        Ok(())
    }

    pub fn set_segment(&mut self, id: NetclassId, segment: &str) -> Result<()> {
        let netclass = self
            .netclasses
            .get_mut(&id)
            .ok_or(RuleGridError::NetclassNotFound(id))?;
        netclass.segment = segment.to_string();
        Ok(())
    }

    pub fn set_layer_group_set(
        &mut self,
        id: NetclassId,
        layer_group_set_id: Option<LayerGroupSetId>,
    ) -> Result<()> {
        let netclass = self
            .netclasses
            .get_mut(&id)
            .ok_or(RuleGridError::NetclassNotFound(id))?;
        netclass.layer_group_set_id = layer_group_set_id;
        Ok(())
    }

    /// Remove a netclass and every cell in its row or column. Cells leave linkage first.
    pub fn remove_netclass(
        &mut self,
        id: NetclassId,
        linkage: &mut LinkageGraph,
    ) -> Result<Netclass> {
        if !self.netclasses.contains_key(&id) {
            return Err(RuleGridError::NetclassNotFound(id));
        }
        let doomed: Vec<CellAddress> = self
            .cells
            .keys()
            .filter(|address| address.touches_netclass(id))
            .copied()
            .collect();
        let dropped = self.drop_cells(&doomed, linkage);
        self.staged.remove(&id);
        let netclass = self
            .netclasses
            .remove(&id)
            .ok_or(RuleGridError::NetclassNotFound(id))?;
        info!("Removed netclass '{}' and {} cells", netclass.name, dropped);
        Ok(netclass)
    }

    pub fn netclass(&self, id: NetclassId) -> Option<&Netclass> {
        self.netclasses.get(&id)
    }

    pub fn netclass_by_name(&self, interface_id: InterfaceId, name: &str) -> Option<&Netclass> {
        self.netclasses
            .values()
            .find(|nc| nc.interface_id == interface_id && nc.name.eq_ignore_ascii_case(name))
    }

    /// Netclasses in matrix order.
    pub fn netclasses(&self) -> Vec<&Netclass> {
        let mut all: Vec<&Netclass> = self.netclasses.values().collect();
        all.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        all
    }

    /// Netclass ids a group selector stands for, in matrix order.
    pub fn resolve_group(&self, selector: &GroupSelector) -> Result<Vec<NetclassId>> {
        let ensure_interface = |id: &InterfaceId| {
            if self.interfaces.contains_key(id) {
                Ok(())
            } else {
                Err(RuleGridError::InterfaceNotFound(*id))
            }
        };

        let mut members: Vec<&Netclass> = match selector {
            GroupSelector::All => self.netclasses.values().collect(),
            GroupSelector::Interface { interface_id } => {
                ensure_interface(interface_id)?;
                self.netclasses
                    .values()
                    .filter(|nc| nc.interface_id == *interface_id)
                    .collect()
            }
            GroupSelector::Segment {
                interface_id,
                segment,
            } => {
                ensure_interface(interface_id)?;
                self.netclasses
                    .values()
                    .filter(|nc| {
                        nc.interface_id == *interface_id && nc.segment.eq_ignore_ascii_case(segment)
                    })
                    .collect()
            }
            GroupSelector::Channel {
                interface_id,
                channel,
            } => {
                ensure_interface(interface_id)?;
                let channel = channel.to_string();
                self.netclasses
                    .values()
                    .filter(|nc| nc.interface_id == *interface_id && nc.channel == channel)
                    .collect()
            }
            GroupSelector::Netclasses { ids } => ids
                .iter()
                .map(|id| {
                    self.netclasses
                        .get(id)
                        .ok_or(RuleGridError::NetclassNotFound(*id))
                })
                .collect::<Result<_>>()?,
        };

        members.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        members.dedup_by_key(|nc| nc.id);
        Ok(members.into_iter().map(|nc| nc.id).collect())
    }

    // ---- relation brands --------------------------------------------------

    fn check_brand_name(&self, name: &str, exclude: Option<RelationBrandId>) -> Result<()> {
        NameValidator::validate(name)?;
        let lower = name.to_lowercase();
        if self
            .relation_brands
            .values()
            .any(|b| Some(b.id) != exclude && b.name.to_lowercase() == lower)
        {
            return Err(RuleGridError::DuplicateRelationBrand(name.to_string()));
        }
        Ok(())
    }

    pub fn add_relation_brand(
        &mut self,
        name: &str,
        layer_group_set_id: Option<LayerGroupSetId>,
    ) -> Result<RelationBrandId> {
        self.check_brand_name(name, None)?;
        let brand = RelationBrand::new(name, layer_group_set_id);
        let id = brand.id;
        self.relation_brands.insert(id, brand);
        info!("Added relation brand '{}'", name);
        Ok(id)
    }

    pub fn rename_relation_brand(&mut self, id: RelationBrandId, new_name: &str) -> Result<()> {
        if !self.relation_brands.contains_key(&id) {
            return Err(RuleGridError::RelationBrandNotFound(id));
        }
        self.check_brand_name(new_name, Some(id))?;
        if let Some(brand) = self.relation_brands.get_mut(&id) {
            brand.name = new_name.to_string();
        }
        Ok(())
    }

    /// Remove a brand, its column cells and every cell whose value refers to it.
    pub fn remove_relation_brand(
        &mut self,
        id: RelationBrandId,
        linkage: &mut LinkageGraph,
    ) -> Result<RelationBrand> {
        if !self.relation_brands.contains_key(&id) {
            return Err(RuleGridError::RelationBrandNotFound(id));
        }
        let doomed: Vec<CellAddress> = self
            .cells
            .values()
            .filter(|cell| Self::addresses_brand(cell, id))
            .map(|cell| cell.address)
            .collect();
        let dropped = self.drop_cells(&doomed, linkage);
        let brand = self
            .relation_brands
            .remove(&id)
            .ok_or(RuleGridError::RelationBrandNotFound(id))?;
        info!("Removed relation brand '{}' and {} cells", brand.name, dropped);
        Ok(brand)
    }

    pub fn relation_brand(&self, id: RelationBrandId) -> Option<&RelationBrand> {
        self.relation_brands.get(&id)
    }

    pub fn relation_brand_by_name(&self, name: &str) -> Option<&RelationBrand> {
        self.relation_brands
            .values()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    pub fn relation_brands(&self) -> Vec<&RelationBrand> {
        let mut all: Vec<&RelationBrand> = self.relation_brands.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub(crate) fn addresses_brand(cell: &Cell, id: RelationBrandId) -> bool {
        cell.address.column == ColumnId::Relation(id) || cell.value.relation() == Some(id)
    }

    // ---- cells ------------------------------------------------------------

    fn validate_address(&self, address: &CellAddress) -> Result<()> {
        if !self.netclasses.contains_key(&address.row) {
            return Err(RuleGridError::NetclassNotFound(address.row));
        }
        match address.column {
            ColumnId::Netclass(id) if !self.netclasses.contains_key(&id) => {
                Err(RuleGridError::NetclassNotFound(id))
            }
            ColumnId::Relation(id) if !self.relation_brands.contains_key(&id) => {
                Err(RuleGridError::RelationBrandNotFound(id))
            }
            _ => Ok(()),
        }
    }

    fn validate_value(&self, value: &CellValue) -> Result<()> {
        match value.relation() {
            Some(id) if !self.relation_brands.contains_key(&id) => {
                Err(RuleGridError::RelationBrandNotFound(id))
            }
            _ => Ok(()),
        }
    }

    fn write_cell(&mut self, address: CellAddress, value: CellValue) -> CellId {
        if let Some(cell) = self.cells.get_mut(&address) {
            cell.value = value;
            return cell.id;
        }
        let id = Uuid::new_v4();
        self.cell_index.insert(id, address);
        self.cells.insert(address, Cell { id, address, value });
        id
    }

    fn drop_cells(&mut self, addresses: &[CellAddress], linkage: &mut LinkageGraph) -> usize {
        let mut dropped = 0;
        for address in addresses {
            if let Some(cell) = self.cells.remove(address) {
                linkage.unlink(cell.id);
                self.cell_index.remove(&cell.id);
                dropped += 1;
            }
        }
        dropped
    }

    /// Write a single cell directly, bypassing linkage. Creates the cell on first write.
    pub fn set_cell(&mut self, address: CellAddress, value: CellValue) -> Result<CellId> {
        self.validate_address(&address)?;
        self.validate_value(&value)?;
        Ok(self.write_cell(address, value))
    }

    /// Apply a batch of writes. Nothing is written unless every write is valid.
    pub fn apply_writes(&mut self, writes: &[CellWrite]) -> Result<Vec<CellId>> {
        for write in writes {
            self.validate_address(&write.address)?;
            self.validate_value(&write.value)?;
        }
        let ids: Vec<CellId> = writes
            .iter()
            .map(|w| self.write_cell(w.address, w.value.clone()))
            .collect();
        debug!("Applied {} cell writes", ids.len());
        Ok(ids)
    }

    pub fn get_cell(&self, address: &CellAddress) -> Option<&Cell> {
        self.cells.get(address)
    }

    pub fn cell_by_id(&self, id: CellId) -> Option<&Cell> {
        self.cell_index.get(&id).and_then(|a| self.cells.get(a))
    }

    /// All cells in address order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn remove_cell(&mut self, address: &CellAddress, linkage: &mut LinkageGraph) -> Option<Cell> {
        let cell = self.cells.remove(address)?;
        linkage.unlink(cell.id);
        self.cell_index.remove(&cell.id);
        Some(cell)
    }

    /// Delete cells of `constraint_type`, restricted to the given rows when set.
    pub fn clear_cells(
        &mut self,
        constraint_type: ConstraintType,
        rows: Option<&[NetclassId]>,
        linkage: &mut LinkageGraph,
    ) -> usize {
        let doomed: Vec<CellAddress> = self
            .cells
            .keys()
            .filter(|a| a.constraint_type == constraint_type)
            .filter(|a| rows.map_or(true, |rows| rows.contains(&a.row)))
            .copied()
            .collect();
        let dropped = self.drop_cells(&doomed, linkage);
        info!("Cleared {} {} cells", dropped, constraint_type);
        dropped
    }

    /// Address -> value view of every cell.
    pub fn snapshot(&self) -> BTreeMap<CellAddress, CellValue> {
        self.cells
            .iter()
            .map(|(address, cell)| (*address, cell.value.clone()))
            .collect()
    }

    pub fn cell_records(&self) -> Vec<CellRecord> {
        self.cells.values().map(CellRecord::from).collect()
    }

    pub fn netclass_records(&self) -> Vec<Netclass> {
        self.netclasses().into_iter().cloned().collect()
    }

    pub fn relation_brand_records(&self) -> Vec<RelationBrand> {
        self.relation_brands().into_iter().cloned().collect()
    }

    // ---- visibility -------------------------------------------------------

    fn effective_visibility(&self, netclass: &Netclass) -> (bool, bool) {
        let staged = self.staged.get(&netclass.id).copied().unwrap_or_default();
        (
            staged.row.unwrap_or(netclass.row_visible),
            staged.column.unwrap_or(netclass.column_visible),
        )
    }

    pub fn toggle_visibility(&mut self, id: NetclassId, axis: Axis, visible: bool) -> Result<()> {
        if !self.netclasses.contains_key(&id) {
            return Err(RuleGridError::NetclassNotFound(id));
        }
        let staged = self.staged.entry(id).or_default();
        match axis {
            Axis::Row => staged.row = Some(visible),
            Axis::Column => staged.column = Some(visible),
        }
        Ok(())
    }

    pub fn toggle_row_visibility(&mut self, id: NetclassId, visible: bool) -> Result<()> {
        self.toggle_visibility(id, Axis::Row, visible)
    }

    pub fn toggle_column_visibility(&mut self, id: NetclassId, visible: bool) -> Result<()> {
        self.toggle_visibility(id, Axis::Column, visible)
    }

    /// Copy the pending visibility of every netclass from `source` to the other axis.
    pub fn sync_axes(&mut self, source: Axis) {
        let updates: Vec<(NetclassId, bool)> = self
            .netclasses
            .values()
            .map(|nc| {
                let (row, column) = self.effective_visibility(nc);
                (nc.id, if source == Axis::Row { row } else { column })
            })
            .collect();
        for (id, visible) in updates {
            let staged = self.staged.entry(id).or_default();
            match source.other() {
                Axis::Row => staged.row = Some(visible),
                Axis::Column => staged.column = Some(visible),
            }
        }
    }

    pub fn sync_rows_to_columns(&mut self) {
        self.sync_axes(Axis::Row);
    }

    pub fn sync_columns_to_rows(&mut self) {
        self.sync_axes(Axis::Column);
    }

    /// Stage hiding every netclass on `axis`. Only valid once something is re-shown.
    pub fn clear_axis(&mut self, axis: Axis) {
        let ids: Vec<NetclassId> = self.netclasses.keys().copied().collect();
        for id in ids {
            let staged = self.staged.entry(id).or_default();
            match axis {
                Axis::Row => staged.row = Some(false),
                Axis::Column => staged.column = Some(false),
            }
        }
    }

    pub fn clear_rows(&mut self) {
        self.clear_axis(Axis::Row);
    }

    pub fn clear_columns(&mut self) {
        self.clear_axis(Axis::Column);
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Apply staged visibility edits. Returns the number of flags that changed.
    ///
    /// Fails with `EmptyAxis` if the result would hide every row or every
    /// column; staged edits are kept so the caller can fix them or roll back.
    pub fn commit(&mut self) -> Result<usize> {
        if !self.netclasses.is_empty() {
            let (mut any_row, mut any_column) = (false, false);
            for netclass in self.netclasses.values() {
                let (row, column) = self.effective_visibility(netclass);
                any_row |= row;
                any_column |= column;
            }
            if !any_row {
                warn!("Commit rejected: every row would be hidden");
                return Err(RuleGridError::EmptyAxis(Axis::Row));
            }
            if !any_column {
                warn!("Commit rejected: every column would be hidden");
                return Err(RuleGridError::EmptyAxis(Axis::Column));
            }
        }

        let mut changed = 0;
        for (id, staged) in std::mem::take(&mut self.staged) {
            let Some(netclass) = self.netclasses.get_mut(&id) else {
                continue;
            };
            if let Some(row) = staged.row.filter(|&v| v != netclass.row_visible) {
                netclass.row_visible = row;
                changed += 1;
            }
            if let Some(column) = staged.column.filter(|&v| v != netclass.column_visible) {
                netclass.column_visible = column;
                changed += 1;
            }
        }
        info!("Committed visibility edits ({} flags changed)", changed);
        Ok(changed)
    }

    /// Discard staged visibility edits. Returns how many netclasses had edits.
    pub fn rollback(&mut self) -> usize {
        let discarded = self.staged.len();
        self.staged.clear();
        debug!("Rolled back visibility edits for {} netclasses", discarded);
        discarded
    }

    /// Rows as last committed.
    pub fn get_rows(&self, filter: &RowFilter) -> Vec<MatrixRow> {
        self.rows_with(filter, |nc| (nc.row_visible, nc.column_visible))
    }

    /// Rows as they would look after [`Self::commit`].
    pub fn pending_rows(&self, filter: &RowFilter) -> Vec<MatrixRow> {
        self.rows_with(filter, |nc| self.effective_visibility(nc))
    }

    fn rows_with(
        &self,
        filter: &RowFilter,
        visibility: impl Fn(&Netclass) -> (bool, bool),
    ) -> Vec<MatrixRow> {
        let hidden_columns: HashSet<NetclassId> = if filter.visible_only {
            self.netclasses
                .values()
                .filter(|nc| !visibility(nc).1)
                .map(|nc| nc.id)
                .collect()
        } else {
            HashSet::new()
        };

        let mut by_row: HashMap<NetclassId, Vec<Cell>> = HashMap::new();
        for cell in self.cells.values() {
            if filter
                .constraint_type
                .is_some_and(|t| t != cell.address.constraint_type)
            {
                continue;
            }
            if let ColumnId::Netclass(column) = cell.address.column {
                if hidden_columns.contains(&column) {
                    continue;
                }
            }
            by_row
                .entry(cell.address.row)
                .or_default()
                .push(cell.clone());
        }

        let mut rows: Vec<MatrixRow> = self
            .netclasses
            .values()
            .filter(|nc| filter.admits(nc))
            .filter_map(|nc| {
                let (row_visible, column_visible) = visibility(nc);
                if filter.visible_only && !row_visible {
                    return None;
                }
                let mut netclass = nc.clone();
                netclass.row_visible = row_visible;
                netclass.column_visible = column_visible;
                Some(MatrixRow {
                    cells: by_row.remove(&nc.id).unwrap_or_default(),
                    netclass,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.netclass
                .order
                .cmp(&b.netclass.order)
                .then_with(|| a.netclass.name.cmp(&b.netclass.name))
        });
        rows
    }
}

impl CellAccess for RelationMatrixStore {
    fn constraint_type_of(&self, id: CellId) -> Option<ConstraintType> {
        self.cell_index.get(&id).map(|a| a.constraint_type)
    }

    fn cell_value(&self, id: CellId) -> Option<&CellValue> {
        self.cell_by_id(id).map(|c| &c.value)
    }

    fn write_cells(&mut self, ids: &[CellId], value: &CellValue) -> Result<()> {
        self.validate_value(value)?;
        let addresses: Vec<CellAddress> = ids
            .iter()
            .map(|id| {
                self.cell_index
                    .get(id)
                    .copied()
                    .ok_or(RuleGridError::CellNotFound(*id))
            })
            .collect::<Result<_>>()?;
        for address in addresses {
            if let Some(cell) = self.cells.get_mut(&address) {
                cell.value = value.clone();
            }
        }
        Ok(())
    }
}
