use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type NetclassId = Uuid;
pub type InterfaceId = Uuid;
pub type RelationBrandId = Uuid;
pub type LayerGroupSetId = Uuid;
pub type CellId = Uuid;
pub type JobId = Uuid;

/// Family a rule cell belongs to. Linkage groups never mix families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConstraintType {
    Physical,
    Clearance,
}

impl ConstraintType {
    pub const ALL: [ConstraintType; 2] = [ConstraintType::Physical, ConstraintType::Clearance];
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintType::Physical => "physical",
            ConstraintType::Clearance => "clearance",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ConstraintType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "physical" => Ok(ConstraintType::Physical),
            "clearance" => Ok(ConstraintType::Clearance),
            other => Err(format!("unknown constraint type: {}", other)),
        }
    }
}

/// Matrix axis. Rows and columns are both projections of the netclass list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Row,
    Column,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::Row => Axis::Column,
            Axis::Column => Axis::Row,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Column => write!(f, "column"),
        }
    }
}

/// Second coordinate of a C2C cell: either another netclass or a relation brand column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnId {
    Netclass(NetclassId),
    Relation(RelationBrandId),
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnId::Netclass(id) => write!(f, "netclass:{}", id),
            ColumnId::Relation(id) => write!(f, "relation:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    pub constraint_type: ConstraintType,
    pub row: NetclassId,
    pub column: ColumnId,
}

impl CellAddress {
    pub fn new(constraint_type: ConstraintType, row: NetclassId, column: ColumnId) -> Self {
        Self {
            constraint_type,
            row,
            column,
        }
    }

    pub fn clearance(row: NetclassId, column: ColumnId) -> Self {
        Self::new(ConstraintType::Clearance, row, column)
    }

    pub fn physical(row: NetclassId, column: ColumnId) -> Self {
        Self::new(ConstraintType::Physical, row, column)
    }

    /// The same cell with row and column netclasses swapped, if the column is a netclass.
    pub fn mirrored(&self) -> Option<CellAddress> {
        match self.column {
            ColumnId::Netclass(col) => Some(CellAddress::new(
                self.constraint_type,
                col,
                ColumnId::Netclass(self.row),
            )),
            ColumnId::Relation(_) => None,
        }
    }

    pub fn touches_netclass(&self, id: NetclassId) -> bool {
        self.row == id || self.column == ColumnId::Netclass(id)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{} x {}]", self.constraint_type, self.row, self.column)
    }
}

/// Value held by a cell: a number, a reference to a relation brand, or an opaque identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Number(f64),
    Relation(RelationBrandId),
    Text(String),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn relation(&self) -> Option<RelationBrandId> {
        match self {
            CellValue::Relation(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Relation(id) => write!(f, "relation:{}", id),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A rule area inside a project. Every scope owns its own store, linkage and job slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub project_id: String,
    pub rule_area: String,
}

impl Scope {
    pub fn new(project_id: impl Into<String>, rule_area: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            rule_area: rule_area.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.rule_area)
    }
}

/// Mutation categories the authorizer is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    EditNetclasses,
    EditVisibility,
    EditRules,
    EditLinkage,
    RunExpansion,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::EditNetclasses => "edit_netclasses",
            ActionKind::EditVisibility => "edit_visibility",
            ActionKind::EditRules => "edit_rules",
            ActionKind::EditLinkage => "edit_linkage",
            ActionKind::RunExpansion => "run_expansion",
        };
        write!(f, "{}", s)
    }
}
