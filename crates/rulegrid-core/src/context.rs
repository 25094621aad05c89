use serde::{Deserialize, Serialize};

use crate::{CellAddress, CellValue, ConstraintType, InterfaceId, NetclassId};

/// A coarse grouping of netclasses used on either side of a G2G context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupSelector {
    /// Every netclass in the rule area.
    All,
    Interface { interface_id: InterfaceId },
    Segment { interface_id: InterfaceId, segment: String },
    Channel { interface_id: InterfaceId, channel: u32 },
    Netclasses { ids: Vec<NetclassId> },
}

/// "Every netclass in `from` relates to every netclass in `to` with `value`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupContext {
    pub constraint_type: ConstraintType,
    pub from: GroupSelector,
    pub to: GroupSelector,
    pub value: CellValue,
}

impl GroupContext {
    pub fn new(
        constraint_type: ConstraintType,
        from: GroupSelector,
        to: GroupSelector,
        value: CellValue,
    ) -> Self {
        Self {
            constraint_type,
            from,
            to,
            value,
        }
    }

    pub fn clearance(from: GroupSelector, to: GroupSelector, value: CellValue) -> Self {
        Self::new(ConstraintType::Clearance, from, to, value)
    }
}

/// A single resolved cell assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellWrite {
    pub address: CellAddress,
    pub value: CellValue,
}

impl CellWrite {
    pub fn new(address: CellAddress, value: CellValue) -> Self {
        Self { address, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn selector_serializes_with_kind_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(GroupSelector::Channel {
            interface_id: id,
            channel: 2,
        })
        .unwrap();
        assert_eq!(json["kind"], "channel");
        assert_eq!(json["channel"], 2);

        let back: GroupSelector = serde_json::from_value(json).unwrap();
        assert_eq!(
            back,
            GroupSelector::Channel {
                interface_id: id,
                channel: 2
            }
        );
    }
}
