use crate::{
    CellAddress, CellId, InterfaceId, LayerGroupSetId, NetclassId, RelationBrandId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Netclass {
    pub id: NetclassId,
    pub name: String,
    pub interface_id: InterfaceId,
    pub layer_group_set_id: Option<LayerGroupSetId>,
    /// Channel number as text; empty when the netclass is not channelled.
    pub channel: String,
    pub segment: String,
    pub row_visible: bool,
    pub column_visible: bool,
    pub order: u32,
}

impl Netclass {
    pub fn new(name: impl Into<String>, interface_id: InterfaceId) -> Self {
        Self {
            id: NetclassId::new_v4(),
            name: name.into(),
            interface_id,
            layer_group_set_id: None,
            channel: String::new(),
            segment: String::new(),
            row_visible: true,
            column_visible: true,
            order: 0,
        }
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = segment.into();
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_layer_group_set(mut self, id: LayerGroupSetId) -> Self {
        self.layer_group_set_id = Some(id);
        self
    }

    pub fn is_channelled(&self) -> bool {
        !self.channel.is_empty()
    }
}

/// A collection of netclasses, optionally repeated across a channel range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub channel_range: Vec<u32>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: InterfaceId::new_v4(),
            name: name.into(),
            channel_range: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<u32>) -> Self {
        self.channel_range = channels;
        self
    }

    pub fn is_channelled(&self) -> bool {
        !self.channel_range.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationBrand {
    pub id: RelationBrandId,
    pub name: String,
    pub layer_group_set_id: Option<LayerGroupSetId>,
}

impl RelationBrand {
    pub fn new(name: impl Into<String>, layer_group_set_id: Option<LayerGroupSetId>) -> Self {
        Self {
            id: RelationBrandId::new_v4(),
            name: name.into(),
            layer_group_set_id,
        }
    }
}

/// Persisted form of a matrix cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: CellId,
    pub address: CellAddress,
    pub value: crate::CellValue,
}
