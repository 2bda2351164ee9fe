use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Overpass response body.
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Node => "node",
            ElementType::Way => "way",
            ElementType::Relation => "relation",
        }
    }
}

/// One entry of the Overpass `elements` array. Nodes carry coordinates
/// directly; ways and relations carry ordered references into the same
/// response graph. Lives only for the duration of one fetch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub members: Vec<ElementMember>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementMember {
    #[serde(rename = "type")]
    pub member_type: ElementType,
    #[serde(rename = "ref")]
    pub member_id: i64,
    #[serde(default)]
    pub role: String,
}

impl RawElement {
    /// Identity carried through to the canonical record, e.g. `node/123`.
    /// Element ids are only unique per type, so the type is part of it.
    pub fn source_id(&self) -> String {
        format!("{}/{}", self.element_type.as_str(), self.id)
    }

    /// A way whose first and last node references coincide forms a ring.
    pub fn is_closed_way(&self) -> bool {
        self.element_type == ElementType::Way
            && self.nodes.len() >= 2
            && self.nodes.first() == self.nodes.last()
    }
}
