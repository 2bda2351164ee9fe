use std::collections::{HashMap, HashSet};

use geojson::{Geometry, Value};
use tracing::debug;

use crate::element::{ElementType, RawElement};

/// A raw element resolved into concrete geometry plus its verbatim tags.
/// Produced by [`resolve_features`], consumed by the normalizer.
#[derive(Debug, Clone)]
pub struct ResolvedFeature {
    pub source_id: String,
    pub geometry: Option<Geometry>,
    pub tags: HashMap<String, String>,
}

/// Resolve a raw element graph into a flat feature collection, entirely
/// from elements present in the same response.
///
/// Tagged nodes become Point features. Tagged ways become LineStrings, or
/// Polygons when the node references close into a ring. Tagged relations
/// recurse through their members: closed member ways become MultiPolygon
/// rings, open ones MultiLineString parts. Untagged elements only carry
/// geometry for the others and never become features themselves.
///
/// A feature containing any member reference that cannot be resolved
/// within the graph is dropped; conversion of the rest continues.
pub fn resolve_features(elements: &[RawElement]) -> Vec<ResolvedFeature> {
    let mut node_index: HashMap<i64, Vec<f64>> = HashMap::new();
    let mut way_index: HashMap<i64, &RawElement> = HashMap::new();
    let mut relation_index: HashMap<i64, &RawElement> = HashMap::new();
    for element in elements {
        match element.element_type {
            ElementType::Node => {
                if let (Some(lon), Some(lat)) = (element.lon, element.lat) {
                    node_index.insert(element.id, vec![lon, lat]);
                }
            }
            ElementType::Way => {
                way_index.insert(element.id, element);
            }
            ElementType::Relation => {
                relation_index.insert(element.id, element);
            }
        }
    }

    let mut features = Vec::new();
    for element in elements {
        if element.tags.is_empty() {
            continue;
        }
        let geometry = match element.element_type {
            ElementType::Node => node_geometry(element),
            ElementType::Way => match way_geometry(element, &node_index) {
                Some(geometry) => Some(geometry),
                None => {
                    debug!(source_id = %element.source_id(), "way references missing nodes, dropped");
                    continue;
                }
            },
            ElementType::Relation => {
                match relation_geometry(element, &node_index, &way_index, &relation_index) {
                    Some(geometry) => geometry,
                    None => {
                        debug!(source_id = %element.source_id(), "relation references missing members, dropped");
                        continue;
                    }
                }
            }
        };
        features.push(ResolvedFeature {
            source_id: element.source_id(),
            geometry,
            tags: element.tags.clone(),
        });
    }
    features
}

fn node_geometry(node: &RawElement) -> Option<Geometry> {
    match (node.lon, node.lat) {
        (Some(lon), Some(lat)) => Some(Geometry::new(Value::Point(vec![lon, lat]))),
        _ => None,
    }
}

/// Substitute each node reference with its coordinates, in member order.
/// `None` when any reference is absent from the graph.
fn way_coordinates(way: &RawElement, node_index: &HashMap<i64, Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let mut coordinates = Vec::with_capacity(way.nodes.len());
    for node_id in &way.nodes {
        coordinates.push(node_index.get(node_id)?.clone());
    }
    Some(coordinates)
}

fn way_geometry(way: &RawElement, node_index: &HashMap<i64, Vec<f64>>) -> Option<Geometry> {
    let coordinates = way_coordinates(way, node_index)?;
    if way.is_closed_way() && coordinates.len() >= 4 {
        Some(Geometry::new(Value::Polygon(vec![coordinates])))
    } else {
        Some(Geometry::new(Value::LineString(coordinates)))
    }
}

/// Resolve a relation through its members. Outer `None` means an
/// unresolvable reference (drop the feature); `Some(None)` means the
/// relation resolved but carries no line or area geometry of its own.
fn relation_geometry(
    relation: &RawElement,
    node_index: &HashMap<i64, Vec<f64>>,
    way_index: &HashMap<i64, &RawElement>,
    relation_index: &HashMap<i64, &RawElement>,
) -> Option<Option<Geometry>> {
    let mut rings: Vec<Vec<Vec<f64>>> = Vec::new();
    let mut lines: Vec<Vec<Vec<f64>>> = Vec::new();
    let mut visited = HashSet::new();
    collect_relation_parts(
        relation,
        node_index,
        way_index,
        relation_index,
        &mut visited,
        &mut rings,
        &mut lines,
    )?;

    if !rings.is_empty() {
        let polygons = rings.into_iter().map(|ring| vec![ring]).collect();
        Some(Some(Geometry::new(Value::MultiPolygon(polygons))))
    } else if !lines.is_empty() {
        Some(Some(Geometry::new(Value::MultiLineString(lines))))
    } else {
        Some(None)
    }
}

fn collect_relation_parts(
    relation: &RawElement,
    node_index: &HashMap<i64, Vec<f64>>,
    way_index: &HashMap<i64, &RawElement>,
    relation_index: &HashMap<i64, &RawElement>,
    visited: &mut HashSet<i64>,
    rings: &mut Vec<Vec<Vec<f64>>>,
    lines: &mut Vec<Vec<Vec<f64>>>,
) -> Option<()> {
    if !visited.insert(relation.id) {
        // Already walked; a member cycle must not recurse forever.
        return Some(());
    }
    for member in &relation.members {
        match member.member_type {
            ElementType::Node => {
                // Node members contribute no ring or line geometry but
                // must still resolve within the graph.
                node_index.get(&member.member_id)?;
            }
            ElementType::Way => {
                let way = way_index.get(&member.member_id)?;
                let coordinates = way_coordinates(way, node_index)?;
                if coordinates.is_empty() {
                    continue;
                }
                if way.is_closed_way() && coordinates.len() >= 4 {
                    rings.push(coordinates);
                } else {
                    lines.push(coordinates);
                }
            }
            ElementType::Relation => {
                let nested = relation_index.get(&member.member_id)?;
                collect_relation_parts(
                    nested,
                    node_index,
                    way_index,
                    relation_index,
                    visited,
                    rings,
                    lines,
                )?;
            }
        }
    }
    Some(())
}
