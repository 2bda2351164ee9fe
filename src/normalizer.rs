use std::collections::HashMap;

use chrono::Utc;
use geojson::{Geometry, Value};
use tracing::debug;

use crate::converter::ResolvedFeature;
use crate::place::{
    Address, Category, Contact, Location, Place, CATEGORY_TAG_PRIORITY, SOURCE_NAME, UNNAMED,
};

/// Normalize resolved features into canonical Place records. Features
/// whose location cannot be resolved are excluded, mirroring the
/// converter's silent-omission policy.
pub fn normalize_features(features: Vec<ResolvedFeature>) -> Vec<Place> {
    let mut places = Vec::with_capacity(features.len());
    for feature in features {
        if let Some(place) = normalize_feature(feature) {
            places.push(place);
        }
    }
    places
}

pub fn normalize_feature(feature: ResolvedFeature) -> Option<Place> {
    let location = feature.geometry.as_ref().and_then(representative_point);
    let Some(location) = location else {
        debug!(source_id = %feature.source_id, "feature has no resolvable location, excluded");
        return None;
    };

    let (category, subcategory) = resolve_category(&feature.tags);
    let tags = feature.tags;
    let now = Utc::now();
    Some(Place {
        source_id: feature.source_id,
        name: primary_name(&tags),
        name_si: non_empty_tag(&tags, "name:si"),
        name_ta: non_empty_tag(&tags, "name:ta"),
        category,
        subcategory,
        location: Some(location),
        geometry: feature.geometry,
        address: Address::from_tags(&tags),
        contact: Contact::from_tags(&tags),
        tags,
        source: SOURCE_NAME.to_string(),
        retrieved_at: now,
        created_at: now,
    })
}

/// Walk the fixed priority list; the first key present with a non-empty
/// value decides category and subcategory.
pub fn resolve_category(tags: &HashMap<String, String>) -> (Category, String) {
    for (category, key) in CATEGORY_TAG_PRIORITY {
        if let Some(value) = tags.get(key) {
            if !value.is_empty() {
                return (category, value.clone());
            }
        }
    }
    (Category::Other, "unknown".to_string())
}

/// The representative point for a geometry, per kind:
/// Point unchanged, LineString the mean of its vertices, Polygon the mean
/// of its outer ring, MultiPolygon the mean of the first member's outer
/// ring. Everything else has no representative point.
pub fn representative_point(geometry: &Geometry) -> Option<Location> {
    match &geometry.value {
        Value::Point(position) => position_location(position),
        Value::LineString(coordinates) => vertex_mean(coordinates),
        Value::Polygon(rings) => vertex_mean(rings.first()?),
        Value::MultiPolygon(polygons) => vertex_mean(polygons.first()?.first()?),
        _ => None,
    }
}

fn position_location(position: &[f64]) -> Option<Location> {
    Some(Location {
        lon: *position.first()?,
        lat: *position.get(1)?,
    })
}

/// Arithmetic mean of vertex coordinates. A closing vertex duplicating the
/// first (a GeoJSON-closed ring) is not double-counted.
fn vertex_mean(coordinates: &[Vec<f64>]) -> Option<Location> {
    let closed = coordinates.len() > 1 && coordinates.first() == coordinates.last();
    let vertices = if closed {
        &coordinates[..coordinates.len() - 1]
    } else {
        coordinates
    };
    if vertices.is_empty() {
        return None;
    }
    let mut sum_lon = 0.0;
    let mut sum_lat = 0.0;
    for vertex in vertices {
        sum_lon += *vertex.first()?;
        sum_lat += *vertex.get(1)?;
    }
    let count = vertices.len() as f64;
    Some(Location {
        lon: sum_lon / count,
        lat: sum_lat / count,
    })
}

fn primary_name(tags: &HashMap<String, String>) -> String {
    non_empty_tag(tags, "name")
        .or_else(|| non_empty_tag(tags, "name:en"))
        .unwrap_or_else(|| UNNAMED.to_string())
}

fn non_empty_tag(tags: &HashMap<String, String>, key: &str) -> Option<String> {
    tags.get(key).filter(|value| !value.is_empty()).cloned()
}
