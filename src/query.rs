use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::place::Category;

/// Server-side execution budget for a single-dimension query. Composite
/// queries scale this linearly with the number of clauses.
const BASE_TIMEOUT_SECS: u32 = 25;

/// Rectangular latitude/longitude region constraining a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<BoundingBox> {
        let bbox = BoundingBox {
            south,
            west,
            north,
            east,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        if self.south >= self.north {
            return Err(Error::InvalidBoundingBox(format!(
                "south ({}) must be less than north ({})",
                self.south, self.north
            )));
        }
        if self.west >= self.east {
            return Err(Error::InvalidBoundingBox(format!(
                "west ({}) must be less than east ({})",
                self.west, self.east
            )));
        }
        Ok(())
    }

    /// Overpass bbox filter literal: `(south,west,north,east)`.
    fn filter(&self) -> String {
        format!(
            "({},{},{},{})",
            self.south, self.west, self.north, self.east
        )
    }
}

/// One query dimension: a category and the tag values accepted for it.
/// An empty value list contributes no clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSelector {
    pub category: Category,
    pub values: Vec<String>,
}

impl TagSelector {
    pub fn new(category: Category, values: &[&str]) -> TagSelector {
        TagSelector {
            category,
            values: values.iter().map(|value| (*value).to_string()).collect(),
        }
    }
}

/// Build an Overpass QL query for one category dimension. Pure: identical
/// input always yields a byte-identical string.
pub fn build_query(bbox: &BoundingBox, selector: &TagSelector) -> String {
    render_query(bbox, std::slice::from_ref(selector), BASE_TIMEOUT_SECS)
}

/// Union the clauses of several dimensions into one query, with an
/// execution budget proportional to the number of clauses.
pub fn build_composite_query(bbox: &BoundingBox, selectors: &[TagSelector]) -> String {
    let clauses = selectors
        .iter()
        .map(|selector| selector.values.len())
        .sum::<usize>()
        .max(1) as u32;
    render_query(bbox, selectors, BASE_TIMEOUT_SECS * clauses)
}

fn render_query(bbox: &BoundingBox, selectors: &[TagSelector], timeout_secs: u32) -> String {
    let filter = bbox.filter();
    let mut query = format!("[out:json][timeout:{timeout_secs}];\n(\n");
    for selector in selectors {
        let Some(key) = selector.category.tag_key() else {
            continue;
        };
        for value in &selector.values {
            // Both geometry kinds per value; member nodes of matched ways
            // arrive via the trailing recurse statement.
            query.push_str(&format!("  node[\"{key}\"=\"{value}\"]{filter};\n"));
            query.push_str(&format!("  way[\"{key}\"=\"{value}\"]{filter};\n"));
        }
    }
    query.push_str(");\nout body;\n>;\nout skel qt;\n");
    query
}
