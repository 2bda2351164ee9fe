use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geojson::Geometry;
use serde::{Deserialize, Serialize};

/// Provenance label stamped on every normalized record.
pub const SOURCE_NAME: &str = "openstreetmap";

/// Country attributed to every record; the sync targets a single region.
pub const COUNTRY: &str = "Sri Lanka";

/// Display name used when neither `name` nor `name:en` is tagged.
pub const UNNAMED: &str = "Unnamed";

/// Tag keys examined during category resolution, highest priority first.
/// The first key present with a non-empty value decides the category and
/// supplies the subcategory.
pub const CATEGORY_TAG_PRIORITY: [(Category, &str); 5] = [
    (Category::Tourism, "tourism"),
    (Category::Amenity, "amenity"),
    (Category::Historic, "historic"),
    (Category::Natural, "natural"),
    (Category::Leisure, "leisure"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tourism,
    Amenity,
    Historic,
    Natural,
    Leisure,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Tourism => "tourism",
            Category::Amenity => "amenity",
            Category::Historic => "historic",
            Category::Natural => "natural",
            Category::Leisure => "leisure",
            Category::Other => "other",
        }
    }

    /// Parse a stored category name. Unknown names map to `Other` so that
    /// records written by a newer schema still load.
    pub fn from_name(name: &str) -> Category {
        match name {
            "tourism" => Category::Tourism,
            "amenity" => Category::Amenity,
            "historic" => Category::Historic,
            "natural" => Category::Natural,
            "leisure" => Category::Leisure,
            _ => Category::Other,
        }
    }

    /// The tag key queried for this category, if it is a queryable
    /// dimension.
    pub fn tag_key(self) -> Option<&'static str> {
        CATEGORY_TAG_PRIORITY
            .iter()
            .find(|(category, _)| *category == self)
            .map(|(_, key)| *key)
    }
}

/// A single representative point, longitude first as in GeoJSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
}

impl Default for Address {
    fn default() -> Self {
        Address {
            street: None,
            city: None,
            postal_code: None,
            country: COUNTRY.to_string(),
        }
    }
}

impl Address {
    pub fn from_tags(tags: &HashMap<String, String>) -> Address {
        Address {
            street: first_tag(tags, "addr:street", "contact:street"),
            city: first_tag(tags, "addr:city", "contact:city"),
            postal_code: first_tag(tags, "addr:postcode", "contact:postcode"),
            country: COUNTRY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

impl Contact {
    pub fn from_tags(tags: &HashMap<String, String>) -> Contact {
        Contact {
            phone: first_tag(tags, "phone", "contact:phone"),
            email: first_tag(tags, "email", "contact:email"),
            website: first_tag(tags, "website", "contact:website"),
        }
    }
}

fn first_tag(tags: &HashMap<String, String>, primary: &str, fallback: &str) -> Option<String> {
    tags.get(primary)
        .or_else(|| tags.get(fallback))
        .filter(|value| !value.is_empty())
        .cloned()
}

/// Canonical point-of-interest record. Exactly one exists per source id;
/// the store overwrites every field except `created_at` on re-sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    /// `"{element type}/{element id}"`, unique across the source dataset.
    pub source_id: String,
    pub name: String,
    pub name_si: Option<String>,
    pub name_ta: Option<String>,
    pub category: Category,
    pub subcategory: String,
    /// Representative point, present even when `geometry` is an area.
    pub location: Option<Location>,
    pub geometry: Option<Geometry>,
    /// Verbatim source tags, kept for audit and text search.
    pub tags: HashMap<String, String>,
    pub address: Address,
    pub contact: Contact,
    pub source: String,
    pub retrieved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Place {
    /// Field-level comparison for upsert accounting. Timestamps are
    /// excluded: `retrieved_at` is fresh on every sync and `created_at` is
    /// preserved by the store.
    pub fn content_eq(&self, other: &Place) -> bool {
        self.source_id == other.source_id
            && self.name == other.name
            && self.name_si == other.name_si
            && self.name_ta == other.name_ta
            && self.category == other.category
            && self.subcategory == other.subcategory
            && self.location == other.location
            && self.geometry == other.geometry
            && self.tags == other.tags
            && self.address == other.address
            && self.contact == other.contact
            && self.source == other.source
    }
}
