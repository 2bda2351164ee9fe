use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::place::Category;
use crate::query::{BoundingBox, TagSelector};

pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Static configuration for a sync session. The pipeline only consumes
/// these values as plain parameters; loading them from a file happens
/// here, at the edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub bbox: BoundingBox,
    pub endpoint: String,
    /// Place store path; `None` keeps the store in memory.
    pub db_path: Option<PathBuf>,
    pub selectors: Vec<TagSelector>,
    /// Seconds between cycles in watch mode.
    pub interval_secs: u64,
    /// Politeness delay between consecutive Overpass calls.
    pub request_delay_secs: u64,
    /// Optional GeoJSON snapshot written after each cycle.
    pub backup_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            // Sri Lanka and its surrounding waters.
            bbox: BoundingBox {
                south: 5.8,
                west: 79.5,
                north: 9.9,
                east: 82.0,
            },
            endpoint: DEFAULT_ENDPOINT.to_string(),
            db_path: Some(PathBuf::from("places.db")),
            selectors: default_selectors(),
            interval_secs: 21_600,
            request_delay_secs: 5,
            backup_path: None,
        }
    }
}

impl SyncConfig {
    /// Load a configuration file (JSON). Missing fields take their
    /// defaults; the bounding box is validated after parsing.
    pub fn load(path: &Path) -> Result<SyncConfig> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.bbox.validate()?;
        Ok(config)
    }
}

pub fn default_selectors() -> Vec<TagSelector> {
    vec![
        TagSelector::new(
            Category::Tourism,
            &[
                "museum",
                "attraction",
                "viewpoint",
                "artwork",
                "gallery",
                "zoo",
                "theme_park",
                "hotel",
                "guest_house",
            ],
        ),
        TagSelector::new(
            Category::Amenity,
            &[
                "restaurant",
                "cafe",
                "place_of_worship",
                "marketplace",
                "theatre",
                "library",
            ],
        ),
        TagSelector::new(
            Category::Historic,
            &[
                "monument",
                "memorial",
                "ruins",
                "archaeological_site",
                "castle",
                "fort",
            ],
        ),
        TagSelector::new(
            Category::Natural,
            &["beach", "peak", "bay", "spring", "cave_entrance"],
        ),
        TagSelector::new(
            Category::Leisure,
            &[
                "park",
                "garden",
                "nature_reserve",
                "beach_resort",
                "playground",
            ],
        ),
    ]
}
