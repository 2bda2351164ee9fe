use std::path::Path;

use chrono::Utc;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject};
use rstar::{RTree, RTreeObject, AABB};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::place::{Category, Location, Place};

/// Default proximity search radius in meters.
pub const DEFAULT_NEARBY_RADIUS_M: f64 = 5000.0;

/// Default result cap for text search when the caller does not give one.
const DEFAULT_SEARCH_LIMIT: usize = 50;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

const TEXT_INDEX_HEAP_BYTES: usize = 50_000_000;

/// Accounting for one upsert batch. `updated` counts only writes whose
/// content actually changed; re-writing identical data is not an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Aggregate statistics over the stored records.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total: usize,
    /// Record count per category, descending.
    pub by_category: Vec<(Category, usize)>,
    /// Top 20 subcategories by record count, descending.
    pub top_subcategories: Vec<(String, usize)>,
}

enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Clone, PartialEq)]
struct SpatialEntry {
    source_id: String,
    /// Longitude, latitude.
    position: [f64; 2],
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Ranked text index over the place name and the `name:en` / `alt_name`
/// tag sub-fields. Held in RAM and rebuilt from the document table on
/// open; the documents themselves stay the single source of truth.
struct TextIndex {
    index: Index,
    writer: IndexWriter,
    reader: IndexReader,
    f_id: Field,
    f_name: Field,
    f_name_en: Field,
    f_alt_name: Field,
}

impl TextIndex {
    fn create() -> Result<TextIndex> {
        let mut builder = Schema::builder();
        let f_id = builder.add_text_field("source_id", STRING | STORED);
        let f_name = builder.add_text_field("name", TEXT);
        let f_name_en = builder.add_text_field("name_en", TEXT);
        let f_alt_name = builder.add_text_field("alt_name", TEXT);
        let schema = builder.build();

        let index = Index::create_in_ram(schema);
        let writer: IndexWriter = index.writer(TEXT_INDEX_HEAP_BYTES)?;
        let reader = index.reader()?;
        Ok(TextIndex {
            index,
            writer,
            reader,
            f_id,
            f_name,
            f_name_en,
            f_alt_name,
        })
    }

    fn upsert(&mut self, place: &Place) -> Result<()> {
        self.writer
            .delete_term(Term::from_field_text(self.f_id, &place.source_id));
        let mut document = doc!(
            self.f_id => place.source_id.clone(),
            self.f_name => place.name.clone()
        );
        if let Some(name_en) = place.tags.get("name:en") {
            document.add_text(self.f_name_en, name_en);
        }
        if let Some(alt_name) = place.tags.get("alt_name") {
            document.add_text(self.f_alt_name, alt_name);
        }
        self.writer.add_document(document)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Matching source ids with their relevance score, descending.
    fn search(&self, text: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let searcher = self.reader.searcher();
        let mut parser = QueryParser::for_index(
            &self.index,
            vec![self.f_name, self.f_name_en, self.f_alt_name],
        );
        parser.set_field_boost(self.f_name, 2.0);
        let (query, _errors) = parser.parse_query_lenient(text);
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher.doc(address)?;
            if let Some(source_id) = document.get_first(self.f_id).and_then(|value| value.as_str())
            {
                hits.push((source_id.to_string(), score));
            }
        }
        Ok(hits)
    }
}

/// Idempotent Place store: a SQLite document table keyed by source id,
/// with an R-tree over locations for proximity queries and a text index
/// for ranked search. The connection is the session's single storage
/// handle; dropping the store releases it on every exit path.
pub struct PlaceStore {
    conn: Connection,
    rtree: RTree<SpatialEntry>,
    text: Option<TextIndex>,
}

impl PlaceStore {
    /// Open a store at `path`, or an in-memory store when `None`.
    pub fn open(path: Option<&Path>) -> Result<PlaceStore> {
        let conn = match path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS places (
                source_id   TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                category    TEXT NOT NULL,
                subcategory TEXT NOT NULL,
                lon         REAL,
                lat         REAL,
                document    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );",
        )?;
        if let Err(error) = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_places_category ON places (category)",
            [],
        ) {
            warn!(%error, "category index creation failed, continuing without it");
        }

        let mut store = PlaceStore {
            conn,
            rtree: RTree::new(),
            text: None,
        };
        store.rebuild_runtime_indexes();
        Ok(store)
    }

    /// Rebuild the in-memory spatial and text indexes from the documents
    /// already on disk. A failure leaves the store usable for upserts and
    /// category queries.
    fn rebuild_runtime_indexes(&mut self) {
        let places = match self.all_places() {
            Ok(places) => places,
            Err(error) => {
                warn!(%error, "could not load existing records, runtime indexes start empty");
                return;
            }
        };

        let mut rtree = RTree::new();
        for place in &places {
            if let Some(location) = place.location {
                rtree.insert(SpatialEntry {
                    source_id: place.source_id.clone(),
                    position: [location.lon, location.lat],
                });
            }
        }
        self.rtree = rtree;

        self.text = match build_text_index(&places) {
            Ok(text) => Some(text),
            Err(error) => {
                warn!(%error, "text index unavailable, text search will return no results");
                None
            }
        };
        debug!(records = places.len(), "runtime indexes rebuilt");
    }

    /// Replace-or-insert each record, keyed by source id. Existing records
    /// keep their creation timestamp; every other field takes the incoming
    /// value. One failing record is counted and skipped without aborting
    /// the rest of the batch.
    pub fn store_places(&mut self, places: &[Place]) -> StoreSummary {
        let mut summary = StoreSummary::default();
        for place in places {
            match self.upsert(place) {
                Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
                Ok(UpsertOutcome::Updated) => summary.updated += 1,
                Ok(UpsertOutcome::Unchanged) => {}
                Err(error) => {
                    warn!(source_id = %place.source_id, %error, "record write failed");
                    summary.errors += 1;
                }
            }
        }
        if let Some(text) = self.text.as_mut() {
            if let Err(error) = text.commit() {
                warn!(%error, "text index commit failed");
            }
        }
        summary
    }

    fn upsert(&mut self, place: &Place) -> Result<UpsertOutcome> {
        validate_record(place)?;
        let existing = self.get(&place.source_id)?;
        match existing {
            None => {
                let mut stored = place.clone();
                stored.created_at = Utc::now();
                self.write_row(&stored)?;
                self.index_place(None, &stored);
                Ok(UpsertOutcome::Inserted)
            }
            Some(previous) => {
                let mut stored = place.clone();
                stored.created_at = previous.created_at;
                let changed = !stored.content_eq(&previous);
                self.write_row(&stored)?;
                self.index_place(Some(&previous), &stored);
                if changed {
                    Ok(UpsertOutcome::Updated)
                } else {
                    Ok(UpsertOutcome::Unchanged)
                }
            }
        }
    }

    fn write_row(&self, place: &Place) -> Result<()> {
        let document = serde_json::to_string(place)?;
        let (lon, lat) = match place.location {
            Some(location) => (Some(location.lon), Some(location.lat)),
            None => (None, None),
        };
        self.conn.execute(
            "INSERT INTO places (source_id, name, category, subcategory, lon, lat, document, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                subcategory = excluded.subcategory,
                lon = excluded.lon,
                lat = excluded.lat,
                document = excluded.document,
                created_at = excluded.created_at",
            params![
                place.source_id,
                place.name,
                place.category.as_str(),
                place.subcategory,
                lon,
                lat,
                document,
                place.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Keep the runtime indexes in step with one written record. Index
    /// failures are logged and non-fatal; the document table already holds
    /// the data.
    fn index_place(&mut self, previous: Option<&Place>, place: &Place) {
        if let Some(previous) = previous {
            if let Some(location) = previous.location {
                self.rtree.remove(&SpatialEntry {
                    source_id: previous.source_id.clone(),
                    position: [location.lon, location.lat],
                });
            }
        }
        if let Some(location) = place.location {
            self.rtree.insert(SpatialEntry {
                source_id: place.source_id.clone(),
                position: [location.lon, location.lat],
            });
        }
        if let Some(text) = self.text.as_mut() {
            if let Err(error) = text.upsert(place) {
                warn!(source_id = %place.source_id, %error, "text index update failed");
            }
        }
    }

    pub fn get(&self, source_id: &str) -> Result<Option<Place>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM places WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;
        match document {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM places", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All records within `radius_m` meters of the center (5 km when not
    /// given), nearest first, optionally restricted to one category.
    pub fn find_nearby(
        &self,
        center: Location,
        radius_m: Option<f64>,
        category: Option<Category>,
    ) -> Result<Vec<(Place, f64)>> {
        let radius = radius_m.unwrap_or(DEFAULT_NEARBY_RADIUS_M);
        let lat_margin = (radius / EARTH_RADIUS_METERS).to_degrees();
        let lon_margin = lat_margin / center.lat.to_radians().cos().abs().max(0.01);
        let envelope = AABB::from_corners(
            [center.lon - lon_margin, center.lat - lat_margin],
            [center.lon + lon_margin, center.lat + lat_margin],
        );

        let mut hits: Vec<(String, f64)> = Vec::new();
        for entry in self.rtree.locate_in_envelope(&envelope) {
            let distance = haversine_distance(
                center.lat,
                center.lon,
                entry.position[1],
                entry.position[0],
            );
            if distance <= radius {
                hits.push((entry.source_id.clone(), distance));
            }
        }
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut results = Vec::with_capacity(hits.len());
        for (source_id, distance) in hits {
            let Some(place) = self.get(&source_id)? else {
                continue;
            };
            if let Some(filter) = category {
                if place.category != filter {
                    continue;
                }
            }
            results.push((place, distance));
        }
        Ok(results)
    }

    /// Matching records in stable source-id order, skip applied before
    /// limit.
    pub fn find_by_category(
        &self,
        category: Category,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<Place>> {
        let limit = limit.map_or(-1, |limit| limit as i64);
        let skip = skip.unwrap_or(0) as i64;
        let mut stmt = self.conn.prepare(
            "SELECT document FROM places WHERE category = ?1
             ORDER BY source_id LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![category.as_str(), limit, skip], |row| {
            row.get::<_, String>(0)
        })?;
        let mut places = Vec::new();
        for row in rows {
            places.push(serde_json::from_str(&row?)?);
        }
        Ok(places)
    }

    /// Free-text search ranked by descending relevance score, optionally
    /// restricted to one category.
    pub fn search_text(
        &self,
        text: &str,
        category: Option<Category>,
        limit: Option<usize>,
    ) -> Result<Vec<(Place, f32)>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let Some(index) = self.text.as_ref() else {
            warn!("text index unavailable, text search returns no results");
            return Ok(Vec::new());
        };

        let cap = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if cap == 0 {
            return Ok(Vec::new());
        }
        // Fetch extra when a category filter will thin the hits out again.
        let fetch = if category.is_some() { cap.max(256) } else { cap };
        let hits = index.search(text, fetch)?;

        let mut results = Vec::new();
        for (source_id, score) in hits {
            let Some(place) = self.get(&source_id)? else {
                continue;
            };
            if let Some(filter) = category {
                if place.category != filter {
                    continue;
                }
            }
            results.push((place, score));
            if results.len() == cap {
                break;
            }
        }
        Ok(results)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let total = self.count()?;

        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) AS n FROM places
             GROUP BY category ORDER BY n DESC, category",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut by_category = Vec::new();
        for row in rows {
            let (category, count) = row?;
            by_category.push((Category::from_name(&category), count as usize));
        }

        let mut stmt = self.conn.prepare(
            "SELECT subcategory, COUNT(*) AS n FROM places
             GROUP BY subcategory ORDER BY n DESC, subcategory LIMIT 20",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut top_subcategories = Vec::new();
        for row in rows {
            let (subcategory, count) = row?;
            top_subcategories.push((subcategory, count as usize));
        }

        Ok(StoreStats {
            total,
            by_category,
            top_subcategories,
        })
    }

    /// Project every stored record into a GeoJSON feature collection. The
    /// stored geometry is used when present, the representative location
    /// otherwise.
    pub fn export_collection(&self) -> Result<FeatureCollection> {
        let places = self.all_places()?;
        let features = places.into_iter().map(place_feature).collect();
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    fn all_places(&self) -> Result<Vec<Place>> {
        let mut stmt = self
            .conn
            .prepare("SELECT document FROM places ORDER BY source_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut places = Vec::new();
        for row in rows {
            places.push(serde_json::from_str(&row?)?);
        }
        Ok(places)
    }
}

fn validate_record(place: &Place) -> Result<()> {
    if place.source_id.trim().is_empty() {
        return Err(Error::InvalidRecord("empty source id".to_string()));
    }
    if let Some(location) = place.location {
        if !location.lon.is_finite() || !location.lat.is_finite() {
            return Err(Error::InvalidRecord(format!(
                "non-finite location for {}",
                place.source_id
            )));
        }
    }
    Ok(())
}

fn build_text_index(places: &[Place]) -> Result<TextIndex> {
    let mut text = TextIndex::create()?;
    for place in places {
        text.upsert(place)?;
    }
    text.commit()?;
    Ok(text)
}

fn place_feature(place: Place) -> Feature {
    let geometry = place.geometry.clone().or_else(|| {
        place
            .location
            .map(|location| Geometry::new(geojson::Value::Point(vec![location.lon, location.lat])))
    });

    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), json!(place.name));
    properties.insert("category".to_string(), json!(place.category.as_str()));
    properties.insert("subcategory".to_string(), json!(place.subcategory));
    properties.insert("tags".to_string(), json!(place.tags));
    properties.insert(
        "address".to_string(),
        serde_json::to_value(&place.address).unwrap_or_default(),
    );
    properties.insert(
        "contact".to_string(),
        serde_json::to_value(&place.contact).unwrap_or_default(),
    );

    Feature {
        bbox: None,
        geometry,
        id: Some(Id::String(place.source_id)),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Haversine distance between two points in meters.
fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}
