use std::collections::HashMap;

use chrono::Utc;
use geojson::{Geometry, Value};
use placesync::*;

fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn place(source_id: &str, name: &str, category: Category, lon: f64, lat: f64) -> Place {
    let now = Utc::now();
    Place {
        source_id: source_id.to_string(),
        name: name.to_string(),
        name_si: None,
        name_ta: None,
        category,
        subcategory: category.as_str().to_string(),
        location: Some(Location { lon, lat }),
        geometry: Some(Geometry::new(Value::Point(vec![lon, lat]))),
        tags: HashMap::new(),
        address: Default::default(),
        contact: Default::default(),
        source: "openstreetmap".to_string(),
        retrieved_at: now,
        created_at: now,
    }
}

#[test]
fn test_upsert_insert_then_update() {
    let mut store = PlaceStore::open(None).expect("open store");

    let first = place("node/1", "Old Name", Category::Tourism, 80.0, 7.0);
    let summary = store.store_places(std::slice::from_ref(&first));
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.errors, 0);

    let created_at = store.get("node/1").unwrap().unwrap().created_at;

    let mut second = place("node/1", "New Name", Category::Tourism, 80.0, 7.0);
    second.tags = tags(&[("tourism", "museum")]);
    let summary = store.store_places(std::slice::from_ref(&second));
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errors, 0);

    // Exactly one stored document, carrying the second call's fields but
    // the first call's creation timestamp.
    assert_eq!(store.count().unwrap(), 1);
    let stored = store.get("node/1").unwrap().unwrap();
    assert_eq!(stored.name, "New Name");
    assert_eq!(stored.tags.get("tourism").unwrap(), "museum");
    assert_eq!(stored.created_at, created_at);
}

#[test]
fn test_identical_rewrite_is_not_an_update() {
    let mut store = PlaceStore::open(None).expect("open store");
    let original = place("node/1", "Museum", Category::Tourism, 80.0, 7.0);
    store.store_places(std::slice::from_ref(&original));

    // Same content, fresh retrieval timestamp: a no-op write.
    let mut resync = original.clone();
    resync.retrieved_at = Utc::now();
    let summary = store.store_places(std::slice::from_ref(&resync));
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.errors, 0);
}

#[test]
fn test_batch_with_one_malformed_record() {
    let mut store = PlaceStore::open(None).expect("open store");
    let batch = vec![
        place("node/1", "A", Category::Tourism, 80.0, 7.0),
        place("node/2", "B", Category::Amenity, 80.1, 7.1),
        place("", "broken", Category::Tourism, 80.2, 7.2),
        place("node/4", "D", Category::Historic, 80.3, 7.3),
        place("node/5", "E", Category::Natural, 80.4, 7.4),
    ];

    let summary = store.store_places(&batch);
    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.errors, 1);
    assert_eq!(store.count().unwrap(), 4);
}

#[test]
fn test_find_nearby_orders_by_distance() {
    let mut store = PlaceStore::open(None).expect("open store");
    // Center on Colombo Fort; offsets of 0.01 degrees latitude are ~1.1 km.
    let center = Location {
        lon: 79.85,
        lat: 6.93,
    };
    let batch = vec![
        place("node/far", "Far", Category::Tourism, 79.85, 7.03), // ~11 km
        place("node/near", "Near", Category::Tourism, 79.85, 6.935), // ~0.6 km
        place("node/mid", "Mid", Category::Tourism, 79.85, 6.96), // ~3.3 km
    ];
    store.store_places(&batch);

    let hits = store.find_nearby(center, None, None).expect("nearby query");
    let ids: Vec<&str> = hits.iter().map(|(p, _)| p.source_id.as_str()).collect();
    assert_eq!(ids, vec!["node/near", "node/mid"]);
    assert!(hits[0].1 < hits[1].1);
    assert!(hits.iter().all(|(_, distance)| *distance <= 5000.0));

    // A wider radius reaches the far record too.
    let hits = store
        .find_nearby(center, Some(20_000.0), None)
        .expect("nearby query");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[2].0.source_id, "node/far");
}

#[test]
fn test_find_nearby_with_category_filter() {
    let mut store = PlaceStore::open(None).expect("open store");
    let center = Location {
        lon: 79.85,
        lat: 6.93,
    };
    store.store_places(&[
        place("node/1", "Museum", Category::Tourism, 79.851, 6.931),
        place("node/2", "Cafe", Category::Amenity, 79.852, 6.932),
    ]);

    let hits = store
        .find_nearby(center, None, Some(Category::Amenity))
        .expect("nearby query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.source_id, "node/2");
}

#[test]
fn test_find_by_category_pagination() {
    let mut store = PlaceStore::open(None).expect("open store");
    let mut batch = Vec::new();
    for index in 1..=5 {
        batch.push(place(
            &format!("node/{index}"),
            &format!("Place {index}"),
            Category::Tourism,
            80.0 + index as f64 * 0.01,
            7.0,
        ));
    }
    batch.push(place("node/9", "Cafe", Category::Amenity, 80.5, 7.5));
    store.store_places(&batch);

    let all = store
        .find_by_category(Category::Tourism, None, None)
        .expect("category query");
    assert_eq!(all.len(), 5);

    // Skip is applied before limit, in stable source-id order.
    let page = store
        .find_by_category(Category::Tourism, Some(2), Some(2))
        .expect("category query");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].source_id, "node/3");
    assert_eq!(page[1].source_id, "node/4");
}

#[test]
fn test_text_search_ranks_and_filters() {
    let mut store = PlaceStore::open(None).expect("open store");
    let mut museum = place("node/1", "National Museum", Category::Tourism, 80.0, 7.0);
    museum.tags = tags(&[("name:en", "National Museum of Colombo")]);
    let maritime = place("node/2", "Maritime Museum", Category::Historic, 80.1, 7.1);
    let park = place("node/3", "Beach Park", Category::Leisure, 80.2, 7.2);
    store.store_places(&[museum, maritime, park]);

    let hits = store
        .search_text("museum", None, None)
        .expect("text search");
    assert_eq!(hits.len(), 2);
    assert!(hits
        .iter()
        .all(|(place, _)| place.name.contains("Museum")));
    // Scores are descending.
    assert!(hits[0].1 >= hits[1].1);

    let restricted = store
        .search_text("museum", Some(Category::Historic), None)
        .expect("text search");
    assert_eq!(restricted.len(), 1);
    assert_eq!(restricted[0].0.source_id, "node/2");

    let none = store
        .search_text("volcano", None, None)
        .expect("text search");
    assert!(none.is_empty());
}

#[test]
fn test_stats_orders_counts_descending() {
    let mut store = PlaceStore::open(None).expect("open store");
    let mut batch = Vec::new();
    for index in 0..3 {
        let mut entry = place(
            &format!("node/t{index}"),
            "T",
            Category::Tourism,
            80.0 + index as f64 * 0.01,
            7.0,
        );
        entry.subcategory = "museum".to_string();
        batch.push(entry);
    }
    let mut cafe = place("node/a1", "A", Category::Amenity, 80.5, 7.5);
    cafe.subcategory = "cafe".to_string();
    batch.push(cafe);
    store.store_places(&batch);

    let stats = store.stats().expect("stats");
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_category[0], (Category::Tourism, 3));
    assert_eq!(stats.by_category[1], (Category::Amenity, 1));
    assert_eq!(stats.top_subcategories[0], ("museum".to_string(), 3));
    assert_eq!(stats.top_subcategories[1], ("cafe".to_string(), 1));
}

#[test]
fn test_export_carries_properties_and_geometry() {
    let mut store = PlaceStore::open(None).expect("open store");
    let mut with_geometry = place("node/1", "Museum", Category::Tourism, 80.0, 7.0);
    with_geometry.tags = tags(&[("tourism", "museum")]);
    // No full geometry stored: export falls back to the location point.
    let mut location_only = place("node/2", "Cafe", Category::Amenity, 80.1, 7.1);
    location_only.geometry = None;
    store.store_places(&[with_geometry, location_only]);

    let collection = store.export_collection().expect("export");
    assert_eq!(collection.features.len(), 2);

    for feature in &collection.features {
        let properties = feature.properties.as_ref().unwrap();
        assert!(properties.contains_key("name"));
        assert!(properties.contains_key("category"));
        assert!(properties.contains_key("subcategory"));
        assert!(properties.contains_key("tags"));
        assert!(properties.contains_key("address"));
        assert!(properties.contains_key("contact"));
        assert!(feature.geometry.is_some());
    }

    let fallback = collection
        .features
        .iter()
        .find(|feature| {
            matches!(feature.id, Some(geojson::feature::Id::String(ref id)) if id == "node/2")
        })
        .unwrap();
    match &fallback.geometry.as_ref().unwrap().value {
        Value::Point(position) => assert_eq!(position, &vec![80.1, 7.1]),
        other => panic!("expected point fallback geometry, got {other:?}"),
    }
}

#[test]
fn test_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("places.db");

    {
        let mut store = PlaceStore::open(Some(&path)).expect("open store");
        store.store_places(&[place("node/1", "Museum", Category::Tourism, 80.0, 7.0)]);
    }

    let store = PlaceStore::open(Some(&path)).expect("reopen store");
    assert_eq!(store.count().unwrap(), 1);
    let stored = store.get("node/1").unwrap().unwrap();
    assert_eq!(stored.name, "Museum");

    // Runtime indexes are rebuilt from the documents on reopen.
    let hits = store
        .find_nearby(
            Location {
                lon: 80.0,
                lat: 7.0,
            },
            Some(1000.0),
            None,
        )
        .expect("nearby query");
    assert_eq!(hits.len(), 1);

    let found = store
        .search_text("museum", None, None)
        .expect("text search");
    assert_eq!(found.len(), 1);
}
