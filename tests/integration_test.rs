use placesync::*;

// End-to-end walk of the pipeline stages, minus the network: a canned
// Overpass response is parsed, resolved, normalized, and stored, then
// queried back out.

const RESPONSE: &str = r#"{
    "version": 0.6,
    "generator": "Overpass API",
    "elements": [
        {"type": "node", "id": 1, "lat": 6.9271, "lon": 79.8612,
         "tags": {"tourism": "museum", "name": "Colombo National Museum",
                  "name:si": "කොළඹ ජාතික කෞතුකාගාරය",
                  "addr:city": "Colombo", "phone": "+94 11 269 4767"}},
        {"type": "node", "id": 2, "lat": 6.9350, "lon": 79.8487,
         "tags": {"amenity": "cafe", "name": "Harbour Cafe"}},
        {"type": "node", "id": 10, "lat": 6.9000, "lon": 79.9000},
        {"type": "node", "id": 11, "lat": 6.9000, "lon": 79.9100},
        {"type": "node", "id": 12, "lat": 6.9100, "lon": 79.9100},
        {"type": "node", "id": 13, "lat": 6.9100, "lon": 79.9000},
        {"type": "way", "id": 20, "nodes": [10, 11, 12, 13, 10],
         "tags": {"leisure": "park", "name": "Viharamahadevi Park"}},
        {"type": "way", "id": 21, "nodes": [10, 99],
         "tags": {"tourism": "attraction", "name": "Broken Trail"}}
    ]
}"#;

#[test]
fn test_full_pipeline_from_response_to_store() {
    let parsed: OverpassResponse = serde_json::from_str(RESPONSE).expect("canned response");
    assert_eq!(parsed.elements.len(), 8);

    let features = resolve_features(&parsed.elements);
    // Two tagged nodes and the park polygon; the way with the dangling
    // node reference is silently dropped.
    assert_eq!(features.len(), 3);

    let places = normalize_features(features);
    assert_eq!(places.len(), 3);

    let mut store = PlaceStore::open(None).expect("open store");
    let summary = store.store_places(&places);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.errors, 0);

    // The museum came through with its language and contact details.
    let museum = store.get("node/1").expect("get").expect("museum stored");
    assert_eq!(museum.category, Category::Tourism);
    assert_eq!(museum.subcategory, "museum");
    assert_eq!(museum.name, "Colombo National Museum");
    assert!(museum.name_si.is_some());
    assert_eq!(museum.address.city.as_deref(), Some("Colombo"));
    assert_eq!(museum.address.country, "Sri Lanka");
    assert_eq!(museum.contact.phone.as_deref(), Some("+94 11 269 4767"));

    // The park's representative point is the ring centroid.
    let park = store.get("way/20").expect("get").expect("park stored");
    let location = park.location.unwrap();
    assert!((location.lon - 79.905).abs() < 1e-6);
    assert!((location.lat - 6.905).abs() < 1e-6);

    // Everything sits within a few kilometers of Colombo Fort.
    let hits = store
        .find_nearby(
            Location {
                lon: 79.8538,
                lat: 6.9344,
            },
            Some(10_000.0),
            None,
        )
        .expect("nearby query");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].0.source_id, "node/2");

    let found = store
        .search_text("museum", None, None)
        .expect("text search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0.source_id, "node/1");

    let collection = store.export_collection().expect("export");
    assert_eq!(collection.features.len(), 3);
}

#[test]
fn test_resync_is_idempotent() {
    let parsed: OverpassResponse = serde_json::from_str(RESPONSE).expect("canned response");
    let mut store = PlaceStore::open(None).expect("open store");

    let first = normalize_features(resolve_features(&parsed.elements));
    let summary = store.store_places(&first);
    assert_eq!(summary.inserted, 3);

    // A second cycle over the same data inserts nothing and updates
    // nothing: the content is unchanged even though the retrieval
    // timestamps are fresh.
    let second = normalize_features(resolve_features(&parsed.elements));
    let summary = store.store_places(&second);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.count().unwrap(), 3);
}
