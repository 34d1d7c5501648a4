use std::fs::{self, OpenOptions};
use std::io::Write;

use geo::polygon;

use waysampler_core::prelude::*;
use waysampler_core::loading::road_graph_from_overpass_file;
use waysampler_core::sampling::{read_log, repair};

const OVERPASS: &str = r#"{
    "version": 0.6,
    "elements": [
        {"type": "node", "id": 101, "lat": 52.5000, "lon": 13.4000},
        {"type": "node", "id": 102, "lat": 52.5000, "lon": 13.4010},
        {"type": "node", "id": 103, "lat": 52.5010, "lon": 13.4010},
        {"type": "node", "id": 104, "lat": 52.5010, "lon": 13.4000},
        {"type": "node", "id": 105, "lat": 52.5020, "lon": 13.4000},
        {"type": "way", "id": 1, "nodes": [101, 102, 103, 104, 101],
         "tags": {"highway": "residential", "name": "Ring"}},
        {"type": "way", "id": 2, "nodes": [104, 105],
         "tags": {"highway": "bogus_class"}},
        {"type": "way", "id": 3, "nodes": [105, 999]}
    ]
}"#;

fn georef() -> LocalTangentPlane {
    LocalTangentPlane::new(GeoPoint::new(13.4, 52.5, 0.0), 100.0)
}

#[test]
fn test_ingested_graph_round_trips_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let response = OverpassResponse::from_json_str(OVERPASS).unwrap();
    let graph = road_graph_from_overpass(&response, None);
    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.edge_count(), 5);
    assert_eq!(graph.way_count(), 2);
    assert_eq!(graph.way_name(1).unwrap(), "");

    let data = StreetData::solve(graph, &georef()).unwrap();
    let covered = data
        .walks
        .iter()
        .flat_map(|walk| walk.segments())
        .map(|(a, b)| EdgeKey::new(a, b))
        .collect::<std::collections::HashSet<_>>();
    assert_eq!(covered.len(), 5);
    assert!(data.total_path_length > 0.0);

    let layout = SessionLayout::new(dir.path(), "berlin");
    let store = SessionStore::for_layout(&layout);
    store.save(&data).unwrap();
    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.walks, data.walks);
    assert_eq!(loaded, data);

    // The cached document uses the session file field names
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert!(raw.get("Paths").is_some());
    assert!(raw.get("TotalPathLength").is_some());
}

#[test]
fn test_corrupt_cache_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let layout = SessionLayout::new(dir.path(), "berlin");
    fs::create_dir_all(layout.session_dir()).unwrap();
    fs::write(layout.street_data_path(), b"{\"Graph\": ").unwrap();

    let store = SessionStore::for_layout(&layout);
    let mut built = false;
    let data = store
        .load_or_build(|| {
            built = true;
            let response = OverpassResponse::from_json_str(OVERPASS)?;
            StreetData::solve(road_graph_from_overpass(&response, None), &georef())
        })
        .unwrap();
    assert!(built);
    assert_eq!(store.load().unwrap(), Some(data));
}

#[test]
fn test_log_cut_mid_record_resumes_as_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Samples.json");
    let info = serde_json::json!({"SampleDistance": 800.0});

    let mut log = MetadataLog::open(&path, &info).unwrap();
    for i in 0..3 {
        log.append(&Sample {
            image_path: Some(format!("./Images/{i}.jpg")),
            street_name: "Ring".to_string(),
            ..Sample::default()
        })
        .unwrap();
    }
    log.flush().unwrap();
    drop(log);

    // Crash in the middle of the fourth record
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b",\n{\"ImagePath\":\"./Images/3.j").unwrap();
    drop(file);

    let report = repair(&path).unwrap();
    assert_eq!(report.records, 3);
    assert!(!report.was_closed);
    assert!(report.truncated_bytes > 0);

    let mut log = MetadataLog::open(&path, &info).unwrap();
    assert_eq!(log.record_count(), 3);
    log.append(&Sample {
        image_path: Some("./Images/3.jpg".to_string()),
        ..Sample::default()
    })
    .unwrap();
    log.close().unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let document: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["Info"], info);
    assert_eq!(document["Samples"].as_array().unwrap().len(), 4);

    let parsed = read_log(&path).unwrap();
    assert_eq!(
        parsed.samples[3].image_path.as_deref(),
        Some("./Images/3.jpg")
    );
}

#[test]
fn test_graph_from_fetched_file_with_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.json");
    fs::write(&path, OVERPASS).unwrap();

    // Keeps the ring and drops node 105 north of it
    let bounds = geo::polygon![
        (x: 13.3999, y: 52.4999),
        (x: 13.4011, y: 52.4999),
        (x: 13.4011, y: 52.5011),
        (x: 13.3999, y: 52.5011),
    ];
    let graph = road_graph_from_overpass_file(&path, Some(&bounds)).unwrap();
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.way_count(), 1);

    assert!(road_graph_from_overpass_file(&dir.path().join("missing.json"), None).is_err());
}
