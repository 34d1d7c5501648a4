use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use waysampler_core::prelude::*;
use waysampler_core::sampling::{PlacementSettings, read_log, repair};

const ORIGIN: GeoPoint = GeoPoint::new(13.4, 52.5, 30.0);

#[derive(Default)]
struct Recorder {
    poses: Vec<Pose>,
    fence_polls: usize,
    released: usize,
    shutdowns: usize,
}

/// Capture backend that "renders" a tiny buffer and can delay or fail fences
struct FakeCapture {
    recorder: Arc<Mutex<Recorder>>,
    next: u64,
    pending_polls: usize,
    polls_left: usize,
    fail_fence_of: Option<u64>,
}

impl FakeCapture {
    fn new(recorder: Arc<Mutex<Recorder>>) -> Self {
        Self {
            recorder,
            next: 0,
            pending_polls: 0,
            polls_left: 0,
            fail_fence_of: None,
        }
    }
}

impl CaptureBackend for FakeCapture {
    fn prepare(&mut self, _settings: &CaptureSettings) -> Result<(), Error> {
        Ok(())
    }

    fn begin_capture(&mut self, pose: &Pose) -> Result<CaptureHandle, Error> {
        self.recorder.lock().unwrap().poses.push(*pose);
        self.next += 1;
        self.polls_left = self.pending_polls;
        Ok(CaptureHandle(self.next))
    }

    fn poll_fence(&mut self, handle: CaptureHandle) -> FenceStatus {
        self.recorder.lock().unwrap().fence_polls += 1;
        if self.fail_fence_of == Some(handle.0) {
            return FenceStatus::Failed("device lost".to_string());
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return FenceStatus::Pending;
        }
        FenceStatus::Signaled
    }

    fn read_pixels(&mut self, handle: CaptureHandle) -> Result<ImageBuffer, Error> {
        Ok(ImageBuffer {
            width: 1,
            height: 1,
            encoded: handle.0.to_le_bytes().to_vec(),
        })
    }

    fn release(&mut self, _handle: CaptureHandle) {
        self.recorder.lock().unwrap().released += 1;
    }

    fn shutdown(&mut self) {
        self.recorder.lock().unwrap().shutdowns += 1;
    }
}

/// Ray query that never hits anything
struct Void;

impl RayQuery for Void {
    fn raycast(&self, _from: WorldPos, _to: WorldPos) -> Option<Hit> {
        None
    }
}

fn georef() -> Arc<dyn Georeference> {
    Arc::new(LocalTangentPlane::new(ORIGIN, 100.0))
}

/// 3x3 block of streets, roughly 11 m apart
fn street_grid() -> StreetData {
    let mut graph = RoadGraph::new();
    for row in 0..3u32 {
        for col in 0..3u32 {
            graph.add_node(
                ORIGIN.lon + f64::from(col) * 0.000_15,
                ORIGIN.lat + f64::from(row) * 0.000_1,
            );
        }
    }
    for row in 0..3 {
        let way = graph.add_way(format!("Street {row}"), WayKind::Residential);
        for col in 0..2 {
            graph.connect(row * 3 + col, row * 3 + col + 1, way).unwrap();
        }
    }
    for col in 0..3 {
        let way = graph.add_way(format!("Avenue {col}"), WayKind::Secondary);
        for row in 0..2 {
            graph.connect(row * 3 + col, (row + 1) * 3 + col, way).unwrap();
        }
    }
    StreetData::solve(graph, georef().as_ref()).unwrap()
}

fn config() -> SamplerConfig {
    SamplerConfig {
        name: Some("grid".to_string()),
        init_wait_ticks: 1,
        ..SamplerConfig::default()
    }
}

fn way_graph_pipeline(
    root: &Path,
    data: StreetData,
    capture: FakeCapture,
    rays: Arc<dyn RayQuery>,
) -> SamplingPipeline {
    let strategy = WayGraphStrategy::new(config(), georef()).with_street_data(data);
    SamplingPipeline::new(
        config(),
        root,
        Box::new(strategy),
        PlacementValidator::new(rays, PlacementSettings::default()),
        Box::new(capture),
        georef(),
    )
    .unwrap()
}

fn ground() -> Arc<dyn RayQuery> {
    Arc::new(FlatGround::new(0.0))
}

fn run(pipeline: &mut SamplingPipeline) -> PipelineStatus {
    for _ in 0..50_000 {
        if !pipeline.is_running() {
            break;
        }
        pipeline.tick();
        std::thread::sleep(Duration::from_micros(100));
    }
    pipeline.status().clone()
}

fn image_files(dir: &Path) -> HashSet<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn logged_names(pipeline: &SamplingPipeline) -> Vec<String> {
    read_log(&pipeline.layout().metadata_path())
        .unwrap()
        .samples
        .into_iter()
        .map(|s| s.image_path.unwrap().trim_start_matches("./Images/").to_string())
        .collect()
}

#[test]
fn test_full_session_writes_one_image_per_record() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut pipeline = way_graph_pipeline(
        dir.path(),
        street_grid(),
        FakeCapture::new(Arc::clone(&recorder)),
        ground(),
    );

    pipeline.start();
    assert_eq!(run(&mut pipeline), PipelineStatus::Finished);

    let names = logged_names(&pipeline);
    let files = image_files(&pipeline.layout().images_dir());
    assert!(!names.is_empty());
    assert_eq!(names.len(), pipeline.counters().captured);
    assert_eq!(names.iter().cloned().collect::<HashSet<_>>(), files);
    assert!(names.iter().all(|n| n.starts_with('@') && n.ends_with("@.jpg")));

    let content = fs::read_to_string(pipeline.layout().metadata_path()).unwrap();
    assert!(content.ends_with("]}"));
    let document: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["Info"]["Strategy"], "way_graph");
    assert_eq!(document["Info"]["SampleDistance"], 800.0);

    let recorder = recorder.lock().unwrap();
    assert_eq!(recorder.poses.len(), names.len());
    assert_eq!(recorder.released, names.len());
    assert_eq!(recorder.shutdowns, 1);
    // Flat ground at height 0 plus the ground clearance
    assert!(recorder.poses.iter().all(|p| p.location.z == 250.0));
}

#[test]
fn test_cancelled_session_resumes_without_recapturing() {
    let full_dir = tempfile::tempdir().unwrap();
    let mut full = way_graph_pipeline(
        full_dir.path(),
        street_grid(),
        FakeCapture::new(Arc::default()),
        ground(),
    );
    full.start();
    assert_eq!(run(&mut full), PipelineStatus::Finished);
    let expected = image_files(&full.layout().images_dir());

    let dir = tempfile::tempdir().unwrap();
    let mut first = way_graph_pipeline(
        dir.path(),
        street_grid(),
        FakeCapture::new(Arc::default()),
        ground(),
    );
    first.start();
    while first.counters().captured < 3 {
        assert_eq!(first.tick(), &PipelineStatus::Running);
    }
    first.cancel();
    assert_eq!(run(&mut first), PipelineStatus::Finished);
    let captured_before = first.counters().captured;
    assert!(captured_before < expected.len());
    // In-flight work drained and the log was closed
    assert_eq!(
        image_files(&first.layout().images_dir()).len(),
        captured_before
    );
    assert!(
        fs::read_to_string(first.layout().metadata_path())
            .unwrap()
            .ends_with("]}")
    );

    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut resumed = way_graph_pipeline(
        dir.path(),
        street_grid(),
        FakeCapture::new(Arc::clone(&recorder)),
        ground(),
    );
    resumed.start();
    assert_eq!(run(&mut resumed), PipelineStatus::Finished);

    assert_eq!(
        resumed.counters().already_captured,
        captured_before + full.counters().already_captured
    );
    assert_eq!(
        recorder.lock().unwrap().poses.len(),
        expected.len() - captured_before
    );
    let names = logged_names(&resumed);
    let unique = names.iter().cloned().collect::<HashSet<_>>();
    assert_eq!(unique.len(), names.len());
    assert_eq!(unique, expected);
    assert_eq!(image_files(&resumed.layout().images_dir()), expected);
}

#[test]
fn test_slow_fences_are_waited_for() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut capture = FakeCapture::new(Arc::clone(&recorder));
    capture.pending_polls = 3;
    let mut pipeline = way_graph_pipeline(dir.path(), street_grid(), capture, ground());

    pipeline.start();
    assert_eq!(run(&mut pipeline), PipelineStatus::Finished);

    let recorder = recorder.lock().unwrap();
    assert!(recorder.fence_polls >= 4 * recorder.poses.len());
    assert_eq!(
        image_files(&pipeline.layout().images_dir()).len(),
        recorder.poses.len()
    );
}

#[test]
fn test_fence_failure_halts_and_leaves_log_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut capture = FakeCapture::new(Arc::clone(&recorder));
    capture.fail_fence_of = Some(2);
    let mut pipeline = way_graph_pipeline(dir.path(), street_grid(), capture, ground());

    pipeline.start();
    match run(&mut pipeline) {
        PipelineStatus::Halted(reason) => assert!(reason.contains("device lost"), "{reason}"),
        other => panic!("expected a halt, got {other:?}"),
    }
    {
        let recorder = recorder.lock().unwrap();
        assert_eq!(recorder.poses.len(), 2);
        assert_eq!(recorder.shutdowns, 1);
    }

    // Further ticks do nothing
    assert!(matches!(pipeline.tick(), PipelineStatus::Halted(_)));
    std::thread::sleep(Duration::from_millis(50));

    let path = pipeline.layout().metadata_path();
    assert!(!fs::read_to_string(&path).unwrap().ends_with("]}"));
    let report = repair(&path).unwrap();
    assert!(!report.was_closed);
    // Only the first capture reached disk, so only it is logged
    assert_eq!(report.records, 1);
    assert_eq!(image_files(&pipeline.layout().images_dir()).len(), 1);
}

#[test]
fn test_halted_session_resumes_without_duplicate_records() {
    let full_dir = tempfile::tempdir().unwrap();
    let mut full = way_graph_pipeline(
        full_dir.path(),
        street_grid(),
        FakeCapture::new(Arc::default()),
        ground(),
    );
    full.start();
    assert_eq!(run(&mut full), PipelineStatus::Finished);
    let expected = image_files(&full.layout().images_dir());

    let dir = tempfile::tempdir().unwrap();
    let mut capture = FakeCapture::new(Arc::default());
    capture.fail_fence_of = Some(2);
    let mut halted = way_graph_pipeline(dir.path(), street_grid(), capture, ground());
    halted.start();
    assert!(matches!(run(&mut halted), PipelineStatus::Halted(_)));

    let mut resumed = way_graph_pipeline(
        dir.path(),
        street_grid(),
        FakeCapture::new(Arc::default()),
        ground(),
    );
    resumed.start();
    assert_eq!(run(&mut resumed), PipelineStatus::Finished);

    let names = logged_names(&resumed);
    let unique = names.iter().cloned().collect::<HashSet<_>>();
    assert_eq!(unique.len(), names.len());
    assert_eq!(unique, expected);
    assert_eq!(image_files(&resumed.layout().images_dir()), expected);
}

#[test]
fn test_candidates_without_ground_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut pipeline = way_graph_pipeline(
        dir.path(),
        street_grid(),
        FakeCapture::new(Arc::clone(&recorder)),
        Arc::new(Void),
    );

    pipeline.start();
    assert_eq!(run(&mut pipeline), PipelineStatus::Finished);

    let counters = pipeline.counters();
    assert!(counters.candidates > 0);
    assert_eq!(counters.rejected, counters.candidates);
    assert_eq!(counters.captured, 0);
    assert!(recorder.lock().unwrap().poses.is_empty());
    assert!(logged_names(&pipeline).is_empty());
}

#[test]
fn test_empty_street_data_finishes_with_empty_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut graph = RoadGraph::new();
    graph.add_node(ORIGIN.lon, ORIGIN.lat);
    let data = StreetData::solve(graph, georef().as_ref()).unwrap();
    assert!(data.walks.is_empty());

    let mut pipeline =
        way_graph_pipeline(dir.path(), data, FakeCapture::new(Arc::default()), ground());
    pipeline.start();
    assert_eq!(run(&mut pipeline), PipelineStatus::Finished);

    assert_eq!(pipeline.strategy().estimated_sample_count(), 0);
    assert!(logged_names(&pipeline).is_empty());
    let content = fs::read_to_string(pipeline.layout().metadata_path()).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
}

#[test]
fn test_replay_session_names_images_after_rows() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("panoramas.csv");
    fs::write(
        &csv,
        "PATH,UTM_EAST,UTM_NORTH,UTM_ZONE_NUMBER,UTM_ZONE_LETTER,LAT,LON,PANO_ID,HEADING,YEAR,MONTH,ALTITUDE,PITCH,ROLL\n\
         first.jpg,0,0,33,U,52.5,13.4,a,0,2020,5,30,90,0\n\
         second.jpg,0,0,33,U,52.5001,13.4,b,180,2020,5,30,90,0\n",
    )
    .unwrap();

    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let strategy = ReplayStrategy::new(&csv, georef());
    let mut pipeline = SamplingPipeline::new(
        config(),
        dir.path(),
        Box::new(strategy),
        PlacementValidator::new(ground(), PlacementSettings::default()),
        Box::new(FakeCapture::new(Arc::clone(&recorder))),
        georef(),
    )
    .unwrap();

    pipeline.start();
    assert_eq!(run(&mut pipeline), PipelineStatus::Finished);

    assert_eq!(logged_names(&pipeline), vec!["first.jpg", "second.jpg"]);
    let log = read_log(&pipeline.layout().metadata_path()).unwrap();
    // Recorded pose is kept as is
    assert!((log.samples[1].heading_angle - 180.0).abs() < 1e-9);
    assert!((log.samples[1].pitch - 90.0).abs() < 1e-9);
    assert!((log.samples[0].altitude - 30.0).abs() < 1e-6);
    assert_eq!(recorder.lock().unwrap().poses[0].location.z, 0.0);
}
