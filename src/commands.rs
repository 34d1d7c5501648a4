use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use waysampler_core::{loading::road_graph_from_overpass_file, prelude::*, sampling::repair};

use crate::config::{AppConfig, StrategyConfig};
use crate::headless::DryRunCapture;
use crate::overpass::OverpassClient;

fn session_layout(config: &AppConfig) -> SessionLayout {
    SessionLayout::new(&config.session_root, &config.sampler.config_name())
}

fn overpass_query(config: &AppConfig) -> anyhow::Result<String> {
    let polygon = config
        .bounds_polygon()
        .context("a bounding polygon is required to query the road network")?;
    Ok(build_overpass_query(
        &polygon,
        &config.overpass.way_kinds,
        config.overpass.timeout_secs,
    ))
}

/// Fetches and solves the road network unless the session already caches it
pub async fn plan(
    config: &AppConfig,
    map_data: Option<&Path>,
    geojson: Option<&Path>,
) -> anyhow::Result<()> {
    let georef = config.georeference();
    let layout = session_layout(config);
    let store = SessionStore::for_layout(&layout);

    let data = match store.load()? {
        Some(data) => data,
        None => {
            let bounds = config.bounds_polygon();
            let graph = match map_data {
                Some(path) => road_graph_from_overpass_file(path, bounds.as_ref())?,
                None => {
                    let client = OverpassClient::new(&config.overpass)?;
                    let response = client.fetch(&overpass_query(config)?).await?;
                    road_graph_from_overpass(&response, bounds.as_ref())
                }
            };
            let data = StreetData::solve(graph, &georef)?;
            store.save(&data)?;
            data
        }
    };

    info!(
        nodes = data.graph.node_count(),
        edges = data.graph.edge_count(),
        walks = data.walks.len(),
        length_m = data.total_path_length / config.origin.units_per_meter,
        estimated_samples = (data.total_path_length / config.sampler.sample_distance) as usize,
        "Route cover ready in {}",
        layout.session_dir().display()
    );

    if let Some(path) = geojson {
        let collection = walks_to_geojson(&data.graph, &data.walks)?;
        std::fs::write(path, serde_json::to_string(&collection)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote walks to {}", path.display());
    }
    Ok(())
}

fn build_strategy(
    config: &AppConfig,
    georef: Arc<dyn Georeference>,
    layout: &SessionLayout,
) -> anyhow::Result<Box<dyn SamplingStrategy>> {
    let bounds = config.bounds_polygon();
    let strategy: Box<dyn SamplingStrategy> = match &config.strategy {
        StrategyConfig::WayGraph => {
            let mut strategy = WayGraphStrategy::new(config.sampler.clone(), georef);
            if !layout.street_data_path().exists() {
                let client = OverpassClient::new(&config.overpass)?;
                strategy = strategy.with_query(client.spawn_query(overpass_query(config)?));
            }
            if let Some(polygon) = bounds {
                strategy = strategy.with_bounds(polygon);
            }
            Box::new(strategy)
        }
        StrategyConfig::Replay {
            source,
            altitude_offset,
        } => {
            let mut strategy =
                ReplayStrategy::new(source, georef).with_altitude_offset(*altitude_offset);
            if let Some(polygon) = bounds {
                strategy = strategy.with_bounds(polygon);
            }
            Box::new(strategy)
        }
        StrategyConfig::Grid { source, grid } => {
            Box::new(GridStrategy::new(source, georef).with_settings(grid.clone()))
        }
    };
    Ok(strategy)
}

/// Runs a sampling session to completion or until Ctrl-C
pub async fn sample(config: &AppConfig, tick: Duration) -> anyhow::Result<()> {
    let georef: Arc<dyn Georeference> = Arc::new(config.georeference());
    let layout = session_layout(config);
    let strategy = build_strategy(config, Arc::clone(&georef), &layout)?;
    let validator = PlacementValidator::new(
        Arc::new(FlatGround::new(config.ground_height)),
        config.sampler.placement.clone(),
    );

    let mut pipeline = SamplingPipeline::new(
        config.sampler.clone(),
        &config.session_root,
        strategy,
        validator,
        Box::new(DryRunCapture::new()),
        georef,
    )?;
    pipeline.start();

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;

    while pipeline.is_running() {
        tokio::select! {
            _ = interval.tick() => {
                pipeline.tick();
            }
            result = &mut ctrl_c, if !cancelled => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                info!("Interrupted, finishing in-flight captures");
                cancelled = true;
                pipeline.cancel();
            }
        }
    }

    let counters = pipeline.counters();
    match pipeline.status() {
        PipelineStatus::Halted(reason) => bail!("sampling halted: {reason}"),
        _ => {
            info!(
                captured = counters.captured,
                already_captured = counters.already_captured,
                rejected = counters.rejected,
                duplicates = counters.duplicates,
                "Session written to {}",
                pipeline.layout().session_dir().display()
            );
            Ok(())
        }
    }
}

/// Truncates an interrupted sample log to its last complete record and
/// closes it
pub fn repair_log(path: &Path) -> anyhow::Result<()> {
    let report =
        repair(path).with_context(|| format!("failed to repair {}", path.display()))?;
    info!(
        records = report.records,
        was_closed = report.was_closed,
        truncated_bytes = report.truncated_bytes,
        "Repaired {}",
        path.display()
    );
    MetadataLog::open(path, &JsonValue::Null)?.close()?;
    Ok(())
}
