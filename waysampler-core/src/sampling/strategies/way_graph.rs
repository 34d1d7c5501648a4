use std::sync::Arc;

use geo::Polygon;
use log::info;
use serde_json::{Value as JsonValue, json};

use super::polygon_json;
use crate::{
    Error,
    loading::{ImageNaming, QueryTask, SamplerConfig, road_graph_from_overpass},
    model::Georeference,
    sampling::{
        CandidateStep, InitProgress, SampleWalker, SamplingStrategy, SessionLayout, SessionStore,
        StreetData,
    },
};

/// Samples along route-covering walks of the road network.
///
/// Street data comes from the session cache when present, otherwise from
/// the map query, and is cached once solved.
pub struct WayGraphStrategy {
    config: SamplerConfig,
    georef: Arc<dyn Georeference>,
    bounds: Option<Polygon<f64>>,
    query: Option<QueryTask>,
    cache_checked: bool,
    street_data: Option<Arc<StreetData>>,
    walker: Option<SampleWalker>,
}

impl WayGraphStrategy {
    pub fn new(config: SamplerConfig, georef: Arc<dyn Georeference>) -> Self {
        Self {
            config,
            georef,
            bounds: None,
            query: None,
            cache_checked: false,
            street_data: None,
            walker: None,
        }
    }

    /// Restricts ingestion to nodes inside `polygon` (lon/lat)
    pub fn with_bounds(mut self, polygon: Polygon<f64>) -> Self {
        self.bounds = Some(polygon);
        self
    }

    /// Map query used when the session has no street data cache yet
    pub fn with_query(mut self, task: QueryTask) -> Self {
        self.query = Some(task);
        self
    }

    /// Street data solved up front
    pub fn with_street_data(mut self, data: StreetData) -> Self {
        self.street_data = Some(Arc::new(data));
        self
    }

    pub fn street_data(&self) -> Option<&StreetData> {
        self.street_data.as_deref()
    }

    pub fn walker(&self) -> Option<&SampleWalker> {
        self.walker.as_ref()
    }

    /// Street data from the cache or the finished query; `None` while the
    /// query is still running. The cache is only looked at on the first call.
    fn resolve_street_data(&mut self, store: &SessionStore) -> Result<Option<StreetData>, Error> {
        if !self.cache_checked {
            self.cache_checked = true;
            if let Some(data) = store.load()? {
                return Ok(Some(data));
            }
        }

        let Some(task) = self.query.as_mut() else {
            return Err(Error::NoData(format!(
                "no street data cache at {} and no map query to build one",
                store.path().display()
            )));
        };
        let Some(result) = task.poll() else {
            return Ok(None);
        };
        self.query = None;

        let graph = road_graph_from_overpass(&result?, self.bounds.as_ref());
        let data = StreetData::solve(graph, self.georef.as_ref())?;
        store.save(&data)?;
        Ok(Some(data))
    }
}

impl SamplingStrategy for WayGraphStrategy {
    fn name(&self) -> &'static str {
        "way_graph"
    }

    fn init(&mut self, layout: &SessionLayout) -> Result<InitProgress, Error> {
        let store = SessionStore::for_layout(layout);

        let data = match &self.street_data {
            Some(data) => {
                if !store.path().exists() {
                    store.save(data)?;
                }
                Arc::clone(data)
            }
            None => match self.resolve_street_data(&store)? {
                Some(data) => {
                    let data = Arc::new(data);
                    self.street_data = Some(Arc::clone(&data));
                    data
                }
                None => return Ok(InitProgress::Pending),
            },
        };

        let images_dir = match self.config.image_naming {
            ImageNaming::Location => Some(layout.images_dir()),
            ImageNaming::Utm => None,
        };
        self.walker = Some(SampleWalker::new(
            Arc::clone(&data),
            self.georef.as_ref(),
            &self.config,
            images_dir,
        )?);

        info!(
            "Way graph sampling ready: {} walks, {:.0} units of path, about {} samples",
            data.walks.len(),
            data.total_path_length,
            self.estimated_sample_count()
        );
        Ok(InitProgress::Ready)
    }

    fn next_candidate(&mut self) -> Result<CandidateStep, Error> {
        self.walker
            .as_mut()
            .ok_or(Error::UnrecoverableError("way graph strategy used before init"))?
            .next_step()
    }

    fn describe_config(&self) -> JsonValue {
        json!({
            "SampleDistance": self.config.sample_distance,
            "BoundingPolygon": polygon_json(self.bounds.as_ref()),
        })
    }

    fn estimated_sample_count(&self) -> usize {
        self.street_data.as_ref().map_or(0, |data| {
            (data.total_path_length / self.config.sample_distance).floor() as usize
        })
    }
}
