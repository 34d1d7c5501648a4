use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    model::{Georeference, RoadGraph, Walk},
    routing::{solve_route_cover, total_walk_length},
};

pub const STREET_DATA_FILE: &str = "StreetDataCache.json";
pub const SAMPLES_FILE: &str = "Samples.json";
pub const IMAGES_DIR: &str = "Images";

/// On-disk layout of one sampling session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    session_dir: PathBuf,
}

impl SessionLayout {
    /// Session directory `root/config_name`
    pub fn new(root: impl AsRef<Path>, config_name: &str) -> Self {
        Self {
            session_dir: root.as_ref().join(config_name),
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.session_dir.join(IMAGES_DIR)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.session_dir.join(SAMPLES_FILE)
    }

    pub fn street_data_path(&self) -> PathBuf {
        self.session_dir.join(STREET_DATA_FILE)
    }

    /// Creates the session and image directories
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create_dirs(&self) -> Result<(), Error> {
        fs::create_dir_all(self.images_dir())?;
        Ok(())
    }

    /// `path` relative to the session directory as `./a/b`, or the full
    /// path if it lies elsewhere
    pub fn relative_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.session_dir) {
            Ok(relative) => {
                let parts = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>();
                format!("./{}", parts.join("/"))
            }
            Err(_) => path.display().to_string(),
        }
    }
}

/// Road graph plus its route-covering walks, cached per session so that a
/// resumed session replays identical candidate locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreetData {
    pub graph: RoadGraph,
    #[serde(rename = "Paths")]
    pub walks: Vec<Walk>,
    pub total_path_length: f64,
}

impl StreetData {
    /// Solves the route cover of `graph` and measures its length
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is inconsistent.
    pub fn solve(graph: RoadGraph, georef: &dyn Georeference) -> Result<Self, Error> {
        let walks = solve_route_cover(&graph, georef)?;
        let total_path_length = total_walk_length(&graph, &walks, georef)?;
        Ok(Self {
            graph,
            walks,
            total_path_length,
        })
    }
}

/// Reads and writes the street data cache file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_layout(layout: &SessionLayout) -> Self {
        Self::new(layout.street_data_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cache. A missing file is `Ok(None)`; an unreadable or
    /// corrupt one is logged and also treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures other than a missing file.
    pub fn load(&self) -> Result<Option<StreetData>, Error> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<StreetData>(&content) {
            Ok(data) => {
                info!(
                    "Loaded street data cache {} ({} nodes, {} walks)",
                    self.path.display(),
                    data.graph.node_count(),
                    data.walks.len()
                );
                Ok(Some(data))
            }
            Err(e) => {
                warn!(
                    "Ignoring unreadable street data cache {}: {e}",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    /// Writes the cache atomically (temporary file + rename)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, data: &StreetData) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temporary = self.path.with_extension("json.tmp");
        fs::write(&temporary, serde_json::to_vec(data)?)?;
        fs::rename(&temporary, &self.path)?;
        info!("Saved street data cache {}", self.path.display());
        Ok(())
    }

    /// Returns the cached street data, or builds and caches it
    ///
    /// # Errors
    ///
    /// Propagates errors of `build` and of writing the cache.
    pub fn load_or_build<F>(&self, build: F) -> Result<StreetData, Error>
    where
        F: FnOnce() -> Result<StreetData, Error>,
    {
        if let Some(data) = self.load()? {
            return Ok(data);
        }
        let data = build()?;
        self.save(&data)?;
        Ok(data)
    }
}
