use thiserror::Error;

use crate::NodeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid node index: {0}")]
    InvalidNodeIndex(NodeId),
    #[error("Nodes {a} and {b} are not connected")]
    EdgeNotFound { a: NodeId, b: NodeId },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("No map data: {0}")]
    NoData(String),
    #[error("Capture resources unavailable: {0}")]
    CaptureResource(String),
    #[error("Metadata write failed: {0}")]
    MetadataWrite(String),
    #[error("Unrecoverable error: {0}")]
    UnrecoverableError(&'static str),
}
