//! Overpass API JSON schema.
//!
//! Elements are decoded one at a time so a single malformed record is
//! skipped instead of failing the whole document.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OverpassElement {
    pub fn is_node(&self) -> bool {
        self.element_type == "node"
    }

    pub fn is_way(&self) -> bool {
        self.element_type == "way"
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

impl OverpassResponse {
    /// Parses an Overpass JSON document, dropping elements that do not match
    /// the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the document itself is not JSON or has no
    /// `elements` array.
    pub fn from_json_str(content: &str) -> Result<Self, Error> {
        let document: JsonValue = serde_json::from_str(content)?;
        let Some(raw_elements) = document.get("elements").and_then(JsonValue::as_array) else {
            return Err(Error::InvalidData(
                "Overpass document has no `elements` array".to_string(),
            ));
        };

        let mut skipped = 0usize;
        let elements = raw_elements
            .iter()
            .filter_map(|raw| match OverpassElement::deserialize(raw) {
                Ok(element) => Some(element),
                Err(e) => {
                    skipped += 1;
                    log::trace!("Skipping malformed Overpass element: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();

        if skipped > 0 {
            log::warn!("Skipped {skipped} malformed Overpass elements");
        }

        Ok(Self { elements })
    }
}
