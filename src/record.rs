use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::policy::{ResolutionTier, SourceId};
use crate::tiles::TilesInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    pub date: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<Value>,
    pub resolution: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub buffer_size_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub resolution_mode: ResolutionTier,
    pub zoom_level: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_dimension_px: u32,
}

/// Everything collected for one location and resolution tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageryRecord {
    pub timestamp: NaiveDateTime,
    pub location: Location,
    pub configuration: Configuration,
    pub tiles_info: TilesInfo,
    pub image_urls: BTreeMap<SourceId, String>,
    pub metadata: BTreeMap<SourceId, SceneMetadata>,
    /// `<source>_count` to the number of scenes that passed the source's filters.
    pub image_collections_info: BTreeMap<String, usize>,
}

impl ImageryRecord {
    pub fn collection_count(&self, id: SourceId) -> Option<usize> {
        self.image_collections_info
            .get(&count_key(id))
            .copied()
    }

    /// Finest resolution label among the sources that produced a scene.
    pub fn best_resolution(&self) -> Option<&str> {
        // metadata is keyed by SourceId, which is ordered finest first
        self.metadata
            .values()
            .next()
            .map(|metadata| metadata.resolution.as_str())
    }
}

pub fn count_key(id: SourceId) -> String {
    format!("{}_count", id)
}

/// Writes `record` as pretty JSON under `<output_dir>/data/` and returns the path.
pub fn save_record(record: &ImageryRecord, output_dir: &Path) -> Result<PathBuf> {
    let data_dir = output_dir.join("data");
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let path = data_dir.join(format!(
        "earth_engine_data_{}_{}.json",
        record.configuration.resolution_mode,
        record.timestamp.format("%Y%m%d_%H%M%S")
    ));
    let mut file = File::create(&path)?;
    write!(file, "{}", serde_json::to_string_pretty(record)?)?;
    info!(path = %path.display(), "saved imagery record");
    Ok(path)
}

pub fn load_record(path: &Path) -> Result<ImageryRecord> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("failed to deserialize {}", path.display()))
}
