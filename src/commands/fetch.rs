use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::collector::{collect, AreaRequest};
use crate::download::{build_client, download_record_images};
use crate::earth_engine::ImageCatalog;
use crate::policy::SourceId;
use crate::record::{save_record, ImageryRecord};

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub output_dir: PathBuf,
    pub save: bool,
    pub download: bool,
    /// File name prefix of downloaded images.
    pub prefix: String,
}

/// Scene counts of every queried source, finest source first.
pub fn source_counts(record: &ImageryRecord) -> Vec<(SourceId, usize)> {
    SourceId::ALL
        .iter()
        .filter_map(|&id| record.collection_count(id).map(|count| (id, count)))
        .collect()
}

pub fn log_summary(record: &ImageryRecord) {
    for (source, count) in source_counts(record) {
        info!(source = %source, count, "matching scenes");
    }
    let datasets: Vec<&str> = record.image_urls.keys().map(|id| id.as_str()).collect();
    info!(
        mode = %record.configuration.resolution_mode,
        buffer = record.location.buffer_size_meters,
        zoom = record.configuration.zoom_level,
        dimension = record.configuration.output_dimension_px,
        tiles = record.tiles_info.tile_count,
        datasets = ?datasets,
        best_resolution = record.best_resolution().unwrap_or("none"),
        "collected imagery"
    );
}

pub async fn fetch<C: ImageCatalog>(
    catalog: &C,
    request: &AreaRequest,
    deadline: Duration,
    output: &OutputOptions,
) -> Result<ImageryRecord> {
    let record = collect(catalog, request, deadline)
        .await
        .with_context(|| format!("failed to collect {} imagery", request.tier))?;
    log_summary(&record);

    if output.save {
        let path = save_record(&record, &output.output_dir)?;
        println!("{}", path.display());
    }

    if output.download {
        let client = build_client()?;
        let reports =
            download_record_images(&client, &record, &output.output_dir, &output.prefix).await?;
        for report in reports {
            match report.result {
                Ok(bytes) => {
                    info!(source = %report.source, bytes, path = %report.path.display(), "downloaded image");
                    println!("{}", report.path.display());
                }
                Err(err) => warn!(source = %report.source, error = %err, "skipped image"),
            }
        }
    }
    Ok(record)
}
