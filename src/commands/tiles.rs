use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use tracing::info;

use crate::geo::GeoPoint;
use crate::tiles::{compute_tiles, TilesInfo};

/// Writes the tile grid covering the area as JSON to `path`, or stdout when `path` is `-`.
pub fn dump_tiles(
    center: GeoPoint,
    buffer_meters: f64,
    zoom: u8,
    tile_url: &str,
    path: &str,
) -> Result<TilesInfo> {
    let tiles_info = compute_tiles(center, buffer_meters, zoom, tile_url)?;
    let json = serde_json::to_string_pretty(&tiles_info)?;
    info!("writing {} tiles to {}", tiles_info.tile_count, path);
    if path == "-" {
        println!("{}", json);
    } else {
        let mut file = File::create(path).with_context(|| format!("failed to create {}", path))?;
        write!(file, "{}", json)?;
    }
    Ok(tiles_info)
}
