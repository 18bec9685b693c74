use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, instrument};

use crate::error::DomainError;
use crate::geo::{BoundingBox, GeoPoint};

pub const MAX_ZOOM: u8 = 22;
/// Latitude where the Web Mercator projection is cut off.
pub const MERCATOR_MAX_LAT: f64 = 85.05112878;
pub static DEFAULT_TILE_URL: &str = "https://mt1.google.com/vt/lyrs=s&x={x}&y={y}&z={z}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilesInfo {
    pub zoom_level: u8,
    pub bounding_box: BoundingBox,
    pub tile_count: usize,
    pub tiles: Vec<Tile>,
}

/// Slippy-map tile containing `(lat, lon)` at `zoom`.
///
/// Latitude is clamped to the Mercator limit and the result to `[0, 2^zoom)`,
/// so points on the edge of the map (e.g. `lon = 180`) land on the last tile.
pub fn deg2tile(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let n = 2.0_f64.powi(zoom as i32);
    let max_index = n - 1.0;
    let lat_rad = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();

    (x.clamp(0.0, max_index) as u32, y.clamp(0.0, max_index) as u32)
}

/// Fills the `{x}`, `{y}` and `{z}` placeholders of a tile URL template.
pub fn tile_url(template: &str, x: u32, y: u32, z: u8) -> String {
    template
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
        .replace("{z}", &z.to_string())
}

/// Bounding box around `center` and every tile covering it at `zoom`.
///
/// Near the poles the box can span every longitude, in which case the grid
/// holds a full row of `2^zoom` tiles (262,144 at zoom 18).
#[instrument(level = "debug", skip(url_template))]
pub fn compute_tiles(
    center: GeoPoint,
    buffer_meters: f64,
    zoom: u8,
    url_template: &str,
) -> Result<TilesInfo, DomainError> {
    if zoom > MAX_ZOOM {
        return Err(DomainError::InvalidZoom(zoom));
    }
    let bounding_box = BoundingBox::around(center, buffer_meters)?;

    // tile y grows southward, so the south-west corner gives y_max
    let (x_min, y_max) = deg2tile(bounding_box.south, bounding_box.west, zoom);
    let (x_max, y_min) = deg2tile(bounding_box.north, bounding_box.east, zoom);

    let tiles: Vec<Tile> = (x_min..=x_max)
        .flat_map(|x| {
            (y_min..=y_max).map(move |y| Tile {
                x,
                y,
                z: zoom,
                url: tile_url(url_template, x, y, zoom),
            })
        })
        .collect();
    debug!(x_min, x_max, y_min, y_max, count = tiles.len(), "computed tile grid");

    Ok(TilesInfo {
        zoom_level: zoom,
        bounding_box,
        tile_count: tiles.len(),
        tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf() -> GeoPoint {
        GeoPoint::new(37.7749, -122.4194).unwrap()
    }

    #[test]
    fn san_francisco_at_zoom_12() {
        let info = compute_tiles(sf(), 1000.0, 12, DEFAULT_TILE_URL).unwrap();

        assert_eq!(info.zoom_level, 12);
        assert!((info.bounding_box.north - 37.7839).abs() < 1e-4);
        assert!((info.bounding_box.south - 37.7659).abs() < 1e-4);
        assert!(info.tile_count > 0);
        assert_eq!(info.tile_count, info.tiles.len());
        // downtown SF sits in tile 655/1583 at z12
        assert!(info.tiles.iter().any(|tile| tile.x == 655 && tile.y == 1583));
    }

    #[test]
    fn known_tile_for_new_york() {
        assert_eq!(deg2tile(40.7128, -74.0060, 16), (19295, 24640));
    }

    #[test]
    fn cardinality_matches_rectangle_and_indices_are_in_range() {
        let centers = [
            (37.7749, -122.4194),
            (-33.8688, 151.2093),
            (51.5074, -0.1278),
            (-1.2921, 36.8219),
            (84.9, 179.99),
            (-84.9, -179.99),
        ];
        for (lat, lon) in centers {
            for zoom in [0u8, 1, 5, 12, 17] {
                let info =
                    compute_tiles(GeoPoint::new(lat, lon).unwrap(), 2500.0, zoom, "{z}/{x}/{y}")
                        .unwrap();
                let x_min = info.tiles.iter().map(|t| t.x).min().unwrap();
                let x_max = info.tiles.iter().map(|t| t.x).max().unwrap();
                let y_min = info.tiles.iter().map(|t| t.y).min().unwrap();
                let y_max = info.tiles.iter().map(|t| t.y).max().unwrap();
                let expected = ((x_max - x_min + 1) * (y_max - y_min + 1)) as usize;
                assert_eq!(info.tile_count, expected, "lat {} lon {} z {}", lat, lon, zoom);

                let limit = 1u64 << zoom;
                assert!(info
                    .tiles
                    .iter()
                    .all(|t| (t.x as u64) < limit && (t.y as u64) < limit && t.z == zoom));
            }
        }
    }

    #[test]
    fn deg2tile_is_monotonic() {
        for zoom in [3u8, 10, 18, 22] {
            let mut previous_x = 0;
            let mut lon = -180.0;
            while lon <= 180.0 {
                let (x, _) = deg2tile(10.0, lon, zoom);
                assert!(x >= previous_x);
                previous_x = x;
                lon += 0.37;
            }

            let mut previous_y = u32::MAX;
            let mut lat = -89.5;
            while lat <= 89.5 {
                let (_, y) = deg2tile(lat, 10.0, zoom);
                assert!(y <= previous_y, "y increased going north at lat {}", lat);
                previous_y = y;
                lat += 0.29;
            }
        }
    }

    #[test]
    fn map_edges_stay_inside_the_grid() {
        assert_eq!(deg2tile(0.0, 180.0, 4), (15, 8));
        assert_eq!(deg2tile(0.0, -180.0, 4), (0, 8));
        assert_eq!(deg2tile(89.9, 0.0, 4).1, 0);
        assert_eq!(deg2tile(-89.9, 0.0, 4).1, 15);
        assert_eq!(deg2tile(45.0, 45.0, 0), (0, 0));
    }

    #[test]
    fn tiles_carry_filled_url() {
        let info = compute_tiles(sf(), 100.0, 18, DEFAULT_TILE_URL).unwrap();
        let tile = &info.tiles[0];
        assert_eq!(
            tile.url,
            format!(
                "https://mt1.google.com/vt/lyrs=s&x={}&y={}&z=18",
                tile.x, tile.y
            )
        );
    }

    #[test]
    fn tiles_are_ordered_x_major() {
        let info = compute_tiles(sf(), 1000.0, 16, DEFAULT_TILE_URL).unwrap();
        let coords: Vec<(u32, u32)> = info.tiles.iter().map(|t| (t.x, t.y)).collect();
        let mut sorted = coords.clone();
        sorted.sort();
        assert_eq!(coords, sorted);
    }

    #[test]
    fn invalid_zoom_is_a_domain_error() {
        assert_eq!(
            compute_tiles(sf(), 1000.0, 23, DEFAULT_TILE_URL),
            Err(DomainError::InvalidZoom(23))
        );
    }

    #[test]
    fn near_pole_grid_is_one_full_row() {
        let center = GeoPoint::new(89.9999, 0.0).unwrap();
        let info = compute_tiles(center, 1000.0, 10, DEFAULT_TILE_URL).unwrap();

        assert_eq!(info.tile_count, 1024);
        assert!(info.tiles.iter().all(|tile| tile.y == 0 && tile.x < 1024));
        assert!(info.bounding_box.east > 180.0);
    }

    #[test]
    fn polar_latitude_is_a_domain_error() {
        let pole = GeoPoint::new(90.0, -122.0).unwrap();
        assert_eq!(
            compute_tiles(pole, 1000.0, 12, DEFAULT_TILE_URL),
            Err(DomainError::PolarLatitude(90.0))
        );
        let pole = GeoPoint::new(-90.0, 0.0).unwrap();
        assert!(matches!(
            compute_tiles(pole, 1000.0, 12, DEFAULT_TILE_URL),
            Err(DomainError::PolarLatitude(_))
        ));
    }
}
