use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::DomainError;

/// Meters per degree of latitude, and of longitude at the equator.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(DomainError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(DomainError::InvalidLongitude(longitude));
        }
        Ok(GeoPoint {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Square-ish box around `center` using a flat-earth meters to degrees conversion.
    ///
    /// Only accurate for buffers of a few kilometers away from the poles. The
    /// box is not wrapped at the antimeridian. Close to a pole the longitude
    /// buffer can exceed 180 degrees, giving a box wider than the whole map;
    /// that is logged and returned as computed.
    pub fn around(center: GeoPoint, buffer_meters: f64) -> Result<Self, DomainError> {
        if !buffer_meters.is_finite() || buffer_meters <= 0.0 {
            return Err(DomainError::InvalidBuffer(buffer_meters));
        }
        if center.latitude.abs() >= 90.0 {
            return Err(DomainError::PolarLatitude(center.latitude));
        }
        let lat_buffer = buffer_meters / METERS_PER_DEGREE;
        let lon_buffer = buffer_meters / (METERS_PER_DEGREE * center.latitude.to_radians().cos());
        if lon_buffer > 180.0 {
            warn!(
                latitude = center.latitude,
                buffer_meters,
                lon_buffer,
                "longitude buffer wider than the map, box spans every longitude"
            );
        }

        Ok(BoundingBox {
            north: center.latitude + lat_buffer,
            south: center.latitude - lat_buffer,
            east: center.longitude + lon_buffer,
            west: center.longitude - lon_buffer,
        })
    }

    pub fn width_degrees(&self) -> f64 {
        self.east - self.west
    }

    pub fn height_degrees(&self) -> f64 {
        self.north - self.south
    }

    /// The box as a closed, counter-clockwise GeoJSON polygon.
    pub fn bounds_polygon(&self) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [self.west, self.south],
                [self.east, self.south],
                [self.east, self.north],
                [self.west, self.north],
                [self.west, self.south],
            ]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_points() {
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(DomainError::InvalidLatitude(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -180.5),
            Err(DomainError::InvalidLongitude(-180.5))
        );
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn san_francisco_box() {
        let center = GeoPoint::new(37.7749, -122.4194).unwrap();
        let bbox = BoundingBox::around(center, 1000.0).unwrap();

        assert!((bbox.north - 37.7839).abs() < 1e-4);
        assert!((bbox.south - 37.7659).abs() < 1e-4);
        assert!((bbox.height_degrees() - 2000.0 / 111_000.0).abs() < 1e-12);
        // longitude degrees shrink with latitude, so the box is wider in degrees
        assert!(bbox.width_degrees() > bbox.height_degrees());
        assert!(bbox.east > center.longitude && bbox.west < center.longitude);
    }

    #[test]
    fn poles_are_rejected() {
        let north_pole = GeoPoint::new(90.0, 0.0).unwrap();
        assert_eq!(
            BoundingBox::around(north_pole, 100.0),
            Err(DomainError::PolarLatitude(90.0))
        );
        let south_pole = GeoPoint::new(-90.0, 45.0).unwrap();
        assert!(matches!(
            BoundingBox::around(south_pole, 100.0),
            Err(DomainError::PolarLatitude(_))
        ));
    }

    #[test]
    fn near_pole_box_is_kept_as_computed() {
        let center = GeoPoint::new(89.9999, 0.0).unwrap();
        let bbox = BoundingBox::around(center, 1000.0).unwrap();

        assert!(bbox.width_degrees() > 360.0);
        assert!((bbox.east + bbox.west).abs() < 1e-9);
        assert!((bbox.height_degrees() - 2000.0 / 111_000.0).abs() < 1e-12);
    }

    #[test]
    fn buffer_must_be_positive() {
        let center = GeoPoint::new(10.0, 10.0).unwrap();
        assert!(BoundingBox::around(center, 0.0).is_err());
        assert!(BoundingBox::around(center, -5.0).is_err());
        assert!(BoundingBox::around(center, f64::INFINITY).is_err());
    }

    #[test]
    fn polygon_ring_is_closed() {
        let bbox = BoundingBox {
            north: 1.0,
            south: -1.0,
            east: 2.0,
            west: -2.0,
        };
        let polygon = bbox.bounds_polygon();
        let ring = polygon["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring[2], json!([2.0, 1.0]));
    }
}
