use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use crate::collector::{collect, AreaRequest};
use crate::earth_engine::ImageCatalog;
use crate::geo::GeoPoint;
use crate::policy::{DateRange, ResolutionTier, SourceId};

pub struct SurveyLocation {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub expected: &'static [SourceId],
}

const GLOBAL_SOURCES: &[SourceId] = &[SourceId::Sentinel, SourceId::Landsat];

pub static GLOBAL: [SurveyLocation; 8] = [
    SurveyLocation {
        name: "New York City, USA",
        latitude: 40.7128,
        longitude: -74.0060,
        expected: &[
            SourceId::Naip,
            SourceId::Sentinel,
            SourceId::Landsat,
            SourceId::WorldView,
        ],
    },
    SurveyLocation {
        name: "Beijing, China",
        latitude: 39.9042,
        longitude: 116.4074,
        expected: GLOBAL_SOURCES,
    },
    SurveyLocation {
        name: "London, UK",
        latitude: 51.5074,
        longitude: -0.1278,
        expected: GLOBAL_SOURCES,
    },
    SurveyLocation {
        name: "São Paulo, Brazil",
        latitude: -23.5505,
        longitude: -46.6333,
        expected: GLOBAL_SOURCES,
    },
    SurveyLocation {
        name: "Nairobi, Kenya",
        latitude: -1.2921,
        longitude: 36.8219,
        expected: GLOBAL_SOURCES,
    },
    SurveyLocation {
        name: "Sydney, Australia",
        latitude: -33.8688,
        longitude: 151.2093,
        expected: GLOBAL_SOURCES,
    },
    SurveyLocation {
        name: "Tokyo, Japan",
        latitude: 35.6762,
        longitude: 139.6503,
        expected: GLOBAL_SOURCES,
    },
    SurveyLocation {
        name: "Remote Pacific Island",
        latitude: -15.0,
        longitude: -140.0,
        expected: GLOBAL_SOURCES,
    },
];

const SF_SOURCES: &[SourceId] = &[SourceId::Naip, SourceId::Sentinel, SourceId::Landsat];

pub static SF_LANDMARKS: [SurveyLocation; 4] = [
    SurveyLocation {
        name: "Financial District",
        latitude: 37.7749,
        longitude: -122.4194,
        expected: SF_SOURCES,
    },
    SurveyLocation {
        name: "Golden Gate Park",
        latitude: 37.7694,
        longitude: -122.4862,
        expected: SF_SOURCES,
    },
    SurveyLocation {
        name: "Lombard Street",
        latitude: 37.8021,
        longitude: -122.4187,
        expected: SF_SOURCES,
    },
    SurveyLocation {
        name: "Pier 39",
        latitude: 37.8087,
        longitude: -122.4098,
        expected: SF_SOURCES,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyPreset {
    Global,
    Landmarks,
}

impl SurveyPreset {
    pub fn locations(self) -> &'static [SurveyLocation] {
        match self {
            SurveyPreset::Global => &GLOBAL,
            SurveyPreset::Landmarks => &SF_LANDMARKS,
        }
    }
}

impl FromStr for SurveyPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(SurveyPreset::Global),
            "landmarks" | "sf" => Ok(SurveyPreset::Landmarks),
            other => Err(anyhow!(
                "unknown survey {}, expected global or landmarks",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyResult {
    pub name: &'static str,
    /// `None` when the location could not be collected.
    pub available: Option<Vec<SourceId>>,
}

impl SurveyResult {
    pub fn high_res(&self) -> Vec<SourceId> {
        self.available
            .iter()
            .flatten()
            .copied()
            .filter(|id| id.is_high_res())
            .collect()
    }
}

pub struct SurveyOptions {
    pub tier: ResolutionTier,
    pub buffer_meters: f64,
    pub zoom: u8,
    pub dates: DateRange,
    pub tile_url: String,
    pub deadline: Duration,
}

/// Collects each preset location in turn. A failing location is logged and the survey moves on.
pub async fn survey<C: ImageCatalog>(
    catalog: &C,
    preset: SurveyPreset,
    options: &SurveyOptions,
) -> Result<Vec<SurveyResult>> {
    let mut results = Vec::new();
    for location in preset.locations() {
        let span = info_span!("survey", location = location.name);
        let result = survey_location(catalog, location, options)
            .instrument(span)
            .await;
        results.push(result);
    }

    let reachable = results.iter().filter(|r| r.available.is_some()).count();
    info!(
        locations = results.len(),
        reachable,
        "finished survey"
    );
    Ok(results)
}

async fn survey_location<C: ImageCatalog>(
    catalog: &C,
    location: &SurveyLocation,
    options: &SurveyOptions,
) -> SurveyResult {
    let center = match GeoPoint::new(location.latitude, location.longitude) {
        Ok(center) => center,
        Err(err) => {
            warn!(error = %err, "invalid survey location");
            return SurveyResult {
                name: location.name,
                available: None,
            };
        }
    };
    let request = AreaRequest {
        center,
        buffer_meters: options.buffer_meters,
        zoom: options.zoom,
        tier: options.tier,
        dates: options.dates,
        tile_url: options.tile_url.clone(),
    };

    match collect(catalog, &request, options.deadline).await {
        Ok(record) => {
            let available: Vec<SourceId> = record.image_urls.keys().copied().collect();
            let missing: Vec<SourceId> = location
                .expected
                .iter()
                .copied()
                .filter(|id| !available.contains(id))
                .collect();
            let result = SurveyResult {
                name: location.name,
                available: Some(available),
            };
            info!(
                available = ?result.available,
                expected = ?location.expected,
                missing = ?missing,
                high_res = ?result.high_res(),
                "surveyed location"
            );
            result
        }
        Err(err) => {
            warn!(error = %err, "failed to survey location");
            SurveyResult {
                name: location.name,
                available: None,
            }
        }
    }
}
