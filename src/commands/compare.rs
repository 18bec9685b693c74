use anyhow::Result;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use super::fetch::{fetch, OutputOptions};
use crate::collector::AreaRequest;
use crate::earth_engine::ImageCatalog;
use crate::geo::GeoPoint;
use crate::policy::{DateRange, ResolutionTier};

pub struct TierPreset {
    pub tier: ResolutionTier,
    pub buffer_meters: f64,
    pub zoom: u8,
}

pub const TIER_PRESETS: [TierPreset; 3] = [
    TierPreset {
        tier: ResolutionTier::Standard,
        buffer_meters: 500.0,
        zoom: 12,
    },
    TierPreset {
        tier: ResolutionTier::High,
        buffer_meters: 100.0,
        zoom: 18,
    },
    TierPreset {
        tier: ResolutionTier::UltraHigh,
        buffer_meters: 25.0,
        zoom: 21,
    },
];

/// Collects every tier at `center` with its preset area. Returns how many tiers succeeded.
pub async fn compare<C: ImageCatalog>(
    catalog: &C,
    center: GeoPoint,
    dates: DateRange,
    tile_url: &str,
    deadline: Duration,
    output: &OutputOptions,
) -> Result<usize> {
    let mut succeeded = 0;
    for preset in TIER_PRESETS.iter() {
        let request = AreaRequest {
            center,
            buffer_meters: preset.buffer_meters,
            zoom: preset.zoom,
            tier: preset.tier,
            dates,
            tile_url: tile_url.to_string(),
        };
        let span = info_span!("compare", tier = %preset.tier);
        match fetch(catalog, &request, deadline, output).instrument(span).await {
            Ok(record) => {
                succeeded += 1;
                info!(
                    tier = %preset.tier,
                    sources = record.image_urls.len(),
                    best_resolution = record.best_resolution().unwrap_or("none"),
                    "tier complete"
                );
            }
            Err(err) => warn!(tier = %preset.tier, error = %format!("{:#}", err), "tier failed"),
        }
    }
    info!(succeeded, tiers = TIER_PRESETS.len(), "finished comparison");
    Ok(succeeded)
}
