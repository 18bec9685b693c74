use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

pub mod sources;

pub use sources::{SourceId, SourceProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "high_res")]
    High,
    #[serde(rename = "ultra_high_res")]
    UltraHigh,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 3] = [
        ResolutionTier::Standard,
        ResolutionTier::High,
        ResolutionTier::UltraHigh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionTier::Standard => "standard",
            ResolutionTier::High => "high_res",
            ResolutionTier::UltraHigh => "ultra_high_res",
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "standard" => Ok(ResolutionTier::Standard),
            "high" | "high_res" => Ok(ResolutionTier::High),
            "ultra" | "ultra_high" | "ultra_high_res" => Ok(ResolutionTier::UltraHigh),
            other => {
                let expected: Vec<&str> = ResolutionTier::ALL.iter().map(|tier| tier.as_str()).collect();
                Err(anyhow!(
                    "unknown resolution mode {}, expected one of {}",
                    other,
                    expected.join(", ")
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvalidDateRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    /// January 1st of `first` through December 31st of `last`.
    pub fn calendar_years(first: i32, last: i32) -> Option<Self> {
        Some(DateRange {
            start: NaiveDate::from_ymd_opt(first, 1, 1)?,
            end: NaiveDate::from_ymd_opt(last, 12, 31)?,
        })
    }
}

const fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid calendar date"),
    }
}

const DEFAULT_START: NaiveDate = ymd(2023, 1, 1);
const DEFAULT_END: NaiveDate = ymd(2023, 12, 31);

impl Default for DateRange {
    fn default() -> Self {
        DateRange {
            start: DEFAULT_START,
            end: DEFAULT_END,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudFilter {
    pub property: &'static str,
    /// Scenes must be strictly below this value.
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub key: &'static str,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub id: SourceId,
    pub dataset: &'static str,
    pub expected_resolution: &'static str,
    pub cloud_filter: Option<CloudFilter>,
    pub sort: SortOrder,
    pub date_override: Option<DateRange>,
    /// Global coverage fallback. Its failure fails the whole request.
    pub mandatory: bool,
}

impl SourceSpec {
    fn from_rule(rule: &SourceRule) -> Self {
        let profile = rule.id.profile();
        SourceSpec {
            id: profile.id,
            dataset: profile.dataset,
            expected_resolution: profile.resolution,
            cloud_filter: match (profile.cloud_property, rule.max_cloud_cover) {
                (Some(property), Some(max)) => Some(CloudFilter { property, max }),
                _ => None,
            },
            sort: SortOrder {
                key: profile.sort_key,
                descending: profile.sort_descending,
            },
            date_override: profile
                .archive_years
                .and_then(|(first, last)| DateRange::calendar_years(first, last)),
            mandatory: rule.mandatory,
        }
    }

    pub fn profile(&self) -> &'static SourceProfile {
        self.id.profile()
    }

    /// The fixed archive window wins over whatever the caller asked for.
    pub fn date_range(&self, requested: DateRange) -> DateRange {
        self.date_override.unwrap_or(requested)
    }

    pub fn vis_params(&self, dimension_px: u32) -> VisParams {
        let rendering = &self.profile().rendering;
        VisParams {
            bands: rendering.bands.iter().map(|band| band.to_string()).collect(),
            range: rendering.range,
            gamma: rendering.gamma,
            dimension_px,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisParams {
    /// Empty means the provider's natural color thumbnail.
    pub bands: Vec<String>,
    pub range: Option<(f64, f64)>,
    pub gamma: Option<f64>,
    pub dimension_px: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    pub tier: ResolutionTier,
    pub effective_buffer: f64,
    pub effective_zoom: u8,
    pub sources: Vec<SourceSpec>,
    pub output_dimension_px: u32,
}

struct SourceRule {
    id: SourceId,
    max_cloud_cover: Option<f64>,
    mandatory: bool,
}

const fn optional(id: SourceId, max_cloud_cover: Option<f64>) -> SourceRule {
    SourceRule {
        id,
        max_cloud_cover,
        mandatory: false,
    }
}

const fn mandatory(id: SourceId, max_cloud_cover: f64) -> SourceRule {
    SourceRule {
        id,
        max_cloud_cover: Some(max_cloud_cover),
        mandatory: true,
    }
}

struct TierRule {
    max_buffer: Option<f64>,
    min_zoom: Option<u8>,
    dimension_px: u32,
    sources: &'static [SourceRule],
}

static STANDARD: TierRule = TierRule {
    max_buffer: None,
    min_zoom: None,
    dimension_px: 512,
    sources: &[
        mandatory(SourceId::Landsat, 20.0),
        mandatory(SourceId::Sentinel, 20.0),
    ],
};

static HIGH: TierRule = TierRule {
    max_buffer: Some(200.0),
    min_zoom: Some(18),
    dimension_px: 1024,
    sources: &[
        optional(SourceId::Naip, None),
        optional(SourceId::Planet, Some(0.1)),
        mandatory(SourceId::Sentinel, 10.0),
        mandatory(SourceId::Landsat, 10.0),
    ],
};

static ULTRA_HIGH: TierRule = TierRule {
    max_buffer: Some(50.0),
    min_zoom: Some(20),
    dimension_px: 2048,
    sources: &[
        optional(SourceId::WorldView, Some(5.0)),
        optional(SourceId::GeoEye, Some(5.0)),
        optional(SourceId::SkySat, Some(5.0)),
        optional(SourceId::Naip, None),
        mandatory(SourceId::Sentinel, 5.0),
    ],
};

fn tier_rule(tier: ResolutionTier) -> &'static TierRule {
    match tier {
        ResolutionTier::Standard => &STANDARD,
        ResolutionTier::High => &HIGH,
        ResolutionTier::UltraHigh => &ULTRA_HIGH,
    }
}

/// Tightens buffer and zoom for the tier and lists the sources to query, best first.
pub fn resolve_policy(
    tier: ResolutionTier,
    requested_buffer: f64,
    requested_zoom: u8,
) -> ResolvedPolicy {
    let rule = tier_rule(tier);
    let effective_buffer = match rule.max_buffer {
        Some(max_buffer) => requested_buffer.min(max_buffer),
        None => requested_buffer,
    };
    let effective_zoom = match rule.min_zoom {
        Some(min_zoom) => requested_zoom.max(min_zoom),
        None => requested_zoom,
    };

    ResolvedPolicy {
        tier,
        effective_buffer,
        effective_zoom,
        sources: rule.sources.iter().map(SourceSpec::from_rule).collect(),
        output_dimension_px: rule.dimension_px,
    }
}
