use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::record::SceneMetadata;

/// Imagery sources the tool knows how to query, in descending resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    WorldView,
    GeoEye,
    SkySat,
    Naip,
    Planet,
    Sentinel,
    Landsat,
}

impl SourceId {
    pub const ALL: [SourceId; 7] = [
        SourceId::WorldView,
        SourceId::GeoEye,
        SourceId::SkySat,
        SourceId::Naip,
        SourceId::Planet,
        SourceId::Sentinel,
        SourceId::Landsat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::WorldView => "worldview",
            SourceId::GeoEye => "geoeye",
            SourceId::SkySat => "skysat",
            SourceId::Naip => "naip",
            SourceId::Planet => "planet",
            SourceId::Sentinel => "sentinel",
            SourceId::Landsat => "landsat",
        }
    }

    pub fn profile(self) -> &'static SourceProfile {
        &PROFILES[self as usize]
    }

    /// Sources finer than 2m, only available in some regions.
    pub fn is_high_res(self) -> bool {
        matches!(
            self,
            SourceId::WorldView | SourceId::GeoEye | SourceId::SkySat | SourceId::Naip
        )
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum DateField {
    Property(&'static str),
    /// First `len` characters of the `segment`-th `_` separated part of a property.
    ProductIdSegment {
        property: &'static str,
        segment: usize,
        len: usize,
    },
}

#[derive(Debug)]
pub struct FieldMap {
    pub date: DateField,
    pub cloud_cover: Option<&'static str>,
    /// `(output key, property)` pairs copied verbatim.
    pub extra: &'static [(&'static str, &'static str)],
    pub dataset_label: Option<&'static str>,
}

/// Band selection and stretch. No bands means the provider's true color default.
#[derive(Debug)]
pub struct Rendering {
    pub bands: &'static [&'static str],
    pub range: Option<(f64, f64)>,
    pub gamma: Option<f64>,
}

const TRUE_COLOR: Rendering = Rendering {
    bands: &[],
    range: None,
    gamma: None,
};

#[derive(Debug)]
pub struct SourceProfile {
    pub id: SourceId,
    pub dataset: &'static str,
    pub resolution: &'static str,
    pub cloud_property: Option<&'static str>,
    pub sort_key: &'static str,
    pub sort_descending: bool,
    /// Archive years queried regardless of the requested dates.
    pub archive_years: Option<(i32, i32)>,
    pub fields: FieldMap,
    pub rendering: Rendering,
}

// Indexed by `SourceId as usize`.
static PROFILES: [SourceProfile; 7] = [
    SourceProfile {
        id: SourceId::WorldView,
        dataset: "WORLDVIEW/WV04/PANSHARPENED",
        resolution: "0.3-0.5m",
        cloud_property: Some("cloud_cover"),
        sort_key: "cloud_cover",
        sort_descending: false,
        archive_years: None,
        fields: FieldMap {
            date: DateField::Property("acquisition_date"),
            cloud_cover: Some("cloud_cover"),
            extra: &[],
            dataset_label: Some("WorldView"),
        },
        rendering: TRUE_COLOR,
    },
    SourceProfile {
        id: SourceId::GeoEye,
        dataset: "GEOEYE/GE01/PANSHARPENED",
        resolution: "0.5m",
        cloud_property: Some("cloud_cover"),
        sort_key: "cloud_cover",
        sort_descending: false,
        archive_years: None,
        fields: FieldMap {
            date: DateField::Property("acquisition_date"),
            cloud_cover: Some("cloud_cover"),
            extra: &[],
            dataset_label: Some("GeoEye-1"),
        },
        rendering: TRUE_COLOR,
    },
    SourceProfile {
        id: SourceId::SkySat,
        dataset: "SKYSAT/GEN-A/PUBLIC/ORTHO/RGB",
        resolution: "0.5-1m",
        cloud_property: Some("CLOUD_COVER"),
        sort_key: "CLOUD_COVER",
        sort_descending: false,
        archive_years: None,
        fields: FieldMap {
            date: DateField::Property("ACQUIRED"),
            cloud_cover: Some("CLOUD_COVER"),
            extra: &[],
            dataset_label: Some("SkySat"),
        },
        rendering: TRUE_COLOR,
    },
    SourceProfile {
        id: SourceId::Naip,
        dataset: "USDA/NAIP/DOQQ",
        resolution: "1m",
        cloud_property: None,
        sort_key: "system:time_start",
        sort_descending: true,
        archive_years: Some((2018, 2022)),
        fields: FieldMap {
            date: DateField::Property("system:time_start"),
            cloud_cover: None,
            extra: &[],
            dataset_label: Some("NAIP"),
        },
        rendering: TRUE_COLOR,
    },
    SourceProfile {
        id: SourceId::Planet,
        dataset: "PLANET/PSScene/Visual",
        resolution: "3-5m",
        cloud_property: Some("cloud_cover"),
        sort_key: "cloud_cover",
        sort_descending: false,
        archive_years: None,
        fields: FieldMap {
            date: DateField::Property("acquired"),
            cloud_cover: Some("cloud_cover"),
            extra: &[],
            dataset_label: Some("PlanetScope"),
        },
        rendering: TRUE_COLOR,
    },
    SourceProfile {
        id: SourceId::Sentinel,
        dataset: "COPERNICUS/S2_SR_HARMONIZED",
        resolution: "10m",
        cloud_property: Some("CLOUDY_PIXEL_PERCENTAGE"),
        sort_key: "CLOUDY_PIXEL_PERCENTAGE",
        sort_descending: false,
        archive_years: None,
        fields: FieldMap {
            // S2A_MSIL2A_20230615T185921_... -> 20230615
            date: DateField::ProductIdSegment {
                property: "PRODUCT_ID",
                segment: 2,
                len: 8,
            },
            cloud_cover: Some("CLOUDY_PIXEL_PERCENTAGE"),
            extra: &[("productId", "PRODUCT_ID")],
            dataset_label: None,
        },
        rendering: Rendering {
            bands: &["B4", "B3", "B2"],
            range: Some((0.0, 3000.0)),
            gamma: Some(1.4),
        },
    },
    SourceProfile {
        id: SourceId::Landsat,
        dataset: "LANDSAT/LC08/C02/T1_L2",
        resolution: "30m",
        cloud_property: Some("CLOUD_COVER"),
        sort_key: "CLOUD_COVER",
        sort_descending: false,
        archive_years: None,
        fields: FieldMap {
            date: DateField::Property("DATE_ACQUIRED"),
            cloud_cover: Some("CLOUD_COVER"),
            extra: &[("sceneId", "LANDSAT_SCENE_ID")],
            dataset_label: None,
        },
        rendering: Rendering {
            bands: &["SR_B4", "SR_B3", "SR_B2"],
            range: Some((0.0, 0.3)),
            gamma: Some(1.4),
        },
    },
];

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|value| !value.is_null()).cloned()
}

impl SourceProfile {
    pub fn extract_metadata(&self, properties: &Map<String, Value>) -> SceneMetadata {
        let date = match self.fields.date {
            DateField::Property(property) => non_null(properties.get(property)),
            DateField::ProductIdSegment {
                property,
                segment,
                len,
            } => properties
                .get(property)
                .and_then(Value::as_str)
                .and_then(|product_id| product_id.split('_').nth(segment))
                .map(|part| Value::String(part.chars().take(len).collect())),
        };
        let cloud_cover = self
            .fields
            .cloud_cover
            .and_then(|property| non_null(properties.get(property)));

        let mut extra = BTreeMap::new();
        for (key, property) in self.fields.extra {
            extra.insert(
                key.to_string(),
                properties.get(*property).cloned().unwrap_or(Value::Null),
            );
        }
        if let Some(label) = self.fields.dataset_label {
            extra.insert("dataset".to_string(), Value::String(label.to_string()));
        }

        SceneMetadata {
            date,
            cloud_cover,
            resolution: self.resolution.to_string(),
            extra,
        }
    }
}
