use chrono::Local;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use crate::earth_engine::{ImageCatalog, Scene, SourceQuery, ThumbnailRequest};
use crate::error::{CollectError, ProviderError};
use crate::geo::{BoundingBox, GeoPoint};
use crate::policy::{resolve_policy, DateRange, ResolutionTier, SourceSpec};
use crate::record::{count_key, Configuration, ImageryRecord, Location};
use crate::tiles::compute_tiles;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct AreaRequest {
    pub center: GeoPoint,
    pub buffer_meters: f64,
    pub zoom: u8,
    pub tier: ResolutionTier,
    pub dates: DateRange,
    pub tile_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundScene {
    pub scene: Scene,
    pub url: String,
    pub count: usize,
}

/// `Ok(None)` is a source with no matching scene, `Err` a source that could not be queried.
pub type SourceLookup = Result<Option<FoundScene>, ProviderError>;

async fn find_scene<C: ImageCatalog>(
    catalog: &C,
    spec: &SourceSpec,
    region: BoundingBox,
    dates: DateRange,
    dimension_px: u32,
) -> SourceLookup {
    let query = SourceQuery::new(spec, region, dates);
    let result = catalog.search(&query).await?;
    let scene = match result.best {
        Some(scene) => scene,
        None => {
            info!("no scene matched filters");
            return Ok(None);
        }
    };

    let request = ThumbnailRequest {
        source: spec.id,
        region,
        vis: spec.vis_params(dimension_px),
    };
    let url = catalog.thumbnail_url(&scene, &request).await?;
    Ok(Some(FoundScene {
        scene,
        url,
        count: result.count,
    }))
}

/// Looks up one source, giving up at `expires`. An expired lookup is a provider failure of that source only.
#[instrument(skip(catalog, spec, region, expires), fields(source = %spec.id))]
async fn lookup<C: ImageCatalog>(
    catalog: &C,
    spec: &SourceSpec,
    region: BoundingBox,
    dates: DateRange,
    dimension_px: u32,
    expires: Instant,
    deadline: Duration,
) -> SourceLookup {
    timeout_at(
        expires,
        find_scene(catalog, spec, region, dates, dimension_px),
    )
    .await
    .map_err(|_| ProviderError::Timeout(deadline))?
}

/// Queries every source of the tier concurrently and merges the results with the tile grid.
///
/// Every lookup shares one deadline. Optional sources that fail or run out of
/// time are logged and left out of the record. A failing mandatory source
/// fails the request.
#[instrument(skip(catalog, request), fields(tier = %request.tier, lat = request.center.latitude, lon = request.center.longitude))]
pub async fn collect<C: ImageCatalog>(
    catalog: &C,
    request: &AreaRequest,
    deadline: Duration,
) -> Result<ImageryRecord, CollectError> {
    let policy = resolve_policy(request.tier, request.buffer_meters, request.zoom);
    let tiles_info = compute_tiles(
        request.center,
        policy.effective_buffer,
        policy.effective_zoom,
        &request.tile_url,
    )?;
    info!(
        tier = %policy.tier,
        buffer = policy.effective_buffer,
        zoom = policy.effective_zoom,
        tiles = tiles_info.tile_count,
        sources = policy.sources.len(),
        "resolved policy"
    );

    let region = tiles_info.bounding_box;
    let expires = Instant::now() + deadline;
    let lookups = policy.sources.iter().map(|spec| {
        lookup(
            catalog,
            spec,
            region,
            request.dates,
            policy.output_dimension_px,
            expires,
            deadline,
        )
    });
    let outcomes = join_all(lookups).await;

    let mut image_urls = BTreeMap::new();
    let mut metadata = BTreeMap::new();
    let mut image_collections_info = BTreeMap::new();
    for (spec, outcome) in policy.sources.iter().zip(outcomes) {
        match outcome {
            Ok(Some(found)) => {
                info!(
                    source = %spec.id,
                    scene = %found.scene.id,
                    count = found.count,
                    resolution = spec.expected_resolution,
                    "selected scene"
                );
                metadata.insert(
                    spec.id,
                    spec.profile().extract_metadata(&found.scene.properties),
                );
                image_urls.insert(spec.id, found.url);
                image_collections_info.insert(count_key(spec.id), found.count);
            }
            Ok(None) => {
                image_collections_info.insert(count_key(spec.id), 0);
            }
            Err(error) if spec.mandatory => {
                return Err(CollectError::MandatoryProviderFailure {
                    source_id: spec.id,
                    error,
                });
            }
            Err(error) => {
                warn!(source = %spec.id, error = %error, "optional source unavailable, skipping");
            }
        }
    }

    Ok(ImageryRecord {
        timestamp: Local::now().naive_local(),
        location: Location {
            latitude: request.center.latitude,
            longitude: request.center.longitude,
            buffer_size_meters: policy.effective_buffer,
        },
        configuration: Configuration {
            resolution_mode: request.tier,
            zoom_level: policy.effective_zoom,
            start_date: request.dates.start,
            end_date: request.dates.end,
            output_dimension_px: policy.output_dimension_px,
        },
        tiles_info,
        image_urls,
        metadata,
        image_collections_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::earth_engine::SearchResult;
    use crate::error::DomainError;
    use crate::policy::SourceId;
    use crate::tiles::DEFAULT_TILE_URL;
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Behavior {
        Scenes(Vec<Value>),
        NotFound,
        BrokenThumbnail,
        Hang,
    }

    #[derive(Default)]
    struct FakeCatalog {
        behaviors: HashMap<SourceId, Behavior>,
        queries: Mutex<Vec<SourceQuery>>,
    }

    impl FakeCatalog {
        fn with(mut self, id: SourceId, behavior: Behavior) -> Self {
            self.behaviors.insert(id, behavior);
            self
        }
    }

    fn scene_for(id: SourceId, n: usize, properties: &Value) -> Scene {
        Scene {
            id: format!("{}/{}", id, n),
            properties: properties.as_object().cloned().unwrap_or_else(Map::new),
        }
    }

    impl ImageCatalog for FakeCatalog {
        async fn search(&self, query: &SourceQuery) -> Result<SearchResult, ProviderError> {
            self.queries.lock().unwrap().push(query.clone());
            match self.behaviors.get(&query.source) {
                None => Ok(SearchResult {
                    best: None,
                    count: 0,
                }),
                Some(Behavior::NotFound) => {
                    Err(ProviderError::DatasetNotFound(query.dataset.to_string()))
                }
                Some(Behavior::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::InvalidResponse("unreachable".to_string()))
                }
                Some(Behavior::BrokenThumbnail) => Ok(SearchResult {
                    best: Some(scene_for(query.source, 0, &json!({}))),
                    count: 1,
                }),
                Some(Behavior::Scenes(scenes)) => Ok(SearchResult {
                    best: scenes.first().map(|p| scene_for(query.source, 0, p)),
                    count: scenes.len(),
                }),
            }
        }

        async fn thumbnail_url(
            &self,
            scene: &Scene,
            request: &ThumbnailRequest,
        ) -> Result<String, ProviderError> {
            if let Some(Behavior::BrokenThumbnail) = self.behaviors.get(&request.source) {
                return Err(ProviderError::InvalidResponse(
                    "Missing name in thumbnail response".to_string(),
                ));
            }
            Ok(format!(
                "https://thumbs.test/{}?px={}",
                scene.id, request.vis.dimension_px
            ))
        }
    }

    fn request(tier: ResolutionTier) -> AreaRequest {
        AreaRequest {
            center: GeoPoint::new(37.7749, -122.4194).unwrap(),
            buffer_meters: 1000.0,
            zoom: 12,
            tier,
            dates: DateRange::default(),
            tile_url: DEFAULT_TILE_URL.to_string(),
        }
    }

    #[tokio::test]
    async fn standard_record_merges_both_sources() {
        let catalog = FakeCatalog::default()
            .with(
                SourceId::Landsat,
                Behavior::Scenes(vec![
                    json!({ "DATE_ACQUIRED": "2023-06-02", "CLOUD_COVER": 1.5, "LANDSAT_SCENE_ID": "LC8" }),
                    json!({ "CLOUD_COVER": 7.0 }),
                ]),
            )
            .with(
                SourceId::Sentinel,
                Behavior::Scenes(vec![json!({
                    "PRODUCT_ID": "S2B_MSIL2A_20230704T185919_N0509_R013_T10SEG_20230705T001111",
                    "CLOUDY_PIXEL_PERCENTAGE": 0.2,
                })]),
            );

        let record = collect(&catalog, &request(ResolutionTier::Standard), DEFAULT_DEADLINE)
            .await
            .unwrap();

        assert_eq!(record.location.buffer_size_meters, 1000.0);
        assert_eq!(record.configuration.zoom_level, 12);
        assert_eq!(record.configuration.output_dimension_px, 512);
        assert!(record.tiles_info.tile_count > 0);
        assert_eq!(
            record.image_urls.get(&SourceId::Landsat).map(String::as_str),
            Some("https://thumbs.test/landsat/0?px=512")
        );
        assert_eq!(record.collection_count(SourceId::Landsat), Some(2));
        assert_eq!(record.collection_count(SourceId::Sentinel), Some(1));
        assert_eq!(record.metadata[&SourceId::Sentinel].date, Some(json!("20230704")));
        assert_eq!(record.metadata[&SourceId::Landsat].resolution, "30m");
    }

    #[tokio::test]
    async fn queries_carry_policy_filters_and_region() {
        let catalog = FakeCatalog::default();
        let record = collect(&catalog, &request(ResolutionTier::High), DEFAULT_DEADLINE)
            .await
            .unwrap();

        let queries = catalog.queries.lock().unwrap();
        assert_eq!(queries.len(), 4);
        for query in queries.iter() {
            assert_eq!(query.region, record.tiles_info.bounding_box);
        }
        let naip = queries.iter().find(|q| q.source == SourceId::Naip).unwrap();
        assert_eq!(naip.dates, DateRange::calendar_years(2018, 2022).unwrap());
        let sentinel = queries.iter().find(|q| q.source == SourceId::Sentinel).unwrap();
        assert_eq!(sentinel.dates, DateRange::default());
        assert_eq!(sentinel.cloud_filter.unwrap().max, 10.0);
    }

    #[tokio::test]
    async fn missing_optional_sources_are_skipped() {
        let catalog = FakeCatalog::default()
            .with(SourceId::WorldView, Behavior::NotFound)
            .with(SourceId::GeoEye, Behavior::BrokenThumbnail)
            .with(
                SourceId::Naip,
                Behavior::Scenes(vec![json!({ "system:time_start": 1_656_633_600_000_i64 })]),
            )
            .with(
                SourceId::Sentinel,
                Behavior::Scenes(vec![json!({ "CLOUDY_PIXEL_PERCENTAGE": 1.0 })]),
            );

        let record = collect(&catalog, &request(ResolutionTier::UltraHigh), DEFAULT_DEADLINE)
            .await
            .unwrap();

        let sources: Vec<SourceId> = record.image_urls.keys().copied().collect();
        assert_eq!(sources, vec![SourceId::Naip, SourceId::Sentinel]);
        assert!(!record.metadata.contains_key(&SourceId::WorldView));
        assert!(!record.metadata.contains_key(&SourceId::GeoEye));
        assert_eq!(record.collection_count(SourceId::WorldView), None);
        assert_eq!(record.collection_count(SourceId::GeoEye), None);
        // queried fine, nothing matched
        assert_eq!(record.collection_count(SourceId::SkySat), Some(0));
        assert_eq!(record.location.buffer_size_meters, 50.0);
        assert_eq!(record.configuration.zoom_level, 20);
        assert_eq!(record.best_resolution(), Some("1m"));
    }

    #[tokio::test]
    async fn mandatory_source_failure_fails_request() {
        let catalog = FakeCatalog::default()
            .with(SourceId::Naip, Behavior::Scenes(vec![json!({})]))
            .with(SourceId::Landsat, Behavior::NotFound);

        let err = collect(&catalog, &request(ResolutionTier::High), DEFAULT_DEADLINE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectError::MandatoryProviderFailure {
                source_id: SourceId::Landsat,
                error: ProviderError::DatasetNotFound(_),
            }
        ));
    }

    #[tokio::test]
    async fn mandatory_source_without_scenes_is_not_a_failure() {
        let record = collect(
            &FakeCatalog::default(),
            &request(ResolutionTier::Standard),
            DEFAULT_DEADLINE,
        )
        .await
        .unwrap();
        assert!(record.image_urls.is_empty());
        assert_eq!(record.collection_count(SourceId::Landsat), Some(0));
        assert_eq!(record.collection_count(SourceId::Sentinel), Some(0));
    }

    #[tokio::test]
    async fn invalid_area_fails_before_querying() {
        let catalog = FakeCatalog::default();
        let mut polar = request(ResolutionTier::Standard);
        polar.center = GeoPoint::new(-90.0, 0.0).unwrap();

        let err = collect(&catalog, &polar, DEFAULT_DEADLINE).await.unwrap_err();
        assert!(matches!(
            err,
            CollectError::Domain(DomainError::PolarLatitude(_))
        ));
        assert!(catalog.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_optional_source_does_not_discard_others() {
        let catalog = FakeCatalog::default()
            .with(SourceId::Planet, Behavior::Hang)
            .with(
                SourceId::Sentinel,
                Behavior::Scenes(vec![json!({ "CLOUDY_PIXEL_PERCENTAGE": 2.0 })]),
            )
            .with(
                SourceId::Landsat,
                Behavior::Scenes(vec![json!({ "CLOUD_COVER": 4.0 })]),
            );

        let record = collect(
            &catalog,
            &request(ResolutionTier::High),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        let sources: Vec<SourceId> = record.image_urls.keys().copied().collect();
        assert_eq!(sources, vec![SourceId::Sentinel, SourceId::Landsat]);
        assert!(!record.metadata.contains_key(&SourceId::Planet));
        assert_eq!(record.collection_count(SourceId::Planet), None);
        assert_eq!(record.collection_count(SourceId::Naip), Some(0));
    }

    #[tokio::test]
    async fn slow_mandatory_source_fails_request() {
        let catalog = FakeCatalog::default()
            .with(SourceId::Landsat, Behavior::Hang)
            .with(
                SourceId::Sentinel,
                Behavior::Scenes(vec![json!({ "CLOUDY_PIXEL_PERCENTAGE": 2.0 })]),
            );

        let err = collect(
            &catalog,
            &request(ResolutionTier::Standard),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CollectError::MandatoryProviderFailure {
                source_id: SourceId::Landsat,
                error: ProviderError::Timeout(_),
            }
        ));
    }
}
