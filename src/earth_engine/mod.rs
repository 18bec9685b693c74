//! Imagery catalog access.
//!
//! [`ImageCatalog`] is the seam between source selection and the provider.
//! [`EarthEngineClient`] implements it on top of the Earth Engine REST API.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};
use std::env;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::geo::BoundingBox;
use crate::policy::{CloudFilter, DateRange, SortOrder, SourceId, SourceSpec, VisParams};

pub mod images;
pub mod thumbnails;

pub static USER_AGENT: &str = "earth-tiles/0.1";
pub static DEFAULT_API_URL: &str = "https://earthengine.googleapis.com";
/// Project that owns the public data catalog.
pub static PUBLIC_CATALOG_PROJECT: &str = "earthengine-public";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// One image in a collection with its provider property map.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub source: SourceId,
    pub dataset: &'static str,
    pub region: BoundingBox,
    pub dates: DateRange,
    pub cloud_filter: Option<CloudFilter>,
    pub sort: SortOrder,
}

impl SourceQuery {
    pub fn new(spec: &SourceSpec, region: BoundingBox, requested: DateRange) -> Self {
        SourceQuery {
            source: spec.id,
            dataset: spec.dataset,
            region,
            dates: spec.date_range(requested),
            cloud_filter: spec.cloud_filter,
            sort: spec.sort,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub best: Option<Scene>,
    /// Scenes left after filtering.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub source: SourceId,
    pub region: BoundingBox,
    pub vis: VisParams,
}

pub trait ImageCatalog: Send + Sync {
    /// Best scene for the query plus how many scenes matched.
    fn search(
        &self,
        query: &SourceQuery,
    ) -> impl Future<Output = Result<SearchResult, ProviderError>> + Send;

    /// URL that renders `scene` as a PNG thumbnail of `request.region`.
    fn thumbnail_url(
        &self,
        scene: &Scene,
        request: &ThumbnailRequest,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

#[derive(Debug, Clone)]
pub struct EarthEngineConfig {
    pub api_url: String,
    /// Cloud project billed for requests.
    pub project: String,
    pub access_token: String,
}

impl EarthEngineConfig {
    pub fn from_env() -> Result<Self> {
        Ok(EarthEngineConfig {
            api_url: env::var("EE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            project: env::var("EE_PROJECT").context("EE_PROJECT must be set")?,
            access_token: env::var("EE_ACCESS_TOKEN").context("EE_ACCESS_TOKEN must be set")?,
        })
    }
}

pub struct EarthEngineClient {
    client: Client,
    config: EarthEngineConfig,
}

impl EarthEngineClient {
    pub fn new(config: EarthEngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(EarthEngineClient { client, config })
    }

    pub fn api_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.access_token)
            .header("x-goog-user-project", &self.config.project)
            .header("accept", "application/json")
    }
}

/// Maps catalog status codes onto [`ProviderError`] variants.
fn check_status(res: Response, asset: &str) -> Result<Response, ProviderError> {
    match res.status() {
        StatusCode::NOT_FOUND => Err(ProviderError::DatasetNotFound(asset.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Unauthorized(
            format!("{} for {}", res.status(), asset),
        )),
        _ => Ok(res.error_for_status()?),
    }
}

impl ImageCatalog for EarthEngineClient {
    #[instrument(skip(self, query), fields(source = %query.source, dataset = query.dataset))]
    async fn search(&self, query: &SourceQuery) -> Result<SearchResult, ProviderError> {
        let scenes = images::list_images(self, query).await?;
        let listed = scenes.len();
        let ranked = images::rank_scenes(scenes, query.cloud_filter, query.sort);
        info!(listed, matched = ranked.len(), "searched collection");

        Ok(SearchResult {
            count: ranked.len(),
            best: ranked.into_iter().next(),
        })
    }

    #[instrument(skip(self, scene, request), fields(source = %request.source, scene = %scene.id))]
    async fn thumbnail_url(
        &self,
        scene: &Scene,
        request: &ThumbnailRequest,
    ) -> Result<String, ProviderError> {
        thumbnails::create(self, scene, request).await
    }
}
