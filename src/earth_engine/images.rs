use chrono::DateTime;
use reqwest::Method;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::{debug, instrument, warn};

use super::{check_status, EarthEngineClient, Scene, SourceQuery, PUBLIC_CATALOG_PROJECT};
use crate::error::ProviderError;
use crate::policy::{CloudFilter, SortOrder};

const PAGE_SIZE: u32 = 1000;
const MAX_PAGES: usize = 10;

pub struct ImagePage {
    pub scenes: Vec<Scene>,
    pub next_page_token: Option<String>,
}

#[instrument(skip(client, query), fields(dataset = query.dataset))]
pub async fn list_images(
    client: &EarthEngineClient,
    query: &SourceQuery,
) -> Result<Vec<Scene>, ProviderError> {
    let url = format!(
        "{}/v1/projects/{}/assets/{}:listImages",
        client.api_url(),
        PUBLIC_CATALOG_PROJECT,
        query.dataset
    );
    let region = query.region.bounds_polygon().to_string();
    let start_time = format!("{}T00:00:00Z", query.dates.start);
    let end_time = format!("{}T00:00:00Z", query.dates.end);

    let mut scenes = Vec::new();
    let mut page_token: Option<String> = None;
    for page in 1..=MAX_PAGES {
        let mut params = vec![
            ("startTime", start_time.clone()),
            ("endTime", end_time.clone()),
            ("region", region.clone()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if let Some(token) = &page_token {
            params.push(("pageToken", token.clone()));
        }

        let res = client
            .request(Method::GET, &url)
            .query(&params)
            .send()
            .await?;
        let res = check_status(res, query.dataset)?;
        let json = res.json::<Value>().await?;
        let parsed = parse_page(&json)?;
        debug!(page, scenes = parsed.scenes.len(), "fetched image page");

        scenes.extend(parsed.scenes);
        match parsed.next_page_token {
            Some(token) => page_token = Some(token),
            None => return Ok(scenes),
        }
    }
    warn!(
        pages = MAX_PAGES,
        scenes = scenes.len(),
        "stopped paging collection, ranking a partial listing"
    );
    Ok(scenes)
}

/// Parses one `listImages` response body.
///
/// `startTime` is copied into the properties as `system:time_start` in epoch
/// milliseconds so it can be filtered and sorted on like any other property.
pub fn parse_page(json: &Value) -> Result<ImagePage, ProviderError> {
    let images = match json.get("images") {
        // an empty listing omits the key entirely
        None => return Ok(ImagePage { scenes: Vec::new(), next_page_token: None }),
        Some(images) => images.as_array().ok_or_else(|| {
            ProviderError::InvalidResponse("images value in listing is not an array".to_string())
        })?,
    };

    let scenes = images
        .iter()
        .map(|image| {
            let id = image
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ProviderError::InvalidResponse("Missing id key in listed image".to_string())
                })?
                .to_string();
            let mut properties = match image.get("properties") {
                None => Map::new(),
                Some(properties) => properties
                    .as_object()
                    .ok_or_else(|| {
                        ProviderError::InvalidResponse(format!(
                            "properties of image {} is not an object",
                            id
                        ))
                    })?
                    .clone(),
            };
            if let Some(start_time) = image.get("startTime").and_then(Value::as_str) {
                let start_time = DateTime::parse_from_rfc3339(start_time).map_err(|err| {
                    ProviderError::InvalidResponse(format!(
                        "startTime of image {} is not RFC 3339: {}",
                        id, err
                    ))
                })?;
                properties.insert(
                    "system:time_start".to_string(),
                    Value::from(start_time.timestamp_millis()),
                );
            }
            Ok(Scene { id, properties })
        })
        .collect::<Result<Vec<Scene>, ProviderError>>()?;

    let next_page_token = json
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    Ok(ImagePage {
        scenes,
        next_page_token,
    })
}

fn numeric_property(scene: &Scene, key: &str) -> Option<f64> {
    scene.properties.get(key).and_then(Value::as_f64)
}

/// Drops scenes that fail the cloud filter and sorts the rest best first.
///
/// Scenes without a numeric cloud property never pass a filter. Scenes
/// without the sort key rank after every scene that has it.
pub fn rank_scenes(
    scenes: Vec<Scene>,
    cloud_filter: Option<CloudFilter>,
    sort: SortOrder,
) -> Vec<Scene> {
    let mut scenes: Vec<Scene> = match cloud_filter {
        None => scenes,
        Some(filter) => scenes
            .into_iter()
            .filter(|scene| {
                numeric_property(scene, filter.property).map_or(false, |value| value < filter.max)
            })
            .collect(),
    };

    scenes.sort_by(|a, b| {
        match (numeric_property(a, sort.key), numeric_property(b, sort.key)) {
            (Some(a), Some(b)) if sort.descending => b.total_cmp(&a),
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    scenes
}
