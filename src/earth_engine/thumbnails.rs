use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{check_status, EarthEngineClient, Scene, ThumbnailRequest};
use crate::error::ProviderError;
use crate::geo::BoundingBox;

/// Pixel size of a thumbnail whose longer side is `dimension_px`.
pub fn grid_dimensions(region: &BoundingBox, dimension_px: u32) -> (u32, u32) {
    let width = region.width_degrees();
    let height = region.height_degrees();
    if width <= 0.0 || height <= 0.0 {
        return (dimension_px, dimension_px);
    }
    let scaled = |short: f64, long: f64| ((dimension_px as f64 * short / long).round() as u32).max(1);
    if width >= height {
        (dimension_px, scaled(height, width))
    } else {
        (scaled(width, height), dimension_px)
    }
}

/// Body of a `thumbnails.create` call rendering `scene` over the request region.
pub fn thumbnail_body(scene: &Scene, request: &ThumbnailRequest) -> Value {
    let region = &request.region;
    let (width, height) = grid_dimensions(region, request.vis.dimension_px);

    let mut body = json!({
        "expression": {
            "result": "0",
            "values": {
                "0": {
                    "functionInvocationValue": {
                        "functionName": "Image.load",
                        "arguments": { "id": { "constantValue": scene.id } }
                    }
                }
            }
        },
        "fileFormat": "PNG",
        "grid": {
            "crsCode": "EPSG:4326",
            "dimensions": { "width": width, "height": height },
            "affineTransform": {
                "scaleX": region.width_degrees() / width as f64,
                "shearX": 0.0,
                "translateX": region.west,
                "shearY": 0.0,
                "scaleY": -region.height_degrees() / height as f64,
                "translateY": region.north
            }
        }
    });

    let vis = &request.vis;
    if !vis.bands.is_empty() {
        body["bandIds"] = json!(vis.bands);
    }
    let mut options = serde_json::Map::new();
    if let Some((min, max)) = vis.range {
        options.insert("ranges".to_string(), json!([{ "min": min, "max": max }]));
    }
    if let Some(gamma) = vis.gamma {
        options.insert("gamma".to_string(), json!({ "value": gamma }));
    }
    if !options.is_empty() {
        body["visualizationOptions"] = Value::Object(options);
    }
    body
}

#[instrument(skip(client, scene, request))]
pub async fn create(
    client: &EarthEngineClient,
    scene: &Scene,
    request: &ThumbnailRequest,
) -> Result<String, ProviderError> {
    let url = format!(
        "{}/v1/projects/{}/thumbnails",
        client.api_url(),
        client.project()
    );
    let res = client
        .request(Method::POST, &url)
        .json(&thumbnail_body(scene, request))
        .send()
        .await?;
    let res = check_status(res, &scene.id)?;
    let json = res.json::<Value>().await?;
    let name = json
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidResponse("Missing name in thumbnail response".to_string()))?;

    let thumbnail_url = format!("{}/v1/{}:getPixels", client.api_url(), name);
    info!(url = %thumbnail_url, "created thumbnail");
    Ok(thumbnail_url)
}
