use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{create_dir_all, File};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{info, instrument, warn};

use crate::earth_engine::USER_AGENT;
use crate::error::DownloadError;
use crate::policy::SourceId;
use crate::record::ImageryRecord;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONCURRENT_DOWNLOADS: usize = 4;

pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

/// Streams `url` into `path`, returning the number of bytes written.
///
/// A partially written file is removed when the transfer fails.
#[instrument(skip(client))]
pub async fn download_image(client: &Client, url: &str, path: &Path) -> Result<u64, DownloadError> {
    let res = client.get(url).send().await?.error_for_status()?;
    info!(status = %res.status(), "fetching image");

    let mut tokio_file = File::create(path).await?;
    let mut byte_stream = res
        .bytes_stream()
        .map_err(|e| futures::io::Error::new(futures::io::ErrorKind::Other, e))
        .into_async_read()
        .compat();

    match tokio::io::copy(&mut byte_stream, &mut tokio_file).await {
        Ok(bytes) => {
            info!(bytes, "saved image");
            Ok(bytes)
        }
        Err(err) => {
            drop(tokio_file);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!(error = %remove_err, "failed to remove partial image");
            }
            Err(DownloadError::Io(err))
        }
    }
}

pub fn image_path(output_dir: &Path, prefix: &str, source: SourceId, record: &ImageryRecord) -> PathBuf {
    output_dir.join("images").join(format!(
        "{}_{}_{}.png",
        prefix, source, record.configuration.resolution_mode
    ))
}

#[derive(Debug)]
pub struct DownloadReport {
    pub source: SourceId,
    pub path: PathBuf,
    pub result: Result<u64, DownloadError>,
}

/// Downloads every image URL of `record` into `<output_dir>/images/`.
///
/// One failed image does not stop the others; each outcome is reported.
#[instrument(skip(client, record), fields(images = record.image_urls.len()))]
pub async fn download_record_images(
    client: &Client,
    record: &ImageryRecord,
    output_dir: &Path,
    prefix: &str,
) -> Result<Vec<DownloadReport>, DownloadError> {
    create_dir_all(output_dir.join("images")).await?;

    let mut reports: Vec<DownloadReport> = stream::iter(record.image_urls.iter())
        .map(|(&source, url)| {
            let path = image_path(output_dir, prefix, source, record);
            async move {
                let result = download_image(client, url, &path).await;
                if let Err(err) = &result {
                    warn!(source = %source, error = %err, "image download failed");
                }
                DownloadReport {
                    source,
                    path,
                    result,
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_DOWNLOADS)
        .collect()
        .await;
    reports.sort_by_key(|report| report.source);
    Ok(reports)
}
