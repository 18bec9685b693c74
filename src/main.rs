use anyhow::{Context, Result};
use argh::FromArgs;
use chrono::NaiveDate;
use dotenv::dotenv;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod collector;
mod commands;
mod download;
mod earth_engine;
mod error;
mod geo;
mod policy;
mod record;
mod tiles;

use collector::AreaRequest;
use commands::{compare, dump_tiles, fetch, survey, OutputOptions, SurveyOptions, SurveyPreset};
use earth_engine::{EarthEngineClient, EarthEngineConfig};
use geo::GeoPoint;
use policy::{DateRange, ResolutionTier};
use tiles::DEFAULT_TILE_URL;

#[derive(FromArgs)]
/// Computes map tiles for an area and collects the best satellite imagery covering it
struct Args {
    #[argh(option, default = "37.7749")]
    /// latitude of the area center in degrees
    lat: f64,

    #[argh(option, default = "-122.4194")]
    /// longitude of the area center in degrees
    lon: f64,

    #[argh(option, short = 'z', default = "12")]
    /// tile zoom level, 0 to 22
    zoom: u8,

    #[argh(option, short = 'b', default = "1000.0")]
    /// half width of the area in meters
    buffer: f64,

    #[argh(option, short = 'm', default = "ResolutionTier::Standard")]
    /// resolution mode: standard, high_res or ultra_high_res
    mode: ResolutionTier,

    #[argh(option)]
    /// first acquisition date to search, YYYY-MM-DD
    start_date: Option<NaiveDate>,

    #[argh(option)]
    /// last acquisition date to search, YYYY-MM-DD
    end_date: Option<NaiveDate>,

    #[argh(option, short = 'o', default = "PathBuf::from(\"output\")")]
    /// directory to write records and images to
    output: PathBuf,

    #[argh(switch)]
    /// do not save the collected record as JSON
    no_save: bool,

    #[argh(switch, short = 'd')]
    /// download every selected image
    download: bool,

    #[argh(option, default = "String::from(\"area\")")]
    /// file name prefix of downloaded images
    prefix: String,

    #[argh(option, default = "DEFAULT_TILE_URL.to_string()")]
    /// tile URL template with {x}, {y} and {z} placeholders
    tile_url: String,

    #[argh(option, default = "collector::DEFAULT_DEADLINE.as_secs()")]
    /// seconds to wait for all catalog lookups of one request
    deadline: u64,

    #[argh(switch)]
    /// collect all three resolution modes with preset areas
    compare: bool,

    #[argh(option)]
    /// survey a preset list of locations: global or landmarks
    survey: Option<SurveyPreset>,

    #[argh(option)]
    /// download the images of a previously saved record instead of querying the catalog
    redownload: Option<PathBuf>,

    #[argh(option)]
    /// only compute the tile grid and write it as JSON to this file, - for stdout
    dump_tiles: Option<String>,
}

impl Args {
    fn dates(&self) -> Result<DateRange> {
        let default = DateRange::default();
        let range = DateRange::new(
            self.start_date.unwrap_or(default.start),
            self.end_date.unwrap_or(default.end),
        )?;
        Ok(range)
    }
}

fn catalog_client() -> Result<EarthEngineClient> {
    let config = EarthEngineConfig::from_env()?;
    info!(api_url = %config.api_url, project = %config.project, "using earth engine catalog");
    EarthEngineClient::new(config).context("failed to build catalog client")
}

#[tokio::main]
pub async fn main() -> Result<()> {
    dotenv().ok();
    let file_appender = tracing_appender::rolling::daily("./logs", "earth-tiles.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .init();

    let args: Args = argh::from_env();
    let center = GeoPoint::new(args.lat, args.lon)?;
    let dates = args.dates()?;
    let deadline = Duration::from_secs(args.deadline);

    if let Some(path) = &args.dump_tiles {
        dump_tiles(center, args.buffer, args.zoom, &args.tile_url, path)?;
        return Ok(());
    }

    if let Some(path) = &args.redownload {
        let record = record::load_record(path)?;
        let client = download::build_client()?;
        for report in
            download::download_record_images(&client, &record, &args.output, &args.prefix).await?
        {
            match report.result {
                Ok(_) => println!("{}", report.path.display()),
                Err(err) => println!("{}: {}", report.source, err),
            }
        }
        return Ok(());
    }

    let output = OutputOptions {
        output_dir: args.output.clone(),
        save: !args.no_save,
        download: args.download,
        prefix: args.prefix.clone(),
    };
    let catalog = catalog_client()?;

    if let Some(preset) = args.survey {
        let options = SurveyOptions {
            tier: args.mode,
            buffer_meters: args.buffer,
            zoom: args.zoom,
            dates,
            tile_url: args.tile_url.clone(),
            deadline,
        };
        for result in survey(&catalog, preset, &options).await? {
            match &result.available {
                Some(available) => {
                    let names: Vec<&str> = available.iter().map(|id| id.as_str()).collect();
                    println!("{}: {}", result.name, names.join(", "));
                }
                None => println!("{}: failed", result.name),
            }
        }
        return Ok(());
    }

    if args.compare {
        compare(&catalog, center, dates, &args.tile_url, deadline, &output).await?;
        return Ok(());
    }

    let request = AreaRequest {
        center,
        buffer_meters: args.buffer,
        zoom: args.zoom,
        tier: args.mode,
        dates,
        tile_url: args.tile_url.clone(),
    };
    fetch(&catalog, &request, deadline, &output).await?;
    Ok(())
}
