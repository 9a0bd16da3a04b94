// src/main.rs
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use index_calc::batch::{process_batch, BatchFile};
use index_calc::cli::{AreaArgs, Cli, Commands, DateArgs, QueryArgs};
use index_calc::config::Config;
use index_calc::dispatch::QueryDispatcher;
use index_calc::geometry::{BoundingBox, LatLng};
use index_calc::io::{read_archives_parallel, read_geometry, write_json};
use index_calc::logging::init_logging;
use index_calc::provider::{AnyProvider, AsyncReqwestClient, ImageryProvider, RemoteProvider};
use index_calc::request::{
    CloudTolerance, DateRange, IndexResponse, RenderHint, SpatialRequest, YearMonth,
};
use index_calc::IndexName;

#[derive(Serialize)]
struct SeriesEntry {
    month: YearMonth,
    #[serde(flatten)]
    response: IndexResponse,
}

fn build_provider(cli: &Cli, config: &Config) -> Result<AnyProvider> {
    if !cli.archive.is_empty() {
        return Ok(AnyProvider::Local(read_archives_parallel(&cli.archive)?));
    }
    let base_url = config
        .provider
        .base_url
        .clone()
        .ok_or_else(|| anyhow!("No --archive given and provider.baseUrl is not configured"))?;
    let client = AsyncReqwestClient::with_timeout(config.provider.timeout_secs)?;
    Ok(AnyProvider::Remote(RemoteProvider::new(
        client,
        base_url,
        config.provider_token(),
    )))
}

fn spatial(area: &AreaArgs) -> Result<SpatialRequest> {
    let bbox: [f64; 4] = area
        .bbox
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("--bbox needs exactly 4 values, got {}", area.bbox.len()))?;
    let bbox = BoundingBox::from_wire(bbox)?;
    Ok(match &area.geometry {
        Some(path) => SpatialRequest::clipped(bbox, read_geometry(path)?),
        None => SpatialRequest::area(bbox),
    })
}

fn dates(args: &DateArgs) -> Result<DateRange> {
    Ok(DateRange::parse(&args.start, &args.end)?)
}

fn query(args: &QueryArgs) -> Result<(IndexName, CloudTolerance)> {
    Ok((args.index.parse()?, CloudTolerance::new(args.cloud)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let provider = build_provider(&cli, &config)?;
    info!(provider = provider.name(), "Provider ready");

    let dispatcher = QueryDispatcher::new(provider, config.router())
        .with_max_concurrency(config.max_concurrency)
        .with_thumbnail_dimensions(config.thumbnail_dimensions);
    let token = CancellationToken::new();

    match &cli.command {
        Commands::Point {
            lat,
            lon,
            dates: d,
            query: q,
        } => {
            let (index, cloud) = query(q)?;
            let point = LatLng::new(*lat, *lon)?;
            let result = dispatcher.point(point, dates(d)?, cloud, index, &token).await;
            write_json(&IndexResponse::from(result), None)?;
        }
        Commands::Area {
            area,
            dates: d,
            query: q,
        } => {
            let (index, cloud) = query(q)?;
            let result = match spatial(area)? {
                SpatialRequest::Area { bbox, polygon } => {
                    dispatcher
                        .area(bbox, polygon, dates(d)?, cloud, index, &token)
                        .await
                }
                SpatialRequest::Point(_) => bail!("area command needs a bounding box"),
            };
            write_json(&IndexResponse::from(result), None)?;
        }
        Commands::Month {
            year,
            month,
            area,
            query: q,
        } => {
            let (index, cloud) = query(q)?;
            let month = YearMonth::new(*year, *month)?;
            let result = dispatcher
                .month(month, spatial(area)?, cloud, index, &token)
                .await;
            write_json(&IndexResponse::from(result), None)?;
        }
        Commands::Series {
            from,
            to,
            area,
            query: q,
        } => {
            let (index, cloud) = query(q)?;
            let first = YearMonth::parse(from)?;
            let last = YearMonth::parse(to)?;
            let results = dispatcher
                .months(first, last, &spatial(area)?, cloud, index, &token)
                .await?;
            let entries: Vec<SeriesEntry> = results
                .into_iter()
                .map(|r| SeriesEntry {
                    month: r.month,
                    response: r.result.into(),
                })
                .collect();
            write_json(&entries, None)?;
        }
        Commands::Render {
            area,
            dates: d,
            query: q,
            thumbnail,
            dimensions,
        } => {
            let (index, cloud) = query(q)?;
            let render = if *thumbnail {
                RenderHint::thumbnail(dimensions.unwrap_or(config.thumbnail_dimensions))?
            } else {
                RenderHint::Tile
            };
            let result = dispatcher
                .render(spatial(area)?, dates(d)?, cloud, index, render, &token)
                .await;
            write_json(&IndexResponse::from(result), None)?;
        }
        Commands::Batch { file, output } => {
            let batch = BatchFile::read(file)?;
            let responses = process_batch(
                batch,
                Arc::new(dispatcher),
                config.max_concurrency,
                token.clone(),
            )
            .await?;
            write_json(&responses, output.as_deref())?;
        }
    }

    Ok(())
}
