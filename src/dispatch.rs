// src/dispatch.rs
//! Public entry points: validate, route, build, aggregate, extract or render.

use std::future::Future;

use futures::stream::{self, StreamExt};
use geo_types::MultiPolygon;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{visualization, IndexName};
use crate::error::{QueryError, ValidationError};
use crate::geometry::{resolve, resolve_for_render, BoundingBox, LatLng};
use crate::processing::aggregate::Aggregator;
use crate::processing::collection::CollectionBuilder;
use crate::processing::extract::{TileRenderer, ValueExtractor};
use crate::processing::registry::FormulaRegistry;
use crate::processing::sensor::{CloudPolicy, SensorRouter};
use crate::provider::ImageryProvider;
use crate::request::{
    CloudTolerance, DateRange, IndexRequest, IndexResponse, IndexResult, RenderHint,
    SpatialRequest, WireRequest, YearMonth, DEFAULT_THUMBNAIL_DIMENSIONS,
};

/// Default bound on concurrent requests when expanding a series.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Outcome of one month of a series. Months fail independently.
#[derive(Debug)]
pub struct MonthResult {
    pub month: YearMonth,
    pub result: Result<IndexResult, QueryError>,
}

pub struct QueryDispatcher<P> {
    provider: P,
    registry: FormulaRegistry,
    router: SensorRouter,
    max_concurrency: usize,
    thumbnail_dimensions: u32,
}

impl<P: ImageryProvider> QueryDispatcher<P> {
    pub fn new(provider: P, router: SensorRouter) -> Self {
        Self {
            provider,
            registry: FormulaRegistry::new(),
            router,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            thumbnail_dimensions: DEFAULT_THUMBNAIL_DIMENSIONS,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Size used for wire thumbnails that omit `dimensions`.
    pub fn with_thumbnail_dimensions(mut self, dimensions: u32) -> Self {
        self.thumbnail_dimensions = dimensions;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn router(&self) -> &SensorRouter {
        &self.router
    }

    /// Runs one validated request to exactly one of value, url, no data or error.
    pub async fn dispatch(
        &self,
        request: &IndexRequest,
        token: &CancellationToken,
    ) -> Result<IndexResult, QueryError> {
        ensure_live(token)?;

        let index = request.index;
        let sensor = self.router.sensor_for(request.date_range.start());
        let policy = CloudPolicy::translate(sensor, request.cloud_tolerance);

        let (bbox, polygon) = match &request.spatial {
            SpatialRequest::Point(point) => (BoundingBox::around_point(*point), None),
            SpatialRequest::Area { bbox, polygon } => (*bbox, polygon.as_ref()),
        };
        let geometry = match request.render {
            RenderHint::Scalar => resolve(&bbox, polygon),
            RenderHint::Tile | RenderHint::Thumbnail { .. } => resolve_for_render(&bbox, polygon),
        };

        let builder = CollectionBuilder::new(&self.registry);
        let collection = guarded(
            token,
            builder.build(
                &self.provider,
                sensor,
                &geometry,
                &request.date_range,
                policy,
                index,
            ),
        )
        .await
        .inspect_err(|e| log_failure(e, index))?;

        if collection.is_empty() {
            info!(%sensor, %index, "No images matched, returning no data");
            ensure_live(token)?;
            return Ok(no_data(request.render));
        }

        let result = match request.render {
            RenderHint::Scalar => {
                let image = Aggregator::mean(&collection);
                let extractor = ValueExtractor::new(&self.provider);
                let value = match &request.spatial {
                    SpatialRequest::Point(point) => {
                        guarded(token, extractor.extract_point(&image, *point, collection.scale_m)).await
                    }
                    SpatialRequest::Area { .. } => {
                        guarded(
                            token,
                            extractor.extract_area(&image, &image.plan.clip, collection.scale_m),
                        )
                        .await
                    }
                }
                .inspect_err(|e| log_failure(e, index))?;
                IndexResult::Value(value)
            }
            RenderHint::Tile => {
                let image = Aggregator::freshest_mosaic(&collection);
                let renderer = TileRenderer::new(&self.provider);
                let url = guarded(token, renderer.tile(&image, &visualization(index)))
                    .await
                    .inspect_err(|e| log_failure(e, index))?;
                IndexResult::Url(Some(url))
            }
            RenderHint::Thumbnail { dimensions } => {
                let image = Aggregator::freshest_mosaic(&collection);
                let renderer = TileRenderer::new(&self.provider);
                let url = guarded(token, renderer.thumbnail(&image, &visualization(index), dimensions))
                    .await
                    .inspect_err(|e| log_failure(e, index))?;
                IndexResult::Url(Some(url))
            }
        };

        // a late result must not reach a caller that already moved on
        ensure_live(token)?;
        info!(
            %sensor,
            %index,
            images = collection.size,
            no_data = result.is_no_data(),
            "Request completed"
        );
        Ok(result)
    }

    /// Mean over the ±0.01° square around a point.
    pub async fn point(
        &self,
        point: LatLng,
        date_range: DateRange,
        cloud_tolerance: CloudTolerance,
        index: IndexName,
        token: &CancellationToken,
    ) -> Result<IndexResult, QueryError> {
        let request = IndexRequest {
            spatial: SpatialRequest::Point(point),
            date_range,
            cloud_tolerance,
            index,
            render: RenderHint::Scalar,
        };
        self.dispatch(&request, token).await
    }

    /// Mean over a bounding box, clipped to `polygon` when given.
    pub async fn area(
        &self,
        bbox: BoundingBox,
        polygon: Option<MultiPolygon<f64>>,
        date_range: DateRange,
        cloud_tolerance: CloudTolerance,
        index: IndexName,
        token: &CancellationToken,
    ) -> Result<IndexResult, QueryError> {
        let request = IndexRequest {
            spatial: SpatialRequest::Area { bbox, polygon },
            date_range,
            cloud_tolerance,
            index,
            render: RenderHint::Scalar,
        };
        self.dispatch(&request, token).await
    }

    /// Mean over one whole calendar month.
    pub async fn month(
        &self,
        month: YearMonth,
        spatial: SpatialRequest,
        cloud_tolerance: CloudTolerance,
        index: IndexName,
        token: &CancellationToken,
    ) -> Result<IndexResult, QueryError> {
        let request = IndexRequest {
            spatial,
            date_range: month.date_range(),
            cloud_tolerance,
            index,
            render: RenderHint::Scalar,
        };
        self.dispatch(&request, token).await
    }

    /// One request per month from `first` to `last`, run concurrently.
    ///
    /// Results come back in month order whatever order they complete in.
    pub async fn months(
        &self,
        first: YearMonth,
        last: YearMonth,
        spatial: &SpatialRequest,
        cloud_tolerance: CloudTolerance,
        index: IndexName,
        token: &CancellationToken,
    ) -> Result<Vec<MonthResult>, ValidationError> {
        let months = YearMonth::span(first, last)?;
        debug!(
            from = %first,
            to = %last,
            months = months.len(),
            concurrency = self.max_concurrency,
            "Expanding month series"
        );

        let mut results = stream::iter(months)
            .map(|month| async move {
                let result = self
                    .month(month, spatial.clone(), cloud_tolerance, index, token)
                    .await;
                MonthResult { month, result }
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        results.sort_by_key(|r| r.month);
        Ok(results)
    }

    /// Tile template or thumbnail URL; `Url(None)` when nothing matched.
    pub async fn render(
        &self,
        spatial: SpatialRequest,
        date_range: DateRange,
        cloud_tolerance: CloudTolerance,
        index: IndexName,
        render: RenderHint,
        token: &CancellationToken,
    ) -> Result<IndexResult, QueryError> {
        let request = IndexRequest {
            spatial,
            date_range,
            cloud_tolerance,
            index,
            render,
        };
        self.dispatch(&request, token).await
    }

    /// JSON in, JSON out. Validation failures never reach the provider.
    pub async fn handle_wire(&self, wire: WireRequest, token: &CancellationToken) -> IndexResponse {
        match wire.into_request(self.thumbnail_dimensions) {
            Ok(request) => self.dispatch(&request, token).await.into(),
            Err(e) => {
                warn!(error = %e, "Rejected request");
                e.into()
            }
        }
    }
}

fn no_data(render: RenderHint) -> IndexResult {
    match render {
        RenderHint::Scalar => IndexResult::Value(None),
        RenderHint::Tile | RenderHint::Thumbnail { .. } => IndexResult::Url(None),
    }
}

fn ensure_live(token: &CancellationToken) -> Result<(), QueryError> {
    if token.is_cancelled() {
        return Err(QueryError::Cancelled);
    }
    Ok(())
}

/// Races a provider round trip against cancellation.
async fn guarded<T, E, F>(token: &CancellationToken, work: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, E>>,
    QueryError: From<E>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(QueryError::Cancelled),
        result = work => result.map_err(QueryError::from),
    }
}

fn log_failure(e: &QueryError, index: IndexName) {
    match e {
        QueryError::Registry(_) => error!(%index, error = %e, "Formula registry defect"),
        QueryError::Cancelled => debug!(%index, "Request cancelled"),
        _ => warn!(%index, error = %e, "Request failed"),
    }
}
