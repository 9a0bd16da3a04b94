// src/provider/remote.rs
//! Provider backed by a remote imagery service speaking JSON plans.

use geo_types::Rect;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::AsyncHttpClient;
use super::plan::{CollectionPlan, ImagePlan};
use super::types::{ImageryProvider, ProviderError, Reduction};
use crate::catalog::Visualization;
use crate::geometry::Region;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SizeRequest<'a> {
    collection: &'a CollectionPlan,
}

#[derive(Deserialize)]
struct SizeResponse {
    size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReduceRequest<'a> {
    image: &'a ImagePlan,
    region: &'a Region,
    scale_meters: f64,
}

/// `{"value": null}` is the backend's empty-reduction signal.
#[derive(Deserialize)]
struct ReduceResponse {
    value: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    image: &'a ImagePlan,
    visualization: &'a Visualization,
    region: &'a Rect<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapResponse {
    url_template: Option<String>,
}

#[derive(Deserialize)]
struct ThumbnailResponse {
    url: Option<String>,
}

/// Remote imagery provider.
///
/// Posts plans to `{base_url}/v1/...` with an optional bearer token.
pub struct RemoteProvider<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
    token: Option<String>,
}

impl<C: AsyncHttpClient> RemoteProvider<C> {
    pub fn new(http_client: C, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
            token,
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let json = serde_json::to_string(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to encode request: {}", e)))?;
        let bytes = self
            .http_client
            .post_json(&url, &json, self.token.as_deref())
            .await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

impl<C: AsyncHttpClient> ImageryProvider for RemoteProvider<C> {
    async fn collection_size(&self, plan: &CollectionPlan) -> Result<usize, ProviderError> {
        let response: SizeResponse = self
            .post("/v1/collections:size", &SizeRequest { collection: plan })
            .await?;
        debug!(collection = %plan.collection, size = response.size, "Remote collection size");
        Ok(response.size)
    }

    async fn reduce_region(
        &self,
        image: &ImagePlan,
        region: &Region,
        scale_m: f64,
    ) -> Result<Reduction, ProviderError> {
        let response: ReduceResponse = self
            .post(
                "/v1/image:reduceRegion",
                &ReduceRequest {
                    image,
                    region,
                    scale_meters: scale_m,
                },
            )
            .await?;
        Ok(Reduction::from(response.value))
    }

    async fn tile_template(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
    ) -> Result<String, ProviderError> {
        let response: MapResponse = self
            .post(
                "/v1/maps",
                &RenderRequest {
                    image,
                    visualization,
                    region,
                    dimensions: None,
                },
            )
            .await?;
        response
            .url_template
            .ok_or_else(|| ProviderError::Render("map response has no urlTemplate".to_string()))
    }

    async fn thumbnail_url(
        &self,
        image: &ImagePlan,
        visualization: &Visualization,
        region: &Rect<f64>,
        dimensions: u32,
    ) -> Result<String, ProviderError> {
        let response: ThumbnailResponse = self
            .post(
                "/v1/thumbnails",
                &RenderRequest {
                    image,
                    visualization,
                    region,
                    dimensions: Some(dimensions),
                },
            )
            .await?;
        response
            .url
            .ok_or_else(|| ProviderError::Render("thumbnail response has no url".to_string()))
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use geo_types::coord;

    use super::*;
    use crate::provider::http::tests::MockAsyncHttpClient;
    use crate::provider::plan::Composite;
    use crate::processing::expr::Expr;

    fn plan() -> CollectionPlan {
        let region = Rect::new(coord! { x: -74.6, y: 40.0 }, coord! { x: -74.4, y: 40.2 });
        CollectionPlan {
            collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            region,
            start: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            end_exclusive: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            scene_filter: None,
            quality_mask: None,
            expression: Expr::normalized_difference(Expr::band("B8"), Expr::band("B4")),
            output_band: "NDVI".to_string(),
        }
    }

    fn image() -> ImagePlan {
        let collection = plan();
        let clip = Region::Rectangle(collection.region);
        ImagePlan {
            collection,
            composite: Composite::Mean,
            clip,
        }
    }

    #[tokio::test]
    async fn test_collection_size_posts_plan() {
        let mock = MockAsyncHttpClient::responding(r#"{"size": 4}"#);
        let provider = RemoteProvider::new(mock.clone(), "https://imagery.test/", Some("secret".into()));

        let size = provider.collection_size(&plan()).await.unwrap();
        assert_eq!(size, 4);

        let request = mock.last_request().unwrap();
        assert_eq!(request.url, "https://imagery.test/v1/collections:size");
        assert_eq!(request.bearer_token.as_deref(), Some("secret"));
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["collection"]["collection"], "COPERNICUS/S2_SR_HARMONIZED");
        assert_eq!(body["collection"]["endExclusive"], "2023-07-01");
    }

    #[tokio::test]
    async fn test_null_value_is_empty_reduction() {
        let mock = MockAsyncHttpClient::responding(r#"{"value": null}"#);
        let provider = RemoteProvider::new(mock, "https://imagery.test", None);
        let image = image();

        let reduction = provider
            .reduce_region(&image, &image.clip, 10.0)
            .await
            .unwrap();
        assert_eq!(reduction, Reduction::Empty);
    }

    #[tokio::test]
    async fn test_value_is_returned() {
        let mock = MockAsyncHttpClient::responding(r#"{"value": 0.42}"#);
        let provider = RemoteProvider::new(mock, "https://imagery.test", None);
        let image = image();

        let reduction = provider
            .reduce_region(&image, &image.clip, 10.0)
            .await
            .unwrap();
        assert_eq!(reduction, Reduction::Value(0.42));
    }

    #[tokio::test]
    async fn test_status_error_is_not_empty() {
        let mock = MockAsyncHttpClient::failing(ProviderError::Status {
            status: 429,
            message: "quota exceeded".to_string(),
        });
        let provider = RemoteProvider::new(mock, "https://imagery.test", None);
        let image = image();

        let err = provider
            .reduce_region(&image, &image.clip, 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock = MockAsyncHttpClient::responding("<html>");
        let provider = RemoteProvider::new(mock, "https://imagery.test", None);

        let err = provider.collection_size(&plan()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_thumbnail_sends_dimensions() {
        let mock = MockAsyncHttpClient::responding(r#"{"url": "https://imagery.test/thumb/abc.png"}"#);
        let provider = RemoteProvider::new(mock.clone(), "https://imagery.test", None);
        let image = image();
        let vis = crate::catalog::visualization(crate::catalog::IndexName::Ndvi);

        let url = provider
            .thumbnail_url(&image, &vis, &image.collection.region, 1024)
            .await
            .unwrap();
        assert_eq!(url, "https://imagery.test/thumb/abc.png");

        let body: serde_json::Value =
            serde_json::from_str(&mock.last_request().unwrap().body).unwrap();
        assert_eq!(body["dimensions"], 1024);
    }

    #[tokio::test]
    async fn test_missing_template_is_render_error() {
        let mock = MockAsyncHttpClient::responding(r#"{}"#);
        let provider = RemoteProvider::new(mock, "https://imagery.test", None);
        let image = image();
        let vis = crate::catalog::visualization(crate::catalog::IndexName::Ndvi);

        let err = provider
            .tile_template(&image, &vis, &image.collection.region)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Render(_)));
    }
}
