//! HTTP client for the classification service and the geocoder.
//!
//! This module provides:
//! - Point fetching, single-shot or paginated (`?page=N`, append-only)
//! - NDVI overlay metadata and the classified raster
//! - Place search against a Nominatim-compatible geocoder
//!
//! Point payloads are parsed leniently: entries with missing or non-numeric
//! coordinates are dropped, the stage label may be sent as `stage` or
//! `growth_stage`, and unlabelled points fall back to their NDVI value.
//! Failures are logged and returned; nothing is retried.

use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::{Bounds, Error, GrowthStage, LatLng, Result, StagePoint};

const LOCATIONS_PATH: &str = "/sugarcane-locations";
const NDVI_INFO_PATH: &str = "/get-ndvi-info";
const NDVI_CLASSIFIED_PATH: &str = "/get-ndvi-classified";
const NDVI_DATA_PATH: &str = "/ndvi-data";
const LAST_UPDATE_PATH: &str = "/api/last-update";

/// One page of point data.
#[derive(Debug, Clone, Default)]
pub struct LocationsPage {
    pub points: Vec<StagePoint>,
    /// Service reports further pages
    pub has_more: bool,
    /// Entries dropped as malformed
    pub skipped: usize,
}

/// Geographic placement of the classified NDVI raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdviInfo {
    pub southwest: LatLng,
    pub northeast: LatLng,
}

impl NdviInfo {
    pub fn bounds(&self) -> Bounds {
        Bounds::from_corners(self.southwest, self.northeast)
    }
}

#[derive(Debug, Deserialize)]
struct NdviInfoResponse {
    southwest: [f64; 2],
    northeast: [f64; 2],
}

impl From<NdviInfoResponse> for NdviInfo {
    fn from(raw: NdviInfoResponse) -> Self {
        Self {
            southwest: LatLng::new(raw.southwest[0], raw.southwest[1]),
            northeast: LatLng::new(raw.northeast[0], raw.northeast[1]),
        }
    }
}

/// Extent of the source NDVI dataset.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NdviExtent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl NdviExtent {
    pub fn bounds(&self) -> Bounds {
        Bounds::from_corners(
            LatLng::new(self.min_lat, self.min_lon),
            LatLng::new(self.max_lat, self.max_lon),
        )
    }
}

/// When the classification data was last refreshed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LastUpdate {
    pub last_updated: Option<String>,
    /// Human-readable form, e.g. "March 3, 2024"
    pub readable: Option<String>,
}

/// Classified raster plus where to place it.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub info: NdviInfo,
    /// Encoded image bytes as served (GeoTIFF from the classifier; PNG also decodes)
    pub image: Vec<u8>,
}

impl Overlay {
    pub fn decode(&self) -> Result<image::RgbaImage> {
        Ok(image::load_from_memory(&self.image)?.to_rgba8())
    }
}

/// First geocoder match for a search.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub position: LatLng,
    pub display_name: Option<String>,
}

/// Client for the classification service and geocoder.
pub struct GrowthDataClient {
    client: Client,
    config: ServiceConfig,
}

impl GrowthDataClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(config.timeout)
            .user_agent(concat!("sugarcane-map/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn get_bytes(&self, url: &str, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let start = Instant::now();
        let response = match self.client.get(url).query(query).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("[GrowthDataClient] {} failed: {}", endpoint, e);
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("[GrowthDataClient] {} returned {}", endpoint, status);
            return Err(Error::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        debug!(
            "[GrowthDataClient] {} {:?}: {:.1}KB in {:?}",
            endpoint,
            query,
            bytes.len() as f64 / 1024.0,
            start.elapsed()
        );
        Ok(bytes.to_vec())
    }

    async fn get_service(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        self.get_bytes(&self.config.endpoint(path), path, query).await
    }

    /// Fetch one page of points. `None` requests the unpaginated listing.
    pub async fn fetch_locations_page(&self, page: Option<u32>) -> Result<LocationsPage> {
        let query: Vec<(&str, String)> = page.map(|p| ("page", p.to_string())).into_iter().collect();
        let bytes = self.get_service(LOCATIONS_PATH, &query).await?;
        parse_locations(&bytes)
    }

    /// Fetch the unpaginated point listing.
    pub async fn fetch_locations(&self) -> Result<Vec<StagePoint>> {
        Ok(self.fetch_locations_page(None).await?.points)
    }

    /// Walk pages from 1 until an empty page or one without `has_more`,
    /// handing each page to `on_page` as it arrives. Returns the total number
    /// of points received.
    pub async fn fetch_pages<F>(&self, on_page: F) -> Result<usize>
    where
        F: FnMut(&[StagePoint]),
    {
        let start = Instant::now();
        let client = self;
        let (total, page) =
            walk_pages(move |page| client.fetch_locations_page(Some(page)), on_page).await?;

        info!(
            "[GrowthDataClient] fetched {} points over {} pages in {:.2}s",
            total,
            page,
            start.elapsed().as_secs_f64()
        );
        Ok(total)
    }

    /// Fetch every page and concatenate in arrival order.
    pub async fn fetch_all_locations(&self) -> Result<Vec<StagePoint>> {
        let mut points = Vec::new();
        self.fetch_pages(|page| points.extend_from_slice(page)).await?;
        Ok(points)
    }

    pub async fn ndvi_info(&self) -> Result<NdviInfo> {
        let bytes = self.get_service(NDVI_INFO_PATH, &[]).await?;
        let raw: NdviInfoResponse = decode_json("NDVI info", &bytes)?;
        Ok(raw.into())
    }

    pub async fn ndvi_extent(&self) -> Result<NdviExtent> {
        let bytes = self.get_service(NDVI_DATA_PATH, &[]).await?;
        decode_json("NDVI extent", &bytes)
    }

    /// Encoded classified raster.
    pub async fn ndvi_classified(&self) -> Result<Vec<u8>> {
        self.get_service(NDVI_CLASSIFIED_PATH, &[]).await
    }

    pub async fn last_update(&self) -> Result<LastUpdate> {
        let bytes = self.get_service(LAST_UPDATE_PATH, &[]).await?;
        decode_json("last update", &bytes)
    }

    /// Fetch overlay placement and raster concurrently.
    pub async fn fetch_overlay(&self) -> Result<Overlay> {
        let (info, image) = futures::try_join!(self.ndvi_info(), self.ndvi_classified())?;
        info!(
            "[GrowthDataClient] overlay {:.1}KB over {:?}",
            image.len() as f64 / 1024.0,
            info.bounds()
        );
        Ok(Overlay { info, image })
    }

    /// Look up a place name. No match is [`Error::NoResults`].
    pub async fn geocode(&self, query: &str) -> Result<GeocodeHit> {
        let url = format!("{}/search", self.config.geocoder_url.trim_end_matches('/'));
        let params = [
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("countrycodes", self.config.country_codes.clone()),
            ("limit", "1".to_string()),
        ];
        let bytes = self.get_bytes(&url, "geocoder", &params).await?;
        parse_geocode(&bytes, query)
    }
}

/// Request pages 1, 2, ... from `fetch_page` and pass each to `on_page`.
///
/// Stops after an empty page or one without `has_more`. An error ends the walk
/// after the pages already delivered. Returns `(points, pages)`.
async fn walk_pages<P, Fut, F>(mut fetch_page: P, mut on_page: F) -> Result<(usize, u32)>
where
    P: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<LocationsPage>>,
    F: FnMut(&[StagePoint]),
{
    let mut total = 0;
    let mut page = 1;

    loop {
        let batch = fetch_page(page).await?;
        total += batch.points.len();
        on_page(&batch.points);

        if batch.points.is_empty() || !batch.has_more {
            return Ok((total, page));
        }
        page += 1;
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Decode {
        what,
        message: e.to_string(),
    })
}

/// Parse a locations payload: `{points, has_more?}` or a bare array.
pub fn parse_locations(bytes: &[u8]) -> Result<LocationsPage> {
    let value: Value = decode_json("point locations", bytes)?;

    let (entries, has_more) = match &value {
        Value::Array(entries) => (entries.as_slice(), false),
        Value::Object(map) => {
            let entries = match map.get("points") {
                Some(Value::Array(entries)) => entries.as_slice(),
                Some(Value::Null) | None => &[][..],
                Some(_) => {
                    return Err(Error::Decode {
                        what: "point locations",
                        message: "\"points\" is not an array".to_string(),
                    })
                }
            };
            let has_more = map.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            (entries, has_more)
        }
        _ => {
            return Err(Error::Decode {
                what: "point locations",
                message: "expected an object or array".to_string(),
            })
        }
    };

    let points: Vec<StagePoint> = entries.iter().filter_map(parse_point).collect();
    let skipped = entries.len() - points.len();
    if skipped > 0 {
        debug!("[GrowthDataClient] skipped {} malformed points", skipped);
    }

    Ok(LocationsPage { points, has_more, skipped })
}

fn parse_point(entry: &Value) -> Option<StagePoint> {
    let lat = entry.get("lat")?.as_f64()?;
    let lng = entry.get("lng")?.as_f64()?;
    let ndvi = entry.get("ndvi").and_then(Value::as_f64);

    let label = entry
        .get("stage")
        .and_then(Value::as_str)
        .or_else(|| entry.get("growth_stage").and_then(Value::as_str));
    let stage = match label {
        Some(label) => GrowthStage::parse(label),
        None => GrowthStage::from_ndvi(ndvi?)?,
    };

    let point = StagePoint { lat, lng, stage, ndvi };
    point.is_valid().then_some(point)
}

/// Parse a Nominatim search response, where coordinates may be strings.
pub fn parse_geocode(bytes: &[u8], query: &str) -> Result<GeocodeHit> {
    let results: Vec<Value> = decode_json("geocoder results", bytes)?;
    let first = results
        .first()
        .ok_or_else(|| Error::NoResults(query.to_string()))?;

    let coord = |key: &str| -> Option<f64> {
        match first.get(key)? {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_f64(),
        }
    };

    match (coord("lat"), coord("lon")) {
        (Some(lat), Some(lng)) => Ok(GeocodeHit {
            position: LatLng::new(lat, lng),
            display_name: first
                .get("display_name")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => Err(Error::Decode {
            what: "geocoder results",
            message: "result has no usable lat/lon".to_string(),
        }),
    }
}
