//! # Sugarcane Map
//!
//! Display core for NDVI crop-growth maps: stage-labelled sample points are
//! filtered, thinned, rasterized onto slippy-map tiles, hit-tested on click
//! and exported as a snapshot document.
//!
//! This library provides:
//! - Proximity grouping of nearby points (single-link, zoom-dependent threshold)
//! - Hex-bin density aggregation
//! - Per-tile canvas rasterization with a fixed growth-stage palette
//! - Click hit-testing and harvest-date popups
//! - A policy-driven point cache and a trailing viewport debouncer
//! - PDF snapshot export
//! - HTTP client for the classification service and the geocoder
//!
//! ## Features
//!
//! - **`parallel`** - Render batches of tiles with rayon
//! - **`http`** - Enable the HTTP client for the classification service
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use sugarcane_map::{
//!     GrowthStage, StagePoint, StageVisibility, TileCoord, RasterStyle, rasterize_tile,
//! };
//!
//! let points = vec![
//!     StagePoint::new(14.10, 121.20, GrowthStage::Ripening),
//!     StagePoint::new(14.11, 121.21, GrowthStage::Tillering),
//! ];
//!
//! let tile = TileCoord::containing(14.10, 121.20, 12);
//! let image = rasterize_tile(&points, &StageVisibility::default(), tile, &RasterStyle::default());
//! assert_eq!(image.width(), 256);
//! ```

use std::collections::HashMap;
use std::fmt;

pub mod error;
pub use error::{Error, Result};

pub mod geo_utils;

pub mod config;
pub use config::ServiceConfig;

// Proximity grouping for marker thinning
pub mod cluster;
pub use cluster::{ClusterConfig, PointGroup, cluster_for_viewport, group_points};

// Hex-bin density aggregation
pub mod hexbin;
pub use hexbin::{HexBin, HexbinConfig, HexbinQueryResult, HexbinResult, generate_hexbins, query_hexbin};

// Tile rasterization
pub mod raster;
pub use raster::{
    MarkerShape, PointIndex, PointTileLayer, RasterStyle, TileMemo, TileSource,
    encode_png, rasterize_tile, rasterize_view, stage_color,
};

pub mod hit_test;
pub use hit_test::{HitConfig, hit_test};

pub mod popup;
pub use popup::{HarvestEstimate, PointDetail, PopupState, estimate_harvest};

pub mod cache;
pub use cache::{InvalidationPolicy, ManualRefresh, PointCache, TtlPolicy};

pub mod debounce;
pub use debounce::ViewportDebouncer;

pub mod view;
pub use view::{LoadState, MapView, Marker};

pub mod export;
pub use export::{SnapshotDocument, snapshot_filename};

// HTTP module for the classification service
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{GeocodeHit, GrowthDataClient, LastUpdate, LocationsPage, NdviExtent, NdviInfo, Overlay};

// ============================================================================
// Core Types
// ============================================================================

/// Sugarcane growth stage assigned to a sample point.
///
/// The four known stages are ordered by crop development. Labels the service
/// sends that match none of them land in [`GrowthStage::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GrowthStage {
    Germination,
    Tillering,
    GrandGrowth,
    Ripening,
    Unknown,
}

impl GrowthStage {
    /// The four known stages in growth order.
    pub const ALL: [GrowthStage; 4] = [
        GrowthStage::Germination,
        GrowthStage::Tillering,
        GrowthStage::GrandGrowth,
        GrowthStage::Ripening,
    ];

    /// Parse a stage label as sent by the service.
    ///
    /// Matching ignores case, spaces, dashes and underscores, so
    /// `"Grand Growth"`, `"grand_growth"` and `"GrandGrowth"` all parse.
    /// `"Emergence"` is an alias for germination.
    pub fn parse(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "germination" | "emergence" => GrowthStage::Germination,
            "tillering" => GrowthStage::Tillering,
            "grandgrowth" => GrowthStage::GrandGrowth,
            "ripening" => GrowthStage::Ripening,
            _ => GrowthStage::Unknown,
        }
    }

    /// Classify a raw NDVI value the way the classification service does.
    ///
    /// The service applies its range rules in sequence and later rules
    /// overwrite earlier ones, so the ripening band `[0.3, 0.5)` wins over the
    /// upper half of the tillering band. Values outside every band are
    /// unclassified.
    pub fn from_ndvi(ndvi: f64) -> Option<Self> {
        if !ndvi.is_finite() {
            return None;
        }
        match ndvi {
            v if (0.3..0.5).contains(&v) => Some(GrowthStage::Ripening),
            v if (0.5..0.7).contains(&v) => Some(GrowthStage::GrandGrowth),
            v if (0.2..0.4).contains(&v) => Some(GrowthStage::Tillering),
            v if (0.1..0.2).contains(&v) => Some(GrowthStage::Germination),
            _ => None,
        }
    }

    /// Human-readable stage name used in popups and legends.
    pub fn display_name(&self) -> &'static str {
        match self {
            GrowthStage::Germination => "Germination",
            GrowthStage::Tillering => "Tillering",
            GrowthStage::GrandGrowth => "Grand Growth",
            GrowthStage::Ripening => "Ripening",
            GrowthStage::Unknown => "Unknown",
        }
    }

    /// NDVI band shown in the legend for this stage.
    pub fn legend_range(&self) -> Option<(f64, f64)> {
        match self {
            GrowthStage::Germination => Some((0.1, 0.2)),
            GrowthStage::Tillering => Some((0.2, 0.4)),
            GrowthStage::GrandGrowth => Some((0.5, 0.7)),
            GrowthStage::Ripening => Some((0.3, 0.5)),
            GrowthStage::Unknown => None,
        }
    }

    fn bit(&self) -> u8 {
        match self {
            GrowthStage::Germination => 1,
            GrowthStage::Tillering => 1 << 1,
            GrowthStage::GrandGrowth => 1 << 2,
            GrowthStage::Ripening => 1 << 3,
            GrowthStage::Unknown => 1 << 4,
        }
    }
}

impl fmt::Display for GrowthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A latitude/longitude pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A geo-located, stage-labelled sample point.
///
/// # Example
/// ```
/// use sugarcane_map::{GrowthStage, StagePoint};
/// let point = StagePoint::new(14.1, 121.2, GrowthStage::Ripening).with_ndvi(0.42);
/// assert_eq!(point.ndvi, Some(0.42));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePoint {
    pub lat: f64,
    pub lng: f64,
    pub stage: GrowthStage,
    pub ndvi: Option<f64>,
}

impl StagePoint {
    /// Create a new point without an NDVI reading.
    pub fn new(lat: f64, lng: f64, stage: GrowthStage) -> Self {
        Self { lat, lng, stage, ndvi: None }
    }

    pub fn with_ndvi(mut self, ndvi: f64) -> Self {
        self.ndvi = Some(ndvi);
        self
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }
}

/// Geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from a south-west and a north-east corner.
    pub fn from_corners(sw: LatLng, ne: LatLng) -> Self {
        Self {
            min_lat: sw.lat.min(ne.lat),
            max_lat: sw.lat.max(ne.lat),
            min_lng: sw.lng.min(ne.lng),
            max_lng: sw.lng.max(ne.lng),
        }
    }

    /// Create bounds from sample points. Returns `None` for empty input.
    pub fn from_points(points: &[StagePoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn north_east(&self) -> LatLng {
        LatLng::new(self.max_lat, self.max_lng)
    }

    pub fn south_west(&self) -> LatLng {
        LatLng::new(self.min_lat, self.min_lng)
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

/// Address of a 256px slippy-map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Highest zoom level the rasterizer accepts.
    pub const MAX_ZOOM: u8 = 22;

    /// Create a tile coordinate, rejecting addresses outside the zoom level's grid.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        if z > Self::MAX_ZOOM {
            return Err(Error::InvalidTile { z, x, y });
        }
        let n = 1u32 << z;
        if x >= n || y >= n {
            return Err(Error::InvalidTile { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// The tile that contains a location at the given zoom.
    pub fn containing(lat: f64, lng: f64, z: u8) -> Self {
        let z = z.min(Self::MAX_ZOOM);
        let (px, py) = geo_utils::project(lat, lng, z);
        let max_index = (1u32 << z) - 1;
        let x = (px / geo_utils::TILE_SIZE as f64).floor().clamp(0.0, max_index as f64) as u32;
        let y = (py / geo_utils::TILE_SIZE as f64).floor().clamp(0.0, max_index as f64) as u32;
        Self { z, x, y }
    }

    /// Geographic bounds covered by this tile.
    pub fn bounds(&self) -> Bounds {
        geo_utils::tile_bounds(*self)
    }

    /// World-pixel position of the tile's top-left corner.
    pub fn origin_px(&self) -> (f64, f64) {
        let size = geo_utils::TILE_SIZE as f64;
        (self.x as f64 * size, self.y as f64 * size)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// The map's current view: center, zoom and pixel size.
///
/// Owned by whatever hosts the map. Everything that depends on pan/zoom reads
/// it through [`Viewport::project`] and [`Viewport::bounds`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_lat: f64,
    pub center_lng: f64,
    pub zoom: u8,
    /// View width in screen pixels
    pub width_px: u32,
    /// View height in screen pixels
    pub height_px: u32,
}

impl Viewport {
    pub fn new(center_lat: f64, center_lng: f64, zoom: u8, width_px: u32, height_px: u32) -> Self {
        Self {
            center_lat,
            center_lng,
            zoom: zoom.min(TileCoord::MAX_ZOOM),
            width_px,
            height_px,
        }
    }

    /// World-pixel position of the view's top-left corner.
    pub fn origin_px(&self) -> (f64, f64) {
        let (cx, cy) = geo_utils::project(self.center_lat, self.center_lng, self.zoom);
        (cx - self.width_px as f64 / 2.0, cy - self.height_px as f64 / 2.0)
    }

    /// Project a location to screen pixels relative to the view's top-left corner.
    pub fn project(&self, lat: f64, lng: f64) -> (f64, f64) {
        let (ox, oy) = self.origin_px();
        let (px, py) = geo_utils::project(lat, lng, self.zoom);
        (px - ox, py - oy)
    }

    /// Location under a screen pixel.
    pub fn unproject(&self, x: f64, y: f64) -> LatLng {
        let (ox, oy) = self.origin_px();
        geo_utils::unproject(ox + x, oy + y, self.zoom)
    }

    pub fn bounds_ne(&self) -> LatLng {
        self.unproject(self.width_px as f64, 0.0)
    }

    pub fn bounds_sw(&self) -> LatLng {
        self.unproject(0.0, self.height_px as f64)
    }

    /// Geographic bounds of the visible area.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_corners(self.bounds_sw(), self.bounds_ne())
    }

    /// Tiles needed to cover the view.
    pub fn covering_tiles(&self) -> Vec<TileCoord> {
        let size = geo_utils::TILE_SIZE as f64;
        let (ox, oy) = self.origin_px();
        let max_index = ((1u64 << self.zoom) - 1) as f64;

        let x0 = (ox / size).floor().clamp(0.0, max_index) as u32;
        let x1 = ((ox + self.width_px as f64) / size).floor().clamp(0.0, max_index) as u32;
        let y0 = (oy / size).floor().clamp(0.0, max_index) as u32;
        let y1 = ((oy + self.height_px as f64) / size).floor().clamp(0.0, max_index) as u32;

        let mut tiles = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
        for y in y0..=y1 {
            for x in x0..=x1 {
                tiles.push(TileCoord { z: self.zoom, x, y });
            }
        }
        tiles
    }
}

/// Per-stage display filter. Stages without an entry are visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageVisibility {
    visible: HashMap<GrowthStage, bool>,
}

impl StageVisibility {
    pub fn is_visible(&self, stage: GrowthStage) -> bool {
        self.visible.get(&stage).copied().unwrap_or(true)
    }

    pub fn set(&mut self, stage: GrowthStage, visible: bool) {
        self.visible.insert(stage, visible);
    }

    /// Flip a stage's visibility and return the new value.
    pub fn toggle(&mut self, stage: GrowthStage) -> bool {
        let next = !self.is_visible(stage);
        self.visible.insert(stage, next);
        next
    }

    /// Compact key of the visible set, stable across insertion order.
    pub fn mask(&self) -> u8 {
        GrowthStage::ALL
            .iter()
            .chain(std::iter::once(&GrowthStage::Unknown))
            .filter(|s| self.is_visible(**s))
            .fold(0, |acc, s| acc | s.bit())
    }

    /// Points whose stage is currently visible, in input order.
    pub fn filter<'a>(&'a self, points: &'a [StagePoint]) -> impl Iterator<Item = &'a StagePoint> + 'a {
        points.iter().filter(move |p| self.is_visible(p.stage))
    }
}

// ============================================================================
// Tests
// ============================================================================
