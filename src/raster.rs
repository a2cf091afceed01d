//! Tile rasterization of growth-stage points.
//!
//! Every slippy-map tile is synthesized on demand: each visible point whose
//! marker touches the tile is plotted as a small filled circle or square at
//! its projected pixel position, colored by growth stage. Rendering is pure;
//! callers that want to avoid re-rendering can keep a [`TileMemo`].
//!
//! [`PointTileLayer`] is the composition wrapper a map host plugs in as a
//! custom tile source: it owns a point snapshot plus an R-tree over it and
//! implements the [`TileSource`] draw callback.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::{self, TILE_SIZE};
use crate::{Bounds, GrowthStage, Result, StagePoint, StageVisibility, TileCoord, Viewport};

/// Marker shape drawn for each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerShape {
    #[default]
    Circle,
    Square,
}

/// Marker styling for the rasterizer.
#[derive(Debug, Clone)]
pub struct RasterStyle {
    pub shape: MarkerShape,
    /// Marker radius in pixels at `reference_zoom`. Default: 3.0
    pub base_radius_px: f64,
    /// Zoom at which `base_radius_px` applies. Default: 14
    pub reference_zoom: u8,
    /// Radius floor so points stay visible with the whole region in view.
    /// Default: 1.5
    pub min_radius_px: f64,
    /// Radius cap at deep zoom. Default: 12.0
    pub max_radius_px: f64,
}

impl Default for RasterStyle {
    fn default() -> Self {
        Self {
            shape: MarkerShape::Circle,
            base_radius_px: 3.0,
            reference_zoom: 14,
            min_radius_px: 1.5,
            max_radius_px: 12.0,
        }
    }
}

impl RasterStyle {
    /// Marker radius at a zoom level: doubles per zoom step, clamped to the
    /// floor and cap.
    pub fn radius_for_zoom(&self, zoom: u8) -> f64 {
        let steps = zoom as i32 - self.reference_zoom as i32;
        (self.base_radius_px * 2f64.powi(steps)).clamp(self.min_radius_px, self.max_radius_px)
    }
}

/// Fill color for a growth stage.
pub fn stage_color(stage: GrowthStage) -> Rgba<u8> {
    match stage {
        GrowthStage::Germination => Rgba([0xFA, 0xCC, 0x15, 0xFF]),
        GrowthStage::Tillering => Rgba([0xFB, 0x92, 0x3C, 0xFF]),
        GrowthStage::GrandGrowth => Rgba([0x22, 0xC5, 0x5E, 0xFF]),
        GrowthStage::Ripening => Rgba([0x25, 0x63, 0xEB, 0xFF]),
        GrowthStage::Unknown => Rgba([0x9C, 0xA3, 0xAF, 0xFF]),
    }
}

// ============================================================================
// Spatial index
// ============================================================================

/// A point's slot in the R-tree (lng/lat envelope).
#[derive(Debug, Clone)]
struct IndexedPoint {
    index: usize,
    lng: f64,
    lat: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

/// R-tree over a point snapshot for per-tile candidate lookup.
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    /// Index every valid point; invalid coordinates are skipped.
    pub fn new(points: &[StagePoint]) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_valid())
            .map(|(index, p)| IndexedPoint { index, lng: p.lng, lat: p.lat })
            .collect();
        Self { tree: RTree::bulk_load(entries) }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Indices of points inside `bounds`, ascending (input order).
    pub fn query(&self, bounds: &Bounds) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [bounds.min_lng, bounds.min_lat],
            [bounds.max_lng, bounds.max_lat],
        );
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|p| p.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

// ============================================================================
// Rasterization
// ============================================================================

/// Tile bounds grown by `pad_px` pixels on every side.
fn padded_tile_bounds(tile: TileCoord, pad_px: f64) -> Bounds {
    let (ox, oy) = tile.origin_px();
    let size = TILE_SIZE as f64;
    let nw = geo_utils::unproject(ox - pad_px, oy - pad_px, tile.z);
    let se = geo_utils::unproject(ox + size + pad_px, oy + size + pad_px, tile.z);
    Bounds {
        min_lat: se.lat,
        max_lat: nw.lat,
        min_lng: nw.lng,
        max_lng: se.lng,
    }
}

/// Plot one marker centred at image-space `(cx, cy)`.
///
/// A pixel is filled when its center falls inside the shape. The pixel under
/// the marker center is always filled so sub-pixel radii stay visible.
fn draw_marker(image: &mut RgbaImage, cx: f64, cy: f64, radius: f64, shape: MarkerShape, color: Rgba<u8>) {
    let (width, height) = (image.width() as i64, image.height() as i64);

    let x0 = ((cx - radius).floor() as i64).max(0);
    let x1 = ((cx + radius).ceil() as i64).min(width - 1);
    let y0 = ((cy - radius).floor() as i64).max(0);
    let y1 = ((cy + radius).ceil() as i64).min(height - 1);

    for iy in y0..=y1 {
        for ix in x0..=x1 {
            let dx = ix as f64 + 0.5 - cx;
            let dy = iy as f64 + 0.5 - cy;
            let inside = match shape {
                MarkerShape::Circle => dx * dx + dy * dy <= radius * radius,
                MarkerShape::Square => dx.abs() <= radius && dy.abs() <= radius,
            };
            if inside {
                image.put_pixel(ix as u32, iy as u32, color);
            }
        }
    }

    let (px, py) = (cx.floor() as i64, cy.floor() as i64);
    if px >= 0 && py >= 0 && px < width && py < height {
        image.put_pixel(px as u32, py as u32, color);
    }
}

/// Draw `candidates` (indices into `points`) onto an image whose top-left
/// corner sits at world pixel `origin` for `zoom`.
fn draw_points<I>(
    image: &mut RgbaImage,
    points: &[StagePoint],
    candidates: I,
    visibility: &StageVisibility,
    origin: (f64, f64),
    zoom: u8,
    style: &RasterStyle,
) -> usize
where
    I: IntoIterator<Item = usize>,
{
    let radius = style.radius_for_zoom(zoom);
    let mut drawn = 0;

    for idx in candidates {
        let point = &points[idx];
        if !point.is_valid() || !visibility.is_visible(point.stage) {
            continue;
        }
        let (wx, wy) = geo_utils::project(point.lat, point.lng, zoom);
        let (cx, cy) = (wx - origin.0, wy - origin.1);

        // Skip markers entirely off-canvas
        if cx + radius < 0.0
            || cy + radius < 0.0
            || cx - radius > image.width() as f64
            || cy - radius > image.height() as f64
        {
            continue;
        }

        draw_marker(image, cx, cy, radius, style.shape, stage_color(point.stage));
        drawn += 1;
    }

    drawn
}

/// Render one 256×256 tile with every visible point that touches it.
///
/// Scans all points. Use [`PointTileLayer`] to render many tiles from the
/// same snapshot through a spatial index.
///
/// # Arguments
/// * `points` - Snapshot to draw; invalid coordinates are skipped
/// * `visibility` - Stages to draw
/// * `tile` - Slippy-map tile address
/// * `style` - Marker shape and size
///
/// # Returns
/// A transparent 256×256 RGBA image. Later points paint over earlier ones.
///
/// # Example
/// ```
/// use sugarcane_map::{GrowthStage, RasterStyle, StagePoint, StageVisibility, TileCoord};
/// use sugarcane_map::{rasterize_tile, stage_color};
///
/// let points = vec![StagePoint::new(14.1, 121.2, GrowthStage::Ripening)];
/// let tile = TileCoord::containing(14.1, 121.2, 14);
/// let image = rasterize_tile(&points, &StageVisibility::default(), tile, &RasterStyle::default());
///
/// let painted = image.pixels().filter(|p| **p == stage_color(GrowthStage::Ripening)).count();
/// assert!(painted > 0);
/// ```
pub fn rasterize_tile(
    points: &[StagePoint],
    visibility: &StageVisibility,
    tile: TileCoord,
    style: &RasterStyle,
) -> RgbaImage {
    let mut image = RgbaImage::new(TILE_SIZE, TILE_SIZE);
    let drawn = draw_points(
        &mut image,
        points,
        0..points.len(),
        visibility,
        tile.origin_px(),
        tile.z,
        style,
    );
    debug!("[raster] tile {}: {} markers", tile, drawn);
    image
}

/// Render the whole viewport into one image (transparent background).
pub fn rasterize_view(
    points: &[StagePoint],
    visibility: &StageVisibility,
    viewport: &Viewport,
    style: &RasterStyle,
) -> RgbaImage {
    let mut image = RgbaImage::new(viewport.width_px.max(1), viewport.height_px.max(1));
    let drawn = draw_points(
        &mut image,
        points,
        0..points.len(),
        visibility,
        viewport.origin_px(),
        viewport.zoom,
        style,
    );
    debug!(
        "[raster] view {}x{} @z{}: {} markers",
        viewport.width_px, viewport.height_px, viewport.zoom, drawn
    );
    image
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

// ============================================================================
// Tile source
// ============================================================================

/// Tile-draw callback a map host invokes for every visible tile.
pub trait TileSource {
    fn render_tile(&self, tile: TileCoord, visibility: &StageVisibility) -> RgbaImage;
}

/// Custom tile layer over a point snapshot.
pub struct PointTileLayer {
    points: Arc<[StagePoint]>,
    index: PointIndex,
    data_bounds: Option<Bounds>,
    style: RasterStyle,
}

impl PointTileLayer {
    pub fn new(points: Arc<[StagePoint]>, style: RasterStyle) -> Self {
        let valid: Vec<StagePoint> = points.iter().copied().filter(StagePoint::is_valid).collect();
        let data_bounds = Bounds::from_points(&valid);
        let index = PointIndex::new(&points);
        Self { points, index, data_bounds, style }
    }

    pub fn points(&self) -> &Arc<[StagePoint]> {
        &self.points
    }

    pub fn style(&self) -> &RasterStyle {
        &self.style
    }

    /// Render a tile and encode it as PNG.
    pub fn render_png(&self, tile: TileCoord, visibility: &StageVisibility) -> Result<Vec<u8>> {
        encode_png(&self.render_tile(tile, visibility))
    }

    /// Render many tiles in parallel.
    #[cfg(feature = "parallel")]
    pub fn render_tiles(&self, tiles: &[TileCoord], visibility: &StageVisibility) -> Vec<(TileCoord, RgbaImage)> {
        use rayon::prelude::*;
        tiles
            .par_iter()
            .map(|tile| (*tile, self.render_tile(*tile, visibility)))
            .collect()
    }

    /// Render many tiles sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn render_tiles(&self, tiles: &[TileCoord], visibility: &StageVisibility) -> Vec<(TileCoord, RgbaImage)> {
        tiles
            .iter()
            .map(|tile| (*tile, self.render_tile(*tile, visibility)))
            .collect()
    }
}

impl TileSource for PointTileLayer {
    fn render_tile(&self, tile: TileCoord, visibility: &StageVisibility) -> RgbaImage {
        let mut image = RgbaImage::new(TILE_SIZE, TILE_SIZE);

        let radius = self.style.radius_for_zoom(tile.z);
        let query_bounds = padded_tile_bounds(tile, radius + 1.0);

        let touches_data = self.data_bounds.is_some_and(|b| {
            geo_utils::bounds_overlap(&b, &query_bounds, 0.0, query_bounds.center().lat)
        });
        if !touches_data {
            return image;
        }

        let candidates = self.index.query(&query_bounds);
        let drawn = draw_points(
            &mut image,
            &self.points,
            candidates,
            visibility,
            tile.origin_px(),
            tile.z,
            &self.style,
        );
        debug!("[raster] layer tile {}: {} markers", tile, drawn);
        image
    }
}

// ============================================================================
// Memo
// ============================================================================

/// Memo key: tile address, visible-stage mask, point-set generation.
pub type TileKey = (TileCoord, u8, u64);

/// Bounded memo of encoded tiles. Oldest entries are evicted first.
pub struct TileMemo {
    capacity: usize,
    entries: HashMap<TileKey, Arc<Vec<u8>>>,
    order: VecDeque<TileKey>,
}

impl TileMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Return the memoized tile for `key`, rendering it with `render` on a miss.
    pub fn get_or_render<F>(&mut self, key: TileKey, render: F) -> Result<Arc<Vec<u8>>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let bytes = Arc::new(render()?);
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, Arc::clone(&bytes));
        self.order.push_back(key);
        Ok(bytes)
    }
}
