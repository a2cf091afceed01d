//! Page-level map state.
//!
//! [`MapView`] is the single writer of the point snapshot. It tracks the load
//! state, stage filters, viewport and popup, and answers the render-time
//! queries (markers, clusters, hex-bins, tiles, clicks) against the current
//! snapshot. Queries never mutate the snapshot; it is replaced on fetch
//! completion or extended by appending a page.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use image::{Rgba, RgbaImage};
use log::{info, warn};

use crate::cluster::{cluster_for_viewport, ClusterConfig, PointGroup};
use crate::export::SnapshotDocument;
use crate::hexbin::{generate_hexbins, HexbinConfig, HexbinResult};
use crate::hit_test::{hit_test, HitConfig};
use crate::popup::{PointDetail, PopupState};
use crate::raster::{rasterize_view, stage_color, PointTileLayer, RasterStyle, TileMemo};
use crate::{Error, GrowthStage, LatLng, Result, StagePoint, StageVisibility, TileCoord, Viewport};

/// Shown in place of the map when the point fetch fails.
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load sugarcane data.";
/// Instruction shown under [`LOAD_ERROR_MESSAGE`].
pub const RELOAD_HINT: &str = "Please reload the page to try again.";

/// Initial map center (Batangas, Philippines).
pub const DEFAULT_CENTER: LatLng = LatLng { lat: 14.0488, lng: 121.2799 };
pub const DEFAULT_ZOOM: u8 = 10;

const TILE_MEMO_CAPACITY: usize = 256;

/// Whether point data is available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Loading,
    Ready,
    Failed(String),
}

impl LoadState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }
}

/// A single drawn point marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Index into the snapshot
    pub index: usize,
    pub position: LatLng,
    pub stage: GrowthStage,
    pub color: Rgba<u8>,
}

/// Map state for one page.
pub struct MapView {
    state: LoadState,
    layer: PointTileLayer,
    generation: u64,
    visibility: StageVisibility,
    viewport: Viewport,
    popup: PopupState,
    cluster_config: ClusterConfig,
    hexbin_config: HexbinConfig,
    hit_config: HitConfig,
    memo: TileMemo,
}

impl Default for MapView {
    fn default() -> Self {
        Self::new(Viewport::new(DEFAULT_CENTER.lat, DEFAULT_CENTER.lng, DEFAULT_ZOOM, 1024, 768))
    }
}

impl MapView {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: LoadState::Loading,
            layer: PointTileLayer::new(Arc::from(Vec::new()), RasterStyle::default()),
            generation: 0,
            visibility: StageVisibility::default(),
            viewport,
            popup: PopupState::default(),
            cluster_config: ClusterConfig::default(),
            hexbin_config: HexbinConfig::default(),
            hit_config: HitConfig::default(),
            memo: TileMemo::new(TILE_MEMO_CAPACITY),
        }
    }

    pub fn with_cluster_config(mut self, config: ClusterConfig) -> Self {
        self.cluster_config = config;
        self
    }

    pub fn with_hexbin_config(mut self, config: HexbinConfig) -> Self {
        self.hexbin_config = config;
        self
    }

    pub fn with_hit_config(mut self, config: HitConfig) -> Self {
        self.hit_config = config;
        self
    }

    pub fn with_raster_style(mut self, style: RasterStyle) -> Self {
        let points = Arc::clone(self.layer.points());
        self.layer = PointTileLayer::new(points, style);
        self.memo.clear();
        self
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Error text for the failed state, with the reload hint.
    pub fn error_text(&self) -> Option<String> {
        match &self.state {
            LoadState::Failed(message) => Some(format!("{}\n{}", message, RELOAD_HINT)),
            _ => None,
        }
    }

    pub fn begin_loading(&mut self) {
        self.state = LoadState::Loading;
    }

    /// Apply the outcome of a full fetch.
    ///
    /// Success replaces the snapshot wholesale (an empty set is valid data).
    /// Failure keeps whatever snapshot was there and enters the failed state.
    pub fn finish_loading(&mut self, result: Result<Arc<[StagePoint]>>) {
        match result {
            Ok(points) => {
                self.replace_points(points);
                self.state = LoadState::Ready;
            }
            Err(e) => {
                warn!("[MapView] load failed: {}", e);
                self.state = LoadState::Failed(LOAD_ERROR_MESSAGE.to_string());
            }
        }
    }

    /// Append a fetched page. Points are never de-duplicated or removed.
    pub fn append_page(&mut self, page: &[StagePoint]) {
        self.state = LoadState::Ready;
        if page.is_empty() {
            return;
        }
        let mut points = self.layer.points().to_vec();
        points.extend_from_slice(page);
        self.replace_points(points.into());
    }

    fn replace_points(&mut self, points: Arc<[StagePoint]>) {
        let style = self.layer.style().clone();
        self.layer = PointTileLayer::new(points, style);
        self.generation += 1;
        self.memo.clear();
        self.popup.close();
        info!(
            "[MapView] snapshot generation {}: {} points",
            self.generation,
            self.layer.points().len()
        );
    }

    pub fn points(&self) -> &Arc<[StagePoint]> {
        self.layer.points()
    }

    /// Incremented every time the snapshot changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ------------------------------------------------------------------
    // Filters and viewport
    // ------------------------------------------------------------------

    pub fn visibility(&self) -> &StageVisibility {
        &self.visibility
    }

    /// Flip a stage filter and return whether the stage is now visible.
    pub fn toggle_stage(&mut self, stage: GrowthStage) -> bool {
        let visible = self.visibility.toggle(stage);
        self.close_popup_if_hidden();
        visible
    }

    pub fn set_stage_visible(&mut self, stage: GrowthStage, visible: bool) {
        self.visibility.set(stage, visible);
        self.close_popup_if_hidden();
    }

    fn close_popup_if_hidden(&mut self) {
        let hidden = self
            .popup
            .current()
            .is_some_and(|detail| !self.visibility.is_visible(detail.point.stage));
        if hidden {
            self.popup.close();
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    // ------------------------------------------------------------------
    // Render queries
    // ------------------------------------------------------------------

    /// Visible points in snapshot order.
    pub fn visible_points(&self) -> Vec<StagePoint> {
        self.visibility
            .filter(self.layer.points())
            .filter(|p| p.is_valid())
            .copied()
            .collect()
    }

    /// Markers for visible points inside the viewport.
    pub fn markers(&self) -> Vec<Marker> {
        let bounds = self.viewport.bounds();
        self.layer
            .points()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_valid() && self.visibility.is_visible(p.stage))
            .filter(|(_, p)| bounds.contains(p.lat, p.lng))
            .map(|(index, p)| Marker {
                index,
                position: p.position(),
                stage: p.stage,
                color: stage_color(p.stage),
            })
            .collect()
    }

    /// Proximity groups for the current zoom.
    pub fn clusters(&self) -> Vec<PointGroup> {
        cluster_for_viewport(
            self.layer.points(),
            &self.visibility,
            &self.viewport,
            &self.cluster_config,
        )
    }

    pub fn hexbins(&self) -> HexbinResult {
        generate_hexbins(
            self.layer.points(),
            &self.visibility,
            self.viewport.zoom,
            &self.hexbin_config,
        )
    }

    /// PNG bytes for one tile, memoized per filter set and snapshot.
    pub fn render_tile(&mut self, tile: TileCoord) -> Result<Arc<Vec<u8>>> {
        let key = (tile, self.visibility.mask(), self.generation);
        let layer = &self.layer;
        let visibility = &self.visibility;
        self.memo.get_or_render(key, || layer.render_png(tile, visibility))
    }

    /// The whole viewport as one image.
    pub fn render_view(&self) -> RgbaImage {
        rasterize_view(
            self.layer.points(),
            &self.visibility,
            &self.viewport,
            self.layer.style(),
        )
    }

    // ------------------------------------------------------------------
    // Interaction
    // ------------------------------------------------------------------

    /// Handle a click at screen pixel `(x, y)`.
    ///
    /// Opens the popup for the nearest visible point within the hit threshold
    /// or closes it when nothing is hit.
    ///
    /// # Arguments
    /// * `x`, `y` - Pixel position relative to the viewport's top-left corner
    /// * `today` - Reference date for the harvest estimate
    ///
    /// # Returns
    /// The open popup's detail, or `None` when the click missed.
    pub fn click(&mut self, x: f64, y: f64, today: NaiveDate) -> Option<&PointDetail> {
        let points = self.layer.points();
        let detail = hit_test(
            points,
            &self.visibility,
            &self.viewport,
            (x, y),
            self.hit_config.threshold_px,
        )
        .map(|hit| PointDetail::new(hit.index, points[hit.index], today));

        self.popup.on_click(detail);
        self.popup.current()
    }

    pub fn popup(&self) -> &PopupState {
        &self.popup
    }

    pub fn close_popup(&mut self) {
        self.popup.close();
    }

    /// Export the current view as a PDF document.
    pub fn snapshot(&self, generated_at: NaiveDateTime) -> Result<SnapshotDocument> {
        if !self.state.is_ready() {
            return Err(Error::NotLoaded);
        }
        SnapshotDocument::build(&self.render_view(), &self.viewport, generated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::READY_FOR_HARVEST;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn ready_view(points: Vec<StagePoint>) -> MapView {
        let mut view = MapView::new(Viewport::new(14.1, 121.2, 14, 800, 600));
        view.begin_loading();
        view.finish_loading(Ok(points.into()));
        view
    }

    #[test]
    fn test_single_ripening_point_scenario() {
        let mut view = ready_view(vec![StagePoint::new(14.1, 121.2, GrowthStage::Ripening)]);

        let markers = view.markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].color, Rgba([0x25, 0x63, 0xEB, 0xFF]));

        let image = view.render_view();
        assert!(image.pixels().any(|p| *p == stage_color(GrowthStage::Ripening)));

        let detail = view.click(405.0, 303.0, today()).unwrap();
        assert!(detail.text().contains(READY_FOR_HARVEST));
        assert!(view.popup().is_open());
    }

    #[test]
    fn test_click_on_empty_map_closes_popup() {
        let mut view = ready_view(vec![StagePoint::new(14.1, 121.2, GrowthStage::Tillering)]);
        assert!(view.click(400.0, 300.0, today()).is_some());
        assert!(view.click(700.0, 50.0, today()).is_none());
        assert_eq!(*view.popup(), PopupState::Idle);
    }

    #[test]
    fn test_toggle_leaves_no_residual_state() {
        let mut view = ready_view(vec![
            StagePoint::new(14.1, 121.2, GrowthStage::Ripening),
            StagePoint::new(14.102, 121.202, GrowthStage::Germination),
        ]);
        let before = view.render_tile(TileCoord::containing(14.1, 121.2, 14)).unwrap();
        assert!(view.click(400.0, 300.0, today()).is_some());

        assert!(!view.toggle_stage(GrowthStage::Ripening));
        assert!(!view.popup().is_open());
        assert_eq!(view.visible_points().len(), 1);
        assert_eq!(view.markers().len(), 1);
        assert_eq!(
            view.click(400.0, 300.0, today()).map(|d| d.index),
            None,
            "hidden point must not be hit"
        );

        assert!(view.toggle_stage(GrowthStage::Ripening));
        assert_eq!(view.visible_points().len(), 2);
        let after = view.render_tile(TileCoord::containing(14.1, 121.2, 14)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_failed_load_keeps_snapshot_and_reports() {
        let mut view = ready_view(vec![StagePoint::new(14.1, 121.2, GrowthStage::Ripening)]);
        view.begin_loading();
        view.finish_loading(Err(Error::Status {
            endpoint: "/sugarcane-locations".into(),
            status: 500,
        }));

        assert_eq!(*view.state(), LoadState::Failed(LOAD_ERROR_MESSAGE.to_string()));
        assert!(view.error_text().unwrap().contains("reload"));
        assert_eq!(view.points().len(), 1);
        assert!(matches!(
            view.snapshot(today().and_hms_opt(0, 0, 0).unwrap()),
            Err(Error::NotLoaded)
        ));
    }

    #[test]
    fn test_append_page_is_append_only() {
        let mut view = MapView::default();
        let p = StagePoint::new(14.1, 121.2, GrowthStage::Ripening);

        view.append_page(&[p]);
        assert!(view.state().is_ready());
        view.append_page(&[p, StagePoint::new(14.2, 121.3, GrowthStage::Tillering)]);
        view.append_page(&[]);

        assert_eq!(view.points().len(), 3);
        assert_eq!(view.generation(), 2);
    }

    #[test]
    fn test_empty_result_is_ready_with_no_markers() {
        let view = ready_view(Vec::new());
        assert!(view.state().is_ready());
        assert!(view.markers().is_empty());
        assert!(view.clusters().is_empty());
        assert!(view.hexbins().bins.is_empty());
    }

    #[test]
    fn test_clusters_and_snapshot() {
        let view = ready_view(vec![
            StagePoint::new(14.1000, 121.2000, GrowthStage::Ripening),
            StagePoint::new(14.1010, 121.2010, GrowthStage::Ripening),
        ]);
        let clusters = view.clusters();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_indices, vec![0, 1]);

        let at = today().and_hms_opt(8, 30, 0).unwrap();
        let doc = view.snapshot(at).unwrap();
        assert_eq!(doc.filename(), "sugarcane-map-20240115-083000.pdf");
        assert!(doc.bytes().starts_with(b"%PDF"));
    }
}
