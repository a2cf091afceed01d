//! Hex-bin density aggregation.
//!
//! Bins visible points into pointy-top hexagons of a fixed screen radius,
//! laid out in Web-Mercator world pixels at the current zoom. Each bin keeps:
//! - Total point count and normalized density (for color ramps)
//! - Per-stage counts and the dominant stage (for fill color)
//! - Its center location (for drawing and tap-to-inspect)

use std::collections::HashMap;

use crate::cluster::StageCounts;
use crate::geo_utils::{project, unproject};
use crate::{GrowthStage, StagePoint, StageVisibility};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Configuration for hex-bin generation
#[derive(Debug, Clone)]
pub struct HexbinConfig {
    /// Hexagon circumradius in screen pixels (default: 20px)
    pub radius_px: f64,
    /// Bins with fewer points are omitted (default: 1)
    pub min_count: u32,
}

impl Default for HexbinConfig {
    fn default() -> Self {
        Self {
            radius_px: 20.0,
            min_count: 1,
        }
    }
}

/// A single hexagonal cell
#[derive(Debug, Clone, PartialEq)]
pub struct HexBin {
    /// Axial column
    pub q: i64,
    /// Axial row
    pub r: i64,
    /// Cell center for rendering
    pub center_lat: f64,
    pub center_lng: f64,
    pub count: u32,
    pub stage_counts: StageCounts,
    pub dominant_stage: GrowthStage,
    /// Normalized density (0.0-1.0) for color mapping
    pub density: f32,
}

/// Complete hex-bin layout for one zoom level
#[derive(Debug, Clone)]
pub struct HexbinResult {
    /// Non-empty bins only, ordered by row then column
    pub bins: Vec<HexBin>,
    pub zoom: u8,
    pub radius_px: f64,
    pub max_count: u32,
    pub total_points: u32,
}

/// Query result when the user taps a location
#[derive(Debug, Clone)]
pub struct HexbinQueryResult {
    pub bin: HexBin,
    /// Summary such as "12 points, mostly Ripening"
    pub suggested_label: String,
}

type AxialCoord = (i64, i64);

/// Hex grid in world-pixel space at a fixed zoom
struct HexGrid {
    radius_px: f64,
    zoom: u8,
}

impl HexGrid {
    fn new(radius_px: f64, zoom: u8) -> Self {
        Self { radius_px, zoom }
    }

    /// Convert lat/lng to the axial coordinate of the containing hexagon
    fn to_axial(&self, lat: f64, lng: f64) -> AxialCoord {
        let (x, y) = project(lat, lng, self.zoom);
        let q = (SQRT_3 / 3.0 * x - y / 3.0) / self.radius_px;
        let r = (2.0 / 3.0 * y) / self.radius_px;
        cube_round(q, r)
    }

    /// Get hexagon center coordinates
    fn center(&self, q: i64, r: i64) -> (f64, f64) {
        let x = self.radius_px * SQRT_3 * (q as f64 + r as f64 / 2.0);
        let y = self.radius_px * 1.5 * r as f64;
        let center = unproject(x, y, self.zoom);
        (center.lat, center.lng)
    }
}

/// Round fractional axial coordinates to the nearest hexagon.
fn cube_round(q: f64, r: f64) -> AxialCoord {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();

    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();

    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }

    (rq as i64, rr as i64)
}

/// Bin the visible points into hexagons at `zoom`.
pub fn generate_hexbins(
    points: &[StagePoint],
    visibility: &StageVisibility,
    zoom: u8,
    config: &HexbinConfig,
) -> HexbinResult {
    let grid = HexGrid::new(config.radius_px, zoom);
    let mut cells: HashMap<AxialCoord, StageCounts> = HashMap::new();

    for point in visibility.filter(points).filter(|p| p.is_valid()) {
        cells
            .entry(grid.to_axial(point.lat, point.lng))
            .or_default()
            .add(point.stage);
    }

    let total_points: u32 = cells.values().map(StageCounts::total).sum();
    let max_count = cells.values().map(StageCounts::total).max().unwrap_or(0);

    let mut bins: Vec<HexBin> = cells
        .into_iter()
        .filter(|(_, counts)| counts.total() >= config.min_count)
        .map(|((q, r), counts)| {
            let (center_lat, center_lng) = grid.center(q, r);
            let count = counts.total();
            HexBin {
                q,
                r,
                center_lat,
                center_lng,
                count,
                stage_counts: counts,
                dominant_stage: counts.dominant(),
                density: count as f32 / max_count.max(1) as f32,
            }
        })
        .collect();

    bins.sort_by_key(|b| (b.r, b.q));

    HexbinResult {
        bins,
        zoom,
        radius_px: config.radius_px,
        max_count,
        total_points,
    }
}

/// Find the hex-bin at a location.
pub fn query_hexbin(result: &HexbinResult, lat: f64, lng: f64) -> Option<HexbinQueryResult> {
    if result.bins.is_empty() {
        return None;
    }

    let grid = HexGrid::new(result.radius_px, result.zoom);
    let (q, r) = grid.to_axial(lat, lng);
    let bin = result.bins.iter().find(|b| b.q == q && b.r == r)?;

    let dominant_count = bin.stage_counts.get(bin.dominant_stage);
    let suggested_label = if bin.count == 1 {
        format!("1 point, {}", bin.dominant_stage)
    } else if dominant_count == bin.count {
        format!("{} points, all {}", bin.count, bin.dominant_stage)
    } else {
        format!("{} points, mostly {}", bin.count, bin.dominant_stage)
    };

    Some(HexbinQueryResult {
        bin: bin.clone(),
        suggested_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hexbins() {
        let result = generate_hexbins(&[], &StageVisibility::default(), 12, &HexbinConfig::default());
        assert!(result.bins.is_empty());
        assert_eq!(result.total_points, 0);
        assert!(query_hexbin(&result, 14.1, 121.2).is_none());
    }

    #[test]
    fn test_cube_round_exact_centers() {
        assert_eq!(cube_round(0.0, 0.0), (0, 0));
        assert_eq!(cube_round(2.1, -0.9), (2, -1));
    }

    #[test]
    fn test_nearby_points_share_a_bin() {
        let points = vec![
            StagePoint::new(14.10000, 121.20000, GrowthStage::Ripening),
            StagePoint::new(14.10001, 121.20001, GrowthStage::Ripening),
            StagePoint::new(14.10002, 121.20000, GrowthStage::Tillering),
        ];
        let result = generate_hexbins(&points, &StageVisibility::default(), 12, &HexbinConfig::default());

        assert_eq!(result.bins.len(), 1);
        let bin = &result.bins[0];
        assert_eq!(bin.count, 3);
        assert_eq!(bin.dominant_stage, GrowthStage::Ripening);
        assert_eq!(bin.density, 1.0);

        // Center lies within one hex radius of the points
        let (cx, cy) = project(bin.center_lat, bin.center_lng, 12);
        let (px, py) = project(14.1, 121.2, 12);
        assert!(((cx - px).powi(2) + (cy - py).powi(2)).sqrt() <= 20.0 + 1e-6);

        let hit = query_hexbin(&result, 14.1, 121.2).unwrap();
        assert_eq!(hit.suggested_label, "3 points, mostly Ripening");
    }

    #[test]
    fn test_distant_points_get_separate_bins_with_density() {
        let points = vec![
            StagePoint::new(14.1, 121.2, GrowthStage::GrandGrowth),
            StagePoint::new(14.1, 121.2, GrowthStage::GrandGrowth),
            StagePoint::new(14.5, 121.6, GrowthStage::Germination),
        ];
        let result = generate_hexbins(&points, &StageVisibility::default(), 12, &HexbinConfig::default());

        assert_eq!(result.bins.len(), 2);
        assert_eq!(result.max_count, 2);
        let sparse = result.bins.iter().find(|b| b.count == 1).unwrap();
        assert_eq!(sparse.density, 0.5);

        let dense = query_hexbin(&result, 14.1, 121.2).unwrap();
        assert_eq!(dense.suggested_label, "2 points, all Grand Growth");
    }

    #[test]
    fn test_hidden_stages_are_not_binned() {
        let points = vec![
            StagePoint::new(14.1, 121.2, GrowthStage::Ripening),
            StagePoint::new(14.5, 121.6, GrowthStage::Tillering),
        ];
        let mut visibility = StageVisibility::default();
        visibility.set(GrowthStage::Ripening, false);

        let result = generate_hexbins(&points, &visibility, 12, &HexbinConfig::default());
        assert_eq!(result.total_points, 1);
        assert_eq!(result.bins[0].dominant_stage, GrowthStage::Tillering);
    }
}
