//! Click hit-testing against displayed points.
//!
//! Every visible point is projected to screen space at the current zoom and
//! the nearest one to the click wins, provided it lies within the pixel
//! threshold. Ties keep the earlier point in input order.

use crate::{StagePoint, StageVisibility, Viewport};

/// Hit-testing configuration.
#[derive(Debug, Clone)]
pub struct HitConfig {
    /// Maximum screen distance in pixels between click and point.
    /// Default: 10.0
    pub threshold_px: f64,
}

impl Default for HitConfig {
    fn default() -> Self {
        Self { threshold_px: 10.0 }
    }
}

/// A point selected by a click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Index into the point slice
    pub index: usize,
    /// Screen distance from the click in pixels
    pub distance_px: f64,
}

/// Find the visible point nearest to a screen-space click.
///
/// # Arguments
/// * `points` - Snapshot to search
/// * `visibility` - Only points of visible stages can be hit
/// * `viewport` - Map view the click was made in
/// * `click` - Pixel position relative to the viewport's top-left corner
/// * `threshold_px` - Largest screen distance that still counts as a hit
///
/// # Returns
/// The nearest visible point with its index into `points` and its screen
/// distance. On equal distances the earlier point wins. `None` when no visible
/// point lies within `threshold_px`.
///
/// # Example
/// ```
/// use sugarcane_map::{GrowthStage, StagePoint, StageVisibility, Viewport, hit_test};
///
/// let points = vec![StagePoint::new(14.1, 121.2, GrowthStage::Ripening)];
/// let viewport = Viewport::new(14.1, 121.2, 14, 800, 600);
///
/// let hit = hit_test(&points, &StageVisibility::default(), &viewport, (404.0, 300.0), 10.0);
/// assert_eq!(hit.map(|h| h.index), Some(0));
///
/// let miss = hit_test(&points, &StageVisibility::default(), &viewport, (430.0, 300.0), 10.0);
/// assert!(miss.is_none());
/// ```
pub fn hit_test(
    points: &[StagePoint],
    visibility: &StageVisibility,
    viewport: &Viewport,
    click: (f64, f64),
    threshold_px: f64,
) -> Option<Hit> {
    let mut best: Option<Hit> = None;

    for (index, point) in points.iter().enumerate() {
        if !point.is_valid() || !visibility.is_visible(point.stage) {
            continue;
        }
        let (x, y) = viewport.project(point.lat, point.lng);
        let distance_px = ((x - click.0).powi(2) + (y - click.1).powi(2)).sqrt();

        if best.map_or(true, |b| distance_px < b.distance_px) {
            best = Some(Hit { index, distance_px });
        }
    }

    best.filter(|b| b.distance_px <= threshold_px)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrowthStage;

    fn viewport() -> Viewport {
        Viewport::new(14.1, 121.2, 15, 800, 600)
    }

    /// Point that projects exactly `dx` pixels right of the view center.
    fn point_at_offset(dx: f64, stage: GrowthStage) -> StagePoint {
        let at = viewport().unproject(400.0 + dx, 300.0);
        StagePoint::new(at.lat, at.lng, stage)
    }

    #[test]
    fn test_never_selects_beyond_threshold() {
        let points = vec![point_at_offset(12.0, GrowthStage::Ripening)];
        let vis = StageVisibility::default();

        assert!(hit_test(&points, &vis, &viewport(), (400.0, 300.0), 10.0).is_none());
        let hit = hit_test(&points, &vis, &viewport(), (400.0, 300.0), 15.0).unwrap();
        assert!((hit.distance_px - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_point_wins() {
        let points = vec![
            point_at_offset(8.0, GrowthStage::Tillering),
            point_at_offset(3.0, GrowthStage::Ripening),
            point_at_offset(-6.0, GrowthStage::Germination),
        ];
        let hit = hit_test(&points, &StageVisibility::default(), &viewport(), (400.0, 300.0), 10.0);
        assert_eq!(hit.map(|h| h.index), Some(1));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let p = point_at_offset(2.0, GrowthStage::Tillering);
        let q = StagePoint { stage: GrowthStage::Ripening, ..p };
        let hit = hit_test(&[p, q], &StageVisibility::default(), &viewport(), (400.0, 300.0), 10.0);
        assert_eq!(hit.map(|h| h.index), Some(0));
    }

    #[test]
    fn test_hidden_points_are_not_candidates() {
        let points = vec![
            point_at_offset(1.0, GrowthStage::Ripening),
            point_at_offset(7.0, GrowthStage::Tillering),
        ];
        let mut vis = StageVisibility::default();
        vis.set(GrowthStage::Ripening, false);

        let hit = hit_test(&points, &vis, &viewport(), (400.0, 300.0), 10.0);
        assert_eq!(hit.map(|h| h.index), Some(1));

        vis.set(GrowthStage::Tillering, false);
        assert!(hit_test(&points, &vis, &viewport(), (400.0, 300.0), 10.0).is_none());

        vis.set(GrowthStage::Ripening, true);
        let hit = hit_test(&points, &vis, &viewport(), (400.0, 300.0), 10.0);
        assert_eq!(hit.map(|h| h.index), Some(0));
    }

    #[test]
    fn test_empty_points() {
        assert!(hit_test(&[], &StageVisibility::default(), &viewport(), (0.0, 0.0), 10.0).is_none());
    }
}
