//! Proximity grouping for marker thinning.
//!
//! Nearby points are merged into groups by single-link distance: a point
//! joins a group when it lies within the threshold of any member already in
//! it. The threshold comes from a stepped zoom table, so markers merge
//! aggressively when zoomed out and separate as the user zooms in.
//!
//! Processing order is input order. The first point of a group is its
//! representative, and groups smaller than [`ClusterConfig::min_count`] are
//! dropped from display entirely rather than shown as singletons.

use log::debug;

use crate::geo_utils::{compute_center, haversine_distance, lng_delta, search_window};
use crate::{GrowthStage, LatLng, StagePoint, StageVisibility, Viewport};

/// Configuration for proximity grouping.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Groups with fewer members than this are not displayed.
    /// Default: 2
    pub min_count: usize,

    /// Stepped distance table as `(max_zoom, meters)` pairs, ascending by zoom.
    /// The first entry whose `max_zoom` is >= the current zoom applies.
    pub zoom_thresholds: Vec<(u8, f64)>,

    /// Threshold used above the last table breakpoint.
    /// Default: 100.0 meters
    pub finest_threshold: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_count: 2,
            zoom_thresholds: vec![
                (6, 10_000.0),
                (8, 5_000.0),
                (10, 2_000.0),
                (12, 1_000.0),
                (14, 500.0),
                (16, 200.0),
            ],
            finest_threshold: 100.0,
        }
    }
}

impl ClusterConfig {
    /// Grouping distance in meters for a zoom level.
    pub fn threshold_for_zoom(&self, zoom: u8) -> f64 {
        self.zoom_thresholds
            .iter()
            .find(|(max_zoom, _)| zoom <= *max_zoom)
            .map(|(_, meters)| *meters)
            .unwrap_or(self.finest_threshold)
    }
}

/// Per-stage point counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub germination: u32,
    pub tillering: u32,
    pub grand_growth: u32,
    pub ripening: u32,
    pub unknown: u32,
}

impl StageCounts {
    pub fn add(&mut self, stage: GrowthStage) {
        *self.slot(stage) += 1;
    }

    pub fn get(&self, stage: GrowthStage) -> u32 {
        match stage {
            GrowthStage::Germination => self.germination,
            GrowthStage::Tillering => self.tillering,
            GrowthStage::GrandGrowth => self.grand_growth,
            GrowthStage::Ripening => self.ripening,
            GrowthStage::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> u32 {
        self.germination + self.tillering + self.grand_growth + self.ripening + self.unknown
    }

    /// Most frequent stage; ties go to the earlier stage in growth order.
    pub fn dominant(&self) -> GrowthStage {
        let mut best = GrowthStage::Unknown;
        let mut best_count = 0;
        for stage in GrowthStage::ALL.iter().chain(std::iter::once(&GrowthStage::Unknown)) {
            let count = self.get(*stage);
            if count > best_count {
                best = *stage;
                best_count = count;
            }
        }
        best
    }

    fn slot(&mut self, stage: GrowthStage) -> &mut u32 {
        match stage {
            GrowthStage::Germination => &mut self.germination,
            GrowthStage::Tillering => &mut self.tillering,
            GrowthStage::GrandGrowth => &mut self.grand_growth,
            GrowthStage::Ripening => &mut self.ripening,
            GrowthStage::Unknown => &mut self.unknown,
        }
    }
}

/// A group of nearby points displayed as one marker.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGroup {
    /// First member in input order; shown as the marker
    pub representative: StagePoint,
    /// Indices into the input slice, in the order members joined
    pub member_indices: Vec<usize>,
    /// Centroid of all members
    pub center: LatLng,
    pub stage_counts: StageCounts,
}

impl PointGroup {
    pub fn len(&self) -> usize {
        self.member_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_indices.is_empty()
    }

    pub fn dominant_stage(&self) -> GrowthStage {
        self.stage_counts.dominant()
    }
}

/// Group points by single-link proximity.
///
/// Iterates `points` in order. Each point not yet claimed seeds a group, which
/// then grows by scanning every later unclaimed point against each member in
/// join order and claiming it when the haversine distance is strictly below
/// `threshold_m`. Worst case O(n²).
///
/// Groups with fewer than `min_count` members are discarded.
///
/// # Arguments
/// * `points` - Points in input order; the order decides seeds and representatives
/// * `threshold_m` - Link distance in meters (exclusive)
/// * `min_count` - Smallest group size kept in the output
///
/// # Returns
/// Groups in seed order. `member_indices` index into `points`, seed first, then
/// members in join order.
///
/// # Example
/// ```
/// use sugarcane_map::{GrowthStage, StagePoint, group_points};
///
/// let points = vec![
///     StagePoint::new(14.1000, 121.2000, GrowthStage::Ripening),
///     StagePoint::new(14.1001, 121.2001, GrowthStage::Tillering),
///     StagePoint::new(15.0000, 122.0000, GrowthStage::Ripening),
/// ];
///
/// let groups = group_points(&points, 100.0, 2);
/// assert_eq!(groups.len(), 1); // the isolated point is below min_count
/// assert_eq!(groups[0].member_indices, vec![0, 1]);
/// ```
pub fn group_points(points: &[StagePoint], threshold_m: f64, min_count: usize) -> Vec<PointGroup> {
    let candidates: Vec<usize> = (0..points.len()).collect();
    group_candidates(points, &candidates, threshold_m, min_count)
}

/// Group the points visible under `visibility` using the zoom-derived threshold.
///
/// Member indices refer to the full `points` slice.
pub fn cluster_for_viewport(
    points: &[StagePoint],
    visibility: &StageVisibility,
    viewport: &Viewport,
    config: &ClusterConfig,
) -> Vec<PointGroup> {
    let candidates: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| visibility.is_visible(p.stage) && p.is_valid())
        .map(|(i, _)| i)
        .collect();

    let threshold = config.threshold_for_zoom(viewport.zoom);
    let groups = group_candidates(points, &candidates, threshold, config.min_count);

    debug!(
        "[cluster] zoom {} threshold {}m: {} visible points -> {} groups",
        viewport.zoom,
        threshold,
        candidates.len(),
        groups.len()
    );

    groups
}

fn group_candidates(
    points: &[StagePoint],
    candidates: &[usize],
    threshold_m: f64,
    min_count: usize,
) -> Vec<PointGroup> {
    let n = candidates.len();
    let mut claimed = vec![false; n];
    let mut groups = Vec::new();

    for seed in 0..n {
        if claimed[seed] {
            continue;
        }
        claimed[seed] = true;

        let mut members = vec![seed];
        let mut cursor = 0;

        while cursor < members.len() {
            let member = &points[candidates[members[cursor]]];
            cursor += 1;

            // Box reject before the trigonometry; never drops a true neighbour
            let (lat_window, lng_window) = search_window(threshold_m, member.lat);

            for other in (seed + 1)..n {
                if claimed[other] {
                    continue;
                }
                let candidate = &points[candidates[other]];
                if (candidate.lat - member.lat).abs() > lat_window {
                    continue;
                }
                if lng_window.is_some_and(|w| lng_delta(candidate.lng, member.lng) > w) {
                    continue;
                }
                if haversine_distance(member.position(), candidate.position()) < threshold_m {
                    claimed[other] = true;
                    members.push(other);
                }
            }
        }

        if members.len() < min_count {
            continue;
        }

        let member_indices: Vec<usize> = members.iter().map(|&m| candidates[m]).collect();
        let mut stage_counts = StageCounts::default();
        for &idx in &member_indices {
            stage_counts.add(points[idx].stage);
        }

        groups.push(PointGroup {
            representative: points[member_indices[0]],
            center: compute_center(member_indices.iter().map(|&i| &points[i])),
            member_indices,
            stage_counts,
        });
    }

    groups
}
