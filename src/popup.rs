//! Detail popups for clicked points.
//!
//! A popup shows the stage name, the NDVI reading and an estimated harvest
//! date. The estimate is a fixed lookup of months-until-harvest per stage,
//! added to "today" with calendar month arithmetic (clamped to the end of
//! shorter months).
//!
//! At most one popup is open. [`PopupState`] moves between `Idle` and
//! `ShowingPopup`; a click on a new point replaces the open popup and a click
//! on empty map closes it.

use chrono::{Months, NaiveDate};

use crate::{GrowthStage, StagePoint};

/// Label shown instead of a date for stages that can be harvested now.
pub const READY_FOR_HARVEST: &str = "Ready for Harvest";

/// Months from a stage until harvest.
pub fn harvest_offset_months(stage: GrowthStage) -> u32 {
    match stage {
        GrowthStage::Ripening => 0,
        GrowthStage::GrandGrowth => 4,
        GrowthStage::Tillering => 8,
        GrowthStage::Germination => 11,
        GrowthStage::Unknown => 13,
    }
}

/// Estimated harvest date for a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestEstimate {
    pub date: NaiveDate,
    pub months_ahead: u32,
}

impl HarvestEstimate {
    pub fn is_ready(&self) -> bool {
        self.months_ahead == 0
    }

    /// "Ready for Harvest" or "Estimated harvest: May 15, 2024".
    pub fn label(&self) -> String {
        if self.is_ready() {
            READY_FOR_HARVEST.to_string()
        } else {
            format!("Estimated harvest: {}", self.date.format("%B %-d, %Y"))
        }
    }
}

/// Estimate the harvest date of a stage relative to `today`.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use sugarcane_map::{GrowthStage, estimate_harvest};
///
/// let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// let estimate = estimate_harvest(GrowthStage::GrandGrowth, today);
/// assert_eq!(estimate.date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
/// ```
pub fn estimate_harvest(stage: GrowthStage, today: NaiveDate) -> HarvestEstimate {
    let months_ahead = harvest_offset_months(stage);
    let date = today
        .checked_add_months(Months::new(months_ahead))
        .unwrap_or(NaiveDate::MAX);
    HarvestEstimate { date, months_ahead }
}

/// Human-readable detail for a selected point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDetail {
    /// Index of the point in the displayed snapshot
    pub index: usize,
    pub point: StagePoint,
    pub stage_name: &'static str,
    /// NDVI to three decimals, or "N/A"
    pub ndvi_text: String,
    pub harvest: HarvestEstimate,
}

impl PointDetail {
    pub fn new(index: usize, point: StagePoint, today: NaiveDate) -> Self {
        let ndvi_text = point
            .ndvi
            .filter(|v| v.is_finite())
            .map_or_else(|| "N/A".to_string(), |v| format!("{:.3}", v));

        Self {
            index,
            point,
            stage_name: point.stage.display_name(),
            ndvi_text,
            harvest: estimate_harvest(point.stage, today),
        }
    }

    /// Popup body, one fact per line.
    pub fn text(&self) -> String {
        format!(
            "Stage: {}\nNDVI: {}\n{}",
            self.stage_name,
            self.ndvi_text,
            self.harvest.label()
        )
    }
}

/// Popup state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PopupState {
    #[default]
    Idle,
    ShowingPopup(PointDetail),
}

impl PopupState {
    /// Apply a click: a hit opens (or replaces) the popup, a miss closes it.
    pub fn on_click(&mut self, hit: Option<PointDetail>) {
        *self = match hit {
            Some(detail) => PopupState::ShowingPopup(detail),
            None => PopupState::Idle,
        };
    }

    pub fn close(&mut self) {
        *self = PopupState::Idle;
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PopupState::ShowingPopup(_))
    }

    pub fn current(&self) -> Option<&PointDetail> {
        match self {
            PopupState::ShowingPopup(detail) => Some(detail),
            PopupState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_harvest_table_with_fixed_today() {
        let today = date(2024, 1, 15);
        assert_eq!(estimate_harvest(GrowthStage::Ripening, today).date, today);
        assert_eq!(estimate_harvest(GrowthStage::GrandGrowth, today).date, date(2024, 5, 15));
        assert_eq!(estimate_harvest(GrowthStage::Tillering, today).date, date(2024, 9, 15));
        assert_eq!(estimate_harvest(GrowthStage::Germination, today).date, date(2024, 12, 15));
        assert_eq!(estimate_harvest(GrowthStage::Unknown, today).date, date(2025, 2, 15));
    }

    #[test]
    fn test_month_end_is_clamped() {
        let today = date(2023, 10, 31);
        assert_eq!(estimate_harvest(GrowthStage::GrandGrowth, today).date, date(2024, 2, 29));
    }

    #[test]
    fn test_labels() {
        let today = date(2024, 1, 15);
        assert_eq!(estimate_harvest(GrowthStage::Ripening, today).label(), "Ready for Harvest");
        assert_eq!(
            estimate_harvest(GrowthStage::GrandGrowth, today).label(),
            "Estimated harvest: May 15, 2024"
        );
    }

    #[test]
    fn test_detail_text() {
        let today = date(2024, 1, 15);
        let with_ndvi = StagePoint::new(14.1, 121.2, GrowthStage::Ripening).with_ndvi(0.4213);
        let detail = PointDetail::new(0, with_ndvi, today);
        assert_eq!(detail.ndvi_text, "0.421");
        assert!(detail.text().contains("Stage: Ripening"));
        assert!(detail.text().contains(READY_FOR_HARVEST));

        let without = StagePoint::new(14.1, 121.2, GrowthStage::Tillering);
        let detail = PointDetail::new(1, without, today);
        assert_eq!(detail.ndvi_text, "N/A");
        assert!(detail.text().contains("September 15, 2024"));
    }

    #[test]
    fn test_popup_state_machine() {
        let today = date(2024, 1, 15);
        let a = PointDetail::new(0, StagePoint::new(14.1, 121.2, GrowthStage::Ripening), today);
        let b = PointDetail::new(1, StagePoint::new(14.2, 121.3, GrowthStage::Tillering), today);

        let mut state = PopupState::default();
        assert!(!state.is_open());

        state.on_click(Some(a.clone()));
        assert_eq!(state.current(), Some(&a));

        // Opening another popup replaces the first
        state.on_click(Some(b.clone()));
        assert_eq!(state.current(), Some(&b));

        state.on_click(None);
        assert_eq!(state, PopupState::Idle);

        state.on_click(Some(a));
        state.close();
        assert!(!state.is_open());
    }
}
