//! Date axis and series merge logic.

use crate::history::ClosePoint;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// The contiguous run of calendar dates (inclusive, daily) a run must
/// produce a value or an explicit missing marker for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateAxis {
    start: NaiveDate,
    end: NaiveDate,
    dates: Vec<NaiveDate>,
}

impl DateAxis {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        let mut dates = Vec::new();
        let mut current = start;
        while current <= end {
            dates.push(current);
            current = current + Duration::days(1);
        }
        DateAxis { start, end, dates }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// A sparse daily series for one instrument. Dates not present in the map
/// are missing; reindexing onto an axis happens at merge time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: BTreeMap<NaiveDate, f64>,
}

impl Series {
    /// Builds a series from provider rows. A later row for the same date
    /// replaces an earlier one.
    pub fn from_points(points: &[ClosePoint]) -> Self {
        Series {
            points: points.iter().map(|p| (p.date, p.close)).collect(),
        }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Series {
            points: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rounds every value to `decimals` places.
    pub fn rounded(mut self, decimals: u32) -> Self {
        for value in self.points.values_mut() {
            *value = round_to(*value, decimals);
        }
        self
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Coalesce merge over `axis`: the fresh value wins for its own dates, a
/// persisted value fills dates the fetch did not cover, everything else is
/// missing. The result always covers the axis exactly.
pub fn merge(fresh: &Series, persisted: Option<&Series>, axis: &DateAxis) -> Vec<Option<f64>> {
    axis.dates()
        .iter()
        .map(|date| {
            fresh
                .get(*date)
                .or_else(|| persisted.and_then(|p| p.get(*date)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn axis(start: &str, end: &str) -> DateAxis {
        DateAxis::new(date(start), date(end))
    }

    #[test]
    fn test_axis_is_inclusive_and_contiguous() {
        let axis = axis("2025-01-01", "2025-01-04");
        assert_eq!(axis.len(), 4);
        assert_eq!(axis.start(), date("2025-01-01"));
        assert_eq!(axis.end(), date("2025-01-04"));
        assert_eq!(axis.dates()[2], date("2025-01-03"));
    }

    #[test]
    fn test_single_day_axis() {
        let axis = axis("2025-01-01", "2025-01-01");
        assert_eq!(axis.dates(), &[date("2025-01-01")]);
    }

    #[test]
    fn test_series_later_point_wins_for_same_date() {
        let series = Series::from_points(&[
            ClosePoint {
                date: date("2025-01-01"),
                close: 1.0,
            },
            ClosePoint {
                date: date("2025-01-01"),
                close: 2.0,
            },
        ]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(date("2025-01-01")), Some(2.0));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(123.456, 2), 123.46);
        assert_eq!(round_to(123.454, 2), 123.45);
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(42.0, 0), 42.0);
    }

    #[test]
    fn test_merge_prefers_freshness() {
        let axis = axis("2025-01-01", "2025-01-03");
        let fresh = Series::from_pairs([(date("2025-01-02"), 10.0)]);
        let persisted = Series::from_pairs([(date("2025-01-02"), 99.0)]);

        let merged = merge(&fresh, Some(&persisted), &axis);
        assert_eq!(merged, vec![None, Some(10.0), None]);
    }

    #[test]
    fn test_merge_preserves_history() {
        let axis = axis("2025-01-01", "2025-01-04");
        let fresh = Series::from_pairs([(date("2025-01-03"), 10.0)]);
        let persisted = Series::from_pairs([
            (date("2025-01-01"), 1.0),
            (date("2025-01-02"), 2.0),
        ]);

        let merged = merge(&fresh, Some(&persisted), &axis);
        assert_eq!(merged, vec![Some(1.0), Some(2.0), Some(10.0), None]);
    }

    #[test]
    fn test_merge_covers_axis_exactly() {
        let axis = axis("2025-01-01", "2025-01-05");
        let fresh = Series::from_pairs([
            // Outside the axis on both sides; must not leak into the result.
            (date("2024-12-31"), 5.0),
            (date("2025-01-06"), 6.0),
            (date("2025-01-02"), 7.0),
        ]);

        let merged = merge(&fresh, None, &axis);
        assert_eq!(merged.len(), axis.len());
        assert_eq!(merged, vec![None, Some(7.0), None, None, None]);
    }

    #[test]
    fn test_merge_without_persisted_is_reindexed_fresh() {
        let axis = axis("2025-01-01", "2025-01-03");
        let fresh = Series::from_pairs([(date("2025-01-01"), 3.0)]);

        let merged = merge(&fresh, None, &axis);
        assert_eq!(merged, vec![Some(3.0), None, None]);
    }

    #[test]
    fn test_merge_of_two_empty_series_is_all_missing() {
        let axis = axis("2025-01-01", "2025-01-03");
        let merged = merge(&Series::default(), Some(&Series::default()), &axis);
        assert_eq!(merged, vec![None, None, None]);
    }

    #[test]
    fn test_rounded_applies_to_every_value() {
        let series = Series::from_pairs([
            (date("2025-01-01"), 1.005),
            (date("2025-01-02"), 2.344),
        ])
        .rounded(2);
        assert_eq!(series.get(date("2025-01-02")), Some(2.34));
    }
}
