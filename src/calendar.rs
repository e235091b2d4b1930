//! Month grids for the calendar view.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzers::types::{Bucket, PeriodKey};
use crate::analyzers::utility::days_in_month;
use crate::error::{EngineError, EngineResult};
use crate::highlight::{HighlightSelection, ReasonCode};

/// First column of a week row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    /// Column of `weekday` in a row.
    fn column(&self, weekday: Weekday) -> usize {
        match self {
            WeekStart::Sunday => weekday.num_days_from_sunday() as usize,
            WeekStart::Monday => weekday.num_days_from_monday() as usize,
        }
    }
}

/// Context shown next to a day. Supplied by the caller, never computed here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotation {
    pub weather: Option<String>,
    pub avg_temperature: Option<f64>,
    pub total_rain: Option<f64>,
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarCell {
    pub day: u32,
    pub weekday: Weekday,
    /// 0 when the day has no bucket.
    pub level: u8,
    pub total_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<ReasonCode>,
}

/// A month laid out as week rows of seven cells; `None` pads the days
/// outside the month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub week_start: WeekStart,
    pub weeks: Vec<[Option<CalendarCell>; 7]>,
}

impl CalendarMonth {
    pub fn cells(&self) -> impl Iterator<Item = &CalendarCell> {
        self.weeks.iter().flat_map(|w| w.iter().flatten())
    }

    pub fn cell(&self, day: u32) -> Option<&CalendarCell> {
        self.cells().find(|c| c.day == day)
    }
}

/// Lays out one month of day buckets.
#[derive(Debug, Clone)]
pub struct CalendarLayoutBuilder<'a> {
    year: i32,
    month: u32,
    week_start: WeekStart,
    annotations: Option<&'a BTreeMap<u32, Annotation>>,
    highlights: &'a [HighlightSelection],
}

impl<'a> CalendarLayoutBuilder<'a> {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            week_start: WeekStart::default(),
            annotations: None,
            highlights: &[],
        }
    }

    pub fn week_start(mut self, week_start: WeekStart) -> Self {
        self.week_start = week_start;
        self
    }

    /// Annotations keyed by day of month.
    pub fn annotations(mut self, annotations: &'a BTreeMap<u32, Annotation>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Selections whose indices refer to the slice passed to
    /// [`CalendarLayoutBuilder::build`].
    pub fn highlights(mut self, highlights: &'a [HighlightSelection]) -> Self {
        self.highlights = highlights;
        self
    }

    /// Builds the grid. Buckets outside the month, or that are not day
    /// buckets, are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMonth`] for a month outside `1..=12`.
    pub fn build(&self, days: &[Bucket]) -> EngineResult<CalendarMonth> {
        let invalid = || EngineError::InvalidMonth {
            year: self.year,
            month: self.month,
        };
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(invalid)?;
        let length = days_in_month(self.year, self.month);

        let mut by_day: BTreeMap<u32, (usize, &Bucket)> = BTreeMap::new();
        for (index, bucket) in days.iter().enumerate() {
            if let PeriodKey::Day { date } = bucket.period() {
                if date.year() == self.year && date.month() == self.month {
                    by_day.insert(date.day(), (index, bucket));
                }
            }
        }

        let reason_of = |index: usize| {
            self.highlights
                .iter()
                .find(|h| h.index == index)
                .map(|h| h.reason)
        };

        let leading = self.week_start.column(first.weekday());
        let rows = (length as usize + leading).div_ceil(7);

        let weeks = (0..rows)
            .map(|row| {
                std::array::from_fn(|column| {
                    let offset = row * 7 + column;
                    if offset < leading || offset - leading >= length as usize {
                        return None;
                    }
                    let day = (offset - leading) as u32 + 1;
                    let bucket = by_day.get(&day);

                    Some(CalendarCell {
                        day,
                        weekday: (first + Days::new(u64::from(day - 1))).weekday(),
                        level: bucket.map_or(0, |(_, b)| b.level()),
                        total_count: bucket.map(|(_, b)| b.total_count()),
                        annotation: self.annotations.and_then(|a| a.get(&day).cloned()),
                        highlight: bucket.and_then(|(index, _)| reason_of(*index)),
                    })
                })
            })
            .collect();

        debug!(
            year = self.year,
            month = self.month,
            days = by_day.len(),
            rows,
            "Calendar laid out"
        );

        Ok(CalendarMonth {
            year: self.year,
            month: self.month,
            week_start: self.week_start,
            weeks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32, level: u8) -> Bucket {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        Bucket::new(PeriodKey::Day { date }, u64::from(level) * 1000, level, 1.0)
    }

    #[test]
    fn test_thirty_day_month_with_three_leading_blanks() {
        // April 2026 starts on a Wednesday.
        let days: Vec<Bucket> = (1..=30).map(|d| day(2026, 4, d, 5)).collect();
        let month = CalendarLayoutBuilder::new(2026, 4).build(&days).unwrap();

        assert_eq!(month.weeks.len(), 5);
        assert_eq!(month.cells().count(), 30);
        assert!(month.weeks[0][..3].iter().all(Option::is_none));
        assert_eq!(month.weeks[0][3].as_ref().map(|c| c.day), Some(1));
        assert!(month.cells().all(|c| c.level == 5));
    }

    #[test]
    fn test_thirty_one_day_month() {
        // October 2025 starts on a Wednesday.
        let month = CalendarLayoutBuilder::new(2025, 10).build(&[]).unwrap();
        assert!(month.weeks[0][..3].iter().all(Option::is_none));
        assert_eq!(month.weeks[0][3].as_ref().map(|c| c.weekday), Some(Weekday::Wed));
        assert_eq!(month.weeks.len(), 5);
        assert_eq!(month.cells().count(), 31);
    }

    #[test]
    fn test_monday_first() {
        // June 2025 starts on a Sunday.
        let sunday_first = CalendarLayoutBuilder::new(2025, 6).build(&[]).unwrap();
        assert_eq!(sunday_first.weeks.len(), 5);
        assert!(sunday_first.weeks[0][0].is_some());

        let monday_first = CalendarLayoutBuilder::new(2025, 6)
            .week_start(WeekStart::Monday)
            .build(&[])
            .unwrap();
        assert_eq!(monday_first.weeks.len(), 6);
        assert_eq!(monday_first.weeks[0][6].as_ref().map(|c| c.day), Some(1));
    }

    #[test]
    fn test_weekdays_follow_dates() {
        let month = CalendarLayoutBuilder::new(2024, 2).build(&[]).unwrap();
        for cell in month.cells() {
            let date = NaiveDate::from_ymd_opt(2024, 2, cell.day).unwrap();
            assert_eq!(cell.weekday, date.weekday());
        }
        assert_eq!(month.cells().count(), 29);
    }

    #[test]
    fn test_missing_days_are_level_zero() {
        let days = vec![day(2025, 4, 2, 7)];
        let month = CalendarLayoutBuilder::new(2025, 4).build(&days).unwrap();

        assert_eq!(month.cell(2).map(|c| c.level), Some(7));
        assert_eq!(month.cell(2).and_then(|c| c.total_count), Some(7000));
        assert_eq!(month.cell(3).map(|c| c.level), Some(0));
        assert_eq!(month.cell(3).and_then(|c| c.total_count), None);
    }

    #[test]
    fn test_annotations_and_highlights() {
        let days = vec![day(2025, 3, 31, 1), day(2025, 4, 1, 2), day(2025, 4, 2, 9)];
        let highlights = vec![
            HighlightSelection { index: 1, reason: ReasonCode::Lowest },
            HighlightSelection { index: 2, reason: ReasonCode::Highest },
        ];
        let mut annotations = BTreeMap::new();
        annotations.insert(
            1,
            Annotation {
                event: Some("festival".to_string()),
                ..Annotation::default()
            },
        );

        let month = CalendarLayoutBuilder::new(2025, 4)
            .annotations(&annotations)
            .highlights(&highlights)
            .build(&days)
            .unwrap();

        let first = month.cell(1).unwrap();
        assert_eq!(first.highlight, Some(ReasonCode::Lowest));
        assert_eq!(
            first.annotation.as_ref().and_then(|a| a.event.as_deref()),
            Some("festival")
        );
        assert_eq!(month.cell(2).unwrap().highlight, Some(ReasonCode::Highest));
        assert_eq!(month.cell(3).unwrap().highlight, None);
    }

    #[test]
    fn test_invalid_month() {
        assert!(matches!(
            CalendarLayoutBuilder::new(2025, 13).build(&[]),
            Err(EngineError::InvalidMonth { month: 13, .. })
        ));
    }
}
