//! Trading-day calendar.
//!
//! Produces the ordered business-day index (Monday through Friday, minus
//! holidays) the whole simulation synchronizes on. The index is computed in
//! full before the run starts; no date is inserted or removed afterwards.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar end {end} precedes start {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("calendar {start}..={end} contains no trading days")]
    EmptyIndex { start: NaiveDate, end: NaiveDate },
}

/// An end-of-day trading calendar over a closed date range.
#[derive(Debug, Clone)]
pub struct Calendar {
    start: NaiveDate,
    end: NaiveDate,
    holidays: BTreeSet<NaiveDate>,
    index: Vec<NaiveDate>,
}

impl Calendar {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        holidays: impl IntoIterator<Item = NaiveDate>,
    ) -> Result<Self, CalendarError> {
        if end < start {
            return Err(CalendarError::EndBeforeStart { start, end });
        }

        let holidays: BTreeSet<NaiveDate> = holidays.into_iter().collect();

        let mut index = Vec::new();
        let mut day = start;
        while day <= end {
            let weekday = day.weekday();
            let is_weekend = weekday == Weekday::Sat || weekday == Weekday::Sun;
            if !is_weekend && !holidays.contains(&day) {
                index.push(day);
            }
            day += Duration::days(1);
        }

        if index.is_empty() {
            return Err(CalendarError::EmptyIndex { start, end });
        }

        Ok(Self {
            start,
            end,
            holidays,
            index,
        })
    }

    /// The ordered trading-day sequence.
    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn skips_weekends() {
        // 2024-01-05 is a Friday; 2024-01-08 the following Monday.
        let cal = Calendar::new(d("2024-01-05"), d("2024-01-09"), []).unwrap();
        assert_eq!(
            cal.index(),
            &[d("2024-01-05"), d("2024-01-08"), d("2024-01-09")]
        );
    }

    #[test]
    fn skips_holidays() {
        let cal = Calendar::new(d("2024-01-01"), d("2024-01-05"), [d("2024-01-01")]).unwrap();
        // Jan 1 (Monday) removed; Tue-Fri remain.
        assert_eq!(cal.len(), 4);
        assert!(!cal.index().contains(&d("2024-01-01")));
    }

    #[test]
    fn rejects_inverted_range() {
        let err = Calendar::new(d("2024-02-01"), d("2024-01-01"), []).unwrap_err();
        assert!(matches!(err, CalendarError::EndBeforeStart { .. }));
    }

    #[test]
    fn rejects_empty_index() {
        // Saturday-Sunday only.
        let err = Calendar::new(d("2024-01-06"), d("2024-01-07"), []).unwrap_err();
        assert!(matches!(err, CalendarError::EmptyIndex { .. }));
    }
}
