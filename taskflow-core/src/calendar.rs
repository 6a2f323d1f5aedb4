/// Calendar view model: month grid and tasks keyed by due day.
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, TimeZone, Utc};

use crate::types::{find_column_by_title, Column, Task, TaskDraft, TODO_COLUMN};

/// Layout of one month in a Sunday-first week grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st (Sunday = 0).
    pub leading_blanks: u32,
    pub days_in_month: u32,
    /// Empty cells completing the last week.
    pub trailing_blanks: u32,
}

impl MonthGrid {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        let days_in_month = (next_first - first).num_days() as u32;
        let leading_blanks = first.weekday().num_days_from_sunday();
        let trailing_blanks = (7 - (leading_blanks + days_in_month) % 7) % 7;
        Some(Self {
            year,
            month,
            leading_blanks,
            days_in_month,
            trailing_blanks,
        })
    }

    pub fn containing(date: NaiveDate) -> Self {
        // A date that exists always has a valid month.
        Self::new(date.year(), date.month()).unwrap_or(Self {
            year: date.year(),
            month: date.month(),
            leading_blanks: 0,
            days_in_month: 0,
            trailing_blanks: 0,
        })
    }

    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    pub fn prev(&self) -> Option<Self> {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    pub fn total_cells(&self) -> u32 {
        self.leading_blanks + self.days_in_month + self.trailing_blanks
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (1..=self.days_in_month).filter_map(move |d| NaiveDate::from_ymd_opt(self.year, self.month, d))
    }
}

/// Tasks with a due date, keyed by the (UTC) calendar day they are due.
pub fn tasks_by_date<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> BTreeMap<NaiveDate, Vec<&'a Task>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        if let Some(due) = task.due_date {
            by_date.entry(due.date_naive()).or_default().push(task);
        }
    }
    by_date
}

/// Draft for a task created by clicking a calendar day. It lands in the
/// "To Do" column, which therefore has to exist.
pub fn draft_for_day(columns: &[Column], day: NaiveDate) -> Option<TaskDraft> {
    let todo = find_column_by_title(columns, TODO_COLUMN)?;
    let mut draft = TaskDraft::new("", todo.id.clone());
    draft.due_date = day
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight));
    Some(draft)
}
