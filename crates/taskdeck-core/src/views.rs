//! Pure projections of the task list
//! into what each page shows. Nothing
//! here touches storage; every day-level
//! comparison goes through a
//! [`DayClock`].

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Days,
  Months,
  NaiveDate
};

use crate::datetime::DayClock;
use crate::task::{
  Priority,
  Status,
  Task
};

/// Dashboard panels list at most this
/// many tasks before pointing at the
/// full list.
pub const PANEL_PREVIEW_LIMIT: usize = 3;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct DashboardStats {
  pub total:           usize,
  pub completed:       usize,
  pub pending:         usize,
  pub completion_rate: u32,
  pub pending_rate:    u32
}

impl DashboardStats {
  pub fn from_tasks(
    tasks: &[Task]
  ) -> Self {
    let total = tasks.len();
    let completed = tasks
      .iter()
      .filter(|t| {
        t.status == Status::Completed
      })
      .count();
    let pending = tasks
      .iter()
      .filter(|t| {
        t.status == Status::Pending
      })
      .count();

    Self {
      total,
      completed,
      pending,
      completion_rate: percentage(
        completed, total
      ),
      pending_rate: percentage(
        pending, total
      )
    }
  }
}

/// `round(part / total * 100)`, 0 for an
/// empty total.
#[must_use]
pub fn percentage(
  part: usize,
  total: usize
) -> u32 {
  if total == 0 {
    return 0;
  }
  ((part as f64 / total as f64) * 100.0)
    .round() as u32
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub enum Bucket {
  Today,
  Overdue,
  Tomorrow,
  HighPriority
}

impl Bucket {
  pub const ALL: [Bucket; 4] = [
    Bucket::Today,
    Bucket::Overdue,
    Bucket::Tomorrow,
    Bucket::HighPriority
  ];

  pub fn title(self) -> &'static str {
    match self {
      | Bucket::Today => "Today's Tasks",
      | Bucket::Overdue => "Overdue",
      | Bucket::Tomorrow => "Upcoming",
      | Bucket::HighPriority => {
        "High Priority"
      }
    }
  }

  pub fn empty_message(
    self
  ) -> &'static str {
    match self {
      | Bucket::Today => {
        "No tasks due today"
      }
      | Bucket::Overdue => {
        "No overdue tasks"
      }
      | Bucket::Tomorrow => {
        "No tasks due tomorrow"
      }
      | Bucket::HighPriority => {
        "No high priority tasks"
      }
    }
  }

  /// Completed tasks never belong to a
  /// bucket.
  pub fn contains(
    self,
    task: &Task,
    clock: &DayClock
  ) -> bool {
    if task.is_completed() {
      return false;
    }

    match self {
      | Bucket::Today => {
        clock.day_of(task.due_date)
          == clock.today()
      }
      | Bucket::Overdue => {
        clock.day_of(task.due_date)
          < clock.today()
      }
      | Bucket::Tomorrow => {
        clock.day_of(task.due_date)
          == clock.tomorrow()
      }
      | Bucket::HighPriority => {
        task.priority == Priority::High
      }
    }
  }

  pub fn select<'a>(
    self,
    tasks: &'a [Task],
    clock: &DayClock
  ) -> Vec<&'a Task> {
    tasks
      .iter()
      .filter(|task| {
        self.contains(task, clock)
      })
      .collect()
  }
}

pub fn today_tasks<'a>(
  tasks: &'a [Task],
  clock: &DayClock
) -> Vec<&'a Task> {
  Bucket::Today.select(tasks, clock)
}

pub fn overdue_tasks<'a>(
  tasks: &'a [Task],
  clock: &DayClock
) -> Vec<&'a Task> {
  Bucket::Overdue.select(tasks, clock)
}

pub fn tomorrow_tasks<'a>(
  tasks: &'a [Task],
  clock: &DayClock
) -> Vec<&'a Task> {
  Bucket::Tomorrow.select(tasks, clock)
}

pub fn high_priority_tasks<'a>(
  tasks: &'a [Task],
  clock: &DayClock
) -> Vec<&'a Task> {
  Bucket::HighPriority
    .select(tasks, clock)
}

#[derive(Debug, Clone)]
pub struct Panel<'a> {
  pub bucket:  Bucket,
  pub preview: Vec<&'a Task>,
  pub hidden:  usize
}

#[derive(Debug, Clone)]
pub struct Dashboard<'a> {
  pub stats:  DashboardStats,
  pub panels: Vec<Panel<'a>>
}

impl<'a> Dashboard<'a> {
  pub fn derive(
    tasks: &'a [Task],
    clock: &DayClock
  ) -> Self {
    let panels = Bucket::ALL
      .iter()
      .map(|bucket| {
        let mut preview =
          bucket.select(tasks, clock);
        let hidden = preview
          .len()
          .saturating_sub(
            PANEL_PREVIEW_LIMIT
          );
        preview
          .truncate(PANEL_PREVIEW_LIMIT);
        Panel {
          bucket: *bucket,
          preview,
          hidden
        }
      })
      .collect();

    Self {
      stats: DashboardStats::from_tasks(
        tasks
      ),
      panels
    }
  }
}

/// How a due date reads in a task list.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub enum DueTone {
  Overdue,
  DueToday,
  Upcoming
}

pub fn due_tone(
  task: &Task,
  clock: &DayClock
) -> DueTone {
  let due = clock.day_of(task.due_date);
  let today = clock.today();
  if due < today {
    DueTone::Overdue
  } else if due == today {
    DueTone::DueToday
  } else {
    DueTone::Upcoming
  }
}

/// Count of tasks due on each calendar
/// day, regardless of status.
pub fn due_counts_by_day(
  tasks: &[Task],
  clock: &DayClock
) -> BTreeMap<NaiveDate, usize> {
  let mut counts = BTreeMap::new();
  for task in tasks {
    *counts
      .entry(clock.day_of(task.due_date))
      .or_insert(0) += 1;
  }
  counts
}

pub fn tasks_on_day<'a>(
  tasks: &'a [Task],
  day: NaiveDate,
  clock: &DayClock
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      clock.day_of(task.due_date) == day
    })
    .collect()
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub struct CalendarMonth {
  first: NaiveDate
}

impl CalendarMonth {
  pub fn containing(
    day: NaiveDate
  ) -> Self {
    Self {
      first: day
        .with_day(1)
        .unwrap_or(day)
    }
  }

  pub fn first_day(&self) -> NaiveDate {
    self.first
  }

  pub fn year(&self) -> i32 {
    self.first.year()
  }

  pub fn month(&self) -> u32 {
    self.first.month()
  }

  pub fn next(&self) -> Self {
    Self {
      first: self
        .first
        .checked_add_months(Months::new(
          1
        ))
        .unwrap_or(self.first)
    }
  }

  pub fn previous(&self) -> Self {
    Self {
      first: self
        .first
        .checked_sub_months(Months::new(
          1
        ))
        .unwrap_or(self.first)
    }
  }

  pub fn days(&self) -> Vec<NaiveDate> {
    let next = self.next().first;
    self
      .first
      .iter_days()
      .take_while(|day| *day < next)
      .collect()
  }

  /// Sunday-first rows; cells outside
  /// the month are `None`.
  pub fn weeks(
    &self
  ) -> Vec<[Option<NaiveDate>; 7]> {
    let mut weeks = Vec::new();
    let mut row = [None; 7];
    let offset = self
      .first
      .weekday()
      .num_days_from_sunday()
      as usize;
    let mut col = offset;

    for day in self.days() {
      row[col] = Some(day);
      col += 1;
      if col == 7 {
        weeks.push(row);
        row = [None; 7];
        col = 0;
      }
    }
    if col > 0 {
      weeks.push(row);
    }
    weeks
  }

  pub fn title(&self) -> String {
    self.first.format("%B %Y").to_string()
  }
}

impl FromStr for CalendarMonth {
  type Err = anyhow::Error;

  /// Accepts `YYYY-MM`.
  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let (year, month) = s
      .trim()
      .split_once('-')
      .ok_or_else(|| {
        anyhow!(
          "expected YYYY-MM, got: {s}"
        )
      })?;
    let year: i32 = year
      .parse()
      .with_context(|| {
        format!("invalid year in {s}")
      })?;
    let month: u32 = month
      .parse()
      .with_context(|| {
        format!("invalid month in {s}")
      })?;
    let first =
      NaiveDate::from_ymd_opt(
        year, month, 1
      )
      .ok_or_else(|| {
        anyhow!(
          "month out of range: {s}"
        )
      })?;
    Ok(Self {
      first
    })
  }
}

/// Days of `month` that have at least
/// one task due, for calendar markers.
pub fn marked_days(
  month: &CalendarMonth,
  counts: &BTreeMap<NaiveDate, usize>
) -> Vec<(NaiveDate, usize)> {
  let start = month.first_day();
  let end = month
    .next()
    .first_day()
    .checked_sub_days(Days::new(1))
    .unwrap_or(start);
  counts
    .range(start..=end)
    .map(|(day, count)| (*day, *count))
    .collect()
}
