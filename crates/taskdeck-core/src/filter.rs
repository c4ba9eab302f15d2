use std::str::FromStr;

use tracing::trace;

use crate::task::{
  Priority,
  Status,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum StatusFilter {
  #[default]
  All,
  Only(Status)
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    s.parse().map(Self::Only)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum PriorityFilter {
  #[default]
  All,
  Only(Priority)
}

impl FromStr for PriorityFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    s.parse().map(Self::Only)
  }
}

/// Independently optional criteria,
/// AND-combined. The default value is
/// the list page's initial state: all
/// statuses, all priorities, no search.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskFilters {
  pub category_id: Option<String>,
  pub status:      StatusFilter,
  pub priority:    PriorityFilter,
  pub search:      Option<String>
}

#[derive(Debug, Clone)]
enum Pred {
  CategoryEq(String),
  StatusEq(Status),
  PriorityEq(Priority),
  TextContains(String)
}

impl TaskFilters {
  pub fn is_empty(&self) -> bool {
    self.preds().is_empty()
  }

  fn preds(&self) -> Vec<Pred> {
    let mut preds = Vec::new();

    if let Some(id) =
      self.category_id.as_deref()
      && !id.is_empty()
    {
      preds.push(Pred::CategoryEq(
        id.to_string()
      ));
    }

    if let StatusFilter::Only(status) =
      self.status
    {
      preds.push(Pred::StatusEq(status));
    }

    if let PriorityFilter::Only(
      priority
    ) = self.priority
    {
      preds
        .push(Pred::PriorityEq(priority));
    }

    if let Some(text) =
      self.search.as_deref()
      && !text.is_empty()
    {
      preds.push(Pred::TextContains(
        text.to_lowercase()
      ));
    }

    preds
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    self
      .preds()
      .iter()
      .all(|pred| eval_pred(pred, task))
  }

  /// Matching tasks, in list
  /// order.
  #[tracing::instrument(skip(
    self, tasks
  ))]
  pub fn apply<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    let preds = self.preds();
    tasks
      .iter()
      .filter(|task| {
        preds
          .iter()
          .all(|pred| eval_pred(pred, task))
      })
      .collect()
  }
}

fn eval_pred(
  pred: &Pred,
  task: &Task
) -> bool {
  let ok = match pred {
    // Bare-string categories never
    // match an active category filter.
    | Pred::CategoryEq(id) => {
      task.category.inline_id()
        == Some(id.as_str())
    }
    | Pred::StatusEq(status) => {
      task.status == *status
    }
    | Pred::PriorityEq(priority) => {
      task.priority == *priority
    }
    | Pred::TextContains(needle) => {
      task
        .title
        .to_lowercase()
        .contains(needle.as_str())
        || task
          .description
          .to_lowercase()
          .contains(needle.as_str())
    }
  };

  trace!(pred = ?pred, task_id = %task.id, ok, "filter predicate evaluation");
  ok
}
