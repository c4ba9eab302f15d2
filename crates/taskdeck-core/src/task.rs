use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::iso_date_serde;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
        }
    }

    /// Both transitions are user-triggered and reversible.
    pub fn toggled(self) -> Self {
        match self {
            Status::Pending => Status::Completed,
            Status::Completed => Status::Pending,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "completed" | "done" => Ok(Status::Completed),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Category {
    fn new(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

/// A task's category is either the embedded record or a bare identifying
/// string. Only the embedded form takes part in category filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CategoryRef {
    Inline(Category),
    ById(String),
}

impl CategoryRef {
    /// Looks `id` up in `categories`, falling back to the bare id.
    pub fn resolve(id: &str, categories: &[Category]) -> Self {
        categories
            .iter()
            .find(|category| category.id == id)
            .cloned()
            .map(CategoryRef::Inline)
            .unwrap_or_else(|| CategoryRef::ById(id.to_string()))
    }

    pub fn inline_id(&self) -> Option<&str> {
        match self {
            CategoryRef::Inline(category) => Some(category.id.as_str()),
            CategoryRef::ById(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CategoryRef::Inline(category) => category.name.as_str(),
            CategoryRef::ById(raw) => raw.as_str(),
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            CategoryRef::Inline(category) => Some(category.color.as_str()),
            CategoryRef::ById(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(with = "iso_date_serde")]
    pub due_date: DateTime<Utc>,

    pub category: CategoryRef,

    pub status: Status,

    pub priority: Priority,

    #[serde(with = "iso_date_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "iso_date_serde")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }
}

/// Caller-supplied fields of a new task; the store fills in the id and
/// timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub category: CategoryRef,
    pub status: Status,
    pub priority: Priority,
}

impl TaskDraft {
    pub(crate) fn into_task(self, id: String, now: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            due_date: self.due_date.trunc_subsecs(3),
            category: self.category,
            status: self.status,
            priority: self.priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<CategoryRef>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply_to(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date.trunc_subsecs(3);
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
    }
}

pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("1", "Personal", "task-personal"),
        Category::new("2", "Work", "task-work"),
        Category::new("3", "Urgent", "task-urgent"),
    ]
}

/// Demo tasks used when no snapshot exists; due dates are offsets from `now`.
pub fn seed_tasks(now: DateTime<Utc>) -> Vec<Task> {
    let now = now.trunc_subsecs(3);
    let categories = default_categories();
    let personal = CategoryRef::Inline(categories[0].clone());
    let work = CategoryRef::Inline(categories[1].clone());
    let urgent = CategoryRef::Inline(categories[2].clone());

    let seed = |id: &str,
                title: &str,
                description: &str,
                days: i64,
                category: CategoryRef,
                status: Status,
                priority: Priority| Task {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        due_date: now + Duration::days(days),
        category,
        status,
        priority,
        created_at: now,
        updated_at: now,
    };

    vec![
        seed(
            "1",
            "Complete project proposal",
            "Finalize the project proposal for the client meeting",
            2,
            work,
            Status::Pending,
            Priority::High,
        ),
        seed(
            "2",
            "Buy groceries",
            "Get milk, eggs, bread, and vegetables",
            1,
            personal.clone(),
            Status::Pending,
            Priority::Medium,
        ),
        seed(
            "3",
            "Pay rent",
            "Transfer rent money to landlord",
            3,
            urgent,
            Status::Pending,
            Priority::High,
        ),
        seed(
            "4",
            "Book dentist appointment",
            "Call dentist to schedule a check-up",
            7,
            personal,
            Status::Completed,
            Priority::Low,
        ),
    ]
}
