use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::DayClock;
use crate::identity::User;
use crate::notify::{Notification, Notifier, Severity};
use crate::task::{Category, Priority, Status, Task};
use crate::views::{CalendarMonth, Dashboard, DueTone, due_tone, marked_days};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true) && io::stdout().is_terminal();
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, tasks, clock))]
    pub fn print_task_table(&self, tasks: &[&Task], clock: &DayClock) -> anyhow::Result<()> {
        self.write_task_table(&mut io::stdout().lock(), tasks, clock)
    }

    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        clock: &DayClock,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks found")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Status".to_string(),
            "Priority".to_string(),
            "Category".to_string(),
            "Title".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let due = clock.day_of(task.due_date).format("%b %d, %Y").to_string();
                let due = match due_tone(task, clock) {
                    DueTone::Overdue => self.paint(&due, "31"),
                    DueTone::DueToday => self.paint(&due, "33"),
                    DueTone::Upcoming => due,
                };
                vec![
                    self.paint(&task.id, "2"),
                    due,
                    self.status_badge(task.status),
                    self.priority_badge(task.priority),
                    task.category.label().to_string(),
                    task.title.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, task, clock))]
    pub fn print_task_info(&self, task: &Task, clock: &DayClock) -> anyhow::Result<()> {
        self.write_task_info(&mut io::stdout().lock(), task, clock)
    }

    pub fn write_task_info<W: Write>(
        &self,
        out: &mut W,
        task: &Task,
        clock: &DayClock,
    ) -> anyhow::Result<()> {
        let description = if task.description.is_empty() {
            "No description provided."
        } else {
            task.description.as_str()
        };

        writeln!(out, "{}", task.title)?;
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "status    {}", self.status_badge(task.status))?;
        writeln!(out, "priority  {}", self.priority_badge(task.priority))?;
        writeln!(out, "category  {}", task.category.label())?;
        writeln!(out, "due       {}", long_date(clock.day_of(task.due_date)))?;
        writeln!(out, "created   {}", long_date(clock.day_of(task.created_at)))?;
        writeln!(out, "updated   {}", long_date(clock.day_of(task.updated_at)))?;
        writeln!(out)?;
        writeln!(out, "{description}")?;
        Ok(())
    }

    pub fn print_not_found(&self, id: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint("Task Not Found", "1"))?;
        writeln!(out, "The task you're looking for doesn't exist: {id}")?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_dashboard(&self, dashboard: &Dashboard<'_>, clock: &DayClock) -> anyhow::Result<()> {
        self.write_dashboard(&mut io::stdout().lock(), dashboard, clock)
    }

    pub fn write_dashboard<W: Write>(
        &self,
        out: &mut W,
        dashboard: &Dashboard<'_>,
        clock: &DayClock,
    ) -> anyhow::Result<()> {
        let stats = &dashboard.stats;
        writeln!(out, "Total tasks      {}", stats.total)?;
        writeln!(out, "Completed        {}", stats.completed)?;
        writeln!(out, "Pending          {} ({}%)", stats.pending, stats.pending_rate)?;
        writeln!(out, "Completion rate  {}%", stats.completion_rate)?;

        for panel in &dashboard.panels {
            writeln!(out)?;
            writeln!(out, "{}", self.paint(panel.bucket.title(), "1"))?;
            if panel.preview.is_empty() {
                writeln!(out, "  {}", panel.bucket.empty_message())?;
                continue;
            }
            for task in &panel.preview {
                writeln!(
                    out,
                    "  {} {}  {}",
                    clock.day_of(task.due_date).format("%b %d"),
                    task.title,
                    self.paint(&task.id, "2")
                )?;
            }
            if panel.hidden > 0 {
                writeln!(out, "  ... and {} more", panel.hidden)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_calendar(
        &self,
        month: &CalendarMonth,
        counts: &BTreeMap<NaiveDate, usize>,
        selected: NaiveDate,
        selected_tasks: &[&Task],
        clock: &DayClock,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_month_grid(&mut out, month, counts, selected)?;
        writeln!(out)?;
        writeln!(out, "{}", self.paint(&long_date(selected), "1"))?;
        self.write_task_table(&mut out, selected_tasks, clock)
    }

    /// Days with tasks due are marked with `*`; the selected day is bracketed.
    pub fn write_month_grid<W: Write>(
        &self,
        out: &mut W,
        month: &CalendarMonth,
        counts: &BTreeMap<NaiveDate, usize>,
        selected: NaiveDate,
    ) -> anyhow::Result<()> {
        let marked: BTreeMap<NaiveDate, usize> = marked_days(month, counts).into_iter().collect();

        writeln!(out, "{:^35}", month.title())?;
        writeln!(out, "  Su   Mo   Tu   We   Th   Fr   Sa")?;
        for week in month.weeks() {
            let mut line = String::new();
            for cell in week {
                let text = match cell {
                    Some(day) => {
                        let mark = if marked.contains_key(&day) {
                            "*"
                        } else {
                            " "
                        };
                        let num = day.format("%e").to_string();
                        if day == selected {
                            format!("[{num}]{mark}")
                        } else {
                            format!(" {num} {mark}")
                        }
                    }
                    None => "     ".to_string(),
                };
                line.push_str(&text);
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        let due: usize = marked.values().sum();
        writeln!(out, "{due} task(s) due on {} day(s) this month", marked.len())?;
        Ok(())
    }

    pub fn print_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["ID".to_string(), "Name".to_string(), "Color".to_string()];
        let rows = categories
            .iter()
            .map(|c| vec![c.id.clone(), c.name.clone(), c.color.clone()])
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_profile(&self, user: &User) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}  {}", self.paint(&user.initials(), "7"), user.name)?;
        writeln!(out, "email     {}", user.email)?;
        writeln!(out, "id        {}", user.id)?;
        Ok(())
    }

    pub fn print_line(&self, text: &str) -> anyhow::Result<()> {
        writeln!(io::stdout().lock(), "{text}")?;
        Ok(())
    }

    fn status_badge(&self, status: Status) -> String {
        match status {
            Status::Completed => self.paint("Completed", "32"),
            Status::Pending => self.paint("Pending", "33"),
        }
    }

    fn priority_badge(&self, priority: Priority) -> String {
        match priority {
            Priority::High => self.paint("High", "31"),
            Priority::Medium => self.paint("Medium", "34"),
            Priority::Low => self.paint("Low", "90"),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Prints notifications to stderr so command output stays clean.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    color: bool,
}

impl ConsoleNotifier {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true) && io::stderr().is_terminal();
        Ok(Self { color })
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(title = %notification.title, "console notification");
        let title = match (self.color, notification.severity) {
            (true, Severity::Error) => format!("\x1b[31m{}\x1b[0m", notification.title),
            (true, Severity::Info) => format!("\x1b[1m{}\x1b[0m", notification.title),
            (false, _) => notification.title,
        };
        let _ = writeln!(io::stderr().lock(), "{title}: {}", notification.description);
    }
}

fn long_date(day: NaiveDate) -> String {
    day.format("%B %-d, %Y").to_string()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        if row.len() != column_count {
            return Err(anyhow!(
                "table row has {} cells, expected {column_count}",
                row.len()
            ));
        }
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::task::seed_tasks;
    use crate::views::CalendarMonth;

    fn clock() -> DayClock {
        let now = Utc
            .with_ymd_and_hms(2026, 10, 18, 15, 0, 0)
            .single()
            .expect("valid now");
        DayClock::new(chrono_tz::UTC, now)
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn empty_table_says_no_tasks_found() {
        let out = render(|buf| Renderer::plain().write_task_table(buf, &[], &clock()));
        assert_eq!(out, "No tasks found\n");
    }

    #[test]
    fn table_lists_tasks_in_given_order() {
        let c = clock();
        let tasks = seed_tasks(c.now());
        let refs: Vec<&Task> = tasks.iter().collect();
        let out = render(|buf| Renderer::plain().write_task_table(buf, &refs, &c));

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].contains("Complete project proposal"));
        assert!(lines[2].contains("Oct 20, 2026"));
        assert!(lines[5].contains("Completed"));
        assert!(lines[5].contains("Personal"));
    }

    #[test]
    fn detail_falls_back_for_empty_description() {
        let c = clock();
        let mut task = seed_tasks(c.now())[0].clone();
        task.description.clear();
        let out = render(|buf| Renderer::plain().write_task_info(buf, &task, &c));
        assert!(out.contains("due       October 20, 2026"));
        assert!(out.ends_with("No description provided.\n"));
    }

    #[test]
    fn dashboard_shows_overflow_and_empty_panels() {
        let c = clock();
        let mut tasks = seed_tasks(c.now());
        for n in 0..4 {
            let mut extra = tasks[0].clone();
            extra.id = format!("x{n}");
            extra.due_date = c.now() + Duration::hours(1);
            tasks.push(extra);
        }
        let dashboard = Dashboard::derive(&tasks, &c);
        let out = render(|buf| Renderer::plain().write_dashboard(buf, &dashboard, &c));

        assert!(out.contains("Completion rate  13%"));
        assert!(out.contains("... and 1 more"));
        assert!(out.contains("No overdue tasks"));
    }

    #[test]
    fn month_grid_marks_due_days_and_selection() {
        let c = clock();
        let tasks = seed_tasks(c.now());
        let counts = crate::views::due_counts_by_day(&tasks, &c);
        let month = CalendarMonth::containing(c.today());
        let out =
            render(|buf| Renderer::plain().write_month_grid(buf, &month, &counts, c.today()));

        assert!(out.contains("October 2026"));
        assert!(out.contains("[18]"));
        assert!(out.contains(" 19 *"));
        assert!(!out.contains(" 17 *"));
        assert!(out.contains("4 task(s) due on 4 day(s) this month"));
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[31mlate\x1b[0m"), "late");
    }
}
