use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgs, CalendarArgs, Command, EditArgs, ListArgs};
use crate::datetime::{DayClock, parse_day, parse_due_expr};
use crate::filter::TaskFilters;
use crate::identity::{IdentityStore, User};
use crate::render::Renderer;
use crate::task::{CategoryRef, Status, TaskDraft, TaskPatch};
use crate::task_store::TaskStore;
use crate::views::{CalendarMonth, Dashboard, due_counts_by_day, tasks_on_day};

/// Everything a command needs for one invocation.
pub struct AppContext {
    pub identity: IdentityStore,
    pub tasks: TaskStore,
    pub renderer: Renderer,
    pub clock: DayClock,
}

#[instrument(skip(ctx, command))]
pub async fn dispatch(ctx: &mut AppContext, command: Option<Command>) -> anyhow::Result<()> {
    let command = command.unwrap_or(Command::Dashboard);
    debug!(?command, "dispatching command");

    match command {
        Command::Login { email, password } => cmd_login(ctx, &email, &password).await,
        Command::Register {
            name,
            email,
            password,
        } => cmd_register(ctx, &name, &email, &password).await,
        other => {
            require_user(&ctx.identity)?;
            dispatch_protected(ctx, other)
        }
    }
}

fn dispatch_protected(ctx: &mut AppContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Logout => cmd_logout(ctx),
        Command::Profile => cmd_profile(ctx),
        Command::Dashboard => cmd_dashboard(ctx),
        Command::List(args) => cmd_list(ctx, args),
        Command::Show { id } => cmd_show(ctx, &id),
        Command::Add(args) => cmd_add(ctx, args),
        Command::Edit(args) => cmd_edit(ctx, args),
        Command::Done { id } => cmd_set_status(ctx, &id, Status::Completed),
        Command::Reopen { id } => cmd_set_status(ctx, &id, Status::Pending),
        Command::Delete { id } => cmd_delete(ctx, &id),
        Command::Calendar(args) => cmd_calendar(ctx, args),
        Command::Categories => ctx.renderer.print_categories(ctx.tasks.categories()),
        Command::Login { .. } | Command::Register { .. } => {
            Err(anyhow!("authentication commands are not protected routes"))
        }
    }
}

fn require_user(identity: &IdentityStore) -> anyhow::Result<&User> {
    identity.current_user().ok_or_else(|| {
        anyhow!("not logged in; run `taskdeck login --email <EMAIL> --password <PASSWORD>`")
    })
}

#[instrument(skip(ctx, password))]
async fn cmd_login(ctx: &mut AppContext, email: &str, password: &str) -> anyhow::Result<()> {
    if !ctx.identity.login(email, password).await {
        return Err(anyhow!("login failed for {email}"));
    }
    if let Some(user) = ctx.identity.current_user() {
        ctx.renderer.print_line(&format!("Signed in as {}", user.name))?;
    }
    Ok(())
}

#[instrument(skip(ctx, password))]
async fn cmd_register(
    ctx: &mut AppContext,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    if !ctx.identity.register(name, email, password).await {
        return Err(anyhow!("registration failed for {email}"));
    }
    if let Some(user) = ctx.identity.current_user() {
        ctx.renderer
            .print_line(&format!("Account created; signed in as {}", user.name))?;
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_logout(ctx: &mut AppContext) -> anyhow::Result<()> {
    ctx.identity.logout()
}

fn cmd_profile(ctx: &mut AppContext) -> anyhow::Result<()> {
    let user = require_user(&ctx.identity)?;
    ctx.renderer.print_profile(user)
}

#[instrument(skip(ctx))]
fn cmd_dashboard(ctx: &mut AppContext) -> anyhow::Result<()> {
    let dashboard = Dashboard::derive(ctx.tasks.tasks(), &ctx.clock);
    if let Some(user) = ctx.identity.current_user() {
        ctx.renderer.print_line(&format!("Welcome back, {}", user.name))?;
    }
    ctx.renderer.print_dashboard(&dashboard, &ctx.clock)
}

#[instrument(skip(ctx, args))]
fn cmd_list(ctx: &mut AppContext, args: ListArgs) -> anyhow::Result<()> {
    let filters = TaskFilters {
        category_id: args.category,
        status: args.status,
        priority: args.priority,
        search: args.search,
    };
    let matches = ctx.tasks.filter(&filters);
    info!(
        count = matches.len(),
        total = ctx.tasks.tasks().len(),
        "listing tasks"
    );
    ctx.renderer.print_task_table(&matches, &ctx.clock)
}

#[instrument(skip(ctx))]
fn cmd_show(ctx: &mut AppContext, id: &str) -> anyhow::Result<()> {
    match ctx.tasks.get_by_id(id) {
        Some(task) => ctx.renderer.print_task_info(task, &ctx.clock),
        None => ctx.renderer.print_not_found(id),
    }
}

#[instrument(skip(ctx, args))]
fn cmd_add(ctx: &mut AppContext, args: AddArgs) -> anyhow::Result<()> {
    let title = args.title.trim();
    if title.is_empty() {
        return Err(anyhow!("title must not be empty"));
    }

    let draft = TaskDraft {
        title: title.to_string(),
        description: args.description,
        due_date: parse_due_expr(&args.due, &ctx.clock)?,
        category: CategoryRef::resolve(&args.category, ctx.tasks.categories()),
        status: args.status,
        priority: args.priority,
    };

    let task = ctx.tasks.create(draft)?;
    ctx.renderer.print_line(&format!("Created task {}.", task.id))
}

#[instrument(skip(ctx, args), fields(id = %args.id))]
fn cmd_edit(ctx: &mut AppContext, args: EditArgs) -> anyhow::Result<()> {
    let title = match args.title {
        Some(title) if title.trim().is_empty() => {
            return Err(anyhow!("title must not be empty"));
        }
        Some(title) => Some(title.trim().to_string()),
        None => None,
    };

    let patch = TaskPatch {
        title,
        description: args.description,
        due_date: args
            .due
            .as_deref()
            .map(|due| parse_due_expr(due, &ctx.clock))
            .transpose()?,
        category: args
            .category
            .as_deref()
            .map(|id| CategoryRef::resolve(id, ctx.tasks.categories())),
        status: args.status,
        priority: args.priority,
    };

    if patch.is_empty() {
        return Err(anyhow!("nothing to change for task {}", args.id));
    }

    match ctx.tasks.update(&args.id, patch)? {
        Some(task) => ctx.renderer.print_line(&format!("Updated task {}.", task.id)),
        None => ctx.renderer.print_not_found(&args.id),
    }
}

#[instrument(skip(ctx))]
fn cmd_set_status(ctx: &mut AppContext, id: &str, status: Status) -> anyhow::Result<()> {
    let Some(current) = ctx.tasks.get_by_id(id) else {
        return ctx.renderer.print_not_found(id);
    };
    if current.status == status {
        warn!(task_id = %id, %status, "task already has this status");
        return ctx
            .renderer
            .print_line(&format!("Task {id} is already {status}."));
    }

    if let Some(task) = ctx.tasks.update(id, TaskPatch::status(status))? {
        ctx.renderer
            .print_line(&format!("Marked task {} as {}.", task.id, task.status))?;
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_delete(ctx: &mut AppContext, id: &str) -> anyhow::Result<()> {
    if ctx.tasks.get_by_id(id).is_none() {
        return ctx.renderer.print_not_found(id);
    }
    ctx.tasks.delete(id)?;
    ctx.renderer.print_line(&format!("Deleted task {id}."))
}

#[instrument(skip(ctx, args))]
fn cmd_calendar(ctx: &mut AppContext, args: CalendarArgs) -> anyhow::Result<()> {
    let selected = match args.day.as_deref() {
        Some(day) => parse_day(day)?,
        None => ctx.clock.today(),
    };
    let month = match args.month.as_deref() {
        Some(month) => month.parse::<CalendarMonth>()?,
        None => CalendarMonth::containing(selected),
    };

    let tasks = ctx.tasks.tasks();
    let counts = due_counts_by_day(tasks, &ctx.clock);
    let selected_tasks = tasks_on_day(tasks, selected, &ctx.clock);
    debug!(
        month = %month.title(),
        %selected,
        due = selected_tasks.len(),
        "rendering calendar"
    );
    ctx.renderer
        .print_calendar(&month, &counts, selected, &selected_tasks, &ctx.clock)
}
