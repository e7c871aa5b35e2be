#![forbid(unsafe_code)]

use std::io::{IsTerminal as _, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::board::{self, FilterOptions, ListOptions};
use crate::config;
use crate::core::batch::{self, BatchReport};
use crate::core::{BoardManager, ClaimAction, MoveOutcome, MoveTarget, NewTask, PickOptions};
use crate::error::BoardError;
use crate::logging;
use crate::output::{self, OutputFormat};
use crate::task::date;
use crate::task::{Task, TaskEdit};
use crate::tui;
use crate::watch::ChangeWatcher;

pub const ENV_AGENT: &str = "MDBOARD_AGENT";

#[derive(Debug, Parser)]
#[command(
    name = "mdboard",
    version,
    about = "Kanban board stored as Markdown files, shared by people and agents"
)]
pub struct Cli {
    /// Board directory (overrides MDBOARD_DIR and discovery)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
    /// Output as JSON
    #[arg(long, global = true, conflicts_with = "table")]
    pub json: bool,
    /// Output as a table
    #[arg(long, global = true)]
    pub table: bool,
    /// Claimant identity (defaults to MDBOARD_AGENT)
    #[arg(long, global = true)]
    pub agent: Option<String>,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new board
    Init(InitArgs),
    /// Create a task
    #[command(alias = "add")]
    Create(CreateArgs),
    /// List tasks
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show one task
    Show(IdArg),
    /// Move tasks to another status
    Move(MoveArgs),
    /// Edit task fields
    Edit(EditArgs),
    /// Claim a task for --agent
    Claim(IdArg),
    /// Release a claim
    Release(ReleaseArgs),
    /// Hand a claimed task to another agent
    Handoff(HandoffArgs),
    /// Claim the next available task
    Pick(PickArgs),
    /// Archive tasks (soft delete)
    Archive(IdsArg),
    /// Delete task files
    Delete(DeleteArgs),
    /// Board summary
    Board(BoardArgs),
    /// Flow metrics
    Metrics,
    /// Show or change configuration
    Config(ConfigArgs),
    /// Interactive board
    Tui,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Board name (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Comma-separated workflow statuses
    #[arg(long, value_delimiter = ',')]
    pub statuses: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct CreateArgs {
    pub title: String,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub assignee: Option<String>,
    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long)]
    pub estimate: Option<String>,
    #[arg(long)]
    pub parent: Option<u32>,
    /// Comma-separated task ids
    #[arg(long = "depends-on", value_delimiter = ',')]
    pub depends_on: Vec<u32>,
    #[arg(long)]
    pub class: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    /// Claim the new task as AGENT
    #[arg(long, value_name = "AGENT")]
    pub claim: Option<String>,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Comma-separated statuses
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<String>,
    /// Comma-separated priorities
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<String>,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long, conflicts_with = "not_blocked")]
    pub blocked: bool,
    #[arg(long = "not-blocked")]
    pub not_blocked: bool,
    #[arg(long)]
    pub parent: Option<u32>,
    #[arg(long = "claimed-by")]
    pub claimed_by: Option<String>,
    /// Only tasks whose dependencies are all done
    #[arg(long)]
    pub unblocked: bool,
    /// Case-insensitive match on title and body
    #[arg(long)]
    pub search: Option<String>,
    /// id, status, priority, created, updated, due, title
    #[arg(long)]
    pub sort: Option<String>,
    #[arg(long)]
    pub reverse: bool,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Include archived tasks
    #[arg(long)]
    pub archived: bool,
    /// Output as CSV
    #[arg(long)]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct IdArg {
    pub id: String,
}

#[derive(Debug, Parser)]
pub struct IdsArg {
    /// Task id or comma-separated ids
    pub ids: String,
}

#[derive(Debug, Parser)]
pub struct MoveArgs {
    /// Task id or comma-separated ids
    pub ids: String,
    /// Target status
    #[arg(required_unless_present_any = ["next", "prev"], conflicts_with_all = ["next", "prev"])]
    pub status: Option<String>,
    #[arg(long, conflicts_with = "prev")]
    pub next: bool,
    #[arg(long)]
    pub prev: bool,
    /// Claim as AGENT in the same step
    #[arg(long, value_name = "AGENT")]
    pub claim: Option<String>,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Parser)]
pub struct EditArgs {
    /// Task id or comma-separated ids
    pub ids: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long, conflicts_with = "clear_assignee")]
    pub assignee: Option<String>,
    #[arg(long = "clear-assignee")]
    pub clear_assignee: bool,
    #[arg(long = "add-tag", value_delimiter = ',')]
    pub add_tag: Vec<String>,
    #[arg(long = "remove-tag", value_delimiter = ',')]
    pub remove_tag: Vec<String>,
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,
    #[arg(long = "clear-due")]
    pub clear_due: bool,
    #[arg(long)]
    pub estimate: Option<String>,
    #[arg(long, conflicts_with = "append_body")]
    pub body: Option<String>,
    #[arg(long = "append-body")]
    pub append_body: Option<String>,
    /// Start time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, conflicts_with = "clear_started")]
    pub started: Option<String>,
    #[arg(long = "clear-started")]
    pub clear_started: bool,
    /// Completion time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, conflicts_with = "clear_completed")]
    pub completed: Option<String>,
    #[arg(long = "clear-completed")]
    pub clear_completed: bool,
    #[arg(long, conflicts_with = "clear_parent")]
    pub parent: Option<u32>,
    #[arg(long = "clear-parent")]
    pub clear_parent: bool,
    #[arg(long = "add-dep", value_delimiter = ',')]
    pub add_dep: Vec<u32>,
    #[arg(long = "remove-dep", value_delimiter = ',')]
    pub remove_dep: Vec<u32>,
    /// Mark blocked with REASON
    #[arg(long, value_name = "REASON", conflicts_with = "unblock")]
    pub block: Option<String>,
    #[arg(long)]
    pub unblock: bool,
    #[arg(long, conflicts_with = "clear_class")]
    pub class: Option<String>,
    #[arg(long = "clear-class")]
    pub clear_class: bool,
    /// Claim as AGENT
    #[arg(long, value_name = "AGENT", conflicts_with = "release")]
    pub claim: Option<String>,
    #[arg(long)]
    pub release: bool,
}

#[derive(Debug, Parser)]
pub struct ReleaseArgs {
    pub id: String,
    /// Release a claim held by another agent
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Parser)]
pub struct HandoffArgs {
    pub id: String,
    #[arg(long, value_name = "AGENT")]
    pub to: String,
    #[arg(long)]
    pub note: Option<String>,
    /// Move to STATUS in the same step
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Debug, Parser)]
pub struct PickArgs {
    /// Candidate status (repeatable)
    #[arg(long)]
    pub status: Vec<String>,
    #[arg(long)]
    pub tag: Option<String>,
    /// Move the picked task to STATUS
    #[arg(long = "move", value_name = "STATUS")]
    pub move_to: Option<String>,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Task id or comma-separated ids
    pub ids: String,
    /// Skip the confirmation
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Parser)]
pub struct BoardArgs {
    /// Re-render whenever the board changes
    #[arg(short = 'w', long)]
    pub watch: bool,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    Show,
    Get(ConfigGetArgs),
    Set(ConfigSetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
struct Ctx {
    dir: Option<PathBuf>,
    agent: Option<String>,
    format: OutputFormat,
}

impl Ctx {
    fn board_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(config::resolve_dir(self.dir.as_deref())?)
    }

    fn manager(&self) -> anyhow::Result<BoardManager> {
        let dir = self.board_dir()?;
        let mgr = BoardManager::open(&dir)
            .with_context(|| format!("opening board at {}", dir.display()))?;
        Ok(mgr.with_agent(self.agent.clone()))
    }
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    if matches!(cli.cmd, Commands::Tui) {
        logging::init_tui();
    } else {
        logging::init();
    }

    let ctx = Ctx {
        dir: cli.dir.clone(),
        agent: cli.agent.clone().or_else(|| std::env::var(ENV_AGENT).ok()),
        format: OutputFormat::resolve(cli.json, cli.table),
    };

    match run(&ctx, cli.cmd).await {
        Ok(code) => code,
        Err(err) => report_error(&err, ctx.format),
    }
}

/// 2 for a partially failed batch, 1 for anything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BoardError>() {
        Some(BoardError::BatchFailed { .. }) => 2,
        _ => 1,
    }
}

fn report_error(err: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let status = exit_status(err);
    // Per-item errors were printed as the batch ran.
    if status == 2 {
        return ExitCode::from(status);
    }
    let board_err = err.downcast_ref::<BoardError>();
    if format.is_json() {
        let code = board_err.map_or("ERROR", BoardError::code);
        let _ = output::print_json(&serde_json::json!({
            "error": format!("{err:#}"),
            "code": code,
        }));
    } else {
        eprintln!("error: {err:#}");
    }
    ExitCode::from(status)
}

async fn run(ctx: &Ctx, cmd: Commands) -> anyhow::Result<ExitCode> {
    match cmd {
        Commands::Init(args) => cmd_init(ctx, &args),
        Commands::Create(args) => cmd_create(ctx, args),
        Commands::List(args) => cmd_list(ctx, &args),
        Commands::Show(args) => cmd_show(ctx, &args),
        Commands::Move(args) => cmd_move(ctx, &args),
        Commands::Edit(args) => cmd_edit(ctx, &args),
        Commands::Claim(args) => cmd_claim(ctx, &args),
        Commands::Release(args) => cmd_release(ctx, &args),
        Commands::Handoff(args) => cmd_handoff(ctx, &args),
        Commands::Pick(args) => cmd_pick(ctx, args),
        Commands::Archive(args) => cmd_archive(ctx, &args),
        Commands::Delete(args) => cmd_delete(ctx, &args),
        Commands::Board(args) => {
            if args.watch {
                cmd_board_watch(ctx).await
            } else {
                cmd_board(ctx)
            }
        }
        Commands::Metrics => cmd_metrics(ctx),
        Commands::Config(args) => cmd_config(ctx, args.cmd),
        Commands::Tui => cmd_tui(ctx).await,
    }
}

fn cmd_init(ctx: &Ctx, args: &InitArgs) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir()?;
    let dir = ctx
        .dir
        .clone()
        .unwrap_or_else(|| cwd.join(config::DEFAULT_DIR));
    let name = args.name.clone().unwrap_or_else(|| {
        cwd.file_name()
            .map_or_else(|| "board".to_owned(), |n| n.to_string_lossy().into_owned())
    });
    let statuses: Vec<String> = args
        .statuses
        .iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();
    let cfg = config::init(&dir, &name, &statuses)?;

    if ctx.format.is_json() {
        output::print_json(&serde_json::json!({
            "dir": cfg.dir(),
            "name": cfg.board.name,
            "statuses": cfg.status_names().collect::<Vec<_>>(),
        }))?;
    } else {
        println!("Initialized board '{}' in {}", cfg.board.name, cfg.dir().display());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_create(ctx: &Ctx, args: CreateArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let due = args.due.as_deref().map(date::parse).transpose()?;
    let task = mgr.create(NewTask {
        title: args.title,
        status: args.status,
        priority: args.priority,
        assignee: args.assignee,
        tags: args.tags,
        due,
        estimate: args.estimate,
        parent: args.parent,
        depends_on: args.depends_on,
        class: args.class,
        body: args.body.unwrap_or_default(),
        claim: args.claim,
    })?;

    if ctx.format.is_json() {
        output::print_json(&task)?;
    } else {
        println!("Created task #{}: {}", task.id, task.title);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(ctx: &Ctx, args: &ListArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let tasks = mgr.load_all()?;
    let opts = ListOptions {
        filter: FilterOptions {
            statuses: args.status.clone(),
            priorities: args.priority.clone(),
            assignee: args.assignee.clone(),
            tag: args.tag.clone(),
            blocked: match (args.blocked, args.not_blocked) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            parent: args.parent,
            claimed_by: args.claimed_by.clone(),
            search: args.search.clone(),
        },
        sort_by: args.sort.clone(),
        reverse: args.reverse,
        limit: args.limit,
        unblocked: args.unblocked,
        include_archived: args.archived,
    };
    let tasks = board::list(mgr.config(), &tasks, &opts)?;

    if ctx.format.is_json() {
        output::print_json(&tasks)?;
    } else if args.csv {
        output::task_table(&tasks).print_csv()?;
    } else if tasks.is_empty() {
        println!("No tasks found.");
    } else {
        output::task_table(&tasks).print()?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(ctx: &Ctx, args: &IdArg) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let task = mgr.show(parse_id(&args.id)?)?;
    if ctx.format.is_json() {
        output::print_json(&task)?;
    } else {
        output::write_task_detail(std::io::stdout().lock(), &task)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_move(ctx: &Ctx, args: &MoveArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let ids = batch::parse_ids(&args.ids)?;
    let target = match (&args.status, args.next, args.prev) {
        (Some(s), _, _) => MoveTarget::Status(s.clone()),
        (None, true, _) => MoveTarget::Next,
        (None, _, true) => MoveTarget::Prev,
        (None, false, false) => {
            return Err(BoardError::InvalidInput(
                "specify a target status, --next or --prev".to_owned(),
            )
            .into());
        }
    };
    let claim = args.claim.as_deref();
    let describe = |out: &MoveOutcome| {
        if out.changed {
            format!("Moved task #{}: {} → {}", out.task.id, out.from, out.task.status)
        } else {
            format!("Task #{} is already at {}", out.task.id, out.task.status)
        }
    };

    if let [id] = ids[..] {
        let out = mgr.move_task(id, &target, claim)?;
        emit(ctx.format, &out, || describe(&out))?;
        return Ok(ExitCode::SUCCESS);
    }
    let report = BatchReport::run(&ids, |id| mgr.move_task(id, &target, claim));
    finish_batch(ctx.format, report, "moved", describe)
}

fn cmd_edit(ctx: &Ctx, args: &EditArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let ids = batch::parse_ids(&args.ids)?;
    let edit = build_edit(args)?;
    let claim = match (&args.claim, args.release) {
        (Some(agent), _) => ClaimAction::Claim(agent.clone()),
        (None, true) => ClaimAction::Release,
        (None, false) => ClaimAction::Keep,
    };
    let describe = |t: &Task| format!("Updated task #{}: {}", t.id, t.title);

    if let [id] = ids[..] {
        let task = mgr.edit(id, &edit, &claim)?;
        emit(ctx.format, &task, || describe(&task))?;
        return Ok(ExitCode::SUCCESS);
    }
    let report = BatchReport::run(&ids, |id| mgr.edit(id, &edit, &claim));
    finish_batch(ctx.format, report, "updated", describe)
}

fn build_edit(args: &EditArgs) -> anyhow::Result<TaskEdit> {
    fn flag<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
        match (value, clear) {
            (Some(v), _) => Some(Some(v)),
            (None, true) => Some(None),
            (None, false) => None,
        }
    }

    let due = args.due.as_deref().map(date::parse).transpose()?;
    let started = args.started.as_deref().map(parse_timestamp).transpose()?;
    let completed = args.completed.as_deref().map(parse_timestamp).transpose()?;
    Ok(TaskEdit {
        title: args.title.clone(),
        status: args.status.clone(),
        priority: args.priority.clone(),
        assignee: flag(args.assignee.clone(), args.clear_assignee),
        add_tags: args.add_tag.clone(),
        remove_tags: args.remove_tag.clone(),
        due: flag(due, args.clear_due),
        estimate: args.estimate.clone().map(Some),
        body: args.body.clone(),
        append_body: args.append_body.clone(),
        started: flag(started, args.clear_started),
        completed: flag(completed, args.clear_completed),
        parent: flag(args.parent, args.clear_parent),
        add_deps: args.add_dep.clone(),
        remove_deps: args.remove_dep.clone(),
        block: flag(args.block.clone(), args.unblock),
        class: flag(args.class.clone(), args.clear_class),
    })
}

fn cmd_claim(ctx: &Ctx, args: &IdArg) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let out = mgr.claim(parse_id(&args.id)?)?;
    emit(ctx.format, &out, || {
        let agent = out.task.claimant().unwrap_or_default();
        if out.changed {
            format!("Claimed task #{} as {agent}", out.task.id)
        } else {
            format!("Task #{} is already claimed by {agent}", out.task.id)
        }
    })?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_release(ctx: &Ctx, args: &ReleaseArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let task = mgr.release(parse_id(&args.id)?, args.force)?;
    emit(ctx.format, &task, || format!("Released task #{}", task.id))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_handoff(ctx: &Ctx, args: &HandoffArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let task = mgr.handoff(
        parse_id(&args.id)?,
        &args.to,
        args.note.as_deref(),
        args.status.as_deref(),
    )?;
    emit(ctx.format, &task, || {
        format!("Handed off task #{} to {} ({})", task.id, args.to, task.status)
    })?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_pick(ctx: &Ctx, args: PickArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let picked = mgr.pick(&PickOptions {
        statuses: args.status,
        tag: args.tag,
        move_to: args.move_to,
    })?;
    match picked {
        Some(out) => emit(ctx.format, &out, || {
            format!(
                "Picked task #{}: {} ({})",
                out.task.id, out.task.title, out.task.status
            )
        })?,
        None if ctx.format.is_json() => output::print_json(&serde_json::Value::Null)?,
        None => println!("No task available."),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_archive(ctx: &Ctx, args: &IdsArg) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let ids = batch::parse_ids(&args.ids)?;
    warn_dependents(&mgr, &ids);
    let describe = |out: &MoveOutcome| {
        if out.changed {
            format!("Archived task #{}", out.task.id)
        } else {
            format!("Task #{} is already archived", out.task.id)
        }
    };

    if let [id] = ids[..] {
        let out = mgr.archive(id)?;
        emit(ctx.format, &out, || describe(&out))?;
        return Ok(ExitCode::SUCCESS);
    }
    let report = BatchReport::run(&ids, |id| mgr.archive(id));
    finish_batch(ctx.format, report, "archived", describe)
}

fn cmd_delete(ctx: &Ctx, args: &DeleteArgs) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let ids = batch::parse_ids(&args.ids)?;

    if !args.yes {
        let interactive = std::io::stdin().is_terminal() && !ctx.format.is_json();
        let [id] = ids[..] else {
            return Err(BoardError::ConfirmationRequired("deleting several tasks".to_owned()).into());
        };
        if !interactive {
            return Err(BoardError::ConfirmationRequired("delete".to_owned()).into());
        }
        let task = mgr.show(id)?;
        if !confirm(&format!("Delete task #{} \"{}\"? (y/N) ", task.id, task.title))? {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    warn_dependents(&mgr, &ids);
    let describe = |t: &Task| format!("Deleted task #{}: {}", t.id, t.title);
    if let [id] = ids[..] {
        let task = mgr.delete(id)?;
        emit(ctx.format, &task, || describe(&task))?;
        return Ok(ExitCode::SUCCESS);
    }
    let report = BatchReport::run(&ids, |id| mgr.delete(id));
    finish_batch(ctx.format, report, "deleted", describe)
}

fn cmd_board(ctx: &Ctx) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    render_board(&mgr, ctx.format)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_board_watch(ctx: &Ctx) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let cfg = mgr.config();
    let mut handle = ChangeWatcher::new([cfg.tasks_path(), cfg.dir().to_path_buf()])?.spawn();

    let mut result = redraw_board(&mgr, ctx.format);
    while result.is_ok() {
        let notice = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            n = handle.recv() => n,
        };
        match notice {
            None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => eprintln!("warning: watcher error: {e}"),
        }
        result = redraw_board(&mgr, ctx.format);
    }
    handle.close().await;
    result.map(|()| ExitCode::SUCCESS)
}

fn redraw_board(mgr: &BoardManager, format: OutputFormat) -> anyhow::Result<()> {
    if !format.is_json() {
        print!("\x1b[H\x1b[2J");
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_owned());
        println!("Updated: {now}\n");
    }
    render_board(mgr, format)?;
    if !format.is_json() {
        println!("\n[Press Ctrl+C to exit]");
    }
    std::io::stdout().flush()?;
    Ok(())
}

fn render_board(mgr: &BoardManager, format: OutputFormat) -> anyhow::Result<()> {
    let tasks = load_lenient(mgr)?;
    let today = OffsetDateTime::now_utc().date();
    let summary = board::summary(mgr.config(), &tasks, today);
    if format.is_json() {
        output::print_json(&summary)?;
    } else {
        output::write_summary(std::io::stdout().lock(), &summary)?;
    }
    Ok(())
}

fn cmd_metrics(ctx: &Ctx) -> anyhow::Result<ExitCode> {
    let mgr = ctx.manager()?;
    let tasks = mgr.load_all()?;
    let metrics = board::compute_metrics(mgr.config(), &tasks, OffsetDateTime::now_utc());
    if ctx.format.is_json() {
        output::print_json(&metrics)?;
    } else {
        output::write_metrics(std::io::stdout().lock(), &metrics)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(ctx: &Ctx, cmd: ConfigCmd) -> anyhow::Result<ExitCode> {
    let dir = ctx.board_dir()?;
    match cmd {
        ConfigCmd::Show => {
            let cfg = config::load(&dir)?;
            if ctx.format.is_json() {
                output::print_json(&cfg)?;
            } else {
                let raw = std::fs::read_to_string(cfg.config_path())
                    .with_context(|| format!("reading {}", cfg.config_path().display()))?;
                print!("{raw}");
            }
        }
        ConfigCmd::Get(get) => {
            let value = config::get_value(&dir, &get.key)?
                .ok_or_else(|| BoardError::InvalidConfigKey(get.key.clone()))?;
            if ctx.format.is_json() {
                output::print_json(&serde_json::json!({ "key": get.key, "value": value }))?;
            } else {
                println!("{value}");
            }
        }
        ConfigCmd::Set(set) => {
            config::set_value(&dir, &set.key, &set.value)?;
            if ctx.format.is_json() {
                output::print_json(&serde_json::json!({ "key": set.key, "value": set.value }))?;
            } else {
                println!("Set {} = {}", set.key, set.value);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_tui(ctx: &Ctx) -> anyhow::Result<ExitCode> {
    if !tui::is_tty() {
        return Err(BoardError::InvalidInput("tui needs an interactive terminal".to_owned()).into());
    }
    let mgr = ctx.manager()?;
    tui::app::run(mgr).await?;
    Ok(ExitCode::SUCCESS)
}

fn parse_id(raw: &str) -> Result<u32, BoardError> {
    match batch::parse_ids(raw)?[..] {
        [id] => Ok(id),
        _ => Err(BoardError::InvalidTaskId(raw.to_owned())),
    }
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, BoardError> {
    if let Ok(ts) = OffsetDateTime::parse(raw.trim(), &Rfc3339) {
        return Ok(ts);
    }
    Ok(date::parse(raw)?.midnight().assume_utc())
}

fn load_lenient(mgr: &BoardManager) -> anyhow::Result<Vec<Task>> {
    let (tasks, warnings) = mgr.load_all_lenient()?;
    for w in &warnings {
        eprintln!("warning: {w}");
    }
    Ok(tasks)
}

fn warn_dependents(mgr: &BoardManager, ids: &[u32]) {
    for &id in ids {
        if let Ok(notes) = mgr.dependents(id) {
            for note in notes {
                eprintln!("warning: task #{id} is still referenced: {note}");
            }
        }
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}

/// Prints a single result as JSON or as a one-line message.
fn emit<T: Serialize>(format: OutputFormat, value: &T, message: impl FnOnce() -> String) -> anyhow::Result<()> {
    if format.is_json() {
        output::print_json(value)?;
    } else {
        println!("{}", message());
    }
    Ok(())
}

fn finish_batch<T>(
    format: OutputFormat,
    report: BatchReport<T>,
    verb: &str,
    describe: impl Fn(&T) -> String,
) -> anyhow::Result<ExitCode> {
    if format.is_json() {
        output::print_json(&report.to_json())?;
    } else {
        for item in &report.items {
            match &item.result {
                Ok(v) => println!("{}", describe(v)),
                Err(e) => eprintln!("error: task #{}: {e}", item.id),
            }
        }
        println!("{}", report.summary(verb));
    }
    report.into_result()?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mdboard", "move", "1,2", "todo", "--json", "--agent", "bot"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.agent.as_deref(), Some("bot"));
        let Commands::Move(args) = cli.cmd else {
            panic!("expected move");
        };
        assert_eq!(args.ids, "1,2");
        assert_eq!(args.status.as_deref(), Some("todo"));
    }

    #[test]
    fn move_needs_a_target() {
        assert!(Cli::try_parse_from(["mdboard", "move", "1"]).is_err());
        assert!(Cli::try_parse_from(["mdboard", "move", "1", "--next"]).is_ok());
        assert!(Cli::try_parse_from(["mdboard", "move", "1", "todo", "--next"]).is_err());
    }

    #[test]
    fn json_and_table_conflict() {
        assert!(Cli::try_parse_from(["mdboard", "--json", "--table", "board"]).is_err());
    }

    #[test]
    fn aliases_resolve() {
        let cli = Cli::try_parse_from(["mdboard", "add", "Write docs", "--tags", "a,b"]).unwrap();
        let Commands::Create(args) = cli.cmd else {
            panic!("expected create");
        };
        assert_eq!(args.tags, ["a", "b"]);
        assert!(matches!(
            Cli::try_parse_from(["mdboard", "ls"]).unwrap().cmd,
            Commands::List(_)
        ));
    }

    #[test]
    fn edit_flags_build_clear_and_set() {
        let cli = Cli::try_parse_from([
            "mdboard",
            "edit",
            "3",
            "--clear-assignee",
            "--due",
            "2026-03-01",
            "--block",
            "waiting on API",
            "--started",
            "2026-01-02",
        ])
        .unwrap();
        let Commands::Edit(args) = cli.cmd else {
            panic!("expected edit");
        };
        let edit = build_edit(&args).unwrap();
        assert_eq!(edit.assignee, Some(None));
        assert_eq!(edit.due, Some(Some(date::parse("2026-03-01").unwrap())));
        assert_eq!(edit.block, Some(Some("waiting on API".to_owned())));
        assert_eq!(edit.started, Some(Some(time::macros::datetime!(2026-01-02 0:00 UTC))));
        assert_eq!(edit.title, None);
    }

    #[test]
    fn empty_edit_is_empty() {
        let cli = Cli::try_parse_from(["mdboard", "edit", "3"]).unwrap();
        let Commands::Edit(args) = cli.cmd else {
            panic!("expected edit");
        };
        assert!(build_edit(&args).unwrap().is_empty());
    }

    #[test]
    fn single_id_parsing() {
        assert_eq!(parse_id("#7").unwrap(), 7);
        assert!(matches!(parse_id("1,2"), Err(BoardError::InvalidTaskId(_))));
    }

    #[test]
    fn batch_failure_exits_two_and_other_errors_one() {
        let batch = anyhow::Error::from(BoardError::BatchFailed { failed: 1, total: 2 });
        assert_eq!(exit_status(&batch), 2);
        let other = anyhow::Error::from(BoardError::TaskNotFound(9)).context("showing task");
        assert_eq!(exit_status(&other), 1);
        let wrapped = anyhow::Error::from(BoardError::BatchFailed { failed: 2, total: 2 }).context("moving");
        assert_eq!(exit_status(&wrapped), 2);
    }
}
