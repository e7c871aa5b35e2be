#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::core::{BoardManager, MoveTarget, PriorityStep};
use crate::error::BoardError;
use crate::task::Task;
use crate::task::date;
use crate::tui::wrap;

pub const LOADING: &str = "Loading...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Key(KeyEvent),
    Resize(u16, u16),
    Tick,
    Reload,
    /// The watcher reported an error; events may have been missed.
    WatchError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Loading,
    Board,
    Detail { scroll: u16 },
    MoveDialog { cursor: usize },
    DeleteConfirm,
    Help,
}

#[derive(Debug, Clone)]
struct Column {
    status: String,
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Notice {
    text: String,
    error: bool,
}

/// Kanban board state. Pure apart from the manager it mutates through.
#[derive(Debug)]
pub struct BoardView {
    manager: BoardManager,
    columns: Vec<Column>,
    col: usize,
    rows: Vec<usize>,
    view: View,
    size: (u16, u16),
    notice: Option<Notice>,
    skipped: usize,
}

impl BoardView {
    /// Loads the board. The view stays in `Loading` until the first resize.
    #[must_use]
    pub fn new(manager: BoardManager) -> Self {
        let mut view = Self {
            manager,
            columns: Vec::new(),
            col: 0,
            rows: Vec::new(),
            view: View::Loading,
            size: (0, 0),
            notice: None,
            skipped: 0,
        };
        view.reload();
        view
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    #[must_use]
    pub fn manager(&self) -> &BoardManager {
        &self.manager
    }

    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        self.notice.as_ref().map(|n| n.text.as_str())
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Task> {
        let column = self.columns.get(self.col)?;
        column.tasks.get(self.rows.get(self.col).copied().unwrap_or(0))
    }

    #[must_use]
    pub fn selected_column(&self) -> usize {
        self.col
    }

    pub fn update(&mut self, msg: Msg) -> Command {
        match msg {
            Msg::Resize(w, h) => {
                self.size = (w, h);
                if self.view == View::Loading {
                    self.view = View::Board;
                }
                if let View::Detail { scroll } = self.view {
                    self.view = View::Detail {
                        scroll: scroll.min(self.max_detail_scroll()),
                    };
                }
                Command::None
            }
            Msg::Tick | Msg::Reload => {
                self.reload();
                Command::None
            }
            Msg::WatchError(e) => {
                self.reload();
                self.notice = Some(Notice {
                    text: format!("Watcher error: {e}"),
                    error: true,
                });
                Command::None
            }
            Msg::Key(key) => self.on_key(key),
        }
    }

    /// Re-reads the board and restores the selection by task id.
    pub fn reload(&mut self) {
        let selected = self.selected().map(|t| t.id);
        let tasks = match self.manager.load_all_lenient() {
            Ok((tasks, warnings)) => {
                self.skipped = warnings.len();
                tasks
            }
            Err(e) => {
                warn!(error = %e, "board reload failed");
                self.notice = Some(Notice {
                    text: e.to_string(),
                    error: true,
                });
                return;
            }
        };

        let mut columns: Vec<Column> = self
            .manager
            .config()
            .status_names()
            .map(|status| Column {
                status: status.to_owned(),
                tasks: Vec::new(),
            })
            .collect();
        for task in tasks.into_iter().filter(|t| !t.is_archived()) {
            if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
                column.tasks.push(task);
            }
        }
        self.rows.resize(columns.len(), 0);
        self.columns = columns;
        self.col = self.col.min(self.columns.len().saturating_sub(1));

        if let Some(id) = selected
            && let Some((c, r)) = self.locate(id)
        {
            self.col = c;
            self.rows[c] = r;
        }
        for (row, column) in self.rows.iter_mut().zip(&self.columns) {
            *row = (*row).min(column.tasks.len().saturating_sub(1));
        }

        let needs_task = matches!(
            self.view,
            View::Detail { .. } | View::MoveDialog { .. } | View::DeleteConfirm
        );
        if needs_task && self.selected().is_none() {
            self.view = View::Board;
        }
    }

    fn locate(&self, id: u32) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(c, column)| {
            column
                .tasks
                .iter()
                .position(|t| t.id == id)
                .map(|r| (c, r))
        })
    }

    fn on_key(&mut self, key: KeyEvent) -> Command {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Command::Quit;
        }
        match self.view {
            View::Loading => {
                if key.code == KeyCode::Char('q') {
                    return Command::Quit;
                }
            }
            View::Board => return self.on_board_key(key.code),
            View::Detail { scroll } => match key.code {
                KeyCode::Char('j') | KeyCode::Down => {
                    self.view = View::Detail {
                        scroll: scroll.saturating_add(1).min(self.max_detail_scroll()),
                    };
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    self.view = View::Detail {
                        scroll: scroll.saturating_sub(1),
                    };
                }
                KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => self.view = View::Board,
                _ => {}
            },
            View::MoveDialog { cursor } => match key.code {
                KeyCode::Char('j') | KeyCode::Down => {
                    self.view = View::MoveDialog {
                        cursor: (cursor + 1).min(self.columns.len().saturating_sub(1)),
                    };
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    self.view = View::MoveDialog {
                        cursor: cursor.saturating_sub(1),
                    };
                }
                KeyCode::Enter => {
                    self.view = View::Board;
                    if let Some(status) = self.columns.get(cursor).map(|c| c.status.clone()) {
                        self.apply(|mgr, id| move_message(mgr, id, &MoveTarget::Status(status)));
                    }
                }
                KeyCode::Esc | KeyCode::Char('q') => self.view = View::Board,
                _ => {}
            },
            View::DeleteConfirm => {
                self.view = View::Board;
                if matches!(key.code, KeyCode::Char('y' | 'Y')) {
                    self.apply(|mgr, id| {
                        mgr.archive(id)?;
                        Ok(format!("Archived task #{id}"))
                    });
                }
            }
            View::Help => self.view = View::Board,
        }
        Command::None
    }

    fn on_board_key(&mut self, code: KeyCode) -> Command {
        match code {
            KeyCode::Char('q') => return Command::Quit,
            KeyCode::Char('h') | KeyCode::Left => self.col = self.col.saturating_sub(1),
            KeyCode::Char('l') | KeyCode::Right => {
                if self.col + 1 < self.columns.len() {
                    self.col += 1;
                }
            }
            KeyCode::Char('j') | KeyCode::Down => self.step_row(true),
            KeyCode::Char('k') | KeyCode::Up => self.step_row(false),
            KeyCode::Enter => {
                if self.selected().is_some() {
                    self.view = View::Detail { scroll: 0 };
                }
            }
            KeyCode::Char('m') => {
                if let Some(task) = self.selected() {
                    let cursor = self
                        .columns
                        .iter()
                        .position(|c| c.status == task.status)
                        .unwrap_or(0);
                    self.view = View::MoveDialog { cursor };
                }
            }
            KeyCode::Char('d') => {
                if self.selected().is_some() {
                    self.view = View::DeleteConfirm;
                }
            }
            KeyCode::Char('c') => self.apply(|mgr, id| {
                let task = mgr.toggle_claim(id)?;
                Ok(match task.claimant() {
                    Some(agent) => format!("Claimed task #{id} as {agent}"),
                    None => format!("Released task #{id}"),
                })
            }),
            KeyCode::Char('+' | '=') => self.apply(|mgr, id| priority_message(mgr, id, PriorityStep::Raise)),
            KeyCode::Char('-' | '_') => self.apply(|mgr, id| priority_message(mgr, id, PriorityStep::Lower)),
            KeyCode::Char('N') => self.apply(|mgr, id| move_message(mgr, id, &MoveTarget::Next)),
            KeyCode::Char('P') => self.apply(|mgr, id| move_message(mgr, id, &MoveTarget::Prev)),
            KeyCode::Char('r') => {
                self.notice = match self.manager.reload_config() {
                    Ok(()) => Some(Notice {
                        text: "Reloaded".to_owned(),
                        error: false,
                    }),
                    Err(e) => Some(Notice {
                        text: e.to_string(),
                        error: true,
                    }),
                };
                self.reload();
            }
            KeyCode::Char('?') => self.view = View::Help,
            _ => {}
        }
        Command::None
    }

    fn step_row(&mut self, down: bool) {
        let Some(column) = self.columns.get(self.col) else {
            return;
        };
        let Some(row) = self.rows.get_mut(self.col) else {
            return;
        };
        if down {
            if *row + 1 < column.tasks.len() {
                *row += 1;
            }
        } else {
            *row = row.saturating_sub(1);
        }
    }

    /// Runs a mutation on the selected task and reports the outcome.
    fn apply(&mut self, op: impl FnOnce(&BoardManager, u32) -> Result<String, BoardError>) {
        let Some(id) = self.selected().map(|t| t.id) else {
            return;
        };
        self.notice = Some(match op(&self.manager, id) {
            Ok(text) => Notice { text, error: false },
            Err(e) => Notice {
                text: describe_error(&e),
                error: true,
            },
        });
        self.reload();
    }

    fn detail_visible_rows(&self) -> u16 {
        // Popup borders plus the status line.
        self.size.1.saturating_sub(3)
    }

    fn max_detail_scroll(&self) -> u16 {
        let Some(task) = self.selected() else {
            return 0;
        };
        let total = u16::try_from(detail_lines(task).len()).unwrap_or(u16::MAX);
        total.saturating_sub(self.detail_visible_rows())
    }

    pub fn render(&self, f: &mut Frame<'_>) {
        let area = f.area();
        if self.view == View::Loading {
            f.render_widget(Paragraph::new(LOADING), area);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);

        self.draw_header(f, chunks[0]);
        self.draw_columns(f, chunks[1]);
        self.draw_status(f, chunks[2]);

        let body = Rect {
            height: area.height.saturating_sub(1),
            ..area
        };
        match self.view {
            View::Detail { scroll } => self.draw_detail(f, body, scroll),
            View::MoveDialog { cursor } => self.draw_move_dialog(f, cursor),
            View::DeleteConfirm => self.draw_delete_confirm(f),
            View::Help => draw_help(f),
            View::Loading | View::Board => {}
        }
    }

    fn draw_header(&self, f: &mut Frame<'_>, area: Rect) {
        let cfg = self.manager.config();
        let mut spans = vec![Span::styled(
            if cfg.board.name.is_empty() {
                "mdboard".to_owned()
            } else {
                cfg.board.name.clone()
            },
            Style::default().add_modifier(Modifier::BOLD),
        )];
        if let Some(agent) = self.manager.agent() {
            spans.push(Span::raw(format!("  as {agent}")));
        }
        if self.skipped > 0 {
            spans.push(Span::styled(
                format!("  ({} unreadable files skipped)", self.skipped),
                Style::default().fg(Color::Yellow),
            ));
        }
        f.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_columns(&self, f: &mut Frame<'_>, area: Rect) {
        if self.columns.is_empty() {
            return;
        }
        let n = u32::try_from(self.columns.len()).unwrap_or(1);
        let constraints: Vec<Constraint> = self.columns.iter().map(|_| Constraint::Ratio(1, n)).collect();
        let areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        let now = OffsetDateTime::now_utc();
        let title_lines = usize::from(self.manager.config().tui.title_lines);
        for (i, (column, rect)) in self.columns.iter().zip(areas.iter()).enumerate() {
            let focused = i == self.col;
            let limit = self.manager.config().wip_limit(&column.status);
            let title = match limit {
                Some(n) => format!(" {} {}/{n} ", column.status, column.tasks.len()),
                None => format!(" {} {} ", column.status, column.tasks.len()),
            };
            let border = if focused {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            let block = Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(border);
            let inner = block.inner(*rect);
            f.render_widget(block, *rect);

            let width = usize::from(inner.width);
            let selected_row = focused.then(|| self.rows.get(i).copied().unwrap_or(0));
            let cards: Vec<Vec<Line<'static>>> = column
                .tasks
                .iter()
                .enumerate()
                .map(|(r, t)| card_lines(t, width, title_lines, selected_row == Some(r), now))
                .collect();

            let height = usize::from(inner.height);
            let mut start = 0;
            if let Some(sel) = selected_row {
                while start < sel && cards[start..=sel].iter().map(Vec::len).sum::<usize>() > height {
                    start += 1;
                }
            }
            let lines: Vec<Line<'static>> = cards[start..].iter().flatten().take(height).cloned().collect();
            f.render_widget(Paragraph::new(lines), inner);
        }
    }

    fn draw_status(&self, f: &mut Frame<'_>, area: Rect) {
        let line = match &self.notice {
            Some(n) if n.error => Line::from(Span::styled(n.text.clone(), Style::default().fg(Color::Red))),
            Some(n) => Line::from(Span::styled(n.text.clone(), Style::default().fg(Color::Green))),
            None => Line::from(Span::styled(
                "h/l columns • j/k cards • Enter detail • m move • d delete • c claim • +/- priority • ? help • q quit",
                Style::default().fg(Color::DarkGray),
            )),
        };
        f.render_widget(Paragraph::new(line), area);
    }

    fn draw_detail(&self, f: &mut Frame<'_>, area: Rect, scroll: u16) {
        let Some(task) = self.selected() else {
            return;
        };
        f.render_widget(Clear, area);
        let lines: Vec<Line<'_>> = detail_lines(task).into_iter().map(Line::from).collect();
        let p = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(format!(" Task #{} ", task.id))
                    .borders(Borders::ALL),
            )
            .scroll((scroll, 0));
        f.render_widget(p, area);
    }

    fn draw_move_dialog(&self, f: &mut Frame<'_>, cursor: usize) {
        let Some(task) = self.selected() else {
            return;
        };
        let area = centered_rect(40, 50, f.area());
        f.render_widget(Clear, area);
        let lines: Vec<Line<'_>> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let marker = if c.status == task.status { " (current)" } else { "" };
                let text = format!("{} {}{marker}", if i == cursor { ">" } else { " " }, c.status);
                if i == cursor {
                    Line::from(Span::styled(text, Style::default().fg(Color::Black).bg(Color::Cyan)))
                } else {
                    Line::from(text)
                }
            })
            .collect();
        let p = Paragraph::new(lines).block(
            Block::default()
                .title(format!(" Move #{} ", task.id))
                .borders(Borders::ALL),
        );
        f.render_widget(p, area);
    }

    fn draw_delete_confirm(&self, f: &mut Frame<'_>) {
        let Some(task) = self.selected() else {
            return;
        };
        let area = centered_rect(60, 20, f.area());
        f.render_widget(Clear, area);
        let p = Paragraph::new(format!("Delete task #{} \"{}\"? (y/N)", task.id, task.title))
            .block(Block::default().title(" Delete ").borders(Borders::ALL));
        f.render_widget(p, area);
    }
}

fn move_message(mgr: &BoardManager, id: u32, target: &MoveTarget) -> Result<String, BoardError> {
    let out = mgr.move_task(id, target, None)?;
    Ok(if out.changed {
        format!("Moved task #{id}: {} → {}", out.from, out.task.status)
    } else {
        format!("Task #{id} is already at {}", out.task.status)
    })
}

fn priority_message(mgr: &BoardManager, id: u32, step: PriorityStep) -> Result<String, BoardError> {
    let task = mgr.shift_priority(id, step)?;
    Ok(format!("Task #{id} priority is now {}", task.priority))
}

fn describe_error(e: &BoardError) -> String {
    match e {
        BoardError::BoundaryReached { id, edge, what } => {
            format!("Task #{id} is already at {edge} {what}")
        }
        other => other.to_string(),
    }
}

fn card_lines(
    task: &Task,
    width: usize,
    title_lines: usize,
    selected: bool,
    now: OffsetDateTime,
) -> Vec<Line<'static>> {
    let prefix = format!("#{} ", task.id);
    let indent = " ".repeat(prefix.chars().count());
    let title_width = width.saturating_sub(prefix.chars().count());
    let title_style = if selected {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };

    let mut lines = Vec::new();
    let wrapped = wrap::wrap(&task.title, title_width, title_lines);
    if wrapped.is_empty() {
        lines.push(Line::from(Span::styled(prefix.trim_end().to_owned(), title_style)));
    }
    for (i, part) in wrapped.into_iter().enumerate() {
        let lead = if i == 0 { prefix.clone() } else { indent.clone() };
        lines.push(Line::from(Span::styled(format!("{lead}{part}"), title_style)));
    }

    let mut meta = vec![Span::styled(task.priority.clone(), priority_style(&task.priority))];
    if let Some(assignee) = &task.assignee {
        meta.push(Span::raw(format!(" · {assignee}")));
    }
    if let Some(agent) = task.claimant() {
        meta.push(Span::styled(format!(" @{agent}"), Style::default().fg(Color::Magenta)));
    }
    lines.push(Line::from(meta));

    let mut age = vec![Span::styled(format_age(now - task.updated), Style::default().fg(Color::DarkGray))];
    if task.blocked {
        age.push(Span::styled(" · blocked", Style::default().fg(Color::Red)));
    }
    if let Some(due) = task.due {
        age.push(Span::raw(format!(" · due {}", date::format(due))));
    }
    lines.push(Line::from(age));
    lines.push(Line::from(""));
    lines
}

fn priority_style(priority: &str) -> Style {
    match priority {
        "critical" => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        "high" => Style::default().fg(Color::Yellow),
        "low" => Style::default().fg(Color::DarkGray),
        _ => Style::default(),
    }
}

fn format_age(elapsed: time::Duration) -> String {
    if elapsed < time::Duration::minutes(1) {
        "<1m".to_owned()
    } else if elapsed < time::Duration::hours(1) {
        format!("{}m", elapsed.whole_minutes())
    } else if elapsed < time::Duration::days(1) {
        format!("{}h", elapsed.whole_hours())
    } else {
        format!("{}d", elapsed.whole_days())
    }
}

fn detail_lines(task: &Task) -> Vec<String> {
    let stamp = |t: OffsetDateTime| t.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_owned());
    let mut lines = vec![
        task.title.clone(),
        String::new(),
        format!("Status:    {}", task.status),
        format!("Priority:  {}", task.priority),
    ];
    if let Some(assignee) = &task.assignee {
        lines.push(format!("Assignee:  {assignee}"));
    }
    if let Some(agent) = task.claimant() {
        let since = task.claimed_at.map(stamp).unwrap_or_default();
        lines.push(format!("Claimed:   {agent} {since}"));
    }
    if let Some(class) = &task.class {
        lines.push(format!("Class:     {class}"));
    }
    if !task.tags.is_empty() {
        lines.push(format!("Tags:      {}", task.tags.join(", ")));
    }
    if let Some(due) = task.due {
        lines.push(format!("Due:       {}", date::format(due)));
    }
    if let Some(estimate) = &task.estimate {
        lines.push(format!("Estimate:  {estimate}"));
    }
    if let Some(parent) = task.parent {
        lines.push(format!("Parent:    #{parent}"));
    }
    if !task.depends_on.is_empty() {
        let deps: Vec<String> = task.depends_on.iter().map(|d| format!("#{d}")).collect();
        lines.push(format!("Depends:   {}", deps.join(", ")));
    }
    if task.blocked {
        lines.push(format!(
            "Blocked:   {}",
            task.block_reason.as_deref().unwrap_or("yes")
        ));
    }
    lines.push(format!("Created:   {}", stamp(task.created)));
    lines.push(format!("Updated:   {}", stamp(task.updated)));
    if !task.body.is_empty() {
        lines.push(String::new());
        lines.extend(task.body.lines().map(str::to_owned));
    }
    lines
}

fn draw_help(f: &mut Frame<'_>) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);
    let keys = [
        ("h/l ←/→", "switch column"),
        ("j/k ↑/↓", "select card"),
        ("Enter", "task detail"),
        ("m", "move to status"),
        ("N / P", "next / previous status"),
        ("c", "claim or release"),
        ("+ / -", "raise / lower priority"),
        ("d", "delete (archive)"),
        ("r", "reload"),
        ("q, Ctrl+C", "quit"),
    ];
    let lines: Vec<Line<'_>> = keys
        .iter()
        .map(|(k, v)| {
            Line::from(vec![
                Span::styled(format!("{k:<12}"), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(*v),
            ])
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().title(" Keys ").borders(Borders::ALL));
    f.render_widget(p, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::core::NewTask;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    const W: u16 = 120;
    const H: u16 = 30;

    fn setup(titles: &[&str]) -> (tempfile::TempDir, BoardView) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::init(dir.path(), "tui-test", &[]).unwrap();
        let mgr = BoardManager::new(cfg).with_agent(Some("tui-tester".to_owned()));
        for title in titles {
            mgr.create(NewTask {
                title: (*title).to_owned(),
                ..NewTask::default()
            })
            .unwrap();
        }
        let mut view = BoardView::new(mgr);
        view.update(Msg::Resize(W, H));
        (dir, view)
    }

    fn key(c: char) -> Msg {
        Msg::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    fn code(code: KeyCode) -> Msg {
        Msg::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn screen(view: &BoardView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(W, H)).unwrap();
        terminal.draw(|f| view.render(f)).unwrap();
        let buf = terminal.backend().buffer();
        let width = usize::from(buf.area.width);
        let mut out = String::new();
        for (i, cell) in buf.content.iter().enumerate() {
            out.push_str(cell.symbol());
            if (i + 1) % width == 0 {
                out.push('\n');
            }
        }
        out
    }

    #[test]
    fn shows_loading_until_first_resize() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::init(dir.path(), "t", &[]).unwrap();
        let mut view = BoardView::new(BoardManager::new(cfg));
        assert_eq!(view.view(), View::Loading);
        assert!(screen(&view).contains(LOADING));
        view.update(Msg::Resize(W, H));
        assert_eq!(view.view(), View::Board);
        let s = screen(&view);
        assert!(!s.contains(LOADING));
        assert!(s.contains("backlog"));
        assert!(s.contains("in-progress"));
    }

    #[test]
    fn cards_show_id_title_and_fresh_age() {
        let (_dir, view) = setup(&["Write docs"]);
        let s = screen(&view);
        assert!(s.contains("#1 Write docs"));
        assert!(s.contains("medium"));
        assert!(s.contains("<1m"));
    }

    #[test]
    fn empty_column_ignores_task_actions() {
        let (_dir, mut view) = setup(&["Only task"]);
        view.update(key('l'));
        assert_eq!(view.selected_column(), 1);
        assert!(view.selected().is_none());
        for k in ['m', 'd', 'c', '+', '-'] {
            view.update(key(k));
            assert_eq!(view.view(), View::Board);
        }
        view.update(code(KeyCode::Enter));
        assert_eq!(view.view(), View::Board);
        assert!(view.status_text().is_none());
    }

    #[test]
    fn move_dialog_moves_and_follows_task() {
        let (_dir, mut view) = setup(&["Move me"]);
        view.update(key('m'));
        assert_eq!(view.view(), View::MoveDialog { cursor: 0 });
        assert!(screen(&view).contains("> backlog (current)"));
        view.update(key('j'));
        view.update(key('j'));
        view.update(key('k'));
        assert_eq!(view.view(), View::MoveDialog { cursor: 1 });
        view.update(code(KeyCode::Enter));
        assert_eq!(view.view(), View::Board);
        assert_eq!(view.selected_column(), 1);
        assert_eq!(view.selected().unwrap().status, "todo");
        assert_eq!(view.manager().show(1).unwrap().status, "todo");
        assert_eq!(view.status_text(), Some("Moved task #1: backlog → todo"));
    }

    #[test]
    fn move_to_same_status_reports_noop() {
        let (_dir, mut view) = setup(&["Stay"]);
        view.update(key('m'));
        view.update(code(KeyCode::Enter));
        assert_eq!(view.status_text(), Some("Task #1 is already at backlog"));
    }

    #[test]
    fn move_dialog_escape_cancels() {
        let (_dir, mut view) = setup(&["Stay"]);
        view.update(key('m'));
        view.update(key('j'));
        view.update(code(KeyCode::Esc));
        assert_eq!(view.view(), View::Board);
        assert_eq!(view.manager().show(1).unwrap().status, "backlog");
    }

    #[test]
    fn delete_prompt_cancels_on_other_keys() {
        let (_dir, mut view) = setup(&["Write docs"]);
        view.update(key('d'));
        assert_eq!(view.view(), View::DeleteConfirm);
        assert!(screen(&view).contains("Delete task #1 \"Write docs\"? (y/N)"));
        view.update(key('n'));
        assert_eq!(view.view(), View::Board);
        assert!(!view.manager().show(1).unwrap().is_archived());
    }

    #[test]
    fn delete_confirm_archives() {
        let (_dir, mut view) = setup(&["Short lived"]);
        view.update(key('d'));
        view.update(key('y'));
        assert!(view.manager().show(1).unwrap().is_archived());
        assert!(view.selected().is_none());
        assert!(!screen(&view).contains("Short lived"));
    }

    #[test]
    fn priority_boundary_is_reported() {
        let (_dir, mut view) = setup(&["Tune"]);
        view.update(key('-'));
        assert_eq!(view.selected().unwrap().priority, "low");
        view.update(key('_'));
        assert_eq!(view.status_text(), Some("Task #1 is already at lowest priority"));
        for _ in 0..3 {
            view.update(key('+'));
        }
        view.update(key('='));
        assert_eq!(view.status_text(), Some("Task #1 is already at highest priority"));
    }

    #[test]
    fn help_opens_and_any_key_dismisses() {
        let (_dir, mut view) = setup(&[]);
        view.update(key('?'));
        assert_eq!(view.view(), View::Help);
        assert!(screen(&view).contains("Keys"));
        view.update(key('x'));
        assert_eq!(view.view(), View::Board);
    }

    #[test]
    fn detail_scroll_is_clamped() {
        let (_dir, mut view) = setup(&[]);
        let body: String = (1..=40).map(|i| format!("line {i}\n")).collect();
        view.manager()
            .create(NewTask {
                title: "Long read".to_owned(),
                body,
                ..NewTask::default()
            })
            .unwrap();
        view.update(Msg::Reload);
        view.update(code(KeyCode::Enter));
        assert_eq!(view.view(), View::Detail { scroll: 0 });

        for _ in 0..200 {
            view.update(key('j'));
        }
        let View::Detail { scroll: max } = view.view() else {
            panic!("left detail view");
        };
        assert!(max > 0);
        view.update(code(KeyCode::Down));
        assert_eq!(view.view(), View::Detail { scroll: max });
        assert!(screen(&view).contains("line 40"));

        for _ in 0..300 {
            view.update(key('k'));
        }
        assert_eq!(view.view(), View::Detail { scroll: 0 });
        view.update(code(KeyCode::Esc));
        assert_eq!(view.view(), View::Board);
    }

    #[test]
    fn reload_picks_up_external_changes() {
        let (dir, mut view) = setup(&["First"]);
        assert!(!screen(&view).contains("Added elsewhere"));
        let other = BoardManager::open(dir.path()).unwrap();
        other
            .create(NewTask {
                title: "Added elsewhere".to_owned(),
                ..NewTask::default()
            })
            .unwrap();
        view.update(Msg::Reload);
        assert!(screen(&view).contains("Added elsewhere"));
        assert_eq!(view.selected().unwrap().id, 1);
    }

    #[test]
    fn claim_toggle_shows_claimant() {
        let (_dir, mut view) = setup(&["Grab"]);
        view.update(key('c'));
        assert!(screen(&view).contains("@tui-tester"));
        view.update(key('c'));
        assert!(!screen(&view).contains("@tui-tester"));
    }

    #[test]
    fn next_status_respects_claim_gate() {
        let (_dir, mut view) = setup(&["Flow"]);
        view.update(key('N'));
        assert_eq!(view.selected().unwrap().status, "todo");
        view.update(key('N'));
        assert!(view.status_text().unwrap().contains("must be claimed"));
        view.update(key('c'));
        view.update(key('N'));
        assert_eq!(view.selected().unwrap().status, "in-progress");
        view.update(key('P'));
        assert_eq!(view.selected().unwrap().status, "todo");
    }

    #[test]
    fn watcher_errors_reach_the_status_line() {
        let (dir, mut view) = setup(&["Seen"]);
        let mgr = BoardManager::open(dir.path()).unwrap();
        mgr.create(NewTask {
            title: "Missed event".to_owned(),
            ..NewTask::default()
        })
        .unwrap();

        view.update(Msg::WatchError("event queue overflowed".to_owned()));
        assert_eq!(
            view.status_text(),
            Some("Watcher error: event queue overflowed")
        );
        let text = screen(&view);
        assert!(text.contains("Watcher error: event queue overflowed"));
        assert!(text.contains("Missed event"));
    }

    #[test]
    fn quit_keys() {
        let (_dir, mut view) = setup(&[]);
        assert_eq!(
            view.update(Msg::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))),
            Command::Quit
        );
        assert_eq!(view.update(key('q')), Command::Quit);
        view.update(key('?'));
        assert_eq!(view.update(key('j')), Command::None);
    }
}
