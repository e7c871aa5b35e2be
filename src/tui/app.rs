#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use tracing::{debug, warn};

use crate::core::BoardManager;
use crate::tui;
use crate::tui::board::{BoardView, Command, Msg};
use crate::watch::{ChangeWatcher, WatchHandle};

const POLL: Duration = Duration::from_millis(50);

/// Runs the interactive board until the user quits.
pub async fn run(manager: BoardManager) -> anyhow::Result<()> {
    let refresh = match manager.config().tui.refresh_interval_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    let watch_paths = [manager.config().tasks_path(), manager.config().dir().to_path_buf()];
    let mut watcher = match ChangeWatcher::new(&watch_paths) {
        Ok(w) => Some(w.spawn()),
        Err(e) => {
            warn!(error = %e, "live updates disabled");
            None
        }
    };

    let terminal = tui::init_terminal()?;
    let mut guard = TerminalGuard::new(terminal);

    let mut view = BoardView::new(manager);
    if let Some(terminal) = guard.terminal.as_ref() {
        let size = terminal.size()?;
        view.update(Msg::Resize(size.width, size.height));
    }

    let result = event_loop(&mut guard, &mut view, watcher.as_mut(), refresh);

    drop(guard);
    if let Some(handle) = watcher {
        handle.close().await;
    }
    result
}

fn event_loop(
    guard: &mut TerminalGuard,
    view: &mut BoardView,
    mut watcher: Option<&mut WatchHandle>,
    refresh: Option<Duration>,
) -> anyhow::Result<()> {
    let mut last_tick = Instant::now();

    loop {
        {
            let Some(terminal) = guard.terminal.as_mut() else {
                anyhow::bail!("terminal unavailable");
            };
            terminal.draw(|f| view.render(f))?;
        }

        if event::poll(POLL)? {
            let msg = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => Some(Msg::Key(key)),
                Event::Resize(w, h) => Some(Msg::Resize(w, h)),
                _ => None,
            };
            if let Some(msg) = msg
                && view.update(msg) == Command::Quit
            {
                return Ok(());
            }
        }

        if let Some(notice) = watcher.as_deref_mut().and_then(WatchHandle::try_recv) {
            match notice {
                Ok(_) => {
                    debug!("board changed on disk");
                    view.update(Msg::Reload);
                }
                Err(e) => {
                    view.update(Msg::WatchError(e));
                }
            }
            last_tick = Instant::now();
        }

        if let Some(every) = refresh
            && last_tick.elapsed() >= every
        {
            view.update(Msg::Tick);
            last_tick = Instant::now();
        }
    }
}

struct TerminalGuard {
    terminal: Option<ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>>,
}

impl TerminalGuard {
    fn new(
        terminal: ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>,
    ) -> Self {
        Self {
            terminal: Some(terminal),
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(terminal) = self.terminal.take() {
            let _ = tui::restore_terminal(terminal);
        }
    }
}
