#![forbid(unsafe_code)]

pub mod app;
pub mod board;
pub mod wrap;

use std::io;
use std::io::IsTerminal as _;

use crate::error::BoardError;

#[must_use]
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

pub fn init_terminal()
-> Result<ratatui::Terminal<ratatui::backend::CrosstermBackend<io::Stdout>>, BoardError> {
    use crossterm::terminal::enable_raw_mode;
    use ratatui::backend::CrosstermBackend;

    enable_raw_mode().map_err(|e| BoardError::io_path("enabling raw mode on", "stdout", e))?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)
        .map_err(|e| BoardError::io_path("entering alternate screen on", "stdout", e))?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = ratatui::Terminal::new(backend)
        .map_err(|e| BoardError::io_path("creating terminal on", "stdout", e))?;
    Ok(terminal)
}

pub fn restore_terminal(
    mut terminal: ratatui::Terminal<ratatui::backend::CrosstermBackend<io::Stdout>>,
) -> Result<(), BoardError> {
    use crossterm::terminal::disable_raw_mode;

    disable_raw_mode().map_err(|e| BoardError::io_path("disabling raw mode on", "stdout", e))?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )
    .map_err(|e| BoardError::io_path("leaving alternate screen on", "stdout", e))?;
    terminal
        .show_cursor()
        .map_err(|e| BoardError::io_path("showing cursor on", "stdout", e))?;
    Ok(())
}
