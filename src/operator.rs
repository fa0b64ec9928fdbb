//! Operator keyboard commands.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use std::io;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    TogglePause,
    Quit,
}

/// Result of interpreting a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Command(OperatorCommand),
    /// Enter or whitespace
    Ignore,
    Unknown(char),
}

impl KeyAction {
    pub fn from_key(key: char) -> Self {
        match key.to_ascii_lowercase() {
            'p' => KeyAction::Command(OperatorCommand::TogglePause),
            'q' => KeyAction::Command(OperatorCommand::Quit),
            c if c.is_whitespace() => KeyAction::Ignore,
            c => KeyAction::Unknown(c),
        }
    }
}

/// Source of operator keys.
pub trait OperatorInput {
    /// Wait up to `timeout` for a key press.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>>;
}

/// Reads keys from the controlling terminal.
///
/// The terminal stays in line mode, so commands are typed and confirmed with
/// Enter; the Enter key itself is reported as `'\n'`.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl TerminalInput {
    pub fn new() -> Self {
        TerminalInput
    }
}

impl OperatorInput for TerminalInput {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) => Ok(match code {
                KeyCode::Char(c) => Some(c),
                KeyCode::Enter => Some('\n'),
                _ => None,
            }),
            _ => Ok(None),
        }
    }
}
