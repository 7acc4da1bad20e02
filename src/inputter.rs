use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

/// What a key press did to the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Pending,
    Submitted(String),
    Canceled,
}

/// Single-line editor for the command prompt. Cursor position is tracked in
/// characters; edits resolve the byte offset on demand.
#[derive(Default)]
pub struct CommandLine {
    buffer: String,
    cursor: usize,
}

impl CommandLine {
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    pub fn read(&mut self, key: KeyEvent) -> CommandOutcome {
        trace!("Command line key: {key:?}");
        match (key.code, key.modifiers) {
            (KeyCode::Enter, KeyModifiers::NONE) => {
                let line = std::mem::take(&mut self.buffer);
                self.cursor = 0;
                CommandOutcome::Submitted(line)
            }
            (KeyCode::Esc, KeyModifiers::NONE) => {
                self.clear();
                CommandOutcome::Canceled
            }
            (KeyCode::Backspace, KeyModifiers::NONE) => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_pos();
                    self.buffer.remove(at);
                }
                CommandOutcome::Pending
            }
            (KeyCode::Delete, KeyModifiers::NONE) => {
                let at = self.byte_pos();
                if at < self.buffer.len() {
                    self.buffer.remove(at);
                }
                CommandOutcome::Pending
            }
            (KeyCode::Left, KeyModifiers::NONE) => {
                self.cursor = self.cursor.saturating_sub(1);
                CommandOutcome::Pending
            }
            (KeyCode::Right, KeyModifiers::NONE) => {
                if self.cursor < self.buffer.chars().count() {
                    self.cursor += 1;
                }
                CommandOutcome::Pending
            }
            (KeyCode::Home, KeyModifiers::NONE) => {
                self.cursor = 0;
                CommandOutcome::Pending
            }
            (KeyCode::End, KeyModifiers::NONE) => {
                self.cursor = self.buffer.chars().count();
                CommandOutcome::Pending
            }
            (code, _) => {
                if let Some(chr) = code.as_char() {
                    let at = self.byte_pos();
                    self.buffer.insert(at, chr);
                    self.cursor += 1;
                }
                CommandOutcome::Pending
            }
        }
    }

    fn byte_pos(&self) -> usize {
        self.buffer
            .char_indices()
            .nth(self.cursor)
            .map(|(idx, _)| idx)
            .unwrap_or(self.buffer.len())
    }
}
