// src/terminal/line_editor.rs
//
// Keystroke-driven line editor with persistent history.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::repeat::PresetSlot;

/// Number of history entries kept
pub const HISTORY_SIZE: usize = 500;

// ============================================================================
// History
// ============================================================================

/// Submitted lines, newest last
pub struct History {
    entries: VecDeque<String>,
    /// Current navigation position (0 = newest)
    nav_pos: Option<usize>,
    path: Option<PathBuf>,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            nav_pos: None,
            path: None,
        }
    }

    /// Load history from `path`; a missing file is an empty history
    pub fn load(path: &Path) -> Self {
        let mut history = Self::new();
        history.path = Some(path.to_path_buf());
        if let Ok(content) = std::fs::read_to_string(path) {
            for line in content.lines().filter(|l| !l.is_empty()) {
                history.push(line);
            }
        }
        history
    }

    pub fn save(&self) -> Result<(), String> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create history dir: {}", e))?;
        }
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(entry);
            content.push('\n');
        }
        std::fs::write(path, content).map_err(|e| format!("Failed to write history: {}", e))
    }

    /// Add a line unless it repeats the newest entry
    pub fn push(&mut self, line: &str) {
        self.nav_pos = None;
        if self.entries.back().map(String::as_str) == Some(line) {
            return;
        }
        if self.entries.len() == HISTORY_SIZE {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get previous (older) entry
    pub fn get_prev(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = match self.nav_pos {
            None => 0,
            Some(p) if p + 1 < self.entries.len() => p + 1,
            Some(p) => p,
        };
        self.nav_pos = Some(pos);
        self.get_at(pos)
    }

    /// Get next (newer) entry; `None` means back to the line being typed
    pub fn get_next(&mut self) -> Option<&str> {
        match self.nav_pos {
            None | Some(0) => {
                self.nav_pos = None;
                None
            }
            Some(p) => {
                self.nav_pos = Some(p - 1);
                self.get_at(p - 1)
            }
        }
    }

    fn is_navigating(&self) -> bool {
        self.nav_pos.is_some()
    }

    fn get_at(&self, nav_pos: usize) -> Option<&str> {
        let idx = self.entries.len().checked_sub(nav_pos + 1)?;
        self.entries.get(idx).map(String::as_str)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Line Editor
// ============================================================================

/// What the loop should do after a keystroke
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditorAction {
    /// Enter was pressed on this line
    Submitted(String),
    /// Ctrl-D on an empty line
    Eof,
    /// Ctrl-C
    Interrupt,
    /// Ctrl-T
    Menu,
    /// Alt+1..9,0
    SendPreset(PresetSlot),
    /// Ctrl-L
    ClearScreen,
    /// The line or cursor changed and needs a redraw
    Changed,
    None,
}

pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    /// Line being typed before history navigation started
    stash: String,
    history: History,
}

impl LineEditor {
    pub fn new(history: History) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            stash: String::new(),
            history,
        }
    }

    pub fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    fn set_line(&mut self, line: &str) {
        self.buffer = line.chars().collect();
        self.cursor = self.buffer.len();
    }

    fn insert(&mut self, c: char) {
        self.buffer.insert(self.cursor, c);
        self.cursor += 1;
    }

    /// Insert pasted text; line breaks are flattened to spaces
    pub fn paste(&mut self, text: &str) -> EditorAction {
        for c in text.chars() {
            match c {
                '\r' | '\n' => self.insert(' '),
                c if c.is_control() => {}
                c => self.insert(c),
            }
        }
        EditorAction::Changed
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> EditorAction {
        if key.kind == KeyEventKind::Release {
            return EditorAction::None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char(c) if ctrl => match c.to_ascii_lowercase() {
                'c' => EditorAction::Interrupt,
                'd' if self.buffer.is_empty() => EditorAction::Eof,
                'd' => self.delete(),
                't' => EditorAction::Menu,
                'l' => EditorAction::ClearScreen,
                'a' => self.move_to(0),
                'e' => self.move_to(self.buffer.len()),
                'u' => {
                    self.clear();
                    EditorAction::Changed
                }
                _ => EditorAction::None,
            },
            KeyCode::Char(c) if alt && c.is_ascii_digit() => {
                let n = match c {
                    '0' => 10,
                    d => d as u8 - b'0',
                };
                PresetSlot::new(n).map_or(EditorAction::None, EditorAction::SendPreset)
            }
            KeyCode::Char(c) => {
                self.insert(c);
                EditorAction::Changed
            }
            KeyCode::Enter => {
                let line = self.line();
                self.clear();
                self.stash.clear();
                if !line.trim().is_empty() {
                    self.history.push(&line);
                }
                EditorAction::Submitted(line)
            }
            KeyCode::Backspace => {
                if self.cursor == 0 {
                    return EditorAction::None;
                }
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
                EditorAction::Changed
            }
            KeyCode::Delete => self.delete(),
            KeyCode::Left => self.move_to(self.cursor.saturating_sub(1)),
            KeyCode::Right => self.move_to((self.cursor + 1).min(self.buffer.len())),
            KeyCode::Home => self.move_to(0),
            KeyCode::End => self.move_to(self.buffer.len()),
            KeyCode::Up => {
                if !self.history.is_navigating() {
                    self.stash = self.line();
                }
                match self.history.get_prev().map(str::to_string) {
                    Some(entry) => {
                        self.set_line(&entry);
                        EditorAction::Changed
                    }
                    None => EditorAction::None,
                }
            }
            KeyCode::Down => {
                if !self.history.is_navigating() {
                    return EditorAction::None;
                }
                let line = match self.history.get_next() {
                    Some(entry) => entry.to_string(),
                    None => std::mem::take(&mut self.stash),
                };
                self.set_line(&line);
                EditorAction::Changed
            }
            _ => EditorAction::None,
        }
    }

    fn delete(&mut self) -> EditorAction {
        if self.cursor >= self.buffer.len() {
            return EditorAction::None;
        }
        self.buffer.remove(self.cursor);
        EditorAction::Changed
    }

    fn move_to(&mut self, pos: usize) -> EditorAction {
        if pos == self.cursor {
            return EditorAction::None;
        }
        self.cursor = pos;
        EditorAction::Changed
    }

    pub fn save_history(&self) -> Result<(), String> {
        self.history.save()
    }
}
